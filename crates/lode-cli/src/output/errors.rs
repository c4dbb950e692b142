//! Error reports with actionable suggestions.

use std::error::Error;

use lode_core::LodeError;

use super::colors::ColorSupport;

/// Error formatter with suggestions
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format an error, its suggestion and its source chain
    pub fn format_error(&self, error: &LodeError) -> String {
        let mut output = String::new();

        output.push_str(&self.colors.red("error"));
        output.push_str(": ");
        output.push_str(&error.to_string());
        output.push('\n');

        if let LodeError::TomlParse { file, line, column, .. } = error {
            output.push_str(&self.format_location(file, *line, *column));
            output.push('\n');
        }

        if let Some(suggestion) = error.suggestion() {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push('\n');
            output.push_str(&self.colors.dim("caused by"));
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }
        if error.source().is_some() {
            output.push('\n');
        }

        output
    }

    /// Format a bare message
    pub fn format_simple(&self, message: &str) -> String {
        format!("{}: {}", self.colors.red("error"), message)
    }

    pub fn format_warning(&self, message: &str) -> String {
        format!("{}: {}", self.colors.yellow("warning"), message)
    }

    /// `--> file:line:column`
    pub fn format_location(&self, file: &str, line: usize, column: usize) -> String {
        format!("{} {}:{}:{}", self.colors.dim("-->"), file, line, column)
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_suggestion_and_source() {
        let formatter = ErrorFormatter::with_colors(ColorSupport::disabled());
        let error = LodeError::io(
            "Failed to read pyproject.toml".to_string(),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        );
        let text = formatter.format_error(&error);
        assert!(text.starts_with("error: IO error: Failed to read pyproject.toml"));
        assert!(text.contains("caused by: permission denied"));

        let error = LodeError::UnknownRegistry {
            reference: "corp".to_string(),
        };
        let text = formatter.format_error(&error);
        assert!(text.contains("help: Run 'lode registries'"));
    }

    #[test]
    fn test_parse_error_location() {
        let formatter = ErrorFormatter::with_colors(ColorSupport::disabled());
        let error = LodeError::TomlParse {
            file: "pyproject.toml".to_string(),
            message: "expected '='".to_string(),
            line: 3,
            column: 7,
        };
        assert!(formatter.format_error(&error).contains("--> pyproject.toml:3:7"));
        assert_eq!(formatter.format_warning("stale"), "warning: stale");
    }
}
