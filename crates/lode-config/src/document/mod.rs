//! TOML document parsing with error locations

use serde::de::DeserializeOwned;
use toml_edit::DocumentMut;

use lode_core::error::LodeError;

use crate::ConfigResult;

/// Parse a TOML document, keeping formatting for later edits
pub fn parse_document(content: &str, file: &str) -> ConfigResult<DocumentMut> {
    content.parse::<DocumentMut>().map_err(|e| {
        let (line, column) = e
            .span()
            .map(|span| line_column(content, span.start))
            .unwrap_or((0, 0));
        LodeError::TomlParse {
            file: file.to_string(),
            message: e.message().trim().to_string(),
            line,
            column,
        }
    })
}

/// Check syntax, then decode into a typed structure
pub fn decode<T: DeserializeOwned>(content: &str, file: &str) -> ConfigResult<T> {
    // First try with toml_edit for better error reporting
    parse_document(content, file)?;

    toml::from_str(content).map_err(|e| {
        let (line, column) = e
            .span()
            .map(|span| line_column(content, span.start))
            .unwrap_or((0, 0));
        LodeError::TomlParse {
            file: file.to_string(),
            message: e.message().trim().to_string(),
            line,
            column,
        }
    })
}

/// 1-based line and column of a byte offset
pub fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;
    (line, column)
}
