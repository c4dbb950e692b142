//! Terminal colour detection.
//!
//! Colours are used only when both output streams are terminals and
//! `NO_COLOR` is unset.

use std::env;
use std::io::{self, IsTerminal};

/// Colour support detection and formatting
#[derive(Debug, Clone, Copy)]
pub struct ColorSupport {
    enabled: bool,
}

impl ColorSupport {
    /// Detect colour support from the environment
    pub fn detect() -> Self {
        Self {
            enabled: Self::should_use_colors(env::var_os("NO_COLOR").is_some()),
        }
    }

    /// Never colour
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn should_use_colors(no_color: bool) -> bool {
        !no_color && io::stderr().is_terminal() && io::stdout().is_terminal()
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    pub fn green(&self, text: &str) -> String {
        self.paint("32", text)
    }

    pub fn yellow(&self, text: &str) -> String {
        self.paint("33", text)
    }

    pub fn red(&self, text: &str) -> String {
        self.paint("31", text)
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    /// Dim/gray text
    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}
