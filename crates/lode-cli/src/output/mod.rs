//! Terminal output formatting.
//!
//! Status lines go to stdout, errors to stderr. Logging is separate and
//! always writes to stderr.

pub mod colors;
pub mod errors;

use colors::ColorSupport;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn colors(&self) -> &ColorSupport {
        &self.colors
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.colors.red("✗"), message);
    }

    /// Print a step message with a leading marker
    pub fn step(&self, marker: &str, message: &str) {
        println!("{} {}", marker, message);
    }

    /// Print data as is
    pub fn line(&self, message: &str) {
        println!("{}", message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
