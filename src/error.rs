//! Rx Error Handling
//!
//! Provides human-readable error messages with source locations and suggestions.

use colored::Colorize;
use std::fmt;

/// Source location for error reporting
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub snippet: Option<String>,
}

impl SourceLocation {
    pub fn new(file: &str, line: usize, column: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
            column,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: &str) -> Self {
        self.snippet = Some(snippet.to_string());
        self
    }
}

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Name,
    Arity,
    Type,
    Mutability,
    ControlFlow,
    Internal,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Name => "NameError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Mutability => "MutabilityError",
            ErrorKind::ControlFlow => "ControlFlowError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Io => "IoError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Rx
#[derive(Debug, Clone)]
pub struct RxError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub suggestion: Option<String>,
}

impl RxError {
    pub fn new(kind: ErrorKind, message: &str, location: Option<SourceLocation>) -> Self {
        Self {
            kind,
            message: message.to_string(),
            location,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestion = Some(suggestion.to_string());
        self
    }

    /// Attach the file name and the offending source line.
    ///
    /// Passes report positions only; the driver knows which file they came from.
    pub fn with_source(mut self, file: &str, source: &str) -> Self {
        if let Some(loc) = self.location.as_mut() {
            if loc.file.is_empty() {
                loc.file = file.to_string();
            }
            if let Some(line) = source.lines().nth(loc.line.saturating_sub(1)) {
                loc.snippet = Some(line.to_string());
            }
        }
        self
    }

    // Common error constructors
    pub fn syntax_error(message: &str, location: SourceLocation) -> Self {
        Self::new(ErrorKind::Syntax, message, Some(location))
    }

    pub fn name_error(message: &str, location: Option<SourceLocation>) -> Self {
        Self::new(ErrorKind::Name, message, location)
    }

    pub fn type_error(message: &str, location: Option<SourceLocation>) -> Self {
        Self::new(ErrorKind::Type, message, location)
    }

    pub fn io_error(message: &str) -> Self {
        Self::new(ErrorKind::Io, message, None)
    }
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!("error[{}]", self.kind);
        writeln!(f, "{}: {}", header.red().bold(), self.message)?;

        if let Some(ref loc) = self.location {
            writeln!(
                f,
                "  {} {}:{}:{}",
                "-->".blue().bold(),
                loc.file,
                loc.line,
                loc.column
            )?;

            if let Some(ref snippet) = loc.snippet {
                let gutter = format!("{:3} |", loc.line);
                writeln!(f, "    {}", "|".blue().bold())?;
                writeln!(f, " {} {}", gutter.blue().bold(), snippet)?;

                // Caret under the offending column
                let padding = " ".repeat(loc.column.saturating_sub(1));
                writeln!(f, "    {} {}{}", "|".blue().bold(), padding, "^".red().bold())?;
            }
        }

        if let Some(ref suggestion) = self.suggestion {
            writeln!(f)?;
            writeln!(f, "{}: {}", "help".green().bold(), suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for RxError {}

/// Result type alias for Rx operations
pub type RxResult<T> = Result<T, RxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_source_fills_snippet() {
        let err = RxError::type_error("mismatch", Some(SourceLocation::new("", 2, 5)))
            .with_source("main.rx", "fn main() {\n    let x: bool = 1;\n}");

        let loc = err.location.unwrap();
        assert_eq!(loc.file, "main.rx");
        assert_eq!(loc.snippet.as_deref(), Some("    let x: bool = 1;"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::Mutability.as_str(), "MutabilityError");
        assert_eq!(ErrorKind::ControlFlow.to_string(), "ControlFlowError");
    }

    #[test]
    fn test_display_contains_parts() {
        colored::control::set_override(false);
        let err = RxError::name_error("Undefined Name: Foo", Some(SourceLocation::new("a.rx", 1, 8)))
            .with_suggestion("declare `struct Foo` first");
        let text = err.to_string();

        assert!(text.contains("error[NameError]: Undefined Name: Foo"));
        assert!(text.contains("a.rx:1:8"));
        assert!(text.contains("help: declare `struct Foo` first"));
    }
}
