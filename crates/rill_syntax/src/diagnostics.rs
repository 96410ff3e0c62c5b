//! Diagnostics (errors, warnings) with token spans.

use crate::span::TokenSpan;
use std::fmt;

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub span: Option<TokenSpan>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Recoverable: recorded, resolution continues.
    Error,
    Warning,
    /// Aborts the pass that raised it; no output is produced.
    Critical,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Option<TokenSpan>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            span,
        }
    }

    pub fn warning(message: impl Into<String>, span: Option<TokenSpan>) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
            span,
        }
    }

    pub fn critical(message: impl Into<String>, span: Option<TokenSpan>) -> Self {
        Self {
            level: Level::Critical,
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Critical => "critical error",
        };
        if let Some(span) = &self.span {
            write!(
                f,
                "{} at tokens {}..{}: {}",
                level, span.start, span.end, self.message
            )
        } else {
            write!(f, "{}: {}", level, self.message)
        }
    }
}
