use crate::location::SourceLocation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Unsupported construct: {msg}")]
    Unsupported { msg: String, location: SourceLocation },

    #[error("Ambiguous type: {msg}")]
    AmbiguousType {
        msg: String,
        location: SourceLocation,
        /// Locations of the conflicting candidates.
        trail: Vec<SourceLocation>,
    },

    #[error("Internal compiler error: {msg}")]
    Logic { msg: String },

    #[error("Codegen error: {msg}")]
    Codegen { msg: String },

    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },

    #[error("I/O error: {msg}")]
    Io { msg: String },
}

impl CompileError {
    pub fn unsupported(msg: impl Into<String>, location: SourceLocation) -> Self {
        Self::Unsupported { msg: msg.into(), location }
    }

    pub fn ambiguous(
        msg: impl Into<String>,
        location: SourceLocation,
        trail: Vec<SourceLocation>,
    ) -> Self {
        Self::AmbiguousType { msg: msg.into(), location, trail }
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self::Logic { msg: msg.into() }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io { msg: msg.into() }
    }

    /// The primary source location, when the error is tied to user code.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Unsupported { location, .. } | Self::AmbiguousType { location, .. } => {
                Some(location)
            }
            _ => None,
        }
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic { .. })
    }
}

/// Render a CompileError with its location trail for terminal output.
pub fn render_error(err: &CompileError) -> String {
    let mut out = String::new();
    match err {
        CompileError::Unsupported { msg, location } => {
            out.push_str(&format!("error[unsupported]: {msg}\n"));
            out.push_str(&format!("  --> {location}\n"));
        }
        CompileError::AmbiguousType { msg, location, trail } => {
            out.push_str(&format!("error[ambiguous-type]: {msg}\n"));
            out.push_str(&format!("  --> {location}\n"));
            for candidate in trail {
                out.push_str(&format!("   = candidate from {candidate}\n"));
            }
        }
        CompileError::Logic { msg } => {
            out.push_str(&format!("error[internal]: {msg}\n"));
            out.push_str("  = note: this is a compiler bug\n");
        }
        CompileError::Codegen { msg } | CompileError::Io { msg } => {
            out.push_str(&format!("error: {msg}\n"));
        }
        CompileError::Config { msg, path } => {
            out.push_str(&format!("error[config]: {msg}\n"));
            out.push_str(&format!("  --> {}\n", path.display()));
        }
    }
    out
}
