use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a value site lives in the source program.
///
/// `detail` names the slot being typed ("arg 1 type", "return type", "local `n`"),
/// so an inference error can point at the exact construct without the IR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub detail: String,
}

impl SourceLocation {
    pub fn new(
        function: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
            detail: detail.into(),
        }
    }

    /// Location for values that do not originate in user code (builtins, entry arguments).
    pub fn synthetic(detail: impl Into<String>) -> Self {
        Self::new("<builtin>", "<builtin>", 0, detail)
    }

    pub fn with_detail(&self, detail: impl Into<String>) -> Self {
        Self { detail: detail.into(), ..self.clone() }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} in {}", self.file, self.line, self.function)?;
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}
