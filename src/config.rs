use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::diagnostics::CompileError;

pub const CONFIG_FILE: &str = "monoc.toml";

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub fn as_cranelift(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Options shared by every stage of one compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    pub opt_level: OptLevel,
    /// Run the Cranelift verifier on every function.
    pub verify: bool,
    /// Log the textual IR of the assembled module at `info` level.
    pub dump_ir: bool,
    /// Target triple for object emission. JIT execution always uses the host.
    pub target: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            verify: true,
            dump_ir: false,
            target: host_triple(),
        }
    }
}

/// Triple for the machine running the compiler.
pub fn host_triple() -> String {
    let arch = std::env::consts::ARCH;
    match std::env::consts::OS {
        "macos" => format!("{arch}-apple-darwin"),
        "windows" => format!("{arch}-pc-windows-msvc"),
        os => format!("{arch}-unknown-{os}-gnu"),
    }
}

// ---- TOML deserialization types ----

#[derive(Deserialize)]
struct TomlConfig {
    #[serde(default)]
    compile: CompileOptions,
}

impl CompileOptions {
    /// Parse a `monoc.toml` file. Only the `[compile]` table is read.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompileError::config(
                format!("{CONFIG_FILE}: could not read file: {e}"),
                path.to_path_buf(),
            )
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, CompileError> {
        let parsed: TomlConfig = toml::from_str(content).map_err(|e| {
            CompileError::config(
                format!("{CONFIG_FILE}: invalid syntax: {e}"),
                path.to_path_buf(),
            )
        })?;
        Ok(parsed.compile)
    }

    /// Walk up from `start_dir` looking for `monoc.toml`; defaults when none exists.
    pub fn discover(start_dir: &Path) -> Result<Self, CompileError> {
        match find_config(start_dir) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
