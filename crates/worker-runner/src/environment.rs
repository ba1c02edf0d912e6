//! Environment validator seam
//!
//! The supervisor consults this before every spawn; when the environment
//! is not ready it refuses synchronously instead of launching anything.

use std::path::PathBuf;

/// Reports whether the interpreter environment is usable
pub trait EnvironmentValidator: Send + Sync {
    /// Whether workers may be spawned at all
    fn ready(&self) -> bool;

    /// Absolute path of the interpreter executable, when known
    fn interpreter_path(&self) -> Option<PathBuf>;
}

/// A fixed environment, resolved once at construction
///
/// Production wiring performs interpreter discovery elsewhere and hands the
/// result here; tests construct it directly.
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    interpreter: Option<PathBuf>,
}

impl StaticEnvironment {
    /// An environment with a known interpreter
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: Some(interpreter.into()),
        }
    }

    /// An environment with no usable interpreter
    pub fn unavailable() -> Self {
        Self { interpreter: None }
    }
}

impl EnvironmentValidator for StaticEnvironment {
    fn ready(&self) -> bool {
        self.interpreter.is_some()
    }

    fn interpreter_path(&self) -> Option<PathBuf> {
        self.interpreter.clone()
    }
}
