//! Worker Runner - process supervision for external data workers
//!
//! This crate owns the lifecycle of the untrusted interpreter processes
//! that perform the actual computation (file introspection, plotting).
//! It guarantees that every spawned process is tracked by operation id,
//! can be aborted as a whole process group, and is classified into a
//! typed result or a typed error exactly once.

mod classify;
mod environment;
mod error;
mod handlers;
mod supervisor;

pub use classify::classify;
pub use environment::{EnvironmentValidator, StaticEnvironment};
pub use error::{Result, SupervisorError};
pub use handlers::{WorkerCommandHandler, WorkerScripts};
pub use supervisor::{SpawnRequest, SupervisorConfig, WorkerSupervisor};
