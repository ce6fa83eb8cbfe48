//! Lifecycle supervision for per-user trading worker processes.
//!
//! Each user gets at most one worker process. The supervisor spawns them,
//! watches for unexpected exits, runs one-shot worker subcommands, and tears
//! everything down on shutdown.

pub mod exec;
pub mod instance;
pub mod supervisor;

pub use exec::{ExecError, ExecOutput};
pub use instance::WorkerStatus;
pub use supervisor::{SupervisorSettings, WorkerSupervisor};
