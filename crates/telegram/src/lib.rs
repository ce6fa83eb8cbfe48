//! Telegram front end.
//!
//! One bot serves every user; each private chat maps to one user id, one
//! wallet, and one worker process. The router polls for updates, dispatches
//! commands, and runs the credential capture dialog.

pub mod commands;
pub mod dialog;
pub mod format;
pub mod router;

pub use commands::Command;
pub use dialog::{ConversationState, DialogRegistry};
pub use router::CommandRouter;
