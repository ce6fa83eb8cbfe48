pub mod directory;
pub mod record;

pub use directory::UserDirectory;
pub use record::{ConnectionStatus, UserRecord};
