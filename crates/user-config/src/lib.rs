pub mod merge;
pub mod store;

pub use merge::merge_documents;
pub use store::{ConfigStoreError, Credential, UserConfigStore};
