mod error;
mod paths;
mod schema;
mod store;

pub use error::SessionStoreError;
pub use paths::{current_pointer_path, session_file_name, session_root};
pub use schema::{
    MessageEntry, MessageRecordType, MessageRole, SessionHeader, SessionMeta, SessionRecordType,
};
pub use store::SessionStore;
