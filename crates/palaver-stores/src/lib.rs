//! Conversation store implementations.
//!
//! This crate implements the `palaver-core` store contract:
//! - [`InMemoryConversationStore`]: development/testing reference with
//!   deep-copy reads
//! - [`FileConversationStore`]: one JSON document per conversation

mod file;
mod memory;

pub use file::FileConversationStore;
pub use memory::InMemoryConversationStore;

use palaver_core::store::StoreError;
use palaver_core::types::validate_id;

fn check_id(id: &str) -> Result<(), StoreError> {
    validate_id(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}
