//! File-backed conversation store.
//!
//! One pretty-printed JSON document per conversation under the data
//! directory, feedback under `feedback/`. Identifiers are validated
//! before they touch a path, so a conversation id can never escape the
//! data directory.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use palaver_core::store::{ConversationStore, StoreError};
use palaver_core::types::{Conversation, Feedback, Message};

use crate::check_id;

const FEEDBACK_DIR: &str = "feedback";

/// Stores each conversation as `<data_dir>/<id>.json`.
pub struct FileConversationStore {
    data_dir: PathBuf,
    // Serialises read-modify-write cycles; plain reads go lock-free.
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(data_dir.join(FEEDBACK_DIR))
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        info!(directory = %data_dir.display(), "initialized file store");
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    fn feedback_path(&self, feedback_id: &str) -> PathBuf {
        self.data_dir
            .join(FEEDBACK_DIR)
            .join(format!("{feedback_id}.json"))
    }

    async fn read_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        let bytes = match tokio::fs::read(self.conversation_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn write_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(conversation)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(self.conversation_path(&conversation.id), bytes)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn create(&self, entity_id: Option<String>) -> Result<Conversation, StoreError> {
        if let Some(entity_id) = &entity_id {
            check_id(entity_id)?;
        }
        let conversation = Conversation::new(entity_id);
        let _guard = self.write_lock.lock().await;
        self.write_conversation(&conversation).await?;
        debug!(conversation_id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    async fn get(&self, id: &str) -> Result<Conversation, StoreError> {
        check_id(id)?;
        self.read_conversation(id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: Message,
    ) -> Result<(), StoreError> {
        check_id(conversation_id)?;
        let _guard = self.write_lock.lock().await;
        let mut conversation = self.read_conversation(conversation_id).await?;
        conversation.push_message(message);
        self.write_conversation(&conversation).await
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        check_id(&conversation.id)?;
        let mut stored = conversation.clone();
        stored.updated_at = stored.updated_at.max(Utc::now());
        let _guard = self.write_lock.lock().await;
        self.write_conversation(&stored).await
    }

    async fn save_feedback(&self, feedback: Feedback) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&feedback)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(self.feedback_path(&feedback.id), bytes)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, FileConversationStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileConversationStore::new(dir.path()).await.expect("store");
        (dir, store)
    }

    #[tokio::test]
    async fn test_round_trips_conversation_through_disk() {
        let (_dir, store) = store().await;
        let conversation = store.create(Some("prod-1".to_string())).await.expect("create");

        store
            .append_message(&conversation.id, Message::user(&conversation.id, "hi"))
            .await
            .expect("append");

        let loaded = store.get(&conversation.id).await.expect("get");
        assert_eq!(loaded.entity_id.as_deref(), Some("prod-1"));
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "hi");
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.get("no-such-conv").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_ids_are_rejected() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.get("../../etc/passwd").await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_feedback_is_written_to_feedback_dir() {
        let (dir, store) = store().await;
        let feedback = Feedback::new("conv-1", "msg-1", 4).with_comment("helpful");
        let feedback_id = feedback.id.clone();
        store.save_feedback(feedback).await.expect("save");

        let path = dir
            .path()
            .join(FEEDBACK_DIR)
            .join(format!("{feedback_id}.json"));
        let raw = std::fs::read_to_string(path).expect("file exists");
        assert!(raw.contains("helpful"));
    }
}
