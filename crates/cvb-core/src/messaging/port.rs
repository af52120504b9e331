use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::TransferRoute,
    Result,
};

/// Output sink port.
///
/// Telegram is the first implementation; the shape is kept small so other
/// messengers can fit behind the same interface.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Post a new message; returns a handle for later edits.
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Edit a message in place. A transport that refuses the edit itself
    /// (as opposed to failing on the network) must surface
    /// `Error::TransportRejected` so callers can fall back to
    /// delete-and-repost.
    async fn edit(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn delete(&self, msg: MessageRef) -> Result<()>;

    /// Ship a file to the operator. The route is policy computed by the
    /// caller; executing it (normal upload vs large-file path) is the
    /// sink's concern.
    async fn send_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        display_name: &str,
        caption: &str,
        route: TransferRoute,
    ) -> Result<()>;
}
