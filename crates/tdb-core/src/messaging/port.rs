use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound messaging port.
///
/// Telegram is the first implementation; the surface is the minimum the
/// dispatcher and jobs need: plain sends, in-place edits, audio attachments.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send a text message and return a reference to it.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Replace the text of a previously sent message.
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    /// Send a local audio file as a reply to `reply_to`.
    async fn send_audio(&self, reply_to: MessageRef, file: &Path, title: &str)
        -> Result<MessageRef>;
}
