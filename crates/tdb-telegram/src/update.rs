use chrono::Utc;
use teloxide::types::{Update, UpdateKind};

use tdb_core::domain::{ChatId, InboundMessage, MessageId, UserId};

/// Convert a raw Telegram update into the dispatcher's inbound snapshot.
///
/// Only chat messages are of interest; edits, channel posts and the rest are
/// dropped. Messages without text (stickers, photos, ...) map to an empty
/// `text` so they take the fallback path.
pub fn inbound_from_update(update: &Update) -> Option<InboundMessage> {
    let UpdateKind::Message(msg) = &update.kind else {
        return None;
    };
    let from = msg.from()?;

    Some(InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        user_id: UserId(from.id.0 as i64),
        text: msg.text().unwrap_or_default().to_string(),
        received_at: Utc::now(),
    })
}
