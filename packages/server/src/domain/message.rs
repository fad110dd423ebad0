//! Chat message value.

use chrono::{DateTime, Utc};
use hiroba_shared::time::{Clock, SystemClock};

use super::{ChatError, Participant, sanitize};

/// Maximum content length in Unicode code points before truncation
pub const MAX_MESSAGE_CHARS: usize = 256;

/// Appended to content cut at [`MAX_MESSAGE_CHARS`]
pub const TRUNCATION_MARKER: &str = "...";

/// An immutable chat message.
///
/// Construction runs, in order: trim, reject empty, truncate, emoji
/// shortcode expansion, profanity masking, timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    author: Participant,
    content: String,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped with the system clock
    pub fn new(author: Participant, raw_content: &str) -> Result<Self, ChatError> {
        Self::new_with_clock(author, raw_content, &SystemClock)
    }

    pub fn new_with_clock(
        author: Participant,
        raw_content: &str,
        clock: &dyn Clock,
    ) -> Result<Self, ChatError> {
        let trimmed = raw_content.trim();
        if trimmed.is_empty() {
            return Err(ChatError::MessageEmpty);
        }

        let content = truncate(trimmed);
        let content = sanitize::expand_shortcodes(&content);
        let content = sanitize::mask_profanity(&content);

        Ok(Self {
            author,
            content,
            created_at: clock.now(),
        })
    }

    pub fn author(&self) -> &Participant {
        &self.author
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn truncate(content: &str) -> String {
    match content.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => format!("{}{}", &content[..cut], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}
