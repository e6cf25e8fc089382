// src/accumulator.rs
// Reassembles a reply's token fragments into a single growing assistant
// message at the tail of the transcript.

use crate::session::ChatMessage;

/// Tracks whether an assistant reply is currently being streamed into the
/// last transcript entry. The first fragment of a reply appends a new
/// assistant message; every later fragment appends to its content. Exactly
/// one assistant message is produced per reply.
#[derive(Debug, Default)]
pub struct TokenAccumulator {
    streaming: bool,
}

impl TokenAccumulator {
    pub fn new() -> Self {
        Self { streaming: false }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Apply one token fragment, in arrival order.
    pub fn push_fragment(&mut self, messages: &mut Vec<ChatMessage>, fragment: &str) {
        if self.streaming {
            if let Some(last) = messages.last_mut() {
                last.content.push_str(fragment);
                return;
            }
            // Transcript was cleared mid-stream; fall through and restart.
        }
        messages.push(ChatMessage::assistant(fragment));
        self.streaming = true;
    }

    /// Attach image references to the in-flight assistant message. Images
    /// arriving outside a stream have nothing to attach to and are dropped.
    pub fn attach_images(&mut self, messages: &mut Vec<ChatMessage>, images: Vec<serde_json::Value>) {
        if self.streaming {
            if let Some(last) = messages.last_mut() {
                last.images.extend(images);
            }
        }
    }

    /// Terminal signal: the reply is complete. The message stays in the
    /// transcript and is never touched again.
    pub fn finish(&mut self) {
        self.streaming = false;
    }

    /// Mid-stream error: terminate the pending reply but keep whatever
    /// partial content already arrived, then append a separate visible
    /// error message. Losing partial output here is a regression.
    pub fn fail(&mut self, messages: &mut Vec<ChatMessage>, error: &str) {
        self.streaming = false;
        messages.push(ChatMessage::assistant(format!("Error: {error}")));
    }

    /// Drop stream bookkeeping without touching the transcript (used by
    /// clear, which wipes the list itself).
    pub fn reset(&mut self) {
        self.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn fragments_concatenate_into_one_message() {
        let mut acc = TokenAccumulator::new();
        let mut messages = vec![ChatMessage::user("hello")];

        for fragment in ["Hi", " there", "!"] {
            acc.push_fragment(&mut messages, fragment);
        }
        acc.finish();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hi there!");
        assert!(!acc.is_streaming());
    }

    #[test]
    fn new_reply_starts_new_message_after_done() {
        let mut acc = TokenAccumulator::new();
        let mut messages = Vec::new();

        acc.push_fragment(&mut messages, "first");
        acc.finish();
        acc.push_fragment(&mut messages, "second");
        acc.finish();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn error_keeps_partial_content_and_appends_error_message() {
        let mut acc = TokenAccumulator::new();
        let mut messages = Vec::new();

        acc.push_fragment(&mut messages, "partial answ");
        acc.fail(&mut messages, "backend exploded");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "partial answ");
        assert_eq!(messages[1].content, "Error: backend exploded");
        assert!(!acc.is_streaming());
    }

    #[test]
    fn error_before_any_fragment_appends_only_error_message() {
        let mut acc = TokenAccumulator::new();
        let mut messages = vec![ChatMessage::user("hello")];

        acc.fail(&mut messages, "no reply");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Error: no reply");
    }

    #[test]
    fn images_attach_to_in_flight_message_only() {
        let mut acc = TokenAccumulator::new();
        let mut messages = Vec::new();

        // No stream open: dropped.
        acc.attach_images(&mut messages, vec![serde_json::json!({"url": "a.png"})]);
        assert!(messages.is_empty());

        acc.push_fragment(&mut messages, "see figure");
        acc.attach_images(&mut messages, vec![serde_json::json!({"url": "a.png"})]);
        assert_eq!(messages[0].images.len(), 1);
    }

    #[test]
    fn fragment_after_mid_stream_clear_restarts_message() {
        let mut acc = TokenAccumulator::new();
        let mut messages = Vec::new();

        acc.push_fragment(&mut messages, "abc");
        messages.clear();
        acc.push_fragment(&mut messages, "def");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "def");
    }
}
