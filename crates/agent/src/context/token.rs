//! Token estimation utilities.
//!
//! Character-based heuristic: content costs one token per three characters,
//! tool-call arguments one per two characters plus the function name, and
//! every message carries four tokens of framing overhead. Counts are in
//! characters, not bytes, so CJK text is not overcounted.

use steward_core::message::Message;

/// Framing overhead per message (role, delimiters).
pub const MESSAGE_OVERHEAD: usize = 4;

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate the token count for a single message.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let calls: usize = message
        .tool_calls()
        .iter()
        .map(|c| char_len(&c.arguments) / 2 + char_len(&c.name))
        .sum();
    char_len(message.content()) / 3 + calls + MESSAGE_OVERHEAD
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Characters a message contributes to the truncation budget.
pub fn message_chars(message: &Message) -> usize {
    char_len(message.content())
        + message
            .tool_calls()
            .iter()
            .map(|c| char_len(&c.arguments) + char_len(&c.name))
            .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::message::ToolCallRequest;

    #[test]
    fn empty_message_is_overhead_only() {
        assert_eq!(estimate_message_tokens(&Message::assistant("")), 4);
    }

    #[test]
    fn content_divides_by_three() {
        // 9 chars → 3 tokens + 4 overhead
        assert_eq!(estimate_message_tokens(&Message::user("123456789")), 7);
        // 10 chars rounds down
        assert_eq!(estimate_message_tokens(&Message::user("0123456789")), 7);
    }

    #[test]
    fn tool_calls_are_counted() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCallRequest::new("c1", "file_read", r#"{"path":"a"}"#)],
        );
        // args 12 chars → 6, name 9, overhead 4
        assert_eq!(estimate_message_tokens(&msg), 19);
        assert_eq!(message_chars(&msg), 21);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(char_len("你好世界"), 4);
        assert_eq!(estimate_message_tokens(&Message::user("你好世界你好")), 6);
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![Message::user("hello!"), Message::assistant("world!")];
        assert_eq!(estimate_messages_tokens(&msgs), 12);
    }
}
