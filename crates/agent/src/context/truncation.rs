//! Round-based truncation.
//!
//! A round starts at a user message and runs up to the next one. Rounds are
//! kept or dropped whole, newest first, so a tool result never loses the
//! assistant message that requested it. A final structural pass repairs
//! anything that still breaks the assistant/tool pairing.

use steward_core::message::{Message, ToolCallRequest};
use tracing::{info, warn};

use super::token::{char_len, estimate_message_tokens, estimate_messages_tokens, message_chars};

/// Share of the context window the returned history may fill.
pub const SAFETY_MARGIN: f64 = 0.95;

/// Token ceiling after the safety margin.
pub fn window_limit(max_tokens: usize) -> usize {
    (max_tokens as f64 * SAFETY_MARGIN) as usize
}

/// The full history when it fits `max_tokens`, otherwise a truncated copy.
pub fn fit_to_window(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    let limit = window_limit(max_tokens);
    let estimated = estimate_messages_tokens(messages);
    if estimated <= limit {
        return messages.to_vec();
    }
    warn!(estimated, limit, "History exceeds the context window, truncating");
    truncate(messages, limit)
}

/// Keep the leading system message and as many whole recent rounds as fit
/// both `token_limit` and a character budget of twice that. Never fails;
/// when even the system message is too large, only it is returned.
pub fn truncate(messages: &[Message], token_limit: usize) -> Vec<Message> {
    let (system, rest) = split_system(messages);

    let char_budget = token_limit.saturating_mul(2);
    let system_chars = system.map_or(0, |m| char_len(m.content()));
    let system_tokens = system.map_or(0, estimate_message_tokens);

    let mut kept: Vec<&[Message]> = Vec::new();
    if system_chars <= char_budget && system_tokens <= token_limit {
        let mut remaining_chars = char_budget - system_chars;
        let mut remaining_tokens = token_limit - system_tokens;

        for round in group_rounds(rest).into_iter().rev() {
            let chars: usize = round.iter().map(message_chars).sum();
            let tokens = estimate_messages_tokens(round);
            if chars > remaining_chars || tokens > remaining_tokens {
                break;
            }
            remaining_chars -= chars;
            remaining_tokens -= tokens;
            kept.push(round);
        }
    }

    let mut result: Vec<Message> = system.into_iter().cloned().collect();
    for round in kept.into_iter().rev() {
        result.extend_from_slice(round);
    }

    let dropped = messages.len() - result.len();
    if dropped > 0 {
        info!(dropped, kept = result.len(), "Dropped old messages to fit the context window");
    }

    validate_structure(result)
}

/// Split history into rounds. Messages before the first user message form
/// a round of their own.
pub fn group_rounds(messages: &[Message]) -> Vec<&[Message]> {
    let mut rounds = Vec::new();
    let mut start = 0;
    for (i, msg) in messages.iter().enumerate() {
        if msg.is_user() && i > start {
            rounds.push(&messages[start..i]);
            start = i;
        }
    }
    if start < messages.len() {
        rounds.push(&messages[start..]);
    }
    rounds
}

/// Repair the assistant/tool pairing:
/// * drop leading messages that are neither system nor user;
/// * after an assistant message with tool calls, keep only the tool
///   messages that answer one of its calls, once each;
/// * strip calls nobody answered, and drop the assistant message when
///   nothing (no calls, no text) is left;
/// * drop tool messages with no requesting assistant message.
pub fn validate_structure(messages: Vec<Message>) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut iter = messages.into_iter().peekable();

    while let Some(msg) = iter.next() {
        if out.is_empty() && !(msg.is_system() || msg.is_user()) {
            continue;
        }
        match msg {
            Message::AssistantToolCalls {
                content,
                tool_calls,
            } => {
                let mut results: Vec<Message> = Vec::new();
                while let Some(next) = iter.next_if(|m| matches!(m, Message::Tool { .. })) {
                    let answers = next.tool_call_id().is_some_and(|id| {
                        tool_calls.iter().any(|c| c.id == id)
                            && !results.iter().any(|r| r.tool_call_id() == Some(id))
                    });
                    if answers {
                        results.push(next);
                    }
                }

                let answered: Vec<ToolCallRequest> = tool_calls
                    .into_iter()
                    .filter(|c| results.iter().any(|r| r.tool_call_id() == Some(c.id.as_str())))
                    .collect();

                if !answered.is_empty() {
                    out.push(Message::assistant_with_tool_calls(content, answered));
                    out.extend(results);
                } else if !content.is_empty() {
                    out.push(Message::assistant(content));
                }
            }
            Message::Tool { .. } => {}
            other => out.push(other),
        }
    }
    out
}

/// Evict whole rounds, oldest first, until at most `cap` messages remain
/// (the system message included). The newest round is always kept so the
/// turn in progress survives. Returns the number of evicted messages.
pub fn enforce_message_cap(messages: &mut Vec<Message>, cap: usize) -> usize {
    if messages.len() <= cap {
        return 0;
    }

    let (system, rest) = split_system(messages);
    let target = cap.saturating_sub(usize::from(system.is_some()));

    let rounds = group_rounds(rest);
    let mut count = 0;
    let mut keep_from = rounds.len();
    for (i, round) in rounds.iter().enumerate().rev() {
        let is_newest = i + 1 == rounds.len();
        if !is_newest && count + round.len() > target {
            break;
        }
        count += round.len();
        keep_from = i;
    }

    let mut kept: Vec<Message> = system.into_iter().cloned().collect();
    for round in &rounds[keep_from..] {
        kept.extend_from_slice(round);
    }

    let evicted = messages.len() - kept.len();
    *messages = kept;
    evicted
}

fn split_system(messages: &[Message]) -> (Option<&Message>, &[Message]) {
    match messages.split_first() {
        Some((first, rest)) if first.is_system() => (Some(first), rest),
        _ => (None, messages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "shell_run", "{}")
    }

    /// user, assistant(call), tool, assistant: one complete tool round.
    fn tool_round(n: usize, filler: &str) -> Vec<Message> {
        let id = format!("call_{n}");
        vec![
            Message::user(format!("question {n} {filler}")),
            Message::assistant_with_tool_calls("", vec![call(&id)]),
            Message::tool_result(&id, format!("output {n} {filler}")),
            Message::assistant(format!("answer {n} {filler}")),
        ]
    }

    fn history(rounds: usize, filler: &str) -> Vec<Message> {
        let mut msgs = vec![Message::system("You are helpful.")];
        for n in 0..rounds {
            msgs.extend(tool_round(n, filler));
        }
        msgs
    }

    fn assert_paired(messages: &[Message]) {
        for (i, msg) in messages.iter().enumerate() {
            if let Some(id) = msg.tool_call_id() {
                let owner = messages[..i]
                    .iter()
                    .rev()
                    .take_while(|m| !m.is_user())
                    .find(|m| m.tool_calls().iter().any(|c| c.id == id));
                assert!(owner.is_some(), "orphan tool message {id}");
            }
        }
    }

    #[test]
    fn fitting_history_is_returned_unchanged() {
        let msgs = history(2, "");
        assert_eq!(fit_to_window(&msgs, 100_000), msgs);
    }

    #[test]
    fn truncation_respects_budget_and_structure() {
        let filler = "x".repeat(300);
        let msgs = history(10, &filler);
        let limit = 1_000;
        let out = fit_to_window(&msgs, limit);

        assert!(out.len() < msgs.len());
        assert!(estimate_messages_tokens(&out) <= window_limit(limit));
        assert!(out[0].is_system());
        assert!(out[1].is_user());
        assert_paired(&out);
    }

    #[test]
    fn rounds_are_never_split() {
        let filler = "y".repeat(200);
        let msgs = history(8, &filler);
        let out = truncate(&msgs, 900);

        let kept = group_rounds(&out[1..]);
        assert!(!kept.is_empty());
        for round in kept {
            assert_eq!(round.len(), 4);
            let original = group_rounds(&msgs[1..])
                .into_iter()
                .find(|r| r[0] == round[0])
                .unwrap();
            assert_eq!(original, round);
        }
        // the newest round survives
        assert_eq!(out.last(), msgs.last());
    }

    #[test]
    fn oversized_system_prompt_stands_alone() {
        let mut msgs = vec![Message::system("s".repeat(10_000))];
        msgs.extend(tool_round(0, ""));
        let out = truncate(&msgs, 100);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_system());
    }

    #[test]
    fn truncation_without_system_message() {
        let filler = "z".repeat(500);
        let msgs: Vec<Message> = history(5, &filler).into_iter().skip(1).collect();
        let out = truncate(&msgs, 800);
        assert!(!out.is_empty());
        assert!(out[0].is_user());
    }

    #[test]
    fn group_rounds_starts_at_user() {
        let msgs = vec![
            Message::assistant("stray"),
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        let rounds = group_rounds(&msgs);
        assert_eq!(rounds.len(), 3);
        assert_eq!(rounds[0].len(), 1);
        assert_eq!(rounds[1].len(), 2);
        assert!(group_rounds(&[]).is_empty());
    }

    #[test]
    fn validate_drops_leading_and_orphans() {
        let msgs = vec![
            Message::tool_result("ghost", "x"),
            Message::assistant("leading"),
            Message::user("hi"),
            Message::tool_result("ghost", "orphan"),
            Message::assistant("hello"),
        ];
        let out = validate_structure(msgs);
        assert_eq!(out, vec![Message::user("hi"), Message::assistant("hello")]);
    }

    #[test]
    fn validate_strips_unanswered_calls() {
        let msgs = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls("thinking", vec![call("a"), call("b")]),
            Message::tool_result("a", "done"),
            Message::tool_result("zzz", "mismatched"),
            Message::tool_result("a", "duplicate"),
        ];
        let out = validate_structure(msgs);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].tool_calls().len(), 1);
        assert_eq!(out[1].tool_calls()[0].id, "a");
        assert_eq!(out[2].content(), "done");
    }

    #[test]
    fn validate_drops_empty_unanswered_assistant() {
        let msgs = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls("", vec![call("a")]),
            Message::user("again"),
            Message::assistant_with_tool_calls("let me check", vec![call("b")]),
        ];
        let out = validate_structure(msgs);
        assert_eq!(
            out,
            vec![
                Message::user("go"),
                Message::user("again"),
                Message::assistant("let me check"),
            ]
        );
    }

    #[test]
    fn message_cap_evicts_whole_rounds() {
        let mut msgs = history(5, "");
        assert_eq!(msgs.len(), 21);
        let evicted = enforce_message_cap(&mut msgs, 10);
        // system + two rounds of four
        assert_eq!(msgs.len(), 9);
        assert_eq!(evicted, 12);
        assert!(msgs[0].is_system());
        assert_eq!(msgs[1].content(), "question 3 ");
        assert_paired(&msgs);
    }

    #[test]
    fn message_cap_keeps_newest_round() {
        let mut msgs = vec![Message::system("s"), Message::user("old")];
        msgs.push(Message::user("now"));
        for n in 0..6 {
            let id = format!("c{n}");
            msgs.push(Message::assistant_with_tool_calls("", vec![call(&id)]));
            msgs.push(Message::tool_result(&id, "ok"));
        }
        enforce_message_cap(&mut msgs, 5);
        assert_eq!(msgs.len(), 14);
        assert_eq!(msgs[1].content(), "now");

        let mut small = history(1, "");
        assert_eq!(enforce_message_cap(&mut small, 100), 0);
    }
}
