//! Character-count heuristic for context size.

use crate::types::{ContentBlock, Message, ToolResultContent};

const CHARS_PER_TOKEN: usize = 4;
const MESSAGE_OVERHEAD_CHARS: usize = 4;
const BLOCK_OVERHEAD_CHARS: usize = 4;

fn json_chars(value: &serde_json::Value) -> usize {
    serde_json::to_string(value)
        .map(|s| s.chars().count())
        .unwrap_or_default()
}

fn block_chars(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text(text) => text.chars().count(),
        ContentBlock::ToolUse(tool_use) => {
            tool_use.name.chars().count() + json_chars(&tool_use.input) + tool_use.id.chars().count()
        }
        ContentBlock::ToolResult(result) => {
            let nested: usize = result
                .content
                .iter()
                .map(|content| match content {
                    ToolResultContent::Text(text) => text.chars().count(),
                    ToolResultContent::Json(value) => json_chars(value),
                })
                .sum();
            result.tool_use_id.chars().count() + nested + result.status.to_string().len()
        }
        ContentBlock::CachePoint(point) => point.kind.len(),
        ContentBlock::Extension(value) => json_chars(value),
    }
}

/// Estimated character weight of one message.
pub fn estimate_message_chars(message: &Message) -> usize {
    let role = message.role.to_string().len() + 2;
    let blocks: usize = message
        .content
        .iter()
        .map(|block| block_chars(block) + BLOCK_OVERHEAD_CHARS)
        .sum();
    role + MESSAGE_OVERHEAD_CHARS + blocks
}

/// Estimated token count of a message sequence.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_chars).sum::<usize>() / CHARS_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolResult, ToolUse};

    #[test]
    fn text_message_weight() {
        // "user" (4) + 2 + 4 overhead + "hello" (5) + 4 block overhead
        assert_eq!(estimate_message_chars(&Message::user("hello")), 19);
        assert_eq!(estimate_tokens(&[Message::user("hello")]), 4);
    }

    #[test]
    fn structured_blocks_count_their_serialized_size() {
        let tool_use = Message::new(
            Role::Assistant,
            vec![ContentBlock::ToolUse(ToolUse::new(
                "id1",
                "calc",
                serde_json::json!({"x": 1}),
            ))],
        );
        // "assistant" (9) + 2 + 4 + ("calc" 4 + {"x":1} 7 + "id1" 3) + 4
        assert_eq!(estimate_message_chars(&tool_use), 33);

        let result = Message::tool_results(vec![ToolResult::success(
            "id1",
            vec![ToolResultContent::Text("ok".into())],
        )]);
        // "user" (4) + 2 + 4 + ("id1" 3 + "ok" 2 + "success" 7) + 4
        assert_eq!(estimate_message_chars(&result), 26);
    }

    #[test]
    fn empty_history_is_zero() {
        assert_eq!(estimate_tokens(&[]), 0);
    }
}
