//! Agent 提示词构建

use crate::models::chat_model::{ChatMessage, Role};

/// 把历史拼成前言，后接本次问题
///
/// 没有历史时直接返回问题本身。
pub fn build_prompt(prompt: &str, history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return prompt.to_string();
    }

    let mut out = String::from("Previous conversation:\n\n");
    for message in history {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(message.content.trim_end());
        out.push_str("\n\n");
    }
    out.push_str("Current question: ");
    out.push_str(prompt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_history() {
        assert_eq!(build_prompt("What is this?", &[]), "What is this?");
    }

    #[test]
    fn test_with_history() {
        let history = vec![
            ChatMessage::user("What language?"),
            ChatMessage::assistant("Rust.\n"),
        ];
        let prompt = build_prompt("Which crates?", &history);
        assert_eq!(
            prompt,
            "Previous conversation:\n\nUser: What language?\n\nAssistant: Rust.\n\nCurrent question: Which crates?"
        );
    }
}
