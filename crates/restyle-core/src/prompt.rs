//! Chat prompt templates.
//!
//! The worker holds no conversation state, so every generation renders the
//! full message list into the delimiter format the target model was tuned on.

use serde::{Deserialize, Serialize};

use crate::state::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// `<|im_start|>role ... <|im_end|>` (Qwen, SmolLM, Phi-3.5).
    #[default]
    ChatMl,
    /// Llama 3 header/eot markers.
    Llama3,
    /// `<|role|> ... </s>` (Zephyr, TinyLlama).
    Zephyr,
}

impl ChatTemplate {
    /// Render the conversation and open an assistant turn.
    pub fn apply(&self, messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();

        match self {
            ChatTemplate::ChatMl => {
                for msg in messages {
                    prompt.push_str("<|im_start|>");
                    prompt.push_str(msg.role.as_str());
                    prompt.push('\n');
                    prompt.push_str(&msg.content);
                    prompt.push_str("<|im_end|>\n");
                }
                prompt.push_str("<|im_start|>assistant\n");
            }
            ChatTemplate::Llama3 => {
                prompt.push_str("<|begin_of_text|>");
                for msg in messages {
                    prompt.push_str("<|start_header_id|>");
                    prompt.push_str(msg.role.as_str());
                    prompt.push_str("<|end_header_id|>\n\n");
                    prompt.push_str(&msg.content);
                    prompt.push_str("<|eot_id|>");
                }
                prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
            }
            ChatTemplate::Zephyr => {
                for msg in messages {
                    prompt.push_str(&format!("<|{}|>\n", msg.role.as_str()));
                    prompt.push_str(&msg.content);
                    prompt.push_str("</s>\n");
                }
                prompt.push_str("<|assistant|>\n");
            }
        }

        prompt
    }

    /// Markers that end an assistant turn; generation stops on any of them.
    pub fn stop_sequences(&self) -> Vec<String> {
        let stops: &[&str] = match self {
            ChatTemplate::ChatMl => &["<|im_end|>", "<|im_start|>"],
            ChatTemplate::Llama3 => &["<|eot_id|>", "<|start_header_id|>"],
            ChatTemplate::Zephyr => &["</s>", "<|user|>"],
        };
        stops.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("make it blue"),
        ]
    }

    #[test]
    fn test_chatml() {
        let prompt = ChatTemplate::ChatMl.apply(&conversation());
        assert_eq!(
            prompt,
            "<|im_start|>system\nBe brief.<|im_end|>\n\
             <|im_start|>user\nhello<|im_end|>\n\
             <|im_start|>assistant\nhi<|im_end|>\n\
             <|im_start|>user\nmake it blue<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_llama3_opens_assistant_turn() {
        let prompt = ChatTemplate::Llama3.apply(&conversation());
        assert!(prompt.starts_with("<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\nBe brief.<|eot_id|>"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn test_zephyr_keeps_order() {
        let prompt = ChatTemplate::Zephyr.apply(&conversation());
        let hello = prompt.find("hello").unwrap();
        let blue = prompt.find("make it blue").unwrap();
        assert!(hello < blue);
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn test_empty_history_still_opens_turn() {
        assert_eq!(ChatTemplate::ChatMl.apply(&[]), "<|im_start|>assistant\n");
    }
}
