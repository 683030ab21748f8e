pub mod gemini;
pub mod sse;

use anyhow::Result;
use serde::Serialize;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for a personal insurance portal. \
Answer questions about life, disability, long term care, auto, umbrella, pet, homeowners, \
condo and renters insurance in the United States, or about earlier questions in this \
conversation. If the user asks about a specific policy and none has been provided, invite \
them to select one of their uploaded policies. Users may be new to insurance, so be \
welcoming, complete and accurate. Always remind the user to contact an insurance \
professional before making important decisions.";

pub const POLICY_INSTRUCTIONS: &str = "Use the following policy document as the primary \
source of information for the user's next question. If the answer is not in the policy, \
say so clearly. If you answer from general insurance knowledge instead, say that as well. \
Policy details always take priority over general knowledge.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

/// Everything one model call sees.
#[derive(Debug, Clone)]
pub struct TurnRequest<'a> {
    pub system: &'a str,
    pub policy_instructions: &'a str,
    pub policy_content: &'a str,
    pub history: &'a [ChatMessage],
    pub input: &'a str,
}

impl TurnRequest<'_> {
    /// Leading message that carries the instructions and the policy text.
    pub fn preamble(&self) -> String {
        format!(
            "System Instructions:\n{}\n\nPolicy Instructions:\n{}\n\nPolicy Content:\n{}",
            self.system, self.policy_instructions, self.policy_content
        )
    }
}

/// Text fragments in arrival order. An `Err` ends the turn.
pub type FragmentStream<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

pub trait ModelClient {
    fn stream<'a>(&'a self, request: &TurnRequest<'_>) -> Result<FragmentStream<'a>>;
}
