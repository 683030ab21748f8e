use std::collections::HashSet;

use crate::llm::ChatMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub human: String,
    pub ai: String,
}

/// Append-only log of completed turns.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_turn(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        self.turns.push(Turn {
            human: human.into(),
            ai: ai.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Human and ai messages in conversation order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|t| [ChatMessage::human(&t.human), ChatMessage::ai(&t.ai)])
            .collect()
    }

    /// History as handed to the model: repeated bodies collapsed to their first occurrence.
    pub fn for_model(&self) -> Vec<ChatMessage> {
        collapse_repeats(self.messages())
    }
}

/// Drops every message whose exact text appeared earlier, whatever its role.
pub fn collapse_repeats(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.content.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn messages_alternate_in_order() {
        let mut mem = ConversationMemory::new();
        mem.save_turn("hi", "hello");
        mem.save_turn("deductible?", "$500");

        let msgs = mem.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], ChatMessage::human("hi"));
        assert_eq!(msgs[3].role, Role::Ai);
        assert_eq!(msgs[3].content, "$500");
    }

    #[test]
    fn clear_empties_history() {
        let mut mem = ConversationMemory::new();
        mem.save_turn("a", "b");
        mem.clear();
        assert!(mem.is_empty());
        assert!(mem.messages().is_empty());
        assert!(mem.for_model().is_empty());
    }

    #[test]
    fn repeated_bodies_keep_first_occurrence() {
        let mut mem = ConversationMemory::new();
        mem.save_turn("what is covered?", "collision and theft");
        mem.save_turn("what is covered?", "collision and theft");
        mem.save_turn("thanks", "thanks");

        let model_view = mem.for_model();
        let texts: Vec<_> = model_view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["what is covered?", "collision and theft", "thanks"]);
        assert_eq!(model_view[2].role, Role::Human);
        // the log itself is untouched
        assert_eq!(mem.len(), 3);
    }
}
