//! Prompt composition.
//!
//! A fixed system framing followed by four labeled sections, always in this
//! order and always present, even when empty:
//!
//! ```text
//! Conversation History:
//! Knowledge Base:
//! User's Current Question:
//! Response:
//! ```

/// Built-in assistant framing.
pub const DEFAULT_FRAMING: &str = "\
You are a knowledgeable technical assistant for software and backend development.

Guidelines:
- Answer concisely and accurately, in Markdown.
- Prefer the Knowledge Base below; supplement it with your own reasoning when it is incomplete.
- Use the conversation history to resolve follow-up questions and avoid repeating earlier answers.
- Include a short example or code snippet when it helps.
- If the question is ambiguous, ask for clarification.";

/// Pure, deterministic prompt builder.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    framing: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self {
            framing: DEFAULT_FRAMING.to_string(),
        }
    }
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in framing.
    pub fn with_framing(framing: impl Into<String>) -> Self {
        Self {
            framing: framing.into(),
        }
    }

    pub fn framing(&self) -> &str {
        &self.framing
    }

    /// Embed the three inputs verbatim into their labeled sections.
    pub fn compose(
        &self,
        conversation_context: &str,
        knowledge_context: &str,
        question: &str,
    ) -> String {
        format!(
            "{framing}\n\n\
             Conversation History:\n{conversation_context}\n\n\
             Knowledge Base:\n{knowledge_context}\n\n\
             User's Current Question:\n{question}\n\n\
             Response:\n",
            framing = self.framing.trim_end(),
        )
    }
}
