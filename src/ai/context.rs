//! Conversation context: the append-only turn log owned by one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker prefix used when a turn is rendered into a prompt.
    pub fn prompt_prefix(self) -> &'static str {
        match self {
            Role::User => "用户",
            Role::Assistant => "机器人",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Smallest retained log: one user turn plus its reply.
pub const MIN_CONTEXT_TURNS: usize = 2;

/// Ordered turn log keeping the most recent `capacity` turns. There is no
/// removal API: old turns only fall off the front, and `total()` counts every
/// turn ever pushed.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: Vec<Turn>,
    capacity: usize,
    total: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::with_capacity(usize::MAX)
    }
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: Vec::new(),
            capacity: capacity.max(MIN_CONTEXT_TURNS),
            total: 0,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.total += 1;
        if self.turns.len() > self.capacity {
            let excess = self.turns.len() - self.capacity;
            self.turns.drain(..excess);
        }
    }

    /// Turns currently retained.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Turns pushed over the session's lifetime.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The most recent `n` turns, oldest first.
    pub fn window(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn window_returns_latest_turns_in_order() {
        let mut ctx = ConversationContext::new();
        for i in 0..5 {
            ctx.push(Turn::user(format!("u{i}")));
            ctx.push(Turn::assistant(format!("a{i}")));
        }
        let texts: Vec<_> = ctx.window(3).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a3", "u4", "a4"]);
        assert_eq!(ctx.window(100).len(), 10, "oversized window yields everything");
        assert!(ctx.window(0).is_empty());
    }

    #[test]
    fn prompt_prefixes() {
        assert_eq!(Role::User.prompt_prefix(), "用户");
        assert_eq!(Role::Assistant.prompt_prefix(), "机器人");
    }

    #[test]
    fn capacity_drops_oldest_turns_and_keeps_counting() {
        let mut ctx = ConversationContext::with_capacity(4);
        for i in 0..5 {
            ctx.push(Turn::user(format!("u{i}")));
            ctx.push(Turn::assistant(format!("a{i}")));
        }
        let texts: Vec<_> = ctx.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["u3", "a3", "u4", "a4"]);
        assert_eq!(ctx.len(), 4);
        assert_eq!(ctx.total(), 10);
        assert_eq!(ConversationContext::with_capacity(0).capacity(), MIN_CONTEXT_TURNS);
    }

    proptest! {
        #[test]
        fn retained_turns_are_the_newest_suffix(
            texts in proptest::collection::vec(".{0,8}", 1..40),
            capacity in 2usize..12,
        ) {
            let mut ctx = ConversationContext::with_capacity(capacity);
            let mut pushed: Vec<Turn> = Vec::new();
            for text in texts {
                let turn = Turn::user(text);
                ctx.push(turn.clone());
                pushed.push(turn);
                prop_assert_eq!(ctx.total(), pushed.len());
                prop_assert_eq!(ctx.len(), pushed.len().min(capacity));
                prop_assert_eq!(ctx.turns(), &pushed[pushed.len() - ctx.len()..]);
            }
        }
    }
}
