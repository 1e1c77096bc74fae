//! The ordered turn log.
//!
//! Model turns are created empty and patched in place as streamed deltas
//! arrive. Patching is addressed by `TurnRef` (generation + index) rather
//! than by aliasing the turn, so a response that arrives after the
//! conversation was cleared is detected as stale and discarded instead of
//! resurrecting old state.

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Wire name used in collaborator history.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One exchange unit in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Index-addressed reference to a turn, stamped with the conversation
/// generation it was issued under. Invalid after a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRef {
    generation: u64,
    index: usize,
}

/// Point-in-time copy of the log, used for follow-up rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    generation: u64,
    turns: Vec<Turn>,
}

/// The ordered turn log with a generation stamp bumped on every clear.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    generation: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Append a user turn and its empty model placeholder atomically, in
    /// that order. Returns a reference to the placeholder, which must exist
    /// before any delta can arrive.
    pub fn push_exchange(&mut self, user_text: &str) -> TurnRef {
        self.turns.push(Turn {
            role: Role::User,
            text: user_text.to_string(),
        });
        self.turns.push(Turn {
            role: Role::Model,
            text: String::new(),
        });
        TurnRef {
            generation: self.generation,
            index: self.turns.len() - 1,
        }
    }

    /// Whether the referenced turn still exists in the current generation.
    pub fn contains(&self, turn: TurnRef) -> bool {
        turn.generation == self.generation && turn.index < self.turns.len()
    }

    /// Overwrite the referenced turn's text with the full accumulated
    /// string. Returns `false` (and touches nothing) for a stale reference.
    pub fn set_text(&mut self, turn: TurnRef, text: &str) -> bool {
        if !self.contains(turn) {
            return false;
        }
        self.turns[turn.index].text = text.to_string();
        true
    }

    /// Drop the referenced model placeholder, keeping the user turn that
    /// precedes it. Used when a pipeline stage fails after the exchange was
    /// appended. No-op for a stale reference.
    pub fn rollback_to_user(&mut self, turn: TurnRef) -> bool {
        if !self.contains(turn) {
            return false;
        }
        self.turns.truncate(turn.index);
        true
    }

    /// Empty the log without invalidating outstanding references.
    /// Used for error rollback before any stream was opened.
    pub fn reset_turns(&mut self) {
        self.turns.clear();
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            generation: self.generation,
            turns: self.turns.clone(),
        }
    }

    /// Restore a snapshot taken in the current generation. Returns `false`
    /// if the conversation was cleared since the snapshot was taken.
    pub fn restore(&mut self, snapshot: ConversationSnapshot) -> bool {
        if snapshot.generation != self.generation {
            return false;
        }
        self.turns = snapshot.turns;
        true
    }

    /// Empty the log and invalidate every outstanding `TurnRef`.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.generation += 1;
    }

    /// Text of the most recent model turn with non-empty text.
    pub fn latest_model_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Model && !t.text.is_empty())
            .map(|t| t.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_exchange_appends_pair_in_order() {
        let mut conv = Conversation::new();
        let turn = conv.push_exchange("hello");
        assert_eq!(conv.turns().len(), 2);
        assert_eq!(conv.turns()[0].role, Role::User);
        assert_eq!(conv.turns()[0].text, "hello");
        assert_eq!(conv.turns()[1].role, Role::Model);
        assert_eq!(conv.turns()[1].text, "");
        assert!(conv.contains(turn));
    }

    #[test]
    fn test_set_text_patches_placeholder() {
        let mut conv = Conversation::new();
        let turn = conv.push_exchange("hi");
        assert!(conv.set_text(turn, "hola"));
        assert_eq!(conv.turns()[1].text, "hola");
    }

    #[test]
    fn test_set_text_stale_after_clear() {
        let mut conv = Conversation::new();
        let turn = conv.push_exchange("hi");
        conv.clear();
        assert!(!conv.set_text(turn, "hola"));
        assert!(conv.is_empty());

        // A reference minted in the new generation works.
        let turn2 = conv.push_exchange("again");
        assert!(conv.set_text(turn2, "otra vez"));
    }

    #[test]
    fn test_rollback_to_user_keeps_user_turn() {
        let mut conv = Conversation::new();
        let turn = conv.push_exchange("hi");
        assert!(conv.rollback_to_user(turn));
        assert_eq!(conv.turns().len(), 1);
        assert_eq!(conv.turns()[0].role, Role::User);
    }

    #[test]
    fn test_restore_guarded_by_generation() {
        let mut conv = Conversation::new();
        conv.push_exchange("one");
        let snap = conv.snapshot();
        conv.push_exchange("two");
        assert!(conv.restore(snap.clone()));
        assert_eq!(conv.turns().len(), 2);

        conv.clear();
        assert!(!conv.restore(snap));
        assert!(conv.is_empty());
    }

    #[test]
    fn test_latest_model_text_skips_empty() {
        let mut conv = Conversation::new();
        assert_eq!(conv.latest_model_text(), None);
        let first = conv.push_exchange("a");
        conv.set_text(first, "alpha");
        conv.push_exchange("b"); // placeholder still empty
        assert_eq!(conv.latest_model_text(), Some("alpha"));
    }
}
