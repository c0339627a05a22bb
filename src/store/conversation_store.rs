use std::sync::Arc;

use tracing::debug;

use crate::models::Turn;

/// Ordered turn history of one unlocked session. Append-only until reset.
#[derive(Debug, Default)]
pub struct ConversationStore {
    turns: Vec<Arc<Turn>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) -> Arc<Turn> {
        let turn = Arc::new(turn);
        self.turns.push(Arc::clone(&turn));
        debug!(role = %turn.role, position = self.len(), "Appended turn");
        turn
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Cheap, ordered copy of the history; the turns themselves are shared.
    pub fn snapshot(&self) -> Vec<Arc<Turn>> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
