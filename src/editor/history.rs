// src/editor/history.rs

/// Linear undo/redo history. Index 0 is the original; a commit drops the redo tail.
#[derive(Debug, Clone)]
pub struct HistoryStore<T> {
    entries: Vec<T>,
    cursor: usize,
}

impl<T> Default for HistoryStore<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T> HistoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_original(original: T) -> Self {
        Self {
            entries: vec![original],
            cursor: 0,
        }
    }

    pub fn commit(&mut self, resource: T) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(resource);
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> bool {
        if self.can_undo() {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.can_redo() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Moves back to the original without discarding anything, so redo still works.
    pub fn reset_to_original(&mut self) {
        self.cursor = 0;
    }

    pub fn current(&self) -> Option<&T> {
        self.entries.get(self.cursor)
    }

    pub fn original(&self) -> Option<&T> {
        self.entries.first()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[T] {
        &self.entries
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Commit(u32),
        Undo,
        Redo,
        Reset,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => any::<u32>().prop_map(Step::Commit),
            2 => Just(Step::Undo),
            1 => Just(Step::Redo),
            1 => Just(Step::Reset),
        ]
    }

    /// Plain vector-plus-cursor model to replay against.
    fn replay_model(steps: &[Step]) -> Option<u32> {
        let mut items: Vec<u32> = Vec::new();
        let mut cursor = 0usize;
        for step in steps {
            match *step {
                Step::Commit(v) => {
                    if !items.is_empty() {
                        items.truncate(cursor + 1);
                    }
                    items.push(v);
                    cursor = items.len() - 1;
                }
                Step::Undo => cursor = cursor.saturating_sub(1),
                Step::Redo => {
                    if cursor + 1 < items.len() {
                        cursor += 1;
                    }
                }
                Step::Reset => cursor = 0,
            }
        }
        items.get(cursor).copied()
    }

    proptest! {
        #[test]
        fn matches_reference_model(steps in prop::collection::vec(step(), 0..40)) {
            let mut store = HistoryStore::new();
            for (n, step) in steps.iter().enumerate() {
                match *step {
                    Step::Commit(v) => store.commit(v),
                    Step::Undo => {
                        store.undo();
                    }
                    Step::Redo => {
                        store.redo();
                    }
                    Step::Reset => store.reset_to_original(),
                }
                prop_assert_eq!(store.current().copied(), replay_model(&steps[..=n]));
                prop_assert!(store.is_empty() || store.cursor() < store.len());
            }
        }

        #[test]
        fn commit_then_undo_returns_previous(
            seed in prop::collection::vec(any::<u32>(), 1..10),
            next in any::<u32>(),
        ) {
            let mut store = HistoryStore::new();
            for v in &seed {
                store.commit(*v);
            }
            let before = store.current().copied();
            store.commit(next);
            prop_assert!(!store.can_redo());
            prop_assert!(store.undo());
            prop_assert_eq!(store.current().copied(), before);
        }
    }
}
