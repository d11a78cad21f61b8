// src/editor/batch.rs

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPair<T> {
    original: T,
    pub edited: T,
}

impl<T> BatchPair<T> {
    pub fn original(&self) -> &T {
        &self.original
    }
}

/// Independent (original, edited) pairs with an active cursor.
#[derive(Debug, Clone)]
pub struct BatchStore<T> {
    pairs: Vec<BatchPair<T>>,
    active: usize,
}

impl<T: Clone> BatchStore<T> {
    pub fn load(files: Vec<T>) -> Self {
        let pairs = files
            .into_iter()
            .map(|file| BatchPair {
                edited: file.clone(),
                original: file,
            })
            .collect();
        Self { pairs, active: 0 }
    }
}

impl<T> BatchStore<T> {
    /// Out-of-range indices are ignored.
    pub fn set_active(&mut self, index: usize) -> bool {
        if index < self.pairs.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    pub fn commit_edit(&mut self, resource: T) {
        let active = self.active;
        self.set_edited(active, resource);
    }

    pub fn set_edited(&mut self, index: usize, resource: T) -> bool {
        match self.pairs.get_mut(index) {
            Some(pair) => {
                pair.edited = resource;
                true
            }
            None => false,
        }
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_pair(&self) -> Option<&BatchPair<T>> {
        self.pairs.get(self.active)
    }

    pub fn pair(&self, index: usize) -> Option<&BatchPair<T>> {
        self.pairs.get(index)
    }

    pub fn pairs(&self) -> &[BatchPair<T>] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn commit_edit_changes_only_active_pair(
            len in 1usize..8,
            moves in prop::collection::vec((0usize..10, any::<bool>()), 0..30),
        ) {
            let mut store = BatchStore::load((0..len as u32).collect());
            let mut expected: Vec<u32> = (0..len as u32).collect();
            for (n, (index, commit)) in moves.into_iter().enumerate() {
                let moved = store.set_active(index);
                prop_assert_eq!(moved, index < len);
                if commit {
                    let value = 100 + n as u32;
                    store.commit_edit(value);
                    expected[store.active_index()] = value;
                }
                prop_assert!(store.active_index() < len);
            }
            for (i, pair) in store.pairs().iter().enumerate() {
                prop_assert_eq!(*pair.original(), i as u32);
                prop_assert_eq!(pair.edited, expected[i]);
            }
        }
    }
}
