// src/editor/variations.rs
use crate::errors::PixshopError;

/// Candidates awaiting a pick, plus where the pick should be written.
#[derive(Debug, Clone)]
pub struct VariationSet<T, A> {
    candidates: Vec<T>,
    previewed: usize,
    action: A,
}

impl<T, A> VariationSet<T, A> {
    pub fn candidates(&self) -> &[T] {
        &self.candidates
    }

    pub fn previewed(&self) -> usize {
        self.previewed
    }

    pub fn action(&self) -> &A {
        &self.action
    }
}

/// The chosen candidate with its commit action; the rest are returned for cleanup.
#[derive(Debug)]
pub struct Selection<T, A> {
    pub chosen: T,
    pub action: A,
    pub discarded: Vec<T>,
}

/// Modal pick-one step: closed until `open`, back to closed on `confirm` or `cancel`.
#[derive(Debug)]
pub struct VariationGate<T, A> {
    open: Option<VariationSet<T, A>>,
}

impl<T, A> Default for VariationGate<T, A> {
    fn default() -> Self {
        Self { open: None }
    }
}

impl<T, A> VariationGate<T, A> {
    /// Opening while already selecting replaces the current set, which is handed back.
    pub fn open(
        &mut self,
        candidates: Vec<T>,
        action: A,
    ) -> Result<Option<VariationSet<T, A>>, PixshopError> {
        if candidates.is_empty() {
            return Err(PixshopError::validation(
                "No variations were generated to choose from.",
            ));
        }
        Ok(self.open.replace(VariationSet {
            candidates,
            previewed: 0,
            action,
        }))
    }

    pub fn preview(&mut self, index: usize) -> Result<(), PixshopError> {
        let set = self.selecting_mut()?;
        if index >= set.candidates.len() {
            return Err(out_of_range(index, set.candidates.len()));
        }
        set.previewed = index;
        Ok(())
    }

    pub fn confirm(&mut self, index: usize) -> Result<Selection<T, A>, PixshopError> {
        let len = self.selecting_mut()?.candidates.len();
        if index >= len {
            return Err(out_of_range(index, len));
        }
        let VariationSet {
            mut candidates,
            action,
            ..
        } = self
            .open
            .take()
            .ok_or_else(|| PixshopError::validation("No variations are open."))?;
        let chosen = candidates.remove(index);
        Ok(Selection {
            chosen,
            action,
            discarded: candidates,
        })
    }

    pub fn cancel(&mut self) -> Option<VariationSet<T, A>> {
        self.open.take()
    }

    pub fn is_selecting(&self) -> bool {
        self.open.is_some()
    }

    pub fn current(&self) -> Option<&VariationSet<T, A>> {
        self.open.as_ref()
    }

    fn selecting_mut(&mut self) -> Result<&mut VariationSet<T, A>, PixshopError> {
        self.open
            .as_mut()
            .ok_or_else(|| PixshopError::validation("No variations are open."))
    }
}

fn out_of_range(index: usize, len: usize) -> PixshopError {
    PixshopError::validation(format!(
        "Variation {} does not exist; choose one of {}.",
        index + 1,
        len
    ))
}
