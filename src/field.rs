use std::sync::{Arc, RwLock};

use crate::form::{FieldKey, FormResult, read_lock, write_lock};
use crate::signal::ChangeSignal;

/// Per-field state handle. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct FormField {
    inner: Arc<FieldInner>,
}

struct FieldInner {
    key: FieldKey,
    signal: Arc<ChangeSignal>,
    state: RwLock<FieldState>,
}

#[derive(Default)]
struct FieldState {
    errors: Vec<String>,
    error_reported: bool,
}

impl FormField {
    pub(crate) fn new(key: FieldKey, signal: Arc<ChangeSignal>) -> Self {
        Self {
            inner: Arc::new(FieldInner {
                key,
                signal,
                state: RwLock::new(FieldState::default()),
            }),
        }
    }

    pub fn key(&self) -> FieldKey {
        self.inner.key
    }

    /// True once the owning form's change signal has reported this key since
    /// the last reset.
    pub fn is_dirty(&self) -> bool {
        self.inner.signal.contains(self.inner.key)
    }

    pub fn errors(&self) -> FormResult<Vec<String>> {
        Ok(read_lock(&self.inner.state, "reading field errors")?
            .errors
            .clone())
    }

    pub fn has_error(&self) -> FormResult<bool> {
        Ok(!read_lock(&self.inner.state, "checking field error state")?
            .errors
            .is_empty())
    }

    pub fn is_error_reported(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner.state, "reading error visibility")?.error_reported)
    }

    pub fn report_error(&self) -> FormResult<()> {
        write_lock(&self.inner.state, "granting error visibility")?.error_reported = true;
        Ok(())
    }

    /// Applies one validation outcome: a message replaces the current errors,
    /// an explicit absence clears them.
    pub(crate) fn apply_outcome(&self, outcome: Option<&String>) -> FormResult<()> {
        let mut state = write_lock(&self.inner.state, "applying validation outcome")?;
        state.errors = match outcome {
            Some(message) => vec![message.clone()],
            None => Vec::new(),
        };
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_errors(&self, errors: Vec<String>) -> FormResult<()> {
        write_lock(&self.inner.state, "setting field errors")?.errors = errors;
        Ok(())
    }
}
