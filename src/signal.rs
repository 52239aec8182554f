use std::collections::BTreeSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::form::FieldKey;

/// Per-object change observer: a monotonic version counter plus the set of
/// keys touched since the last reset. Models record mutations into it; a
/// form and its fields read "changed since the last reset" out of it.
#[derive(Debug, Default)]
pub struct ChangeSignal {
    version: AtomicU64,
    changed: RwLock<BTreeSet<FieldKey>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: FieldKey) {
        let mut changed = match self.changed.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        changed.insert(key);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn changed(&self) -> bool {
        let changed = match self.changed.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        !changed.is_empty()
    }

    pub fn changed_keys(&self) -> BTreeSet<FieldKey> {
        let changed = match self.changed.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        changed.clone()
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        let changed = match self.changed.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        changed.contains(&key)
    }

    /// Clears the changed-key set. The version counter stays monotonic.
    pub fn reset(&self) {
        let mut changed = match self.changed.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        changed.clear();
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
