use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::form::{FieldKey, FormId, FormResult, read_lock, write_lock};

static BINDING_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BindingId(pub u64);

impl BindingId {
    pub fn next() -> Self {
        Self(BINDING_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// What a binding instance is attached to. The three shapes are independent
/// cache partitions.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum BindTarget {
    Form,
    Field(FieldKey),
    Fields(Vec<FieldKey>),
}

/// Identity echoed into every binding instance at construction.
#[derive(Clone, Debug)]
pub struct BindingContext {
    pub binding_id: BindingId,
    pub form_id: FormId,
    pub target: BindTarget,
}

impl BindingContext {
    pub fn field_name(&self) -> Option<FieldKey> {
        match &self.target {
            BindTarget::Field(key) => Some(*key),
            _ => None,
        }
    }

    pub fn field_names(&self) -> &[FieldKey] {
        match &self.target {
            BindTarget::Form => &[],
            BindTarget::Field(key) => std::slice::from_ref(key),
            BindTarget::Fields(keys) => keys,
        }
    }
}

/// A presentation-layer adapter produced by [`Form::bind`](crate::Form::bind).
/// Instances keep their identity across repeated `bind` calls; only the
/// config is refreshed.
pub trait Binding: Send + Sync + 'static {
    type Config: Send + Sync + 'static;

    fn create(context: BindingContext, config: Self::Config) -> Self;

    /// Folds a fresh config into the live instance without replacing it.
    fn merge_config(&self, config: Self::Config);
}

pub(crate) struct BindingCache {
    entries: RwLock<BTreeMap<(TypeId, BindTarget), Arc<dyn Any + Send + Sync>>>,
}

impl BindingCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn bind<B: Binding>(
        &self,
        form_id: FormId,
        target: BindTarget,
        config: B::Config,
    ) -> FormResult<Arc<B>> {
        let cache_key = (TypeId::of::<B>(), target.clone());

        {
            let entries = read_lock(&self.entries, "reading binding cache")?;
            if let Some(existing) = entries.get(&cache_key)
                && let Ok(binding) = existing.clone().downcast::<B>()
            {
                binding.merge_config(config);
                return Ok(binding);
            }
        }

        let mut entries = write_lock(&self.entries, "populating binding cache")?;
        if let Some(existing) = entries.get(&cache_key)
            && let Ok(binding) = existing.clone().downcast::<B>()
        {
            binding.merge_config(config);
            return Ok(binding);
        }

        let context = BindingContext {
            binding_id: BindingId::next(),
            form_id,
            target,
        };
        let binding = Arc::new(B::create(context, config));
        entries.insert(cache_key, binding.clone() as Arc<dyn Any + Send + Sync>);
        Ok(binding)
    }
}
