use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use crate::config::FormOptions;
use crate::delegation::SubjectRef;
use crate::form::{Form, FormResult, read_lock, write_lock};

/// Discriminator key: two keys over the same subject yield two independent
/// forms observing the same model.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormKey(&'static str);

impl FormKey {
    pub const DEFAULT: FormKey = FormKey("default");

    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Default for FormKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for FormKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Subject identity is the Arc's data address, not value equality.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct SubjectId(usize);

fn subject_id(subject: &SubjectRef) -> SubjectId {
    SubjectId(Arc::as_ptr(subject) as *const () as usize)
}

static GLOBAL: OnceLock<FormRegistry> = OnceLock::new();

/// Identity-preserving mapping from (subject, discriminator key) to its form.
/// Forms live until explicitly disposed; the registry holds the subject only
/// weakly, through the form. That weak handle pins the subject's allocation,
/// so a cached address can never be re-issued to a different object; entries
/// whose subject died without a dispose are reclaimed by
/// [`FormRegistry::prune`].
#[derive(Clone)]
pub struct FormRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    options: FormOptions,
    forms: RwLock<BTreeMap<(SubjectId, FormKey), Arc<Form>>>,
}

impl FormRegistry {
    pub fn new(options: FormOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                options,
                forms: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// The process-wide registry, built with default options on first use.
    pub fn global() -> &'static FormRegistry {
        GLOBAL.get_or_init(|| FormRegistry::new(FormOptions::default()))
    }

    pub fn get(&self, subject: &SubjectRef) -> FormResult<Arc<Form>> {
        self.get_keyed(subject, FormKey::DEFAULT)
    }

    pub fn get_keyed(&self, subject: &SubjectRef, key: FormKey) -> FormResult<Arc<Form>> {
        let id = subject_id(subject);
        {
            let forms = read_lock(&self.inner.forms, "reading form registry")?;
            if let Some(form) = forms.get(&(id, key)) {
                return Ok(form.clone());
            }
        }

        // Built outside the registry lock: construction resolves the
        // subject's delegation, which is user code.
        let form = Form::new(subject, key, self.clone(), &self.inner.options);

        let mut forms = write_lock(&self.inner.forms, "populating form registry")?;
        if let Some(existing) = forms.get(&(id, key)) {
            return Ok(existing.clone());
        }
        debug!(form = form.id().0, %key, "form created");
        forms.insert((id, key), form.clone());
        Ok(form)
    }

    pub fn dispose(&self, subject: &SubjectRef) -> FormResult<()> {
        self.dispose_keyed(subject, FormKey::DEFAULT)
    }

    /// Removes the form for exactly this (subject, key) pair. Other keys for
    /// the same subject are unaffected; the subject itself is not touched.
    pub fn dispose_keyed(&self, subject: &SubjectRef, key: FormKey) -> FormResult<()> {
        let mut forms = write_lock(&self.inner.forms, "disposing form")?;
        if let Some(form) = forms.remove(&(subject_id(subject), key)) {
            debug!(form = form.id().0, %key, "form disposed");
        }
        Ok(())
    }

    /// Removes every entry whose subject was dropped without a prior dispose
    /// and returns how many were reclaimed. Forms over live subjects are
    /// untouched.
    pub fn prune(&self) -> FormResult<usize> {
        let mut forms = write_lock(&self.inner.forms, "pruning form registry")?;
        let before = forms.len();
        forms.retain(|_, form| form.subject().is_some());
        let pruned = before - forms.len();
        if pruned > 0 {
            debug!(pruned, "dead forms pruned");
        }
        Ok(pruned)
    }
}
