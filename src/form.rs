use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::debug;

use crate::binding::{BindTarget, Binding, BindingCache};
use crate::config::FormOptions;
use crate::delegation::{Delegation, FormModel, SubjectRef, resolve_delegation};
use crate::field::FormField;
use crate::registry::{FormKey, FormRegistry};
use crate::scheduler::{ValidateStatus, ValidationScheduler};
use crate::signal::ChangeSignal;
use crate::submit::{SubmitController, SubmitOptions};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    ValidationFailed(String),
    SubmitFailed(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::ValidationFailed(error) => write!(f, "validation failed: {error}"),
            FormError::SubmitFailed(error) => write!(f, "submission failed: {error}"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormSnapshot {
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
    pub is_submitting: bool,
    pub can_submit: bool,
}

/// Aggregate root for one subject under one discriminator key. Obtained from
/// a [`FormRegistry`], which guarantees one instance per (subject, key) pair
/// until disposed.
pub struct Form {
    id: FormId,
    key: FormKey,
    subject: Weak<dyn FormModel>,
    signal: Arc<ChangeSignal>,
    delegation: Delegation,
    registry: FormRegistry,
    fields: Arc<RwLock<BTreeMap<FieldKey, FormField>>>,
    explicitly_dirty: AtomicBool,
    scheduler: ValidationScheduler,
    submitter: SubmitController,
    bindings: BindingCache,
}

impl Form {
    pub(crate) fn new(
        subject: &SubjectRef,
        key: FormKey,
        registry: FormRegistry,
        options: &FormOptions,
    ) -> Arc<Self> {
        let id = FormId::next();
        let delegation = resolve_delegation(subject.as_ref());
        let fields = Arc::new(RwLock::new(BTreeMap::new()));
        let scheduler = ValidationScheduler::new(
            id,
            delegation.validate.clone(),
            fields.clone(),
            options.validation_debounce,
        );
        Arc::new(Self {
            id,
            key,
            subject: Arc::downgrade(subject),
            signal: subject.change_signal(),
            delegation,
            registry,
            fields,
            explicitly_dirty: AtomicBool::new(false),
            scheduler,
            submitter: SubmitController::new(id),
            bindings: BindingCache::new(),
        })
    }

    pub fn id(&self) -> FormId {
        self.id
    }

    pub fn key(&self) -> FormKey {
        self.key
    }

    /// The wrapped model, if it is still alive. The form observes the subject
    /// but does not own its lifecycle.
    pub fn subject(&self) -> Option<SubjectRef> {
        self.subject.upgrade()
    }

    /// Returns the field for `key`, creating it on first access. Fields are
    /// cached for the form's lifetime.
    pub fn field(&self, key: FieldKey) -> FormResult<FormField> {
        {
            let fields = read_lock(&self.fields, "reading field map")?;
            if let Some(field) = fields.get(&key) {
                return Ok(field.clone());
            }
        }
        let mut fields = write_lock(&self.fields, "creating field")?;
        Ok(fields
            .entry(key)
            .or_insert_with(|| FormField::new(key, self.signal.clone()))
            .clone())
    }

    /// The current sub-form set: every subject yielded by the connect
    /// capability, resolved through the owning registry under this form's
    /// discriminator key. Recomputed on every read; instance identity is
    /// preserved by the registry.
    pub fn sub_forms(&self) -> FormResult<Vec<Arc<Form>>> {
        let Some(connect) = &self.delegation.connect else {
            return Ok(Vec::new());
        };
        let mut forms = Vec::new();
        for connected in connect() {
            for subject in connected.subjects() {
                forms.push(self.registry.get_keyed(subject, self.key)?);
            }
        }
        Ok(forms)
    }

    /// True if any field changed since the last reset, the form was explicitly
    /// marked dirty, or any sub-form is dirty.
    pub fn is_dirty(&self) -> FormResult<bool> {
        self.is_dirty_within(&mut BTreeSet::new())
    }

    fn is_dirty_within(&self, visited: &mut BTreeSet<FormId>) -> FormResult<bool> {
        // Re-entry means a connect cycle; each form counts once.
        if !visited.insert(self.id) {
            return Ok(false);
        }
        if self.explicitly_dirty.load(Ordering::SeqCst) || self.signal.changed() {
            return Ok(true);
        }
        for sub_form in self.sub_forms()? {
            if sub_form.is_dirty_within(visited)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True iff no field holds an error and every sub-form is valid.
    pub fn is_valid(&self) -> FormResult<bool> {
        self.is_valid_within(&mut BTreeSet::new())
    }

    fn is_valid_within(&self, visited: &mut BTreeSet<FormId>) -> FormResult<bool> {
        if !visited.insert(self.id) {
            return Ok(true);
        }
        {
            let fields = read_lock(&self.fields, "reading fields for validity")?;
            for field in fields.values() {
                if field.has_error()? {
                    return Ok(false);
                }
            }
        }
        for sub_form in self.sub_forms()? {
            if !sub_form.is_valid_within(visited)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn is_validating(&self) -> FormResult<bool> {
        self.scheduler.is_validating()
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        self.submitter.is_submitting()
    }

    pub fn can_submit(&self) -> FormResult<bool> {
        Ok(self.is_dirty()?
            && self.is_valid()?
            && !self.is_submitting()?
            && !self.is_validating()?)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let is_dirty = self.is_dirty()?;
        let is_valid = self.is_valid()?;
        let is_validating = self.is_validating()?;
        let is_submitting = self.is_submitting()?;
        Ok(FormSnapshot {
            is_dirty,
            is_valid,
            is_validating,
            is_submitting,
            can_submit: is_dirty && is_valid && !is_submitting && !is_validating,
        })
    }

    /// Marks this form dirty independent of field changes. Sub-forms are not
    /// affected.
    pub fn mark_as_dirty(&self) {
        self.explicitly_dirty.store(true, Ordering::SeqCst);
    }

    /// Clears the explicit dirty flag, resets every field's change-tracking
    /// baseline, and resets every current sub-form. In-flight validation and
    /// submission are left alone.
    pub fn reset(&self) -> FormResult<()> {
        self.reset_within(&mut BTreeSet::new())
    }

    fn reset_within(&self, visited: &mut BTreeSet<FormId>) -> FormResult<()> {
        if !visited.insert(self.id) {
            return Ok(());
        }
        self.explicitly_dirty.store(false, Ordering::SeqCst);
        self.signal.reset();
        for sub_form in self.sub_forms()? {
            sub_form.reset_within(visited)?;
        }
        Ok(())
    }

    /// Grants error visibility to every field and sub-form known right now.
    /// Structure created afterwards starts unreported.
    pub fn report_error(&self) -> FormResult<()> {
        self.report_error_within(&mut BTreeSet::new())
    }

    fn report_error_within(&self, visited: &mut BTreeSet<FormId>) -> FormResult<()> {
        if !visited.insert(self.id) {
            return Ok(());
        }
        let current_fields = {
            let fields = read_lock(&self.fields, "reading fields for error report")?;
            fields.values().cloned().collect::<Vec<_>>()
        };
        for field in current_fields {
            field.report_error()?;
        }
        for sub_form in self.sub_forms()? {
            sub_form.report_error_within(visited)?;
        }
        Ok(())
    }

    /// Requests a debounced validation run. `None` when the subject has no
    /// validate capability. Must be called within a tokio runtime context.
    pub fn validate(&self) -> FormResult<Option<ValidateStatus>> {
        self.scheduler.request()
    }

    /// Runs the subject's submit capability, at most one in flight. Without
    /// `force`, a clean or invalid form refuses with `Ok(false)` and a form
    /// already submitting discards the call; with `force`, the gate is
    /// skipped and an in-flight run is cancelled and replaced.
    pub async fn submit(&self, options: SubmitOptions) -> FormResult<bool> {
        if !options.force && !(self.is_dirty()? && self.is_valid()?) {
            debug!(form = self.id.0, "submit refused: form is clean or invalid");
            return Ok(false);
        }
        let Some(submit) = self.delegation.submit.clone() else {
            return Ok(false);
        };
        self.submitter.run(submit, options.force).await
    }

    /// Form-scoped binding instance: constructed on first use, identity kept
    /// and config merged on every later call.
    pub fn bind<B: Binding>(&self, config: B::Config) -> FormResult<Arc<B>> {
        self.bindings.bind::<B>(self.id, BindTarget::Form, config)
    }

    pub fn bind_field<B: Binding>(&self, key: FieldKey, config: B::Config) -> FormResult<Arc<B>> {
        self.bindings.bind::<B>(self.id, BindTarget::Field(key), config)
    }

    pub fn bind_fields<B: Binding>(
        &self,
        keys: &[FieldKey],
        config: B::Config,
    ) -> FormResult<Arc<B>> {
        self.bindings
            .bind::<B>(self.id, BindTarget::Fields(keys.to_vec()), config)
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
