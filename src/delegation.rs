use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::form::{FieldKey, FormResult};
use crate::signal::ChangeSignal;

pub type SubjectRef = Arc<dyn FormModel>;

/// Outcome of one validation run: `Some(message)` marks the field as
/// erroneous, `None` explicitly clears it. Fields absent from the report are
/// left untouched.
pub type ValidationReport = BTreeMap<FieldKey, Option<String>>;

pub type ValidationFuture =
    Pin<Box<dyn Future<Output = FormResult<ValidationReport>> + Send + 'static>>;
pub type SubmitFuture = Pin<Box<dyn Future<Output = FormResult<bool>> + Send + 'static>>;

pub type ValidateFn = Arc<dyn Fn() -> ValidationFuture + Send + Sync>;
pub type SubmitFn = Arc<dyn Fn(CancellationToken) -> SubmitFuture + Send + Sync>;
pub type ConnectFn = Arc<dyn Fn() -> Vec<Connected> + Send + Sync>;

/// A model object a form can wrap. The behavior contract is optional: a model
/// may implement it directly through [`FormModel::delegation`], or point at
/// another object carrying it through [`FormModel::delegate`].
pub trait FormModel: Send + Sync + 'static {
    fn change_signal(&self) -> Arc<ChangeSignal>;

    /// Behavior contract implemented directly by the model.
    fn delegation(&self) -> Option<Delegation> {
        None
    }

    /// Indirection to another object implementing the contract. The resolver
    /// follows at most one level.
    fn delegate(&self) -> Option<SubjectRef> {
        None
    }
}

/// Capability record extracted from a subject: every capability is optional
/// and absence degrades gracefully.
#[derive(Clone, Default)]
pub struct Delegation {
    pub validate: Option<ValidateFn>,
    pub submit: Option<SubmitFn>,
    pub connect: Option<ConnectFn>,
}

impl Delegation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validate<F, Fut>(mut self, validate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FormResult<ValidationReport>> + Send + 'static,
    {
        self.validate = Some(Arc::new(move || Box::pin(validate())));
        self
    }

    pub fn with_submit<F, Fut>(mut self, submit: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FormResult<bool>> + Send + 'static,
    {
        self.submit = Some(Arc::new(move |token| Box::pin(submit(token))));
        self
    }

    pub fn with_connect<F>(mut self, connect: F) -> Self
    where
        F: Fn() -> Vec<Connected> + Send + Sync + 'static,
    {
        self.connect = Some(Arc::new(connect));
        self
    }
}

/// One entry yielded by the connect capability: a single sub-model or a
/// collection of them.
#[derive(Clone)]
pub enum Connected {
    One(SubjectRef),
    Many(Vec<SubjectRef>),
}

impl Connected {
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectRef> {
        match self {
            Connected::One(subject) => std::slice::from_ref(subject).iter(),
            Connected::Many(subjects) => subjects.iter(),
        }
    }
}

impl From<SubjectRef> for Connected {
    fn from(subject: SubjectRef) -> Self {
        Connected::One(subject)
    }
}

impl From<Vec<SubjectRef>> for Connected {
    fn from(subjects: Vec<SubjectRef>) -> Self {
        Connected::Many(subjects)
    }
}

/// Locates a subject's behavior contract: the direct contract wins, otherwise
/// a single level of indirection is consulted. A subject with neither yields
/// the empty record.
pub fn resolve_delegation(subject: &dyn FormModel) -> Delegation {
    if let Some(delegation) = subject.delegation() {
        return delegation;
    }
    if let Some(target) = subject.delegate()
        && let Some(delegation) = target.delegation()
    {
        return delegation;
    }
    Delegation::default()
}
