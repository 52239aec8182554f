use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::delegation::{ValidateFn, ValidationReport};
use crate::field::FormField;
use crate::form::{FieldKey, FormId, FormResult, read_lock, write_lock};

/// Sync acknowledgement of a validation request. Displays as the literal
/// `requested`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidateStatus {
    Requested,
}

impl Display for ValidateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("requested")
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum SchedulerPhase {
    #[default]
    Idle,
    Scheduled,
    Running,
}

#[derive(Default)]
struct SchedulerState {
    phase: SchedulerPhase,
    epoch: u64,
    /// Pending run deadline; meaningful only while `Scheduled`.
    deadline: Option<Instant>,
}

/// Debounced validation driver for a single form. Requests arriving while a
/// timer is pending coalesce into it and push its deadline out; a request
/// arriving mid-run re-enters `Scheduled` with a fresh timer, and an async
/// run mutex keeps invocations strictly serial.
pub(crate) struct ValidationScheduler {
    form_id: FormId,
    validate: Option<ValidateFn>,
    fields: Arc<RwLock<BTreeMap<FieldKey, FormField>>>,
    debounce: Duration,
    state: Arc<RwLock<SchedulerState>>,
    run_lock: Arc<Mutex<()>>,
}

impl ValidationScheduler {
    pub(crate) fn new(
        form_id: FormId,
        validate: Option<ValidateFn>,
        fields: Arc<RwLock<BTreeMap<FieldKey, FormField>>>,
        debounce: Duration,
    ) -> Self {
        Self {
            form_id,
            validate,
            fields,
            debounce,
            state: Arc::new(RwLock::new(SchedulerState::default())),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Must be called within a tokio runtime context: the debounce cycle is
    /// spawned onto it.
    pub(crate) fn request(&self) -> FormResult<Option<ValidateStatus>> {
        let Some(validate) = self.validate.clone() else {
            return Ok(None);
        };

        let mut state = write_lock(&self.state, "scheduling validation")?;
        let deadline = Instant::now() + self.debounce;
        match state.phase {
            SchedulerPhase::Idle => {
                state.phase = SchedulerPhase::Scheduled;
                state.epoch += 1;
                state.deadline = Some(deadline);
                debug!(form = self.form_id.0, epoch = state.epoch, "validation scheduled");
                self.spawn_cycle(validate, state.epoch, deadline);
            }
            // Coalesce onto the pending timer; the window runs from the
            // latest request.
            SchedulerPhase::Scheduled => {
                state.deadline = Some(deadline);
            }
            SchedulerPhase::Running => {
                state.phase = SchedulerPhase::Scheduled;
                state.epoch += 1;
                state.deadline = Some(deadline);
                debug!(
                    form = self.form_id.0,
                    epoch = state.epoch,
                    "validation rescheduled behind in-flight run"
                );
                self.spawn_cycle(validate, state.epoch, deadline);
            }
        }
        Ok(Some(ValidateStatus::Requested))
    }

    pub(crate) fn is_validating(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading scheduler phase")?.phase != SchedulerPhase::Idle)
    }

    fn spawn_cycle(&self, validate: ValidateFn, epoch: u64, mut deadline: Instant) {
        let form_id = self.form_id;
        let fields = self.fields.clone();
        let state = self.state.clone();
        let run_lock = self.run_lock.clone();

        tokio::spawn(async move {
            // One timer per cycle: when a request moved the deadline while
            // we slept, re-arm instead of firing.
            loop {
                tokio::time::sleep_until(deadline).await;
                let extended = {
                    let Ok(mut state) = state.write() else {
                        return;
                    };
                    if state.epoch != epoch || state.phase != SchedulerPhase::Scheduled {
                        return;
                    }
                    match state.deadline {
                        Some(later) if later > deadline => Some(later),
                        _ => {
                            state.phase = SchedulerPhase::Running;
                            state.deadline = None;
                            None
                        }
                    }
                };
                match extended {
                    Some(later) => deadline = later,
                    None => break,
                }
            }

            // Serializes with a run still in flight from an older epoch.
            let _run = run_lock.lock().await;

            match validate().await {
                Ok(report) => {
                    if let Err(error) = apply_report(&fields, &report) {
                        warn!(form = form_id.0, %error, "failed to apply validation report");
                    }
                }
                Err(error) => {
                    warn!(form = form_id.0, %error, "validation run failed");
                }
            }

            let Ok(mut state) = state.write() else {
                return;
            };
            if state.epoch == epoch && state.phase == SchedulerPhase::Running {
                state.phase = SchedulerPhase::Idle;
                debug!(form = form_id.0, epoch, "validation settled");
            }
        });
    }
}

/// Applies a settled report to the fields that currently exist; fields absent
/// from the report keep their errors.
fn apply_report(
    fields: &Arc<RwLock<BTreeMap<FieldKey, FormField>>>,
    report: &ValidationReport,
) -> FormResult<()> {
    let fields = read_lock(fields, "applying validation report")?;
    for (key, outcome) in report {
        if let Some(field) = fields.get(key) {
            field.apply_outcome(outcome.as_ref())?;
        }
    }
    Ok(())
}
