use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::delegation::SubmitFn;
use crate::form::{FormId, FormResult, read_lock, write_lock};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubmitOptions {
    /// Skip the dirty/valid gate and preempt an in-flight submission instead
    /// of being discarded.
    pub force: bool,
}

impl SubmitOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

#[derive(Default)]
struct ControllerState {
    submitting: bool,
    run: u64,
    token: Option<CancellationToken>,
}

/// At-most-one-in-flight submission driver. A second submission is discarded
/// unless forced; a forced one signals the in-flight run's cancellation token
/// and starts its own cycle immediately.
pub(crate) struct SubmitController {
    form_id: FormId,
    state: Arc<RwLock<ControllerState>>,
}

impl SubmitController {
    pub(crate) fn new(form_id: FormId) -> Self {
        Self {
            form_id,
            state: Arc::new(RwLock::new(ControllerState::default())),
        }
    }

    pub(crate) fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submission state")?.submitting)
    }

    pub(crate) async fn run(&self, submit: SubmitFn, force: bool) -> FormResult<bool> {
        let (run_id, token) = {
            let mut state = write_lock(&self.state, "starting submission")?;
            if state.submitting {
                if !force {
                    debug!(form = self.form_id.0, "submit discarded: already submitting");
                    return Ok(false);
                }
                if let Some(in_flight) = state.token.take() {
                    debug!(form = self.form_id.0, "submit preempted: cancelling in-flight run");
                    in_flight.cancel();
                }
                // The preempted run is logically over; its settle is guarded
                // by the run sequence below.
                state.submitting = false;
            }
            state.run += 1;
            state.submitting = true;
            let token = CancellationToken::new();
            state.token = Some(token.clone());
            debug!(form = self.form_id.0, run = state.run, "submission started");
            (state.run, token)
        };

        let result = submit(token.clone()).await;

        {
            let mut state = write_lock(&self.state, "finishing submission")?;
            if state.run == run_id {
                state.submitting = false;
                state.token = None;
                debug!(form = self.form_id.0, run = run_id, "submission settled");
            }
        }

        if token.is_cancelled() {
            debug!(form = self.form_id.0, run = run_id, "submission aborted by preemption");
            return Ok(false);
        }
        result
    }
}
