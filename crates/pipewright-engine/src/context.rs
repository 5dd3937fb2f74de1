//! Run-scoped context, passed explicitly into every runner call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pipewright_core::RunId;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::clock::{Clock, SystemClock};
use crate::store::{EffectStore, RunStore};

/// Everything one run needs that is not part of the process definition:
/// identity, time, logging span, cancellation and storage handles.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    clock: Arc<dyn Clock>,
    span: Span,
    cancel: CancellationToken,
    effects: Arc<dyn EffectStore>,
    runs: Arc<dyn RunStore>,
}

impl RunContext {
    /// Create a context backed by `store` for both effects and run records.
    pub fn new<S>(run_id: RunId, store: Arc<S>) -> Self
    where
        S: EffectStore + RunStore + 'static,
    {
        let span = tracing::info_span!("run", run_id = %run_id);
        Self {
            run_id,
            clock: Arc::new(SystemClock),
            span,
            cancel: CancellationToken::new(),
            effects: store.clone(),
            runs: store,
        }
    }

    /// Builder method to use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder method to use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn effects(&self) -> &dyn EffectStore {
        self.effects.as_ref()
    }

    pub fn runs(&self) -> &dyn RunStore {
        self.runs.as_ref()
    }
}
