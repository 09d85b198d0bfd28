//! Action executor
//!
//! Interprets a rule's action tree sequentially against a cancellation
//! token. The token is checked before every action and at every wait; a
//! `Stop` node halts the whole run including enclosing repeats, while a
//! failing service call only fails that one action.

use eca_automation::Action;
use eca_core::SharedClock;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::service::SharedService;

/// Terminal state of one rule run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ran to the end (including an explicit `Stop`)
    Completed,
    /// Cancelled cooperatively (restart mode or shutdown)
    Cancelled,
}

/// Outcome of a (possibly nested) sequence traversal
enum Control {
    /// Proceed with the next sibling
    Continue,
    /// Explicit stop: unwind through all enclosing repeats
    Stop,
    /// Cancellation observed at a suspension point
    Cancelled,
}

/// Executes action trees against the Service collaborator
pub struct ActionExecutor {
    service: SharedService,
    clock: SharedClock,
}

impl ActionExecutor {
    /// Create a new executor
    pub fn new(service: SharedService, clock: SharedClock) -> Self {
        Self { service, clock }
    }

    /// Run an action list to a terminal state
    pub async fn run(&self, actions: &[Action], cancel: &CancellationToken) -> RunOutcome {
        match self.run_sequence(actions, cancel).await {
            Control::Continue | Control::Stop => RunOutcome::Completed,
            Control::Cancelled => RunOutcome::Cancelled,
        }
    }

    /// Execute a sequence of actions
    ///
    /// Boxed because `Repeat` recurses through it.
    fn run_sequence<'a>(
        &'a self,
        actions: &'a [Action],
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Control> + Send + 'a>> {
        Box::pin(async move {
            for action in actions {
                if cancel.is_cancelled() {
                    return Control::Cancelled;
                }
                match action {
                    Action::ServiceCall(call) => {
                        trace!(service = %call.service, "Calling service");
                        // A collaborator error fails this action only; the
                        // remaining siblings and repeat iterations proceed.
                        if let Err(err) = self.service.call(&call.service, &call.data).await {
                            warn!(service = %call.service, %err, "Service call failed");
                        }
                    }
                    Action::Wait(wait) => {
                        trace!(duration = ?wait.duration, "Waiting");
                        tokio::select! {
                            _ = self.clock.sleep(wait.duration) => {}
                            _ = cancel.cancelled() => return Control::Cancelled,
                        }
                    }
                    Action::Repeat(repeat) => {
                        for iteration in 0..repeat.count {
                            if cancel.is_cancelled() {
                                return Control::Cancelled;
                            }
                            trace!(iteration, count = repeat.count, "Repeat iteration");
                            match self.run_sequence(&repeat.sequence, cancel).await {
                                Control::Continue => {}
                                Control::Stop => return Control::Stop,
                                Control::Cancelled => return Control::Cancelled,
                            }
                        }
                    }
                    Action::Stop => {
                        debug!("Explicit stop, halting run");
                        return Control::Stop;
                    }
                }
            }
            Control::Continue
        })
    }
}
