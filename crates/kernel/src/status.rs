use lantern_protocol::content::{ExecutionState, Status};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::context::RequestContext;

/// Busy/idle state of the kernel, shared by every loop and handler.
///
/// The watch channel is the single source of truth. Transitions publish their
/// `status` broadcast while still holding the channel's write lock, so each
/// real change is announced exactly once and in order.
#[derive(Debug)]
pub struct StatusTracker {
    state: watch::Sender<ExecutionState>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ExecutionState::Idle);
        Self { state }
    }

    pub fn current(&self) -> ExecutionState {
        *self.state.borrow()
    }

    /// Returns whether the state actually changed.
    pub fn set_busy(&self, context: &RequestContext) -> bool {
        self.transition(ExecutionState::Busy, context)
    }

    /// Returns whether the state actually changed.
    pub fn set_idle(&self, context: &RequestContext) -> bool {
        self.transition(ExecutionState::Idle, context)
    }

    /// Resolves immediately when idle, otherwise on the next idle transition.
    pub async fn await_idle(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == ExecutionState::Idle)
            .await;
    }

    fn transition(&self, target: ExecutionState, context: &RequestContext) -> bool {
        self.state.send_if_modified(|state| {
            if *state == target {
                return false;
            }
            // A transition is only made if it can be announced.
            if !context.request().content.is_request() {
                debug!(
                    msg_type = context.request().msg_type(),
                    "status left unchanged for non-request"
                );
                return false;
            }

            *state = target;
            debug!(state = ?target, parent = context.request().msg_id(), "kernel status changed");
            if let Err(e) = context.broadcast(Status {
                execution_state: target,
            }) {
                warn!(error = %e, "could not publish kernel status");
            }
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BroadcastChannel, ChannelRole, ReplyChannel};
    use googletest::prelude::*;
    use lantern_protocol::{content::ExecuteRequest, Content, Message};
    use std::{sync::Arc, time::Duration};
    use tokio::{sync::mpsc, time::timeout};

    fn context() -> (RequestContext, mpsc::UnboundedReceiver<Message>) {
        let (reply_tx, _) = mpsc::unbounded_channel();
        let (iopub_tx, iopub_rx) = mpsc::unbounded_channel();
        let context = RequestContext::new(
            Message::new(ExecuteRequest::new("1"), "client", "alice"),
            ReplyChannel::new(ChannelRole::Shell, "kernel", reply_tx),
            BroadcastChannel::new("abc", "kernel", "kernel", iopub_tx),
        );
        (context, iopub_rx)
    }

    fn drain_states(iopub: &mut mpsc::UnboundedReceiver<Message>) -> Vec<ExecutionState> {
        let mut states = Vec::new();
        while let Ok(message) = iopub.try_recv() {
            if let Content::Status(status) = message.content {
                states.push(status.execution_state);
            }
        }
        states
    }

    #[googletest::test]
    #[tokio::test]
    async fn await_idle_returns_immediately_when_idle() {
        let tracker = StatusTracker::new();

        let waited = timeout(Duration::from_millis(100), tracker.await_idle()).await;

        expect_that!(waited.is_ok(), eq(true));
    }

    #[googletest::test]
    #[tokio::test]
    async fn await_idle_waits_for_idle_transition() {
        let tracker = Arc::new(StatusTracker::new());
        let (context, _iopub) = context();
        tracker.set_busy(&context);

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.await_idle().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        expect_that!(waiter.is_finished(), eq(false));

        tracker.set_idle(&context);
        let waited = timeout(Duration::from_secs(1), waiter).await;

        expect_that!(waited.is_ok(), eq(true));
        expect_that!(tracker.current(), eq(ExecutionState::Idle));
    }

    #[googletest::test]
    fn repeated_busy_is_announced_once() {
        let tracker = StatusTracker::new();
        let (context, mut iopub) = context();

        expect_that!(tracker.set_busy(&context), eq(true));
        expect_that!(tracker.set_busy(&context), eq(false));
        expect_that!(tracker.set_idle(&context), eq(true));
        expect_that!(tracker.set_idle(&context), eq(false));

        expect_that!(
            drain_states(&mut iopub),
            eq(vec![ExecutionState::Busy, ExecutionState::Idle])
        );
    }

    #[googletest::test]
    fn non_request_parent_does_not_change_status() {
        let tracker = StatusTracker::new();
        let (context, mut iopub) = context();
        let (reply_tx, _) = mpsc::unbounded_channel();
        let (iopub_tx, _) = mpsc::unbounded_channel();
        let stray = RequestContext::new(
            Message::new(Content::Empty, "client", "alice"),
            ReplyChannel::new(ChannelRole::Control, "kernel", reply_tx),
            BroadcastChannel::new("abc", "kernel", "kernel", iopub_tx),
        );
        tracker.set_busy(&context);

        expect_that!(tracker.set_idle(&stray), eq(false));
        expect_that!(tracker.current(), eq(ExecutionState::Busy));
        expect_that!(drain_states(&mut iopub), eq(vec![ExecutionState::Busy]));
    }

    #[googletest::test]
    #[tokio::test]
    async fn concurrent_transitions_never_announce_twice_in_a_row() {
        let tracker = Arc::new(StatusTracker::new());
        let (context, mut iopub) = context();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let tracker = tracker.clone();
            let context = context.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    tracker.set_busy(&context);
                } else {
                    tracker.set_idle(&context);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let states = drain_states(&mut iopub);
        expect_that!(states.windows(2).all(|pair| pair[0] != pair[1]), eq(true));
    }
}
