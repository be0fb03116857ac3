use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{context::RequestContext, engine::KernelCommand};

/// Requests whose answer arrives as an engine event rather than through the
/// handler that issued the command.
///
/// Removal is the acknowledgment point: whoever removes an entry first owns
/// the answer, everyone else sees `None` and treats the event as stale.
#[derive(Debug, Default)]
pub struct InFlightTable {
    entries: DashMap<KernelCommand, InFlight>,
}

#[derive(Debug)]
struct InFlight {
    context: RequestContext,
    attempts: u32,
    issued: Instant,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `command` as issued on behalf of `context`. Putting a command
    /// that is already registered keeps the original context and bumps its
    /// attempt counter, which is returned.
    pub fn put(&self, command: KernelCommand, context: RequestContext) -> u32 {
        let mut entry = self.entries.entry(command).or_insert_with(|| InFlight {
            context,
            attempts: 0,
            issued: Instant::now(),
        });
        entry.attempts += 1;
        entry.attempts
    }

    pub fn try_remove(&self, command: &KernelCommand) -> Option<RequestContext> {
        self.entries
            .remove(command)
            .map(|(_, in_flight)| in_flight.context)
    }

    pub fn contains(&self, command: &KernelCommand) -> bool {
        self.entries.contains_key(command)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every entry issued more than `ttl` ago.
    pub fn evict_older_than(&self, ttl: Duration) -> Vec<(KernelCommand, RequestContext)> {
        let now = Instant::now();
        let expired = |_: &KernelCommand, in_flight: &InFlight| {
            now.duration_since(in_flight.issued) >= ttl
        };

        let candidates: Vec<KernelCommand> = self
            .entries
            .iter()
            .filter(|entry| expired(entry.key(), entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        // An observer may answer between the scan and the removal; it wins.
        candidates
            .into_iter()
            .filter_map(|command| self.entries.remove_if(&command, expired))
            .map(|(command, in_flight)| (command, in_flight.context))
            .collect()
    }
}

/// Periodically evicts entries the engine never answered. Their requests are
/// completed without a reply so the owning loop can go idle again.
pub async fn run_eviction(table: Arc<InFlightTable>, ttl: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(ttl.max(Duration::from_millis(10)) / 2);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for (command, context) in table.evict_older_than(ttl) {
                    warn!(
                        command = %command.id,
                        msg_type = context.request().msg_type(),
                        "no engine answer in time; abandoning request"
                    );
                    context.complete();
                }
            }
        }
    }
}
