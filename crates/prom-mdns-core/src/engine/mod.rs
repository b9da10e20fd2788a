//! Discovery engine
//!
//! The DiscoveryEngine is responsible for:
//! - Running one refresh cycle at startup and one per interval tick
//! - Fanning out one concurrent lookup per configured service name
//! - Fanning in every discovered group into a single aggregate per cycle
//! - Delivering aggregates, in cycle order, to the downstream sink
//!
//! ## Architecture
//!
//! ```text
//!                      ┌─────────────────┐
//!   tick / startup ──▶ │ DiscoveryEngine │
//!                      └─────────────────┘
//!                               │ one task per service name
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//!   ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//!   │   lookup    │      │   lookup    │      │   lookup    │
//!   └─────────────┘      └─────────────┘      └─────────────┘
//!          │                    │                    │
//!          └──────── TargetGroup (unordered) ────────┘
//!                               ▼
//!                        ┌─────────────┐
//!                        │  collector  │ ── Vec<TargetGroup> ──▶ sink
//!                        └─────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Spawn one lookup per service name into a `JoinSet`
//! 2. Every lookup forwards its groups to the collector task
//! 3. Wait for every lookup (success or failure)
//! 4. The last sender drops, the collector returns the aggregate
//! 5. Deliver the aggregate unless the cycle was cancelled

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::lookup::LookupAdapter;
use crate::target::TargetGroup;
use crate::traits::ServiceBrowser;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by the DiscoveryEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Scheduler started
    Started {
        services: usize,
        interval: Duration,
    },

    /// Refresh cycle started
    CycleStarted {
        cycle: u64,
    },

    /// A single lookup failed; it contributes no further groups this cycle
    LookupFailed {
        cycle: u64,
        service: String,
        error: String,
    },

    /// Refresh cycle finished with an aggregate
    CycleCompleted {
        cycle: u64,
        groups: usize,
        elapsed: Duration,
    },

    /// Refresh cycle was interrupted by cancellation; nothing delivered
    CycleDiscarded {
        cycle: u64,
    },

    /// Scheduler stopped
    Stopped {
        reason: String,
    },
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, `run` not called yet
    Idle,
    /// `run` is driving refresh cycles
    Running,
    /// `run` returned; no further cycles will start
    Stopped,
}

/// Outcome of a single scheduled cycle
enum Delivery {
    Delivered,
    Cancelled,
    ConsumerGone,
}

/// Core discovery engine
///
/// ## Lifecycle
///
/// 1. Create with [`DiscoveryEngine::new()`]
/// 2. Start with [`DiscoveryEngine::run()`], handing it a cancellation token
///    and the sending half of the aggregate channel
/// 3. Cancel the token; `run` returns and the aggregate channel closes
///
/// [`DiscoveryEngine::refresh_all()`] runs a single cycle on demand and can be
/// used without the scheduler.
///
/// ## Ordering
///
/// The scheduler is a single task that runs cycles back to back, so
/// aggregates are delivered strictly in cycle order. Within a cycle the order
/// in which lookups report is arbitrary; the sink canonicalizes it.
pub struct DiscoveryEngine {
    /// Lookup adapter shared by all lookup tasks
    adapter: LookupAdapter,

    /// Service names queried each cycle
    service_names: Vec<String>,

    /// Time between refresh cycles
    interval: Duration,

    /// Cycle counter (last started cycle)
    cycles: AtomicU64,

    /// Scheduler state
    state: watch::Sender<SchedulerState>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DiscoveryEngine {
    /// Create a new discovery engine
    ///
    /// # Parameters
    ///
    /// - `browser`: Service browser implementation
    /// - `config`: Discovery configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        browser: Arc<dyn ServiceBrowser>,
        config: &DiscoveryConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let (state, _) = watch::channel(SchedulerState::Idle);

        let engine = Self {
            adapter: LookupAdapter::new(
                browser,
                config.secure_marker.clone(),
                config.engine.lookup_buffer_capacity,
            ),
            service_names: config.service_names.clone(),
            interval: config.interval(),
            cycles: AtomicU64::new(0),
            state,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Current scheduler state
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch scheduler state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Run the scheduler
    ///
    /// Performs one refresh cycle immediately, then one per interval tick,
    /// sending each aggregate to `out`. Returns once `cancel` fires or the
    /// receiving side of `out` is dropped; `out` is dropped on return, which
    /// tells the consumer no further aggregates will arrive.
    ///
    /// A cycle that observes cancellation is discarded rather than delivered,
    /// since its lookups were cut short.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean stop
    /// - `Err(Error::AlreadyRunning)`: `run` was already called on this engine
    pub async fn run(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<Vec<TargetGroup>>,
    ) -> Result<()> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                claimed = true;
            }
            claimed
        });
        if !claimed {
            return Err(Error::AlreadyRunning);
        }

        info!(
            "Discovery started: {} service(s), interval {:?}, browser {}",
            self.service_names.len(),
            self.interval,
            self.adapter.browser_name()
        );
        self.emit_event(EngineEvent::Started {
            services: self.service_names.len(),
            interval: self.interval,
        });

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            match self.scheduled_cycle(&cancel, &out).await {
                Delivery::Delivered => {}
                Delivery::Cancelled => break "Cancellation requested",
                Delivery::ConsumerGone => break "Aggregate consumer closed",
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break "Cancellation requested",
                _ = ticker.tick() => {}
            }
        };

        self.state.send_replace(SchedulerState::Stopped);
        info!("Discovery stopped after {} cycle(s): {}", self.cycles(), reason);
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });

        Ok(())
    }

    /// Run one refresh cycle and return its aggregate
    ///
    /// Waits for every lookup to finish. Failed lookups are logged and
    /// contribute nothing further; the result may be empty.
    pub async fn refresh_all(&self, cancel: &CancellationToken) -> Vec<TargetGroup> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_cycle(cycle, cancel).await
    }

    /// One scheduled cycle: refresh, then deliver
    async fn scheduled_cycle(
        &self,
        cancel: &CancellationToken,
        out: &mpsc::Sender<Vec<TargetGroup>>,
    ) -> Delivery {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let aggregate = self.refresh_cycle(cycle, cancel).await;

        if cancel.is_cancelled() {
            debug!("Cycle {} interrupted by cancellation, discarding", cycle);
            self.emit_event(EngineEvent::CycleDiscarded { cycle });
            return Delivery::Cancelled;
        }

        let groups = aggregate.len();
        debug!("Cycle {} complete: {} group(s)", cycle, groups);
        self.emit_event(EngineEvent::CycleCompleted {
            cycle,
            groups,
            elapsed: started.elapsed(),
        });

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Delivery::Cancelled,
            sent = out.send(aggregate) => match sent {
                Ok(()) => Delivery::Delivered,
                Err(_) => {
                    warn!("Aggregate consumer closed, stopping discovery");
                    Delivery::ConsumerGone
                }
            },
        }
    }

    /// Fan out one lookup per service name and fan the results back in
    async fn refresh_cycle(&self, cycle: u64, cancel: &CancellationToken) -> Vec<TargetGroup> {
        self.emit_event(EngineEvent::CycleStarted { cycle });

        let (group_tx, mut group_rx) = mpsc::unbounded_channel();

        // The collector finishes once every lookup has dropped its sender.
        let collector = tokio::spawn(async move {
            let mut aggregate = Vec::new();
            while let Some(group) = group_rx.recv().await {
                aggregate.push(group);
            }
            aggregate
        });

        let mut lookups = JoinSet::new();
        for service in &self.service_names {
            let adapter = self.adapter.clone();
            let service = service.clone();
            let cancel = cancel.clone();
            let tx = group_tx.clone();

            lookups.spawn(async move {
                let result = adapter.lookup(&service, &cancel, &tx).await;
                (service, result)
            });
        }
        drop(group_tx);

        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((service, Err(e))) if e.is_cancelled() => {
                    debug!("Lookup for {} cancelled in cycle {}", service, cycle);
                }
                Ok((service, Err(e))) => {
                    warn!("Lookup for {} failed in cycle {}: {}", service, cycle, e);
                    self.emit_event(EngineEvent::LookupFailed {
                        cycle,
                        service,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Lookup task failed in cycle {}: {}", cycle, e);
                    self.emit_event(EngineEvent::LookupFailed {
                        cycle,
                        service: String::new(),
                        error: e.to_string(),
                    });
                }
            }
        }

        match collector.await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                error!("Collector task failed in cycle {}: {}", cycle, e);
                Vec::new()
            }
        }
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Engine event channel full, dropping {:?}", event);
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
