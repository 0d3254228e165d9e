//! The single task that owns scheduling for the synchronization core.
//!
//! Transport events, snapshot fetch completions, refresh requests, the stats
//! poll and the local countdown are all handled here, one at a time. Requests
//! run on short-lived spawned tasks that report back through the signal
//! channel, so nothing in this loop ever waits on the network.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use robodeck_domain::{Controller, Robot, TickOutcome};
use robodeck_shared::NetworkStats;

use crate::application::error::CommandError;
use crate::application::services::{
    CommandGateway, DiagnosticKind, Diagnostics, EntityStore, MatchTimerService, NetworkMonitor,
    RefreshTarget, TimerMode,
};
use crate::infrastructure::messaging::{ConnectionState, EventBus};
use crate::infrastructure::websocket::TransportEvent;

/// One step of the local countdown.
pub(super) const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// A fetched snapshot, ready to install.
#[derive(Debug)]
pub(super) enum Snapshot {
    Robots(Vec<Robot>),
    Controllers(Vec<Controller>),
    All(Vec<Robot>, Vec<Controller>),
}

/// Work handed to the loop from bus handlers, operator calls and its own
/// spawned requests.
#[derive(Debug)]
pub(super) enum CoreSignal {
    Refresh(RefreshTarget),
    /// Re-fetch after the settle delay (discovery in progress on the backend)
    RefreshAfterSettle(RefreshTarget),
    SettledRefreshDue(RefreshTarget),
    Fetched(Result<Snapshot, CommandError>),
    StatsFetched(Result<NetworkStats, CommandError>),
    TimerExpired,
    /// The local countdown was (re)started; realign its ticks
    CountdownStarted,
}

pub(super) struct CoreLoop {
    pub(super) bus: EventBus,
    pub(super) store: EntityStore,
    pub(super) timer: MatchTimerService,
    pub(super) gateway: CommandGateway,
    pub(super) network: NetworkMonitor,
    pub(super) diagnostics: Diagnostics,
    pub(super) signals: mpsc::UnboundedSender<CoreSignal>,
    pub(super) cancel: CancellationToken,
    pub(super) settle_delay: Duration,
    pub(super) stats_interval: Duration,
}

/// Mutable bookkeeping that only the loop touches.
#[derive(Default)]
struct Schedule {
    fetch_in_flight: bool,
    /// Merged target for the next fetch while one is in flight
    queued: Option<RefreshTarget>,
    settling: Vec<RefreshTarget>,
    stats_in_flight: bool,
}

impl CoreLoop {
    pub(super) async fn run(
        self,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        mut signal_rx: mpsc::UnboundedReceiver<CoreSignal>,
    ) {
        let mut schedule = Schedule::default();

        let mut stats = interval(self.stats_interval);
        stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let local = self.timer.mode() == TimerMode::Local;
        let mut countdown = interval_at(Instant::now() + COUNTDOWN_STEP, COUNTDOWN_STEP);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(timer_mode = %self.timer.mode(), "Core loop started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(event) = transport_rx.recv() => self.on_transport_event(event, &mut schedule),
                Some(signal) = signal_rx.recv() => {
                    self.on_signal(signal, &mut schedule, &mut countdown)
                }
                _ = stats.tick() => self.poll_stats(&mut schedule),
                _ = countdown.tick(), if local => self.on_countdown_tick(),
            }
        }

        tracing::debug!("Core loop exited");
    }

    fn on_transport_event(&self, event: TransportEvent, schedule: &mut Schedule) {
        match event {
            TransportEvent::Envelope(event) => {
                let delivered = self.bus.publish(&event);
                tracing::trace!(event_type = %event.event_type, delivered, "Published push event");
            }
            TransportEvent::StateChanged(ConnectionState::Connected) => {
                // Anything may have changed while the channel was down
                self.request_refresh(RefreshTarget::All, schedule);
            }
            TransportEvent::StateChanged(state) => {
                tracing::debug!(state = %state, "Push channel state");
            }
            TransportEvent::ProtocolError(error) => {
                self.diagnostics.record(DiagnosticKind::Protocol(error))
            }
            TransportEvent::TransportError(error) => {
                self.diagnostics.record(DiagnosticKind::Transport(error))
            }
        }
    }

    fn on_signal(&self, signal: CoreSignal, schedule: &mut Schedule, countdown: &mut Interval) {
        match signal {
            CoreSignal::Refresh(target) => self.request_refresh(target, schedule),
            CoreSignal::RefreshAfterSettle(target) => self.request_settled_refresh(target, schedule),
            CoreSignal::SettledRefreshDue(target) => {
                schedule.settling.retain(|t| *t != target);
                self.request_refresh(target, schedule);
            }
            CoreSignal::Fetched(result) => {
                schedule.fetch_in_flight = false;
                match result {
                    Ok(Snapshot::Robots(robots)) => {
                        self.store.replace_robots(robots);
                    }
                    Ok(Snapshot::Controllers(controllers)) => {
                        self.store.replace_controllers(controllers);
                    }
                    Ok(Snapshot::All(robots, controllers)) => {
                        self.store.replace_all(robots, controllers);
                    }
                    Err(e) => self.diagnostics.record_command(&e),
                }
                if let Some(next) = schedule.queued.take() {
                    self.begin_fetch(next, schedule);
                }
            }
            CoreSignal::StatsFetched(result) => {
                schedule.stats_in_flight = false;
                match result {
                    Ok(stats) => self.network.record(stats),
                    Err(e) => self.diagnostics.record_command(&e),
                }
            }
            CoreSignal::TimerExpired => self.on_expired(),
            CoreSignal::CountdownStarted => countdown.reset(),
        }
    }

    fn request_refresh(&self, target: RefreshTarget, schedule: &mut Schedule) {
        if schedule.fetch_in_flight {
            let merged = schedule.queued.map_or(target, |queued| queued.union(target));
            schedule.queued = Some(merged);
            return;
        }
        self.begin_fetch(target, schedule);
    }

    fn request_settled_refresh(&self, target: RefreshTarget, schedule: &mut Schedule) {
        if schedule.settling.contains(&target) {
            return;
        }
        schedule.settling.push(target);

        let signals = self.signals.clone();
        let cancel = self.cancel.clone();
        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = signals.send(CoreSignal::SettledRefreshDue(target));
                }
            }
        });
    }

    fn begin_fetch(&self, target: RefreshTarget, schedule: &mut Schedule) {
        schedule.fetch_in_flight = true;
        tracing::debug!(?target, "Fetching snapshot");

        let gateway = self.gateway.clone();
        let signals = self.signals.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = fetch(&gateway, target) => result,
            };
            let _ = signals.send(CoreSignal::Fetched(result));
        });
    }

    fn poll_stats(&self, schedule: &mut Schedule) {
        if schedule.stats_in_flight {
            return;
        }
        schedule.stats_in_flight = true;

        let gateway = self.gateway.clone();
        let signals = self.signals.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = gateway.get_network_stats() => result,
            };
            let _ = signals.send(CoreSignal::StatsFetched(result));
        });
    }

    fn on_countdown_tick(&self) {
        if !self.timer.state().running() {
            return;
        }
        if self.timer.advance(COUNTDOWN_STEP) == TickOutcome::Expired {
            self.on_expired();
        }
    }

    /// Expiry is reported once per run, so this issues exactly one request.
    fn on_expired(&self) {
        tracing::warn!("Match timer expired, activating emergency stop");

        let gateway = self.gateway.clone();
        let diagnostics = self.diagnostics.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = gateway.activate_emergency_stop() => result,
            };
            if let Err(e) = result {
                diagnostics.record_command(&e);
            }
        });
    }
}

async fn fetch(gateway: &CommandGateway, target: RefreshTarget) -> Result<Snapshot, CommandError> {
    match target {
        RefreshTarget::Robots => Ok(Snapshot::Robots(gateway.list_robots().await?)),
        RefreshTarget::Controllers => Ok(Snapshot::Controllers(gateway.list_controllers().await?)),
        RefreshTarget::All => {
            let (robots, controllers) =
                tokio::join!(gateway.list_robots(), gateway.list_controllers());
            Ok(Snapshot::All(robots?, controllers?))
        }
    }
}
