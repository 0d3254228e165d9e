//! SyncCore - the synchronization core as one explicitly constructed value.
//!
//! Wires the transport, event bus, log aggregator, entity store, match timer
//! and command gateway together and owns their lifecycle. Presentation code
//! reads through the accessors and issues operator intents through the async
//! methods; it never mutates services directly.
//!
//! Every accepted intent is followed by a re-fetch of the authoritative
//! snapshot rather than a local edit. Until that snapshot lands the intent is
//! visible only as a [`PendingIntent`] marker in the store.

mod core_loop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use robodeck_domain::{ControllerId, RobotId, TickOutcome, TimerError};
use robodeck_shared::event_types;

use crate::application::error::{CommandError, CoreError};
use crate::application::services::{
    Collection, CommandGateway, DiagnosticKind, Diagnostics, EntityStore, LogAggregator,
    MatchTimerService, NetworkMonitor, PendingIntent, RefreshTarget, TimerEventError, TimerMode,
};
use crate::config::ConsoleConfig;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::lock;
use crate::infrastructure::messaging::{
    ConnectionState, ConnectionStateObserver, EventBus, Subscription,
};
use crate::infrastructure::websocket::{TransportEvent, TransportManager};
use crate::ports::outbound::{ClockPort, RawApiPort};

use core_loop::{CoreLoop, CoreSignal};

type Inbox = (
    mpsc::UnboundedReceiver<TransportEvent>,
    mpsc::UnboundedReceiver<CoreSignal>,
);

pub struct SyncCore {
    config: ConsoleConfig,
    clock: Arc<dyn ClockPort>,
    bus: EventBus,
    logs: LogAggregator,
    store: EntityStore,
    timer: MatchTimerService,
    gateway: CommandGateway,
    network: NetworkMonitor,
    diagnostics: Diagnostics,
    transport: TransportManager,
    signals: mpsc::UnboundedSender<CoreSignal>,
    inbox: Mutex<Option<Inbox>>,
    subscriptions: Mutex<Vec<Subscription>>,
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    #[cfg(test)]
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl SyncCore {
    pub fn new(config: ConsoleConfig, api: Arc<dyn RawApiPort>) -> Result<Self, TimerError> {
        Self::with_clock(config, api, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ConsoleConfig,
        api: Arc<dyn RawApiPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, TimerError> {
        let timer = MatchTimerService::new(config.timer_mode, config.match_duration_ms())?;
        let diagnostics = Diagnostics::new(config.log_capacity, Arc::clone(&clock));

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let transport = TransportManager::new(
            config.ws_url.as_str(),
            config.reconnect_delay,
            transport_tx.clone(),
        );

        Ok(Self {
            bus: EventBus::new(),
            logs: LogAggregator::new(config.log_capacity, Arc::clone(&clock)),
            store: EntityStore::new(diagnostics.clone()),
            timer,
            gateway: CommandGateway::new(api),
            network: NetworkMonitor::new(config.stats_history),
            diagnostics,
            transport,
            signals,
            inbox: Mutex::new(Some((transport_rx, signal_rx))),
            subscriptions: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            task: Mutex::new(None),
            #[cfg(test)]
            transport_tx,
            config,
            clock,
        })
    }

    /// Subscribe the services to the bus, open the push channel, issue the
    /// initial fetch and spawn the core loop. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> Result<(), CoreError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CoreError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyStarted);
        }
        let Some((transport_rx, signal_rx)) = lock(&self.inbox).take() else {
            return Err(CoreError::AlreadyStarted);
        };

        tracing::info!(
            api_url = %self.config.api_url,
            ws_url = %self.config.ws_url,
            timer_mode = %self.timer.mode(),
            "Starting synchronization core"
        );

        let mut subscriptions = self.logs.attach(&self.bus);
        subscriptions.extend(self.subscribe_refresh_triggers());
        subscriptions.extend(self.subscribe_timer());
        lock(&self.subscriptions).extend(subscriptions);

        if let Err(e) = self.transport.start() {
            self.diagnostics.record(DiagnosticKind::Transport(e));
        }

        self.signal(CoreSignal::Refresh(RefreshTarget::All));
        if self.timer.mode() == TimerMode::Authoritative {
            self.seed_timer();
        }

        let core_loop = CoreLoop {
            bus: self.bus.clone(),
            store: self.store.clone(),
            timer: self.timer.clone(),
            gateway: self.gateway.clone(),
            network: self.network.clone(),
            diagnostics: self.diagnostics.clone(),
            signals: self.signals.clone(),
            cancel: self.cancel.clone(),
            settle_delay: self.config.refresh_settle_delay,
            stats_interval: self.config.stats_interval,
        };
        *lock(&self.task) = Some(tokio::spawn(core_loop.run(transport_rx, signal_rx)));
        Ok(())
    }

    /// Tear everything down. Idempotent; the core cannot be restarted.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Stopping synchronization core");

        // Cancels the loop, pending settle delays and in-flight fetches
        self.cancel.cancel();
        for subscription in lock(&self.subscriptions).drain(..) {
            subscription.dispose();
        }
        self.transport.stop().await;

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Core loop ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn signal(&self, signal: CoreSignal) {
        // Only fails once the loop is gone, when nothing needs refreshing anymore
        let _ = self.signals.send(signal);
    }

    fn subscribe_refresh_triggers(&self) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();
        let triggers: [(&[&str], CoreSignalFactory); 4] = [
            (event_types::ROBOT_SNAPSHOT_EVENTS, || {
                CoreSignal::Refresh(RefreshTarget::Robots)
            }),
            (&[event_types::ROBOTS_REFRESHING], || {
                CoreSignal::RefreshAfterSettle(RefreshTarget::Robots)
            }),
            // Pairing is carried on both sides, so controller changes refresh both
            (event_types::CONTROLLER_SNAPSHOT_EVENTS, || {
                CoreSignal::Refresh(RefreshTarget::All)
            }),
            (&[event_types::CONTROLLERS_REFRESHING], || {
                CoreSignal::RefreshAfterSettle(RefreshTarget::All)
            }),
        ];

        for (types, make_signal) in triggers {
            let signals = self.signals.clone();
            subscriptions.extend(self.bus.subscribe_many(types, move |_| {
                let _ = signals.send(make_signal());
            }));
        }
        subscriptions
    }

    fn subscribe_timer(&self) -> Vec<Subscription> {
        let timer = self.timer.clone();
        let diagnostics = self.diagnostics.clone();
        let signals = self.signals.clone();
        self.bus
            .subscribe_many(&self.timer.event_types(), move |event| {
                match timer.apply_event(event) {
                    Ok(TickOutcome::Expired) => {
                        let _ = signals.send(CoreSignal::TimerExpired);
                    }
                    Ok(_) => {}
                    Err(TimerEventError::Payload(e)) => {
                        diagnostics.record(DiagnosticKind::Protocol(e))
                    }
                    Err(TimerEventError::Transition(e)) => {
                        diagnostics.record(DiagnosticKind::TimerRejected(e))
                    }
                }
            })
    }

    fn seed_timer(&self) {
        let gateway = self.gateway.clone();
        let timer = self.timer.clone();
        let diagnostics = self.diagnostics.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = gateway.get_match_timer() => result,
            };
            match result {
                Ok(snapshot) => {
                    timer.seed(&snapshot);
                }
                Err(e) => diagnostics.record_command(&e),
            }
        });
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn timer(&self) -> &MatchTimerService {
        &self.timer
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Owned read-only handle on the push channel state, for listeners that
    /// outlive a borrow of the core.
    pub fn connection(&self) -> ConnectionStateObserver {
        self.transport.observer()
    }

    /// Empty the operator log.
    pub fn clear_logs(&self) {
        self.logs.clear();
    }

    // =========================================================================
    // Operator intents
    // =========================================================================

    fn ensure_running(&self) -> Result<(), CommandError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CommandError::NotStarted)
        }
    }

    /// Record the outcome of an entity intent. Accepted intents become pending
    /// markers and queue a re-fetch; rejections become diagnostics.
    fn settle_entity_intent(
        &self,
        result: Result<(), CommandError>,
        operation: &'static str,
        target: &str,
        collection: Collection,
    ) -> Result<(), CommandError> {
        match &result {
            Ok(()) => {
                self.store.mark_pending(PendingIntent {
                    operation,
                    target: target.to_string(),
                    collection,
                    issued_at: self.clock.now(),
                });
                let refresh = match collection {
                    Collection::Robots => RefreshTarget::Robots,
                    Collection::Controllers => RefreshTarget::All,
                };
                self.signal(CoreSignal::Refresh(refresh));
            }
            Err(e) => self.diagnostics.record_command(e),
        }
        result
    }

    fn settle_intent(&self, result: Result<(), CommandError>) -> Result<(), CommandError> {
        if let Err(e) = &result {
            self.diagnostics.record_command(e);
        }
        result
    }

    pub async fn connect_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.connect_robot(robot_id).await;
        self.settle_entity_intent(result, "connect_robot", robot_id.as_str(), Collection::Robots)
    }

    pub async fn disconnect_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.disconnect_robot(robot_id).await;
        self.settle_entity_intent(
            result,
            "disconnect_robot",
            robot_id.as_str(),
            Collection::Robots,
        )
    }

    pub async fn enable_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.enable_robot(robot_id).await;
        self.settle_entity_intent(result, "enable_robot", robot_id.as_str(), Collection::Robots)
    }

    pub async fn disable_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.disable_robot(robot_id).await;
        self.settle_entity_intent(result, "disable_robot", robot_id.as_str(), Collection::Robots)
    }

    /// Ask the backend to rediscover robots; the snapshot is re-fetched once
    /// discovery has had time to settle.
    pub async fn refresh_robots(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.settle_intent(self.gateway.refresh_robots().await);
        if result.is_ok() {
            self.signal(CoreSignal::RefreshAfterSettle(RefreshTarget::Robots));
        }
        result
    }

    pub async fn pair_controller(
        &self,
        controller_id: &ControllerId,
        robot_id: &RobotId,
    ) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.pair_controller(controller_id, robot_id).await;
        self.settle_entity_intent(
            result,
            "pair_controller",
            controller_id.as_str(),
            Collection::Controllers,
        )
    }

    pub async fn unpair_controller(&self, controller_id: &ControllerId) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.unpair_controller(controller_id).await;
        self.settle_entity_intent(
            result,
            "unpair_controller",
            controller_id.as_str(),
            Collection::Controllers,
        )
    }

    pub async fn enable_controller(&self, controller_id: &ControllerId) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.enable_controller(controller_id).await;
        self.settle_entity_intent(
            result,
            "enable_controller",
            controller_id.as_str(),
            Collection::Controllers,
        )
    }

    pub async fn disable_controller(
        &self,
        controller_id: &ControllerId,
    ) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.gateway.disable_controller(controller_id).await;
        self.settle_entity_intent(
            result,
            "disable_controller",
            controller_id.as_str(),
            Collection::Controllers,
        )
    }

    pub async fn refresh_controllers(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        let result = self.settle_intent(self.gateway.refresh_controllers().await);
        if result.is_ok() {
            self.signal(CoreSignal::RefreshAfterSettle(RefreshTarget::All));
        }
        result
    }

    pub async fn activate_emergency_stop(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        self.settle_intent(self.gateway.activate_emergency_stop().await)
    }

    pub async fn deactivate_emergency_stop(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        self.settle_intent(self.gateway.deactivate_emergency_stop().await)
    }

    /// Start the match. Rejected locally, without a request, while the timer
    /// runs, has expired or emergency stop is active.
    pub async fn start_match(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        match self.timer.mode() {
            TimerMode::Authoritative => {
                self.settle_intent(self.timer.guard_start().map_err(CommandError::from))?;
                self.settle_intent(self.gateway.start_match().await)
            }
            TimerMode::Local => {
                self.settle_intent(self.timer.start().map_err(CommandError::from))?;
                self.signal(CoreSignal::CountdownStarted);
                Ok(())
            }
        }
    }

    pub async fn stop_match(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        match self.timer.mode() {
            TimerMode::Authoritative => self.settle_intent(self.gateway.stop_match().await),
            TimerMode::Local => self.settle_intent(self.timer.stop().map_err(CommandError::from)),
        }
    }

    pub async fn reset_match(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        match self.timer.mode() {
            TimerMode::Authoritative => self.settle_intent(self.gateway.reset_match().await),
            TimerMode::Local => {
                self.timer.reset();
                Ok(())
            }
        }
    }

    /// Change the configured match duration. Rejected while the match runs,
    /// leaving the duration untouched.
    pub async fn set_match_duration(&self, seconds: u64) -> Result<(), CommandError> {
        self.ensure_running()?;
        let duration_ms = seconds.saturating_mul(1000);
        match self.timer.mode() {
            TimerMode::Authoritative => {
                self.settle_intent(
                    self.timer
                        .guard_set_duration(duration_ms)
                        .map_err(CommandError::from),
                )?;
                self.settle_intent(self.gateway.set_match_duration(seconds).await)
            }
            TimerMode::Local => self.settle_intent(
                self.timer
                    .set_duration(duration_ms)
                    .map_err(CommandError::from),
            ),
        }
    }

    #[cfg(test)]
    fn inject(&self, event: TransportEvent) {
        let _ = self.transport_tx.send(event);
    }
}

type CoreSignalFactory = fn() -> CoreSignal;

impl Drop for SyncCore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
