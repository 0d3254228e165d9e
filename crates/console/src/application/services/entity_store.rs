//! Entity Store - last authoritative snapshot of robots and controllers.
//!
//! Snapshots replace the previous collection wholesale; nothing here patches
//! individual records and nothing is mutated optimistically when an intent is
//! issued. Accepted intents are tracked as [`PendingIntent`] markers instead,
//! and a marker disappears as soon as the next snapshot of its collection is
//! installed.
//!
//! Every install re-checks the snapshot invariants across both collections.
//! A violation is recorded as a diagnostic but never blocks the install: the
//! backend is the source of record even when it is wrong.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use robodeck_domain::{check_snapshot, Controller, ControllerId, InvariantViolation, Robot, RobotId};

use crate::infrastructure::lock;
use crate::infrastructure::messaging::{Listeners, Subscription};

use super::diagnostics::{DiagnosticKind, Diagnostics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Robots,
    Controllers,
}

/// Which collections a re-fetch should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTarget {
    Robots,
    Controllers,
    All,
}

impl RefreshTarget {
    pub fn includes(self, collection: Collection) -> bool {
        matches!(
            (self, collection),
            (RefreshTarget::All, _)
                | (RefreshTarget::Robots, Collection::Robots)
                | (RefreshTarget::Controllers, Collection::Controllers)
        )
    }

    pub fn union(self, other: RefreshTarget) -> RefreshTarget {
        if self == other {
            self
        } else {
            RefreshTarget::All
        }
    }
}

/// An intent the backend accepted but whose effect has not been observed in a
/// snapshot yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingIntent {
    pub operation: &'static str,
    /// Id of the robot or controller the intent targets
    pub target: String,
    pub collection: Collection,
    pub issued_at: DateTime<Utc>,
}

struct StoreState {
    robots: Arc<[Robot]>,
    controllers: Arc<[Controller]>,
    robots_installed: bool,
    controllers_installed: bool,
    pending: Vec<PendingIntent>,
}

impl StoreState {
    fn clear_pending(&mut self, collection: Collection) {
        self.pending.retain(|p| p.collection != collection);
    }

    /// Checks only run once both collections have arrived at least once: a
    /// robot list cannot be validated against a controller list that does not
    /// exist yet.
    fn violations(&self) -> Vec<InvariantViolation> {
        if self.robots_installed && self.controllers_installed {
            check_snapshot(&self.robots, &self.controllers)
        } else {
            Vec::new()
        }
    }
}

#[derive(Clone)]
pub struct EntityStore {
    state: Arc<Mutex<StoreState>>,
    robot_listeners: Listeners<Arc<[Robot]>>,
    controller_listeners: Listeners<Arc<[Controller]>>,
    diagnostics: Diagnostics,
}

impl EntityStore {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                robots: Arc::from(Vec::new()),
                controllers: Arc::from(Vec::new()),
                robots_installed: false,
                controllers_installed: false,
                pending: Vec::new(),
            })),
            robot_listeners: Listeners::new(),
            controller_listeners: Listeners::new(),
            diagnostics,
        }
    }

    /// Install a new robot snapshot. Returns the invariant violations found.
    pub fn replace_robots(&self, robots: Vec<Robot>) -> Vec<InvariantViolation> {
        let (snapshot, violations) = {
            let mut state = lock(&self.state);
            state.robots = Arc::from(robots);
            state.robots_installed = true;
            state.clear_pending(Collection::Robots);
            (Arc::clone(&state.robots), state.violations())
        };
        tracing::debug!(count = snapshot.len(), "Installed robot snapshot");

        self.report(&violations);
        self.robot_listeners.notify(snapshot);
        violations
    }

    /// Install a new controller snapshot. Returns the invariant violations found.
    pub fn replace_controllers(&self, controllers: Vec<Controller>) -> Vec<InvariantViolation> {
        let (snapshot, violations) = {
            let mut state = lock(&self.state);
            state.controllers = Arc::from(controllers);
            state.controllers_installed = true;
            state.clear_pending(Collection::Controllers);
            (Arc::clone(&state.controllers), state.violations())
        };
        tracing::debug!(count = snapshot.len(), "Installed controller snapshot");

        self.report(&violations);
        self.controller_listeners.notify(snapshot);
        violations
    }

    /// Install both collections as one snapshot, checked once.
    ///
    /// Pairing spans both collections, so fetching them together and
    /// installing them here avoids flagging the half-updated state in between.
    pub fn replace_all(
        &self,
        robots: Vec<Robot>,
        controllers: Vec<Controller>,
    ) -> Vec<InvariantViolation> {
        let (robot_snapshot, controller_snapshot, violations) = {
            let mut state = lock(&self.state);
            state.robots = Arc::from(robots);
            state.controllers = Arc::from(controllers);
            state.robots_installed = true;
            state.controllers_installed = true;
            state.clear_pending(Collection::Robots);
            state.clear_pending(Collection::Controllers);
            (
                Arc::clone(&state.robots),
                Arc::clone(&state.controllers),
                state.violations(),
            )
        };
        tracing::debug!(
            robots = robot_snapshot.len(),
            controllers = controller_snapshot.len(),
            "Installed fleet snapshot"
        );

        self.report(&violations);
        self.robot_listeners.notify(robot_snapshot);
        self.controller_listeners.notify(controller_snapshot);
        violations
    }

    fn report(&self, violations: &[InvariantViolation]) {
        for violation in violations {
            self.diagnostics
                .record(DiagnosticKind::Invariant(violation.clone()));
        }
    }

    pub fn current_robots(&self) -> Arc<[Robot]> {
        Arc::clone(&lock(&self.state).robots)
    }

    pub fn current_controllers(&self) -> Arc<[Controller]> {
        Arc::clone(&lock(&self.state).controllers)
    }

    pub fn robot(&self, id: &RobotId) -> Option<Robot> {
        lock(&self.state).robots.iter().find(|r| &r.id == id).cloned()
    }

    pub fn controller(&self, id: &ControllerId) -> Option<Controller> {
        lock(&self.state)
            .controllers
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }

    /// Whether both collections have been installed at least once.
    pub fn is_synchronized(&self) -> bool {
        let state = lock(&self.state);
        state.robots_installed && state.controllers_installed
    }

    pub fn mark_pending(&self, intent: PendingIntent) {
        tracing::debug!(
            operation = intent.operation,
            target = %intent.target,
            "Intent accepted, awaiting snapshot"
        );
        lock(&self.state).pending.push(intent);
    }

    pub fn pending_intents(&self) -> Vec<PendingIntent> {
        lock(&self.state).pending.clone()
    }

    pub fn has_pending(&self, collection: Collection) -> bool {
        lock(&self.state)
            .pending
            .iter()
            .any(|p| p.collection == collection)
    }

    /// Receive every installed robot snapshot.
    pub fn subscribe_robots<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Arc<[Robot]>) + Send + Sync + 'static,
    {
        self.robot_listeners.add(Arc::new(listener))
    }

    /// Receive every installed controller snapshot.
    pub fn subscribe_controllers<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Arc<[Controller]>) + Send + Sync + 'static,
    {
        self.controller_listeners.add(Arc::new(listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use robodeck_domain::RobotStatus;

    fn store() -> (EntityStore, Diagnostics) {
        let diagnostics = Diagnostics::new(100, Arc::new(FixedClock(Utc::now())));
        (EntityStore::new(diagnostics.clone()), diagnostics)
    }

    fn intent(operation: &'static str, target: &str, collection: Collection) -> PendingIntent {
        PendingIntent {
            operation,
            target: target.to_string(),
            collection,
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn one_sided_pairing_is_accepted_and_flagged_once() {
        let (store, diagnostics) = store();
        store.replace_all(
            vec![Robot::new("r1", "Robot 1").paired_with("c1")],
            vec![Controller::new("c1", "Pad 1").paired_with("r1")],
        );
        assert!(diagnostics.is_empty());

        // r1 dropped the pairing, c1 still claims it
        let violations = store.replace_robots(vec![Robot::new("r1", "Robot 1")]);

        assert_eq!(violations.len(), 1);
        assert_eq!(diagnostics.invariant_violations(), violations);
        assert_eq!(store.current_robots()[0].paired_controller_id, None);
    }

    #[test]
    fn snapshot_replaces_collection_wholesale() {
        let (store, _) = store();
        store.replace_robots(vec![Robot::new("r1", "Robot 1"), Robot::new("r2", "Robot 2")]);
        store.replace_robots(vec![
            Robot::new("r2", "Robot 2").with_status(RobotStatus::Connected)
        ]);

        assert_eq!(store.current_robots().len(), 1);
        assert!(store.robot(&RobotId::from("r1")).is_none());
        assert!(store
            .robot(&RobotId::from("r2"))
            .is_some_and(|r| r.is_connected()));
    }

    #[test]
    fn no_checks_until_both_collections_arrive() {
        let (store, diagnostics) = store();
        let violations = store.replace_robots(vec![Robot::new("r1", "Robot 1").paired_with("c1")]);
        assert!(violations.is_empty());
        assert!(!store.is_synchronized());

        let violations = store.replace_controllers(vec![Controller::new("c1", "Pad 1")]);
        assert_eq!(violations.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert!(store.is_synchronized());
    }

    #[test]
    fn pending_markers_clear_on_next_snapshot_of_their_collection() {
        let (store, _) = store();
        store.mark_pending(intent("connect_robot", "r1", Collection::Robots));
        store.mark_pending(intent("pair_controller", "c1", Collection::Controllers));

        // Nothing changes in the store until a snapshot arrives
        assert!(store.current_robots().is_empty());

        store.replace_controllers(vec![Controller::new("c1", "Pad 1")]);
        assert!(!store.has_pending(Collection::Controllers));
        assert!(store.has_pending(Collection::Robots));

        store.replace_robots(vec![Robot::new("r1", "Robot 1")]);
        assert!(store.pending_intents().is_empty());
    }

    #[test]
    fn listeners_receive_installed_snapshots() {
        let (store, _) = store();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let counts_clone = Arc::clone(&counts);
        let sub = store.subscribe_robots(move |robots| counts_clone.lock().unwrap().push(robots.len()));

        store.replace_robots(vec![Robot::new("r1", "Robot 1")]);
        store.replace_all(vec![], vec![]);
        sub.dispose();
        store.replace_robots(vec![Robot::new("r1", "Robot 1")]);

        assert_eq!(*counts.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn refresh_targets_merge() {
        assert_eq!(RefreshTarget::Robots.union(RefreshTarget::Robots), RefreshTarget::Robots);
        assert_eq!(RefreshTarget::Robots.union(RefreshTarget::Controllers), RefreshTarget::All);
        assert!(RefreshTarget::All.includes(Collection::Controllers));
        assert!(!RefreshTarget::Robots.includes(Collection::Controllers));
    }
}
