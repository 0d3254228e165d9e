//! Snapshot invariants.
//!
//! The backend is the source of record, so a violated invariant never blocks a
//! snapshot from being installed. These checks only describe what is wrong so
//! the caller can surface it as a diagnostic.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use crate::entities::{Controller, Robot};
use crate::ids::{ControllerId, RobotId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// One side of a robot/controller pair references the other, but the
    /// reference is not returned.
    PairingAsymmetry {
        robot_id: RobotId,
        controller_id: ControllerId,
        /// What the robot claims (None if the robot is absent or unpaired)
        robot_claims: Option<ControllerId>,
        /// What the controller claims (None if the controller is absent or unpaired)
        controller_claims: Option<RobotId>,
    },
    /// A disabled robot reported as connected or paired
    DisabledRobotActive { robot_id: RobotId },
    /// A disabled controller reported as paired
    DisabledControllerPaired { controller_id: ControllerId },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::PairingAsymmetry {
                robot_id,
                controller_id,
                robot_claims,
                controller_claims,
            } => write!(
                f,
                "one-sided pairing between robot {} and controller {} (robot -> {}, controller -> {})",
                robot_id,
                controller_id,
                robot_claims.as_ref().map_or("none", |c| c.as_str()),
                controller_claims.as_ref().map_or("none", |r| r.as_str()),
            ),
            InvariantViolation::DisabledRobotActive { robot_id } => {
                write!(f, "disabled robot {} reported connected or paired", robot_id)
            }
            InvariantViolation::DisabledControllerPaired { controller_id } => {
                write!(f, "disabled controller {} reported paired", controller_id)
            }
        }
    }
}

/// Check a pair of snapshots against the pairing-symmetry and
/// disabled-implies-inactive invariants.
///
/// Each asymmetric (robot, controller) pair is reported once no matter which
/// side it was discovered from. Output order is deterministic.
pub fn check_snapshot(robots: &[Robot], controllers: &[Controller]) -> Vec<InvariantViolation> {
    let robot_claims: HashMap<&RobotId, Option<&ControllerId>> = robots
        .iter()
        .map(|r| (&r.id, r.paired_controller_id.as_ref()))
        .collect();
    let controller_claims: HashMap<&ControllerId, Option<&RobotId>> = controllers
        .iter()
        .map(|c| (&c.id, c.paired_robot_id.as_ref()))
        .collect();

    let mut asymmetric: BTreeSet<(RobotId, ControllerId)> = BTreeSet::new();

    for robot in robots {
        if let Some(controller_id) = &robot.paired_controller_id {
            let reciprocated = controller_claims
                .get(controller_id)
                .copied()
                .flatten()
                .is_some_and(|claimed| claimed == &robot.id);
            if !reciprocated {
                asymmetric.insert((robot.id.clone(), controller_id.clone()));
            }
        }
    }

    for controller in controllers {
        if let Some(robot_id) = &controller.paired_robot_id {
            let reciprocated = robot_claims
                .get(robot_id)
                .copied()
                .flatten()
                .is_some_and(|claimed| claimed == &controller.id);
            if !reciprocated {
                asymmetric.insert((robot_id.clone(), controller.id.clone()));
            }
        }
    }

    let mut violations: Vec<InvariantViolation> = asymmetric
        .into_iter()
        .map(|(robot_id, controller_id)| InvariantViolation::PairingAsymmetry {
            robot_claims: robot_claims.get(&robot_id).copied().flatten().cloned(),
            controller_claims: controller_claims
                .get(&controller_id)
                .copied()
                .flatten()
                .cloned(),
            robot_id,
            controller_id,
        })
        .collect();

    violations.extend(
        robots
            .iter()
            .filter(|r| r.disabled && (r.is_connected() || r.is_paired()))
            .map(|r| InvariantViolation::DisabledRobotActive {
                robot_id: r.id.clone(),
            }),
    );
    violations.extend(
        controllers
            .iter()
            .filter(|c| !c.enabled && c.is_paired())
            .map(|c| InvariantViolation::DisabledControllerPaired {
                controller_id: c.id.clone(),
            }),
    );

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::RobotStatus;

    #[test]
    fn symmetric_pairing_is_clean() {
        let robots = vec![Robot::new("r1", "R1").paired_with("c1"), Robot::new("r2", "R2")];
        let controllers = vec![Controller::new("c1", "Pad").paired_with("r1")];

        assert!(check_snapshot(&robots, &controllers).is_empty());
    }

    #[test]
    fn controller_claiming_unpaired_robot_is_reported_once() {
        let robots = vec![Robot::new("r1", "R1")];
        let controllers = vec![Controller::new("c1", "Pad").paired_with("r1")];

        let violations = check_snapshot(&robots, &controllers);
        assert_eq!(
            violations,
            vec![InvariantViolation::PairingAsymmetry {
                robot_id: RobotId::from("r1"),
                controller_id: ControllerId::from("c1"),
                robot_claims: None,
                controller_claims: Some(RobotId::from("r1")),
            }]
        );
    }

    #[test]
    fn robot_pointing_at_missing_controller_is_reported() {
        let robots = vec![Robot::new("r1", "R1").paired_with("ghost")];

        let violations = check_snapshot(&robots, &[]);
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            &violations[0],
            InvariantViolation::PairingAsymmetry { controller_claims: None, .. }
        ));
    }

    #[test]
    fn crossed_pairings_report_each_pair() {
        // r1 -> c1, but c1 -> r2 and r2 is unpaired
        let robots = vec![Robot::new("r1", "R1").paired_with("c1"), Robot::new("r2", "R2")];
        let controllers = vec![Controller::new("c1", "Pad").paired_with("r2")];

        let violations = check_snapshot(&robots, &controllers);
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn disabled_robot_must_not_be_connected() {
        let robots = vec![Robot::new("r1", "R1")
            .with_status(RobotStatus::Connected)
            .disabled()];

        assert_eq!(
            check_snapshot(&robots, &[]),
            vec![InvariantViolation::DisabledRobotActive {
                robot_id: RobotId::from("r1")
            }]
        );
    }

    #[test]
    fn disabled_controller_must_not_be_paired() {
        let robots = vec![Robot::new("r1", "R1").paired_with("c1")];
        let controllers = vec![Controller::new("c1", "Pad").paired_with("r1").disabled()];

        assert_eq!(
            check_snapshot(&robots, &controllers),
            vec![InvariantViolation::DisabledControllerPaired {
                controller_id: ControllerId::from("c1")
            }]
        );
    }
}
