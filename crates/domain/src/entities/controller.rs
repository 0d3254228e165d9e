//! Controller entity - an input device that can be paired with one robot

use serde::{Deserialize, Serialize};

use crate::ids::{ControllerId, RobotId};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controller {
    pub id: ControllerId,
    pub name: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_robot_id: Option<RobotId>,
    /// Older backends omit this field; a listed controller is enabled unless told otherwise.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Device type tag ("ps4", "ps5", "xbox", ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

impl Controller {
    pub fn new(id: impl Into<ControllerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connected: true,
            paired_robot_id: None,
            enabled: true,
            device_type: None,
        }
    }

    pub fn paired_with(mut self, robot_id: impl Into<RobotId>) -> Self {
        self.paired_robot_id = Some(robot_id.into());
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_paired(&self) -> bool {
        self.paired_robot_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_field_maps_to_device_type() {
        let controller: Controller = serde_json::from_value(serde_json::json!({
            "id": "ps5-0",
            "name": "DualSense",
            "type": "ps5",
            "connected": true,
            "pairedRobotId": "minibot-1"
        }))
        .expect("controller payload");

        assert_eq!(controller.device_type.as_deref(), Some("ps5"));
        assert_eq!(controller.paired_robot_id, Some(RobotId::from("minibot-1")));
        assert!(controller.enabled);
    }

    #[test]
    fn serializes_type_tag_back() {
        let value = serde_json::to_value(Controller::new("c1", "Pad").with_device_type("xbox"))
            .expect("serialize");
        assert_eq!(value["type"], "xbox");
        assert!(value.get("pairedRobotId").is_none());
    }
}
