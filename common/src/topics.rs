pub const CLIENT_UI: &str = "lamp_ui";
pub const CLIENT_SERVICE: &str = "lamp_service";
pub const CLIENT_BACKEND: &str = "lamp_web";

pub const DEVICE_TYPE_LAMP: &str = "lamp";
pub const DEVICE_TYPE_DOORBELL: &str = "doorbell";

pub const TOPIC_SET_LAMP_CONFIG: &str = "lamp/set_config";
pub const TOPIC_LAMP_CHANGED: &str = "lamp/changed";

/// Per-client liveness topic; doubles as the last-will topic ("0" is only
/// ever seen via the will).
pub fn client_state_topic(client_id: &str) -> String {
    format!("lamp/connection/{client_id}/state")
}

pub fn broker_bridge_connection_topic(device_id: &str) -> String {
    format!("$SYS/broker/connection/{device_id}_broker/state")
}

pub fn device_association_topic(device_id: &str, device_type: &str) -> String {
    format!("devices/{device_id}/{device_type}/associated")
}

pub fn device_notification_topic(device_id: &str, device_type: &str) -> String {
    format!("devices/{device_id}/{device_type}/notification")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_device_topics() {
        assert_eq!(
            device_association_topic("b827eb08451e", DEVICE_TYPE_LAMP),
            "devices/b827eb08451e/lamp/associated"
        );
        assert_eq!(
            device_notification_topic("b827eb08451e", DEVICE_TYPE_LAMP),
            "devices/b827eb08451e/lamp/notification"
        );
        assert_eq!(
            client_state_topic(CLIENT_UI),
            "lamp/connection/lamp_ui/state"
        );
    }
}
