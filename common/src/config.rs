use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub username: String,
    pub password: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: 60,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("MQTT_HOST") {
            config.host = host;
        }
        if let Some(port) = std::env::var("MQTT_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.port = port;
        }
        if let Ok(user) = std::env::var("MQTT_USER") {
            config.username = user;
            config.password = std::env::var("MQTT_PASS").unwrap_or_default();
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub publish_debounce_ms: u64,
    pub screen_dim_timeout_ms: u64,
    pub dim_step_interval_ms: u64,
    pub backlight_max: u8,
    pub backlight_floor: u8,
    pub notification_visible_ms: u64,
    pub button_poll_interval_ms: u64,
    pub code_display_len: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            publish_debounce_ms: 10,
            screen_dim_timeout_ms: 60_000,
            dim_step_interval_ms: 15,
            backlight_max: 255,
            backlight_floor: 5,
            notification_visible_ms: 10_000,
            button_poll_interval_ms: 50,
            code_display_len: 6,
        }
    }
}

impl UiConfig {
    pub fn sanitize(&mut self) {
        if self.backlight_floor >= self.backlight_max {
            self.backlight_floor = 5;
            self.backlight_max = 255;
        }
        self.publish_debounce_ms = self.publish_debounce_ms.max(1);
        self.dim_step_interval_ms = self.dim_step_interval_ms.max(1);
        self.button_poll_interval_ms = self.button_poll_interval_ms.max(10);
    }
}

/// 12 hex character device identity, normally derived from the primary
/// network interface's MAC address.
pub fn device_id() -> String {
    std::env::var("LAMPI_DEVICE_ID").unwrap_or_else(|_| "b827eb000000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_restores_inverted_backlight_bounds() {
        let mut config = UiConfig {
            backlight_max: 4,
            backlight_floor: 200,
            ..UiConfig::default()
        };
        config.sanitize();
        assert_eq!(config.backlight_max, 255);
        assert_eq!(config.backlight_floor, 5);
    }
}
