use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a JSON wire payload. Malformed payloads are reported, never applied.
pub fn parse_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, PayloadError> {
    Ok(serde_json::from_slice(payload)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LampState {
    pub hue: f32,
    pub saturation: f32,
    pub brightness: f32,
    pub on: bool,
}

impl Default for LampState {
    fn default() -> Self {
        Self {
            hue: 1.0,
            saturation: 1.0,
            brightness: 1.0,
            on: true,
        }
    }
}

impl LampState {
    pub fn sanitize(&mut self) {
        self.hue = clamp_unit(self.hue);
        self.saturation = clamp_unit(self.saturation);
        self.brightness = clamp_unit(self.brightness);
    }

    /// Merge the fields present in `delta`; absent fields are left untouched.
    pub fn apply(&mut self, delta: LampStateDelta) {
        if let Some(hue) = delta.hue {
            self.hue = hue;
        }
        if let Some(saturation) = delta.saturation {
            self.saturation = saturation;
        }
        if let Some(brightness) = delta.brightness {
            self.brightness = brightness;
        }
        if let Some(on) = delta.on {
            self.on = on;
        }
        self.sanitize();
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Partial lamp state: a local intent or the field-presence half of a
/// snapshot. An all-`None` delta is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LampStateDelta {
    pub hue: Option<f32>,
    pub saturation: Option<f32>,
    pub brightness: Option<f32>,
    pub on: Option<bool>,
}

impl LampStateDelta {
    pub fn is_empty(&self) -> bool {
        self.hue.is_none()
            && self.saturation.is_none()
            && self.brightness.is_none()
            && self.on.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorField {
    pub h: f32,
    pub s: f32,
}

/// Wire form of a lamp state change. `color`, `brightness`, and `on` are each
/// optional; an absent field means "leave unchanged". `client` identifies the
/// process that originated the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    pub client: String,
}

impl StateSnapshot {
    pub fn full(state: LampState, client: impl Into<String>) -> Self {
        Self {
            color: Some(ColorField {
                h: state.hue,
                s: state.saturation,
            }),
            brightness: Some(state.brightness),
            on: Some(state.on),
            client: client.into(),
        }
    }

    pub fn delta(&self) -> LampStateDelta {
        LampStateDelta {
            hue: self.color.map(|color| color.h),
            saturation: self.color.map(|color| color.s),
            brightness: self.brightness,
            on: self.on,
        }
    }
}

/// Backend-owned association record, published retained. The device only ever
/// mirrors it. `code` is present iff `associated` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationStatus {
    pub associated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AssociationStatus {
    pub fn associated() -> Self {
        Self {
            associated: true,
            code: None,
        }
    }

    pub fn unassociated(code: impl Into<String>) -> Self {
        Self {
            associated: false,
            code: Some(code.into()),
        }
    }
}

/// Known notification kinds. Payloads with a kind not listed here fail to
/// parse and are dropped before they reach the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "doorbell_event")]
    DoorbellEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub hue: f32,
    #[serde(default)]
    pub saturation: f32,
    #[serde(default)]
    pub brightness: f32,
    #[serde(default)]
    pub num_flashes: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_snapshot_round_trips() {
        let state = LampState {
            hue: 0.5,
            saturation: 1.0,
            brightness: 0.8,
            on: true,
        };
        let snapshot = StateSnapshot::full(state, "lamp_ui");

        let encoded = serde_json::to_string(&snapshot).unwrap();
        let decoded: StateSnapshot = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.client, "lamp_ui");
    }

    #[test]
    fn partial_snapshot_leaves_absent_fields_none() {
        let snapshot: StateSnapshot =
            parse_json(br#"{"brightness": 0.6, "client": "backend"}"#).unwrap();

        assert_eq!(snapshot.color, None);
        assert_eq!(snapshot.brightness, Some(0.6));
        assert_eq!(snapshot.on, None);

        let delta = snapshot.delta();
        assert_eq!(delta.hue, None);
        assert_eq!(delta.saturation, None);
        assert_eq!(delta.brightness, Some(0.6));
        assert_eq!(delta.on, None);
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut state = LampState {
            hue: 0.5,
            saturation: 1.0,
            brightness: 0.8,
            on: true,
        };

        state.apply(LampStateDelta {
            brightness: Some(0.6),
            ..Default::default()
        });

        assert_eq!(state.hue, 0.5);
        assert_eq!(state.saturation, 1.0);
        assert_eq!(state.brightness, 0.6);
        assert!(state.on);
    }

    #[test]
    fn apply_clamps_out_of_range_values() {
        let mut state = LampState::default();
        state.apply(LampStateDelta {
            hue: Some(1.5),
            brightness: Some(-0.2),
            ..Default::default()
        });

        assert_eq!(state.hue, 1.0);
        assert_eq!(state.brightness, 0.0);
    }

    #[test]
    fn unknown_notification_kind_fails_to_parse() {
        let result = parse_json::<NotificationMessage>(
            br#"{"type": "smoke_alarm", "title": "x", "message": "y"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn notification_flash_fields_default_when_absent() {
        let msg: NotificationMessage = parse_json(
            br#"{"type": "doorbell_event", "title": "Front Door", "message": "hello"}"#,
        )
        .unwrap();

        assert_eq!(msg.kind, NotificationKind::DoorbellEvent);
        assert_eq!(msg.num_flashes, 0);
    }

    #[test]
    fn association_code_omitted_when_associated() {
        let encoded = serde_json::to_string(&AssociationStatus::associated()).unwrap();
        assert_eq!(encoded, r#"{"associated":true}"#);

        let encoded = serde_json::to_string(&AssociationStatus::unassociated("abc123")).unwrap();
        assert_eq!(encoded, r#"{"associated":false,"code":"abc123"}"#);
    }
}
