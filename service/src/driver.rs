use lampi_common::{color, LampState, StateSnapshot};

/// Outbound state-changed broadcast. `origin` is the client that caused the
/// change, not this process — subscribers use it to recognize their own
/// echoes.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub state: LampState,
    pub origin: String,
}

impl Broadcast {
    pub fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot::full(self.state, self.origin.clone())
    }
}

/// Owner of the authoritative on-device lamp state. Applies partial
/// set-config commands and answers with the full resulting state.
pub struct LampDriver {
    state: LampState,
}

impl LampDriver {
    pub fn new() -> Self {
        Self {
            state: LampState::default(),
        }
    }

    pub fn state(&self) -> LampState {
        self.state
    }

    /// Merge a command and produce the broadcast. Reapplying the same
    /// command is harmless (last-applied-wins), so QoS redelivery needs no
    /// special casing.
    pub fn apply_command(&mut self, command: &StateSnapshot) -> Broadcast {
        self.state.apply(command.delta());
        Broadcast {
            state: self.state,
            origin: command.client.clone(),
        }
    }

    /// Announce current state so late subscribers can bootstrap; sent on
    /// every (re)connect, attributed to this process.
    pub fn startup_broadcast(&self, client_id: &str) -> Broadcast {
        Broadcast {
            state: self.state,
            origin: client_id.to_string(),
        }
    }

    /// Physical output value: a lamp that is off is dark, whatever its color.
    pub fn rgb(&self) -> (u8, u8, u8) {
        let value = if self.state.on {
            self.state.brightness
        } else {
            0.0
        };
        color::hsv_to_rgb(self.state.hue, self.state.saturation, value)
    }
}
