use lampi_common::{LampState, LampStateDelta, StateSnapshot};

/// Convergence core for the shared lamp state.
///
/// Local intents merge into the current state immediately and arm a single
/// debounce deadline; a burst of intents inside the window collapses into one
/// outbound snapshot. Remote snapshots merge field-by-field, with two rules:
/// before the first applied snapshot every origin is accepted (cold start),
/// afterwards this process's own echoes are discarded. Applying a remote
/// snapshot never arms the publish deadline, so an apply can never feed back
/// into a publish.
pub struct StateSynchronizer {
    client_id: String,
    state: LampState,
    synced_once: bool,
    publish_due_ms: Option<u64>,
    debounce_ms: u64,
}

impl StateSynchronizer {
    pub fn new(client_id: impl Into<String>, debounce_ms: u64) -> Self {
        Self {
            client_id: client_id.into(),
            state: LampState::default(),
            synced_once: false,
            publish_due_ms: None,
            debounce_ms,
        }
    }

    pub fn state(&self) -> LampState {
        self.state
    }

    pub fn synced_once(&self) -> bool {
        self.synced_once
    }

    /// Merge a local intent. The first intent of a burst arms the debounce
    /// deadline; later ones inside the window only merge.
    pub fn submit(&mut self, delta: LampStateDelta, now_ms: u64) -> bool {
        if delta.is_empty() {
            return false;
        }
        self.state.apply(delta);
        if self.publish_due_ms.is_none() {
            self.publish_due_ms = Some(now_ms + self.debounce_ms);
        }
        true
    }

    /// Apply a remote snapshot. Returns the resulting state, or `None` when
    /// the snapshot was a self-echo and was discarded.
    pub fn apply_remote(&mut self, snapshot: &StateSnapshot) -> Option<LampState> {
        if self.synced_once && snapshot.client == self.client_id {
            return None;
        }
        self.state.apply(snapshot.delta());
        self.synced_once = true;
        Some(self.state)
    }

    /// Reconnect is a fresh cold start: the next snapshot applies
    /// unconditionally, whatever its origin.
    pub fn reset_cursor(&mut self) {
        self.synced_once = false;
    }

    /// When the debounce deadline has passed, clear it and yield one full
    /// snapshot stamped with this process's identity.
    pub fn take_due_publish(&mut self, now_ms: u64) -> Option<StateSnapshot> {
        let due = self.publish_due_ms?;
        if now_ms < due {
            return None;
        }
        self.publish_due_ms = None;
        Some(StateSnapshot::full(self.state, self.client_id.clone()))
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.publish_due_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_full(hue: f32, saturation: f32, brightness: f32, on: bool) -> StateSnapshot {
        StateSnapshot::full(
            LampState {
                hue,
                saturation,
                brightness,
                on,
            },
            "backend",
        )
    }

    #[test]
    fn first_snapshot_applies_regardless_of_origin() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);

        let own_echo = StateSnapshot::full(
            LampState {
                hue: 0.2,
                saturation: 0.3,
                brightness: 0.4,
                on: false,
            },
            "lamp_ui",
        );

        let applied = sync.apply_remote(&own_echo);
        assert_eq!(
            applied,
            Some(LampState {
                hue: 0.2,
                saturation: 0.3,
                brightness: 0.4,
                on: false,
            })
        );
        assert!(sync.synced_once());
    }

    #[test]
    fn self_echo_discarded_after_first_apply() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        sync.apply_remote(&backend_full(0.5, 1.0, 0.8, true));

        let before = sync.state();
        let echo = StateSnapshot::full(
            LampState {
                hue: 0.9,
                saturation: 0.9,
                brightness: 0.9,
                on: false,
            },
            "lamp_ui",
        );

        assert_eq!(sync.apply_remote(&echo), None);
        assert_eq!(sync.state(), before);
    }

    #[test]
    fn reconnect_reopens_cold_start() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        sync.apply_remote(&backend_full(0.5, 1.0, 0.8, true));

        sync.reset_cursor();

        let echo = StateSnapshot::full(
            LampState {
                hue: 0.1,
                saturation: 0.2,
                brightness: 0.3,
                on: false,
            },
            "lamp_ui",
        );
        assert!(sync.apply_remote(&echo).is_some());
    }

    #[test]
    fn burst_of_intents_produces_one_publish_of_merged_state() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        sync.apply_remote(&backend_full(0.5, 1.0, 0.8, true));

        assert!(sync.submit(
            LampStateDelta {
                on: Some(false),
                ..Default::default()
            },
            1_000,
        ));
        assert!(sync.submit(
            LampStateDelta {
                brightness: Some(0.6),
                ..Default::default()
            },
            1_005,
        ));

        assert!(sync.take_due_publish(1_009).is_none());

        let snapshot = sync.take_due_publish(1_010).expect("publish due");
        assert_eq!(snapshot.client, "lamp_ui");
        assert_eq!(snapshot.color.unwrap().h, 0.5);
        assert_eq!(snapshot.color.unwrap().s, 1.0);
        assert_eq!(snapshot.brightness, Some(0.6));
        assert_eq!(snapshot.on, Some(false));

        assert!(sync.take_due_publish(2_000).is_none());
    }

    #[test]
    fn later_intent_in_window_does_not_extend_deadline() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);

        sync.submit(
            LampStateDelta {
                brightness: Some(0.5),
                ..Default::default()
            },
            100,
        );
        sync.submit(
            LampStateDelta {
                brightness: Some(0.7),
                ..Default::default()
            },
            109,
        );

        assert_eq!(sync.next_deadline(), Some(110));
    }

    #[test]
    fn applying_remote_never_arms_a_publish() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);

        sync.apply_remote(&backend_full(0.5, 1.0, 0.8, true));
        assert_eq!(sync.next_deadline(), None);
        assert!(sync.take_due_publish(u64::MAX).is_none());
    }

    #[test]
    fn partial_remote_snapshot_merges_only_present_fields() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        sync.apply_remote(&backend_full(0.5, 1.0, 0.8, true));

        let partial = StateSnapshot {
            color: None,
            brightness: Some(0.25),
            on: None,
            client: "backend".to_string(),
        };
        let state = sync.apply_remote(&partial).expect("applied");

        assert_eq!(state.hue, 0.5);
        assert_eq!(state.saturation, 1.0);
        assert_eq!(state.brightness, 0.25);
        assert!(state.on);
    }

    #[test]
    fn zero_field_snapshot_is_a_noop_but_still_bootstraps() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        let before = sync.state();

        let empty = StateSnapshot {
            color: None,
            brightness: None,
            on: None,
            client: "backend".to_string(),
        };

        assert_eq!(sync.apply_remote(&empty), Some(before));
        assert!(sync.synced_once());
    }

    #[test]
    fn duplicate_remote_apply_is_idempotent() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        let snapshot = backend_full(0.5, 1.0, 0.8, true);

        let first = sync.apply_remote(&snapshot);
        let second = sync.apply_remote(&snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_intent_does_not_arm_the_debounce() {
        let mut sync = StateSynchronizer::new("lamp_ui", 10);
        assert!(!sync.submit(LampStateDelta::default(), 100));
        assert_eq!(sync.next_deadline(), None);
    }
}
