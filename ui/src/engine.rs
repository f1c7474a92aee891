use lampi_common::{
    AssociationStatus, LampState, LampStateDelta, NotificationMessage, StateSnapshot, UiConfig,
};

use crate::assoc::{AssociationMonitor, AssociationTransition};
use crate::buttons::{Button, ButtonPoller};
use crate::dimmer::BacklightDimmer;
use crate::notify::NotificationDispatcher;
use crate::sync::StateSynchronizer;

/// Everything the transport task may hand to the scheduler. Parsing happens
/// on the transport task; only typed events cross the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// Session (re)connected: reconnect is a fresh cold start.
    Connected,
    Snapshot(StateSnapshot),
    Association(AssociationStatus),
    Notification(NotificationMessage),
    BridgeStatus(bool),
}

/// Side effects for the runtime to execute. The engine never performs IO.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    /// Outbound state change, QoS at-least-once, not retained.
    PublishState(StateSnapshot),
    ApplyBacklight(u8),
    /// Presentation refresh after a remote apply; must not re-enter
    /// `submit_local_intent`.
    LampStateChanged(LampState),
    ShowAssociationCode(String),
    ClearAssociationCode,
    ShowNotification { title: String, message: String },
    DismissNotification,
    ShowNetworkStatus,
    HideNetworkStatus,
}

/// Composition root for the device UI process. All mutable core state lives
/// here and is only ever touched from the scheduler task; timers are
/// deadlines inside the owned state machines.
pub struct UiEngine {
    sync: StateSynchronizer,
    assoc: AssociationMonitor,
    notify: NotificationDispatcher,
    dimmer: BacklightDimmer,
    buttons: ButtonPoller,
    bridge_connected: bool,
}

impl UiEngine {
    pub fn new(client_id: &str, config: &UiConfig) -> Self {
        Self {
            sync: StateSynchronizer::new(client_id, config.publish_debounce_ms),
            assoc: AssociationMonitor::new(config.code_display_len),
            notify: NotificationDispatcher::new(config.notification_visible_ms),
            dimmer: BacklightDimmer::new(
                config.backlight_max,
                config.backlight_floor,
                config.screen_dim_timeout_ms,
                config.dim_step_interval_ms,
            ),
            buttons: ButtonPoller::default(),
            bridge_connected: false,
        }
    }

    pub fn lamp_state(&self) -> LampState {
        self.sync.state()
    }

    pub fn association(&self) -> (bool, Option<&str>) {
        (self.assoc.associated(), self.assoc.code())
    }

    pub fn notification(&self) -> Option<(&str, &str)> {
        self.notify
            .active()
            .map(|active| (active.title.as_str(), active.message.as_str()))
    }

    pub fn dim_level(&self) -> u8 {
        self.dimmer.level()
    }

    pub fn bridge_connected(&self) -> bool {
        self.bridge_connected
    }

    pub fn handle_remote(&mut self, event: RemoteEvent, now_ms: u64) -> Vec<UiAction> {
        let mut actions = Vec::new();
        match event {
            RemoteEvent::Connected => {
                self.sync.reset_cursor();
            }
            RemoteEvent::Snapshot(snapshot) => {
                if let Some(state) = self.sync.apply_remote(&snapshot) {
                    actions.push(UiAction::LampStateChanged(state));
                }
            }
            RemoteEvent::Association(status) => match self.assoc.observe(&status) {
                Some(AssociationTransition::Unassociated { display_code }) => {
                    actions.push(UiAction::ShowAssociationCode(display_code));
                    actions.push(UiAction::ApplyBacklight(self.dimmer.on_activity(now_ms)));
                }
                Some(AssociationTransition::Associated) => {
                    actions.push(UiAction::ClearAssociationCode);
                }
                None => {}
            },
            RemoteEvent::Notification(message) => {
                let active = self.notify.accept(&message, now_ms);
                actions.push(UiAction::ShowNotification {
                    title: active.title,
                    message: active.message,
                });
                actions.push(UiAction::ApplyBacklight(self.dimmer.on_activity(now_ms)));
            }
            RemoteEvent::BridgeStatus(connected) => {
                self.bridge_connected = connected;
            }
        }
        actions
    }

    /// Presentation-layer write entry point for color/brightness/power
    /// intents. The publish itself happens later, from `tick`, once the
    /// debounce window closes.
    pub fn submit_local_intent(&mut self, delta: LampStateDelta, now_ms: u64) {
        self.sync.submit(delta, now_ms);
    }

    /// Presentation-layer activity entry point (touch).
    pub fn on_physical_activity(&mut self, now_ms: u64) -> Vec<UiAction> {
        vec![UiAction::ApplyBacklight(self.dimmer.on_activity(now_ms))]
    }

    pub fn poll_buttons(&mut self, network: bool, notification: bool, now_ms: u64) -> Vec<UiAction> {
        let mut actions = Vec::new();
        for edge in self.buttons.sample(network, notification) {
            match (edge.button, edge.pressed) {
                (Button::Network, true) => {
                    actions.push(UiAction::ShowNetworkStatus);
                    actions.push(UiAction::ApplyBacklight(self.dimmer.on_activity(now_ms)));
                }
                (Button::Network, false) => {
                    actions.push(UiAction::HideNetworkStatus);
                }
                (Button::Notification, true) => {
                    // Replay only works while no association code is shown.
                    if self.assoc.code().is_none() {
                        if let Some(active) = self.notify.active() {
                            actions.push(UiAction::ShowNotification {
                                title: active.title.clone(),
                                message: active.message.clone(),
                            });
                        }
                        actions.push(UiAction::ApplyBacklight(self.dimmer.on_activity(now_ms)));
                    }
                }
                (Button::Notification, false) => {}
            }
        }
        actions
    }

    /// Fire whatever deadlines are due. The runtime calls this whenever the
    /// next-deadline sleep elapses; firing early or repeatedly is harmless.
    pub fn tick(&mut self, now_ms: u64) -> Vec<UiAction> {
        let mut actions = Vec::new();
        if let Some(snapshot) = self.sync.take_due_publish(now_ms) {
            actions.push(UiAction::PublishState(snapshot));
        }
        if self.notify.take_expired(now_ms) {
            actions.push(UiAction::DismissNotification);
        }
        if let Some(level) = self.dimmer.tick(now_ms) {
            actions.push(UiAction::ApplyBacklight(level));
        }
        actions
    }

    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.sync.next_deadline(),
            self.notify.next_deadline(),
            self.dimmer.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lampi_common::{ColorField, NotificationKind};

    fn engine() -> UiEngine {
        UiEngine::new("lamp_ui", &UiConfig::default())
    }

    fn doorbell(title: &str) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::DoorbellEvent,
            title: title.to_string(),
            message: "someone is here".to_string(),
            hue: 0.0,
            saturation: 1.0,
            brightness: 1.0,
            num_flashes: 5,
        }
    }

    #[test]
    fn cold_start_then_coalesced_local_intents() {
        let mut engine = engine();

        // Bootstrap snapshot from another client.
        let snapshot = StateSnapshot {
            color: Some(ColorField { h: 0.5, s: 1.0 }),
            brightness: Some(0.8),
            on: Some(true),
            client: "backend".to_string(),
        };
        let actions = engine.handle_remote(RemoteEvent::Snapshot(snapshot), 100);
        assert_eq!(
            actions,
            vec![UiAction::LampStateChanged(LampState {
                hue: 0.5,
                saturation: 1.0,
                brightness: 0.8,
                on: true,
            })]
        );

        // Two intents inside one debounce window.
        engine.submit_local_intent(
            LampStateDelta {
                on: Some(false),
                ..Default::default()
            },
            1_000,
        );
        engine.submit_local_intent(
            LampStateDelta {
                brightness: Some(0.6),
                ..Default::default()
            },
            1_005,
        );

        assert!(engine.tick(1_009).is_empty());
        let actions = engine.tick(1_010);
        assert_eq!(actions.len(), 1);
        let UiAction::PublishState(published) = &actions[0] else {
            panic!("expected a publish, got {actions:?}");
        };
        assert_eq!(published.client, "lamp_ui");
        assert_eq!(published.color, Some(ColorField { h: 0.5, s: 1.0 }));
        assert_eq!(published.brightness, Some(0.6));
        assert_eq!(published.on, Some(false));

        // Window closed, nothing further pending from the burst.
        assert!(engine.tick(2_000).is_empty());
    }

    #[test]
    fn own_echo_after_publish_changes_nothing() {
        let mut engine = engine();
        engine.handle_remote(
            RemoteEvent::Snapshot(StateSnapshot::full(LampState::default(), "lamp_service")),
            0,
        );

        let before = engine.lamp_state();
        let echo = StateSnapshot::full(
            LampState {
                hue: 0.1,
                saturation: 0.1,
                brightness: 0.1,
                on: false,
            },
            "lamp_ui",
        );

        assert!(engine
            .handle_remote(RemoteEvent::Snapshot(echo), 5_000)
            .is_empty());
        assert_eq!(engine.lamp_state(), before);
    }

    #[test]
    fn reconnect_clears_the_sync_cursor() {
        let mut engine = engine();
        engine.handle_remote(
            RemoteEvent::Snapshot(StateSnapshot::full(LampState::default(), "lamp_service")),
            0,
        );

        engine.handle_remote(RemoteEvent::Connected, 1_000);

        let echo = StateSnapshot::full(
            LampState {
                hue: 0.3,
                saturation: 0.3,
                brightness: 0.3,
                on: true,
            },
            "lamp_ui",
        );
        let actions = engine.handle_remote(RemoteEvent::Snapshot(echo), 2_000);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn unassociated_shows_code_and_wakes_the_backlight() {
        let mut engine = engine();

        let actions = engine.handle_remote(
            RemoteEvent::Association(AssociationStatus::unassociated("deadbeef12345678")),
            1_000,
        );

        assert_eq!(
            actions,
            vec![
                UiAction::ShowAssociationCode("deadbe".to_string()),
                UiAction::ApplyBacklight(255),
            ]
        );
        assert_eq!(engine.association(), (false, Some("deadbeef12345678")));
    }

    #[test]
    fn association_replay_is_side_effect_free() {
        let mut engine = engine();
        let status = AssociationStatus::unassociated("deadbeef12345678");

        engine.handle_remote(RemoteEvent::Association(status.clone()), 1_000);
        let actions = engine.handle_remote(RemoteEvent::Association(status), 2_000);

        assert!(actions.is_empty());
    }

    #[test]
    fn notification_shows_popup_and_wakes_the_backlight() {
        let mut engine = engine();

        let actions = engine.handle_remote(RemoteEvent::Notification(doorbell("Front Door")), 500);

        assert_eq!(
            actions,
            vec![
                UiAction::ShowNotification {
                    title: "Front Door".to_string(),
                    message: "someone is here".to_string(),
                },
                UiAction::ApplyBacklight(255),
            ]
        );

        // Visibility window elapses: dismissed exactly once.
        let actions = engine.tick(10_500);
        assert!(actions.contains(&UiAction::DismissNotification));
        assert!(engine.notification().is_none());
    }

    #[test]
    fn second_notification_preempts_first_dismissal() {
        let mut engine = engine();
        engine.handle_remote(RemoteEvent::Notification(doorbell("A")), 1_000);
        engine.handle_remote(RemoteEvent::Notification(doorbell("B")), 9_000);

        // A's would-be deadline passes without a dismissal.
        assert!(engine.tick(11_000).is_empty());
        assert_eq!(engine.notification().unwrap().0, "B");

        let actions = engine.tick(19_000);
        assert!(actions.contains(&UiAction::DismissNotification));
    }

    #[test]
    fn network_button_press_opens_status_and_release_closes_it() {
        let mut engine = engine();

        let actions = engine.poll_buttons(true, false, 1_000);
        assert_eq!(
            actions,
            vec![
                UiAction::ShowNetworkStatus,
                UiAction::ApplyBacklight(255),
            ]
        );

        let actions = engine.poll_buttons(false, false, 1_050);
        assert_eq!(actions, vec![UiAction::HideNetworkStatus]);
    }

    #[test]
    fn notification_replay_button_is_blocked_while_code_is_shown() {
        let mut engine = engine();
        engine.handle_remote(RemoteEvent::Notification(doorbell("A")), 0);
        engine.handle_remote(
            RemoteEvent::Association(AssociationStatus::unassociated("deadbeef12345678")),
            0,
        );

        assert!(engine.poll_buttons(false, true, 1_000).is_empty());
    }

    #[test]
    fn notification_replay_button_reopens_active_popup() {
        let mut engine = engine();
        engine.handle_remote(RemoteEvent::Notification(doorbell("A")), 0);

        let actions = engine.poll_buttons(false, true, 1_000);
        assert_eq!(
            actions,
            vec![
                UiAction::ShowNotification {
                    title: "A".to_string(),
                    message: "someone is here".to_string(),
                },
                UiAction::ApplyBacklight(255),
            ]
        );
    }

    #[test]
    fn bridge_status_is_mirrored() {
        let mut engine = engine();
        assert!(!engine.bridge_connected());
        engine.handle_remote(RemoteEvent::BridgeStatus(true), 0);
        assert!(engine.bridge_connected());
    }

    #[test]
    fn next_deadline_is_the_earliest_outstanding_timer() {
        let mut engine = engine();
        engine.on_physical_activity(0); // idle deadline at 60_000
        engine.handle_remote(RemoteEvent::Notification(doorbell("A")), 1_000); // idle moves to 61_000, dismissal at 11_000
        engine.submit_local_intent(
            LampStateDelta {
                on: Some(false),
                ..Default::default()
            },
            2_000,
        ); // publish at 2_010

        assert_eq!(engine.next_deadline(), Some(2_010));
    }
}
