/// Boolean-level source for the two physical buttons.
///
/// Poll-based, no interrupts assumed; levels are active-high "pressed".
pub trait ButtonReader {
    fn read(&mut self) -> (bool, bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Rightmost button: network status surface.
    Network,
    /// Notification replay button.
    Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub button: Button,
    pub pressed: bool,
}

/// Edge inference over polled levels: an edge exists only where the sampled
/// level differs from the previous sample.
#[derive(Default)]
pub struct ButtonPoller {
    network_level: bool,
    notification_level: bool,
}

impl ButtonPoller {
    pub fn sample(&mut self, network: bool, notification: bool) -> Vec<ButtonEdge> {
        let mut edges = Vec::new();
        if network != self.network_level {
            self.network_level = network;
            edges.push(ButtonEdge {
                button: Button::Network,
                pressed: network,
            });
        }
        if notification != self.notification_level {
            self.notification_level = notification;
            edges.push(ButtonEdge {
                button: Button::Notification,
                pressed: notification,
            });
        }
        edges
    }
}
