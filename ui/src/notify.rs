use lampi_common::NotificationMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNotification {
    pub title: String,
    pub message: String,
}

/// Single-slot transient alert surface. The newest notification always wins:
/// accepting one cancels the dismissal deadline of whatever was active, so
/// only the newest deadline can ever fire. There is no queue.
pub struct NotificationDispatcher {
    active: Option<ActiveNotification>,
    dismiss_due_ms: Option<u64>,
    visible_ms: u64,
}

impl NotificationDispatcher {
    pub fn new(visible_ms: u64) -> Self {
        Self {
            active: None,
            dismiss_due_ms: None,
            visible_ms,
        }
    }

    pub fn active(&self) -> Option<&ActiveNotification> {
        self.active.as_ref()
    }

    /// Preempts any active notification and arms a fresh visibility deadline.
    pub fn accept(&mut self, message: &NotificationMessage, now_ms: u64) -> ActiveNotification {
        let active = ActiveNotification {
            title: message.title.clone(),
            message: message.message.clone(),
        };
        self.active = Some(active.clone());
        self.dismiss_due_ms = Some(now_ms + self.visible_ms);
        active
    }

    /// True when the visibility deadline fired now and the active
    /// notification was cleared. A deadline that was preempted or already
    /// cleared is a no-op.
    pub fn take_expired(&mut self, now_ms: u64) -> bool {
        match self.dismiss_due_ms {
            Some(due) if now_ms >= due => {
                self.dismiss_due_ms = None;
                self.active = None;
                true
            }
            _ => false,
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.dismiss_due_ms
    }
}
