use lampi_common::AssociationStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationTransition {
    Associated,
    Unassociated { display_code: String },
}

/// Read-only mirror of the backend-owned association record.
///
/// The device never initiates a transition; it only observes retained
/// messages. Observations that repeat the stored `associated` flag fire no
/// transition, which keeps retained-message replay at reconnect side-effect
/// free.
pub struct AssociationMonitor {
    associated: bool,
    code: Option<String>,
    code_display_len: usize,
}

impl AssociationMonitor {
    /// Optimistic default before anything is observed; corrected by the
    /// first retained message.
    pub fn new(code_display_len: usize) -> Self {
        Self {
            associated: true,
            code: None,
            code_display_len,
        }
    }

    pub fn associated(&self) -> bool {
        self.associated
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn observe(&mut self, status: &AssociationStatus) -> Option<AssociationTransition> {
        if status.associated == self.associated {
            return None;
        }

        if status.associated {
            self.associated = true;
            self.code = None;
            return Some(AssociationTransition::Associated);
        }

        // An unassociated record must carry a code; without one the payload
        // is malformed and ignored.
        let code = status.code.as_deref()?;
        self.associated = false;
        self.code = Some(code.to_string());

        let display_code = code.chars().take(self.code_display_len).collect();
        Some(AssociationTransition::Unassociated { display_code })
    }
}
