/// Cooperative backlight ramp, a single timer chain.
///
/// Activity resets the level to the maximum, cancels both deadlines, and arms
/// a fresh idle deadline. When the idle deadline fires, the ramp chain starts:
/// one unit down per step interval until the floor, where the chain
/// terminates until the next activity. Deadlines are checked at fire time, so
/// a step that was cancelled by newer activity is a guaranteed no-op.
pub struct BacklightDimmer {
    level: u8,
    max_level: u8,
    floor_level: u8,
    idle_timeout_ms: u64,
    step_interval_ms: u64,
    idle_due_ms: Option<u64>,
    ramp_due_ms: Option<u64>,
}

impl BacklightDimmer {
    pub fn new(max_level: u8, floor_level: u8, idle_timeout_ms: u64, step_interval_ms: u64) -> Self {
        Self {
            level: max_level,
            max_level,
            floor_level,
            idle_timeout_ms,
            step_interval_ms,
            idle_due_ms: None,
            ramp_due_ms: None,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Any recognized activity funnels through here: cancel both deadlines,
    /// return to full brightness, re-arm the idle timeout. Calling it
    /// repeatedly inside the idle window only moves the single deadline.
    pub fn on_activity(&mut self, now_ms: u64) -> u8 {
        self.ramp_due_ms = None;
        self.level = self.max_level;
        self.idle_due_ms = Some(now_ms + self.idle_timeout_ms);
        self.level
    }

    /// Fire whichever deadline is due. Returns the new level when the output
    /// should be updated.
    pub fn tick(&mut self, now_ms: u64) -> Option<u8> {
        if let Some(due) = self.idle_due_ms {
            if now_ms >= due {
                self.idle_due_ms = None;
                return self.ramp_step(now_ms);
            }
        }
        if let Some(due) = self.ramp_due_ms {
            if now_ms >= due {
                self.ramp_due_ms = None;
                return self.ramp_step(now_ms);
            }
        }
        None
    }

    fn ramp_step(&mut self, now_ms: u64) -> Option<u8> {
        if self.level <= self.floor_level {
            return None;
        }
        self.level -= 1;
        if self.level > self.floor_level {
            self.ramp_due_ms = Some(now_ms + self.step_interval_ms);
        }
        Some(self.level)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        match (self.idle_due_ms, self.ramp_due_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimmer() -> BacklightDimmer {
        BacklightDimmer::new(255, 5, 60_000, 15)
    }

    #[test]
    fn activity_arms_a_single_idle_deadline() {
        let mut dimmer = dimmer();

        assert_eq!(dimmer.on_activity(1_000), 255);
        assert_eq!(dimmer.next_deadline(), Some(61_000));

        // Repeated activity replaces the deadline, never stacks another.
        assert_eq!(dimmer.on_activity(2_000), 255);
        assert_eq!(dimmer.next_deadline(), Some(62_000));

        assert!(dimmer.tick(61_000).is_none());
    }

    #[test]
    fn ramp_starts_on_idle_expiry_and_steps_down() {
        let mut dimmer = dimmer();
        dimmer.on_activity(0);

        assert_eq!(dimmer.tick(60_000), Some(254));
        assert_eq!(dimmer.next_deadline(), Some(60_015));
        assert_eq!(dimmer.tick(60_015), Some(253));
        assert_eq!(dimmer.tick(60_030), Some(252));
    }

    #[test]
    fn ramp_terminates_at_the_floor() {
        let mut dimmer = BacklightDimmer::new(7, 5, 100, 10);
        dimmer.on_activity(0);

        assert_eq!(dimmer.tick(100), Some(6));
        assert_eq!(dimmer.tick(110), Some(5));
        // Chain is over: no deadline, no further steps.
        assert_eq!(dimmer.next_deadline(), None);
        assert_eq!(dimmer.tick(10_000), None);
        assert_eq!(dimmer.level(), 5);
    }

    #[test]
    fn activity_cancels_an_in_flight_ramp() {
        let mut dimmer = dimmer();
        dimmer.on_activity(0);
        dimmer.tick(60_000);
        dimmer.tick(60_015);
        assert_eq!(dimmer.level(), 253);

        assert_eq!(dimmer.on_activity(60_020), 255);

        // The stale ramp deadline is gone; the old step time fires nothing.
        assert_eq!(dimmer.tick(60_030), None);
        assert_eq!(dimmer.level(), 255);
        assert_eq!(dimmer.next_deadline(), Some(120_020));
    }
}
