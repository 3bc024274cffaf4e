//! Press/hold state machine shared by buttons and pads
//!
//! Idle → Pressed on an on-message, Pressed → Held once more than
//! `hold_ticks` idle ticks elapsed, back to Idle on the off-message.
//! Ticks are counted, not timed: the delay follows the host's idle rate.

/// Where a key is in its press cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressState {
    #[default]
    Idle,
    Pressed,
    Held,
}

/// What happened on release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// Idle ticks observed while the key was down
    pub held_ticks: u32,
    /// The key had been promoted to Held
    pub was_held: bool,
    /// Released before `short_press_ticks` elapsed, held or not
    pub short_press: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HoldTracker {
    state: PressState,
    ticks: u32,
}

impl HoldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PressState {
        self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_pressed(&self) -> bool {
        self.state != PressState::Idle
    }

    pub fn is_held(&self) -> bool {
        self.state == PressState::Held
    }

    /// Start a press cycle (restarts the count if already down)
    pub fn press(&mut self) {
        self.state = PressState::Pressed;
        self.ticks = 0;
    }

    /// Count one idle tick. Returns true exactly once per press, on promotion to Held.
    pub fn tick(&mut self, hold_ticks: u32) -> bool {
        match self.state {
            PressState::Idle => false,
            PressState::Held => {
                self.ticks = self.ticks.saturating_add(1);
                false
            },
            PressState::Pressed => {
                self.ticks = self.ticks.saturating_add(1);
                if self.ticks > hold_ticks {
                    self.state = PressState::Held;
                    true
                } else {
                    false
                }
            },
        }
    }

    /// End the press cycle
    pub fn release(&mut self, short_press_ticks: u32) -> Release {
        let release = Release {
            held_ticks: self.ticks,
            was_held: self.state == PressState::Held,
            short_press: self.state != PressState::Idle && self.ticks < short_press_ticks,
        };
        self.state = PressState::Idle;
        self.ticks = 0;
        release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_fires_once_after_threshold() {
        let mut tracker = HoldTracker::new();
        tracker.press();

        let fired: Vec<bool> = (0..15).map(|_| tracker.tick(10)).collect();
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
        assert!(fired[10]);
        assert!(tracker.is_held());
    }

    #[test]
    fn test_idle_ticks_do_nothing() {
        let mut tracker = HoldTracker::new();
        for _ in 0..50 {
            assert!(!tracker.tick(1));
        }
        assert_eq!(tracker.state(), PressState::Idle);
        assert_eq!(tracker.ticks(), 0);
    }

    #[test]
    fn test_short_press_window() {
        let mut tracker = HoldTracker::new();
        tracker.press();
        tracker.tick(10);
        let release = tracker.release(2);
        assert!(release.short_press);
        assert!(!release.was_held);
        assert_eq!(release.held_ticks, 1);

        tracker.press();
        tracker.tick(10);
        tracker.tick(10);
        assert!(!tracker.release(2).short_press);
    }

    #[test]
    fn test_release_after_hold() {
        let mut tracker = HoldTracker::new();
        tracker.press();
        for _ in 0..4 {
            tracker.tick(2);
        }
        let release = tracker.release(2);
        assert!(release.was_held);
        assert!(!release.short_press);
        assert_eq!(tracker.state(), PressState::Idle);
    }

    #[test]
    fn test_short_press_counts_ticks_even_when_held() {
        let mut tracker = HoldTracker::new();
        tracker.press();
        for _ in 0..5 {
            tracker.tick(2);
        }
        assert!(tracker.is_held());
        let release = tracker.release(10);
        assert!(release.was_held);
        assert!(release.short_press);
        assert_eq!(release.held_ticks, 5);
    }

    #[test]
    fn test_release_without_press() {
        let mut tracker = HoldTracker::new();
        let release = tracker.release(2);
        assert!(!release.was_held);
        assert!(!release.short_press);
    }
}
