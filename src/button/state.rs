//! Button identities, states and the per-button edge/hold tracker
//!
//! The tracker turns a sampled pressed/released level into edge events.
//! It only ever sees samples, so a press and release that both happen
//! between two samples are invisible to it.

use std::time::Duration;

use tokio::time::Instant;

/// One of the two physical buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    /// Front button: recording and playback confirmation
    Main,
    /// Side button: mode toggle and power-down
    Sub,
}

impl std::fmt::Display for ButtonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonId::Main => write!(f, "main"),
            ButtonId::Sub => write!(f, "sub"),
        }
    }
}

/// Debounced state of a single button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonState {
    #[default]
    Released,
    Pressed,
    Held,
}

/// Kind of transition reported by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEventKind {
    Pressed,
    Released,
    Held,
}

/// An edge observed on a button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub kind: ButtonEventKind,
}

/// What the monitor publishes for each button after every transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonSnapshot {
    /// Current state
    pub state: ButtonState,
    /// Number of Released→Pressed transitions so far
    pub presses: u64,
    /// Number of Pressed→Held transitions so far
    pub holds: u64,
}

impl ButtonSnapshot {
    /// Fold an event into the snapshot
    pub fn apply(&mut self, kind: ButtonEventKind) {
        match kind {
            ButtonEventKind::Pressed => {
                self.state = ButtonState::Pressed;
                self.presses += 1;
            }
            ButtonEventKind::Held => {
                self.state = ButtonState::Held;
                self.holds += 1;
            }
            ButtonEventKind::Released => self.state = ButtonState::Released,
        }
    }
}

/// Released/Pressed/Held state machine for one button
#[derive(Debug)]
pub struct ButtonTracker {
    button: ButtonId,
    hold_after: Duration,
    state: ButtonState,
    pressed_since: Option<Instant>,
}

impl ButtonTracker {
    pub fn new(button: ButtonId, hold_after: Duration) -> Self {
        Self {
            button,
            hold_after,
            state: ButtonState::Released,
            pressed_since: None,
        }
    }

    pub fn button(&self) -> ButtonId {
        self.button
    }

    #[cfg(test)]
    pub fn state(&self) -> ButtonState {
        self.state
    }

    /// Feed one sample, returning the transition it caused, if any
    pub fn sample(&mut self, pressed: bool, now: Instant) -> Option<ButtonEvent> {
        let kind = match (self.state, pressed) {
            (ButtonState::Released, true) => {
                self.pressed_since = Some(now);
                self.state = ButtonState::Pressed;
                ButtonEventKind::Pressed
            }
            (ButtonState::Pressed, true) => {
                let since = self.pressed_since?;
                if now.duration_since(since) < self.hold_after {
                    return None;
                }
                self.state = ButtonState::Held;
                ButtonEventKind::Held
            }
            (ButtonState::Pressed | ButtonState::Held, false) => {
                self.pressed_since = None;
                self.state = ButtonState::Released;
                ButtonEventKind::Released
            }
            (ButtonState::Held, true) | (ButtonState::Released, false) => return None,
        };

        Some(ButtonEvent {
            button: self.button,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn kinds(tracker: &mut ButtonTracker, samples: &[bool]) -> Vec<Option<ButtonEventKind>> {
        let start = Instant::now();
        samples
            .iter()
            .enumerate()
            .map(|(i, &pressed)| {
                tracker
                    .sample(pressed, start + TICK * i as u32)
                    .map(|e| e.kind)
            })
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let tracker = ButtonTracker::new(ButtonId::Main, Duration::from_millis(500));
        assert_eq!(tracker.state(), ButtonState::Released);
    }

    #[test]
    fn test_press_and_release() {
        let mut tracker = ButtonTracker::new(ButtonId::Main, Duration::from_millis(500));
        let events = kinds(&mut tracker, &[false, true, true, false, false]);
        assert_eq!(
            events,
            vec![
                None,
                Some(ButtonEventKind::Pressed),
                None,
                Some(ButtonEventKind::Released),
                None,
            ]
        );
        assert_eq!(tracker.state(), ButtonState::Released);
    }

    #[test]
    fn test_hold_after_threshold() {
        let mut tracker = ButtonTracker::new(ButtonId::Sub, Duration::from_millis(300));
        let events = kinds(&mut tracker, &[true, true, true, true, true, false]);
        assert_eq!(
            events,
            vec![
                Some(ButtonEventKind::Pressed),
                None,
                None,
                Some(ButtonEventKind::Held),
                None,
                Some(ButtonEventKind::Released),
            ]
        );
    }

    #[test]
    fn test_hold_needs_continuous_press() {
        let mut tracker = ButtonTracker::new(ButtonId::Sub, Duration::from_millis(300));
        let events = kinds(&mut tracker, &[true, true, false, true, true, true]);
        assert!(!events.contains(&Some(ButtonEventKind::Held)));
        assert_eq!(tracker.state(), ButtonState::Pressed);
    }

    #[test]
    fn test_event_carries_button() {
        let mut tracker = ButtonTracker::new(ButtonId::Sub, Duration::from_secs(3));
        let event = tracker.sample(true, Instant::now()).unwrap();
        assert_eq!(event.button, ButtonId::Sub);
        assert_eq!(event.kind, ButtonEventKind::Pressed);
    }

    #[test]
    fn test_snapshot_counts_edges() {
        let mut snapshot = ButtonSnapshot::default();
        snapshot.apply(ButtonEventKind::Pressed);
        snapshot.apply(ButtonEventKind::Held);
        snapshot.apply(ButtonEventKind::Released);
        snapshot.apply(ButtonEventKind::Pressed);
        assert_eq!(snapshot.presses, 2);
        assert_eq!(snapshot.holds, 1);
        assert_eq!(snapshot.state, ButtonState::Pressed);
    }
}
