//! Acknowledgement button debouncing.

use std::time::{Duration, Instant};

/// Raw level of the acknowledgement button.
pub trait ButtonInput {
    fn is_pressed(&mut self) -> bool;
}

impl<B: ButtonInput + ?Sized> ButtonInput for Box<B> {
    fn is_pressed(&mut self) -> bool {
        (**self).is_pressed()
    }
}

/// Debounces a polled button level, reporting each clean press once.
#[derive(Debug, Clone)]
pub struct ButtonDebouncer {
    debounce: Duration,
    stable: bool,
    candidate: bool,
    candidate_since: Option<Instant>,
}

impl ButtonDebouncer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            stable: false,
            candidate: false,
            candidate_since: None,
        }
    }

    /// Feed one polled level. Returns `true` on a debounced press.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        if pressed != self.candidate {
            self.candidate = pressed;
            self.candidate_since = Some(now);
            return false;
        }

        let Some(since) = self.candidate_since else {
            return false;
        };
        if self.candidate != self.stable && now.duration_since(since) >= self.debounce {
            self.stable = self.candidate;
            return self.stable;
        }
        false
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}
