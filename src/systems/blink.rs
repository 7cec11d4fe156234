use log::debug;

use crate::tracking::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkEvent {
    /// Ordinary short closure, reported on reopening
    Blink,
    /// Deliberate closure; reported once, while the eye is still shut
    LongBlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EyeState {
    Open,
    Closed { since: Millis, long_reported: bool },
}

pub struct BlinkSettings {
    pub close_threshold: f32,
    pub open_threshold: f32,
    pub min_ms: Millis,
    pub long_ms: Millis,
}

/// Hysteresis on eyelid openness: closes below one threshold, opens above a
/// higher one, so flicker around a single value does not count as blinks.
pub struct BlinkDetector {
    settings: BlinkSettings,
    state: EyeState,
}

impl BlinkDetector {
    pub fn new(settings: BlinkSettings) -> Self {
        BlinkDetector {
            settings,
            state: EyeState::Open,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, EyeState::Closed { .. })
    }

    pub fn update(&mut self, openness: f32, now: Millis) -> Option<BlinkEvent> {
        match self.state {
            EyeState::Open => {
                if openness < self.settings.close_threshold {
                    self.state = EyeState::Closed {
                        since: now,
                        long_reported: false,
                    };
                }
                None
            }
            EyeState::Closed {
                since,
                long_reported,
            } => {
                let held = now.saturating_sub(since);
                if openness > self.settings.open_threshold {
                    self.state = EyeState::Open;
                    if !long_reported && held >= self.settings.min_ms && held < self.settings.long_ms
                    {
                        debug!("Blink ({}ms)", held);
                        return Some(BlinkEvent::Blink);
                    }
                    return None;
                }
                if !long_reported && held >= self.settings.long_ms {
                    self.state = EyeState::Closed {
                        since,
                        long_reported: true,
                    };
                    debug!("Long blink ({}ms)", held);
                    return Some(BlinkEvent::LongBlink);
                }
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = EyeState::Open;
    }
}
