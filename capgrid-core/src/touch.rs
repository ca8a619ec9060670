//! Touch detection on normalized deltas
//!
//! Each channel runs a small debounce/hysteresis machine over ΔC/C:
//!
//! ```text
//! Idle(n) ──ratio ≥ detect, n == 1──► Active
//!   │  ratio ≥ detect: Idle(n-1)        │
//!   │  otherwise:      Idle(debounce)   │ ratio < release
//!   ▲───────────────────────────────────┘
//! ```
//!
//! No smoothing and no baseline tracking; the detector only sees the deltas
//! the calibrator produces against its frozen baseline.

use heapless::Vec;

use crate::calibration::DeltaFrame;
use crate::constants::buffers::MAX_CHANNELS;
use crate::errors::{ScanError, ScanResult};
use crate::reading::Channel;

/// Thresholds for turning deltas into touch states
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TouchConfig {
    /// ΔC/C at or above which a channel counts as touched
    pub detect_ratio: f64,
    /// Once active, ΔC/C must fall below this to release
    pub release_ratio: f64,
    /// Consecutive frames above `detect_ratio` required to activate
    pub debounce: u8,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self { detect_ratio: 0.05, release_ratio: 0.03, debounce: 2 }
    }
}

impl TouchConfig {
    pub fn validate(&self) -> ScanResult<()> {
        if !(self.detect_ratio > 0.0) || !self.detect_ratio.is_finite() {
            return Err(ScanError::InvalidConfig { reason: "touch threshold must be positive" });
        }
        if !(self.release_ratio <= self.detect_ratio) {
            return Err(ScanError::InvalidConfig {
                reason: "touch release threshold above detect threshold",
            });
        }
        if self.debounce == 0 {
            return Err(ScanError::InvalidConfig { reason: "touch debounce must be at least 1" });
        }
        Ok(())
    }
}

/// Touch state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchState {
    /// Not touched; frames still needed above threshold to activate
    Idle(u8),
    Active,
}

/// Transition reported by [`TouchDetector::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchEvent {
    /// Channel became active
    Pressed(Channel),
    /// Channel returned to idle
    Released(Channel),
}

/// Per-channel touch state machines
pub struct TouchDetector {
    config: TouchConfig,
    states: Vec<(Channel, TouchState), MAX_CHANNELS>,
}

impl TouchDetector {
    pub fn new(config: TouchConfig) -> ScanResult<Self> {
        config.validate()?;
        Ok(Self { config, states: Vec::new() })
    }

    /// Advance every channel in `frame`, returning the edges it caused
    pub fn update(&mut self, frame: &DeltaFrame) -> Vec<TouchEvent, MAX_CHANNELS> {
        let config = self.config;
        let mut events = Vec::new();
        for reading in frame.iter() {
            let Some(state) = self.state_mut(reading.channel) else {
                continue;
            };
            let next = step(&config, *state, reading.ratio);
            let event = match (*state, next) {
                (TouchState::Idle(_), TouchState::Active) => Some(TouchEvent::Pressed(reading.channel)),
                (TouchState::Active, TouchState::Idle(_)) => Some(TouchEvent::Released(reading.channel)),
                _ => None,
            };
            *state = next;
            if let Some(event) = event {
                log_info!("{:?}", event);
                let _ = events.push(event);
            }
        }
        events
    }

    fn state_mut(&mut self, channel: Channel) -> Option<&mut TouchState> {
        let position = match self.states.iter().position(|(c, _)| *c == channel) {
            Some(position) => position,
            None => {
                self.states
                    .push((channel, TouchState::Idle(self.config.debounce)))
                    .ok()?;
                self.states.len() - 1
            }
        };
        self.states.get_mut(position).map(|(_, state)| state)
    }

    /// Current state of `channel`; unseen channels are idle
    pub fn state(&self, channel: Channel) -> TouchState {
        self.states
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, state)| *state)
            .unwrap_or(TouchState::Idle(self.config.debounce))
    }

    pub fn is_active(&self, channel: Channel) -> bool {
        self.state(channel) == TouchState::Active
    }

    /// Channels currently touched
    pub fn active(&self) -> impl Iterator<Item = Channel> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| *state == TouchState::Active)
            .map(|(channel, _)| *channel)
    }

    /// Forget all channel states
    pub fn reset(&mut self) {
        self.states.clear();
    }
}

fn step(config: &TouchConfig, state: TouchState, ratio: f64) -> TouchState {
    match state {
        TouchState::Idle(counter) => {
            if ratio >= config.detect_ratio {
                if counter <= 1 {
                    TouchState::Active
                } else {
                    TouchState::Idle(counter - 1)
                }
            } else {
                TouchState::Idle(config.debounce)
            }
        }
        TouchState::Active => {
            if ratio < config.release_ratio {
                TouchState::Idle(config.debounce)
            } else {
                TouchState::Active
            }
        }
    }
}
