//! User-facing detection configuration.
//!
//! These are float descriptions set from the control context. The engine
//! converts them to integer thresholds once, when the mode is installed.

use arrayvec::ArrayVec;

use crate::event::DetectKind;

/// Longest note list accepted by scale mode.
pub const SCALE_MAX: usize = 16;

/// Most boundaries accepted by window mode.
pub const WINDOW_MAX: usize = 16;

/// Fixed hysteresis applied around scale degrees, in volts.
pub const SCALE_HYSTERESIS: f32 = 0.040;

/// Edge filter for change mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    Rising,
    Falling,
    #[default]
    Both,
}

impl Direction {
    /// `"rising"`, `"falling"`, anything else is both.
    pub fn from_name(name: &str) -> Direction {
        match name {
            "rising" => Direction::Rising,
            "falling" => Direction::Falling,
            _ => Direction::Both,
        }
    }

    pub fn accepts(self, rising: bool) -> bool {
        match self {
            Direction::Rising => rising,
            Direction::Falling => !rising,
            Direction::Both => true,
        }
    }
}

/// Detection mode with its parameters. Times in seconds, levels in volts.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DetectMode {
    #[default]
    None,
    Change { threshold: f32, hysteresis: f32, direction: Direction },
    Stream { interval: f32 },
    Window { windows: ArrayVec<f32, WINDOW_MAX>, hysteresis: f32 },
    /// Empty `notes` means every division of the octave.
    Scale { notes: ArrayVec<f32, SCALE_MAX>, divs: f32, scaling: f32 },
    Volume { interval: f32 },
    Peak { threshold: f32, hysteresis: f32 },
}

impl DetectMode {
    pub fn change(threshold: f32, hysteresis: f32, direction: Direction) -> Self {
        DetectMode::Change { threshold, hysteresis, direction }
    }

    pub fn stream(interval: f32) -> Self {
        DetectMode::Stream { interval }
    }

    pub fn volume(interval: f32) -> Self {
        DetectMode::Volume { interval }
    }

    pub fn peak(threshold: f32, hysteresis: f32) -> Self {
        DetectMode::Peak { threshold, hysteresis }
    }

    /// Boundaries beyond `WINDOW_MAX` are ignored.
    pub fn window(boundaries: &[f32], hysteresis: f32) -> Self {
        DetectMode::Window {
            windows: boundaries.iter().copied().take(WINDOW_MAX).collect(),
            hysteresis,
        }
    }

    /// Notes beyond `SCALE_MAX` are ignored.
    pub fn scale(notes: &[f32], divs: f32, scaling: f32) -> Self {
        DetectMode::Scale {
            notes: notes.iter().copied().take(SCALE_MAX).collect(),
            divs,
            scaling,
        }
    }

    pub fn kind(&self) -> DetectKind {
        match self {
            DetectMode::None => DetectKind::None,
            DetectMode::Change { .. } => DetectKind::Change,
            DetectMode::Stream { .. } => DetectKind::Stream,
            DetectMode::Window { .. } => DetectKind::Window,
            DetectMode::Scale { .. } => DetectKind::Scale,
            DetectMode::Volume { .. } => DetectKind::Volume,
            DetectMode::Peak { .. } => DetectKind::Peak,
        }
    }
}
