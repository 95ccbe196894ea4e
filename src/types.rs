use std::time::Instant;

/// Static sign-alphabet letters the user can pick as an upload label.
/// J and Z are omitted: both require motion and cannot be captured in a
/// single frame.
pub const TARGET_LETTERS: &[&str] = &[
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T",
    "U", "V", "W", "X", "Y",
];

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

/// One detected hand: 21 landmarks in normalized [0, 1] coordinates
/// relative to the source frame, plus the model's side estimate.
#[derive(Clone, Debug)]
pub struct Hand {
    pub points: Vec<(f32, f32, f32)>,
    pub handedness: Handedness,
    pub score: f32,
}

/// Landmarks for every hand found in one frame, in model order.
#[derive(Clone, Debug)]
pub struct LandmarkedFrame {
    pub hands: Vec<Hand>,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

pub const NO_HAND_DETECTED: &str = "—";

/// Classification outcome derived from one `/process/` response.
/// Immutable once built; replaced wholesale by the next capture.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub detected_letter: String,
    pub confidence: f64,
    pub hand_detected: String,
}

impl DetectionResult {
    pub fn confidence_pct(&self) -> String {
        format!("{:.0}%", self.confidence * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rounds_to_whole_percent() {
        let result = DetectionResult {
            detected_letter: "A".to_string(),
            confidence: 0.873,
            hand_detected: "Right".to_string(),
        };
        assert_eq!(result.confidence_pct(), "87%");
    }

    #[test]
    fn zero_confidence_renders_zero_percent() {
        let result = DetectionResult {
            detected_letter: "-".to_string(),
            confidence: 0.0,
            hand_detected: NO_HAND_DETECTED.to_string(),
        };
        assert_eq!(result.confidence_pct(), "0%");
    }

    #[test]
    fn target_letters_skip_motion_signs() {
        assert!(!TARGET_LETTERS.contains(&"J"));
        assert!(!TARGET_LETTERS.contains(&"Z"));
        assert_eq!(TARGET_LETTERS.len(), 24);
    }
}
