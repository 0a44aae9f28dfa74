//! Safety classification for generated images.
//!
//! The stub draws a weighted random label; a real classifier can replace
//! it behind the same trait without touching the pipeline.

use crate::review::status::SafetyLevel;

/// Assigns a content-risk label to a generated image reference.
pub trait SafetyClassifier: Send + Sync {
    fn classify(&self, image_ref: &str) -> SafetyLevel;
}

/// Weighted random draw: 90% safe, 8% moderate, 2% unsafe.
#[derive(Debug, Default)]
pub struct WeightedStubClassifier;

impl WeightedStubClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl SafetyClassifier for WeightedStubClassifier {
    fn classify(&self, _image_ref: &str) -> SafetyLevel {
        let mut buf = [0u8; 8];
        match getrandom::fill(&mut buf) {
            Ok(()) => {
                let roll = u64::from_ne_bytes(buf) % 100;
                if roll < 90 {
                    SafetyLevel::Safe
                } else if roll < 98 {
                    SafetyLevel::Moderate
                } else {
                    SafetyLevel::Unsafe
                }
            }
            // No entropy: fail toward caution, not toward silent accept.
            Err(_) => SafetyLevel::Moderate,
        }
    }
}
