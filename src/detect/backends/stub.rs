use std::collections::HashMap;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::COCO_LABELS;
use crate::detect::result::{BoundingBox, Detection};

/// Stub backend for testing and model-free demos.
///
/// Two modes, combinable:
/// - scripted: detections are programmed per call index, so tests can place
///   an exact detection on an exact frame;
/// - motion: a full-frame detection is emitted whenever the pixel hash
///   changes from the previous frame.
///
/// Call order stands in for stream order: the n-th `detect` call is frame n.
pub struct StubBackend {
    script: HashMap<u64, Vec<Detection>>,
    motion_class: Option<usize>,
    last_hash: Option<[u8; 32]>,
    next_index: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            motion_class: None,
            last_hash: None,
            next_index: 0,
        }
    }

    /// Program detections for specific call indices.
    pub fn with_script(mut self, script: HashMap<u64, Vec<Detection>>) -> Self {
        self.script = script;
        self
    }

    /// Emit a full-frame detection of `class_id` when the scene changes.
    pub fn with_motion_class(mut self, class_id: usize) -> Self {
        self.motion_class = Some(class_id);
        self
    }

    /// Convenience: one detection of `class_id` on frame `index`.
    pub fn with_detection_at(mut self, index: u64, class_id: usize, confidence: f32) -> Self {
        self.script.entry(index).or_default().push(Detection {
            class_id,
            confidence,
            bbox: BoundingBox::new(8.0, 8.0, 32.0, 48.0),
        });
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &'static [&'static str] {
        &COCO_LABELS
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let index = self.next_index;
        self.next_index += 1;

        let mut detections = self.script.get(&index).cloned().unwrap_or_default();

        if let Some(class_id) = self.motion_class {
            let current_hash: [u8; 32] = Sha256::digest(pixels).into();
            let motion = match self.last_hash {
                Some(prev) => prev != current_hash,
                None => false,
            };
            self.last_hash = Some(current_hash);

            if motion {
                detections.push(Detection {
                    class_id,
                    confidence: 0.85,
                    bbox: BoundingBox::full_frame(width, height),
                });
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::labels::PERSON_CLASS_ID;

    #[test]
    fn scripted_detections_fire_on_their_frame() {
        let mut backend = StubBackend::new().with_detection_at(1, PERSON_CLASS_ID, 0.9);

        assert!(backend.detect(&[0u8; 12], 2, 2).unwrap().is_empty());
        let hits = backend.detect(&[0u8; 12], 2, 2).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].class_id, PERSON_CLASS_ID);
        assert!(backend.detect(&[0u8; 12], 2, 2).unwrap().is_empty());
    }

    #[test]
    fn motion_mode_fires_on_scene_change() {
        let mut backend = StubBackend::new().with_motion_class(PERSON_CLASS_ID);

        // First frame: no previous hash, no motion.
        assert!(backend.detect(b"frame1frame1", 2, 2).unwrap().is_empty());
        // Changed content: motion.
        let hits = backend.detect(b"frame2frame2", 2, 2).unwrap();
        assert_eq!(hits.len(), 1);
        // Same content again: quiet.
        assert!(backend.detect(b"frame2frame2", 2, 2).unwrap().is_empty());
    }
}
