#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::COCO_LABELS;
use crate::detect::result::{BoundingBox, Detection};

/// Tract-based backend for pretrained ONNX object-detection models.
///
/// Expects a YOLO-style export: NCHW f32 input normalized to 0..1, output
/// rows of `[cx, cy, w, h, objectness, class scores...]` in input-pixel
/// coordinates. The backend loads a local model file and performs inference
/// on RGB frames; it does no network I/O and writes nothing to disk.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode_output(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }

        let row_len = 5 + COCO_LABELS.len();
        // Accept both [1, rows, attrs] and the transposed [1, attrs, rows].
        let (rows, transposed) = if shape[2] == row_len {
            (shape[1], false)
        } else if shape[1] == row_len {
            (shape[2], true)
        } else {
            return Err(anyhow!(
                "model output row length {:?} does not match {} classes",
                shape,
                COCO_LABELS.len()
            ));
        };

        let at = |row: usize, attr: usize| -> f32 {
            if transposed {
                view[[0, attr, row]]
            } else {
                view[[0, row, attr]]
            }
        };

        let mut candidates = Vec::new();
        for row in 0..rows {
            let objectness = at(row, 4);
            if objectness < self.confidence_threshold {
                continue;
            }

            let mut best_class = 0usize;
            let mut best_score = 0.0f32;
            for class_id in 0..COCO_LABELS.len() {
                let score = at(row, 5 + class_id);
                if score > best_score {
                    best_score = score;
                    best_class = class_id;
                }
            }

            let confidence = objectness * best_score;
            if confidence < self.confidence_threshold {
                continue;
            }

            let cx = at(row, 0);
            let cy = at(row, 1);
            let w = at(row, 2);
            let h = at(row, 3);
            candidates.push(Detection {
                class_id: best_class,
                confidence,
                bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h),
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Greedy per-class NMS: sort by confidence descending, suppress overlaps.
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let overlaps = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && existing.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &'static [&'static str] {
        &COCO_LABELS
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (self.width * self.height * 3) as usize];
        self.detect(&blank, self.width, self.height)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_suppresses_same_class_overlaps_only() {
        let near_duplicate = |class_id, confidence| Detection {
            class_id,
            confidence,
            bbox: BoundingBox::new(10.0, 10.0, 20.0, 20.0),
        };

        let kept = non_max_suppression(
            vec![
                near_duplicate(0, 0.9),
                near_duplicate(0, 0.8),
                near_duplicate(2, 0.7),
            ],
            0.45,
        );

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].class_id, 0);
        assert_eq!(kept[1].class_id, 2);
    }
}
