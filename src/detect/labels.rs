//! Fixed id-to-label mapping for pretrained object-detection models.
//!
//! Pretrained backends report integer class ids; this table resolves them to
//! the COCO class names those models are trained on. The stub backend reuses
//! the same table so scripted and real detections read alike.

/// COCO class names, indexed by model class id.
pub const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Class id of `"person"` in the COCO table.
pub const PERSON_CLASS_ID: usize = 0;

/// Resolve a class id against a label table; unknown ids read as "unknown".
pub fn resolve(labels: &'static [&'static str], class_id: usize) -> &'static str {
    labels.get(class_id).copied().unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_is_class_zero() {
        assert_eq!(COCO_LABELS[PERSON_CLASS_ID], "person");
    }

    #[test]
    fn out_of_range_ids_resolve_to_unknown() {
        assert_eq!(resolve(&COCO_LABELS, 80), "unknown");
        assert_eq!(resolve(&COCO_LABELS, 2), "car");
    }
}
