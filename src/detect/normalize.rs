use thiserror::Error;

use super::types::{Detection, FrameDetections};

/// Defect in a single raw detector entry. Recoverable: the entry is dropped
/// with a warning and the rest of the frame is processed normally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionDefect {
    #[error("detection '{label}' has non-positive box {w}x{h}")]
    NonPositiveBox { label: String, w: f32, h: f32 },
    #[error("detection '{label}' confidence {confidence} outside [0,1]")]
    ConfidenceOutOfRange { label: String, confidence: f32 },
}

/// Canonical output of the normalizer for one frame.
#[derive(Debug, Default)]
pub struct NormalizedFrame {
    pub detections: Vec<Detection>,
    /// Entries rejected as malformed, in input order. Never silently empty
    /// when something was dropped.
    pub dropped: Vec<DetectionDefect>,
}

/// Validate and canonicalize one frame of raw detector output.
///
/// Malformed entries (non-positive box, confidence outside `[0,1]`) are
/// dropped with a warning; entries below `confidence_floor` are dropped
/// quietly. Input order is preserved for the survivors.
pub fn normalize_frame(raw: &FrameDetections, confidence_floor: f32) -> NormalizedFrame {
    let mut out = NormalizedFrame::default();
    for entry in &raw.detections {
        if entry.bbox.w <= 0.0 || entry.bbox.h <= 0.0 {
            let defect = DetectionDefect::NonPositiveBox {
                label: entry.class_label.clone(),
                w: entry.bbox.w,
                h: entry.bbox.h,
            };
            log::warn!("frame {}: dropping entry: {}", raw.frame_id, defect);
            out.dropped.push(defect);
            continue;
        }
        if !entry.confidence.is_finite() || entry.confidence < 0.0 || entry.confidence > 1.0 {
            let defect = DetectionDefect::ConfidenceOutOfRange {
                label: entry.class_label.clone(),
                confidence: entry.confidence,
            };
            log::warn!("frame {}: dropping entry: {}", raw.frame_id, defect);
            out.dropped.push(defect);
            continue;
        }
        if entry.confidence < confidence_floor {
            log::debug!(
                "frame {}: '{}' below confidence floor ({} < {})",
                raw.frame_id,
                entry.class_label,
                entry.confidence,
                confidence_floor
            );
            continue;
        }
        out.detections.push(Detection {
            class_label: entry.class_label.clone(),
            confidence: entry.confidence.clamp(0.0, 1.0),
            bbox: entry.bbox,
            frame_id: raw.frame_id,
            timestamp_ms: raw.timestamp_ms,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::types::{BoundingBox, RawDetection};

    fn frame(entries: Vec<RawDetection>) -> FrameDetections {
        FrameDetections {
            frame_id: 7,
            timestamp_ms: 1_000,
            detections: entries,
        }
    }

    fn raw(label: &str, confidence: f32, bbox: BoundingBox) -> RawDetection {
        RawDetection {
            class_label: label.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn keeps_valid_entries_in_order() {
        let f = frame(vec![
            raw("person", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            raw("forklift", 0.6, BoundingBox::new(40.0, 0.0, 30.0, 20.0)),
        ]);
        let n = normalize_frame(&f, 0.25);
        assert_eq!(n.dropped.len(), 0);
        let labels: Vec<&str> = n.detections.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(labels, vec!["person", "forklift"]);
        assert_eq!(n.detections[0].frame_id, 7);
        assert_eq!(n.detections[0].timestamp_ms, 1_000);
    }

    #[test]
    fn drops_non_positive_box_without_failing_frame() {
        let f = frame(vec![
            raw("person", 0.9, BoundingBox::new(0.0, 0.0, 0.0, 10.0)),
            raw("person", 0.8, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
        ]);
        let n = normalize_frame(&f, 0.25);
        assert_eq!(n.detections.len(), 1);
        assert!(matches!(
            n.dropped[0],
            DetectionDefect::NonPositiveBox { .. }
        ));
    }

    #[test]
    fn drops_out_of_range_confidence() {
        let f = frame(vec![
            raw("person", 1.4, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            raw("person", -0.1, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
        ]);
        let n = normalize_frame(&f, 0.0);
        assert!(n.detections.is_empty());
        assert_eq!(n.dropped.len(), 2);
    }

    #[test]
    fn applies_confidence_floor_quietly() {
        let f = frame(vec![raw(
            "person",
            0.2,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        )]);
        let n = normalize_frame(&f, 0.25);
        assert!(n.detections.is_empty());
        assert!(n.dropped.is_empty());
    }
}
