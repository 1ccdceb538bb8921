use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates, serialized as `[x, y, w, h]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Euclidean distance between box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Intersection-over-union overlap ratio. Zero when the boxes are disjoint
    /// or either box is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let iy = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        if ix <= 0.0 || iy <= 0.0 {
            return 0.0;
        }
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            w: v[2],
            h: v[3],
        }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

/// Canonical detection record. Created once per frame by the normalizer,
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub frame_id: u64,
    pub timestamp_ms: u64,
}

/// One raw detector entry before validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Wire input for one frame of detector output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}
