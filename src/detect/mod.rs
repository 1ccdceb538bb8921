mod normalize;
mod types;

pub use normalize::{normalize_frame, DetectionDefect, NormalizedFrame};
pub use types::{BoundingBox, Detection, FrameDetections, RawDetection};
