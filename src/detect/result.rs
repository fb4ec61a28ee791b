/// Axis-aligned box in normalized 0..1 coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One candidate region reported by a classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    /// Person confidence on a 0..1 scale.
    pub confidence: f32,
    /// Where in the frame, when the classifier localizes.
    pub bounds: Option<BoundingBox>,
}

impl Region {
    pub fn new(confidence: f32) -> Self {
        Self {
            confidence,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }
}
