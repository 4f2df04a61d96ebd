use serde::{Deserialize, Serialize};

/// Raw model output in input-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: u32,
    pub confidence: f32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.) * (self.y2 - self.y1).max(0.)
    }

    pub fn intersection(&self, other: &Detection) -> f32 {
        let width = self.x2.min(other.x2) - self.x1.max(other.x1);
        let height = self.y2.min(other.y2) - self.y1.max(other.y1);
        width.max(0.) * height.max(0.)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0. {
            return 0.;
        }
        intersection / union
    }
}

/// Detected object as returned to HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    #[serde(rename = "classe")]
    pub class_index: u32,
    #[serde(rename = "confianca")]
    pub confidence: f32,
}

impl From<Detection> for BoundingBox {
    // `as` truncates toward zero, which is the integer conversion clients expect.
    fn from(detection: Detection) -> Self {
        Self {
            x1: detection.x1 as i32,
            y1: detection.y1 as i32,
            x2: detection.x2 as i32,
            y2: detection.y2 as i32,
            class_index: detection.class_id,
            confidence: detection.confidence,
        }
    }
}
