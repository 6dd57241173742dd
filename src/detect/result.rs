/// Axis-aligned box in working-frame pixel coordinates (`x2`/`y2` exclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncate floating point model coordinates the same way the model's
    /// own tooling does (towards zero).
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32)
    }

    pub fn width(&self) -> u32 {
        (i64::from(self.x2) - i64::from(self.x1)).clamp(0, i64::from(u32::MAX)) as u32
    }

    pub fn height(&self) -> u32 {
        (i64::from(self.y2) - i64::from(self.y1)).clamp(0, i64::from(u32::MAX)) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Clamp to `[0, width] x [0, height]`. Returns `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as i32, height as i32);
        let clamped = Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        };
        if clamped.x2 <= clamped.x1 || clamped.y2 <= clamped.y1 {
            None
        } else {
            Some(clamped)
        }
    }

    /// Intersection over union.
    pub fn iou(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = BoundingBox::new(ix1, iy1, ix2, iy2).area();
        let union = self.area() + other.area() - inter;
        if union == 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

/// Classes emitted by the helmet model.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Motorcycle,
    Helmet,
    LicensePlate,
    NoHelmet,
    Unknown(u32),
}

impl ObjectClass {
    pub fn from_class_id(id: u32) -> Self {
        match id {
            0 => ObjectClass::Motorcycle,
            1 => ObjectClass::Helmet,
            2 => ObjectClass::LicensePlate,
            3 => ObjectClass::NoHelmet,
            other => ObjectClass::Unknown(other),
        }
    }

    pub fn class_id(&self) -> u32 {
        match self {
            ObjectClass::Motorcycle => 0,
            ObjectClass::Helmet => 1,
            ObjectClass::LicensePlate => 2,
            ObjectClass::NoHelmet => 3,
            ObjectClass::Unknown(id) => *id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Motorcycle => "Motorcycle",
            ObjectClass::Helmet => "Helmet",
            ObjectClass::LicensePlate => "LicensePlate",
            ObjectClass::NoHelmet => "NoHelmet",
            ObjectClass::Unknown(_) => "Unknown",
        }
    }
}

/// One detection from a single decode cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class: ObjectClass::from_class_id(class_id),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_round_trip_through_labels() {
        assert_eq!(ObjectClass::from_class_id(0), ObjectClass::Motorcycle);
        assert_eq!(ObjectClass::from_class_id(3).label(), "NoHelmet");
        assert_eq!(ObjectClass::from_class_id(9), ObjectClass::Unknown(9));
        assert_eq!(ObjectClass::Unknown(9).class_id(), 9);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0, 0, 10, 10);
        assert!((b.iou(&b) - 1.0).abs() < f32::EPSILON);
        assert_eq!(b.iou(&BoundingBox::new(20, 20, 30, 30)), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 15, 10);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn detection_confidence_is_clamped() {
        let det = Detection::new(2, 1.4, BoundingBox::new(0, 0, 1, 1));
        assert_eq!(det.confidence, 1.0);
        assert_eq!(det.class, ObjectClass::LicensePlate);
    }
}
