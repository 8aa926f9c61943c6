//! Axis-aligned bounding boxes in the capture's world frame.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Tightest box around `points`, or `None` for an empty set.
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(*first, *first);
        for point in rest {
            bbox.expand_to(point);
        }
        Some(bbox)
    }

    /// Component-wise min of the mins and max of the maxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut copy = *self;
        copy.form_union(other);
        copy
    }

    /// In-place [`union`](Self::union).
    pub fn form_union(&mut self, other: &BoundingBox) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(other.min[axis]);
            self.max[axis] = self.max[axis].max(other.max[axis]);
        }
    }

    fn expand_to(&mut self, point: &[f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }

    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Running union of per-frame boxes.
#[derive(Debug, Default, Clone)]
pub struct BoundingBoxAggregator {
    current: Option<BoundingBox>,
    contributions: usize,
}

impl BoundingBoxAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame's box into the aggregate. `None` is ignored.
    pub fn add(&mut self, bbox: Option<&BoundingBox>) {
        let Some(bbox) = bbox else {
            return;
        };

        match self.current.as_mut() {
            Some(existing) => existing.form_union(bbox),
            None => self.current = Some(*bbox),
        }
        self.contributions += 1;
    }

    /// Number of boxes folded in so far.
    pub fn contributions(&self) -> usize {
        self.contributions
    }

    pub fn finish(self) -> Option<BoundingBox> {
        self.current
    }
}
