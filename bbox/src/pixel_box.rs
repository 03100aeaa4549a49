use crate::common::*;

/// Bounding box in inclusive pixel coordinates.
///
/// The right and bottom edges belong to the box, so a box spanning a
/// single pixel has width and height of one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox<T> {
    pub(crate) x1: T,
    pub(crate) y1: T,
    pub(crate) x2: T,
    pub(crate) y2: T,
}

impl<T> PixelBox<T>
where
    T: Float,
{
    pub fn try_from_xyxy(xyxy: [T; 4]) -> Result<Self> {
        let [x1, y1, x2, y2] = xyxy;
        ensure!(
            xyxy.iter().all(|value| value.is_finite()),
            "box coordinates must be finite"
        );
        ensure!(x2 >= x1 && y2 >= y1, "x2 >= x1 and y2 >= y1 must hold");
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn try_from_cxcywh(cxcywh: [T; 4]) -> Result<Self> {
        let [cx, cy, w, h] = cxcywh;
        let one = T::one();
        let half = one / (one + one);
        ensure!(w >= one && h >= one, "w and h must be at least one pixel");

        let x1 = cx - half * w;
        let y1 = cy - half * h;
        let x2 = cx + half * w - one;
        let y2 = cy + half * h - one;
        Self::try_from_xyxy([x1, y1, x2, y2])
    }

    pub fn x1(&self) -> T {
        self.x1
    }

    pub fn y1(&self) -> T {
        self.y1
    }

    pub fn x2(&self) -> T {
        self.x2
    }

    pub fn y2(&self) -> T {
        self.y2
    }

    pub fn w(&self) -> T {
        self.x2 - self.x1 + T::one()
    }

    pub fn h(&self) -> T {
        self.y2 - self.y1 + T::one()
    }

    pub fn cx(&self) -> T {
        let one = T::one();
        self.x1 + self.w() / (one + one)
    }

    pub fn cy(&self) -> T {
        let one = T::one();
        self.y1 + self.h() / (one + one)
    }

    pub fn xyxy(&self) -> [T; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn area(&self) -> T {
        self.w() * self.h()
    }

    /// Mirror the box along the vertical center line of an image.
    pub fn flip_horizontal(&self, image_width: T) -> Result<Self> {
        let one = T::one();
        ensure!(
            self.x2 <= image_width - one && self.x1 >= T::zero(),
            "box must lie within the image width to be flipped"
        );
        Ok(Self {
            x1: image_width - self.x2 - one,
            y1: self.y1,
            x2: image_width - self.x1 - one,
            y2: self.y2,
        })
    }

    /// Area shared with the other box, zero when disjoint.
    pub fn intersection_area_with(&self, other: &Self) -> T {
        let one = T::one();
        let zero = T::zero();
        let iw = self.x2.min(other.x2) - self.x1.max(other.x1) + one;
        let ih = self.y2.min(other.y2) - self.y1.max(other.y1) + one;

        if iw > zero && ih > zero {
            iw * ih
        } else {
            zero
        }
    }

    pub fn iou_with(&self, other: &Self) -> T {
        let inter_area = self.intersection_area_with(other);
        if inter_area <= T::zero() {
            return T::zero();
        }
        let union_area = self.area() + other.area() - inter_area;
        inter_area / union_area
    }
}
