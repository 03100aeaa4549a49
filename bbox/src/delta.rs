use crate::{common::*, PixelBox};

/// Regression delta from an example box to a target box.
///
/// Centers are offset relative to the example size, sizes are log-scaled
/// ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxDelta<T> {
    pub dx: T,
    pub dy: T,
    pub dw: T,
    pub dh: T,
}

impl<T> BoxDelta<T>
where
    T: Float,
{
    pub fn zero() -> Self {
        let zero = T::zero();
        Self {
            dx: zero,
            dy: zero,
            dw: zero,
            dh: zero,
        }
    }

    /// Encode the delta that moves `example` onto `target`.
    pub fn encode(example: &PixelBox<T>, target: &PixelBox<T>) -> Self {
        let ex_w = example.w();
        let ex_h = example.h();

        Self {
            dx: (target.cx() - example.cx()) / ex_w,
            dy: (target.cy() - example.cy()) / ex_h,
            dw: (target.w() / ex_w).ln(),
            dh: (target.h() / ex_h).ln(),
        }
    }

    /// Apply the delta on `example`, the inverse of [BoxDelta::encode].
    pub fn apply(&self, example: &PixelBox<T>) -> Result<PixelBox<T>> {
        let ex_w = example.w();
        let ex_h = example.h();

        let cx = self.dx * ex_w + example.cx();
        let cy = self.dy * ex_h + example.cy();
        let w = self.dw.exp() * ex_w;
        let h = self.dh.exp() * ex_h;

        PixelBox::try_from_cxcywh([cx, cy, w, h])
    }

    pub fn from_array(array: [T; 4]) -> Self {
        let [dx, dy, dw, dh] = array;
        Self { dx, dy, dw, dh }
    }

    pub fn to_array(&self) -> [T; 4] {
        [self.dx, self.dy, self.dw, self.dh]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn delta_identity_is_zero() {
        let bbox = PixelBox::try_from_xyxy([3.0, 4.0, 22.0, 43.0]).unwrap();
        let delta = BoxDelta::encode(&bbox, &bbox);
        assert_eq!(delta, BoxDelta::zero());
    }

    #[test]
    fn delta_shift_and_scale() {
        let example = PixelBox::try_from_xyxy([0.0, 0.0, 9.0, 9.0]).unwrap();
        let target = PixelBox::try_from_xyxy([5.0, 0.0, 24.0, 9.0]).unwrap();
        let delta = BoxDelta::encode(&example, &target);

        // centers 5 -> 15, widths 10 -> 20
        assert_abs_diff_eq!(delta.dx, 1.0);
        assert_abs_diff_eq!(delta.dy, 0.0);
        assert_abs_diff_eq!(delta.dw, 2f64.ln());
        assert_abs_diff_eq!(delta.dh, 0.0);
    }

    #[test]
    fn delta_apply_inverts_encode() {
        let example = PixelBox::try_from_xyxy([10.0, 12.0, 49.0, 31.0]).unwrap();
        let target = PixelBox::try_from_xyxy([14.0, 8.0, 61.0, 35.0]).unwrap();
        let decoded = BoxDelta::encode(&example, &target).apply(&example).unwrap();

        decoded
            .xyxy()
            .iter()
            .zip(target.xyxy().iter())
            .for_each(|(lhs, rhs)| {
                assert_abs_diff_eq!(*lhs, *rhs, epsilon = 1e-9);
            });
    }
}
