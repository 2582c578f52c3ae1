use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ProjectError {
    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },
}

/// Aspect-fill (cover) projection from captured-image pixel space into
/// display-viewport pixel space. The image is scaled until it fully covers
/// the viewport and centered, cropping overflow, so both offsets are
/// non-positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Computes the cover transform for one captured frame. Capture dimensions
/// differ between manual and streaming captures, so callers recompute this
/// per frame rather than caching it.
pub fn cover_transform(
    img_w: u32,
    img_h: u32,
    view_w: f32,
    view_h: f32,
) -> Result<CoverTransform, ProjectError> {
    if img_w == 0 || img_h == 0 {
        return Err(ProjectError::InvalidFrame {
            width: img_w,
            height: img_h,
        });
    }

    let scale = (view_w / img_w as f32).max(view_h / img_h as f32);
    let offset_x = (view_w - img_w as f32 * scale) / 2.0;
    let offset_y = (view_h - img_h as f32 * scale) / 2.0;

    Ok(CoverTransform {
        scale,
        offset_x,
        offset_y,
    })
}

impl CoverTransform {
    /// Maps a `(x1, y1, x2, y2)` box through the transform, corner by corner.
    pub fn project(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            bbox[0] * self.scale + self.offset_x,
            bbox[1] * self.scale + self.offset_y,
            bbox[2] * self.scale + self.offset_x,
            bbox[3] * self.scale + self.offset_y,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-3;

    #[test]
    fn portrait_viewport_over_landscape_capture() {
        let transform = cover_transform(640, 480, 1080.0, 1920.0).unwrap();

        assert_eq!(transform.scale, 4.0);
        assert_eq!(transform.offset_x, -740.0);
        assert_eq!(transform.offset_y, 0.0);

        let projected = transform.project([100.0, 100.0, 200.0, 200.0]);
        assert_eq!(projected, [-340.0, 400.0, 60.0, 800.0]);
    }

    #[test]
    fn scale_never_under_covers() {
        let cases = [
            (640u32, 480u32, 1080.0f32, 1920.0f32),
            (1920, 1080, 375.0, 812.0),
            (320, 240, 320.0, 240.0),
            (1280, 720, 1440.0, 900.0),
        ];

        for (img_w, img_h, view_w, view_h) in cases {
            let t = cover_transform(img_w, img_h, view_w, view_h).unwrap();
            assert!(t.scale >= view_w / img_w as f32 - TOLERANCE);
            assert!(t.scale >= view_h / img_h as f32 - TOLERANCE);
            assert!(t.offset_x <= TOLERANCE);
            assert!(t.offset_y <= TOLERANCE);
            assert!(t.offset_x <= 0.0 || t.offset_y <= 0.0);
        }
    }

    #[test]
    fn full_image_bounds_cover_the_viewport() {
        let (img_w, img_h) = (1280u32, 720u32);
        let (view_w, view_h) = (375.0f32, 812.0f32);
        let t = cover_transform(img_w, img_h, view_w, view_h).unwrap();

        let [x1, y1, x2, y2] = t.project([0.0, 0.0, img_w as f32, img_h as f32]);

        assert!(x1 <= TOLERANCE);
        assert!(y1 <= TOLERANCE);
        assert!(x2 >= view_w - TOLERANCE);
        assert!(y2 >= view_h - TOLERANCE);
    }

    #[test]
    fn transform_is_pure() {
        let a = cover_transform(640, 480, 1080.0, 1920.0).unwrap();
        let b = cover_transform(640, 480, 1080.0, 1920.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.project([10.0, 20.0, 30.0, 40.0]),
            b.project([10.0, 20.0, 30.0, 40.0])
        );
    }

    #[test]
    fn zero_dimension_capture_is_rejected() {
        let err = cover_transform(0, 480, 1080.0, 1920.0).unwrap_err();
        assert_eq!(
            err,
            ProjectError::InvalidFrame {
                width: 0,
                height: 480
            }
        );
        assert!(cover_transform(640, 0, 1080.0, 1920.0).is_err());
    }
}
