//! Picture-in-picture geometry.
//!
//! Rectangles are computed in a bottom-left-origin space, with `y` growing
//! upward. The ffmpeg overlay filter works top-left-origin, so callers flip
//! with [`PipRect::to_top_left`] before rendering.

use dualcap_session_model::{Dimensions, OverlayCorner, OverlaySpec, SizePolicy};

/// PIP width as a fraction of the output width.
pub const PIP_WIDTH_FRACTION: f64 = 0.25;

/// Rounded-corner radius of the camera mask, in pixels.
pub const CORNER_RADIUS: u32 = 16;

/// Border thickness drawn over the mask edge, in pixels.
pub const BORDER_WIDTH: u32 = 3;

/// Border fade-in: start and duration, seconds into the composite.
pub const BORDER_FADE_START_SECS: f64 = 0.1;
pub const BORDER_FADE_SECS: f64 = 0.25;

/// How the camera frame is brought to the PIP size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFit {
    /// Scale to fit inside; letterbox the rest.
    Fit,
    /// Scale to cover; crop the overflow around the center.
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PipRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    /// The same rectangle in a top-left-origin frame of `frame_height`.
    pub fn to_top_left(&self, frame_height: f64) -> PipRect {
        PipRect {
            y: frame_height - self.y - self.height,
            ..*self
        }
    }

    pub fn contains(&self, other: &PipRect) -> bool {
        const EPS: f64 = 1e-6;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.top() <= self.top() + EPS
    }
}

/// Integer placement for the renderer, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub size: Dimensions,
}

/// Resolved overlay placement for one merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub canvas: Dimensions,
    pub corner: OverlayCorner,
    /// Bottom-left origin.
    pub pip: PipRect,
    pub fit: CameraFit,
    pub margin: f64,
}

impl OverlayLayout {
    /// Place a camera of size `camera` on an output `canvas`.
    ///
    /// The margin is capped at a quarter of the shorter canvas side. A PIP
    /// that would not fit between the margins shrinks with its aspect ratio
    /// kept.
    pub fn compute(canvas: Dimensions, camera: Dimensions, spec: &OverlaySpec) -> Self {
        let canvas_w = canvas.width as f64;
        let canvas_h = canvas.height as f64;
        let margin = (spec.margin as f64).min(canvas_w.min(canvas_h) / 4.0);

        let width = canvas_w * PIP_WIDTH_FRACTION;
        let height = match spec.size_policy.fixed_height_ratio() {
            Some(ratio) => width * ratio,
            None => width / camera.aspect_ratio(),
        };

        let max_w = (canvas_w - 2.0 * margin).max(1.0);
        let max_h = (canvas_h - 2.0 * margin).max(1.0);
        let shrink = (max_w / width).min(max_h / height).min(1.0);
        let (width, height) = (width * shrink, height * shrink);

        let x = if spec.position.is_left() {
            margin
        } else {
            canvas_w - margin - width
        };
        let y = if spec.position.is_top() {
            canvas_h - margin - height
        } else {
            margin
        };

        let fit = match spec.size_policy {
            SizePolicy::Auto => CameraFit::Fit,
            _ => CameraFit::Fill,
        };

        Self {
            canvas,
            corner: spec.position,
            pip: PipRect {
                x,
                y,
                width,
                height,
            },
            fit,
            margin,
        }
    }

    pub fn canvas_rect(&self) -> PipRect {
        PipRect {
            x: 0.0,
            y: 0.0,
            width: self.canvas.width as f64,
            height: self.canvas.height as f64,
        }
    }

    /// Even-sized, top-left-origin pixel placement.
    ///
    /// Same corner and margins as [`OverlayLayout::pip`] flipped with
    /// [`PipRect::to_top_left`], rounded so the PIP stays inside the canvas.
    pub fn pixel_rect(&self) -> PixelRect {
        let size = Dimensions::new(
            self.pip.width.round() as u32,
            self.pip.height.round() as u32,
        )
        .even();
        let margin = self.margin.round() as u32;

        let x = if self.corner.is_left() {
            margin
        } else {
            self.canvas.width.saturating_sub(margin + size.width)
        };
        let y = if self.corner.is_top() {
            margin
        } else {
            self.canvas.height.saturating_sub(margin + size.height)
        };
        PixelRect { x, y, size }
    }
}

/// Largest even size with `source`'s aspect that fits in `bounds`.
pub fn fit_within(source: Dimensions, bounds: Dimensions) -> Dimensions {
    if source.width <= bounds.width && source.height <= bounds.height {
        return source.even();
    }
    let scale = (bounds.width as f64 / source.width as f64)
        .min(bounds.height as f64 / source.height as f64);
    Dimensions::new(
        (source.width as f64 * scale).round() as u32,
        (source.height as f64 * scale).round() as u32,
    )
    .even()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(position: OverlayCorner, size_policy: SizePolicy, margin: u32) -> OverlaySpec {
        OverlaySpec {
            position,
            size_policy,
            margin,
        }
    }

    #[test]
    fn bottom_right_on_1080p() {
        let layout = OverlayLayout::compute(
            Dimensions::new(1920, 1080),
            Dimensions::new(1280, 720),
            &OverlaySpec::default(),
        );
        assert_eq!(layout.pip.width, 480.0);
        assert_eq!(layout.pip.height, 270.0);
        assert_eq!(layout.pip.x, 1920.0 - 20.0 - 480.0);
        assert_eq!(layout.pip.y, 20.0);
        assert_eq!(layout.fit, CameraFit::Fit);

        let px = layout.pixel_rect();
        assert_eq!(px.size, Dimensions::new(480, 270));
        assert_eq!((px.x, px.y), (1420, 790));
    }

    #[test]
    fn top_left_flips_to_margin() {
        let layout = OverlayLayout::compute(
            Dimensions::new(1920, 1080),
            Dimensions::new(640, 480),
            &spec(OverlayCorner::TopLeft, SizePolicy::Square, 20),
        );
        assert_eq!(layout.pip.height, 480.0);
        assert_eq!(layout.pip.y, 1080.0 - 20.0 - 480.0);
        assert_eq!(layout.pip.to_top_left(1080.0).y, 20.0);
        assert_eq!(layout.pixel_rect().y, 20);
        assert_eq!(layout.fit, CameraFit::Fill);
    }

    #[test]
    fn portrait_camera_shrinks_to_fit() {
        let layout = OverlayLayout::compute(
            Dimensions::new(1280, 300),
            Dimensions::new(720, 1280),
            &spec(OverlayCorner::BottomLeft, SizePolicy::Auto, 10),
        );
        assert!(layout.pip.height <= 280.0 + 1e-9);
        let aspect = 720.0 / 1280.0;
        assert!((layout.pip.width / layout.pip.height - aspect).abs() < 1e-9);
    }

    #[test]
    fn fit_within_keeps_small_sources() {
        assert_eq!(
            fit_within(Dimensions::new(1280, 720), Dimensions::new(1920, 1080)),
            Dimensions::new(1280, 720)
        );
        assert_eq!(
            fit_within(Dimensions::new(3840, 2160), Dimensions::new(1920, 1080)),
            Dimensions::new(1920, 1080)
        );
        assert_eq!(
            fit_within(Dimensions::new(2560, 1600), Dimensions::new(1920, 1080)),
            Dimensions::new(1728, 1080)
        );
    }

    fn corner() -> impl Strategy<Value = OverlayCorner> {
        prop::sample::select(OverlayCorner::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn auto_height_follows_camera_aspect(
            sw in 200u32..4000,
            sh in 200u32..3000,
            cw in 16u32..4000,
            ch in 16u32..4000,
            corner in corner(),
        ) {
            let layout = OverlayLayout::compute(
                Dimensions::new(sw, sh),
                Dimensions::new(cw, ch),
                &spec(corner, SizePolicy::Auto, 20),
            );
            let aspect = cw as f64 / ch as f64;
            let expected = layout.pip.width / aspect;
            prop_assert!((layout.pip.height - expected).abs() < 1e-6);
        }

        #[test]
        fn fixed_ratios_ignore_camera_aspect(
            sw in 200u32..4000,
            sh in 200u32..3000,
            cw in 16u32..4000,
            ch in 16u32..4000,
            policy in prop::sample::select(vec![
                SizePolicy::Square,
                SizePolicy::FourByThree,
                SizePolicy::SixteenByNine,
            ]),
        ) {
            let layout = OverlayLayout::compute(
                Dimensions::new(sw, sh),
                Dimensions::new(cw, ch),
                &spec(OverlayCorner::BottomRight, policy, 20),
            );
            let ratio = policy.fixed_height_ratio().unwrap();
            prop_assert!((layout.pip.height - layout.pip.width * ratio).abs() < 1e-6);
        }

        #[test]
        fn pip_stays_inside_the_screen(
            sw in 200u32..4000,
            sh in 200u32..3000,
            cw in 16u32..4000,
            ch in 16u32..4000,
            corner in corner(),
            margin_frac in 0.0f64..=0.25,
            policy in prop::sample::select(SizePolicy::ALL.to_vec()),
        ) {
            let margin = (sw.min(sh) as f64 * margin_frac).floor() as u32;
            let layout = OverlayLayout::compute(
                Dimensions::new(sw, sh),
                Dimensions::new(cw, ch),
                &spec(corner, policy, margin),
            );
            prop_assert!(layout.canvas_rect().contains(&layout.pip));
            prop_assert!(layout.pip.x >= 0.0 && layout.pip.y >= 0.0);

            let px = layout.pixel_rect();
            prop_assert!(px.x + px.size.width <= sw);
            prop_assert!(px.y + px.size.height <= sh);
        }
    }
}
