//! Headless software rasterizer.
//!
//! The production backend for replaying traces without a GPU or a window
//! system: render targets are plain RGBA8 buffers in a map, `present`
//! copies the default target to a front buffer, and every draw bumps a
//! pixels-drawn counter the profiler can sample.
//!
//! Error checking follows the configured [`DriverOptions`]: with
//! `check_errors` set, a rectangle that exceeds the bound target is rejected
//! (and nothing is drawn); in benchmark mode the rectangle is clamped
//! silently.

use super::{Driver, DriverError, DriverOptions};
use crate::image::Image;
use crate::trace::{Call, CallOp};
use ahash::AHashMap;
use serde::Serialize;

/// Target id of the default framebuffer.
pub const DEFAULT_TARGET: u32 = 0;

/// Fallback dimensions when a trace never issues a viewport call.
const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 64;

struct Target {
    width: u32,
    height: u32,
    /// RGBA8, row-major.
    pixels: Vec<u8>,
}

impl Target {
    fn new(width: u32, height: u32) -> Target {
        Target {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    fn clear(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Fills the intersection of the rect with the target. Returns pixels
    /// written.
    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) -> u64 {
        let x1 = x.min(self.width);
        let y1 = y.min(self.height);
        let x2 = x.saturating_add(w).min(self.width);
        let y2 = y.saturating_add(h).min(self.height);
        let mut written = 0u64;
        for row in y1..y2 {
            let base = (row as usize * self.width as usize + x1 as usize) * 4;
            let row_px = &mut self.pixels[base..base + (x2 - x1) as usize * 4];
            for px in row_px.chunks_exact_mut(4) {
                px.copy_from_slice(&color);
            }
            written += u64::from(x2 - x1);
        }
        written
    }

    fn image(&self) -> Image {
        Image::new(self.width, self.height, self.pixels.clone())
    }
}

#[derive(Serialize)]
struct TargetState {
    id: u32,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct SoftState {
    bound: u32,
    double_buffer: bool,
    core_profile: bool,
    pixels_drawn: u64,
    frames_presented: u64,
    targets: Vec<TargetState>,
}

/// Software backend with named render targets and a presented front buffer.
pub struct SoftDriver {
    opts: DriverOptions,
    targets: AHashMap<u32, Target>,
    bound: u32,
    /// Image of the default target as of the last `present`.
    front: Option<Image>,
    pixels_drawn: u64,
    frames_presented: u64,
}

impl SoftDriver {
    /// Backend with the default target sized to the fallback dimensions.
    pub fn new() -> SoftDriver {
        SoftDriver::with_dimensions(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    /// Backend with an explicitly sized default target.
    pub fn with_dimensions(width: u32, height: u32) -> SoftDriver {
        let mut targets = AHashMap::new();
        targets.insert(DEFAULT_TARGET, Target::new(width, height));
        SoftDriver {
            opts: DriverOptions::default(),
            targets,
            bound: DEFAULT_TARGET,
            front: None,
            pixels_drawn: 0,
            frames_presented: 0,
        }
    }

    /// The image presented by the last `present` call, if any.
    pub fn front(&self) -> Option<&Image> {
        self.front.as_ref()
    }

    fn bound_target(&mut self) -> &mut Target {
        self.targets
            .get_mut(&self.bound)
            .expect("bound target always exists")
    }
}

impl Default for SoftDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for SoftDriver {
    fn configure(&mut self, opts: &DriverOptions) {
        self.opts = *opts;
    }

    fn execute(&mut self, call: &Call) -> Result<(), DriverError> {
        match &call.op {
            CallOp::Clear { color } => {
                let target = self.bound_target();
                target.clear(*color);
                let filled = u64::from(target.width) * u64::from(target.height);
                self.pixels_drawn += filled;
            }
            CallOp::FillRect { x, y, w, h, color } => {
                let check = self.opts.check_errors;
                let target = self.bound_target();
                let in_bounds = x.saturating_add(*w) <= target.width
                    && y.saturating_add(*h) <= target.height;
                if check && !in_bounds {
                    return Err(DriverError::Invalid {
                        detail: format!(
                            "rect {}x{}+{}+{} exceeds target {}x{}",
                            w, h, x, y, target.width, target.height
                        ),
                    });
                }
                let written = target.fill_rect(*x, *y, *w, *h, *color);
                self.pixels_drawn += written;
            }
            CallOp::Present => {
                let image = self
                    .targets
                    .get(&DEFAULT_TARGET)
                    .expect("default target always exists")
                    .image();
                self.front = Some(image);
                self.frames_presented += 1;
            }
            CallOp::BindTarget { target } => {
                if !self.targets.contains_key(target) {
                    let (w, h) = {
                        let cur = self.bound_target();
                        (cur.width, cur.height)
                    };
                    self.targets.insert(*target, Target::new(w, h));
                }
                self.bound = *target;
            }
            CallOp::FrameEnd => {}
            CallOp::Viewport { width, height } => {
                if *width == 0 || *height == 0 {
                    return Err(DriverError::Invalid {
                        detail: format!("viewport {width}x{height} is degenerate"),
                    });
                }
                *self.bound_target() = Target::new(*width, *height);
            }
            CallOp::Marker { .. } => {}
        }
        Ok(())
    }

    fn flush(&mut self) {
        // Rendering is synchronous; nothing is queued.
    }

    fn snapshot(&mut self) -> Option<Image> {
        Some(self.bound_target().image())
    }

    fn pixels_drawn(&self) -> Option<u64> {
        Some(self.pixels_drawn)
    }

    fn state(&self) -> Option<serde_json::Value> {
        let mut targets: Vec<TargetState> = self
            .targets
            .iter()
            .map(|(id, t)| TargetState {
                id: *id,
                width: t.width,
                height: t.height,
            })
            .collect();
        targets.sort_by_key(|t| t.id);
        let state = SoftState {
            bound: self.bound,
            double_buffer: self.opts.double_buffer,
            core_profile: self.opts.core_profile,
            pixels_drawn: self.pixels_drawn,
            frames_presented: self.frames_presented,
            targets,
        };
        serde_json::to_value(state).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Call;

    fn call(no: u32, op: CallOp) -> Call {
        Call::new(no, 0, op)
    }

    #[test]
    fn clear_fills_bound_target() {
        let mut d = SoftDriver::with_dimensions(2, 2);
        d.execute(&call(1, CallOp::Clear { color: [5, 6, 7, 255] }))
            .unwrap();
        let img = d.snapshot().unwrap();
        assert_eq!(&img.pixels()[..4], &[5, 6, 7, 255]);
        assert_eq!(d.pixels_drawn(), Some(4));
    }

    #[test]
    fn fill_rect_counts_written_pixels() {
        let mut d = SoftDriver::with_dimensions(8, 8);
        d.execute(&call(
            1,
            CallOp::FillRect {
                x: 1,
                y: 1,
                w: 2,
                h: 3,
                color: [255, 0, 0, 255],
            },
        ))
        .unwrap();
        assert_eq!(d.pixels_drawn(), Some(6));
    }

    #[test]
    fn out_of_bounds_rect_is_checked() {
        let mut d = SoftDriver::with_dimensions(4, 4);
        let oob = call(
            1,
            CallOp::FillRect {
                x: 2,
                y: 2,
                w: 8,
                h: 8,
                color: [0; 4],
            },
        );
        assert!(d.execute(&oob).is_err());
        assert_eq!(d.pixels_drawn(), Some(0));

        // Benchmark mode clamps instead.
        d.configure(&DriverOptions {
            check_errors: false,
            ..DriverOptions::default()
        });
        d.execute(&oob).unwrap();
        assert_eq!(d.pixels_drawn(), Some(4));
    }

    #[test]
    fn present_updates_front_buffer() {
        let mut d = SoftDriver::with_dimensions(2, 2);
        d.execute(&call(1, CallOp::Clear { color: [1, 1, 1, 255] }))
            .unwrap();
        assert!(d.front().is_none());
        d.execute(&call(2, CallOp::Present)).unwrap();
        let front = d.front().unwrap();
        assert_eq!(&front.pixels()[..4], &[1, 1, 1, 255]);
    }

    #[test]
    fn bind_target_isolates_rendering() {
        let mut d = SoftDriver::with_dimensions(2, 2);
        d.execute(&call(1, CallOp::Clear { color: [9, 9, 9, 255] }))
            .unwrap();
        d.execute(&call(2, CallOp::BindTarget { target: 3 }))
            .unwrap();
        d.execute(&call(3, CallOp::Clear { color: [1, 2, 3, 255] }))
            .unwrap();
        // Snapshot shows the bound target, not the default one.
        let img = d.snapshot().unwrap();
        assert_eq!(&img.pixels()[..4], &[1, 2, 3, 255]);
        d.execute(&call(4, CallOp::BindTarget { target: 0 }))
            .unwrap();
        let img = d.snapshot().unwrap();
        assert_eq!(&img.pixels()[..4], &[9, 9, 9, 255]);
    }

    #[test]
    fn viewport_resizes_bound_target() {
        let mut d = SoftDriver::with_dimensions(2, 2);
        d.execute(&call(
            1,
            CallOp::Viewport {
                width: 5,
                height: 3,
            },
        ))
        .unwrap();
        let img = d.snapshot().unwrap();
        assert_eq!((img.width(), img.height()), (5, 3));
        assert!(d
            .execute(&call(2, CallOp::Viewport { width: 0, height: 3 }))
            .is_err());
    }

    #[test]
    fn state_reports_targets() {
        let mut d = SoftDriver::with_dimensions(2, 2);
        d.execute(&call(1, CallOp::BindTarget { target: 7 }))
            .unwrap();
        let state = d.state().unwrap();
        assert_eq!(state["bound"], 7);
        assert_eq!(state["targets"].as_array().unwrap().len(), 2);
    }
}
