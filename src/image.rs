//! Framebuffer images: PNG read/write, PNM write, comparison.
//!
//! The replay pipeline deals in plain RGBA8 buffers. PNG codec work is
//! delegated to the `image` crate; PNM (`P6`) is written directly since the
//! stdout snapshot mode needs a streamable format with a comment slot for
//! the call index.
//!
//! # Comparison metric
//!
//! [`Image::compare`] reports "average precision in bits": the RMS error
//! `e` over all RGB samples mapped through `log2(255 / e)` and clamped to
//! `[0, 8]`. Identical images score 8.0; images that disagree by half the
//! value range score near 1. Alpha is ignored — captured framebuffers
//! routinely carry an undefined alpha channel.

use std::io::{self, Write};
use std::path::Path;

/// An RGBA8 image, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// Wraps a raw RGBA8 buffer.
    ///
    /// # Panics
    ///
    /// If `pixels.len() != width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Image {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "pixel buffer does not match {width}x{height} RGBA8"
        );
        Image {
            width,
            height,
            pixels,
        }
    }

    /// A solid-color image.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Image {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width as usize * height as usize {
            pixels.extend_from_slice(&color);
        }
        Image {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 samples.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Reads a PNG file, converting to RGBA8.
    ///
    /// Returns `None` on any failure (missing file, unreadable, not a PNG):
    /// reference images are optional inputs and a missing one simply skips
    /// the compare.
    pub fn read_png(path: &Path) -> Option<Image> {
        let decoded = image::ImageReader::open(path).ok()?.decode().ok()?;
        let rgba = decoded.into_rgba8();
        let (width, height) = rgba.dimensions();
        Some(Image {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// Writes the image as PNG.
    pub fn write_png(&self, path: &Path) -> image::ImageResult<()> {
        image::save_buffer(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )
    }

    /// Writes the image as binary PNM (`P6`), with `comment` on a `#` line.
    ///
    /// Alpha is dropped; PNM carries RGB only.
    pub fn write_pnm<W: Write>(&self, out: &mut W, comment: &str) -> io::Result<()> {
        write!(out, "P6\n#{comment}\n{} {}\n255\n", self.width, self.height)?;
        let mut row = Vec::with_capacity(self.width as usize * 3);
        for chunk in self.pixels.chunks_exact(4) {
            row.extend_from_slice(&chunk[..3]);
            if row.len() == self.width as usize * 3 {
                out.write_all(&row)?;
                row.clear();
            }
        }
        Ok(())
    }

    /// Average precision, in bits, of `self` against `reference`.
    ///
    /// Mismatched dimensions score 0.0.
    pub fn compare(&self, reference: &Image) -> f64 {
        if self.width != reference.width || self.height != reference.height {
            return 0.0;
        }
        let mut sum_sq: f64 = 0.0;
        let mut samples: u64 = 0;
        for (a, b) in self
            .pixels
            .chunks_exact(4)
            .zip(reference.pixels.chunks_exact(4))
        {
            for c in 0..3 {
                let d = f64::from(a[c]) - f64::from(b[c]);
                sum_sq += d * d;
                samples += 1;
            }
        }
        if samples == 0 {
            return 0.0;
        }
        let rms = (sum_sq / samples as f64).sqrt();
        if rms <= 0.0 {
            return 8.0;
        }
        (255.0 / rms).log2().clamp(0.0, 8.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_score_eight_bits() {
        let a = Image::solid(4, 4, [10, 20, 30, 255]);
        let b = a.clone();
        assert_eq!(a.compare(&b), 8.0);
    }

    #[test]
    fn dimension_mismatch_scores_zero() {
        let a = Image::solid(4, 4, [0; 4]);
        let b = Image::solid(2, 2, [0; 4]);
        assert_eq!(a.compare(&b), 0.0);
    }

    #[test]
    fn alpha_is_ignored() {
        let a = Image::solid(2, 2, [1, 2, 3, 0]);
        let b = Image::solid(2, 2, [1, 2, 3, 255]);
        assert_eq!(a.compare(&b), 8.0);
    }

    #[test]
    fn large_error_scores_low() {
        let a = Image::solid(2, 2, [0, 0, 0, 255]);
        let b = Image::solid(2, 2, [255, 255, 255, 255]);
        assert_eq!(a.compare(&b), 0.0);
    }

    #[test]
    fn pnm_header_and_payload() {
        let img = Image::solid(2, 1, [9, 8, 7, 255]);
        let mut out = Vec::new();
        img.write_pnm(&mut out, "42").unwrap();
        let expect_header = b"P6\n#42\n2 1\n255\n";
        assert_eq!(&out[..expect_header.len()], expect_header);
        assert_eq!(&out[expect_header.len()..], &[9, 8, 7, 9, 8, 7]);
    }

    #[test]
    fn png_roundtrip_preserves_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        let img = Image::solid(3, 2, [1, 2, 3, 255]);
        img.write_png(&path).unwrap();
        let back = Image::read_png(&path).unwrap();
        assert_eq!(back, img);
        assert_eq!(back.compare(&img), 8.0);
    }

    #[test]
    fn read_png_missing_file_is_none() {
        assert!(Image::read_png(Path::new("/nonexistent/ref.png")).is_none());
    }
}
