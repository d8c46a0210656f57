//! Decoded video frames and the pixel-level helpers detection needs.
//!
//! Frames arrive from the media pipeline already decoded; this module only
//! converts between the two layouts backends consume (packed RGB and
//! single-channel grayscale) and downscales for constrained devices.

use crate::error::{DetectError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// A single decoded frame. `ts` is the capture time in unix seconds and
/// travels with the pixels so motion cooldowns and recording decisions work
/// off frame time, not wall-clock-at-processing time.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub ts: i64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, ts: i64) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(DetectError::DetectionFailed(format!(
                "frame size mismatch: {}x{} {:?} wants {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            ts,
        })
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// ITU-R BT.601 luminance conversion. Gray frames pass through cloned.
    pub fn to_grayscale(&self) -> Frame {
        match self.format {
            PixelFormat::Gray8 => self.clone(),
            PixelFormat::Rgb24 => {
                let pixels = self.width as usize * self.height as usize;
                let mut gray = Vec::with_capacity(pixels);
                for px in self.data.chunks_exact(3) {
                    let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                    gray.push(y as u8);
                }
                Frame {
                    data: gray,
                    width: self.width,
                    height: self.height,
                    format: PixelFormat::Gray8,
                    ts: self.ts,
                }
            }
        }
    }

    /// Bilinear downscale by an integer factor, used before inference on
    /// constrained devices. Factor 1 or degenerate output returns a clone.
    pub fn downscale(&self, factor: u32) -> Frame {
        let out_w = self.width / factor.max(1);
        let out_h = self.height / factor.max(1);
        if factor <= 1 || out_w == 0 || out_h == 0 {
            return self.clone();
        }
        let ch = self.channels();
        let x_ratio = (self.width - 1) as f32 / out_w.max(1) as f32;
        let y_ratio = (self.height - 1) as f32 / out_h.max(1) as f32;
        let src_w = self.width as usize;
        let mut data = vec![0u8; out_w as usize * out_h as usize * ch];
        for oy in 0..out_h as usize {
            let sy = oy as f32 * y_ratio;
            let y0 = sy as usize;
            let y1 = (y0 + 1).min(self.height as usize - 1);
            let dy = sy - y0 as f32;
            for ox in 0..out_w as usize {
                let sx = ox as f32 * x_ratio;
                let x0 = sx as usize;
                let x1 = (x0 + 1).min(src_w - 1);
                let dx = sx - x0 as f32;
                for c in 0..ch {
                    let p00 = self.data[(y0 * src_w + x0) * ch + c] as f32;
                    let p01 = self.data[(y0 * src_w + x1) * ch + c] as f32;
                    let p10 = self.data[(y1 * src_w + x0) * ch + c] as f32;
                    let p11 = self.data[(y1 * src_w + x1) * ch + c] as f32;
                    let top = p00 * (1.0 - dx) + p01 * dx;
                    let bot = p10 * (1.0 - dx) + p11 * dx;
                    data[(oy * out_w as usize + ox) * ch + c] = (top * (1.0 - dy) + bot * dy) as u8;
                }
            }
        }
        Frame {
            data,
            width: out_w,
            height: out_h,
            format: self.format,
            ts: self.ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_byte_count() {
        assert!(Frame::new(vec![0; 5], 2, 2, PixelFormat::Gray8, 0).is_err());
        assert!(Frame::new(vec![0; 12], 2, 2, PixelFormat::Rgb24, 0).is_ok());
    }

    #[test]
    fn grayscale_weights_match_luminance() {
        // Pure green pixel: 0.587 * 255 ~= 149.
        let f = Frame::new(vec![0, 255, 0], 1, 1, PixelFormat::Rgb24, 0).unwrap();
        let g = f.to_grayscale();
        assert_eq!(g.format, PixelFormat::Gray8);
        assert!((g.data[0] as i32 - 149).abs() <= 1);
    }

    #[test]
    fn downscale_halves_dimensions() {
        let f = Frame::new(vec![128; 8 * 8], 8, 8, PixelFormat::Gray8, 0).unwrap();
        let d = f.downscale(2);
        assert_eq!((d.width, d.height), (4, 4));
        assert_eq!(d.data.len(), 16);
        assert!(d.data.iter().all(|&p| p == 128));
    }

    #[test]
    fn downscale_by_one_is_identity() {
        let f = Frame::new(vec![7; 4], 2, 2, PixelFormat::Gray8, 9).unwrap();
        let d = f.downscale(1);
        assert_eq!(d.data, f.data);
        assert_eq!(d.ts, 9);
    }
}
