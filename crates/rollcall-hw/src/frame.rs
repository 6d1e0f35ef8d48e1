//! Frame type and pixel conversions: YUYV/GREY to RGB, downscaling, channel swaps.

use image::imageops::{self, FilterType};
use image::RgbImage;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("scale factor must be in (0, 1], got {0}")]
    InvalidScale(f32),
    #[error("frame has zero area")]
    Empty,
}

/// Byte order of the three colour channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// A captured colour frame, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub sequence: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, order: ChannelOrder) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            order,
            sequence: 0,
            timestamp: Instant::now(),
        })
    }

    /// Shrink by `factor` (e.g. 0.25 for a quarter of each side) with a
    /// triangle filter. A factor of 1.0 returns a copy.
    pub fn downscale(&self, factor: f32) -> Result<Frame, FrameError> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(FrameError::InvalidScale(factor));
        }
        if factor == 1.0 {
            return Ok(self.clone());
        }

        let img = RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: self.width as usize * self.height as usize * 3,
                actual: self.data.len(),
            },
        )?;
        let new_w = ((self.width as f32 * factor).round() as u32).max(1);
        let new_h = ((self.height as f32 * factor).round() as u32).max(1);
        let small = imageops::resize(&img, new_w, new_h, FilterType::Triangle);

        Ok(Frame {
            data: small.into_raw(),
            width: new_w,
            height: new_h,
            order: self.order,
            sequence: self.sequence,
            timestamp: self.timestamp,
        })
    }

    /// Same frame with channels in RGB order.
    pub fn into_rgb(mut self) -> Frame {
        if self.order == ChannelOrder::Bgr {
            swap_red_blue(&mut self.data);
            self.order = ChannelOrder::Rgb;
        }
        self
    }

    /// Pack into `0RGB` words for a window surface.
    pub fn to_0rgb(&self) -> Vec<u32> {
        let (r, b) = match self.order {
            ChannelOrder::Rgb => (0, 2),
            ChannelOrder::Bgr => (2, 0),
        };
        self.data
            .chunks_exact(3)
            .map(|p| (p[r] as u32) << 16 | (p[1] as u32) << 8 | p[b] as u32)
            .collect()
    }
}

/// Swap the first and third byte of every pixel in place.
pub fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            rgb.push(clamp_u8(y + 1.402 * v));
            rgb.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

/// Expand 8-bit grayscale to RGB.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: grey.len(),
        });
    }
    Ok(grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 3], order: ChannelOrder) -> Frame {
        let data = (0..width * height).flat_map(|_| px).collect();
        Frame::new(data, width, height, order).unwrap()
    }

    #[test]
    fn test_frame_new_validates_length() {
        assert!(matches!(
            Frame::new(vec![0; 5], 2, 1, ChannelOrder::Rgb),
            Err(FrameError::InvalidLength { expected: 6, actual: 5 })
        ));
        assert!(matches!(
            Frame::new(vec![], 0, 1, ChannelOrder::Rgb),
            Err(FrameError::Empty)
        ));
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        let rgb = yuyv_to_rgb(&[128, 128, 128, 255], 2, 1).unwrap();
        assert_eq!(rgb[0], 255);
        assert!(rgb[1] < 128);
        assert_eq!(rgb[2], 128);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb() {
        assert_eq!(grey_to_rgb(&[7, 9], 2, 1).unwrap(), vec![7, 7, 7, 9, 9, 9]);
        assert!(grey_to_rgb(&[7], 2, 1).is_err());
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = solid(640, 480, [10, 20, 30], ChannelOrder::Rgb);
        let small = frame.downscale(0.25).unwrap();
        assert_eq!((small.width, small.height), (160, 120));
        assert_eq!(small.data.len(), 160 * 120 * 3);
        assert_eq!(&small.data[..3], &[10, 20, 30]);
        assert_eq!(small.order, ChannelOrder::Rgb);
    }

    #[test]
    fn test_downscale_never_empty() {
        let frame = solid(2, 2, [1, 2, 3], ChannelOrder::Rgb);
        let small = frame.downscale(0.1).unwrap();
        assert_eq!((small.width, small.height), (1, 1));
    }

    #[test]
    fn test_downscale_rejects_bad_factor() {
        let frame = solid(4, 4, [0, 0, 0], ChannelOrder::Rgb);
        assert!(matches!(frame.downscale(0.0), Err(FrameError::InvalidScale(_))));
        assert!(matches!(frame.downscale(1.5), Err(FrameError::InvalidScale(_))));
        assert!(matches!(frame.downscale(f32::NAN), Err(FrameError::InvalidScale(_))));
    }

    #[test]
    fn test_into_rgb_swaps_bgr() {
        let frame = solid(1, 1, [1, 2, 3], ChannelOrder::Bgr).into_rgb();
        assert_eq!(frame.data, vec![3, 2, 1]);
        assert_eq!(frame.order, ChannelOrder::Rgb);

        let frame = solid(1, 1, [1, 2, 3], ChannelOrder::Rgb).into_rgb();
        assert_eq!(frame.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_to_0rgb() {
        let rgb = solid(1, 1, [0x11, 0x22, 0x33], ChannelOrder::Rgb);
        assert_eq!(rgb.to_0rgb(), vec![0x0011_2233]);
        let bgr = solid(1, 1, [0x33, 0x22, 0x11], ChannelOrder::Bgr);
        assert_eq!(bgr.to_0rgb(), vec![0x0011_2233]);
    }
}
