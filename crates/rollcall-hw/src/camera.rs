//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, ChannelOrder, Frame, FrameError};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture: {0}")]
    StreamingNotSupported(String),
    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// Motion JPEG, one JPEG per buffer.
    Mjpg,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

/// Path of the `/dev/videoN` node for a device index.
pub fn device_path(index: usize) -> String {
    format!("/dev/video{index}")
}

/// An open V4L2 camera with a running capture stream.
pub struct Camera {
    // Declared before `device` so the stream stops before the fd closes.
    stream: MmapStream<'static>,
    #[allow(dead_code)]
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub pixel_format: PixelFormat,
}

impl Camera {
    /// Open the camera at `/dev/video{index}`.
    pub fn open_index(index: usize) -> Result<Self, CameraError> {
        Self::open(&device_path(index))
    }

    /// Open a V4L2 camera by path (e.g. "/dev/video0") and start streaming.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("busy") || msg.contains("EBUSY") {
                CameraError::DeviceBusy(device_path.to_string())
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported(device_path.to_string()));
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, MJPG, or GREY)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            format = ?pixel_format,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            stream,
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Dequeue the next frame and convert it to RGB.
    pub fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };
        let sequence = meta.sequence;

        let rgb = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(data, self.width, self.height)?,
            PixelFormat::Grey => frame::grey_to_rgb(data, self.width, self.height)?,
            PixelFormat::Mjpg => decode_mjpg(data, self.width, self.height)?,
        };

        let mut frame = Frame::new(rgb, self.width, self.height, ChannelOrder::Rgb)?;
        frame.sequence = sequence;
        frame.timestamp = Instant::now();
        Ok(frame)
    }

    /// Stop streaming and close the device.
    pub fn release(self) {
        tracing::info!(device = %self.device_path, "camera released");
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .filter_map(|i| {
                let path = device_path(i);
                if !Path::new(&path).exists() {
                    return None;
                }
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

fn decode_mjpg(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}")))?
        .to_rgb8();
    if img.width() != width || img.height() != height {
        return Err(CameraError::CaptureFailed(format!(
            "MJPG frame is {}x{}, expected {width}x{height}",
            img.width(),
            img.height()
        )));
    }
    Ok(img.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(0), "/dev/video0");
        assert_eq!(device_path(12), "/dev/video12");
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/dev/rollcall-no-such-camera"),
            Err(CameraError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_decode_mjpg_checks_size() {
        let img = image::RgbImage::from_pixel(4, 2, image::Rgb([200, 10, 10]));
        let mut jpeg = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let rgb = decode_mjpg(&jpeg, 4, 2).unwrap();
        assert_eq!(rgb.len(), 4 * 2 * 3);
        assert!(matches!(
            decode_mjpg(&jpeg, 8, 8),
            Err(CameraError::CaptureFailed(_))
        ));
        assert!(decode_mjpg(b"garbage", 4, 2).is_err());
    }
}
