//! rollcall-hw: Camera capture and preview window.
//!
//! Provides V4L2-based capture producing RGB frames, the frame conversions
//! the recogniser needs, and a `minifb` preview surface.

pub mod camera;
pub mod display;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use display::{DisplayError, Headless, Overlay, Surface, Window};
pub use frame::{ChannelOrder, Frame, FrameError};

/// A source of frames, read one at a time.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    fn release(self)
    where
        Self: Sized,
    {
    }
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        Camera::read_frame(self)
    }

    fn release(self) {
        Camera::release(self)
    }
}
