//! Preview surface: a `minifb` window, or nothing at all when headless.

use crate::frame::Frame;
use minifb::{Key, KeyRepeat, Window as MiniWindow, WindowOptions};
use std::time::Duration;
use thiserror::Error;

const RECOGNIZED_COLOR: u32 = 0x0000_ff00;
const UNKNOWN_COLOR: u32 = 0x00ff_0000;
const OUTLINE_THICKNESS: i64 = 2;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open window: {0}")]
    Open(String),
    #[error("failed to update window: {0}")]
    Update(String),
}

/// A face outline to draw over the preview, in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub recognized: bool,
}

/// Where frames are shown and keys are read from.
pub trait Surface {
    fn show(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<(), DisplayError>;

    /// Wait up to `timeout` for a key press.
    fn poll_key(&mut self, timeout: Duration) -> Option<char>;

    /// False once the user has closed the surface.
    fn is_open(&self) -> bool;

    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Desktop preview window.
pub struct Window {
    inner: MiniWindow,
    title: String,
    shown_since_poll: bool,
}

impl Window {
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self, DisplayError> {
        let inner = MiniWindow::new(title, width as usize, height as usize, WindowOptions::default())
            .map_err(|e| DisplayError::Open(e.to_string()))?;
        tracing::info!(title, width, height, "preview window opened");
        Ok(Self {
            inner,
            title: title.to_string(),
            shown_since_poll: false,
        })
    }
}

impl Surface for Window {
    fn show(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<(), DisplayError> {
        let mut buffer = frame.to_0rgb();
        for overlay in overlays {
            draw_outline(&mut buffer, frame.width, frame.height, overlay);
        }
        self.inner
            .update_with_buffer(&buffer, frame.width as usize, frame.height as usize)
            .map_err(|e| DisplayError::Update(e.to_string()))?;
        self.shown_since_poll = true;
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<char> {
        if !timeout.is_zero() {
            std::thread::sleep(timeout);
        }
        // `update_with_buffer` already pumped events for this frame. A second
        // pump ages a fresh press past the point `get_keys_pressed` reports it.
        if !std::mem::take(&mut self.shown_since_poll) {
            self.inner.update();
        }
        first_key(
            self.inner.get_keys_pressed(KeyRepeat::No),
            self.inner.get_keys(),
        )
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(self) {
        tracing::info!(title = %self.title, "preview window closed");
    }
}

/// No window; never reports a key.
#[derive(Debug, Default)]
pub struct Headless;

impl Surface for Headless {
    fn show(&mut self, _: &Frame, _: &[Overlay]) -> Result<(), DisplayError> {
        Ok(())
    }

    fn poll_key(&mut self, _: Duration) -> Option<char> {
        None
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Draw a rectangle outline into a `0RGB` buffer, clipped to the frame.
fn draw_outline(buffer: &mut [u32], width: u32, height: u32, overlay: &Overlay) {
    let color = if overlay.recognized {
        RECOGNIZED_COLOR
    } else {
        UNKNOWN_COLOR
    };
    let (w, h) = (width as i64, height as i64);
    let x0 = overlay.x.round() as i64;
    let y0 = overlay.y.round() as i64;
    let x1 = (overlay.x + overlay.width).round() as i64;
    let y1 = (overlay.y + overlay.height).round() as i64;

    // Edges are walked only across the visible part of the frame.
    let xs = x0.max(0)..=x1.min(w - 1);
    let ys = y0.max(0)..=y1.min(h - 1);

    let mut plot = |x: i64, y: i64| {
        if x >= 0 && x < w && y >= 0 && y < h {
            if let Some(px) = buffer.get_mut((y * w + x) as usize) {
                *px = color;
            }
        }
    };

    for t in 0..OUTLINE_THICKNESS {
        for x in xs.clone() {
            plot(x, y0.saturating_add(t));
            plot(x, y1.saturating_sub(t));
        }
        for y in ys.clone() {
            plot(x0.saturating_add(t), y);
            plot(x1.saturating_sub(t), y);
        }
    }
}

/// First key pressed since the last pump, else any key still held down.
fn first_key(pressed: Vec<Key>, held: Vec<Key>) -> Option<char> {
    pressed.into_iter().chain(held).find_map(key_to_char)
}

fn key_to_char(key: Key) -> Option<char> {
    let c = match key {
        Key::A => 'a',
        Key::B => 'b',
        Key::C => 'c',
        Key::D => 'd',
        Key::E => 'e',
        Key::F => 'f',
        Key::G => 'g',
        Key::H => 'h',
        Key::I => 'i',
        Key::J => 'j',
        Key::K => 'k',
        Key::L => 'l',
        Key::M => 'm',
        Key::N => 'n',
        Key::O => 'o',
        Key::P => 'p',
        Key::Q => 'q',
        Key::R => 'r',
        Key::S => 's',
        Key::T => 't',
        Key::U => 'u',
        Key::V => 'v',
        Key::W => 'w',
        Key::X => 'x',
        Key::Y => 'y',
        Key::Z => 'z',
        Key::Key0 => '0',
        Key::Key1 => '1',
        Key::Key2 => '2',
        Key::Key3 => '3',
        Key::Key4 => '4',
        Key::Key5 => '5',
        Key::Key6 => '6',
        Key::Key7 => '7',
        Key::Key8 => '8',
        Key::Key9 => '9',
        Key::Space => ' ',
        Key::Escape => '\u{1b}',
        _ => return None,
    };
    Some(c)
}
