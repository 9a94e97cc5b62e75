// Full-screen output window + keyboard.
// Visual: a borderless window stretched over the projector showing the canvas;
// key presses become game commands.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use minifb::{Key, KeyRepeat, ScaleMode, Window, WindowOptions};

use crate::config::DisplayConfig;
use crate::draw::mirror_horizontal;
use crate::error::Error;
use crate::game::Command;
use crate::types::FrameBuffer;

/// Somewhere frames can be shown and commands read from.
/// Only `show` is required; the rest default to a plain sleep with no input.
pub trait Surface {
    /// Present one frame. The surface scales it to its own size.
    fn show(&mut self, frame: &FrameBuffer) -> Result<(), Error>;

    /// Keep the surface alive for `wait` without reading input.
    fn settle(&mut self, wait: Duration) {
        thread::sleep(wait);
    }

    /// Wait up to `timeout` for a command.
    fn poll_command(&mut self, timeout: Duration) -> Option<Command> {
        thread::sleep(timeout);
        None
    }

    fn is_open(&self) -> bool {
        true
    }
}

const PUMP_INTERVAL: Duration = Duration::from_millis(4);

pub struct Display {
    window: Window, // the on-screen window you see
    mirror: bool,
    scratch: FrameBuffer, // mirrored copy, reused every frame
}

impl Display {
    /// Open the full-screen window.
    /// Visual: a borderless window covering the configured resolution appears on top.
    pub fn new(cfg: &DisplayConfig) -> Result<Self, Error> {
        let options = WindowOptions {
            borderless: true,
            resize: true,
            scale_mode: ScaleMode::Stretch,
            topmost: true,
            ..WindowOptions::default()
        };
        let window = Window::new(&cfg.title, cfg.width, cfg.height, options)
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        debug!("display {}x{} (mirror: {})", cfg.width, cfg.height, cfg.mirror);
        Ok(Self {
            window,
            mirror: cfg.mirror,
            scratch: FrameBuffer::new(0, 0),
        })
    }

    fn pressed_command(&self) -> Option<Command> {
        self.window
            .get_keys_pressed(KeyRepeat::No)
            .into_iter()
            .find_map(key_command)
    }
}

impl Surface for Display {
    /// Visual: the window immediately displays the new frame.
    fn show(&mut self, frame: &FrameBuffer) -> Result<(), Error> {
        let pixels = if self.mirror {
            self.scratch.clone_from(frame);
            mirror_horizontal(&mut self.scratch);
            &self.scratch
        } else {
            frame
        };
        self.window
            .update_with_buffer(&pixels.pixels, pixels.width, pixels.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))
    }

    fn settle(&mut self, wait: Duration) {
        let deadline = Instant::now() + wait;
        while Instant::now() < deadline && self.window.is_open() {
            self.window.update();
            thread::sleep(PUMP_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    fn poll_command(&mut self, timeout: Duration) -> Option<Command> {
        let deadline = Instant::now() + timeout;
        loop {
            self.window.update();
            if let Some(cmd) = self.pressed_command() {
                return Some(cmd);
            }
            let now = Instant::now();
            if now >= deadline || !self.window.is_open() {
                return None;
            }
            thread::sleep(PUMP_INTERVAL.min(deadline - now));
        }
    }

    /// Returns false when the user closes the window.
    fn is_open(&self) -> bool {
        self.window.is_open()
    }
}

/// Keyboard layout: letters and brackets map through `Command::from_char`; Escape quits.
fn key_command(key: Key) -> Option<Command> {
    let c = match key {
        Key::Escape => return Some(Command::Quit),
        Key::C => 'c',
        Key::W => 'w',
        Key::B => 'b',
        Key::G => 'g',
        Key::Y => 'y',
        Key::S => 's',
        Key::Q => 'q',
        Key::LeftBracket => '[',
        Key::RightBracket => ']',
        _ => return None,
    };
    Command::from_char(c)
}
