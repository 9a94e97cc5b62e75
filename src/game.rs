// The session: calibrate once, then tick until someone quits.
// Each tick: newest camera frame -> marker -> strokes/buttons -> display -> keyboard.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::calibrate::ScreenCalibrator;
use crate::camera::{CameraSource, FrameSource};
use crate::config::Config;
use crate::display::{Display, Surface};
use crate::error::Error;
use crate::graffiti::{DrawController, DrawSettings, GraffitiState, default_buttons};
use crate::types::{Frame, Rectangle};
use crate::vision::{MarkerDetector, Stretch};

/// Shortest keyboard wait per tick, even when processing ate the whole budget.
const MIN_POLL: Duration = Duration::from_millis(1);
const FPS_WINDOW: Duration = Duration::from_secs(5);

/// Single-key commands. Letters are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Clear,
    /// Lowercase color code (`w`, `b`, `g` or `y`).
    Color(char),
    Thinner,
    Thicker,
    Quit,
}

impl Command {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'c' => Some(Command::Clear),
            code @ ('w' | 'b' | 'g' | 'y') => Some(Command::Color(code)),
            '[' => Some(Command::Thinner),
            ']' => Some(Command::Thicker),
            's' | 'q' => Some(Command::Quit),
            _ => None,
        }
    }

    pub fn apply(self, controller: &mut DrawController) {
        match self {
            Command::Clear => controller.clear(),
            Command::Color(code) => controller.set_color(code),
            Command::Thinner => controller.dec_radius(),
            Command::Thicker => controller.inc_radius(),
            Command::Quit => controller.set_quit(),
        }
    }
}

/// Averages ticks per second over a fixed window and logs it at debug level.
#[derive(Debug)]
pub struct FpsMonitor {
    window: Duration,
    since: Instant,
    ticks: u32,
}

impl FpsMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            since: Instant::now(),
            ticks: 0,
        }
    }

    /// Count one tick. Returns the average once per window.
    pub fn tick(&mut self) -> Option<f32> {
        self.ticks += 1;
        let elapsed = self.since.elapsed();
        if elapsed < self.window {
            return None;
        }
        let fps = self.ticks as f32 / elapsed.as_secs_f32().max(f32::EPSILON);
        debug!("FPS: {fps:.1}");
        self.ticks = 0;
        self.since = Instant::now();
        Some(fps)
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Target length of one tick.
    pub tick: Duration,
    /// Distinct recent frames searched for the marker per tick.
    pub detection_frames: usize,
    /// Only frames carrying this crop tag are used.
    pub crop: Option<Rectangle>,
}

/// Tick until the surface closes or the quit flag is set.
pub fn run_loop<S: Surface + ?Sized>(
    source: &FrameSource,
    detector: &MarkerDetector,
    state: &mut GraffitiState,
    surface: &mut S,
    settings: &LoopSettings,
) -> Result<(), Error> {
    let keep = settings.detection_frames.max(1);
    // Newest first.
    let mut recent: VecDeque<Frame> = VecDeque::with_capacity(keep + 1);
    let mut fps = FpsMonitor::new(FPS_WINDOW);

    while surface.is_open() && !state.should_quit() {
        let started = Instant::now();

        if let Some(frame) = source.read() {
            let fresh = recent.front().is_none_or(|f| f.timestamp != frame.timestamp);
            if fresh && frame.crop == settings.crop {
                recent.push_front(frame);
                recent.truncate(keep);
            }
        }

        let last = state.controller().last_dot();
        let marker = detector.detect_first(recent.make_contiguous(), last, state.stretch());
        state.tick(marker);
        surface.show(&state.render(marker))?;
        fps.tick();

        let remaining = settings.tick.saturating_sub(started.elapsed()).max(MIN_POLL);
        if let Some(cmd) = surface.poll_command(remaining) {
            debug!("command {cmd:?}");
            cmd.apply(state.controller_mut());
        }
    }

    info!("session over");
    Ok(())
}

/// Calibrate, then play on `surface` with an already started source.
/// Returns the final state, or `None` when calibration gave up.
pub fn play<S: Surface + ?Sized>(
    source: &FrameSource,
    surface: &mut S,
    cfg: &Config,
) -> Result<Option<GraffitiState>, Error> {
    let calibrator = ScreenCalibrator::new(&cfg.calibration);
    let pattern_size = (cfg.display.width, cfg.display.height);
    let Some(bounds) = calibrator.calibrate(source, surface, pattern_size)? else {
        warn!("screen not found after {} attempts", cfg.calibration.attempts);
        return Ok(None);
    };

    source.update_crop_rect(bounds);
    let stretch = Stretch::between(&bounds, cfg.game.canvas_width, cfg.game.canvas_height);
    debug!("camera to canvas stretch {stretch:?}");

    let controller = DrawController::new(DrawSettings::from(&cfg.game));
    let buttons = default_buttons(cfg.game.canvas_height, cfg.game.icon_dir.as_deref());
    let mut state = GraffitiState::new(controller, buttons, stretch);

    let detector = MarkerDetector::new(cfg.marker.filter());
    let settings = LoopSettings {
        tick: Duration::from_millis(cfg.game.tick_ms),
        detection_frames: cfg.marker.detection_frames,
        crop: Some(bounds),
    };
    run_loop(source, &detector, &mut state, surface, &settings)?;
    Ok(Some(state))
}

/// Open the camera and the window, play, and always release the camera.
pub fn run_session(cfg: &Config) -> Result<(), Error> {
    let camera = CameraSource::select(cfg.camera.device, cfg.camera.url.as_deref());
    let mut source = FrameSource::open(camera, &cfg.camera)?;

    let result = source.start().map_err(Error::from).and_then(|()| {
        let mut display = Display::new(&cfg.display)?;
        play(&source, &mut display, cfg)
    });
    source.stop();

    match result? {
        Some(_) => Ok(()),
        None => {
            info!("no calibration, exiting");
            Ok(())
        }
    }
}
