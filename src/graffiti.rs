// Game state: turns per-tick marker sightings into strokes on a persistent canvas.
// Visual: move the dot and a line follows it; hide the dot for a moment and the
// line resumes; hide it longer and the next sighting starts a new line.

use std::path::Path;

use log::{debug, info};

use crate::button::{Button, Callback};
use crate::config::GameConfig;
use crate::draw::{draw_crosshair, draw_stroke};
use crate::gamma::GammaLut;
use crate::types::{self, BLUE, FrameBuffer, GREEN, Point, Rectangle, WHITE, YELLOW};
use crate::vision::Stretch;

const CROSSHAIR_SIZE: i32 = 12;
const CROSSHAIR_COLOR: u32 = 0x00_FF_CC_33;

#[derive(Debug, Clone, Copy)]
pub struct DrawSettings {
    /// Squared length of the longest jump still joined into one stroke.
    pub max_gap_sq: i64,
    /// Misses tolerated before the stroke is broken.
    pub grace_ticks: u32,
    pub default_color: u32,
    pub default_radius: i32,
    pub canvas_width: usize,
    pub canvas_height: usize,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self::from(&GameConfig::default())
    }
}

impl From<&GameConfig> for DrawSettings {
    fn from(cfg: &GameConfig) -> Self {
        let gap = cfg.max_gap as i64;
        Self {
            max_gap_sq: gap * gap,
            grace_ticks: cfg.grace_ticks,
            default_color: GREEN,
            default_radius: cfg.radius.max(1),
            canvas_width: cfg.canvas_width,
            canvas_height: cfg.canvas_height,
        }
    }
}

/// The drawing state machine plus the commands buttons and keys invoke.
pub struct DrawController {
    settings: DrawSettings,
    canvas: FrameBuffer,
    color: u32,
    radius: i32,
    last_dot: Option<Point>,
    misses: u32,
    quit: bool,
    lut: GammaLut,
}

impl DrawController {
    pub fn new(settings: DrawSettings) -> Self {
        Self {
            canvas: FrameBuffer::new(settings.canvas_width, settings.canvas_height),
            color: settings.default_color,
            radius: settings.default_radius,
            last_dot: None,
            misses: 0,
            quit: false,
            lut: GammaLut::new(),
            settings,
        }
    }

    /// Feed one tick's observation. Returns true if a segment was drawn.
    pub fn observe(&mut self, marker: Option<Point>) -> bool {
        match marker {
            Some(p) => self.on_marker(p),
            None => {
                self.on_miss();
                false
            }
        }
    }

    fn on_marker(&mut self, p: Point) -> bool {
        let mut drew = false;
        if let Some(last) = self.last_dot {
            if last.dist_sq(p) < self.settings.max_gap_sq {
                draw_stroke(&mut self.canvas, last, p, self.radius, self.color, &self.lut);
                drew = true;
            } else {
                debug!("gap {last:?} -> {p:?} too long, starting a new stroke");
            }
        }
        self.last_dot = Some(p);
        self.misses = 0;
        drew
    }

    fn on_miss(&mut self) {
        self.misses += 1;
        if self.misses > self.settings.grace_ticks {
            if self.last_dot.is_some() {
                debug!("marker lost for {} ticks, stroke broken", self.misses);
            }
            self.misses = 0;
            self.last_dot = None;
        }
    }

    /// Break the current stroke without touching the canvas.
    pub fn lift(&mut self) {
        self.last_dot = None;
        self.misses = 0;
    }

    /// Wipe the canvas and return brush state to defaults.
    pub fn clear(&mut self) {
        self.canvas.fill(types::BLACK);
        self.lift();
        self.color = self.settings.default_color;
        self.radius = self.settings.default_radius;
        info!("canvas cleared");
    }

    pub fn inc_radius(&mut self) {
        self.radius += 1;
    }

    /// Radius never drops below 1.
    pub fn dec_radius(&mut self) {
        self.radius = (self.radius - 1).max(1);
    }

    /// Unknown color codes are ignored.
    pub fn set_color(&mut self, code: char) {
        if let Some(color) = types::stroke_color(code) {
            self.color = color;
        }
    }

    pub fn set_quit(&mut self) {
        self.quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn canvas(&self) -> &FrameBuffer {
        &self.canvas
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn last_dot(&self) -> Option<Point> {
        self.last_dot
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }
}

/// Everything one session mutates: the controller, its buttons, and the camera-to-canvas scale.
pub struct GraffitiState {
    controller: DrawController,
    buttons: Vec<Button>,
    stretch: Stretch,
    // Button the marker sat on last tick; clicks fire on entry only.
    pressed: Option<usize>,
}

impl GraffitiState {
    pub fn new(controller: DrawController, buttons: Vec<Button>, stretch: Stretch) -> Self {
        Self {
            controller,
            buttons,
            stretch,
            pressed: None,
        }
    }

    /// One tick: a marker on a button clicks it (once per visit) and lifts the
    /// brush; anywhere else it drives the stroke.
    pub fn tick(&mut self, marker: Option<Point>) {
        let hit = marker.and_then(|p| self.buttons.iter().position(|b| b.is_pressed(Some(p))));
        match hit {
            Some(i) => {
                if self.pressed != Some(i) {
                    self.buttons[i].try_click(marker, &mut self.controller);
                    debug!("button {i} clicked");
                }
                self.pressed = Some(i);
                self.controller.lift();
            }
            None => {
                self.pressed = None;
                self.controller.observe(marker);
            }
        }
    }

    /// Canvas with buttons and the marker crosshair on top; the canvas itself is untouched.
    pub fn render(&self, marker: Option<Point>) -> FrameBuffer {
        let mut out = self.controller.canvas().clone();
        for b in &self.buttons {
            b.draw(&mut out, marker);
        }
        if let Some(p) = marker {
            draw_crosshair(&mut out, p, CROSSHAIR_SIZE, CROSSHAIR_COLOR);
        }
        out
    }

    pub fn controller(&self) -> &DrawController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut DrawController {
        &mut self.controller
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn stretch(&self) -> Stretch {
        self.stretch
    }

    pub fn should_quit(&self) -> bool {
        self.controller.should_quit()
    }
}

const BUTTON_SIZE: i32 = 64;
const BUTTON_MARGIN: i32 = 8;

/// The standard panel: a column of buttons down the canvas's left edge.
/// Buttons that would run off the bottom of the canvas are left out.
pub fn default_buttons(canvas_height: usize, icon_dir: Option<&Path>) -> Vec<Button> {
    let layout: [(&str, u32, Callback); 8] = [
        ("clear", 0x00_40_40_40, Box::new(|c: &mut DrawController| c.clear())),
        ("white", WHITE, Box::new(|c: &mut DrawController| c.set_color('w'))),
        ("blue", BLUE, Box::new(|c: &mut DrawController| c.set_color('b'))),
        ("green", GREEN, Box::new(|c: &mut DrawController| c.set_color('g'))),
        ("yellow", YELLOW, Box::new(|c: &mut DrawController| c.set_color('y'))),
        ("thinner", 0x00_30_30_80, Box::new(|c: &mut DrawController| c.dec_radius())),
        ("thicker", 0x00_30_80_30, Box::new(|c: &mut DrawController| c.inc_radius())),
        ("quit", 0x00_C0_00_00, Box::new(|c: &mut DrawController| c.set_quit())),
    ];

    let mut buttons = Vec::with_capacity(layout.len());
    for (i, (name, swatch, callback)) in layout.into_iter().enumerate() {
        let bottom = BUTTON_MARGIN + i as i32 * (BUTTON_SIZE + BUTTON_MARGIN);
        let top = bottom + BUTTON_SIZE;
        if top > canvas_height as i32 {
            debug!("no room for button '{name}'");
            continue;
        }
        let Ok(position) = Rectangle::new(
            Point::new(BUTTON_MARGIN, bottom),
            Point::new(BUTTON_MARGIN + BUTTON_SIZE, top),
        ) else {
            continue;
        };

        let button = match icon_dir {
            Some(dir) => Button::from_icon(position, &dir.join(format!("{name}.png")), swatch, callback),
            None => Button::swatch(position, swatch, callback),
        };
        buttons.push(button);
    }
    buttons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BLACK;

    fn settings() -> DrawSettings {
        DrawSettings {
            max_gap_sq: 2500,
            grace_ticks: 3,
            default_color: GREEN,
            default_radius: 5,
            canvas_width: 200,
            canvas_height: 200,
        }
    }

    #[test]
    fn test_settings_from_config() {
        let s = DrawSettings::from(&GameConfig::default());
        assert_eq!(s.max_gap_sq, 2500);
        assert_eq!(s.grace_ticks, 3);
        assert_eq!(s.default_radius, 5);
    }

    #[test]
    fn test_first_sighting_draws_nothing() {
        let mut c = DrawController::new(settings());
        assert!(!c.observe(Some(Point::new(50, 50))));
        assert!(c.canvas().is_blank());
        assert_eq!(c.last_dot(), Some(Point::new(50, 50)));
    }

    #[test]
    fn test_short_gap_is_joined() {
        let mut c = DrawController::new(settings());
        c.observe(Some(Point::new(50, 50)));
        assert!(c.observe(Some(Point::new(90, 50)))); // 40 apart
        assert_eq!(c.canvas().get(70, 50), Some(GREEN));
        assert_eq!(c.last_dot(), Some(Point::new(90, 50)));
    }

    #[test]
    fn test_long_gap_is_not_joined() {
        let mut c = DrawController::new(settings());
        c.observe(Some(Point::new(50, 50)));
        assert!(!c.observe(Some(Point::new(110, 50)))); // 60 apart
        assert!(c.canvas().is_blank());
        assert_eq!(c.last_dot(), Some(Point::new(110, 50)));
    }

    #[test]
    fn test_grace_period() {
        let mut c = DrawController::new(settings());
        c.observe(Some(Point::new(50, 50)));
        for _ in 0..3 {
            c.observe(None);
        }
        assert_eq!(c.last_dot(), Some(Point::new(50, 50)));
        assert_eq!(c.misses(), 3);

        c.observe(None);
        assert_eq!(c.last_dot(), None);
        assert_eq!(c.misses(), 0);
    }

    #[test]
    fn test_sighting_resets_miss_counter() {
        let mut c = DrawController::new(settings());
        c.observe(Some(Point::new(50, 50)));
        c.observe(None);
        c.observe(None);
        assert!(c.observe(Some(Point::new(60, 50))));
        assert_eq!(c.misses(), 0);
        for _ in 0..3 {
            c.observe(None);
        }
        assert_eq!(c.last_dot(), Some(Point::new(60, 50)));
    }

    #[test]
    fn test_canvas_persists_across_ticks() {
        let mut c = DrawController::new(settings());
        c.observe(Some(Point::new(20, 20)));
        c.observe(Some(Point::new(40, 20)));
        for _ in 0..10 {
            c.observe(None);
        }
        c.observe(Some(Point::new(150, 150)));
        assert_eq!(c.canvas().get(30, 20), Some(GREEN));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut c = DrawController::new(settings());
        c.set_color('y');
        c.inc_radius();
        c.observe(Some(Point::new(20, 20)));
        c.observe(Some(Point::new(40, 20)));
        c.observe(None);

        c.clear();
        assert!(c.canvas().is_blank());
        assert_eq!(c.last_dot(), None);
        assert_eq!(c.misses(), 0);
        assert_eq!(c.color(), GREEN);
        assert_eq!(c.radius(), 5);

        c.clear();
        assert!(c.canvas().is_blank());
    }

    #[test]
    fn test_radius_is_clamped() {
        let mut c = DrawController::new(settings());
        for _ in 0..10 {
            c.dec_radius();
        }
        assert_eq!(c.radius(), 1);
        c.inc_radius();
        assert_eq!(c.radius(), 2);
    }

    #[test]
    fn test_unknown_color_is_ignored() {
        let mut c = DrawController::new(settings());
        c.set_color('b');
        assert_eq!(c.color(), BLUE);
        c.set_color('z');
        assert_eq!(c.color(), BLUE);
        c.set_color('W');
        assert_eq!(c.color(), WHITE);
    }

    #[test]
    fn test_quit_flag() {
        let mut state = GraffitiState::new(DrawController::new(settings()), vec![], Stretch::IDENTITY);
        assert!(!state.should_quit());
        state.controller_mut().set_quit();
        state.controller_mut().set_quit();
        assert!(state.should_quit());
    }

    #[test]
    fn test_button_clicks_once_per_visit_and_lifts_brush() {
        let position = Rectangle::new(Point::new(0, 0), Point::new(20, 20)).unwrap();
        let grow: Callback = Box::new(|c: &mut DrawController| c.inc_radius());
        let mut state = GraffitiState::new(
            DrawController::new(settings()),
            vec![Button::swatch(position, BLUE, grow)],
            Stretch::IDENTITY,
        );

        state.tick(Some(Point::new(40, 10)));
        state.tick(Some(Point::new(10, 10)));
        state.tick(Some(Point::new(11, 10)));
        state.tick(Some(Point::new(12, 10)));
        assert_eq!(state.controller().radius(), 6);
        assert_eq!(state.controller().last_dot(), None);
        // The stroke did not follow the dot onto the button.
        assert_eq!(state.controller().canvas().get(25, 10), Some(BLACK));

        state.tick(Some(Point::new(40, 10)));
        state.tick(Some(Point::new(10, 10)));
        assert_eq!(state.controller().radius(), 7);
    }

    #[test]
    fn test_render_overlays_without_touching_canvas() {
        let position = Rectangle::new(Point::new(0, 0), Point::new(20, 20)).unwrap();
        let noop: Callback = Box::new(|_: &mut DrawController| {});
        let state = GraffitiState::new(
            DrawController::new(settings()),
            vec![Button::swatch(position, BLUE, noop)],
            Stretch::IDENTITY,
        );

        let frame = state.render(Some(Point::new(100, 100)));
        assert_eq!(frame.get(10, 10), Some(BLUE));
        assert_eq!(frame.get(100, 100), Some(CROSSHAIR_COLOR));
        assert!(state.controller().canvas().is_blank());
    }

    #[test]
    fn test_default_buttons_layout() {
        let buttons = default_buttons(720, None);
        assert_eq!(buttons.len(), 8);
        for pair in buttons.windows(2) {
            assert!(pair[0].position().top_y() < pair[1].position().bottom_y());
        }

        // Only what fits.
        assert_eq!(default_buttons(150, None).len(), 2);
    }

    #[test]
    fn test_default_buttons_dispatch() {
        let mut state = GraffitiState::new(
            DrawController::new(settings()),
            default_buttons(720, None),
            Stretch::IDENTITY,
        );
        let center = |i: usize, s: &GraffitiState| {
            let r = s.buttons()[i].position();
            Point::new(r.left_x() + r.width() / 2, r.bottom_y() + r.height() / 2)
        };

        let yellow = center(4, &state);
        state.tick(Some(yellow));
        assert_eq!(state.controller().color(), YELLOW);

        let quit = center(7, &state);
        state.tick(Some(quit));
        assert!(state.should_quit());
    }
}
