// Camera capture on a background thread.
// Visual expectation: the game loop calls `read()` and instantly gets the
// freshest camera image, however slowly the camera itself delivers frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::{RgbImage, imageops};
use log::{debug, info, trace, warn};

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

use crate::config::CameraConfig;
use crate::error::FrameSourceError;
use crate::stream::MjpegGrabber;
use crate::types::{Frame, Rectangle};

/// Back-off after a failed grab so a dead camera doesn't spin the thread.
const GRAB_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Pause between iterations so the stop signal is seen promptly.
const LOOP_PAUSE: Duration = Duration::from_millis(1);

/// Where frames come from. A stream URL wins over a device index.
/// Streams are MJPEG over `http://` or `https://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    Device(u32),
    Stream(String),
}

impl CameraSource {
    pub fn select(device: u32, url: Option<&str>) -> Self {
        match url {
            Some(url) => CameraSource::Stream(url.to_string()),
            None => CameraSource::Device(device),
        }
    }
}

/// Anything that can hand over one RGB image per call.
/// Grabbers are built on the capture thread, so they need not be `Send`.
pub trait Grabber {
    fn grab(&mut self) -> Result<RgbImage, FrameSourceError>;
}

/// A small wrapper around nokhwa::Camera.
pub struct CameraGrabber {
    cam: Camera,
}

impl CameraGrabber {
    /// Open a local capture device and start streaming.
    pub fn open(device: u32, settings: &CameraConfig) -> Result<Self, FrameSourceError> {
        let index = CameraIndex::Index(device);

        // Ask for uncompressed frames near the configured size first, then let the camera pick.
        let closest = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(settings.width, settings.height),
                FrameFormat::YUYV,
                settings.fps,
            ),
        ));
        let fallback = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut cam = Camera::new(index.clone(), closest)
            .or_else(|e| {
                debug!("closest format rejected ({e}), falling back to highest resolution");
                Camera::new(index, fallback)
            })
            .map_err(|e| FrameSourceError::CameraUnavailable(format!("Create camera: {e}")))?;

        cam.open_stream()
            .map_err(|e| FrameSourceError::CameraUnavailable(format!("Open stream: {e}")))?;

        // The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();
        info!("camera streaming at {}x{}", actual.width(), actual.height());

        Ok(Self { cam })
    }
}

impl Grabber for CameraGrabber {
    fn grab(&mut self) -> Result<RgbImage, FrameSourceError> {
        // Blocks until the camera has a new frame.
        let buffer = self
            .cam
            .frame()
            .map_err(|e| FrameSourceError::Frame(format!("Fetch frame: {e}")))?;
        buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| FrameSourceError::Frame(format!("Decode RGB: {e}")))
    }
}

impl Drop for CameraGrabber {
    fn drop(&mut self) {
        if let Err(e) = self.cam.stop_stream() {
            warn!("stopping camera stream: {e}");
        }
    }
}

enum CaptureCommand {
    Start,
    Stop,
}

/// State shared between the capture thread and readers.
#[derive(Clone)]
struct Shared {
    slot: Arc<Mutex<Option<Frame>>>,
    crop: Arc<Mutex<Option<Rectangle>>>,
    stop: Arc<AtomicBool>,
}

/// Latest-frame camera feed.
///
/// The grabber runs on its own thread; `read()` copies whatever was published
/// last and never waits on the camera. Until the capture loop publishes its
/// first frame, `read()` returns `None`.
pub struct FrameSource {
    shared: Shared,
    command_tx: Option<Sender<CaptureCommand>>,
    capture_thread: Option<JoinHandle<()>>,
    started: bool,
    resolution: (u32, u32),
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("resolution", &self.resolution)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FrameSource {
    /// Open a camera device (nokhwa) or an MJPEG-over-HTTP stream.
    ///
    /// # Errors
    /// * `FrameSourceError::CameraUnavailable` - the source cannot be opened or its first read fails
    pub fn open(source: CameraSource, settings: &CameraConfig) -> Result<Self, FrameSourceError> {
        info!("opening camera source {source:?}");
        match source {
            CameraSource::Device(device) => {
                let settings = settings.clone();
                Self::with_grabber(move || CameraGrabber::open(device, &settings))
            }
            // Streams come at whatever size the server sends.
            CameraSource::Stream(url) => Self::with_grabber(move || MjpegGrabber::connect(&url)),
        }
    }

    /// Open a source around any grabber. `open` runs on the capture thread,
    /// followed by one probe grab; this call returns once both have succeeded or failed.
    pub fn with_grabber<F, G>(open: F) -> Result<Self, FrameSourceError>
    where
        F: FnOnce() -> Result<G, FrameSourceError> + Send + 'static,
        G: Grabber,
    {
        let shared = Shared {
            slot: Arc::new(Mutex::new(None)),
            crop: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let (command_tx, command_rx) = mpsc::channel();
        let (info_tx, info_rx) = mpsc::channel();

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("frame-source".into())
            .spawn(move || run_capture_thread(open, thread_shared, command_rx, info_tx))
            .map_err(|e| FrameSourceError::CameraUnavailable(format!("Spawn capture thread: {e}")))?;

        match info_rx.recv() {
            Ok(Ok(resolution)) => Ok(Self {
                shared,
                command_tx: Some(command_tx),
                capture_thread: Some(handle),
                started: false,
                resolution,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(FrameSourceError::CameraUnavailable(
                    "Capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    /// Size of the probe frame read while opening (before any crop).
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Begin publishing frames.
    ///
    /// # Errors
    /// * `FrameSourceError::AlreadyRunning` - `start()` was already called
    /// * `FrameSourceError::Stopped` - the source has been stopped
    pub fn start(&mut self) -> Result<(), FrameSourceError> {
        if self.started {
            return Err(if self.capture_thread.is_some() {
                FrameSourceError::AlreadyRunning
            } else {
                FrameSourceError::Stopped
            });
        }
        let tx = self.command_tx.as_ref().ok_or(FrameSourceError::Stopped)?;
        tx.send(CaptureCommand::Start)
            .map_err(|_| FrameSourceError::Stopped)?;
        self.started = true;
        info!("capture loop started");
        Ok(())
    }

    /// Copy of the most recently published frame, or `None` if nothing has been published yet.
    pub fn read(&self) -> Option<Frame> {
        let slot = self.shared.slot.lock().ok()?;
        slot.clone()
    }

    /// Crop every frame captured from now on. Frames already published are untouched.
    pub fn update_crop_rect(&self, rect: Rectangle) {
        if let Ok(mut crop) = self.shared.crop.lock() {
            *crop = Some(rect);
        }
        debug!("crop rect set to {rect:?}");
    }

    /// Stop the capture thread and wait for it to exit; the camera is released
    /// before this returns. Safe to call more than once.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);

        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(CaptureCommand::Stop);
        }

        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                warn!("capture thread panicked");
            }
            info!("capture loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.started
            && self
                .capture_thread
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_thread<F, G>(
    open: F,
    shared: Shared,
    rx: Receiver<CaptureCommand>,
    info_tx: Sender<Result<(u32, u32), FrameSourceError>>,
) where
    F: FnOnce() -> Result<G, FrameSourceError>,
    G: Grabber,
{
    let mut grabber = match open() {
        Ok(g) => g,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    // Probe read: an unreadable source counts as unavailable.
    match grabber.grab() {
        Ok(probe) => {
            let _ = info_tx.send(Ok((probe.width(), probe.height())));
        }
        Err(e) => {
            let _ = info_tx.send(Err(FrameSourceError::CameraUnavailable(format!(
                "First read failed: {e}"
            ))));
            return;
        }
    }

    // Park until started; a stop (or a dropped source) ends the thread here.
    match rx.recv() {
        Ok(CaptureCommand::Start) => {}
        Ok(CaptureCommand::Stop) | Err(_) => return,
    }

    capture_loop(&mut grabber, &shared, &rx);
    // `grabber` drops here, releasing the camera before the join completes.
}

fn capture_loop<G: Grabber>(grabber: &mut G, shared: &Shared, rx: &Receiver<CaptureCommand>) {
    while !shared.stop.load(Ordering::Relaxed) {
        if let Ok(CaptureCommand::Stop) = rx.try_recv() {
            break;
        }

        // The camera read happens outside any lock.
        match grabber.grab() {
            Ok(image) => {
                let timestamp = Instant::now();
                let crop = shared.crop.lock().ok().and_then(|c| *c);
                let (image, crop) = apply_crop(image, crop);
                let frame = Frame {
                    image,
                    timestamp,
                    crop,
                };

                // Publish: one assignment under the lock.
                if let Ok(mut slot) = shared.slot.lock() {
                    *slot = Some(frame);
                }
            }
            Err(e) => {
                warn!("{e}");
                thread::sleep(GRAB_RETRY_DELAY);
            }
        }

        thread::sleep(LOOP_PAUSE);
    }
}

/// Cut `crop` out of `image`, clamped to the image. A crop that misses the
/// image entirely leaves it whole and untagged.
fn apply_crop(image: RgbImage, crop: Option<Rectangle>) -> (RgbImage, Option<Rectangle>) {
    let Some(rect) = crop else {
        return (image, None);
    };

    let (w, h) = (image.width() as i32, image.height() as i32);
    let x0 = rect.left_x().clamp(0, w);
    let y0 = rect.bottom_y().clamp(0, h);
    let x1 = rect.right_x().clamp(0, w);
    let y1 = rect.top_y().clamp(0, h);
    if x1 <= x0 || y1 <= y0 {
        trace!("crop {rect:?} misses {w}x{h} frame");
        return (image, None);
    }

    let cropped = imageops::crop_imm(&image, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
        .to_image();
    (cropped, Some(rect))
}
