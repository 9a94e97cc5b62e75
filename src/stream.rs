// Network camera streams: MJPEG over HTTP.
// Visual: an IP camera or phone camera app serving `multipart/x-mixed-replace`
// JPEGs behaves exactly like a local webcam.

use std::io::Read;
use std::time::Duration;

use image::{ImageFormat, RgbImage};
use log::{debug, info};
use reqwest::Url;
use reqwest::blocking::{Client, Response};

use crate::camera::Grabber;
use crate::error::FrameSourceError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 16 * 1024;
/// More buffered bytes than this without a complete JPEG means the stream is not MJPEG.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8]; // JPEG start of image
const EOI: [u8; 2] = [0xFF, 0xD9]; // JPEG end of image

/// Pulls JPEG frames out of a byte stream, ignoring whatever sits between them
/// (multipart boundaries, part headers).
pub struct MjpegGrabber<R> {
    reader: R,
    buf: Vec<u8>,
}

impl MjpegGrabber<Response> {
    /// Connect to an `http://` or `https://` MJPEG stream.
    ///
    /// # Errors
    /// * `FrameSourceError::CameraUnavailable` - bad URL, unsupported scheme, or the server refused
    pub fn connect(url: &str) -> Result<Self, FrameSourceError> {
        let parsed = Url::parse(url)
            .map_err(|e| FrameSourceError::CameraUnavailable(format!("Stream URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FrameSourceError::CameraUnavailable(format!(
                "Stream URL {url}: only http(s) MJPEG streams are supported"
            )));
        }

        // The body never ends, so no overall timeout; only connecting is bounded.
        let mut builder = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>);
        if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| FrameSourceError::CameraUnavailable(format!("HTTP client: {e}")))?;

        let response = client
            .get(parsed)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| FrameSourceError::CameraUnavailable(format!("Connect {url}: {e}")))?;
        if let Some(kind) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            debug!("stream content type {kind:?}");
        }
        info!("connected to stream {url}");
        Ok(Self::new(response))
    }
}

impl<R: Read> MjpegGrabber<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Bytes of the next complete JPEG, SOI through EOI.
    fn next_jpeg(&mut self) -> Result<Vec<u8>, FrameSourceError> {
        loop {
            match find_marker(&self.buf, SOI) {
                Some(start) => {
                    if let Some(len) = find_marker(&self.buf[start + 2..], EOI) {
                        let end = start + 2 + len + 2;
                        let jpeg = self.buf[start..end].to_vec();
                        self.buf.drain(..end);
                        return Ok(jpeg);
                    }
                    self.buf.drain(..start);
                }
                // Keep the last byte: it may be the first half of an SOI.
                None if self.buf.len() > 1 => {
                    let junk = self.buf.len() - 1;
                    self.buf.drain(..junk);
                }
                None => {}
            }

            if self.buf.len() > MAX_FRAME_BYTES {
                self.buf.clear();
                return Err(FrameSourceError::Frame(format!(
                    "No complete JPEG within {MAX_FRAME_BYTES} bytes"
                )));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .reader
                .read(&mut chunk)
                .map_err(|e| FrameSourceError::Frame(format!("Read stream: {e}")))?;
            if n == 0 {
                return Err(FrameSourceError::Frame("Stream ended".to_string()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl<R: Read> Grabber for MjpegGrabber<R> {
    fn grab(&mut self) -> Result<RgbImage, FrameSourceError> {
        let jpeg = self.next_jpeg()?;
        image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map(|img| img.to_rgb8())
            .map_err(|e| FrameSourceError::Frame(format!("Decode JPEG: {e}")))
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}
