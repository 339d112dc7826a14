//! Photo output: encodes session frames into still images.

use crate::errors::CameraError;
use crate::session::FrameSlot;
use crate::types::{CameraFrame, PhotoCodec, PhotoSettings};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// An encoded still image.
#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: Uuid,
    pub settings_id: Uuid,
    pub codec: PhotoCodec,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Default)]
struct OutputState {
    prepared: Vec<PhotoSettings>,
    frames: Option<Arc<FrameSlot>>,
}

/// Still-image sink attached to a [`CaptureSession`](crate::session::CaptureSession).
pub struct PhotoOutput {
    id: Uuid,
    state: Mutex<OutputState>,
    capture_timeout: Duration,
}

impl PhotoOutput {
    pub fn new() -> Self {
        Self::with_capture_timeout(DEFAULT_CAPTURE_TIMEOUT)
    }

    /// `capture_timeout` bounds the wait for a fresh frame.
    pub fn with_capture_timeout(capture_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(OutputState::default()),
            capture_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn attach(&self, frames: Arc<FrameSlot>) {
        self.lock().frames = Some(frames);
    }

    pub fn is_attached(&self) -> bool {
        self.lock().frames.is_some()
    }

    /// Record the settings later captures will use.
    pub fn set_prepared_photo_settings(&self, settings: Vec<PhotoSettings>) {
        log::debug!(
            "Photo output {} prepared {} settings",
            self.id,
            settings.len()
        );
        self.lock().prepared = settings;
    }

    pub fn prepared_photo_settings(&self) -> Vec<PhotoSettings> {
        self.lock().prepared.clone()
    }

    /// Capture with the first prepared settings, or JPEG when none are prepared.
    pub fn capture(&self) -> Result<Photo, CameraError> {
        let settings = self
            .lock()
            .prepared
            .first()
            .cloned()
            .unwrap_or_else(|| PhotoSettings::new(PhotoCodec::Jpeg));
        self.capture_photo(&settings)
    }

    /// Encode the next frame delivered by the session.
    pub fn capture_photo(&self, settings: &PhotoSettings) -> Result<Photo, CameraError> {
        let frames = self.lock().frames.clone().ok_or_else(|| {
            CameraError::CaptureError("photo output is not attached to a session".to_string())
        })?;

        let (_, frame) = frames
            .wait_newer(frames.generation(), self.capture_timeout)
            .ok_or_else(|| {
                CameraError::CaptureError(format!(
                    "no frame delivered within {:?}",
                    self.capture_timeout
                ))
            })?;

        let data = encode_frame(&frame, settings)?;
        log::info!(
            "Captured {}x{} {:?} photo ({} bytes)",
            frame.width,
            frame.height,
            settings.codec,
            data.len()
        );

        Ok(Photo {
            id: Uuid::new_v4(),
            settings_id: settings.id,
            codec: settings.codec,
            width: frame.width,
            height: frame.height,
            data,
            captured_at: Utc::now(),
        })
    }
}

impl Default for PhotoOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PhotoOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoOutput")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

pub fn encode_frame(frame: &CameraFrame, settings: &PhotoSettings) -> Result<Vec<u8>, CameraError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
        || {
            CameraError::EncodingError(format!(
                "frame buffer of {} bytes does not hold {}x{} RGB pixels",
                frame.data.len(),
                frame.width,
                frame.height
            ))
        },
    )?;

    let mut buffer = Vec::new();
    match settings.codec {
        PhotoCodec::Jpeg => JpegEncoder::new_with_quality(&mut buffer, settings.quality)
            .encode_image(&image)
            .map_err(|e| CameraError::EncodingError(format!("JPEG encoding failed: {}", e)))?,
        PhotoCodec::Png => image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CameraError::EncodingError(format!("PNG encoding failed: {}", e)))?,
    }
    Ok(buffer)
}
