//! Views, layers and the live preview layer.

use crate::session::CaptureSession;
use crate::types::{Rect, VideoGravity, VideoOrientation};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A visual surface that can be stacked inside a [`View`].
pub trait Layer: Send + Sync + fmt::Debug {
    fn id(&self) -> Uuid;

    fn name(&self) -> &str;

    fn frame(&self) -> Rect;

    fn set_frame(&self, frame: Rect);
}

/// A caller-owned view holding an ordered stack of layers.
/// Index 0 is drawn first, beneath everything else.
#[derive(Debug, Default)]
pub struct View {
    frame: Rect,
    sublayers: Vec<Arc<dyn Layer>>,
}

impl View {
    pub fn new(frame: Rect) -> Self {
        Self {
            frame,
            sublayers: Vec::new(),
        }
    }

    pub fn frame(&self) -> Rect {
        self.frame
    }

    pub fn set_frame(&mut self, frame: Rect) {
        self.frame = frame;
    }

    pub fn sublayers(&self) -> &[Arc<dyn Layer>] {
        &self.sublayers
    }

    pub fn add_sublayer(&mut self, layer: Arc<dyn Layer>) {
        self.sublayers.push(layer);
    }

    /// Insert at `index`, clamped to the end of the stack.
    pub fn insert_sublayer(&mut self, layer: Arc<dyn Layer>, index: usize) {
        let index = index.min(self.sublayers.len());
        self.sublayers.insert(index, layer);
    }

    pub fn remove_sublayer(&mut self, id: Uuid) -> bool {
        let before = self.sublayers.len();
        self.sublayers.retain(|layer| layer.id() != id);
        self.sublayers.len() != before
    }
}

/// Plain layer for overlays such as controls or labels.
#[derive(Debug)]
pub struct ContentLayer {
    id: Uuid,
    name: String,
    frame: Mutex<Rect>,
}

impl ContentLayer {
    pub fn new(name: impl Into<String>, frame: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            frame: Mutex::new(frame),
        }
    }
}

impl Layer for ContentLayer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn frame(&self) -> Rect {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_frame(&self, frame: Rect) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = frame;
    }
}

/// Link between a preview layer and its session's video.
#[derive(Debug)]
pub struct PreviewConnection {
    orientation: Mutex<VideoOrientation>,
}

impl PreviewConnection {
    pub fn video_orientation(&self) -> VideoOrientation {
        *self.orientation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_video_orientation(&self, orientation: VideoOrientation) {
        *self.orientation.lock().unwrap_or_else(PoisonError::into_inner) = orientation;
    }
}

#[derive(Debug)]
struct PreviewState {
    gravity: VideoGravity,
    frame: Rect,
}

/// Displays the video of a [`CaptureSession`].
pub struct PreviewLayer {
    id: Uuid,
    session: Arc<CaptureSession>,
    connection: PreviewConnection,
    state: Mutex<PreviewState>,
}

impl PreviewLayer {
    pub fn new(session: Arc<CaptureSession>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            connection: PreviewConnection {
                orientation: Mutex::new(VideoOrientation::LandscapeRight),
            },
            state: Mutex::new(PreviewState {
                gravity: VideoGravity::ResizeAspect,
                frame: Rect::ZERO,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PreviewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    pub fn connection(&self) -> &PreviewConnection {
        &self.connection
    }

    pub fn video_gravity(&self) -> VideoGravity {
        self.lock().gravity
    }

    pub fn set_video_gravity(&self, gravity: VideoGravity) {
        self.lock().gravity = gravity;
    }

    /// Render the latest session frame at the layer's size.
    ///
    /// Returns `None` before the first frame, or while the layer frame is
    /// empty or larger than [`MAX_RENDER_DIMENSION`] on either side.
    pub fn render(&self) -> Option<RgbImage> {
        let (gravity, frame) = {
            let state = self.lock();
            (state.gravity, state.frame)
        };
        let target = render_target(frame)?;

        let latest = self.session.latest_frame()?;
        let image = RgbImage::from_raw(latest.width, latest.height, latest.data)?;
        let oriented = orient(image, self.connection.video_orientation());
        Some(fit(&oriented, target, gravity))
    }
}

impl Layer for PreviewLayer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        "camera-preview"
    }

    fn frame(&self) -> Rect {
        self.lock().frame
    }

    fn set_frame(&self, frame: Rect) {
        self.lock().frame = frame;
    }
}

impl fmt::Debug for PreviewLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewLayer")
            .field("id", &self.id)
            .field("session", &self.session.id())
            .field("orientation", &self.connection.video_orientation())
            .field("state", &*self.lock())
            .finish()
    }
}

/// Largest width or height, in pixels, that [`PreviewLayer::render`] produces.
pub const MAX_RENDER_DIMENSION: u32 = 8192;

fn render_target(frame: Rect) -> Option<(u32, u32)> {
    if frame.is_empty() {
        return None;
    }
    let (width, height) = (frame.width.round(), frame.height.round());
    let max = f64::from(MAX_RENDER_DIMENSION);
    if !(1.0..=max).contains(&width) || !(1.0..=max).contains(&height) {
        log::warn!(
            "Preview frame {}x{} is outside the renderable range",
            frame.width,
            frame.height
        );
        return None;
    }
    Some((width as u32, height as u32))
}

// Sensors deliver landscape-right frames.
fn orient(image: RgbImage, orientation: VideoOrientation) -> RgbImage {
    match orientation {
        VideoOrientation::LandscapeRight => image,
        VideoOrientation::Portrait => imageops::rotate90(&image),
        VideoOrientation::LandscapeLeft => imageops::rotate180(&image),
        VideoOrientation::PortraitUpsideDown => imageops::rotate270(&image),
    }
}

/// Size of the source after scaling it into `dst` with `gravity`, before
/// any cropping or letterboxing.
pub fn scaled_size(src: (u32, u32), dst: (u32, u32), gravity: VideoGravity) -> (u32, u32) {
    let sx = dst.0 as f64 / src.0 as f64;
    let sy = dst.1 as f64 / src.1 as f64;
    match gravity {
        VideoGravity::Resize => dst,
        VideoGravity::ResizeAspect => {
            let s = sx.min(sy);
            (
                (src.0 as f64 * s).round().clamp(1.0, dst.0 as f64) as u32,
                (src.1 as f64 * s).round().clamp(1.0, dst.1 as f64) as u32,
            )
        }
        VideoGravity::ResizeAspectFill => {
            let s = sx.max(sy);
            (
                (src.0 as f64 * s).round().max(dst.0 as f64) as u32,
                (src.1 as f64 * s).round().max(dst.1 as f64) as u32,
            )
        }
    }
}

fn fit(image: &RgbImage, dst: (u32, u32), gravity: VideoGravity) -> RgbImage {
    let (w, h) = scaled_size(image.dimensions(), dst, gravity);
    let scaled = imageops::resize(image, w, h, FilterType::Triangle);
    match gravity {
        VideoGravity::Resize => scaled,
        VideoGravity::ResizeAspectFill => {
            imageops::crop_imm(&scaled, (w - dst.0) / 2, (h - dst.1) / 2, dst.0, dst.1).to_image()
        }
        VideoGravity::ResizeAspect => {
            let mut canvas = RgbImage::from_pixel(dst.0, dst.1, Rgb([0, 0, 0]));
            imageops::overlay(
                &mut canvas,
                &scaled,
                ((dst.0 - w) / 2) as i64,
                ((dst.1 - h) / 2) as i64,
            );
            canvas
        }
    }
}
