//! camera-controller: camera capture session setup with live preview
//!
//! The controller prepares a capture pipeline in four ordered steps on a
//! background queue (create the session, pick the front/rear cameras,
//! attach an input, attach a photo output and start the session), reports
//! the outcome on the caller's main context, and inserts live preview
//! layers into views.
//!
//! # Usage
//! ```rust,no_run
//! use camera_controller::{platform, CameraController, CameraControllerError};
//! use std::time::Duration;
//!
//! camera_controller::init_logging();
//! let controller = CameraController::new(platform::default_backend())?;
//! controller.prepare(|result: Result<(), CameraControllerError>| match result {
//!     Ok(()) => println!("camera ready"),
//!     Err(e) => eprintln!("camera setup failed: {e}"),
//! });
//! controller.main_context().run_next(Duration::from_secs(5));
//! # Ok::<(), camera_controller::CameraError>(())
//! ```
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod errors;
pub mod output;
pub mod permissions;
pub mod platform;
pub mod preview;
pub mod session;
pub mod types;

// Testing utilities - synthetic backend for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::ControllerConfig;
pub use controller::CameraController;
pub use dispatch::{MainContext, SerialQueue};
pub use errors::{CameraControllerError, CameraError};
pub use output::{Photo, PhotoOutput};
pub use platform::{CameraBackend, CaptureDevice, NativeBackend};
pub use preview::{ContentLayer, Layer, PreviewLayer, View};
pub use session::{CaptureSession, DeviceInput};
pub use types::{
    CameraDeviceInfo, CameraFrame, CameraPosition, DevicePosition, DeviceType, FocusMode,
    PhotoCodec, PhotoSettings, Rect, VideoGravity, VideoOrientation,
};

/// Initialize logging for the camera controller
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camera_controller=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
