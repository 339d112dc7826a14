//! Testing utilities for the camera controller
//!
//! A synthetic backend with scriptable devices, so the full setup chain can
//! run without camera hardware.

pub mod synthetic_backend;
pub mod synthetic_data;

pub use synthetic_backend::{SyntheticBackend, SyntheticDevice};
pub use synthetic_data::synthetic_video_frame;
