//! Backend seam between the controller and the camera hardware.
//!
//! A [`CameraBackend`] discovers [`CaptureDevice`]s; a device can be locked
//! for configuration and opened into a [`FrameSource`]. The native backend
//! talks to `nokhwa`; `crate::testing` provides a synthetic one.

pub mod native;

use crate::errors::CameraError;
use crate::permissions::PermissionStatus;
use crate::types::{CameraDeviceInfo, CameraFrame, DiscoveryQuery, FocusMode};
use std::fmt;
use std::sync::Arc;

pub use native::{NativeBackend, NativeDevice};

/// Produces frames from an opened device stream.
///
/// Sources are created and consumed on the session's capture thread, so
/// they need not be `Send`.
pub trait FrameSource {
    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<CameraFrame, CameraError>;

    fn stop(&mut self) -> Result<(), CameraError>;
}

/// A discovered camera.
pub trait CaptureDevice: Send + Sync + fmt::Debug {
    fn info(&self) -> &CameraDeviceInfo;

    fn is_connected(&self) -> bool;

    /// Take exclusive configuration access. Prefer [`configure`], which
    /// releases the lock on drop.
    fn lock_for_configuration(&self) -> Result<(), CameraError>;

    fn unlock_for_configuration(&self);

    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool;

    fn focus_mode(&self) -> FocusMode;

    /// Only valid while the configuration lock is held.
    fn apply_focus_mode(&self, mode: FocusMode) -> Result<(), CameraError>;

    fn open_stream(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// The camera framework of the host.
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    fn authorization_status(&self) -> PermissionStatus;

    fn discover_devices(
        &self,
        query: &DiscoveryQuery,
    ) -> Result<Vec<Arc<dyn CaptureDevice>>, CameraError>;
}

/// Holds a device's configuration lock until dropped.
pub struct DeviceConfiguration<'a> {
    device: &'a dyn CaptureDevice,
}

impl DeviceConfiguration<'_> {
    pub fn set_focus_mode(&self, mode: FocusMode) -> Result<(), CameraError> {
        if !self.device.is_focus_mode_supported(mode) {
            return Err(CameraError::ControlError(format!(
                "focus mode {:?} not supported by {}",
                mode,
                self.device.info().name
            )));
        }
        self.device.apply_focus_mode(mode)
    }
}

impl Drop for DeviceConfiguration<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
    }
}

/// Lock `device` for configuration.
pub fn configure(device: &dyn CaptureDevice) -> Result<DeviceConfiguration<'_>, CameraError> {
    device.lock_for_configuration()?;
    Ok(DeviceConfiguration { device })
}

/// Backend for the host platform.
pub fn default_backend() -> Arc<dyn CameraBackend> {
    Arc::new(NativeBackend::new())
}
