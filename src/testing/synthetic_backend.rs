use crate::errors::CameraError;
use crate::permissions::PermissionStatus;
use crate::platform::{CameraBackend, CaptureDevice, FrameSource};
use crate::testing::synthetic_data::synthetic_video_frame;
use crate::types::{
    CameraDeviceInfo, CameraFrame, DevicePosition, DeviceType, DiscoveryQuery, FocusMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct DeviceState {
    locked: bool,
    focus_mode: FocusMode,
}

/// A scriptable camera producing gradient frames.
#[derive(Debug)]
pub struct SyntheticDevice {
    info: CameraDeviceInfo,
    connected: bool,
    focus_modes: Vec<FocusMode>,
    refuse_lock: bool,
    fail_stream: bool,
    frame_size: (u32, u32),
    frame_interval: Duration,
    open_delay: Duration,
    streams_opened: AtomicUsize,
    state: Mutex<DeviceState>,
}

impl SyntheticDevice {
    pub fn new(id: impl Into<String>, position: DevicePosition) -> Self {
        let name = match position {
            DevicePosition::Front => "Synthetic Front Camera",
            DevicePosition::Back => "Synthetic Back Camera",
            DevicePosition::Unspecified => "Synthetic Camera",
        };
        Self {
            info: CameraDeviceInfo::new(id, name).with_position(position),
            connected: true,
            focus_modes: vec![
                FocusMode::Locked,
                FocusMode::AutoFocus,
                FocusMode::ContinuousAutoFocus,
            ],
            refuse_lock: false,
            fail_stream: false,
            frame_size: (64, 48),
            frame_interval: Duration::from_millis(5),
            open_delay: Duration::ZERO,
            streams_opened: AtomicUsize::new(0),
            state: Mutex::new(DeviceState {
                locked: false,
                focus_mode: FocusMode::Locked,
            }),
        }
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.info.device_type = device_type;
        self
    }

    pub fn with_focus_modes(mut self, modes: Vec<FocusMode>) -> Self {
        if let Some(first) = modes.first() {
            self.state
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .focus_mode = *first;
        }
        self.focus_modes = modes;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// Block `open_stream` for `delay` before it answers.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn failing_configuration_lock(mut self) -> Self {
        self.refuse_lock = true;
        self
    }

    pub fn failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .locked
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for SyntheticDevice {
    fn info(&self) -> &CameraDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn lock_for_configuration(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.refuse_lock || state.locked {
            return Err(CameraError::ControlError(format!(
                "{} refused the configuration lock",
                self.info.name
            )));
        }
        state.locked = true;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .locked = false;
    }

    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    fn focus_mode(&self) -> FocusMode {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .focus_mode
    }

    fn apply_focus_mode(&self, mode: FocusMode) -> Result<(), CameraError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.locked {
            return Err(CameraError::ControlError(
                "device is not locked for configuration".to_string(),
            ));
        }
        state.focus_mode = mode;
        Ok(())
    }

    fn open_stream(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        if self.fail_stream {
            return Err(CameraError::StreamError(format!(
                "{} failed to open its stream",
                self.info.name
            )));
        }
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticFrameSource {
            device_id: self.info.id.clone(),
            size: self.frame_size,
            interval: self.frame_interval,
            sequence: 0,
        }))
    }
}

struct SyntheticFrameSource {
    device_id: String,
    size: (u32, u32),
    interval: Duration,
    sequence: u64,
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> Result<CameraFrame, CameraError> {
        std::thread::sleep(self.interval);
        self.sequence += 1;
        let mut frame = synthetic_video_frame(self.sequence, self.size.0, self.size.1);
        frame.device_id = self.device_id.clone();
        Ok(frame)
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
}

/// Backend serving a fixed list of [`SyntheticDevice`]s.
pub struct SyntheticBackend {
    devices: Vec<Arc<SyntheticDevice>>,
    permission: PermissionStatus,
    discovery_error: Option<String>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            permission: PermissionStatus::Granted,
            discovery_error: None,
        }
    }

    /// A phone-like setup: one front and one back camera.
    pub fn front_and_rear() -> Self {
        Self::new()
            .with_device(SyntheticDevice::new("front", DevicePosition::Front))
            .with_device(SyntheticDevice::new("rear", DevicePosition::Back))
    }

    pub fn with_device(mut self, device: SyntheticDevice) -> Self {
        self.devices.push(Arc::new(device));
        self
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }

    pub fn failing_discovery(mut self, message: impl Into<String>) -> Self {
        self.discovery_error = Some(message.into());
        self
    }

    pub fn devices(&self) -> &[Arc<SyntheticDevice>] {
        &self.devices
    }

    pub fn device(&self, id: &str) -> Option<&Arc<SyntheticDevice>> {
        self.devices.iter().find(|d| d.info.id == id)
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn authorization_status(&self) -> PermissionStatus {
        self.permission
    }

    fn discover_devices(
        &self,
        query: &DiscoveryQuery,
    ) -> Result<Vec<Arc<dyn CaptureDevice>>, CameraError> {
        if let Some(message) = &self.discovery_error {
            return Err(CameraError::InitializationError(message.clone()));
        }
        Ok(self
            .devices
            .iter()
            .filter(|device| query.matches(device.info()))
            .map(|device| device.clone() as Arc<dyn CaptureDevice>)
            .collect())
    }
}
