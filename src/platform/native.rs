use crate::errors::CameraError;
use crate::permissions::{self, PermissionStatus};
use crate::platform::{CameraBackend, CaptureDevice, FrameSource};
use crate::types::{
    CameraDeviceInfo, CameraFrame, DevicePosition, DeviceType, DiscoveryQuery, FocusMode,
};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::{Arc, Mutex, PoisonError};

/// Camera backend built on `nokhwa`.
pub struct NativeBackend {
    api: ApiBackend,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            api: ApiBackend::Auto,
        }
    }

    pub fn with_api(api: ApiBackend) -> Self {
        Self { api }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn authorization_status(&self) -> PermissionStatus {
        permissions::check_permission()
    }

    fn discover_devices(
        &self,
        query_params: &DiscoveryQuery,
    ) -> Result<Vec<Arc<dyn CaptureDevice>>, CameraError> {
        let cameras = query(self.api).map_err(|e| {
            CameraError::InitializationError(format!("Failed to query cameras: {}", e))
        })?;

        let mut devices: Vec<Arc<dyn CaptureDevice>> = Vec::new();
        for camera_info in cameras {
            let name = camera_info.human_name();
            let description = camera_info.description().to_string();
            let (position, device_type) = classify(&name, &description);
            let info = CameraDeviceInfo::new(camera_info.index().to_string(), name)
                .with_description(description)
                .with_position(position)
                .with_device_type(device_type);

            if !query_params.matches(&info) {
                log::debug!("Skipping camera {} ({:?})", info.name, info.device_type);
                continue;
            }
            devices.push(Arc::new(NativeDevice::new(
                camera_info.index().clone(),
                info,
            )));
        }

        Ok(devices)
    }
}

/// Desktop drivers do not report a facing direction, so it is read from
/// the device name. Anything not explicitly rear-facing faces the user.
fn classify(name: &str, description: &str) -> (DevicePosition, DeviceType) {
    let text = format!("{} {}", name, description).to_lowercase();

    let position = if ["rear", "back", "environment", "world"]
        .iter()
        .any(|k| text.contains(k))
    {
        DevicePosition::Back
    } else {
        DevicePosition::Front
    };

    let device_type = if ["usb", "external", "capture card", "virtual"]
        .iter()
        .any(|k| text.contains(k))
    {
        DeviceType::External
    } else {
        DeviceType::BuiltInWideAngleCamera
    };

    (position, device_type)
}

#[derive(Debug)]
struct NativeDeviceState {
    locked: bool,
    focus_mode: FocusMode,
}

/// A camera reachable through `nokhwa`.
#[derive(Debug)]
pub struct NativeDevice {
    index: CameraIndex,
    info: CameraDeviceInfo,
    state: Mutex<NativeDeviceState>,
}

impl NativeDevice {
    fn new(index: CameraIndex, info: CameraDeviceInfo) -> Self {
        Self {
            index,
            info,
            state: Mutex::new(NativeDeviceState {
                locked: false,
                focus_mode: FocusMode::ContinuousAutoFocus,
            }),
        }
    }
}

impl CaptureDevice for NativeDevice {
    fn info(&self) -> &CameraDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn lock_for_configuration(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.locked {
            return Err(CameraError::ControlError(format!(
                "{} is already locked for configuration",
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

    // UVC and AVFoundation webcams run continuous autofocus in the driver;
    // nokhwa exposes no portable switch for the other modes.
    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool {
        mode == FocusMode::ContinuousAutoFocus
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
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(self.index.clone(), requested).map_err(|e| {
            CameraError::InitializationError(format!("Failed to initialize camera: {}", e))
        })?;
        camera
            .open_stream()
            .map_err(|e| CameraError::StreamError(format!("Failed to start stream: {}", e)))?;

        log::info!("Opened stream for {}", self.info.name);
        Ok(Box::new(NativeFrameSource {
            camera,
            device_id: self.info.id.clone(),
            sequence: 0,
        }))
    }
}

struct NativeFrameSource {
    camera: Camera,
    device_id: String,
    sequence: u64,
}

impl FrameSource for NativeFrameSource {
    fn next_frame(&mut self) -> Result<CameraFrame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::CaptureError(format!("Failed to capture frame: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureError(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        self.sequence += 1;
        Ok(
            CameraFrame::new(decoded.into_raw(), width, height, self.device_id.clone())
                .with_sequence(self.sequence),
        )
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.camera
            .stop_stream()
            .map_err(|e| CameraError::StreamError(format!("Failed to stop stream: {}", e)))
    }
}
