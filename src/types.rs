//! Core value types shared by the controller, sessions and backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Camera position the controller is currently capturing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Rear,
}

/// Physical position a device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePosition {
    Front,
    Back,
    Unspecified,
}

impl DevicePosition {
    /// The controller position this device can serve, if any.
    pub fn camera_position(self) -> Option<CameraPosition> {
        match self {
            DevicePosition::Front => Some(CameraPosition::Front),
            DevicePosition::Back => Some(CameraPosition::Rear),
            DevicePosition::Unspecified => None,
        }
    }
}

/// Kind of capture hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    BuiltInWideAngleCamera,
    External,
}

impl DeviceType {
    /// Types searched when nothing narrower is configured.
    pub const ALL: [DeviceType; 2] = [DeviceType::BuiltInWideAngleCamera, DeviceType::External];
}

/// Focus behaviour of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

/// Description of a discovered capture device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDeviceInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub position: DevicePosition,
    pub device_type: DeviceType,
}

impl CameraDeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            position: DevicePosition::Unspecified,
            device_type: DeviceType::BuiltInWideAngleCamera,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_position(mut self, position: DevicePosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }
}

/// Which devices a discovery pass should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub device_types: Vec<DeviceType>,
    /// `Unspecified` means any position.
    pub position: DevicePosition,
}

impl DiscoveryQuery {
    pub fn matches(&self, info: &CameraDeviceInfo) -> bool {
        self.device_types.contains(&info.device_type)
            && (self.position == DevicePosition::Unspecified || self.position == info.position)
    }
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self {
            device_types: DeviceType::ALL.to_vec(),
            position: DevicePosition::Unspecified,
        }
    }
}

/// Still image encoding produced by a photo output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoCodec {
    Jpeg,
    Png,
}

/// Settings for a single photo capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSettings {
    pub id: Uuid,
    pub codec: PhotoCodec,
    /// JPEG quality, 1-100. Ignored for lossless codecs.
    pub quality: u8,
}

impl PhotoSettings {
    pub fn new(codec: PhotoCodec) -> Self {
        Self {
            id: Uuid::new_v4(),
            codec,
            quality: 90,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }
}

/// How the preview content fills its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoGravity {
    Resize,
    ResizeAspect,
    ResizeAspectFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

/// Axis-aligned rectangle in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A single RGB8 frame delivered by a device.
#[derive(Debug, Clone, Serialize)]
pub struct CameraFrame {
    pub id: Uuid,
    pub sequence: u64,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, device_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            data,
            width,
            height,
            device_id,
            timestamp: Utc::now(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// True when the buffer holds exactly `width * height` RGB pixels.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 3
    }
}
