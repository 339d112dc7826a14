//! Camera authorization status for the host platform.

use serde::{Deserialize, Serialize};

/// Permission status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
}

impl PermissionStatus {
    /// Whether device discovery may proceed. An undetermined status lets the
    /// platform prompt during discovery.
    pub fn allows_capture(self) -> bool {
        matches!(self, PermissionStatus::Granted | PermissionStatus::NotDetermined)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Detailed permission information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
}

/// Check camera permission status for the current platform
pub fn check_permission() -> PermissionStatus {
    check_permission_detailed().status
}

pub fn check_permission_detailed() -> PermissionInfo {
    #[cfg(target_os = "macos")]
    {
        check_permission_macos()
    }

    #[cfg(target_os = "linux")]
    {
        check_permission_linux()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        // Windows privacy settings surface as enumeration failures, so
        // discovery itself is the check.
        PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "Permission is checked during device discovery".to_string(),
        }
    }
}

#[cfg(target_os = "macos")]
fn check_permission_macos() -> PermissionInfo {
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};

    let Some(device_class) = Class::get("AVCaptureDevice") else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "AVFoundation not available".to_string(),
        };
    };
    let Some(string_class) = Class::get("NSString") else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "Foundation not available".to_string(),
        };
    };

    // AVMediaTypeVideo is the NSString "vide".
    let media_type = b"vide\0";
    let auth_status: i64 = unsafe {
        let media_type: *mut Object =
            msg_send![string_class, stringWithUTF8String: media_type.as_ptr()];
        msg_send![device_class, authorizationStatusForMediaType: media_type]
    };

    // AVAuthorizationStatus: 0 not determined, 1 restricted, 2 denied, 3 authorized
    match auth_status {
        3 => PermissionInfo {
            status: PermissionStatus::Granted,
            message: "Camera access authorized".to_string(),
        },
        2 => PermissionInfo {
            status: PermissionStatus::Denied,
            message: "Camera access denied - enable it in System Settings > Privacy & Security > Camera".to_string(),
        },
        1 => PermissionInfo {
            status: PermissionStatus::Restricted,
            message: "Camera access restricted by system policy".to_string(),
        },
        _ => PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "Camera permission not yet requested".to_string(),
        },
    }
}

#[cfg(target_os = "linux")]
fn check_permission_linux() -> PermissionInfo {
    use std::fs::OpenOptions;
    use std::path::Path;

    let video_devices: Vec<String> = (0..10)
        .map(|i| format!("/dev/video{}", i))
        .filter(|path| Path::new(path).exists())
        .collect();

    let Some(first_device) = video_devices.first() else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "No video devices found at /dev/video*".to_string(),
        };
    };

    match OpenOptions::new().read(true).open(first_device) {
        Ok(_) => PermissionInfo {
            status: PermissionStatus::Granted,
            message: format!("Camera access granted ({} readable)", first_device),
        },
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!(
                "Cannot open {} - add the user to the video group: sudo usermod -a -G video $USER",
                first_device
            ),
        },
        // Busy or transient errors are not a permission verdict.
        Err(e) => PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: format!("Cannot open {}: {}", first_device, e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_granted_and_undetermined_allow_capture() {
        assert!(PermissionStatus::Granted.allows_capture());
        assert!(PermissionStatus::NotDetermined.allows_capture());
        assert!(!PermissionStatus::Denied.allows_capture());
        assert!(!PermissionStatus::Restricted.allows_capture());
    }

    #[test]
    fn status_display_strings() {
        assert_eq!(PermissionStatus::NotDetermined.to_string(), "not_determined");
        assert_eq!(PermissionStatus::Granted.to_string(), "granted");
    }

    #[test]
    fn detailed_check_has_message() {
        let info = check_permission_detailed();
        assert!(!info.message.is_empty());
    }
}
