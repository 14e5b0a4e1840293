//! Camera and microphone authorization
//!
//! `PermissionGate` asks an [`AuthorizationProvider`] for both media kinds at
//! once and resolves only after both requests have answered.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

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

/// Media kind an authorization applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "camera",
            MediaKind::Audio => "microphone",
        }
    }
}

/// Detailed permission information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
    pub can_request: bool,
}

impl PermissionInfo {
    pub fn new(status: PermissionStatus, message: impl Into<String>, can_request: bool) -> Self {
        Self {
            status,
            message: message.into(),
            can_request,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.status == PermissionStatus::Granted
    }
}

/// OS-level authorization queries. `request` may block on a system prompt.
pub trait AuthorizationProvider: Send + Sync + 'static {
    fn status(&self, kind: MediaKind) -> PermissionInfo;
    fn request(&self, kind: MediaKind) -> PermissionInfo;
}

/// Result of one joined authorization round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationOutcome {
    pub camera_granted: bool,
    pub microphone_granted: bool,
}

impl AuthorizationOutcome {
    pub fn all_granted(&self) -> bool {
        self.camera_granted && self.microphone_granted
    }
}

/// Published authorization flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub camera_granted: bool,
    pub microphone_granted: bool,
    /// Set when either request was denied and the UI must explain why
    pub needs_permission_prompt: bool,
}

pub struct PermissionGate {
    provider: Arc<dyn AuthorizationProvider>,
    state: watch::Sender<AuthorizationState>,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn AuthorizationProvider>) -> Self {
        let (state, _) = watch::channel(AuthorizationState::default());
        Self { provider, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthorizationState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> AuthorizationState {
        *self.state.borrow()
    }

    /// Request camera and microphone access concurrently and wait for both.
    pub async fn request_authorization(&self) -> AuthorizationOutcome {
        let camera = resolve(self.provider.clone(), MediaKind::Video);
        let microphone = resolve(self.provider.clone(), MediaKind::Audio);
        let (camera_granted, microphone_granted) = tokio::join!(camera, microphone);

        let outcome = AuthorizationOutcome {
            camera_granted,
            microphone_granted,
        };

        if outcome.all_granted() {
            log::info!("Camera and microphone access granted");
        } else {
            log::warn!(
                "Capture authorization incomplete (camera: {}, microphone: {})",
                camera_granted,
                microphone_granted
            );
        }

        self.state.send_replace(AuthorizationState {
            camera_granted,
            microphone_granted,
            needs_permission_prompt: !outcome.all_granted(),
        });

        outcome
    }
}

async fn resolve(provider: Arc<dyn AuthorizationProvider>, kind: MediaKind) -> bool {
    let task = tokio::task::spawn_blocking(move || {
        let current = provider.status(kind);
        if current.is_granted() {
            log::debug!("{} permission already granted", kind.as_str());
            return current;
        }
        if !current.can_request {
            log::warn!("Cannot request {} permission: {}", kind.as_str(), current.message);
            return current;
        }
        log::info!("Requesting {} permission", kind.as_str());
        provider.request(kind)
    });

    match task.await {
        Ok(info) => info.is_granted(),
        Err(e) => {
            log::error!("{} permission request panicked: {}", kind.as_str(), e);
            false
        }
    }
}

/// Authorization backed by the host operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAuthorization;

impl AuthorizationProvider for SystemAuthorization {
    fn status(&self, kind: MediaKind) -> PermissionInfo {
        check_permission_detailed(kind)
    }

    fn request(&self, kind: MediaKind) -> PermissionInfo {
        #[cfg(target_os = "macos")]
        {
            macos::request_access(kind)
        }

        #[cfg(target_os = "windows")]
        {
            let _ = kind;
            PermissionInfo::new(
                PermissionStatus::NotDetermined,
                "Enable access in Windows Settings > Privacy > Camera and Microphone",
                false,
            )
        }

        #[cfg(target_os = "linux")]
        {
            let hint = match kind {
                MediaKind::Video => "Run: sudo usermod -a -G video $USER && newgrp video",
                MediaKind::Audio => "Run: sudo usermod -a -G audio $USER && newgrp audio",
            };
            PermissionInfo::new(PermissionStatus::NotDetermined, hint, false)
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            let _ = kind;
            PermissionInfo::new(PermissionStatus::NotDetermined, "Platform not supported", false)
        }
    }
}

/// Check permission status for one media kind on the current platform
pub fn check_permission_detailed(kind: MediaKind) -> PermissionInfo {
    #[cfg(target_os = "windows")]
    {
        check_permission_windows(kind)
    }

    #[cfg(target_os = "macos")]
    {
        macos::check_access(kind)
    }

    #[cfg(target_os = "linux")]
    {
        check_permission_linux(kind)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = kind;
        PermissionInfo::new(PermissionStatus::NotDetermined, "Platform not supported", false)
    }
}

#[cfg(target_os = "windows")]
fn check_permission_windows(kind: MediaKind) -> PermissionInfo {
    use nokhwa::query;

    match kind {
        // Enumeration succeeds only when the privacy settings allow camera access
        MediaKind::Video => match query(nokhwa::utils::ApiBackend::Auto) {
            Ok(devices) if !devices.is_empty() => PermissionInfo::new(
                PermissionStatus::Granted,
                "Camera access granted via Windows Privacy settings",
                false,
            ),
            Ok(_) => PermissionInfo::new(
                PermissionStatus::NotDetermined,
                "No cameras found - permission may not be granted",
                true,
            ),
            Err(e) => PermissionInfo::new(
                PermissionStatus::Denied,
                format!("Camera access denied: {}", e),
                true,
            ),
        },
        MediaKind::Audio => PermissionInfo::new(
            PermissionStatus::Granted,
            "Microphone access governed by Windows Privacy settings",
            false,
        ),
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{MediaKind, PermissionInfo, PermissionStatus};
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};
    use std::ffi::CString;
    use std::time::Duration;

    #[link(name = "AVFoundation", kind = "framework")]
    extern "C" {}

    fn media_type_code(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Video => "vide",
            MediaKind::Audio => "soun",
        }
    }

    unsafe fn media_type(kind: MediaKind) -> Option<*mut Object> {
        let ns_string = Class::get("NSString")?;
        let code = CString::new(media_type_code(kind)).ok()?;
        let value: *mut Object = msg_send![ns_string, stringWithUTF8String: code.as_ptr()];
        Some(value)
    }

    pub(super) fn check_access(kind: MediaKind) -> PermissionInfo {
        unsafe {
            let (Some(device_class), Some(media_type)) =
                (Class::get("AVCaptureDevice"), media_type(kind))
            else {
                return PermissionInfo::new(
                    PermissionStatus::NotDetermined,
                    "AVFoundation not available",
                    false,
                );
            };

            let auth_status: i64 =
                msg_send![device_class, authorizationStatusForMediaType: media_type];

            // AVAuthorizationStatus: 0 NotDetermined, 1 Restricted, 2 Denied, 3 Authorized
            match auth_status {
                3 => PermissionInfo::new(
                    PermissionStatus::Granted,
                    format!("{} access authorized", kind.as_str()),
                    false,
                ),
                2 => PermissionInfo::new(
                    PermissionStatus::Denied,
                    format!(
                        "{} access denied - enable in System Settings > Privacy & Security",
                        kind.as_str()
                    ),
                    false,
                ),
                1 => PermissionInfo::new(
                    PermissionStatus::Restricted,
                    format!("{} access restricted by system policy", kind.as_str()),
                    false,
                ),
                _ => PermissionInfo::new(
                    PermissionStatus::NotDetermined,
                    format!("{} permission not yet requested", kind.as_str()),
                    true,
                ),
            }
        }
    }

    pub(super) fn request_access(kind: MediaKind) -> PermissionInfo {
        use block::ConcreteBlock;
        use std::sync::mpsc;

        unsafe {
            let (Some(device_class), Some(media_type)) =
                (Class::get("AVCaptureDevice"), media_type(kind))
            else {
                return PermissionInfo::new(
                    PermissionStatus::NotDetermined,
                    "AVFoundation not available",
                    false,
                );
            };

            let (tx, rx) = mpsc::channel();
            let handler = ConcreteBlock::new(move |granted: bool| {
                let _ = tx.send(granted);
            });
            let handler = handler.copy();

            let _: () = msg_send![device_class, requestAccessForMediaType: media_type completionHandler: &*handler];

            match rx.recv_timeout(Duration::from_secs(60)) {
                Ok(true) => {
                    log::info!("{} permission granted", kind.as_str());
                    PermissionInfo::new(
                        PermissionStatus::Granted,
                        format!("{} access authorized", kind.as_str()),
                        false,
                    )
                }
                Ok(false) => {
                    log::warn!("{} permission denied", kind.as_str());
                    PermissionInfo::new(
                        PermissionStatus::Denied,
                        format!("{} access denied by user", kind.as_str()),
                        false,
                    )
                }
                Err(_) => {
                    log::error!("{} permission request timed out", kind.as_str());
                    PermissionInfo::new(
                        PermissionStatus::NotDetermined,
                        "Permission request timed out",
                        true,
                    )
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn check_permission_linux(kind: MediaKind) -> PermissionInfo {
    use std::path::Path;

    let (device_paths, group): (Vec<String>, &str) = match kind {
        MediaKind::Video => ((0..10).map(|i| format!("/dev/video{}", i)).collect(), "video"),
        MediaKind::Audio => (vec!["/dev/snd".to_string()], "audio"),
    };

    let Some(first_device) = device_paths.iter().find(|p| Path::new(p.as_str()).exists()) else {
        return PermissionInfo::new(
            PermissionStatus::NotDetermined,
            format!("No {} devices found", kind.as_str()),
            false,
        );
    };

    match std::fs::metadata(first_device) {
        Ok(_) if check_linux_group_membership(group) => PermissionInfo::new(
            PermissionStatus::Granted,
            format!("{} access granted ({} group, {} found)", kind.as_str(), group, first_device),
            false,
        ),
        Ok(_) => PermissionInfo::new(
            PermissionStatus::Denied,
            format!(
                "{} exists but user not in {} group - run: sudo usermod -a -G {} $USER",
                first_device, group, group
            ),
            true,
        ),
        Err(e) => PermissionInfo::new(
            PermissionStatus::Denied,
            format!("Cannot access {}: {}", first_device, e),
            true,
        ),
    }
}

#[cfg(target_os = "linux")]
fn check_linux_group_membership(group: &str) -> bool {
    use std::process::Command;

    let Ok(output) = Command::new("groups").output() else {
        return false;
    };
    String::from_utf8(output.stdout)
        .map(|groups| groups.split_whitespace().any(|g| g == group || g == "plugdev"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedAuthorization;

    #[tokio::test]
    async fn test_gate_grants_when_both_granted() {
        let gate = PermissionGate::new(Arc::new(SimulatedAuthorization::granting()));
        let outcome = gate.request_authorization().await;
        assert!(outcome.all_granted());
        assert!(!gate.current().needs_permission_prompt);
    }

    #[tokio::test]
    async fn test_gate_flags_prompt_on_microphone_denial() {
        let provider = SimulatedAuthorization::new(PermissionStatus::Granted, PermissionStatus::Denied);
        let gate = PermissionGate::new(Arc::new(provider));
        let outcome = gate.request_authorization().await;

        assert!(outcome.camera_granted);
        assert!(!outcome.microphone_granted);
        assert!(gate.current().needs_permission_prompt);
    }

    #[tokio::test]
    async fn test_gate_waits_for_slow_request() {
        let provider = SimulatedAuthorization::granting()
            .with_request_delay(MediaKind::Audio, std::time::Duration::from_millis(50))
            .undetermined();
        let provider = Arc::new(provider);
        let gate = PermissionGate::new(provider.clone());

        let outcome = gate.request_authorization().await;
        assert!(outcome.all_granted());
        assert_eq!(provider.request_count(), 2);
    }

    #[test]
    fn test_system_status_does_not_panic() {
        let info = SystemAuthorization.status(MediaKind::Video);
        assert!(!info.message.is_empty());
    }
}
