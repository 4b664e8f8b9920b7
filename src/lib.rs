//! 无屏设备的 WiFi 配网
//!
//! 没有凭据时开启 SoftAP + Captive Portal，用户在浏览器里提交 SSID 和密码，
//! 写入 NVS 后重启；已有凭据时直接交还给调用方连接 WiFi。

pub mod captive_portal;
pub mod config;
#[cfg(target_os = "espidf")]
pub mod network;
pub mod platform;
pub mod session;
pub mod store;

pub use config::PortalConfig;
pub use session::{ProvisioningSession, SessionOutcome, SessionState};
pub use store::{CredentialStore, Credentials};
