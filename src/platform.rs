//! 配网会话依赖的外部协作者
//!
//! ESP-IDF 下由 SoftAP、`EspHttpServer` 和 FreeRTOS 实现，测试中用假实现替换。

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::captive_portal::Portal;
use crate::store::KvStore;

pub trait AccessPoint {
    /// 以 `name` 为 SSID 开启热点，返回 AP 自身地址
    fn start(&mut self, name: &str) -> anyhow::Result<Ipv4Addr>;

    fn stop(&mut self) -> anyhow::Result<()>;
}

/// HTTP 引擎：把请求交给 [`Portal`] 处理并写回页面
pub trait PortalService<N: KvStore> {
    fn start(&mut self, portal: Portal<N>) -> anyhow::Result<()>;

    /// 未启动时调用也是安全的
    fn stop(&mut self);
}

pub trait Device {
    /// 让出 CPU，给网络栈处理自己的任务
    fn yield_now(&mut self, pause: Duration);

    fn delay(&mut self, duration: Duration);

    /// 硬重启，真机上不会返回
    fn restart(&mut self);
}

#[cfg(target_os = "espidf")]
pub struct EspDevice;

#[cfg(target_os = "espidf")]
impl Device for EspDevice {
    fn yield_now(&mut self, pause: Duration) {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(pause.as_millis() as u32);
    }

    fn delay(&mut self, duration: Duration) {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(duration.as_millis() as u32);
    }

    fn restart(&mut self) {
        log::info!("Restarting...");
        unsafe { esp_idf_svc::sys::esp_restart() }
    }
}
