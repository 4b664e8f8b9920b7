//! 配网会话
//!
//! 启动时检查凭据：已配置则直接返回给调用方去连 WiFi；
//! 否则开启 SoftAP、HTTP 和 DNS 劫持，一直服务到用户提交成功后重启。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::captive_portal::{CaptiveResponder, Portal, SessionEvent, SharedStore};
use crate::config::PortalConfig;
use crate::platform::{AccessPoint, Device, PortalService};
use crate::store::{CredentialStore, Credentials, KvPartition, KvStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Booting,
    /// 已有凭据，未开启任何服务
    Skipped,
    /// AP、HTTP、DNS 运行中，等待提交
    Provisioning,
    Restarting,
}

#[derive(Debug, PartialEq)]
pub enum SessionOutcome {
    /// 已配置，调用方用这组凭据连接 WiFi
    Configured(Credentials),
    /// 已保存新凭据并触发重启；真机上不会走到这里
    Restarting,
}

pub struct ProvisioningSession<P, A, H, D> {
    config: PortalConfig,
    partition: P,
    access_point: A,
    http: H,
    device: D,
    responder: CaptiveResponder,
    state: SessionState,
}

impl<P, A, H, D> ProvisioningSession<P, A, H, D>
where
    P: KvPartition,
    A: AccessPoint,
    H: PortalService<P::Namespace>,
    D: Device,
{
    pub fn new(config: PortalConfig, partition: P, access_point: A, http: H, device: D) -> Self {
        let responder = CaptiveResponder::new(config.dns_ttl);
        Self {
            config,
            partition,
            access_point,
            http,
            device,
            responder,
            state: SessionState::Booting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn into_access_point(self) -> A {
        self.access_point
    }

    pub fn run(&mut self) -> anyhow::Result<SessionOutcome> {
        self.state = SessionState::Booting;
        let store = CredentialStore::open(&self.partition, &self.config.namespace)?;

        if let Some(credentials) = store.load() {
            // 正常不会在运行，停一下无妨
            self.responder.stop();
            self.http.stop();
            store.close()?;

            self.state = SessionState::Skipped;
            log::info!(
                "Found credentials for SSID {:?}, skipping provisioning",
                credentials.ssid
            );
            return Ok(SessionOutcome::Configured(credentials));
        }

        log::info!("No credentials stored, starting provisioning");
        self.state = SessionState::Provisioning;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared: SharedStore<P::Namespace> = Arc::new(Mutex::new(Some(store)));

        if let Err(e) = self.start_services(shared.clone(), tx) {
            log::error!("Failed to start provisioning services: {:?}", e);
            self.stop_services();
            close_shared(&shared)?;
            return Err(e);
        }

        if let Err(e) = self.serve_until_restart(rx) {
            self.stop_services();
            close_shared(&shared)?;
            return Err(e);
        }

        // 成功页面已经发出，热点保持到延时结束，让客户端收完
        self.state = SessionState::Restarting;
        self.device
            .delay(Duration::from_millis(self.config.restart_delay_ms));
        self.stop_services();
        // Portal 成功时已经关闭存储
        close_shared(&shared)?;
        self.device.restart();
        Ok(SessionOutcome::Restarting)
    }

    /// 依次启动 AP、HTTP、DNS
    fn start_services(
        &mut self,
        store: SharedStore<P::Namespace>,
        events: UnboundedSender<SessionEvent>,
    ) -> anyhow::Result<()> {
        let address = self.access_point.start(&self.config.portal_name)?;
        log::info!("Access point {:?} up at {}", self.config.portal_name, address);

        self.http.start(Portal::new(store, events))?;
        self.responder.start(self.config.dns_port, "*", address)?;
        Ok(())
    }

    /// 服务循环，唯一的出口是提交成功
    fn serve_until_restart(
        &mut self,
        mut events: UnboundedReceiver<SessionEvent>,
    ) -> anyhow::Result<()> {
        let pause = Duration::from_millis(self.config.yield_ms);
        loop {
            self.responder.pump();

            match events.try_recv() {
                Ok(SessionEvent::Restart) => {
                    log::info!("Received config event");
                    return Ok(());
                }
                Err(TryRecvError::Empty) => self.device.yield_now(pause),
                Err(TryRecvError::Disconnected) => {
                    anyhow::bail!("HTTP server dropped the portal")
                }
            }
        }
    }

    fn stop_services(&mut self) {
        self.responder.stop();
        self.http.stop();
        if let Err(e) = self.access_point.stop() {
            log::warn!("Failed to stop access point: {:?}", e);
        }
    }
}

fn close_shared<N: KvStore>(shared: &SharedStore<N>) -> anyhow::Result<()> {
    let store = shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(store) = store {
        store.close()?;
    }
    Ok(())
}
