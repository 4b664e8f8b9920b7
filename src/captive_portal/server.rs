//! HTTP 服务器和 SoftAP 管理

use std::net::Ipv4Addr;

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    http::{
        server::{Configuration, EspHttpConnection, EspHttpServer, Request},
        Method,
    },
    io::{Read, Write},
    ipv4::{self, Mask, Subnet},
    netif::{EspNetif, NetifConfiguration, NetifStack},
    wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, Configuration as WifiConfig, EspWifi,
        WifiDriver,
    },
};

use super::handlers::{read_body, HttpMethod, Portal, CONTENT_TYPE};
use crate::platform::{AccessPoint, PortalService};
use crate::store::KvStore;

/// AP 模式的固定 IP 地址
pub const AP_IP: ipv4::Ipv4Addr = ipv4::Ipv4Addr::new(192, 168, 4, 1);
const AP_GATEWAY: ipv4::Ipv4Addr = ipv4::Ipv4Addr::new(192, 168, 4, 1);
const AP_NETMASK: Mask = Mask(24);

/// `/` 和 `/config` 之外的请求，不论方法都交给通配路由
const CATCH_ALL_METHODS: [Method; 33] = [
    Method::Delete,
    Method::Get,
    Method::Head,
    Method::Post,
    Method::Put,
    Method::Connect,
    Method::Options,
    Method::Trace,
    Method::Copy,
    Method::Lock,
    Method::MkCol,
    Method::Move,
    Method::Propfind,
    Method::Proppatch,
    Method::Search,
    Method::Unlock,
    Method::Bind,
    Method::Rebind,
    Method::Unbind,
    Method::Acl,
    Method::Report,
    Method::MkActivity,
    Method::Checkout,
    Method::Merge,
    Method::MSearch,
    Method::Notify,
    Method::Subscribe,
    Method::Unsubscribe,
    Method::Patch,
    Method::Purge,
    Method::MkCalendar,
    Method::Link,
    Method::Unlink,
];

pub struct SoftAp {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
    max_connections: u16,
    wifi: Option<BlockingWifi<EspWifi<'static>>>,
}

impl SoftAp {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop, max_connections: u16) -> Self {
        Self {
            modem: Some(modem),
            sysloop,
            max_connections,
            wifi: None,
        }
    }

    /// 未开启热点时取回 modem，交给 STA 连接使用
    pub fn into_modem(self) -> Option<Modem> {
        self.modem
    }
}

impl AccessPoint for SoftAp {
    fn start(&mut self, name: &str) -> anyhow::Result<Ipv4Addr> {
        let modem = self
            .modem
            .take()
            .ok_or_else(|| anyhow::anyhow!("modem is already in use"))?;

        // 配置 AP 网络接口，DHCP 下发的 DNS 指向 AP 自己
        let ap_netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway: AP_GATEWAY,
                    mask: AP_NETMASK,
                },
                dhcp_enabled: true,
                dns: Some(AP_IP),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };

        let ap_netif = EspNetif::new_with_conf(&ap_netif_config)?;
        let driver = WifiDriver::new(modem, self.sysloop.clone(), None)?;
        // AP 模式用不到 STA netif，但 wrap_all 需要
        let sta_netif = EspNetif::new(NetifStack::Sta)?;

        let mut wifi = BlockingWifi::wrap(
            EspWifi::wrap_all(driver, sta_netif, ap_netif)?,
            self.sysloop.clone(),
        )?;

        let ap_config = AccessPointConfiguration {
            ssid: name
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid portal name: {}", name))?,
            ssid_hidden: false,
            channel: 1,
            auth_method: AuthMethod::None,
            max_connections: self.max_connections,
            ..Default::default()
        };

        wifi.set_configuration(&WifiConfig::AccessPoint(ap_config))?;
        wifi.start()?;
        log::info!("SoftAP started: {}", name);

        self.wifi = Some(wifi);
        Ok(Ipv4Addr::from(AP_IP.octets()))
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(mut wifi) = self.wifi.take() {
            wifi.stop()?;
            log::info!("SoftAP stopped");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PortalHttpServer {
    server: Option<EspHttpServer<'static>>,
}

impl PortalHttpServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<N: KvStore + Send + 'static> PortalService<N> for PortalHttpServer {
    fn start(&mut self, portal: Portal<N>) -> anyhow::Result<()> {
        let config = Configuration {
            stack_size: 8192,
            max_uri_handlers: CATCH_ALL_METHODS.len() + 2,
            uri_match_wildcard: true,
            ..Default::default()
        };

        let mut server = EspHttpServer::new(&config)?;
        register_routes(&mut server, portal)?;
        log::info!("HTTP server started on {}:80", AP_IP);

        self.server = Some(server);
        Ok(())
    }

    fn stop(&mut self) {
        if self.server.take().is_some() {
            log::info!("HTTP server stopped");
        }
    }
}

/// 注册路由；通配路由必须最后注册，httpd 按注册顺序匹配
fn register_routes<N: KvStore + Send + 'static>(
    server: &mut EspHttpServer<'static>,
    portal: Portal<N>,
) -> anyhow::Result<()> {
    let index = portal.clone();
    server.fn_handler("/", Method::Get, move |req| serve(req, &index))?;

    let config = portal.clone();
    server.fn_handler("/config", Method::Post, move |req| serve(req, &config))?;

    // Captive Portal：其它路径都返回配网表单
    for method in CATCH_ALL_METHODS {
        let catch_all = portal.clone();
        server.fn_handler("/*", method, move |req| serve(req, &catch_all))?;
    }

    Ok(())
}

fn serve<N: KvStore>(
    mut req: Request<&mut EspHttpConnection<'_>>,
    portal: &Portal<N>,
) -> anyhow::Result<()> {
    let method = match req.method() {
        Method::Get => HttpMethod::Get,
        Method::Post => HttpMethod::Post,
        _ => HttpMethod::Other,
    };
    let uri = req.uri().to_string();
    let content_type = req.header("Content-Type").map(str::to_string);
    let body = read_body(|buf| req.read(buf))?;

    let reply = portal.handle(method, &uri, content_type.as_deref(), &body);

    let written = req
        .into_response(reply.status, None, &[("Content-Type", CONTENT_TYPE)])
        .and_then(|mut resp| resp.write_all(reply.page.html().as_bytes()));

    // 凭据已经落盘，客户端断开也要重启
    portal.finish(reply);
    written?;
    Ok(())
}
