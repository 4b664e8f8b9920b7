use anyhow::bail;
use serde::Deserialize;

/// NVS 命名空间名最长 15 字节
const MAX_NAMESPACE_LEN: usize = 15;
/// WiFi SSID 最长 32 字节
const MAX_SSID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// SoftAP 名称
    pub portal_name: String,
    /// 保存凭据的 NVS 命名空间
    pub namespace: String,
    pub dns_port: u16,
    /// DNS 应答 TTL（秒）
    pub dns_ttl: u32,
    /// 成功页面返回后到重启之间的等待
    pub restart_delay_ms: u64,
    /// 服务循环每轮让出 CPU 的时间
    pub yield_ms: u64,
    pub ap_max_connections: u16,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            portal_name: "WiFi-Setup".to_string(),
            namespace: "wifi".to_string(),
            dns_port: 53,
            dns_ttl: 60,
            restart_delay_ms: 500,
            yield_ms: 10,
            ap_max_connections: 4,
        }
    }
}

impl PortalConfig {
    /// 编译期配置：`PORTAL_CONFIG`（JSON）优先，然后 `PORTAL_NAME` 覆盖 AP 名称
    pub fn from_build_env() -> anyhow::Result<Self> {
        static PORTAL_CONFIG: Option<&str> = std::option_env!("PORTAL_CONFIG");
        static PORTAL_NAME: Option<&str> = std::option_env!("PORTAL_NAME");

        Self::resolve(PORTAL_CONFIG, PORTAL_NAME)
    }

    fn resolve(json: Option<&str>, portal_name: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match json {
            Some(json) => Self::from_json(json)?,
            None => Self::default(),
        };

        if let Some(name) = portal_name {
            config.portal_name = name.to_string();
        }

        config.validate()?;
        log::info!("Portal config: {:?}", config);
        Ok(config)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Invalid portal config: {}", e))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.portal_name.is_empty() {
            bail!("Portal name cannot be empty");
        }
        if self.portal_name.len() > MAX_SSID_LEN {
            bail!("Portal name must be {} bytes or less", MAX_SSID_LEN);
        }
        if self.namespace.is_empty() || self.namespace.len() > MAX_NAMESPACE_LEN {
            bail!("Namespace must be 1 to {} bytes", MAX_NAMESPACE_LEN);
        }
        if self.ap_max_connections == 0 {
            bail!("AP must accept at least one connection");
        }
        Ok(())
    }
}
