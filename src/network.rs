//! STA 模式连接

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

use crate::store::Credentials;

pub fn wifi(
    credentials: &Credentials,
    modem: Modem,
    sysloop: EspSystemEventLoop,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    log::info!("Connecting to WiFi SSID {:?}", credentials.ssid);

    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), None)?, sysloop)?;

    let auth_method = if credentials.password.is_empty() {
        log::warn!("WiFi password is empty, using open network");
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let config = Configuration::Client(ClientConfiguration {
        ssid: credentials
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid SSID: {}", credentials.ssid))?,
        password: credentials
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid password format"))?,
        auth_method,
        ..Default::default()
    });

    wifi.set_configuration(&config)?;
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    log::info!("WiFi connected, IP: {}", ip_info.ip);

    Ok(wifi)
}
