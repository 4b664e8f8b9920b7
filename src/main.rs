#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::gpio::{PinDriver, Pull};
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use wifi_portal::captive_portal::{PortalHttpServer, SoftAp};
    use wifi_portal::platform::{Device, EspDevice};
    use wifi_portal::{CredentialStore, PortalConfig, ProvisioningSession, SessionOutcome};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let peripherals = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = EspDefaultNvsPartition::take()?;
    let config = PortalConfig::from_build_env()?;

    // 上电时按住 BOOT 键：清除凭据，强制进入配网
    let mut button = PinDriver::input(peripherals.pins.gpio0)?;
    button.set_pull(Pull::Up)?;
    if button.is_low() {
        log::warn!("Boot button held, clearing stored credentials");
        let mut store = CredentialStore::open(&partition, &config.namespace)?;
        store.clear()?;
        store.close()?;
    }

    let restart_delay = std::time::Duration::from_millis(config.restart_delay_ms);
    let access_point = SoftAp::new(peripherals.modem, sysloop.clone(), config.ap_max_connections);
    let mut session = ProvisioningSession::new(
        config.clone(),
        partition.clone(),
        access_point,
        PortalHttpServer::new(),
        EspDevice,
    );

    let credentials = match session.run() {
        Ok(SessionOutcome::Configured(credentials)) => credentials,
        Ok(SessionOutcome::Restarting) => return Ok(()),
        Err(e) => {
            log::error!("Provisioning failed: {:?}", e);
            EspDevice.delay(restart_delay);
            EspDevice.restart();
            return Err(e);
        }
    };

    let modem = session
        .into_access_point()
        .into_modem()
        .ok_or_else(|| anyhow::anyhow!("modem was consumed by the access point"))?;

    let _wifi = match wifi_portal::network::wifi(&credentials, modem, sysloop) {
        Ok(wifi) => wifi,
        Err(e) => {
            log::error!("Failed to connect to wifi: {:?}", e);
            log::info!("Press BOOT to clear credentials and open the setup portal");
            while button.is_high() {
                FreeRtos::delay_ms(100);
            }
            let mut store = CredentialStore::open(&partition, &config.namespace)?;
            store.clear()?;
            store.close()?;
            EspDevice.restart();
            return Err(e);
        }
    };

    log::info!("Network ready");
    loop {
        FreeRtos::delay_ms(1000);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    env_logger::init();
    log::error!(
        "wifi-portal is ESP-IDF firmware; build it for an espidf target (e.g. xtensa-esp32s3-espidf)"
    );
    std::process::exit(1);
}
