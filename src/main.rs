use anyhow::Result;
use ladning::auth::{AuthSession, ConsentResolver, EaseeAuthenticator, TeslaAuthenticator};
use ladning::charger::EaseeChargerClient;
use ladning::driver::ControlLoop;
use ladning::prices::{BoliusPriceClient, PriceCache};
use ladning::token_cache::TokenCache;
use ladning::vehicle::TeslaVehicleClient;
use ladning::{Config, http, logging};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;
    logging::init_logging(&config.logging)?;

    info!("Ladning {} starting up", env!("LADNING_VERSION"));

    let http = http::build_client(Duration::from_millis(config.control.request_timeout_ms))?;
    let cache = Arc::new(TokenCache::new(&config.auth.token_cache_file));
    let consent = ConsentResolver::from_mode(config.auth.interactive);
    let margin = Duration::from_secs(config.auth.refresh_margin_secs);
    info!(
        "Token cache at {}, interactive login {}",
        cache.path().display(),
        if consent.is_available() { "available" } else { "unavailable" }
    );

    let tesla = Arc::new(AuthSession::new(
        Arc::new(TeslaAuthenticator::new(http.clone(), config.tesla.clone())),
        cache.clone(),
        consent.clone(),
        margin,
    ));
    let easee = Arc::new(AuthSession::new(
        Arc::new(EaseeAuthenticator::new(http.clone(), config.easee.clone())),
        cache,
        consent,
        margin,
    ));
    let vehicle = Arc::new(TeslaVehicleClient::new(http.clone(), &config.tesla));
    let charger = Arc::new(EaseeChargerClient::new(http.clone(), &config.easee));

    let cancel = CancellationToken::new();
    let mut control = ControlLoop::new(
        config.clone(),
        tesla,
        easee,
        vehicle,
        charger,
        cancel.clone(),
    );
    if config.prices.enabled {
        let source = Arc::new(BoliusPriceClient::new(http, &config.prices)?);
        control = control.with_prices(PriceCache::new(
            source,
            Duration::from_secs(config.prices.refresh_interval_secs),
        ));
    }

    if let Err(e) = control.preflight().await {
        error!("{}", e);
        eprintln!("ladning: {}", e);
        std::process::exit(2);
    }

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        signal_cancel.cancel();
    });

    let web_task = if config.web.enabled {
        let snapshot = control.subscribe_snapshot();
        let host = config.web.host.clone();
        let port = config.web.port;
        let shutdown = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = ladning::web::serve(snapshot, &host, port, shutdown).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    let result = control.run().await;
    cancel.cancel();
    if let Some(task) = web_task {
        let _ = task.await;
    }

    match result {
        Ok(()) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
