use std::sync::Arc;

use crawl_jsonrpc::{
    host::{crawler::Crawler, settings::Settings, spider::Spider},
    logging,
    service::{EngineHooks, WebService},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let settings = Settings::from_env();
    let spider = Spider::from_settings(&settings)?;
    let crawler = Arc::new(Crawler::new(settings, spider));

    let mut service = match WebService::from_crawler(&crawler) {
        Ok(service) => service,
        Err(err) if err.is_not_configured() => {
            info!("web service not configured, set JSONRPC_ENABLED=1 to enable it");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    crawler.crawl();
    service.on_engine_started().await?;

    let mut running = crawler.engine().subscribe();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupt received");
            crawler.stop();
        }
        _ = running.wait_for(|running| !running) => {}
    }

    service.on_engine_stopped().await?;
    Ok(())
}
