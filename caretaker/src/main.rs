use anyhow::Result;
use caretaker::web::start_web_server;
use caretaker::{App, ConfigManager};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("caretaker=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting caretaker");

    let config_manager = ConfigManager::from_env().await?;
    let config = config_manager.get_current_config();
    info!(
        "Configuration loaded from {}: {} backups, {} certificate checks, {} pipelines",
        config_manager.config_dir().display(),
        config.backups.len(),
        config.certificates.len(),
        config.pipelines.len()
    );

    let mut app = App::build(config.clone()).await?;
    app.start().await?;
    info!("Engine and cron trigger started");

    let state = app.state();
    tokio::select! {
        result = start_web_server(state, &config.host, config.port) => {
            if let Err(e) = result {
                error!("Web server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    if let Err(e) = app.shutdown().await {
        error!("Cron trigger did not stop cleanly: {}", e);
    }
    info!("caretaker stopped");
    Ok(())
}
