use std::error::Error;
use std::sync::Arc;

use meteo_service::config::{ServiceConfig, DEFAULT_CONFIG_PATH};
use meteo_service::logging::{self, init_logger, Component};
use meteo_service::push::PushConfig;
use meteo_service::store::{PgStore, ReadingStore};
use meteo_service::{http, push};

fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ServiceConfig::load(&config_path)?;

    init_logger(
        config.logging.min_level()?,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    logging::info(Component::System, None, &format!("configuration loaded from {}", config_path));

    let store = Arc::new(PgStore::new(&config.database));
    if let Err(e) = store.verify_schema() {
        logging::error(Component::Database, None, &format!("schema check failed: {}", e));
        return Err(e.into());
    }
    logging::info(Component::Database, None, "database schema verified");

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(&config, store.clone()));

    // Pooled clients own their own runtime and must be dropped outside this one.
    drop(runtime);
    drop(store);

    result
}

async fn run(config: &ServiceConfig, store: Arc<dyn ReadingStore>) -> Result<(), Box<dyn Error>> {
    let push_listener = tokio::net::TcpListener::bind(config.server.push_addr()).await?;
    let http_listener = tokio::net::TcpListener::bind(config.server.http_addr()).await?;

    let push_config = PushConfig {
        min_message_interval: config.server.min_message_interval(),
    };

    tokio::select! {
        result = push::serve(push_listener, store.clone(), push_config) => result?,
        result = http::serve_http(http_listener, store) => result?,
        _ = tokio::signal::ctrl_c() => {
            logging::info(Component::System, None, "shutting down");
        }
    }

    Ok(())
}
