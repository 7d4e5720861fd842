use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use ezbill::{
    config::{BackendKind, Config},
    routes::{self, AppState},
    store::{Backend, MemoryBackend, MongoBackend},
    SplitClient,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env().map_err(|err| {
        error!(error = %err, "Invalid configuration");
        io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let backend: Arc<dyn Backend> = match &config.backend {
        BackendKind::Mongo { uri, database } => {
            info!(database = %database, "Using MongoDB backend");
            let backend = MongoBackend::connect(uri, database).await.map_err(|err| {
                error!(error = %err, "Failed to connect to MongoDB");
                io::Error::new(io::ErrorKind::ConnectionRefused, err.to_string())
            })?;
            Arc::new(backend)
        }
        BackendKind::Memory => {
            info!("Using in-memory backend, data is lost on exit");
            Arc::new(MemoryBackend::new())
        }
    };

    let client = SplitClient::new(backend).with_import_retry(config.import_retry);
    let state = web::Data::new(AppState::new(client));

    info!(bind = %config.bind, "Listening");
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
