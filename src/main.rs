use std::{error::Error, sync::Arc};

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use taller::{config, db, engine::Taller, http, notify, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let store: Arc<dyn db::Store> = match &config.store {
        config::Store::Postgres(db_config) => {
            let (db_client, db_connection) = db::connect(db_config).await?;

            task::spawn(async move {
                if let Err(e) = db_connection.await {
                    panic!("database connection failed: {e}");
                }
            });

            db_client.bootstrap_schema().await?;
            Arc::new(db_client)
        }
        config::Store::Memory => {
            info!("using volatile in-memory store");
            Arc::new(db::Memory::new())
        }
    };
    let notifier = notify::from_config(&config.notify);

    let origins = config
        .http
        .cors
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_origin(origins);

    let app = http::router(http::AppState::new(
        Taller::new(store, notifier),
        &config.jwt.secret,
    ))
    .layer(cors);

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    info!(addr = %config.http.server.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
