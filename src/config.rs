use std::{net, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub store: Store,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub notify: Notify,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Store {
    Postgres(Db),
    /// Volatile, for local runs and tests.
    Memory,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Notify {
    #[default]
    Log,
    Webhook(Webhook),
}

#[derive(Deserialize)]
pub struct Webhook {
    pub url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: time::Duration,
}

fn default_timeout() -> time::Duration {
    time::Duration::from_secs(5)
}
