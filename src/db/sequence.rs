use async_trait::async_trait;

use super::{Client, Error};

pub const SOLICITUD_SEQUENCE: &str = "SOLICITUD_SEQUENCE";
pub const TICKET_SEQUENCE: &str = "TICKET_SEQUENCE";
pub const FACTURA_SEQUENCE: &str = "FACTURA_SEQUENCE";

/// Named monotonically increasing counters.
#[async_trait]
pub trait Sequences: Send + Sync {
    /// Atomically increments `counter` and returns its new value, starting
    /// at `1` for an unknown counter. Consumed values are never handed out
    /// again, even if the caller fails afterwards.
    async fn next_value(&self, counter: &str) -> Result<i64, Error>;
}

#[async_trait]
impl Sequences for Client {
    async fn next_value(&self, counter: &str) -> Result<i64, Error> {
        const SQL: &str = "\
            INSERT INTO sequences (name, value) \
            VALUES ($1, 1) \
            ON CONFLICT (name) DO UPDATE \
            SET value = sequences.value + 1 \
            RETURNING value";
        Ok(self.0.query_one(SQL, &[&counter]).await?.get("value"))
    }
}
