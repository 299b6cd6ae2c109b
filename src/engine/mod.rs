//! Lifecycle engines: the only entry points that mutate the stores.

pub mod factura;
pub mod solicitud;
pub mod ticket;

use std::sync::Arc;

use time::{Date, OffsetDateTime, Time};

use crate::{db::Store, notify::Notifier};

pub use self::{factura::Facturas, solicitud::Solicitudes, ticket::Tickets};

/// Attempts of a read-validate-write cycle before giving up on an entity that
/// keeps changing underneath.
const MAX_ATTEMPTS: usize = 8;

/// The three engines wired over one store.
#[derive(Clone)]
pub struct Taller {
    pub solicitudes: Solicitudes,
    pub tickets: Tickets,
    pub facturas: Facturas,
}

impl Taller {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        let tickets = Tickets::new(Arc::clone(&store), Arc::clone(&notifier));
        Self {
            solicitudes: Solicitudes::new(
                Arc::clone(&store),
                Arc::clone(&notifier),
                tickets.clone(),
            ),
            facturas: Facturas::new(store, notifier),
            tickets,
        }
    }
}

/// Server-side creation stamp.
fn ahora() -> (Date, Time) {
    let now = OffsetDateTime::now_utc();
    (now.date(), now.time())
}

fn no_blank(field: &str, value: &str) -> Result<(), crate::Error> {
    if value.trim().is_empty() {
        return Err(crate::Error::validation(format!("{field} is blank")));
    }
    Ok(())
}

fn check_rango(desde: Option<Date>, hasta: Option<Date>) -> Result<(), crate::Error> {
    match (desde, hasta) {
        (Some(desde), Some(hasta)) if desde > hasta => Err(
            crate::Error::validation(format!(
                "date range starts ({desde}) after it ends ({hasta})",
            )),
        ),
        _ => Ok(()),
    }
}
