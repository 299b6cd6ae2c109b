use std::collections::HashMap;

use async_trait::async_trait;
use itertools::Itertools as _;
use tokio::sync::Mutex;

use super::{
    factura, sequence::Sequences, solicitud, ticket, Error, Factura,
    FacturaStore, Solicitud, SolicitudStore, Ticket, TicketStore,
};

/// Volatile [`super::Store`] with the same guarantees as the PostgreSQL one:
/// atomic counters, version-guarded writes, one invoice per ticket.
#[derive(Debug, Default)]
pub struct Memory {
    sequences: Mutex<HashMap<String, i64>>,
    solicitudes: Mutex<HashMap<solicitud::Id, Solicitud>>,
    tickets: Mutex<HashMap<ticket::Id, Ticket>>,
    facturas: Mutex<HashMap<factura::Id, Factura>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sequences for Memory {
    async fn next_value(&self, counter: &str) -> Result<i64, Error> {
        let mut sequences = self.sequences.lock().await;
        let value = sequences.entry(counter.to_owned()).or_default();
        *value += 1;
        Ok(*value)
    }
}

#[async_trait]
impl SolicitudStore for Memory {
    async fn get_solicitud_by_id(
        &self,
        id: &solicitud::Id,
    ) -> Result<Option<Solicitud>, Error> {
        Ok(self.solicitudes.lock().await.get(id).cloned())
    }

    async fn insert_solicitud(
        &self,
        solicitud: &Solicitud,
    ) -> Result<(), Error> {
        solicitud.id.stored_seq()?;
        self.solicitudes
            .lock()
            .await
            .insert(solicitud.id.clone(), solicitud.clone());
        Ok(())
    }

    async fn update_solicitud(
        &self,
        solicitud: &Solicitud,
    ) -> Result<bool, Error> {
        let mut solicitudes = self.solicitudes.lock().await;
        Ok(match solicitudes.get_mut(&solicitud.id) {
            Some(stored) if stored.version == solicitud.version => {
                *stored = Solicitud {
                    version: solicitud.version + 1,
                    ..solicitud.clone()
                };
                true
            }
            _ => false,
        })
    }

    async fn delete_solicitud(
        &self,
        id: &solicitud::Id,
        version: i64,
    ) -> Result<bool, Error> {
        let mut solicitudes = self.solicitudes.lock().await;
        if solicitudes.get(id).map(|s| s.version) != Some(version) {
            return Ok(false);
        }
        Ok(solicitudes.remove(id).is_some())
    }

    async fn list_solicitudes(
        &self,
        filtro: &solicitud::Filtro,
    ) -> Result<Vec<Solicitud>, Error> {
        Ok(self
            .solicitudes
            .lock()
            .await
            .values()
            .filter(|s| filtro.matches(s))
            .cloned()
            .sorted_by_key(|s| s.id.seq())
            .collect())
    }
}

#[async_trait]
impl TicketStore for Memory {
    async fn get_ticket_by_id(
        &self,
        id: &ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        Ok(self.tickets.lock().await.get(id).cloned())
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        ticket.id.stored_seq()?;
        let mut tickets = self.tickets.lock().await;
        if ticket.solicitud_id.is_some()
            && tickets
                .values()
                .any(|t| t.solicitud_id == ticket.solicitud_id)
        {
            return Ok(false);
        }
        tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(true)
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        let mut tickets = self.tickets.lock().await;
        Ok(match tickets.get_mut(&ticket.id) {
            Some(stored) if stored.version == ticket.version => {
                *stored = Ticket {
                    version: ticket.version + 1,
                    ..ticket.clone()
                };
                true
            }
            _ => false,
        })
    }

    async fn delete_ticket(
        &self,
        id: &ticket::Id,
        version: i64,
    ) -> Result<bool, Error> {
        let mut tickets = self.tickets.lock().await;
        if tickets.get(id).map(|t| t.version) != Some(version) {
            return Ok(false);
        }
        Ok(tickets.remove(id).is_some())
    }

    async fn list_tickets(
        &self,
        filtro: &ticket::Filtro,
    ) -> Result<Vec<Ticket>, Error> {
        Ok(self
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| filtro.matches(t))
            .cloned()
            .sorted_by_key(|t| t.id.seq())
            .collect())
    }
}

#[async_trait]
impl FacturaStore for Memory {
    async fn get_factura_by_id(
        &self,
        id: &factura::Id,
    ) -> Result<Option<Factura>, Error> {
        Ok(self.facturas.lock().await.get(id).cloned())
    }

    async fn insert_factura(&self, factura: &Factura) -> Result<bool, Error> {
        factura.id.stored_seq()?;
        let mut facturas = self.facturas.lock().await;
        if facturas.values().any(|f| f.ticket_id == factura.ticket_id) {
            return Ok(false);
        }
        facturas.insert(factura.id.clone(), factura.clone());
        Ok(true)
    }

    async fn update_factura(&self, factura: &Factura) -> Result<bool, Error> {
        let mut facturas = self.facturas.lock().await;
        Ok(match facturas.get_mut(&factura.id) {
            Some(stored) if stored.version == factura.version => {
                stored.pago = factura.pago;
                stored.version += 1;
                true
            }
            _ => false,
        })
    }

    async fn list_facturas(
        &self,
        filtro: &factura::Filtro,
    ) -> Result<Vec<Factura>, Error> {
        Ok(self
            .facturas
            .lock()
            .await
            .values()
            .filter(|f| filtro.matches(f))
            .cloned()
            .sorted_by_key(|f| f.id.seq())
            .collect())
    }
}
