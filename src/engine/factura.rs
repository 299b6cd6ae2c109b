use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    db::{
        factura::{self, Filtro, Pago},
        sequence::FACTURA_SEQUENCE,
        ticket, Factura, Store,
    },
    notify::{self, Notification, Notifier},
    Error,
};

use super::{ahora, check_rango, MAX_ATTEMPTS};

/// Filtered invoices with their aggregates.
#[derive(Clone, Debug)]
pub struct Resumen {
    pub facturas: Vec<Factura>,
    pub cantidad: usize,
    pub total: f64,
}

#[derive(Clone)]
pub struct Facturas {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl Facturas {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Bills a ticket, snapshotting it as it is now. A ticket is billed at
    /// most once.
    pub async fn generar_desde_ticket(
        &self,
        ticket_id: &ticket::Id,
        cotizacion: f64,
    ) -> Result<Factura, Error> {
        let ticket = self
            .store
            .get_ticket_by_id(ticket_id)
            .await?
            .ok_or_else(|| Error::not_found(ticket_id))?;
        if !(cotizacion.is_finite() && cotizacion > 0.0) {
            return Err(Error::validation(format!(
                "cotizacion must be a positive amount, got {cotizacion}",
            )));
        }

        let seq = self.store.next_value(FACTURA_SEQUENCE).await?;
        let (fecha_creacion, hora_creacion) = ahora();
        let factura = Factura {
            id: factura::Id::from_seq(seq),
            ticket_id: ticket.id,
            solicitud_id: ticket.solicitud_id,
            username: ticket.username,
            estado_ticket: ticket.estado,
            prioridad: ticket.prioridad,
            descripcion_inicial: ticket.descripcion_inicial,
            descripcion_trabajo: ticket.descripcion_trabajo,
            cotizacion,
            pago: Pago::PendientePago,
            fecha_creacion,
            hora_creacion,
            version: 0,
        };
        if !self.store.insert_factura(&factura).await? {
            return Err(Error::invalid_state(format!(
                "{ticket_id} is already invoiced",
            )));
        }

        info!(id = %factura.id, ticket = %ticket_id, cotizacion, "factura generated");
        notify::dispatch(
            &self.notifier,
            Notification {
                to: factura.username.clone(),
                subject: format!("{} {}", factura.id, factura.pago),
                body: format!(
                    "Se generó la factura {} por {cotizacion:.2} para el \
                     ticket {ticket_id}.",
                    factura.id,
                ),
            },
        );
        Ok(factura)
    }

    pub async fn registrar_pago(
        &self,
        id: &factura::Id,
    ) -> Result<Factura, Error> {
        for _ in 0..MAX_ATTEMPTS {
            let mut factura = self.obtener(id).await?;
            factura.pago = factura.pago.pagar().ok_or_else(|| {
                Error::invalid_state(format!("{id} is already paid"))
            })?;
            if self.store.update_factura(&factura).await? {
                factura.version += 1;
                info!(%id, "factura paid");
                return Ok(factura);
            }
            debug!(%id, "concurrent write, retrying");
        }
        Err(Error::invalid_state(format!(
            "{id} keeps changing concurrently",
        )))
    }

    pub async fn obtener(&self, id: &factura::Id) -> Result<Factura, Error> {
        self.store
            .get_factura_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(id))
    }

    pub async fn por_pago(&self, pago: Pago) -> Result<Vec<Factura>, Error> {
        Ok(self
            .listar_con_filtros(&Filtro {
                pago: Some(pago),
                ..Filtro::default()
            })
            .await?
            .facturas)
    }

    pub async fn por_usuario_y_pago(
        &self,
        username: &str,
        pago: Pago,
    ) -> Result<Vec<Factura>, Error> {
        Ok(self
            .listar_con_filtros(&Filtro {
                username: Some(username.to_owned()),
                pago: Some(pago),
                ..Filtro::default()
            })
            .await?
            .facturas)
    }

    /// An empty match is not an error: it yields zero invoices totalling 0.
    pub async fn listar_con_filtros(
        &self,
        filtro: &Filtro,
    ) -> Result<Resumen, Error> {
        check_rango(filtro.desde, filtro.hasta)?;
        let facturas = self.store.list_facturas(filtro).await?;
        Ok(Resumen {
            cantidad: facturas.len(),
            total: facturas.iter().map(|f| f.cotizacion).sum(),
            facturas,
        })
    }
}
