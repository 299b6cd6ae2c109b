use serde::{Deserialize, Serialize};
use time::{Date, Time};

use crate::{db, engine};

pub use crate::db::{
    factura::{Id, Pago},
    solicitud::Prioridad,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Factura {
    pub factura_id: Id,
    pub ticket_id: db::ticket::Id,
    pub solicitud_id: Option<db::solicitud::Id>,
    pub username: String,
    pub estado_ticket: db::ticket::Estado,
    pub prioridad: Prioridad,
    pub descripcion_inicial: String,
    pub descripcion_trabajo: Option<String>,
    pub cotizacion: f64,
    pub pago: Pago,
    pub fecha_creacion: Date,
    pub hora_creacion: Time,
}

impl From<db::Factura> for Factura {
    fn from(f: db::Factura) -> Self {
        Self {
            factura_id: f.id,
            ticket_id: f.ticket_id,
            solicitud_id: f.solicitud_id,
            username: f.username,
            estado_ticket: f.estado_ticket,
            prioridad: f.prioridad,
            descripcion_inicial: f.descripcion_inicial,
            descripcion_trabajo: f.descripcion_trabajo,
            cotizacion: f.cotizacion,
            pago: f.pago,
            fecha_creacion: f.fecha_creacion,
            hora_creacion: f.hora_creacion,
        }
    }
}

/// Filtered invoices plus their count and billed total.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resumen {
    pub facturas: Vec<Factura>,
    pub total_count: usize,
    pub total: f64,
}

impl From<engine::factura::Resumen> for Resumen {
    fn from(r: engine::factura::Resumen) -> Self {
        Self {
            facturas: r.facturas.into_iter().map(Into::into).collect(),
            total_count: r.cantidad,
            total: r.total,
        }
    }
}
