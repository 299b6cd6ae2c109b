use serde::{Deserialize, Serialize};
use time::{Date, Time};

use crate::db;

pub use crate::db::solicitud::{Estado, EstadoCotizacion, Id, Prioridad};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Solicitud {
    pub id: Id,
    pub username: String,
    pub descripcion_inicial: String,
    pub descripcion_trabajo: Option<String>,
    pub cotizacion: Option<f64>,
    pub prioridad: Prioridad,
    pub estado: Estado,
    pub cotizacion_aceptada: Option<EstadoCotizacion>,
    pub fecha_creacion: Date,
    pub hora_creacion: Time,
}

impl From<db::Solicitud> for Solicitud {
    fn from(s: db::Solicitud) -> Self {
        Self {
            id: s.id,
            username: s.username,
            descripcion_inicial: s.descripcion_inicial,
            descripcion_trabajo: s.descripcion_trabajo,
            cotizacion: s.cotizacion,
            prioridad: s.prioridad,
            estado: s.estado,
            cotizacion_aceptada: s.cotizacion_aceptada,
            fecha_creacion: s.fecha_creacion,
            hora_creacion: s.hora_creacion,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub solicitudes: Vec<Solicitud>,
    pub total_count: usize,
}
