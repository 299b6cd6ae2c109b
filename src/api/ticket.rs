use serde::{Deserialize, Serialize};
use time::{Date, Time};

use crate::db;

pub use crate::db::{
    solicitud::Prioridad,
    ticket::{Estado, Id},
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub solicitud_id: Option<db::solicitud::Id>,
    pub username: String,
    pub estado: Estado,
    pub aprobado: bool,
    pub prioridad: Prioridad,
    pub descripcion_inicial: String,
    pub descripcion_trabajo: Option<String>,
    pub fecha_creacion: Date,
    pub hora_creacion: Time,
}

impl From<db::Ticket> for Ticket {
    fn from(t: db::Ticket) -> Self {
        Self {
            id: t.id,
            solicitud_id: t.solicitud_id,
            username: t.username,
            estado: t.estado,
            aprobado: t.aprobado,
            prioridad: t.prioridad,
            descripcion_inicial: t.descripcion_inicial,
            descripcion_trabajo: t.descripcion_trabajo,
            fecha_creacion: t.fecha_creacion,
            hora_creacion: t.hora_creacion,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub tickets: Vec<Ticket>,
    pub total_count: usize,
}
