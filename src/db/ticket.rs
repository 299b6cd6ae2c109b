use async_trait::async_trait;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::{Date, Time};
use tokio_postgres::{error::SqlState, Row};

use super::{int2_sql, labels, prefixed_id, solicitud, Client, Error, Prioridad};

prefixed_id!(Id, "TICKET-");

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,

    /// Originating request, if any. Lookup only, never ownership.
    pub solicitud_id: Option<solicitud::Id>,
    pub username: String,
    pub estado: Estado,

    /// Once set, the owner can no longer modify or delete the ticket.
    pub aprobado: bool,
    pub prioridad: Prioridad,
    pub descripcion_inicial: String,
    pub descripcion_trabajo: Option<String>,
    pub fecha_creacion: Date,
    pub hora_creacion: Time,
    pub version: i64,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Estado {
    Pendiente = 1,
    Aprobado = 2,
    Rechazado = 3,
    TrabajoEnProgreso = 4,
    TrabajoTerminado = 5,
    PendientePago = 6,
    ValorPagado = 7,
}

labels!(Estado, "estado de ticket", {
    Pendiente => "PENDIENTE",
    Aprobado => "APROBADO",
    Rechazado => "RECHAZADO",
    TrabajoEnProgreso => "TRABAJO_EN_PROGRESO",
    TrabajoTerminado => "TRABAJO_TERMINADO",
    PendientePago => "PENDIENTE_PAGO",
    ValorPagado => "VALOR_PAGADO",
});

int2_sql!(Estado, "estado de ticket");

impl Estado {
    /// Review outcome of an unapproved pending ticket.
    pub fn revisar(self, aprobado: bool, aprobar: bool) -> Option<Self> {
        match (self, aprobado) {
            (Self::Pendiente, false) if aprobar => Some(Self::Aprobado),
            (Self::Pendiente, false) => Some(Self::Rechazado),
            _ => None,
        }
    }

    /// States a ticket owner may set; the rest belong to review, work and
    /// billing.
    pub fn asignable_por_cliente(self) -> bool {
        self == Self::Pendiente
    }

    /// Next work/billing step. Tickets born approved (from an accepted
    /// quotation) start work straight from `Pendiente`. Nothing moves
    /// without approval.
    pub fn siguiente(self, aprobado: bool) -> Option<Self> {
        if !aprobado {
            return None;
        }
        match self {
            Self::Pendiente | Self::Aprobado => Some(Self::TrabajoEnProgreso),
            Self::TrabajoEnProgreso => Some(Self::TrabajoTerminado),
            Self::TrabajoTerminado => Some(Self::PendientePago),
            Self::PendientePago => Some(Self::ValorPagado),
            Self::Rechazado | Self::ValorPagado => None,
        }
    }
}

/// Conjunctive listing filter; `None` fields match everything. The date
/// range is inclusive on both ends.
#[derive(Clone, Debug, Default)]
pub struct Filtro {
    pub username: Option<String>,
    pub solicitud_id: Option<solicitud::Id>,
    pub estado: Option<Estado>,
    pub prioridad: Option<Prioridad>,
    pub desde: Option<Date>,
    pub hasta: Option<Date>,
}

impl Filtro {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.username.as_ref().map_or(true, |u| *u == ticket.username)
            && self
                .solicitud_id
                .as_ref()
                .map_or(true, |s| ticket.solicitud_id.as_ref() == Some(s))
            && self.estado.map_or(true, |e| e == ticket.estado)
            && self.prioridad.map_or(true, |p| p == ticket.prioridad)
            && self.desde.map_or(true, |d| d <= ticket.fecha_creacion)
            && self.hasta.map_or(true, |d| ticket.fecha_creacion <= d)
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get_ticket_by_id(&self, id: &Id) -> Result<Option<Ticket>, Error>;

    /// Returns `false` if the originating request already has a ticket.
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<bool, Error>;

    /// Version-guarded, see [`super::SolicitudStore::update_solicitud`].
    async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error>;

    async fn delete_ticket(&self, id: &Id, version: i64)
        -> Result<bool, Error>;

    async fn list_tickets(&self, filtro: &Filtro)
        -> Result<Vec<Ticket>, Error>;
}

const COLUMNS: &str = "\
    id, solicitud_id, username, estado, aprobado, prioridad, \
    descripcion_inicial, descripcion_trabajo, fecha_creacion, hora_creacion, \
    version";

fn from_row(row: &Row) -> Result<Ticket, tokio_postgres::Error> {
    Ok(Ticket {
        id: row.try_get("id")?,
        solicitud_id: row.try_get("solicitud_id")?,
        username: row.try_get("username")?,
        estado: row.try_get("estado")?,
        aprobado: row.try_get("aprobado")?,
        prioridad: row.try_get("prioridad")?,
        descripcion_inicial: row.try_get("descripcion_inicial")?,
        descripcion_trabajo: row.try_get("descripcion_trabajo")?,
        fecha_creacion: row.try_get("fecha_creacion")?,
        hora_creacion: row.try_get("hora_creacion")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl TicketStore for Client {
    async fn get_ticket_by_id(&self, id: &Id) -> Result<Option<Ticket>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM tickets WHERE id = $1");
        Ok(self
            .0
            .query_opt(&sql, &[id])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()?)
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        const SQL: &str = "\
            INSERT INTO tickets (id, seq, solicitud_id, username, estado, \
                                 aprobado, prioridad, descripcion_inicial, \
                                 descripcion_trabajo, fecha_creacion, \
                                 hora_creacion, version) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

        let seq = ticket.id.stored_seq()?;
        let inserted = self
            .0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &seq,
                    &ticket.solicitud_id,
                    &ticket.username,
                    &ticket.estado,
                    &ticket.aprobado,
                    &ticket.prioridad,
                    &ticket.descripcion_inicial,
                    &ticket.descripcion_trabajo,
                    &ticket.fecha_creacion,
                    &ticket.hora_creacion,
                    &ticket.version,
                ],
            )
            .await;
        match inserted {
            Ok(_) => Ok(true),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET estado = $3, \
                aprobado = $4, \
                prioridad = $5, \
                descripcion_inicial = $6, \
                descripcion_trabajo = $7, \
                version = version + 1 \
            WHERE id = $1 AND version = $2";

        let updated = self
            .0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.version,
                    &ticket.estado,
                    &ticket.aprobado,
                    &ticket.prioridad,
                    &ticket.descripcion_inicial,
                    &ticket.descripcion_trabajo,
                ],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn delete_ticket(
        &self,
        id: &Id,
        version: i64,
    ) -> Result<bool, Error> {
        const SQL: &str = "DELETE FROM tickets WHERE id = $1 AND version = $2";
        Ok(self.0.execute(SQL, &[id, &version]).await? == 1)
    }

    async fn list_tickets(
        &self,
        filtro: &Filtro,
    ) -> Result<Vec<Ticket>, Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM tickets \
             WHERE ($1::TEXT IS NULL OR username = $1) \
               AND ($2::INT2 IS NULL OR estado = $2) \
               AND ($3::INT2 IS NULL OR prioridad = $3) \
               AND ($4::DATE IS NULL OR fecha_creacion >= $4) \
               AND ($5::DATE IS NULL OR fecha_creacion <= $5) \
               AND ($6::TEXT IS NULL OR solicitud_id = $6) \
             ORDER BY seq",
        );
        Ok(self
            .0
            .query(
                &sql,
                &[
                    &filtro.username,
                    &filtro.estado,
                    &filtro.prioridad,
                    &filtro.desde,
                    &filtro.hasta,
                    &filtro.solicitud_id,
                ],
            )
            .await?
            .iter()
            .map(from_row)
            .collect::<Result<_, _>>()?)
    }
}
