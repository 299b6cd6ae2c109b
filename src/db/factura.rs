use async_trait::async_trait;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::{Date, Time};
use tokio_postgres::{error::SqlState, Row};

use super::{
    int2_sql, labels, prefixed_id, solicitud, ticket, Client, Error, Prioridad,
};

prefixed_id!(Id, "FACTURA-");

/// Billing snapshot of a ticket. Ticket fields are copied at generation time
/// and never follow later ticket changes.
#[derive(Clone, Debug)]
pub struct Factura {
    pub id: Id,
    pub ticket_id: ticket::Id,
    pub solicitud_id: Option<solicitud::Id>,
    pub username: String,
    pub estado_ticket: ticket::Estado,
    pub prioridad: Prioridad,
    pub descripcion_inicial: String,
    pub descripcion_trabajo: Option<String>,
    pub cotizacion: f64,
    pub pago: Pago,
    pub fecha_creacion: Date,
    pub hora_creacion: Time,
    pub version: i64,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Pago {
    PendientePago = 1,
    ValorPagado = 2,
}

labels!(Pago, "estado de pago", {
    PendientePago => "PENDIENTE_PAGO",
    ValorPagado => "VALOR_PAGADO",
});

int2_sql!(Pago, "estado de pago");

impl Pago {
    pub fn pagar(self) -> Option<Self> {
        match self {
            Self::PendientePago => Some(Self::ValorPagado),
            Self::ValorPagado => None,
        }
    }
}

/// Conjunctive listing filter; `None` fields match everything. The date
/// range is inclusive on both ends.
#[derive(Clone, Debug, Default)]
pub struct Filtro {
    pub username: Option<String>,
    pub pago: Option<Pago>,
    pub prioridad: Option<Prioridad>,
    pub desde: Option<Date>,
    pub hasta: Option<Date>,
}

impl Filtro {
    pub fn matches(&self, factura: &Factura) -> bool {
        self.username.as_ref().map_or(true, |u| *u == factura.username)
            && self.pago.map_or(true, |p| p == factura.pago)
            && self.prioridad.map_or(true, |p| p == factura.prioridad)
            && self.desde.map_or(true, |d| d <= factura.fecha_creacion)
            && self.hasta.map_or(true, |d| factura.fecha_creacion <= d)
    }
}

#[async_trait]
pub trait FacturaStore: Send + Sync {
    async fn get_factura_by_id(&self, id: &Id)
        -> Result<Option<Factura>, Error>;

    /// Returns `false`, writing nothing, if the ticket is already invoiced.
    async fn insert_factura(&self, factura: &Factura) -> Result<bool, Error>;

    /// Version-guarded, see [`super::SolicitudStore::update_solicitud`].
    async fn update_factura(&self, factura: &Factura) -> Result<bool, Error>;

    async fn list_facturas(&self, filtro: &Filtro)
        -> Result<Vec<Factura>, Error>;
}

const COLUMNS: &str = "\
    id, ticket_id, solicitud_id, username, estado_ticket, prioridad, \
    descripcion_inicial, descripcion_trabajo, cotizacion, pago, \
    fecha_creacion, hora_creacion, version";

fn from_row(row: &Row) -> Result<Factura, tokio_postgres::Error> {
    Ok(Factura {
        id: row.try_get("id")?,
        ticket_id: row.try_get("ticket_id")?,
        solicitud_id: row.try_get("solicitud_id")?,
        username: row.try_get("username")?,
        estado_ticket: row.try_get("estado_ticket")?,
        prioridad: row.try_get("prioridad")?,
        descripcion_inicial: row.try_get("descripcion_inicial")?,
        descripcion_trabajo: row.try_get("descripcion_trabajo")?,
        cotizacion: row.try_get("cotizacion")?,
        pago: row.try_get("pago")?,
        fecha_creacion: row.try_get("fecha_creacion")?,
        hora_creacion: row.try_get("hora_creacion")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl FacturaStore for Client {
    async fn get_factura_by_id(
        &self,
        id: &Id,
    ) -> Result<Option<Factura>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM facturas WHERE id = $1");
        Ok(self
            .0
            .query_opt(&sql, &[id])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()?)
    }

    async fn insert_factura(&self, factura: &Factura) -> Result<bool, Error> {
        const SQL: &str = "\
            INSERT INTO facturas (id, seq, ticket_id, solicitud_id, username, \
                                  estado_ticket, prioridad, \
                                  descripcion_inicial, descripcion_trabajo, \
                                  cotizacion, pago, fecha_creacion, \
                                  hora_creacion, version) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                    $14)";

        let seq = factura.id.stored_seq()?;
        let inserted = self
            .0
            .execute(
                SQL,
                &[
                    &factura.id,
                    &seq,
                    &factura.ticket_id,
                    &factura.solicitud_id,
                    &factura.username,
                    &factura.estado_ticket,
                    &factura.prioridad,
                    &factura.descripcion_inicial,
                    &factura.descripcion_trabajo,
                    &factura.cotizacion,
                    &factura.pago,
                    &factura.fecha_creacion,
                    &factura.hora_creacion,
                    &factura.version,
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

    async fn update_factura(&self, factura: &Factura) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE facturas \
            SET pago = $3, \
                version = version + 1 \
            WHERE id = $1 AND version = $2";

        let updated = self
            .0
            .execute(SQL, &[&factura.id, &factura.version, &factura.pago])
            .await?;
        Ok(updated == 1)
    }

    async fn list_facturas(
        &self,
        filtro: &Filtro,
    ) -> Result<Vec<Factura>, Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM facturas \
             WHERE ($1::TEXT IS NULL OR username = $1) \
               AND ($2::INT2 IS NULL OR pago = $2) \
               AND ($3::INT2 IS NULL OR prioridad = $3) \
               AND ($4::DATE IS NULL OR fecha_creacion >= $4) \
               AND ($5::DATE IS NULL OR fecha_creacion <= $5) \
             ORDER BY seq",
        );
        Ok(self
            .0
            .query(
                &sql,
                &[
                    &filtro.username,
                    &filtro.pago,
                    &filtro.prioridad,
                    &filtro.desde,
                    &filtro.hasta,
                ],
            )
            .await?
            .iter()
            .map(from_row)
            .collect::<Result<_, _>>()?)
    }
}
