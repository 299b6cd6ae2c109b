use async_trait::async_trait;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::{Date, Time};
use tokio_postgres::Row;

use super::{int2_sql, labels, prefixed_id, Client, Error};

prefixed_id!(Id, "SOLICITUD-");

#[derive(Clone, Debug)]
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

    /// Bumped by every successful write; guards concurrent transitions.
    pub version: i64,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Prioridad {
    Alta = 1,
    Media = 2,
    Baja = 3,
}

labels!(Prioridad, "prioridad", {
    Alta => "ALTA",
    Media => "MEDIA",
    Baja => "BAJA",
});

int2_sql!(Prioridad, "prioridad");

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Estado {
    /// Opened by the customer, waiting for the workshop.
    Pendiente = 1,

    /// Taken by the workshop; a quotation may be attached.
    Aceptado = 2,

    /// Rejected by the workshop, or its quotation by the customer.
    SolicitudRechazada = 3,
}

labels!(Estado, "estado de solicitud", {
    Pendiente => "PENDIENTE",
    Aceptado => "ACEPTADO",
    SolicitudRechazada => "SOLICITUD_RECHAZADA",
});

int2_sql!(Estado, "estado de solicitud");

impl Estado {
    pub fn aceptar(self) -> Option<Self> {
        match self {
            Self::Pendiente => Some(Self::Aceptado),
            Self::Aceptado | Self::SolicitudRechazada => None,
        }
    }

    pub fn rechazar(self) -> Option<Self> {
        match self {
            Self::Pendiente => Some(Self::SolicitudRechazada),
            Self::Aceptado | Self::SolicitudRechazada => None,
        }
    }

    pub fn rechazar_cotizacion(self) -> Option<Self> {
        match self {
            Self::Aceptado => Some(Self::SolicitudRechazada),
            Self::Pendiente | Self::SolicitudRechazada => None,
        }
    }
}

/// Outcome of a quotation. Both variants are terminal.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EstadoCotizacion {
    CotizacionAceptada = 1,
    RechazoCotizacionUsuario = 2,
}

labels!(EstadoCotizacion, "estado de cotización", {
    CotizacionAceptada => "COTIZACION_ACEPTADA",
    RechazoCotizacionUsuario => "RECHAZO_COTIZACION_USUARIO",
});

int2_sql!(EstadoCotizacion, "estado de cotización");

/// Conjunctive listing filter; `None` fields match everything.
#[derive(Clone, Debug, Default)]
pub struct Filtro {
    pub username: Option<String>,
    pub estado: Option<Estado>,
    pub prioridad: Option<Prioridad>,
}

impl Filtro {
    pub fn matches(&self, solicitud: &Solicitud) -> bool {
        self.username
            .as_ref()
            .map_or(true, |u| *u == solicitud.username)
            && self.estado.map_or(true, |e| e == solicitud.estado)
            && self.prioridad.map_or(true, |p| p == solicitud.prioridad)
    }
}

#[async_trait]
pub trait SolicitudStore: Send + Sync {
    async fn get_solicitud_by_id(
        &self,
        id: &Id,
    ) -> Result<Option<Solicitud>, Error>;

    async fn insert_solicitud(&self, solicitud: &Solicitud)
        -> Result<(), Error>;

    /// Writes `solicitud` only if the stored version still equals
    /// `solicitud.version`, bumping it. Returns `false` if another write got
    /// there first.
    async fn update_solicitud(
        &self,
        solicitud: &Solicitud,
    ) -> Result<bool, Error>;

    /// Same version guard as [`SolicitudStore::update_solicitud`].
    async fn delete_solicitud(
        &self,
        id: &Id,
        version: i64,
    ) -> Result<bool, Error>;

    /// Ordered by creation sequence.
    async fn list_solicitudes(
        &self,
        filtro: &Filtro,
    ) -> Result<Vec<Solicitud>, Error>;
}

const COLUMNS: &str = "\
    id, username, descripcion_inicial, descripcion_trabajo, cotizacion, \
    prioridad, estado, cotizacion_aceptada, fecha_creacion, hora_creacion, \
    version";

fn from_row(row: &Row) -> Result<Solicitud, tokio_postgres::Error> {
    Ok(Solicitud {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        descripcion_inicial: row.try_get("descripcion_inicial")?,
        descripcion_trabajo: row.try_get("descripcion_trabajo")?,
        cotizacion: row.try_get("cotizacion")?,
        prioridad: row.try_get("prioridad")?,
        estado: row.try_get("estado")?,
        cotizacion_aceptada: row.try_get("cotizacion_aceptada")?,
        fecha_creacion: row.try_get("fecha_creacion")?,
        hora_creacion: row.try_get("hora_creacion")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl SolicitudStore for Client {
    async fn get_solicitud_by_id(
        &self,
        id: &Id,
    ) -> Result<Option<Solicitud>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM solicitudes WHERE id = $1");
        Ok(self
            .0
            .query_opt(&sql, &[id])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()?)
    }

    async fn insert_solicitud(
        &self,
        solicitud: &Solicitud,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO solicitudes (id, seq, username, descripcion_inicial, \
                                     descripcion_trabajo, cotizacion, \
                                     prioridad, estado, cotizacion_aceptada, \
                                     fecha_creacion, hora_creacion, version) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

        let seq = solicitud.id.stored_seq()?;
        self.0
            .execute(
                SQL,
                &[
                    &solicitud.id,
                    &seq,
                    &solicitud.username,
                    &solicitud.descripcion_inicial,
                    &solicitud.descripcion_trabajo,
                    &solicitud.cotizacion,
                    &solicitud.prioridad,
                    &solicitud.estado,
                    &solicitud.cotizacion_aceptada,
                    &solicitud.fecha_creacion,
                    &solicitud.hora_creacion,
                    &solicitud.version,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_solicitud(
        &self,
        solicitud: &Solicitud,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE solicitudes \
            SET descripcion_inicial = $3, \
                descripcion_trabajo = $4, \
                cotizacion = $5, \
                prioridad = $6, \
                estado = $7, \
                cotizacion_aceptada = $8, \
                version = version + 1 \
            WHERE id = $1 AND version = $2";

        let updated = self
            .0
            .execute(
                SQL,
                &[
                    &solicitud.id,
                    &solicitud.version,
                    &solicitud.descripcion_inicial,
                    &solicitud.descripcion_trabajo,
                    &solicitud.cotizacion,
                    &solicitud.prioridad,
                    &solicitud.estado,
                    &solicitud.cotizacion_aceptada,
                ],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn delete_solicitud(
        &self,
        id: &Id,
        version: i64,
    ) -> Result<bool, Error> {
        const SQL: &str =
            "DELETE FROM solicitudes WHERE id = $1 AND version = $2";
        Ok(self.0.execute(SQL, &[id, &version]).await? == 1)
    }

    async fn list_solicitudes(
        &self,
        filtro: &Filtro,
    ) -> Result<Vec<Solicitud>, Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM solicitudes \
             WHERE ($1::TEXT IS NULL OR username = $1) \
               AND ($2::INT2 IS NULL OR estado = $2) \
               AND ($3::INT2 IS NULL OR prioridad = $3) \
             ORDER BY seq",
        );
        Ok(self
            .0
            .query(&sql, &[&filtro.username, &filtro.estado, &filtro.prioridad])
            .await?
            .iter()
            .map(from_row)
            .collect::<Result<_, _>>()?)
    }
}
