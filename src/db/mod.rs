pub mod factura;
pub mod memory;
pub mod sequence;
pub mod solicitud;
pub mod ticket;

use derive_more::{Display, From};
use tokio_postgres::{tls::NoTlsStream, NoTls, Socket};

use crate::config;

pub use self::{
    factura::{Factura, FacturaStore},
    memory::Memory,
    sequence::Sequences,
    solicitud::{Prioridad, Solicitud, SolicitudStore},
    ticket::{Ticket, TicketStore},
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

/// Connects to PostgreSQL. The returned [`Connection`] must be polled for the
/// [`Client`] to make progress; call [`Client::bootstrap_schema`] once it is.
pub async fn connect(
    config: &config::Db,
) -> Result<(Client, Connection), Error> {
    Ok(tokio_postgres::connect(&config.url, NoTls)
        .await
        .map(|(client, connection)| (Client(client), connection))?)
}

pub struct Client(tokio_postgres::Client);

impl Client {
    /// Idempotent, safe to run on every startup.
    pub async fn bootstrap_schema(&self) -> Result<(), Error> {
        const DDL: &str = "
            CREATE TABLE IF NOT EXISTS sequences (
                name    TEXT PRIMARY KEY,
                value   BIGINT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS solicitudes (
                id                   TEXT PRIMARY KEY,
                seq                  BIGINT NOT NULL,
                username             TEXT NOT NULL,
                descripcion_inicial  TEXT NOT NULL,
                descripcion_trabajo  TEXT,
                cotizacion           FLOAT8,
                prioridad            INT2 NOT NULL,
                estado               INT2 NOT NULL,
                cotizacion_aceptada  INT2,
                fecha_creacion       DATE NOT NULL,
                hora_creacion        TIME NOT NULL,
                version              BIGINT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id                   TEXT PRIMARY KEY,
                seq                  BIGINT NOT NULL,
                solicitud_id         TEXT UNIQUE,
                username             TEXT NOT NULL,
                estado               INT2 NOT NULL,
                aprobado             BOOLEAN NOT NULL,
                prioridad            INT2 NOT NULL,
                descripcion_inicial  TEXT NOT NULL,
                descripcion_trabajo  TEXT,
                fecha_creacion       DATE NOT NULL,
                hora_creacion        TIME NOT NULL,
                version              BIGINT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS facturas (
                id                   TEXT PRIMARY KEY,
                seq                  BIGINT NOT NULL,
                ticket_id            TEXT NOT NULL UNIQUE,
                solicitud_id         TEXT,
                username             TEXT NOT NULL,
                estado_ticket        INT2 NOT NULL,
                prioridad            INT2 NOT NULL,
                descripcion_inicial  TEXT NOT NULL,
                descripcion_trabajo  TEXT,
                cotizacion           FLOAT8 NOT NULL,
                pago                 INT2 NOT NULL,
                fecha_creacion       DATE NOT NULL,
                hora_creacion        TIME NOT NULL,
                version              BIGINT NOT NULL
            );";

        Ok(self.0.batch_execute(DDL).await?)
    }
}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("postgres: {_0}")]
    #[from]
    Postgres(tokio_postgres::Error),

    /// Store could not serve the request (e.g. a decoded row was corrupt).
    #[display("store unavailable: {_0}")]
    Unavailable(String),

    /// Id without a sequence suffix, refused on insert.
    #[display("malformed id `{_0}`")]
    MalformedId(String),
}

impl std::error::Error for Error {}

/// Everything the lifecycle engines need from persistence.
pub trait Store: Sequences + SolicitudStore + TicketStore + FacturaStore {}

impl<T> Store for T where
    T: Sequences + SolicitudStore + TicketStore + FacturaStore
{
}

/// Implements `FromSql`/`ToSql` for a `#[repr(u8)]` enum stored as `INT2`.
macro_rules! int2_sql {
    ($ty:ty, $what:literal) => {
        impl ::tokio_postgres::types::FromSql<'_> for $ty {
            ::tokio_postgres::types::accepts!(INT2);

            fn from_sql(
                ty: &::tokio_postgres::types::Type,
                raw: &[u8],
            ) -> Result<
                Self,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                let repr =
                    <i16 as ::tokio_postgres::types::FromSql>::from_sql(
                        ty, raw,
                    )?;
                let repr = u8::try_from(repr)?;
                let value = Self::try_from(repr)
                    .map_err(|_| concat!("invalid ", $what))?;
                Ok(value)
            }
        }

        impl ::tokio_postgres::types::ToSql for $ty {
            ::tokio_postgres::types::accepts!(INT2);

            ::tokio_postgres::types::to_sql_checked!();

            fn to_sql(
                &self,
                ty: &::tokio_postgres::types::Type,
                out: &mut ::tokio_postgres::types::private::BytesMut,
            ) -> Result<
                ::tokio_postgres::types::IsNull,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                let repr = i16::from((*self) as u8);
                ::tokio_postgres::types::ToSql::to_sql(&repr, ty, out)
            }
        }
    };
}

/// Declares a `PREFIX-<seq>` string id with its SQL mapping.
macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Clone,
            Debug,
            ::serde::Deserialize,
            ::derive_more::Display,
            Eq,
            Hash,
            PartialEq,
            ::serde::Serialize,
        )]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn from_seq(seq: i64) -> Self {
                Self(format!("{}{seq}", Self::PREFIX))
            }

            /// Numeric suffix; `None` for ids not minted by
            /// [`Self::from_seq`].
            pub fn seq(&self) -> Option<i64> {
                self.0.strip_prefix(Self::PREFIX)?.parse().ok()
            }

            pub(crate) fn stored_seq(
                &self,
            ) -> Result<i64, $crate::db::Error> {
                self.seq()
                    .ok_or_else(|| $crate::db::Error::MalformedId(self.0.clone()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl ::tokio_postgres::types::FromSql<'_> for $name {
            ::tokio_postgres::types::accepts!(TEXT, VARCHAR);

            fn from_sql(
                ty: &::tokio_postgres::types::Type,
                raw: &[u8],
            ) -> Result<
                Self,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                <String as ::tokio_postgres::types::FromSql>::from_sql(ty, raw)
                    .map(Self)
            }
        }

        impl ::tokio_postgres::types::ToSql for $name {
            ::tokio_postgres::types::accepts!(TEXT, VARCHAR);

            ::tokio_postgres::types::to_sql_checked!();

            fn to_sql(
                &self,
                ty: &::tokio_postgres::types::Type,
                out: &mut ::tokio_postgres::types::private::BytesMut,
            ) -> Result<
                ::tokio_postgres::types::IsNull,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                ::tokio_postgres::types::ToSql::to_sql(&self.0, ty, out)
            }
        }
    };
}

pub(crate) use {int2_sql, prefixed_id};

/// A string did not name any variant of a state enum.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("unknown {kind} `{value}`")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl std::error::Error for UnknownLabel {}

/// Wires the wire labels of a state enum: `as_str`, `Display` and a
/// case-insensitive `FromStr`.
macro_rules! labels {
    ($ty:ty, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::db::UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_uppercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == normalized)
                    .ok_or_else(|| $crate::db::UnknownLabel {
                        kind: $kind,
                        value: s.to_owned(),
                    })
            }
        }
    };
}

pub(crate) use labels;
