use std::sync::Arc;

use serde::Deserialize;
use time::Date;
use tracing::{debug, info};

use crate::{
    db::{
        sequence::TICKET_SEQUENCE,
        solicitud,
        ticket::{self, Estado, Filtro},
        Prioridad, Store, Ticket,
    },
    notify::{self, Notification, Notifier},
    Error,
};

use super::{ahora, check_rango, no_blank, MAX_ATTEMPTS};

/// Seed of a new ticket, either typed in by its owner or derived from an
/// accepted quotation.
#[derive(Clone, Debug)]
pub struct NuevoTicket {
    pub solicitud_id: Option<solicitud::Id>,
    pub descripcion_inicial: String,
    pub descripcion_trabajo: Option<String>,
    pub prioridad: Prioridad,

    /// Case-insensitive state label; `PENDIENTE` when absent. Owners may
    /// not pick a review, work or billing state.
    pub estado: Option<String>,
    pub aprobado: bool,
}

/// Owner edits of a not yet approved ticket.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Cambios {
    pub descripcion_inicial: Option<String>,
    pub descripcion_trabajo: Option<String>,
    pub estado: Option<String>,
}

#[derive(Clone)]
pub struct Tickets {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl Tickets {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn crear_automatico(
        &self,
        nuevo: NuevoTicket,
        username: &str,
    ) -> Result<Ticket, Error> {
        no_blank("descripcionInicial", &nuevo.descripcion_inicial)?;
        let estado = match nuevo.estado.as_deref() {
            Some(label) => estado_de_cliente(label)?,
            None => Estado::Pendiente,
        };

        let seq = self.store.next_value(TICKET_SEQUENCE).await?;
        let (fecha_creacion, hora_creacion) = ahora();
        let ticket = Ticket {
            id: ticket::Id::from_seq(seq),
            solicitud_id: nuevo.solicitud_id,
            username: username.to_owned(),
            estado,
            aprobado: nuevo.aprobado,
            prioridad: nuevo.prioridad,
            descripcion_inicial: nuevo.descripcion_inicial,
            descripcion_trabajo: nuevo.descripcion_trabajo,
            fecha_creacion,
            hora_creacion,
            version: 0,
        };
        if !self.store.insert_ticket(&ticket).await? {
            return Err(Error::invalid_state(format!(
                "{} already has a ticket",
                ticket
                    .solicitud_id
                    .as_ref()
                    .map_or(ticket.id.as_str(), |s| s.as_str()),
            )));
        }

        info!(
            id = %ticket.id,
            username,
            solicitud = ?ticket.solicitud_id.as_ref().map(|s| s.as_str()),
            "ticket created",
        );
        Ok(ticket)
    }

    pub async fn modificar(
        &self,
        id: &ticket::Id,
        cambios: Cambios,
        username: &str,
    ) -> Result<Ticket, Error> {
        self.transition(id, |ticket| {
            if ticket.aprobado {
                return Err(Error::permission_denied(format!(
                    "{} is approved and can no longer be modified",
                    ticket.id,
                )));
            }
            check_owner(ticket, username)?;

            if let Some(estado) = &cambios.estado {
                ticket.estado = estado_de_cliente(estado)?;
            }
            if let Some(descripcion) = &cambios.descripcion_inicial {
                no_blank("descripcionInicial", descripcion)?;
                ticket.descripcion_inicial.clone_from(descripcion);
            }
            if let Some(descripcion) = &cambios.descripcion_trabajo {
                ticket.descripcion_trabajo = Some(descripcion.clone());
            }
            Ok(())
        })
        .await
    }

    pub async fn eliminar(
        &self,
        id: &ticket::Id,
        username: &str,
    ) -> Result<(), Error> {
        for _ in 0..MAX_ATTEMPTS {
            let ticket = self.obtener(id).await?;
            check_owner(&ticket, username)?;
            if ticket.aprobado {
                return Err(Error::permission_denied(format!(
                    "{id} is approved and can no longer be deleted",
                )));
            }
            if ticket.estado != Estado::Pendiente {
                return Err(Error::invalid_state(format!(
                    "{id} is {}, only PENDIENTE tickets can be deleted",
                    ticket.estado,
                )));
            }

            if self.store.delete_ticket(id, ticket.version).await? {
                info!(%id, username, "ticket deleted");
                return Ok(());
            }
            debug!(%id, "concurrent write, retrying");
        }
        Err(contended(id))
    }

    pub async fn aprobar(&self, id: &ticket::Id) -> Result<Ticket, Error> {
        self.revisar(id, true).await
    }

    pub async fn rechazar(&self, id: &ticket::Id) -> Result<Ticket, Error> {
        self.revisar(id, false).await
    }

    async fn revisar(
        &self,
        id: &ticket::Id,
        aprobar: bool,
    ) -> Result<Ticket, Error> {
        let ticket = self
            .transition(id, |ticket| {
                ticket.estado = ticket
                    .estado
                    .revisar(ticket.aprobado, aprobar)
                    .ok_or_else(|| {
                        Error::invalid_state(format!(
                            "{} is {}{}, only unapproved PENDIENTE tickets \
                             can be reviewed",
                            ticket.id,
                            ticket.estado,
                            if ticket.aprobado { " and approved" } else { "" },
                        ))
                    })?;
                ticket.aprobado = aprobar;
                Ok(())
            })
            .await?;

        info!(id = %ticket.id, estado = %ticket.estado, "ticket reviewed");
        notify::dispatch(
            &self.notifier,
            Notification {
                to: ticket.username.clone(),
                subject: format!("{} {}", ticket.id, ticket.estado),
                body: format!(
                    "Tu ticket {} ha sido marcado como {}.",
                    ticket.id, ticket.estado,
                ),
            },
        );
        Ok(ticket)
    }

    /// Moves a ticket one work/billing step forward; `destino` must be the
    /// step that follows the current state.
    pub async fn avanzar(
        &self,
        id: &ticket::Id,
        destino: Estado,
    ) -> Result<Ticket, Error> {
        let ticket = self
            .transition(id, |ticket| {
                match ticket.estado.siguiente(ticket.aprobado) {
                    Some(next) if next == destino => {
                        ticket.estado = next;
                        Ok(())
                    }
                    _ => Err(Error::invalid_state(format!(
                        "{} cannot move from {} to {destino}",
                        ticket.id, ticket.estado,
                    ))),
                }
            })
            .await?;
        info!(id = %ticket.id, estado = %ticket.estado, "ticket advanced");
        Ok(ticket)
    }

    pub async fn obtener(&self, id: &ticket::Id) -> Result<Ticket, Error> {
        self.store
            .get_ticket_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(id))
    }

    /// The ticket generated from an accepted quotation, if any.
    pub async fn de_solicitud(
        &self,
        solicitud_id: &solicitud::Id,
    ) -> Result<Option<Ticket>, Error> {
        Ok(self
            .listar(&Filtro {
                solicitud_id: Some(solicitud_id.clone()),
                ..Filtro::default()
            })
            .await?
            .into_iter()
            .next())
    }

    pub async fn listar(&self, filtro: &Filtro) -> Result<Vec<Ticket>, Error> {
        check_rango(filtro.desde, filtro.hasta)?;
        Ok(self.store.list_tickets(filtro).await?)
    }

    pub async fn todos(&self) -> Result<Vec<Ticket>, Error> {
        self.listar(&Filtro::default()).await
    }

    pub async fn por_usuario(
        &self,
        username: &str,
    ) -> Result<Vec<Ticket>, Error> {
        self.listar(&Filtro {
            username: Some(username.to_owned()),
            ..Filtro::default()
        })
        .await
    }

    pub async fn por_estado(&self, estado: Estado) -> Result<Vec<Ticket>, Error> {
        self.listar(&Filtro {
            estado: Some(estado),
            ..Filtro::default()
        })
        .await
    }

    pub async fn por_usuario_y_estado(
        &self,
        username: &str,
        estado: Estado,
    ) -> Result<Vec<Ticket>, Error> {
        self.listar(&Filtro {
            username: Some(username.to_owned()),
            estado: Some(estado),
            ..Filtro::default()
        })
        .await
    }

    pub async fn por_prioridad(
        &self,
        prioridad: Prioridad,
    ) -> Result<Vec<Ticket>, Error> {
        self.listar(&Filtro {
            prioridad: Some(prioridad),
            ..Filtro::default()
        })
        .await
    }

    pub async fn por_fechas(
        &self,
        desde: Date,
        hasta: Date,
    ) -> Result<Vec<Ticket>, Error> {
        self.listar(&Filtro {
            desde: Some(desde),
            hasta: Some(hasta),
            ..Filtro::default()
        })
        .await
    }

    /// Read, validate with `apply`, then write guarded by the read version.
    /// A lost race re-reads, so `apply` judges the winner's state.
    async fn transition<F>(
        &self,
        id: &ticket::Id,
        mut apply: F,
    ) -> Result<Ticket, Error>
    where
        F: FnMut(&mut Ticket) -> Result<(), Error> + Send,
    {
        for _ in 0..MAX_ATTEMPTS {
            let mut ticket = self.obtener(id).await?;
            apply(&mut ticket)?;
            if self.store.update_ticket(&ticket).await? {
                ticket.version += 1;
                return Ok(ticket);
            }
            debug!(%id, "concurrent write, retrying");
        }
        Err(contended(id))
    }
}

fn check_owner(ticket: &Ticket, username: &str) -> Result<(), Error> {
    if ticket.username != username {
        return Err(Error::permission_denied(format!(
            "{} belongs to another user",
            ticket.id,
        )));
    }
    Ok(())
}

/// Parses a state label chosen by the ticket owner.
fn estado_de_cliente(label: &str) -> Result<Estado, Error> {
    let estado = label.parse::<Estado>()?;
    if !estado.asignable_por_cliente() {
        return Err(Error::permission_denied(format!(
            "{estado} can only be set by the workshop",
        )));
    }
    Ok(estado)
}

fn contended(id: &ticket::Id) -> Error {
    Error::invalid_state(format!("{id} keeps changing concurrently"))
}
