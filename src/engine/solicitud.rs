use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::{
    db::{
        sequence::SOLICITUD_SEQUENCE,
        solicitud::{self, Estado, EstadoCotizacion, Filtro},
        Prioridad, Solicitud, Store, Ticket,
    },
    notify::{self, Notification, Notifier},
    Error,
};

use super::{
    ahora, no_blank,
    ticket::{NuevoTicket, Tickets},
    MAX_ATTEMPTS,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NuevaSolicitud {
    pub descripcion_inicial: String,
    pub prioridad: Prioridad,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Cotizacion {
    pub cotizacion: f64,
    pub descripcion_trabajo: String,
}

/// Owner edits of a still pending request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Cambios {
    pub descripcion_inicial: Option<String>,
    pub prioridad: Option<Prioridad>,
}

#[derive(Clone)]
pub struct Solicitudes {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    tickets: Tickets,
}

impl Solicitudes {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        tickets: Tickets,
    ) -> Self {
        Self {
            store,
            notifier,
            tickets,
        }
    }

    pub async fn crear(
        &self,
        nueva: NuevaSolicitud,
        username: &str,
    ) -> Result<Solicitud, Error> {
        no_blank("descripcionInicial", &nueva.descripcion_inicial)?;

        let seq = self.store.next_value(SOLICITUD_SEQUENCE).await?;
        let (fecha_creacion, hora_creacion) = ahora();
        let solicitud = Solicitud {
            id: solicitud::Id::from_seq(seq),
            username: username.to_owned(),
            descripcion_inicial: nueva.descripcion_inicial,
            descripcion_trabajo: None,
            cotizacion: None,
            prioridad: nueva.prioridad,
            estado: Estado::Pendiente,
            cotizacion_aceptada: None,
            fecha_creacion,
            hora_creacion,
            version: 0,
        };
        self.store.insert_solicitud(&solicitud).await?;

        info!(id = %solicitud.id, username, "solicitud created");
        Ok(solicitud)
    }

    pub async fn aceptar(
        &self,
        id: &solicitud::Id,
    ) -> Result<Solicitud, Error> {
        let solicitud = self
            .transition(id, |s| {
                s.estado = s.estado.aceptar().ok_or_else(|| {
                    Error::invalid_state(format!(
                        "{} is {}, only PENDIENTE requests can be accepted",
                        s.id, s.estado,
                    ))
                })?;
                Ok(())
            })
            .await?;

        info!(%id, "solicitud accepted");
        self.notify(
            &solicitud,
            format!("Tu solicitud {id} fue aceptada y será cotizada."),
        );
        Ok(solicitud)
    }

    pub async fn rechazar(
        &self,
        id: &solicitud::Id,
    ) -> Result<Solicitud, Error> {
        let solicitud = self
            .transition(id, |s| {
                s.estado = s.estado.rechazar().ok_or_else(|| {
                    Error::invalid_state(format!(
                        "{} is {}, only PENDIENTE requests can be rejected",
                        s.id, s.estado,
                    ))
                })?;
                Ok(())
            })
            .await?;

        info!(%id, "solicitud rejected");
        self.notify(&solicitud, format!("Tu solicitud {id} fue rechazada."));
        Ok(solicitud)
    }

    /// Attaches the quotation. It can be set once, while `ACEPTADO`.
    pub async fn anadir_cotizacion(
        &self,
        id: &solicitud::Id,
        cotizacion: Cotizacion,
    ) -> Result<Solicitud, Error> {
        let solicitud = self
            .transition(id, |s| {
                if s.estado != Estado::Aceptado {
                    return Err(Error::invalid_state(format!(
                        "{} is {}, only ACEPTADO requests can be quoted",
                        s.id, s.estado,
                    )));
                }
                if s.cotizacion.is_some() {
                    return Err(Error::invalid_state(format!(
                        "{} is already quoted",
                        s.id,
                    )));
                }
                if !(cotizacion.cotizacion.is_finite()
                    && cotizacion.cotizacion > 0.0)
                {
                    return Err(Error::validation(format!(
                        "cotizacion must be a positive amount, got {}",
                        cotizacion.cotizacion,
                    )));
                }
                no_blank("descripcionTrabajo", &cotizacion.descripcion_trabajo)?;

                s.cotizacion = Some(cotizacion.cotizacion);
                s.descripcion_trabajo =
                    Some(cotizacion.descripcion_trabajo.clone());
                Ok(())
            })
            .await?;

        info!(%id, cotizacion = cotizacion.cotizacion, "solicitud quoted");
        self.notify(
            &solicitud,
            format!(
                "Tu solicitud {id} fue cotizada en {:.2}: {}",
                cotizacion.cotizacion, cotizacion.descripcion_trabajo,
            ),
        );
        Ok(solicitud)
    }

    /// Owner accepts the quotation; always yields exactly one approved
    /// ticket. If the ticket cannot be created the acceptance is undone.
    ///
    /// An acceptance left without its ticket (the undo failed, or the
    /// process stopped between both writes) is resumed by calling again.
    /// Once the ticket exists, further calls fail with `InvalidState`.
    pub async fn aceptar_cotizacion_y_generar_ticket(
        &self,
        id: &solicitud::Id,
        username: &str,
    ) -> Result<Ticket, Error> {
        let mut reanudada = false;
        let solicitud = self
            .transition(id, |s| {
                check_owner(s, username)?;
                if s.estado != Estado::Aceptado {
                    return Err(Error::invalid_state(format!(
                        "{} is {}, quotations are accepted while ACEPTADO",
                        s.id, s.estado,
                    )));
                }
                reanudada = s.cotizacion_aceptada
                    == Some(EstadoCotizacion::CotizacionAceptada);
                if !reanudada {
                    check_quotation_open(s)?;
                    s.cotizacion_aceptada =
                        Some(EstadoCotizacion::CotizacionAceptada);
                }
                Ok(())
            })
            .await?;

        if reanudada {
            if let Some(ticket) = self.tickets.de_solicitud(id).await? {
                return Err(Error::invalid_state(format!(
                    "quotation of {id} already answered, see {}",
                    ticket.id,
                )));
            }
            warn!(%id, "resuming an accepted quotation without ticket");
        }

        let nuevo = NuevoTicket {
            solicitud_id: Some(solicitud.id.clone()),
            descripcion_inicial: solicitud.descripcion_inicial.clone(),
            descripcion_trabajo: solicitud.descripcion_trabajo.clone(),
            prioridad: solicitud.prioridad,
            estado: None,
            aprobado: true,
        };
        match self.tickets.crear_automatico(nuevo, &solicitud.username).await {
            Ok(ticket) => {
                info!(%id, ticket = %ticket.id, "quotation accepted");
                Ok(ticket)
            }
            // A concurrent call created the ticket first.
            Err(e @ Error::InvalidState(_)) => Err(e),
            Err(e) => {
                self.deshacer_aceptacion(id).await;
                Err(e)
            }
        }
    }

    /// Compensates a quotation acceptance whose ticket was never created.
    async fn deshacer_aceptacion(&self, id: &solicitud::Id) {
        let undone = self
            .transition(id, |s| {
                if s.cotizacion_aceptada
                    != Some(EstadoCotizacion::CotizacionAceptada)
                {
                    return Err(Error::invalid_state(format!(
                        "{} is no longer marked as accepted",
                        s.id,
                    )));
                }
                s.cotizacion_aceptada = None;
                Ok(())
            })
            .await;
        match undone {
            Ok(_) => info!(%id, "quotation acceptance rolled back"),
            Err(err) => {
                error!(%id, %err, "failed to roll back quotation acceptance");
            }
        }
    }

    pub async fn rechazar_cotizacion(
        &self,
        id: &solicitud::Id,
        username: &str,
    ) -> Result<Solicitud, Error> {
        let solicitud = self
            .transition(id, |s| {
                check_owner(s, username)?;
                check_quotation_open(s)?;
                s.estado = s.estado.rechazar_cotizacion().ok_or_else(|| {
                    Error::invalid_state(format!(
                        "{} is {}, quotations are rejected while ACEPTADO",
                        s.id, s.estado,
                    ))
                })?;
                s.cotizacion_aceptada =
                    Some(EstadoCotizacion::RechazoCotizacionUsuario);
                Ok(())
            })
            .await?;

        info!(%id, "quotation rejected");
        Ok(solicitud)
    }

    pub async fn modificar(
        &self,
        id: &solicitud::Id,
        cambios: Cambios,
        username: &str,
    ) -> Result<Solicitud, Error> {
        self.transition(id, |s| {
            check_owner_pending(s, username)?;
            if let Some(descripcion) = &cambios.descripcion_inicial {
                no_blank("descripcionInicial", descripcion)?;
                s.descripcion_inicial.clone_from(descripcion);
            }
            if let Some(prioridad) = cambios.prioridad {
                s.prioridad = prioridad;
            }
            Ok(())
        })
        .await
    }

    pub async fn eliminar(
        &self,
        id: &solicitud::Id,
        username: &str,
    ) -> Result<(), Error> {
        self.delete(id, |s| check_owner_pending(s, username)).await
    }

    /// Administrative delete, still limited to `PENDIENTE` requests.
    pub async fn eliminar_admin(
        &self,
        id: &solicitud::Id,
    ) -> Result<(), Error> {
        self.delete(id, |s| {
            if s.estado != Estado::Pendiente {
                return Err(Error::invalid_state(format!(
                    "{} is {}, only PENDIENTE requests can be deleted",
                    s.id, s.estado,
                )));
            }
            Ok(())
        })
        .await
    }

    pub async fn obtener(
        &self,
        id: &solicitud::Id,
    ) -> Result<Solicitud, Error> {
        self.store
            .get_solicitud_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(id))
    }

    pub async fn listar(
        &self,
        filtro: &Filtro,
    ) -> Result<Vec<Solicitud>, Error> {
        Ok(self.store.list_solicitudes(filtro).await?)
    }

    /// Full history, every owner and state.
    pub async fn historial(&self) -> Result<Vec<Solicitud>, Error> {
        self.listar(&Filtro::default()).await
    }

    pub async fn por_usuario(
        &self,
        username: &str,
    ) -> Result<Vec<Solicitud>, Error> {
        self.listar(&Filtro {
            username: Some(username.to_owned()),
            ..Filtro::default()
        })
        .await
    }

    pub async fn por_estado(
        &self,
        estado: Estado,
    ) -> Result<Vec<Solicitud>, Error> {
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
    ) -> Result<Vec<Solicitud>, Error> {
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
    ) -> Result<Vec<Solicitud>, Error> {
        self.listar(&Filtro {
            prioridad: Some(prioridad),
            ..Filtro::default()
        })
        .await
    }

    pub async fn por_usuario_y_prioridad(
        &self,
        username: &str,
        prioridad: Prioridad,
    ) -> Result<Vec<Solicitud>, Error> {
        self.listar(&Filtro {
            username: Some(username.to_owned()),
            prioridad: Some(prioridad),
            ..Filtro::default()
        })
        .await
    }

    fn notify(&self, solicitud: &Solicitud, body: String) {
        notify::dispatch(
            &self.notifier,
            Notification {
                to: solicitud.username.clone(),
                subject: format!("{} {}", solicitud.id, solicitud.estado),
                body,
            },
        );
    }

    /// Read, validate with `apply`, then write guarded by the read version.
    /// A lost race re-reads, so `apply` judges the winner's state.
    async fn transition<F>(
        &self,
        id: &solicitud::Id,
        mut apply: F,
    ) -> Result<Solicitud, Error>
    where
        F: FnMut(&mut Solicitud) -> Result<(), Error> + Send,
    {
        for _ in 0..MAX_ATTEMPTS {
            let mut solicitud = self.obtener(id).await?;
            apply(&mut solicitud)?;
            if self.store.update_solicitud(&solicitud).await? {
                solicitud.version += 1;
                return Ok(solicitud);
            }
            debug!(%id, "concurrent write, retrying");
        }
        Err(contended(id))
    }

    async fn delete<F>(&self, id: &solicitud::Id, check: F) -> Result<(), Error>
    where
        F: Fn(&Solicitud) -> Result<(), Error> + Send + Sync,
    {
        for _ in 0..MAX_ATTEMPTS {
            let solicitud = self.obtener(id).await?;
            check(&solicitud)?;
            if self.store.delete_solicitud(id, solicitud.version).await? {
                info!(%id, "solicitud deleted");
                return Ok(());
            }
            debug!(%id, "concurrent write, retrying");
        }
        Err(contended(id))
    }
}

fn check_owner(solicitud: &Solicitud, username: &str) -> Result<(), Error> {
    if solicitud.username != username {
        return Err(Error::permission_denied(format!(
            "{} belongs to another user",
            solicitud.id,
        )));
    }
    Ok(())
}

fn check_owner_pending(
    solicitud: &Solicitud,
    username: &str,
) -> Result<(), Error> {
    check_owner(solicitud, username)?;
    if solicitud.estado != Estado::Pendiente {
        return Err(Error::permission_denied(format!(
            "{} is {}, only PENDIENTE requests can be changed",
            solicitud.id, solicitud.estado,
        )));
    }
    Ok(())
}

/// The quotation exists and nobody has answered it yet.
fn check_quotation_open(solicitud: &Solicitud) -> Result<(), Error> {
    if let Some(respuesta) = solicitud.cotizacion_aceptada {
        return Err(Error::invalid_state(format!(
            "quotation of {} already answered: {respuesta}",
            solicitud.id,
        )));
    }
    if solicitud.cotizacion.is_none() {
        return Err(Error::invalid_state(format!(
            "{} has no quotation yet",
            solicitud.id,
        )));
    }
    Ok(())
}

fn contended(id: &solicitud::Id) -> Error {
    Error::invalid_state(format!("{id} keeps changing concurrently"))
}
