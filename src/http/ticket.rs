use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use time::Date;

use crate::{
    api,
    db::{
        ticket::{Estado, Filtro},
        Prioridad,
    },
    engine::ticket::{Cambios, NuevoTicket},
    Error,
};

use super::{json, query, AuthClaims, SharedAppState};

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct AddTicketInput {
    descripcion_inicial: String,
    descripcion_trabajo: Option<String>,
    prioridad: Prioridad,
    estado: Option<String>,
}

pub(super) async fn add(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    payload: Result<Json<AddTicketInput>, JsonRejection>,
) -> Result<Json<api::Ticket>, Error> {
    let AddTicketInput {
        descripcion_inicial,
        descripcion_trabajo,
        prioridad,
        estado,
    } = json(payload)?;

    let ticket = state
        .taller
        .tickets
        .crear_automatico(
            NuevoTicket {
                solicitud_id: None,
                descripcion_inicial,
                descripcion_trabajo,
                prioridad,
                estado,
                aprobado: false,
            },
            &auth_claims.sub,
        )
        .await?;
    Ok(Json(ticket.into()))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct ListTicketsInput {
    username: Option<String>,
    estado: Option<Estado>,
    prioridad: Option<Prioridad>,
    fecha_inicio: Option<Date>,
    fecha_fin: Option<Date>,
}

pub(super) async fn list(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    params: Result<Query<ListTicketsInput>, QueryRejection>,
) -> Result<Json<api::ticket::List>, Error> {
    let ListTicketsInput {
        username,
        estado,
        prioridad,
        fecha_inicio,
        fecha_fin,
    } = query(params)?;

    let tickets = state
        .taller
        .tickets
        .listar(&Filtro {
            username: auth_claims.scope(username),
            estado,
            prioridad,
            desde: fecha_inicio,
            hasta: fecha_fin,
            ..Filtro::default()
        })
        .await?;

    Ok(Json(api::ticket::List {
        total_count: tickets.len(),
        tickets: tickets.into_iter().map(Into::into).collect(),
    }))
}

pub(super) async fn get(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, Error> {
    let ticket = state.taller.tickets.obtener(&id).await?;
    auth_claims.require_owner_or_admin(&ticket.username)?;
    Ok(Json(ticket.into()))
}

#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
pub(super) enum EditTicketInput {
    Modificar(Cambios),
    Aprobar,
    Rechazar,
    Avanzar { estado: Estado },
}

pub(super) async fn edit(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    payload: Result<Json<EditTicketInput>, JsonRejection>,
) -> Result<Json<api::Ticket>, Error> {
    use EditTicketInput as Op;

    let tickets = &state.taller.tickets;
    let ticket = match json(payload)? {
        Op::Modificar(cambios) => {
            tickets.modificar(&id, cambios, &auth_claims.sub).await?
        }
        Op::Aprobar => {
            auth_claims.require_admin()?;
            tickets.aprobar(&id).await?
        }
        Op::Rechazar => {
            auth_claims.require_admin()?;
            tickets.rechazar(&id).await?
        }
        Op::Avanzar { estado } => {
            auth_claims.require_admin()?;
            tickets.avanzar(&id, estado).await?
        }
    };
    Ok(Json(ticket.into()))
}

pub(super) async fn delete(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<StatusCode, Error> {
    state.taller.tickets.eliminar(&id, &auth_claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
