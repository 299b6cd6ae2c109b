use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    api,
    db::solicitud::{Estado, Filtro, Prioridad},
    engine::solicitud::{Cambios, Cotizacion, NuevaSolicitud},
    Error,
};

use super::{json, query, AuthClaims, SharedAppState};

pub(super) async fn add(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    payload: Result<Json<NuevaSolicitud>, JsonRejection>,
) -> Result<Json<api::Solicitud>, Error> {
    let solicitud = state
        .taller
        .solicitudes
        .crear(json(payload)?, &auth_claims.sub)
        .await?;
    Ok(Json(solicitud.into()))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ListSolicitudesInput {
    username: Option<String>,
    estado: Option<Estado>,
    prioridad: Option<Prioridad>,
}

pub(super) async fn list(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    params: Result<Query<ListSolicitudesInput>, QueryRejection>,
) -> Result<Json<api::solicitud::List>, Error> {
    let ListSolicitudesInput {
        username,
        estado,
        prioridad,
    } = query(params)?;

    let solicitudes = state
        .taller
        .solicitudes
        .listar(&Filtro {
            username: auth_claims.scope(username),
            estado,
            prioridad,
        })
        .await?;

    Ok(Json(api::solicitud::List {
        total_count: solicitudes.len(),
        solicitudes: solicitudes.into_iter().map(Into::into).collect(),
    }))
}

pub(super) async fn get(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::solicitud::Id>,
) -> Result<Json<api::Solicitud>, Error> {
    let solicitud = state.taller.solicitudes.obtener(&id).await?;
    auth_claims.require_owner_or_admin(&solicitud.username)?;
    Ok(Json(solicitud.into()))
}

#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
pub(super) enum EditSolicitudInput {
    Aceptar,
    Rechazar,
    AnadirCotizacion(Cotizacion),
    RechazarCotizacion,
    Modificar(Cambios),
}

pub(super) async fn edit(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::solicitud::Id>,
    payload: Result<Json<EditSolicitudInput>, JsonRejection>,
) -> Result<Json<api::Solicitud>, Error> {
    use EditSolicitudInput as Op;

    let solicitudes = &state.taller.solicitudes;
    let solicitud = match json(payload)? {
        Op::Aceptar => {
            auth_claims.require_admin()?;
            solicitudes.aceptar(&id).await?
        }
        Op::Rechazar => {
            auth_claims.require_admin()?;
            solicitudes.rechazar(&id).await?
        }
        Op::AnadirCotizacion(cotizacion) => {
            auth_claims.require_admin()?;
            solicitudes.anadir_cotizacion(&id, cotizacion).await?
        }
        Op::RechazarCotizacion => {
            solicitudes
                .rechazar_cotizacion(&id, &auth_claims.sub)
                .await?
        }
        Op::Modificar(cambios) => {
            solicitudes.modificar(&id, cambios, &auth_claims.sub).await?
        }
    };
    Ok(Json(solicitud.into()))
}

pub(super) async fn accept_quotation(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::solicitud::Id>,
) -> Result<Json<api::Ticket>, Error> {
    let ticket = state
        .taller
        .solicitudes
        .aceptar_cotizacion_y_generar_ticket(&id, &auth_claims.sub)
        .await?;
    Ok(Json(ticket.into()))
}

pub(super) async fn delete(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::solicitud::Id>,
) -> Result<StatusCode, Error> {
    let solicitudes = &state.taller.solicitudes;
    if auth_claims.is_admin() {
        solicitudes.eliminar_admin(&id).await?;
    } else {
        solicitudes.eliminar(&id, &auth_claims.sub).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}
