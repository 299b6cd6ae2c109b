use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;
use time::Date;

use crate::{
    api,
    db::{
        factura::{Filtro, Pago},
        ticket, Prioridad,
    },
    Error,
};

use super::{json, query, AuthClaims, SharedAppState};

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct AddFacturaInput {
    ticket_id: ticket::Id,
    cotizacion: f64,
}

pub(super) async fn add(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    payload: Result<Json<AddFacturaInput>, JsonRejection>,
) -> Result<Json<api::Factura>, Error> {
    auth_claims.require_admin()?;
    let AddFacturaInput {
        ticket_id,
        cotizacion,
    } = json(payload)?;

    let factura = state
        .taller
        .facturas
        .generar_desde_ticket(&ticket_id, cotizacion)
        .await?;
    Ok(Json(factura.into()))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct ListFacturasInput {
    username: Option<String>,
    pago: Option<Pago>,
    prioridad: Option<Prioridad>,
    fecha_inicio: Option<Date>,
    fecha_fin: Option<Date>,
}

pub(super) async fn list(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    params: Result<Query<ListFacturasInput>, QueryRejection>,
) -> Result<Json<api::factura::Resumen>, Error> {
    let ListFacturasInput {
        username,
        pago,
        prioridad,
        fecha_inicio,
        fecha_fin,
    } = query(params)?;

    let resumen = state
        .taller
        .facturas
        .listar_con_filtros(&Filtro {
            username: auth_claims.scope(username),
            pago,
            prioridad,
            desde: fecha_inicio,
            hasta: fecha_fin,
        })
        .await?;
    Ok(Json(resumen.into()))
}

pub(super) async fn get(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::factura::Id>,
) -> Result<Json<api::Factura>, Error> {
    let factura = state.taller.facturas.obtener(&id).await?;
    auth_claims.require_owner_or_admin(&factura.username)?;
    Ok(Json(factura.into()))
}

#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
pub(super) enum EditFacturaInput {
    RegistrarPago,
}

pub(super) async fn edit(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::factura::Id>,
    payload: Result<Json<EditFacturaInput>, JsonRejection>,
) -> Result<Json<api::Factura>, Error> {
    use EditFacturaInput as Op;

    auth_claims.require_admin()?;
    let factura = match json(payload)? {
        Op::RegistrarPago => state.taller.facturas.registrar_pago(&id).await?,
    };
    Ok(Json(factura.into()))
}
