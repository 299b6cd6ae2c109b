mod factura;
mod solicitud;
mod ticket;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Json, Query,
    },
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{engine::Taller, Error};

pub type SharedAppState = Arc<AppState>;

pub struct AppState {
    pub taller: Taller,

    pub jwt_decoding_key: DecodingKey,
}

impl AppState {
    pub fn new(taller: Taller, jwt_secret: &str) -> Self {
        Self {
            taller,
            jwt_decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/solicitud", get(solicitud::list).post(solicitud::add))
        .route(
            "/solicitud/:id",
            get(solicitud::get)
                .patch(solicitud::edit)
                .delete(solicitud::delete),
        )
        .route(
            "/solicitud/:id/cotizacion",
            post(solicitud::accept_quotation),
        )
        .route("/ticket", get(ticket::list).post(ticket::add))
        .route(
            "/ticket/:id",
            get(ticket::get).patch(ticket::edit).delete(ticket::delete),
        )
        .route("/factura", get(factura::list).post(factura::add))
        .route("/factura/:id", get(factura::get).patch(factura::edit))
        .with_state(Arc::new(state))
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Cliente,
    Admin,
}

/// Claims of a token issued by the identity provider. `sub` is the username.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

impl AuthClaims {
    fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn require_admin(&self) -> Result<(), Error> {
        if !self.is_admin() {
            return Err(Error::permission_denied(format!(
                "{} is not an administrator",
                self.sub,
            )));
        }
        Ok(())
    }

    /// Admins see everything, anyone else only what they own.
    fn require_owner_or_admin(&self, owner: &str) -> Result<(), Error> {
        if !self.is_admin() && self.sub != owner {
            return Err(Error::permission_denied(format!(
                "{} does not own this resource",
                self.sub,
            )));
        }
        Ok(())
    }

    /// Listing scope: admins may narrow to any owner, others are pinned to
    /// themselves.
    fn scope(&self, requested: Option<String>) -> Option<String> {
        if self.is_admin() {
            requested
        } else {
            Some(self.sub.clone())
        }
    }
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
        }
        .into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unexpected(err) => {
                error!(%err, "unexpected failure");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "unexpected failure",
                )
                    .into_response();
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Malformed bodies are validation failures, not framework rejections.
fn json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| Error::validation(e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Error> {
    params
        .map(|Query(value)| value)
        .map_err(|e| Error::validation(e.body_text()))
}
