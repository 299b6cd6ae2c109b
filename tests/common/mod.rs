#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use taller::{
    api,
    db::{
        self, factura, solicitud, ticket, Factura, FacturaStore, Memory,
        Sequences, Solicitud, SolicitudStore, Ticket, TicketStore,
    },
    engine::Taller,
    http::{self, AuthClaims, Role},
    notify::{self, LogNotifier, Notification, Notifier},
};
use time::{Duration, OffsetDateTime};
use tokio::{
    net,
    sync::{Mutex, Notify},
    task,
};

const JWT_SECRET: &str = "test-secret";

/// Engines over a fresh in-memory store, recording notifications.
pub fn taller() -> (Taller, Arc<Outbox>) {
    let outbox = Arc::new(Outbox::default());
    let taller = Taller::new(Arc::new(Memory::new()), outbox.clone());
    (taller, outbox)
}

/// Serves the router over a fresh in-memory store on an ephemeral port.
pub async fn spawn_app() -> String {
    let listener = net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local address");
    let app = http::router(http::AppState::new(
        Taller::new(Arc::new(Memory::new()), Arc::new(LogNotifier)),
        JWT_SECRET,
    ));
    task::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("http://{addr}")
}

#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<Notification>>,
    arrived: Notify,
}

impl Outbox {
    /// Waits until at least `count` fire-and-forget sends have landed, then
    /// drains them.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        tokio::time::timeout(StdDuration::from_secs(5), async {
            while self.sent.lock().await.len() < count {
                self.arrived.notified().await;
            }
        })
        .await
        .expect("notifications did not arrive");
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, n: &Notification) -> Result<(), notify::Error> {
        self.sent.lock().await.push(n.clone());
        self.arrived.notify_one();
        Ok(())
    }
}

/// Never delivers anything.
pub struct Unreachable;

#[async_trait]
impl Notifier for Unreachable {
    async fn send(&self, _: &Notification) -> Result<(), notify::Error> {
        Err(notify::Error::Timeout)
    }
}

/// [`Memory`] with switchable outages. With `cascade`, a failed ticket
/// insert also takes solicitud writes down, until [`Faulty::restore`].
#[derive(Default)]
pub struct Faulty {
    inner: Memory,
    tickets_down: AtomicBool,
    solicitudes_down: AtomicBool,
    cascade: bool,
}

impl Faulty {
    pub fn tickets_down() -> Self {
        Self {
            tickets_down: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn cascading() -> Self {
        Self {
            cascade: true,
            ..Self::tickets_down()
        }
    }

    pub fn restore(&self) {
        self.tickets_down.store(false, Ordering::SeqCst);
        self.solicitudes_down.store(false, Ordering::SeqCst);
    }

    fn down(what: &str) -> db::Error {
        db::Error::Unavailable(format!("{what} are down"))
    }
}

#[async_trait]
impl Sequences for Faulty {
    async fn next_value(&self, counter: &str) -> Result<i64, db::Error> {
        self.inner.next_value(counter).await
    }
}

#[async_trait]
impl SolicitudStore for Faulty {
    async fn get_solicitud_by_id(
        &self,
        id: &solicitud::Id,
    ) -> Result<Option<Solicitud>, db::Error> {
        self.inner.get_solicitud_by_id(id).await
    }

    async fn insert_solicitud(&self, s: &Solicitud) -> Result<(), db::Error> {
        self.inner.insert_solicitud(s).await
    }

    async fn update_solicitud(
        &self,
        s: &Solicitud,
    ) -> Result<bool, db::Error> {
        if self.solicitudes_down.load(Ordering::SeqCst) {
            return Err(Self::down("solicitudes"));
        }
        self.inner.update_solicitud(s).await
    }

    async fn delete_solicitud(
        &self,
        id: &solicitud::Id,
        version: i64,
    ) -> Result<bool, db::Error> {
        self.inner.delete_solicitud(id, version).await
    }

    async fn list_solicitudes(
        &self,
        filtro: &solicitud::Filtro,
    ) -> Result<Vec<Solicitud>, db::Error> {
        self.inner.list_solicitudes(filtro).await
    }
}

#[async_trait]
impl TicketStore for Faulty {
    async fn get_ticket_by_id(
        &self,
        id: &ticket::Id,
    ) -> Result<Option<Ticket>, db::Error> {
        self.inner.get_ticket_by_id(id).await
    }

    async fn insert_ticket(&self, t: &Ticket) -> Result<bool, db::Error> {
        if self.tickets_down.load(Ordering::SeqCst) {
            if self.cascade {
                self.solicitudes_down.store(true, Ordering::SeqCst);
            }
            return Err(Self::down("tickets"));
        }
        self.inner.insert_ticket(t).await
    }

    async fn update_ticket(&self, t: &Ticket) -> Result<bool, db::Error> {
        self.inner.update_ticket(t).await
    }

    async fn delete_ticket(
        &self,
        id: &ticket::Id,
        version: i64,
    ) -> Result<bool, db::Error> {
        self.inner.delete_ticket(id, version).await
    }

    async fn list_tickets(
        &self,
        filtro: &ticket::Filtro,
    ) -> Result<Vec<Ticket>, db::Error> {
        self.inner.list_tickets(filtro).await
    }
}

#[async_trait]
impl FacturaStore for Faulty {
    async fn get_factura_by_id(
        &self,
        id: &factura::Id,
    ) -> Result<Option<Factura>, db::Error> {
        self.inner.get_factura_by_id(id).await
    }

    async fn insert_factura(&self, f: &Factura) -> Result<bool, db::Error> {
        self.inner.insert_factura(f).await
    }

    async fn update_factura(&self, f: &Factura) -> Result<bool, db::Error> {
        self.inner.update_factura(f).await
    }

    async fn list_facturas(
        &self,
        filtro: &factura::Filtro,
    ) -> Result<Vec<Factura>, db::Error> {
        self.inner.list_facturas(filtro).await
    }
}

pub struct Client {
    inner: reqwest::Client,
    base_url: String,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.to_owned(),
            auth_token: None,
        }
    }

    pub fn auth(mut self, username: &str, role: Role) -> Self {
        let claims = AuthClaims {
            sub: username.to_owned(),
            role,
            exp: (OffsetDateTime::now_utc() + Duration::hours(1))
                .unix_timestamp(),
        };
        self.auth_token = Some(
            encode(
                &Header::default(),
                &claims,
                &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
            )
            .expect("failed to sign a token"),
        );
        self
    }

    async fn send(
        &self,
        mut req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StatusCode> {
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req.send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))
    }

    async fn json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, StatusCode> {
        Ok(self
            .send(req)
            .await?
            .json::<T>()
            .await
            .expect("failed to get a response"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn add_solicitud(
        &self,
        descripcion_inicial: &str,
        prioridad: &str,
    ) -> Result<api::Solicitud, StatusCode> {
        let req = self.inner.post(self.url("/solicitud")).json(&json!({
            "descripcionInicial": descripcion_inicial,
            "prioridad": prioridad,
        }));
        self.json(req).await
    }

    pub async fn add_solicitud_raw(
        &self,
        body: Value,
    ) -> Result<api::Solicitud, StatusCode> {
        let req = self.inner.post(self.url("/solicitud")).json(&body);
        self.json(req).await
    }

    pub async fn get_solicitud(
        &self,
        id: &api::solicitud::Id,
    ) -> Result<api::Solicitud, StatusCode> {
        let req = self.inner.get(self.url(&format!("/solicitud/{id}")));
        self.json(req).await
    }

    pub async fn get_solicitudes(
        &self,
        query: &str,
    ) -> Result<api::solicitud::List, StatusCode> {
        let req = self.inner.get(self.url(&format!("/solicitud?{query}")));
        self.json(req).await
    }

    pub async fn edit_solicitud(
        &self,
        id: &api::solicitud::Id,
        op: Value,
    ) -> Result<api::Solicitud, StatusCode> {
        let req = self
            .inner
            .patch(self.url(&format!("/solicitud/{id}")))
            .json(&op);
        self.json(req).await
    }

    pub async fn accept_quotation(
        &self,
        id: &api::solicitud::Id,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self
            .inner
            .post(self.url(&format!("/solicitud/{id}/cotizacion")));
        self.json(req).await
    }

    pub async fn delete_solicitud(
        &self,
        id: &api::solicitud::Id,
    ) -> Result<(), StatusCode> {
        let req = self.inner.delete(self.url(&format!("/solicitud/{id}")));
        self.send(req).await.map(drop)
    }

    pub async fn add_ticket(
        &self,
        descripcion_inicial: &str,
        prioridad: &str,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self.inner.post(self.url("/ticket")).json(&json!({
            "descripcionInicial": descripcion_inicial,
            "prioridad": prioridad,
        }));
        self.json(req).await
    }

    pub async fn get_ticket(
        &self,
        id: &api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self.inner.get(self.url(&format!("/ticket/{id}")));
        self.json(req).await
    }

    pub async fn get_tickets(
        &self,
        query: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        let req = self.inner.get(self.url(&format!("/ticket?{query}")));
        self.json(req).await
    }

    pub async fn edit_ticket(
        &self,
        id: &api::ticket::Id,
        op: Value,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self
            .inner
            .patch(self.url(&format!("/ticket/{id}")))
            .json(&op);
        self.json(req).await
    }

    pub async fn delete_ticket(
        &self,
        id: &api::ticket::Id,
    ) -> Result<(), StatusCode> {
        let req = self.inner.delete(self.url(&format!("/ticket/{id}")));
        self.send(req).await.map(drop)
    }

    pub async fn add_factura(
        &self,
        ticket_id: &api::ticket::Id,
        cotizacion: f64,
    ) -> Result<api::Factura, StatusCode> {
        let req = self.inner.post(self.url("/factura")).json(&json!({
            "ticketId": ticket_id,
            "cotizacion": cotizacion,
        }));
        self.json(req).await
    }

    pub async fn get_facturas(
        &self,
        query: &str,
    ) -> Result<api::factura::Resumen, StatusCode> {
        let req = self.inner.get(self.url(&format!("/factura?{query}")));
        self.json(req).await
    }

    pub async fn pay_factura(
        &self,
        id: &api::factura::Id,
    ) -> Result<api::Factura, StatusCode> {
        let req = self
            .inner
            .patch(self.url(&format!("/factura/{id}")))
            .json(&json!({ "op": "registrarPago" }));
        self.json(req).await
    }
}
