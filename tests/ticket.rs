pub mod common;

use taller::{
    db::{
        self,
        ticket::{Estado, Id},
        Memory, Prioridad, Ticket, TicketStore,
    },
    engine::{
        ticket::{Cambios, NuevoTicket},
        Taller,
    },
    Error,
};
use time::{Duration, OffsetDateTime};

fn nuevo(estado: Option<&str>) -> NuevoTicket {
    NuevoTicket {
        solicitud_id: None,
        descripcion_inicial: "Engine light on".into(),
        descripcion_trabajo: None,
        prioridad: Prioridad::Media,
        estado: estado.map(Into::into),
        aprobado: false,
    }
}

async fn crear(taller: &Taller, username: &str) -> Ticket {
    taller
        .tickets
        .crear_automatico(nuevo(None), username)
        .await
        .unwrap()
}

#[tokio::test]
async fn creates_pending_ticket() {
    let (taller, _) = common::taller();

    let ticket = crear(&taller, "alice").await;
    assert_eq!(ticket.id.as_str(), "TICKET-1");
    assert_eq!(ticket.estado, Estado::Pendiente);
    assert!(!ticket.aprobado);
    assert_eq!(ticket.solicitud_id, None);

    assert_eq!(crear(&taller, "alice").await.id.as_str(), "TICKET-2");
}

#[tokio::test]
async fn normalizes_state_label() {
    let (taller, _) = common::taller();

    let ticket = taller
        .tickets
        .crear_automatico(nuevo(Some(" pendiente ")), "alice")
        .await
        .unwrap();
    assert_eq!(ticket.estado, Estado::Pendiente);
}

#[tokio::test]
async fn rejects_unknown_state_label() {
    let (taller, _) = common::taller();

    let err = taller
        .tickets
        .crear_automatico(nuevo(Some("ARCHIVADO")), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
    assert!(taller.tickets.todos().await.unwrap().is_empty());

    let id = crear(&taller, "alice").await.id;
    let err = taller
        .tickets
        .modificar(
            &id,
            Cambios {
                estado: Some("ARCHIVADO".into()),
                ..Cambios::default()
            },
            "alice",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
}

#[tokio::test]
async fn owner_modifies_unapproved_ticket() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;

    let ticket = taller
        .tickets
        .modificar(
            &id,
            Cambios {
                descripcion_trabajo: Some("Scan OBD codes".into()),
                estado: Some("pendiente".into()),
                ..Cambios::default()
            },
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(ticket.descripcion_trabajo.as_deref(), Some("Scan OBD codes"));
    assert_eq!(ticket.descripcion_inicial, "Engine light on");
    assert_eq!(ticket.estado, Estado::Pendiente);
    assert_eq!(ticket.version, 1);
}

#[tokio::test]
async fn owner_cannot_pick_workshop_states() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;

    for label in [
        "APROBADO",
        "RECHAZADO",
        "TRABAJO_EN_PROGRESO",
        "TRABAJO_TERMINADO",
        "PENDIENTE_PAGO",
        "VALOR_PAGADO",
    ] {
        let err = taller
            .tickets
            .modificar(
                &id,
                Cambios {
                    estado: Some(label.into()),
                    ..Cambios::default()
                },
                "alice",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)), "{label}: {err}");

        let err = taller
            .tickets
            .crear_automatico(nuevo(Some(label)), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)), "{label}: {err}");
    }

    let ticket = taller.tickets.obtener(&id).await.unwrap();
    assert_eq!(ticket.estado, Estado::Pendiente);
    assert!(!ticket.aprobado);
    assert_eq!(ticket.version, 0);
    assert_eq!(taller.tickets.todos().await.unwrap().len(), 1);

    let ticket = taller.tickets.aprobar(&id).await.unwrap();
    assert_eq!(ticket.estado, Estado::Aprobado);
    assert!(ticket.aprobado);
}

#[tokio::test]
async fn rejected_ticket_never_starts_work() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;
    taller.tickets.rechazar(&id).await.unwrap();

    let err = taller
        .tickets
        .avanzar(&id, Estado::TrabajoEnProgreso)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");
    assert_eq!(
        taller.tickets.obtener(&id).await.unwrap().estado,
        Estado::Rechazado,
    );
}

#[tokio::test]
async fn non_owner_cannot_modify_or_delete() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;

    let err = taller
        .tickets
        .modificar(&id, Cambios::default(), "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)), "{err}");

    let err = taller.tickets.eliminar(&id, "bob").await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)), "{err}");

    taller.tickets.obtener(&id).await.unwrap();
}

#[tokio::test]
async fn approved_ticket_is_frozen_for_owner() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;
    taller.tickets.aprobar(&id).await.unwrap();

    let err = taller
        .tickets
        .modificar(&id, Cambios::default(), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)), "{err}");

    let err = taller.tickets.eliminar(&id, "alice").await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)), "{err}");
}

#[tokio::test]
async fn deletes_only_pending_ticket() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;
    taller.tickets.rechazar(&id).await.unwrap();

    let err = taller.tickets.eliminar(&id, "alice").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");

    let id = crear(&taller, "alice").await.id;
    taller.tickets.eliminar(&id, "alice").await.unwrap();
    let err = taller.tickets.obtener(&id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
}

#[tokio::test]
async fn reviews_only_unapproved_pending_ticket() {
    let (taller, outbox) = common::taller();
    let id = crear(&taller, "alice").await.id;

    let ticket = taller.tickets.aprobar(&id).await.unwrap();
    assert_eq!(ticket.estado, Estado::Aprobado);
    assert!(ticket.aprobado);

    let err = taller.tickets.aprobar(&id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");
    let err = taller.tickets.rechazar(&id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");

    let id = crear(&taller, "bob").await.id;
    let ticket = taller.tickets.rechazar(&id).await.unwrap();
    assert_eq!(ticket.estado, Estado::Rechazado);
    assert!(!ticket.aprobado);

    let sent = outbox.wait_for(2).await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|n| n.to == "alice"));
    assert!(sent.iter().any(|n| n.to == "bob"));
}

#[tokio::test]
async fn advances_through_work_and_billing() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;

    let err = taller
        .tickets
        .avanzar(&id, Estado::TrabajoEnProgreso)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");

    taller.tickets.aprobar(&id).await.unwrap();
    for estado in [
        Estado::TrabajoEnProgreso,
        Estado::TrabajoTerminado,
        Estado::PendientePago,
        Estado::ValorPagado,
    ] {
        let ticket = taller.tickets.avanzar(&id, estado).await.unwrap();
        assert_eq!(ticket.estado, estado);
    }

    let err = taller
        .tickets
        .avanzar(&id, Estado::ValorPagado)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");
}

#[tokio::test]
async fn cannot_skip_steps() {
    let (taller, _) = common::taller();
    let id = crear(&taller, "alice").await.id;
    taller.tickets.aprobar(&id).await.unwrap();

    let err = taller
        .tickets
        .avanzar(&id, Estado::PendientePago)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");
    assert_eq!(
        taller.tickets.obtener(&id).await.unwrap().estado,
        Estado::Aprobado,
    );
}

#[tokio::test]
async fn fails_on_unknown_ticket() {
    let (taller, _) = common::taller();
    let id = Id::from("TICKET-404");

    let err = taller.tickets.obtener(&id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    let err = taller.tickets.aprobar(&id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    let err = taller.tickets.eliminar(&id, "alice").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
}

#[tokio::test]
async fn lists_with_filters() {
    let (taller, _) = common::taller();
    let a1 = crear(&taller, "alice").await.id;
    let b1 = crear(&taller, "bob").await.id;
    let a2 = crear(&taller, "alice").await.id;
    taller.tickets.aprobar(&a2).await.unwrap();

    let ids = |list: Vec<Ticket>| {
        list.into_iter().map(|t| t.id).collect::<Vec<_>>()
    };
    let t = &taller.tickets;

    assert_eq!(
        ids(t.todos().await.unwrap()),
        [a1.clone(), b1.clone(), a2.clone()],
    );
    assert_eq!(
        ids(t.por_usuario("alice").await.unwrap()),
        [a1.clone(), a2.clone()],
    );
    assert_eq!(
        ids(t.por_estado(Estado::Pendiente).await.unwrap()),
        [a1.clone(), b1],
    );
    assert_eq!(
        ids(t.por_usuario_y_estado("alice", Estado::Aprobado).await.unwrap()),
        [a2],
    );
    assert_eq!(ids(t.por_prioridad(Prioridad::Media).await.unwrap()).len(), 3);
    assert!(t.por_prioridad(Prioridad::Alta).await.unwrap().is_empty());

    let today = OffsetDateTime::now_utc().date();
    assert_eq!(
        t.por_fechas(today - Duration::days(1), today + Duration::days(1))
            .await
            .unwrap()
            .len(),
        3,
    );
    assert!(t
        .por_fechas(today + Duration::days(1), today + Duration::days(2))
        .await
        .unwrap()
        .is_empty());

    let err = t
        .por_fechas(today, today - Duration::days(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
}

#[tokio::test]
async fn store_refuses_ids_without_sequence() {
    let (taller, _) = common::taller();
    let mut ticket = crear(&taller, "alice").await;
    ticket.id = Id::from("TICKET-draft");

    let store = Memory::new();
    let err = store.insert_ticket(&ticket).await.unwrap_err();
    assert!(matches!(err, db::Error::MalformedId(_)), "{err}");
    assert!(store.get_ticket_by_id(&ticket.id).await.unwrap().is_none());
}
