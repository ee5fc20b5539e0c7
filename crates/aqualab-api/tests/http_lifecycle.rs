// crates/aqualab-api/tests/http_lifecycle.rs
// ============================================================================
// Module: HTTP Lifecycle Tests
// Description: End-to-end sample and result lifecycle through the router.
// Purpose: Exercise handlers, auth, and the audit pipeline together.
// Dependencies: aqualab-api, aqualab-core, tokio
// ============================================================================

//! Router-level lifecycle tests: register, analyze, verify, and audit.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions are permitted."
)]

mod common;

use aqualab_core::AuditOutcome;
use aqualab_core::AuditQuery;
use aqualab_core::AuditStore;
use axum::http::StatusCode;
use common::ADMIN_DOC;
use common::T1_DOC;
use common::TestApp;
use common::admin_token;
use common::client_token;
use common::sample_body;
use common::t1_token;
use common::t2_token;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn sample_moves_through_analysis_to_verification() {
    let app = TestApp::new();
    let admin = admin_token();
    let t1 = t1_token();
    let t2 = t2_token();

    let (status, body) =
        app.send("POST", "/api/muestras", Some(&admin), Some(sample_body("S1"))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["estado"], "Recibida");
    assert_eq!(body["data"]["firmas"]["administrador"]["documento"], ADMIN_DOC);

    let (status, body) = app
        .send(
            "POST",
            "/api/resultados/registrar/S1",
            Some(&t1),
            Some(json!({"pH": {"valor": 7}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["verificado"], false);
    assert_eq!(body["data"]["pH"]["valor"].as_f64(), Some(7.0));
    assert_eq!(body["data"]["cedulaLaboratorista"], T1_DOC);

    let (_, body) = app.send("GET", "/api/muestras/S1", Some(&admin), None).await;
    assert_eq!(body["data"]["estado"], "En análisis");

    let (status, body) = app
        .send("PUT", "/api/resultados/editar/S1", Some(&t1), Some(json!({"pH": {"valor": 7}})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "no changes made");

    let (status, _) = app.send("POST", "/api/resultados/verificar/S1", Some(&t1), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send("POST", "/api/resultados/verificar/S1", Some(&t2), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["verificado"], true);

    let (_, body) = app.send("GET", "/api/muestras/estado/Verificada", Some(&admin), None).await;
    let samples = body["data"].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["idMuestra"], "S1");

    let (status, _) = app
        .send("PUT", "/api/resultados/editar/S1", Some(&t1), Some(json!({"pH": {"valor": 8}})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn sample_reads_and_filters_go_through_the_router() {
    let app = TestApp::new();
    let admin = admin_token();
    let client = client_token();
    for id in ["M-1", "M-2"] {
        let (status, _) =
            app.send("POST", "/api/muestras", Some(&admin), Some(sample_body(id))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) =
        app.send("POST", "/api/muestras", Some(&admin), Some(sample_body("m-1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app.send("GET", "/api/muestras", Some(&client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = app.send("GET", "/api/muestras/tipo/potable", Some(&client), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    let (_, body) = app.send("GET", "/api/muestras/tipo/residual", Some(&client), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) =
        app.send("GET", "/api/muestras/estado/Perdida", Some(&client), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Recibida"));

    let (status, _) = app.send("GET", "/api/muestras/NOPE", Some(&client), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let patch = json!({"lugarMuestreo": "Planta sur"});
    let (status, body) = app.send("PUT", "/api/muestras/M-1", Some(&admin), Some(patch)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["lugarMuestreo"], "Planta sur");
    let record_id = body["data"]["_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send("PUT", "/api/muestras/M-1", Some(&admin), Some(json!({"estado": "Verificada"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app.send("DELETE", "/api/muestras/M-1", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) =
        app.send("DELETE", &format!("/api/muestras/{record_id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _) =
        app.send("DELETE", &format!("/api/muestras/{record_id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn signatures_can_be_replaced_while_received() {
    let app = TestApp::new();
    let admin = admin_token();
    app.send("POST", "/api/muestras", Some(&admin), Some(sample_body("F-1"))).await;

    let replacement = "data:image/png;base64,AAAA";
    let (status, body) = app
        .send(
            "POST",
            "/api/muestras/F-1/firma",
            Some(&admin),
            Some(json!({"tipo": "cliente", "firma": replacement})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["firmas"]["cliente"]["firma"], replacement);

    let (status, _) = app
        .send(
            "POST",
            "/api/muestras/F-1/firma",
            Some(&admin),
            Some(json!({"tipo": "cliente", "firma": "not base64!"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_request_produces_one_audit_record_with_matching_outcome() {
    let app = TestApp::new();
    let admin = admin_token();
    let t1 = t1_token();

    let requests = [
        ("POST", "/api/muestras", Some(admin.clone()), Some(sample_body("A-1"))),
        (
            "POST",
            "/api/resultados/registrar/A-1",
            Some(t1.clone()),
            Some(json!({"turbidez": {"valor": 0}})),
        ),
        (
            "PUT",
            "/api/resultados/editar/A-1",
            Some(t1.clone()),
            Some(json!({"turbidez": {"valor": -0.1}})),
        ),
        ("GET", "/api/muestras?orden=desc", None, None),
        ("GET", "/api/nada", Some(admin.clone()), None),
        ("GET", "/", None, None),
    ];
    let mut sent = Vec::new();
    for (method, uri, token, body) in requests {
        let (status, _) = app.send(method, uri, token.as_deref(), body).await;
        sent.push((method, uri, status.as_u16()));
    }
    let statuses: Vec<u16> = sent.iter().map(|(_, _, status)| *status).collect();
    assert_eq!(statuses, vec![201, 201, 400, 401, 404, 200]);

    app.flush_audit().await;
    let records = app.state.audit_store.export(&AuditQuery::default()).unwrap();
    assert_eq!(records.len(), sent.len());
    let find = |method: &str, uri: &str| {
        records
            .iter()
            .find(|record| record.accion.tipo == method && record.accion.ruta == uri)
            .unwrap()
    };
    for (method, uri, status) in &sent {
        let record = find(method, uri);
        assert_eq!(record.status_code, *status);
        assert_eq!(record.estado == AuditOutcome::Exitoso, *status < 400);
    }

    let created = find("POST", "/api/muestras");
    assert_eq!(created.detalles.sample_id.as_deref(), Some("A-1"));
    assert_eq!(created.usuario.documento, ADMIN_DOC);

    let registered = find("POST", "/api/resultados/registrar/A-1");
    assert_eq!(registered.detalles.sample_id.as_deref(), Some("A-1"));
    assert_eq!(registered.usuario.documento, T1_DOC);
    assert_eq!(registered.accion.descripcion, "POST /api/resultados/registrar/A-1");
    assert!(registered.detalles.cambios.is_none());

    let edit = find("PUT", "/api/resultados/editar/A-1");
    assert_eq!(edit.detalles.cambios, Some(json!({"turbidez": {"valor": -0.1}})));
    assert_eq!(edit.mensaje["success"], false);

    let anonymous = find("GET", "/api/muestras?orden=desc");
    assert_eq!(anonymous.usuario.id, "desconocido");
    assert!(!anonymous.accion.required_permissions.is_empty());
}
