//! HTTP administration client against an in-process fake API.
//!
//! The fake serves the REST shape the client expects and delegates the
//! actual state to [`InMemoryGatewayAdmin`].

#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use shared_gateway::admin::{GatewayAdmin, HttpGatewayAdmin, InMemoryGatewayAdmin, LiveSnapshot};
use shared_gateway::config::{AdminConfig, ReconcileConfig};
use shared_gateway::domain::{Gateway, GatewaySelector, LiveResource, Template};
use shared_gateway::error::ReconcileError;
use shared_gateway::service::{ReconcileSession, ResourceFetcher};

#[derive(Debug, Clone)]
struct FakeApi {
    store: Arc<InMemoryGatewayAdmin>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
}

#[derive(Debug, Deserialize)]
struct ResourceQuery {
    limit: u32,
    position: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateGateway {
    name: String,
}

fn record(api: &FakeApi, headers: &HeaderMap) {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Ok(mut seen) = api.authorization.lock() {
        seen.push(value);
    }
}

fn upstream(e: &ReconcileError) -> Response {
    (StatusCode::NOT_FOUND, e.to_string()).into_response()
}

async fn list_gateways(State(api): State<FakeApi>, headers: HeaderMap) -> Response {
    record(&api, &headers);
    match api.store.list_gateways().await {
        Ok(items) => Json(json!({ "item": items })).into_response(),
        Err(e) => upstream(&e),
    }
}

async fn create_gateway(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<CreateGateway>,
) -> Response {
    record(&api, &headers);
    match api.store.create_gateway(&body.name).await {
        Ok(gateway) => (StatusCode::CREATED, Json(gateway)).into_response(),
        Err(e) => upstream(&e),
    }
}

async fn list_resources(
    State(api): State<FakeApi>,
    Path(gateway_id): Path<String>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    record(&api, &headers);
    match api
        .store
        .list_resources(&gateway_id, query.position.as_deref(), query.limit)
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => upstream(&e),
    }
}

/// Starts the fake API on an ephemeral port and returns its base URL.
async fn serve(api: FakeApi) -> String {
    let app = Router::new()
        .route("/restapis", get(list_gateways).post(create_gateway))
        .route("/restapis/{id}/resources", get(list_resources))
        .with_state(api);
    let listener = assert_ok!(tokio::net::TcpListener::bind("127.0.0.1:0").await);
    let addr = assert_ok!(listener.local_addr());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn fake_api(resource_count: usize) -> FakeApi {
    let root = LiveResource::root("r0");
    let mut resources = vec![root.clone()];
    for n in 1..resource_count {
        resources.push(LiveResource::child(format!("r{n}"), &root, format!("p{n}")));
    }
    FakeApi {
        store: Arc::new(InMemoryGatewayAdmin::from_snapshot(LiveSnapshot {
            gateways: vec![Gateway::new("gw1", "dev-shared")],
            resources: HashMap::from([("gw1".to_string(), resources)]),
        })),
        authorization: Arc::new(Mutex::new(Vec::new())),
    }
}

fn client(endpoint: String, token: Option<&str>) -> HttpGatewayAdmin {
    assert_ok!(HttpGatewayAdmin::new(&AdminConfig {
        endpoint,
        token: token.map(str::to_string),
        timeout_secs: 5,
    }))
}

#[tokio::test]
async fn fetcher_pages_through_http_listing() {
    let api = fake_api(7);
    let endpoint = serve(api.clone()).await;
    let admin = client(endpoint, Some("secret"));

    let resources = assert_ok!(ResourceFetcher::new(&admin, 3).fetch_all("gw1").await);
    let ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["r0", "r1", "r2", "r3", "r4", "r5", "r6"]);
    assert_eq!(api.store.resource_page_requests(), 3);

    let Ok(seen) = api.authorization.lock() else {
        panic!("authorization log poisoned");
    };
    assert!(seen.iter().all(|h| h.as_deref() == Some("Bearer secret")));
}

#[tokio::test]
async fn unknown_gateway_maps_to_upstream_error() {
    let endpoint = serve(fake_api(1)).await;
    let admin = client(format!("{endpoint}/"), None);

    let err = assert_err!(admin.list_resources("nope", None, 10).await);
    match err {
        ReconcileError::Upstream(message) => assert!(message.contains("404")),
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_upstream_error() {
    let admin = client("http://127.0.0.1:9".to_string(), None);
    let err = assert_err!(admin.list_gateways().await);
    assert!(matches!(err, ReconcileError::Upstream(_)));
}

#[tokio::test]
async fn session_creates_gateway_over_http() {
    let api = fake_api(1);
    let endpoint = serve(api.clone()).await;
    let admin: Arc<dyn GatewayAdmin> = Arc::new(client(endpoint, None));

    let template = assert_ok!(Template::from_value(&json!({
        "Resources": {
            "ApiGatewayRestApi": {"Type": "AWS::ApiGateway::RestApi"},
            "ApiGatewayResourceHealth": {
                "Type": "AWS::ApiGateway::Resource",
                "Properties": {
                    "ParentId": {"Fn::GetAtt": ["ApiGatewayRestApi", "RootResourceId"]},
                    "PathPart": "health",
                    "RestApiId": {"Ref": "ApiGatewayRestApi"}
                }
            }
        }
    })));

    let config = assert_ok!(ReconcileConfig::from_lookup(|key| {
        (key == "SHARED_GATEWAY_NAME").then(|| "qa-shared".to_string())
    }));
    assert_eq!(config.gateway, GatewaySelector::Name("qa-shared".to_string()));

    let mut session = ReconcileSession::new(admin, config);
    let reconciliation = assert_ok!(session.run(&template).await);

    assert!(reconciliation.report.gateway_created);
    assert_eq!(api.store.gateways_created(), 1);
    let gateway_id = reconciliation.report.gateway.id.clone();
    assert_eq!(
        reconciliation
            .template
            .to_value()
            .pointer("/Resources/ApiGatewayResourceHealth/Properties/RestApiId"),
        Some(&json!(gateway_id))
    );
}
