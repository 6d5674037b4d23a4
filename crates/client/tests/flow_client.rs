mod common;

use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use flowlink_client::stores::UpdateOutcome;
use flowlink_client::timeseries::{ChartSink, ChartTrace};
use flowlink_client::ws::ReconnectConfig;
use flowlink_client::{ApiClient, FlowClient, FlowConfig, FlowEvent};
use flowlink_shared::{ApiError, EnvelopeError};
use serde_json::{json, Value};
use url::Url;

use common::{sensor_report, spawn_upstream, SENSOR_TOPIC};

#[derive(Clone, Default)]
struct Upstream {
    queries: Arc<Mutex<Vec<Value>>>,
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<(String, ChartTrace)>>);

impl ChartSink for RecordingSink {
    fn extend_series(&self, series_id: &str, trace: &ChartTrace) {
        self.0
            .lock()
            .unwrap()
            .push((series_id.to_string(), trace.clone()));
    }
}

async fn full_struct_and_states() -> Json<Value> {
    Json(json!({
        "things": [{
            "id": 15,
            "alias": "Living room sensor",
            "address": "15",
            "location_alias": "Living room",
            "services": [{"name": "sensor_temp", "topic": SENSOR_TOPIC}]
        }],
        "states": [{
            "name": "sensor@rt:dev/rn:zw/ad:1/sv:sensor_temp/ad:15_0",
            "value_type": "float",
            "value": 19.5,
            "thing_id": 15
        }]
    }))
}

async fn timeseries(State(up): State<Upstream>, Json(query): Json<Value>) -> Json<Value> {
    up.queries.lock().unwrap().push(query);
    Json(json!([[1700000000, 21.5], [1700000060, 22.0], [1700000120, null]]))
}

async fn events(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket| async move {
        let frames = [
            sensor_report(21.5),
            json!({"topic": SENSOR_TOPIC, "type": "evt"}).to_string(),
        ];
        for frame in frames {
            if socket.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = socket.recv().await {}
    })
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn start_upstream() -> (std::net::SocketAddr, Upstream) {
    let up = Upstream::default();
    let app = Router::new()
        .route(
            "/api/flow/context/full_struct_and_states",
            get(full_struct_and_states),
        )
        .route("/flow/timeseries/rest", post(timeseries))
        .route("/flow/flow7/ws", get(events))
        .route("/broken", get(broken))
        .with_state(up.clone());
    (spawn_upstream(app).await, up)
}

fn config_for(addr: std::net::SocketAddr) -> FlowConfig {
    let page = Url::parse(&format!("http://{addr}/flow/ui")).unwrap();
    let mut config = FlowConfig::new(page, "flow7");
    config.reconnect = ReconnectConfig {
        initial_delay_ms: 20,
        ..ReconnectConfig::default()
    };
    config
}

#[tokio::test]
async fn snapshot_then_stream_keeps_store_current() {
    let (addr, _) = start_upstream().await;
    let client = FlowClient::new(&config_for(addr));

    let mut events = client.start().await.expect("first start");
    assert!(client.start().await.is_none());

    let updated = events.recv().await.unwrap();
    let key = match updated {
        FlowEvent::StateUpdated { key, outcome } => {
            assert_eq!(outcome, UpdateOutcome::Changed);
            key
        }
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!(
        key.to_string(),
        "sensor@rt:dev/rn:zw/ad:1/sv:sensor_temp/ad:15_0"
    );

    match events.recv().await.unwrap() {
        FlowEvent::EnvelopeRejected { error } => {
            assert!(matches!(error, EnvelopeError::Malformed { .. }))
        }
        other => panic!("unexpected event {other:?}"),
    }

    {
        let store = client.store().read();
        let entry = store.state(&key.to_string()).unwrap();
        assert_eq!(entry.value, json!(21.5));
        assert_eq!(entry.revision, 2);
        assert_eq!(entry.thing_id, Some(15));
        assert_eq!(
            store.lookup_by_topic(SENSOR_TOPIC).map(|t| t.alias.as_str()),
            Some("Living room sensor")
        );
    }

    client.close().await;
}

#[tokio::test]
async fn timeseries_is_rendered_in_milliseconds() {
    let (addr, up) = start_upstream().await;
    let client = FlowClient::new(&config_for(addr));
    let sink = RecordingSink::default();
    let query = json!({"proc_id": 1, "field_name": "value", "relative_time": "1h"});

    let count = client
        .load_timeseries_into(&sink, "temp-living-room", &query)
        .await
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(up.queries.lock().unwrap().as_slice(), &[query]);
    let calls = sink.0.lock().unwrap();
    assert_eq!(calls[0].0, "temp-living-room");
    assert_eq!(
        calls[0].1.x,
        vec![1_700_000_000_000, 1_700_000_060_000, 1_700_000_120_000]
    );
    assert_eq!(calls[0].1.y, vec![Some(21.5), Some(22.0), None]);
}

#[tokio::test]
async fn non_200_responses_are_reported_not_retried() {
    let (addr, _) = start_upstream().await;
    let api = ApiClient::with_base_url(format!("http://{addr}"));

    let err = api.get_json::<Value>("/broken").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Http {
            status: 500,
            body: "boom".into()
        }
    );
}

#[tokio::test]
async fn failed_snapshot_still_starts_the_stream() {
    let (addr, _) = start_upstream().await;
    let config = config_for(addr);
    let context = config.address_context();
    // Snapshot requests under this base get a 404.
    let api = ApiClient::with_base_url(format!("http://{addr}/missing"));
    let connection =
        flowlink_client::ws::ConnectionManager::new(context.ws_url(), config.reconnect.clone());
    let client = FlowClient::from_parts(context, api, connection);

    let mut events = client.start().await.unwrap();
    match events.recv().await.unwrap() {
        FlowEvent::StateUpdated { outcome, .. } => assert_eq!(outcome, UpdateOutcome::Inserted),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(client.store().read().things().is_empty());
    client.close().await;
}
