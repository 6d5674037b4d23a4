//! Local upstream for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

pub const SENSOR_TOPIC: &str = "pt:j1/mt:evt/rt:dev/rn:zw/ad:1/sv:sensor_temp/ad:15_0";

/// Serve `app` on an ephemeral local port.
pub async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn sensor_report(value: f64) -> String {
    serde_json::json!({
        "topic": SENSOR_TOPIC,
        "serv": "sensor_temp",
        "type": "evt.sensor.report",
        "val_t": "float",
        "val": value,
        "props": {"unit": "C"},
        "tags": null
    })
    .to_string()
}
