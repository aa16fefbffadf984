#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{app::TestAppBuilder, fake_transport::FakeConnector, message_frame};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use wardwatch::{app::AlertHandler, core::Alert};

const STEP: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_app_delivers_alerts_to_all_handlers_in_order() {
    let (connector, mut accepted) = FakeConnector::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let second_order = order.clone();
    let second: AlertHandler = Arc::new(move |alert: &Alert| {
        second_order.lock().unwrap().push(format!("second:{}", alert));
    });

    let app = TestAppBuilder::new()
        .with_connector(connector)
        .with_handler(second)
        .start()
        .await
        .unwrap();

    let mut broker = timeout(STEP, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(broker.endpoint, "http://127.0.0.1:9/ws");
    let (_, subscribe) = broker.accept().await;
    assert!(subscribe.contains("destination:/topic/alerts"));

    broker.send(message_frame("Patient 1 risk: HIGH -> [BP]"));
    broker.send(message_frame("Patient 2 risk: LOW -> []"));

    let received = app.wait_for_alerts(2, STEP).await;
    assert_eq!(
        received,
        vec!["Patient 1 risk: HIGH -> [BP]", "Patient 2 risk: LOW -> []"]
    );
    assert_eq!(
        *order.lock().unwrap(),
        vec![
            "second:Patient 1 risk: HIGH -> [BP]",
            "second:Patient 2 risk: LOW -> []"
        ]
    );

    app.shutdown(STEP).await.unwrap();
}

#[tokio::test]
async fn test_app_without_transport_runs_and_shuts_down() {
    let app = TestAppBuilder::new().without_connector().start().await.unwrap();

    assert!(!app.channel.has_transport());
    assert!(!app.channel.is_running());
    // Listeners may still be registered and notified manually.
    app.channel.notify_listeners(&Alert::new("manual"));
    assert_eq!(app.received(), vec!["manual"]);

    app.shutdown(STEP).await.unwrap();
}

#[tokio::test]
async fn test_app_keeps_retrying_after_drop() {
    let (connector, mut accepted) = FakeConnector::new();
    let app = TestAppBuilder::new()
        .with_connector(connector)
        .start()
        .await
        .unwrap();

    let mut first = timeout(STEP, accepted.recv()).await.unwrap().unwrap();
    first.accept().await;
    first.close();

    let mut second = timeout(STEP, accepted.recv()).await.unwrap().unwrap();
    second.accept().await;
    second.send(message_frame("back online"));

    assert_eq!(app.wait_for_alerts(1, STEP).await, vec!["back online"]);
    app.shutdown(STEP).await.unwrap();
}

#[tokio::test]
async fn test_app_shutdown_stops_reconnecting() {
    let (connector, mut accepted) = FakeConnector::new();
    connector.refuse_connections(true);
    let app = TestAppBuilder::new()
        .with_connector(connector.clone())
        .start()
        .await
        .unwrap();
    let channel = app.channel.clone();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(channel.is_running());

    app.shutdown(STEP).await.unwrap();
    timeout(STEP, async {
        while channel.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection loop kept running after shutdown");

    connector.refuse_connections(false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(accepted.try_recv().is_err());
}
