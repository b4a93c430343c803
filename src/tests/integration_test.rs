use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::broker::topic::Role;
use crate::client::PubSubClient;
use crate::config::Settings;
use crate::tests::support::{publishers, subscribers, wait_for_status};
use crate::transport::Server;
use crate::utils::error::BrokerError;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.port = 0;
    settings.broker.shutdown_grace_secs = 2;
    settings
}

async fn start_server(settings: &Settings) -> (Server, JoinHandle<Result<(), BrokerError>>) {
    let server = Server::bind(settings).await.expect("bind");
    let runner = server.clone();
    let accept = tokio::spawn(async move { runner.run().await });
    (server, accept)
}

async fn next(client: &mut PubSubClient) -> Option<String> {
    timeout(Duration::from_secs(2), client.next_message())
        .await
        .expect("timed out waiting for the broker")
        .expect("read failed")
}

#[tokio::test]
async fn test_scenario_a_subscriber_receives_publisher_message() {
    let (server, _accept) = start_server(&test_settings()).await;
    let addr = server.local_addr();

    let mut x = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    wait_for_status(server.registry(), |s| subscribers(s, "A") == 1).await;

    let mut y = PubSubClient::connect(addr, Role::Publisher, "A").await.unwrap();
    y.send("hello").await.unwrap();

    let expected = format!("[A] Publisher {}: hello", y.local_addr());
    assert_eq!(next(&mut x).await.as_deref(), Some(expected.as_str()));

    server.shutdown().await;
}

#[tokio::test]
async fn test_scenario_b_terminate_does_not_affect_later_publishers() {
    let (server, _accept) = start_server(&test_settings()).await;
    let addr = server.local_addr();

    let mut x = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    wait_for_status(server.registry(), |s| subscribers(s, "A") == 1).await;

    let mut y = PubSubClient::connect(addr, Role::Publisher, "A").await.unwrap();
    y.send("TERMINATE").await.unwrap();
    // broker closes Y's connection
    assert_eq!(next(&mut y).await, None);
    wait_for_status(server.registry(), |s| publishers(s, "A") == 0).await;

    let mut z = PubSubClient::connect(addr, Role::Publisher, "A").await.unwrap();
    z.send("still here").await.unwrap();

    let expected = format!("[A] Publisher {}: still here", z.local_addr());
    assert_eq!(next(&mut x).await.as_deref(), Some(expected.as_str()));

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_terminate_unregisters_publisher() {
    let (server, _accept) = start_server(&test_settings()).await;

    let publisher = PubSubClient::connect(server.local_addr(), Role::Publisher, " news:eu ")
        .await
        .unwrap();
    assert_eq!(publisher.role(), Role::Publisher);
    assert_eq!(publisher.topic(), "news:eu");
    wait_for_status(server.registry(), |s| publishers(s, "news:eu") == 1).await;

    publisher.terminate().await.unwrap();
    wait_for_status(server.registry(), |s| s.publishers.is_empty()).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_scenario_c_malformed_handshake_is_closed() {
    let (server, _accept) = start_server(&test_settings()).await;

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream.write_all(b"FOO:bar\n").await.unwrap();

    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap_or(0);
    assert_eq!(n, 0);

    assert_eq!(server.registry().subscriber_count("bar").await, 0);
    assert_eq!(server.registry().publisher_count("bar").await, 0);
    assert!(server.registry().is_empty().await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_scenario_d_dead_subscriber_does_not_block_delivery() {
    let (server, _accept) = start_server(&test_settings()).await;
    let addr = server.local_addr();

    let x1 = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    let mut x2 = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    wait_for_status(server.registry(), |s| subscribers(s, "A") == 2).await;

    let mut publisher = PubSubClient::connect(addr, Role::Publisher, "A").await.unwrap();
    wait_for_status(server.registry(), |s| publishers(s, "A") == 1).await;
    publisher.send("ping").await.unwrap();

    let expected = format!("[A] Publisher {}: ping", publisher.local_addr());
    assert_eq!(next(&mut x2).await.as_deref(), Some(expected.as_str()));

    // force-close X1 from outside
    drop(x1);
    wait_for_status(server.registry(), |s| subscribers(s, "A") == 1).await;

    let delivered = server
        .broadcaster()
        .publish("A", "pong", &publisher.local_addr().to_string())
        .await;
    assert_eq!(delivered, 1);
    let expected = format!("[A] Publisher {}: pong", publisher.local_addr());
    assert_eq!(next(&mut x2).await.as_deref(), Some(expected.as_str()));

    server.shutdown().await;
}

#[tokio::test]
async fn test_subscribers_on_other_topics_receive_nothing() {
    let (server, _accept) = start_server(&test_settings()).await;
    let addr = server.local_addr();

    let mut on_a = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    let mut on_b = PubSubClient::connect(addr, Role::Subscriber, "B").await.unwrap();
    wait_for_status(server.registry(), |s| {
        subscribers(s, "A") == 1 && subscribers(s, "B") == 1
    })
    .await;

    let mut publisher = PubSubClient::connect(addr, Role::Publisher, "A").await.unwrap();
    publisher.send("only for A").await.unwrap();
    assert!(next(&mut on_a).await.unwrap().ends_with(": only for A"));

    let nothing = timeout(Duration::from_millis(200), on_b.next_message()).await;
    assert!(nothing.is_err(), "subscriber on B received {nothing:?}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_clients_and_stops_accepting() {
    let (server, accept) = start_server(&test_settings()).await;
    let addr = server.local_addr();

    let mut sub = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    let mut publisher = PubSubClient::connect(addr, Role::Publisher, "A").await.unwrap();
    wait_for_status(server.registry(), |s| {
        subscribers(s, "A") == 1 && publishers(s, "A") == 1
    })
    .await;

    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown hung");
    assert!(!server.is_running());
    assert!(server.registry().is_empty().await);

    assert_eq!(next(&mut sub).await, None);
    assert_eq!(next(&mut publisher).await, None);

    let result = timeout(Duration::from_secs(2), accept)
        .await
        .expect("accept loop did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(TcpStream::connect(addr).await.is_err());

    // second call is a no-op
    server.shutdown().await;
}

#[tokio::test]
async fn test_connections_over_the_limit_are_refused() {
    let mut settings = test_settings();
    settings.broker.max_connections = 1;
    let (server, _accept) = start_server(&settings).await;
    let addr = server.local_addr();

    let _first = PubSubClient::connect(addr, Role::Subscriber, "A").await.unwrap();
    wait_for_status(server.registry(), |s| subscribers(s, "A") == 1).await;

    // refused connections are closed before anything is read from them
    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = timeout(Duration::from_secs(2), second.read(&mut buf))
        .await
        .expect("server did not close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(server.registry().subscriber_count("A").await, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_binding_a_taken_port_fails() {
    let (server, _accept) = start_server(&test_settings()).await;
    let mut settings = test_settings();
    settings.server.port = server.local_addr().port();

    let err = Server::bind(&settings).await.err().expect("second bind succeeded");
    assert!(matches!(err, BrokerError::Bind { .. }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_aborts_worker_stuck_delivering() {
    let mut settings = test_settings();
    settings.broker.shutdown_grace_secs = 0;
    settings.broker.write_timeout_ms = 60_000;
    let (server, _accept) = start_server(&settings).await;
    let addr = server.local_addr();

    // never reads, so its receive window eventually fills up
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"SUBSCRIBER:A\n").await.unwrap();
    wait_for_status(server.registry(), |s| subscribers(s, "A") == 1).await;

    let mut publisher = TcpStream::connect(addr).await.unwrap();
    publisher.write_all(b"PUBLISHER:A\n").await.unwrap();
    wait_for_status(server.registry(), |s| publishers(s, "A") == 1).await;
    let flood = tokio::spawn(async move {
        let line = format!("{}\n", "x".repeat(60_000));
        while publisher.write_all(line.as_bytes()).await.is_ok() {}
    });

    // a stuck delivery keeps the registry locked
    let mut stuck = false;
    for _ in 0..200 {
        if timeout(Duration::from_millis(50), server.registry().len())
            .await
            .is_err()
        {
            stuck = true;
            break;
        }
    }
    assert!(stuck, "delivery to the stalled subscriber never blocked");

    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown hung on the stuck worker");
    assert!(!server.is_running());
    assert!(server.registry().is_empty().await);

    flood.abort();
    drop(stalled);
}
