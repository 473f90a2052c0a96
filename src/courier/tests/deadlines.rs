//! Deadlines and per-call options as they reach the transport.

use std::time::Duration;

use courier::{CallOverrides, ConnectionConfig, Deadline, StatusCode, args};
use courier_test::{LoopbackConnector, LoopbackServer, ScriptedConnector, arithmetic};
use serde_json::json;

fn scripted(config: ConnectionConfig) -> (courier::Connection, std::sync::Arc<courier_test::ScriptedTransport>) {
    courier_test::init_test_logging();
    let connector = ScriptedConnector::new();
    let connection = config.connect(connector.clone()).unwrap();
    let transport = connector.last().unwrap();
    transport.push_response(Ok(json!(null)));
    (connection, transport)
}

#[test]
fn no_timeout_means_no_deadline() {
    let (connection, transport) = scripted(ConnectionConfig::new("my_server"));
    connection.invoke("add", args![1, 2]).unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.deadline, Deadline::INFINITE);
    assert!(request.deadline.remaining().is_none());
}

#[test]
fn zero_timeout_means_no_deadline() {
    let (connection, transport) =
        scripted(ConnectionConfig::new("my_server").call_timeout(Duration::ZERO));
    connection.invoke("add", args![1, 2]).unwrap();

    assert!(transport.last_request().unwrap().deadline.is_infinite());
}

#[test]
fn connection_timeout_sets_the_deadline() {
    let (connection, transport) =
        scripted(ConnectionConfig::new("my_server").call_timeout(Duration::from_secs(5)));
    let _future = connection.futures().invoke("add", args![1, 2]);

    let remaining = transport.last_request().unwrap().deadline.remaining().unwrap();
    assert!(remaining <= Duration::from_secs(5));
    assert!(remaining > Duration::from_secs(4));
}

#[test]
fn inherited_deadline_caps_the_timeout() {
    let (connection, transport) =
        scripted(ConnectionConfig::new("my_server").call_timeout(Duration::from_secs(3600)));
    let inherited = Deadline::after(Duration::from_secs(2));
    connection
        .invoke_with("add", args![1, 2], &CallOverrides::new().deadline(inherited))
        .unwrap();

    assert_eq!(transport.last_request().unwrap().deadline, inherited);
}

#[test]
fn timeout_earlier_than_inherited_deadline_wins() {
    let (connection, transport) = scripted(ConnectionConfig::new("my_server"));
    let inherited = Deadline::after(Duration::from_secs(3600));
    let _future = connection.futures().invoke_with(
        "add",
        args![1, 2],
        &CallOverrides::new()
            .timeout(Duration::from_secs(1))
            .deadline(inherited),
    );

    let deadline = transport.last_request().unwrap().deadline;
    assert!(deadline < inherited);
    assert!(deadline.remaining().unwrap() <= Duration::from_secs(1));
}

#[test]
fn options_reach_the_transport() {
    let (connection, transport) = scripted(
        ConnectionConfig::new("my_server")
            .wait_for_ready(false)
            .compress(true)
            .chunk_tensors(true),
    );
    connection.invoke("add", args![1, 2]).unwrap();
    let _future = connection.futures().invoke_with(
        "add",
        args![1, 2],
        &CallOverrides::new().wait_for_ready(true).compress(false),
    );

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    assert_eq!(requests[0].method, "add");
    assert_eq!(requests[0].args, vec![json!(1), json!(2)]);
    assert!(!requests[0].wait_for_ready);
    assert!(requests[0].compress);
    assert!(requests[0].chunk_tensors);

    assert!(requests[1].wait_for_ready);
    assert!(!requests[1].compress);
    assert!(requests[1].chunk_tensors);
}

#[test]
fn unavailable_server_fails_fast_without_wait_for_ready() {
    courier_test::init_test_logging();
    let server = LoopbackServer::new("my_server", arithmetic());
    server.set_available(false);
    let connector = LoopbackConnector::serving(server);
    let connection = ConnectionConfig::new("my_server")
        .wait_for_ready(false)
        .connect(connector)
        .unwrap();

    let err = connection.invoke("add", args![4, 7]).unwrap_err();
    assert_eq!(err.code(), StatusCode::Unavailable);

    let err = connection
        .futures()
        .invoke("add", args![4, 7])
        .wait()
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Unavailable);
}

#[test]
fn waiting_for_an_unavailable_server_hits_the_deadline() {
    courier_test::init_test_logging();
    let server = LoopbackServer::new("my_server", arithmetic());
    server.set_available(false);
    let connector = LoopbackConnector::serving(server.clone());
    let connection = ConnectionConfig::new("my_server")
        .call_timeout(Duration::from_millis(100))
        .connect(connector)
        .unwrap();

    let err = connection.invoke("add", args![4, 7]).unwrap_err();
    assert_eq!(err.code(), StatusCode::DeadlineExceeded);

    let err = connection
        .futures()
        .invoke("add", args![4, 7])
        .wait()
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::DeadlineExceeded);
    assert_eq!(server.call_count(), 0);
}

#[test]
fn waiting_call_proceeds_once_the_server_is_ready() {
    courier_test::init_test_logging();
    let server = LoopbackServer::new("my_server", arithmetic());
    server.set_available(false);
    let connector = LoopbackConnector::serving(server.clone());
    let connection = ConnectionConfig::new("my_server")
        .call_timeout(Duration::from_secs(10))
        .connect(connector)
        .unwrap();

    let future = connection.futures().invoke("add", args![4, 7]);
    std::thread::sleep(Duration::from_millis(30));
    assert!(!future.is_done());

    server.set_available(true);
    assert_eq!(future.wait().unwrap(), json!(11));
}

#[test]
fn slow_method_exceeds_its_deadline() {
    courier_test::init_test_logging();
    let server = LoopbackServer::new("my_server", arithmetic());
    server.bind("slow", |_| {
        std::thread::sleep(Duration::from_millis(150));
        Ok(json!("finished"))
    });
    let connector = LoopbackConnector::serving(server);
    let connection = ConnectionConfig::new("my_server").connect(connector).unwrap();

    let overrides = CallOverrides::new().timeout(Duration::from_millis(50));
    let err = connection.invoke_with("slow", args![], &overrides).unwrap_err();
    assert_eq!(err.code(), StatusCode::DeadlineExceeded);

    let err = connection
        .futures()
        .invoke_with("slow", args![], &overrides)
        .wait()
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::DeadlineExceeded);
}
