//! Construction, handle caching, reconstruction and shutdown of connections.

use std::str::FromStr;
use std::sync::Arc;

use courier::{Connection, ConnectionConfig, ConstructionError, args};
use courier_test::{LoopbackConnector, LoopbackServer, ScriptedConnector, arithmetic};
use expect_test::expect;
use serde_json::json;

// ============================================================================
// Construction
// ============================================================================

#[test]
fn unknown_server_is_a_construction_error() {
    let connector = LoopbackConnector::new();
    let err = ConnectionConfig::new("nobody_home")
        .connect(connector)
        .unwrap_err();
    assert!(matches!(err, ConstructionError::UnknownService(_)));
    expect![["no server registered under the name `nobody_home`"]].assert_eq(&err.to_string());
}

#[test]
fn malformed_address_never_reaches_the_connector() {
    let connector = ScriptedConnector::new();
    let err = ConnectionConfig::new("localhost :80")
        .connect(connector.clone())
        .unwrap_err();
    expect![["invalid server address `localhost :80`: address contains whitespace"]]
        .assert_eq(&err.to_string());
    assert!(connector.transports().is_empty());
}

#[test]
fn load_balancing_policy_goes_to_the_connector() {
    let connector = LoopbackConnector::serving(LoopbackServer::new("my_server", arithmetic()));
    let _connection = ConnectionConfig::new("my_server")
        .load_balancing_policy("round_robin")
        .connect(connector.clone())
        .unwrap();
    let _plain = ConnectionConfig::new("my_server")
        .connect(connector.clone())
        .unwrap();

    assert_eq!(
        connector.policies(),
        vec![Some("round_robin".to_string()), None]
    );
}

#[test]
fn connect_from_a_config_string() {
    let connector = LoopbackConnector::serving(LoopbackServer::new("my_server", arithmetic()));
    let config = ConnectionConfig::from_str(
        r#"{"address": "my_server", "options": {"wait_for_ready": false}}"#,
    )
    .unwrap();
    let connection = Connection::connect(config, connector).unwrap();

    assert_eq!(connection.address(), "my_server");
    assert!(!connection.options().wait_for_ready);
    assert_eq!(connection.invoke("add", args![4, 7]).unwrap(), json!(11));
}

// ============================================================================
// Handle caching
// ============================================================================

#[test]
fn handles_are_identity_stable() {
    let connection = ConnectionConfig::new("my_server")
        .connect(ScriptedConnector::new())
        .unwrap();

    let add = connection.method("add");
    assert!(Arc::ptr_eq(&add, &connection.method("add")));
    assert!(!Arc::ptr_eq(&add, &connection.method("sub")));
    assert_eq!(add.method(), "add");

    let futures = connection.futures();
    let async_add = futures.method("add");
    assert!(Arc::ptr_eq(&async_add, &futures.method("add")));
    assert_eq!(async_add.method(), "add");
}

#[test]
fn handles_are_shared_across_threads() {
    let connection = Arc::new(
        ConnectionConfig::new("my_server")
            .connect(ScriptedConnector::new())
            .unwrap(),
    );

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            std::thread::spawn(move || connection.method("add"))
        })
        .collect();
    let handles: Vec<_> = threads
        .into_iter()
        .map(|thread| thread.join().unwrap())
        .collect();

    for handle in &handles {
        assert!(Arc::ptr_eq(handle, &handles[0]));
    }
}

// ============================================================================
// Reconstruction and shutdown
// ============================================================================

#[test]
fn reconnect_builds_a_fresh_transport() {
    let connector = ScriptedConnector::new();
    let connection = ConnectionConfig::new("my_server")
        .compress(true)
        .connect(connector.clone())
        .unwrap();

    let copy = connection.reconnect().unwrap();
    assert_eq!(copy.config(), connection.config());

    let transports = connector.transports();
    assert_eq!(transports.len(), 2);
    assert!(!Arc::ptr_eq(&transports[0], &transports[1]));

    copy.shutdown();
    assert_eq!(transports[0].shutdown_count(), 0);
    assert_eq!(transports[1].shutdown_count(), 1);
}

#[test]
fn reconnected_connection_works_after_the_original_shuts_down() {
    let connector = LoopbackConnector::serving(LoopbackServer::new("my_server", arithmetic()));
    let connection = ConnectionConfig::new("my_server")
        .connect(connector.clone())
        .unwrap();
    let copy = connection.reconnect().unwrap();
    drop(connection);

    assert_eq!(copy.invoke("add", args![4, 7]).unwrap(), json!(11));
    let transports = connector.transports();
    assert_eq!(transports[0].shutdown_count(), 1);
    assert_eq!(transports[1].shutdown_count(), 0);
}

#[test]
fn shutdown_is_idempotent() {
    let connector = ScriptedConnector::new();
    let connection = ConnectionConfig::new("my_server")
        .connect(connector.clone())
        .unwrap();
    let transport = connector.last().unwrap();

    assert!(!connection.is_shut_down());
    connection.shutdown();
    connection.shutdown();
    assert!(connection.is_shut_down());
    drop(connection);

    assert_eq!(transport.shutdown_count(), 1);
}

#[test]
fn dropping_a_connection_shuts_it_down() {
    let connector = ScriptedConnector::new();
    drop(
        ConnectionConfig::new("my_server")
            .connect(connector.clone())
            .unwrap(),
    );
    assert_eq!(connector.last().unwrap().shutdown_count(), 1);
}

#[test]
fn calls_after_shutdown_fail() {
    let connector = LoopbackConnector::serving(LoopbackServer::new("my_server", arithmetic()));
    let connection = ConnectionConfig::new("my_server").connect(connector).unwrap();
    let add = connection.method("add");
    connection.shutdown();

    let err = add.call(args![4, 7]).unwrap_err();
    assert_eq!(err.code(), courier::StatusCode::Unavailable);
    let err = connection
        .futures()
        .invoke("add", args![4, 7])
        .wait()
        .unwrap_err();
    assert_eq!(err.code(), courier::StatusCode::Unavailable);
}

#[test]
fn handles_survive_shutdown() {
    let connection = ConnectionConfig::new("my_server")
        .connect(ScriptedConnector::new())
        .unwrap();
    let add = connection.method("add");
    let async_add = connection.futures().method("add");

    connection.shutdown();

    assert!(Arc::ptr_eq(&add, &connection.method("add")));
    assert!(Arc::ptr_eq(&async_add, &connection.futures().method("add")));
}

#[test]
fn shutdown_fails_a_blocking_call_waiting_for_the_server() {
    let server = LoopbackServer::new("my_server", arithmetic());
    server.set_available(false);
    let connector = LoopbackConnector::serving(server);
    let connection = Arc::new(ConnectionConfig::new("my_server").connect(connector).unwrap());

    let waiting = {
        let connection = connection.clone();
        std::thread::spawn(move || connection.invoke("add", args![4, 7]))
    };
    std::thread::sleep(std::time::Duration::from_millis(30));
    connection.shutdown();

    let err = waiting.join().unwrap().unwrap_err();
    assert_eq!(err.code(), courier::StatusCode::Unavailable);
    expect![["UNAVAILABLE: transport has been shut down"]].assert_eq(&err.to_string());
}

#[test]
fn service_names_may_contain_colons() {
    let connector = LoopbackConnector::serving(LoopbackServer::new("my_server:v2", arithmetic()));
    let connection = ConnectionConfig::new("my_server:v2")
        .connect(connector)
        .unwrap();

    assert_eq!(connection.invoke("add", args![4, 7]).unwrap(), json!(11));
    assert_eq!(
        connection.config().parse_address().unwrap(),
        courier::Address::Service("my_server:v2".to_string())
    );
}
