//! End-to-end tests for the client/server pipeline.
//!
//! These spin up the real dispatcher/listener stack via `testsupport`,
//! connect with the public `client` library, and exercise the wire protocol
//! the way a real client would.

use client::Client;
use common::WalMode;
use protocol::frame;
use std::collections::HashMap;
use std::time::Duration;
use testsupport::TestServer;
use tokio::net::TcpStream;
use types::{Record, Value};

#[tokio::test]
async fn set_then_get_round_trips_a_string() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    client
        .set("abc", Record::new(Value::from("test"), i64::MAX))
        .await
        .unwrap();

    let record = client.get("abc").await.unwrap();
    assert_eq!(record.value.as_string().unwrap().as_ref(), b"test");
}

#[tokio::test]
async fn type_mismatch_is_reported_for_slice_and_map_reads() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    client
        .set("abc", Record::new(Value::from("test"), i64::MAX))
        .await
        .unwrap();

    let err = client.get_by_index("abc", 0).await.unwrap_err();
    assert!(err.is_server_error());

    let err = client.get_by_key("abc", "field").await.unwrap_err();
    assert!(err.is_server_error());
}

#[tokio::test]
async fn get_by_index_reads_element_and_reports_out_of_range() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    let slice = Value::StringSlice(vec![
        bytes::Bytes::from_static(b"test1"),
        bytes::Bytes::from_static(b"test2"),
    ]);
    client
        .set("abc", Record::new(slice, i64::MAX))
        .await
        .unwrap();

    let record = client.get_by_index("abc", 1).await.unwrap();
    assert_eq!(record.value.as_string().unwrap().as_ref(), b"test2");

    let err = client.get_by_index("abc", 3).await.unwrap_err();
    match err {
        client::ClientError::Server { message } => {
            assert!(message.contains("out of range"));
        }
        other => bail_on_wrong_error(other),
    }
}

#[tokio::test]
async fn get_by_key_reads_submap_entry_and_reports_absent_subkey() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    let mut map = HashMap::new();
    map.insert(bytes::Bytes::from_static(b"abc"), bytes::Bytes::from_static(b"test"));
    client
        .set("abc", Record::new(Value::StringMap(map), i64::MAX))
        .await
        .unwrap();

    let record = client.get_by_key("abc", "abc").await.unwrap();
    assert_eq!(record.value.as_string().unwrap().as_ref(), b"test");

    let err = client.get_by_key("abc", "nothing").await.unwrap_err();
    match err {
        client::ClientError::Server { message } => assert!(message.contains("sub-key")),
        other => bail_on_wrong_error(other),
    }
}

#[tokio::test]
async fn keys_matches_patterns_over_live_keys_only() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    for (key, value) in [("hello", "aaa"), ("hallo", "bbb"), ("hi", "ccc")] {
        client
            .set(key, Record::new(Value::from(value), i64::MAX))
            .await
            .unwrap();
    }

    let mut matches = client.keys("h.llo").await.unwrap();
    matches.sort();
    assert_eq!(matches, vec!["hallo".to_string(), "hello".to_string()]);

    let matches = client.keys("nothing").await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn ttl_expiry_makes_a_key_invisible() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    let deadline = common::now_nanos() + Duration::from_millis(1).as_nanos() as i64;
    client
        .set("hi", Record::new(Value::from("ccc"), deadline))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = client.get("hi").await.unwrap_err();
    match err {
        client::ClientError::Server { message } => assert!(message.contains("expired")),
        other => bail_on_wrong_error(other),
    }
}

#[tokio::test]
async fn remove_then_get_reports_key_absent() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    client
        .set("abc", Record::new(Value::from("t"), i64::MAX))
        .await
        .unwrap();
    client.remove("abc").await.unwrap();

    let err = client.get("abc").await.unwrap_err();
    match err {
        client::ClientError::Server { message } => assert!(message.contains("doesn't exist")),
        other => bail_on_wrong_error(other),
    }

    // Removing an already-absent key is still not an error.
    client.remove("abc").await.unwrap();
}

#[tokio::test]
async fn concurrent_clients_on_disjoint_keys_are_all_observed() {
    let server = TestServer::start().await.unwrap();
    let addr = server.address().to_string();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let addr = addr.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(&addr).await.unwrap();
            client
                .set(&format!("key-{i}"), Record::new(Value::from(format!("v{i}").as_str()), i64::MAX))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut verifier = Client::connect(&addr).await.unwrap();
    for i in 0..16 {
        let record = verifier.get(&format!("key-{i}")).await.unwrap();
        assert_eq!(record.value.as_string().unwrap().as_ref(), format!("v{i}").as_bytes());
    }
}

#[tokio::test]
async fn wal_replay_reconstructs_state_after_restart() {
    let server = TestServer::start().await.unwrap();
    {
        let mut client = Client::connect(server.address()).await.unwrap();
        client
            .set("abc", Record::new(Value::from("first"), i64::MAX))
            .await
            .unwrap();
        client
            .set("def", Record::new(Value::from("second"), i64::MAX))
            .await
            .unwrap();
        client.remove("def").await.unwrap();
        client
            .set("abc", Record::new(Value::from("overwritten"), i64::MAX))
            .await
            .unwrap();
    }

    let server = server.restart(WalMode::Fsync).await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    let record = client.get("abc").await.unwrap();
    assert_eq!(record.value.as_string().unwrap().as_ref(), b"overwritten");

    let err = client.get("def").await.unwrap_err();
    assert!(err.is_server_error());
}

#[tokio::test]
async fn interval_wal_flushes_and_survives_restart() {
    let server = TestServer::start_with_wal_mode(WalMode::Interval(Duration::from_millis(30)))
        .await
        .unwrap();
    {
        let mut client = Client::connect(server.address()).await.unwrap();
        client
            .set("batched", Record::new(Value::from("value"), i64::MAX))
            .await
            .unwrap();
    }

    // Give the periodic flusher at least one tick before restarting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let server = server.restart(WalMode::Fsync).await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();
    let record = client.get("batched").await.unwrap();
    assert_eq!(record.value.as_string().unwrap().as_ref(), b"value");
}

#[tokio::test]
async fn bad_regex_pattern_is_reported_as_an_error() {
    let server = TestServer::start().await.unwrap();
    let mut client = Client::connect(server.address()).await.unwrap();

    let err = client.keys("(unclosed").await.unwrap_err();
    match err {
        client::ClientError::Server { message } => assert!(message.contains("pattern")),
        other => bail_on_wrong_error(other),
    }
}

#[tokio::test]
async fn malformed_frame_closes_the_connection_instead_of_replying() {
    let server = TestServer::start().await.unwrap();
    let mut socket = TcpStream::connect(server.address()).await.unwrap();

    // A well-framed payload that is not valid bincode for `Request`.
    let garbage = vec![0xff; 16];
    frame::write_message_async(&mut socket, &garbage).await.unwrap();

    // The connection closes rather than sending an `Error` response back.
    let reply = frame::read_message_async(&mut socket, 16 * 1024 * 1024)
        .await
        .unwrap();
    assert!(reply.is_none(), "expected clean close, got a reply: {reply:?}");
}

fn bail_on_wrong_error(err: client::ClientError) {
    panic!("unexpected error variant: {err:?}");
}
