mod common;

use common::{init_tracing, MockPlc, PlcEvent};
use ng_driver_s7::{
    protocol::frame::S7Area, Error, ErrorKind, S7Client, S7DataType, S7DataValue,
    SessionLifecycleState,
};
use ng_s7_sdk::ConnectionMode;
use std::{collections::HashMap, time::Duration};

async fn connected_client(plc: &MockPlc) -> S7Client {
    let client = S7Client::new(plc.client_config()).unwrap();
    client.connect().await.unwrap();
    client
}

#[tokio::test]
async fn test_read_word() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::DB, 1, 10, &[0x00, 0x2A]);
    let client = connected_client(&plc).await;
    assert_eq!(
        client.read("DB1.DBW10", S7DataType::Word).await.unwrap(),
        S7DataValue::Word(42)
    );
}

#[tokio::test]
async fn test_read_typed_values() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::DB, 1, 0, &1.5f32.to_be_bytes());
    plc.set_bytes(S7Area::DB, 1, 8, &(-3.25f64).to_be_bytes());
    plc.set_bytes(S7Area::M, 0, 4, &[0x04]);
    plc.set_bytes(S7Area::I, 0, 2, &[0xFF, 0xFE]);
    let client = connected_client(&plc).await;

    assert_eq!(
        client.read("DB1.DBD0", S7DataType::Real).await.unwrap(),
        S7DataValue::Real(1.5)
    );
    assert_eq!(
        client.read("DB1.DBD8", S7DataType::LReal).await.unwrap(),
        S7DataValue::LReal(-3.25)
    );
    assert_eq!(
        client.read("M4.2", S7DataType::Bool).await.unwrap(),
        S7DataValue::Bool(true)
    );
    // bare I reads a word
    assert_eq!(
        client.read("I2", S7DataType::Int).await.unwrap(),
        S7DataValue::Int(-2)
    );
}

#[tokio::test]
async fn test_invalid_address_is_reported() {
    init_tracing();
    let plc = MockPlc::start().await;
    let client = connected_client(&plc).await;
    let err = client.read("DB0.DBW0", S7DataType::Word).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAddress);
    let err = client.read("DB1.DBW0", S7DataType::Bool).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAddress);
}

#[tokio::test]
async fn test_write_bool_sends_mask() {
    init_tracing();
    let plc = MockPlc::start().await;
    let client = connected_client(&plc).await;
    let mut events = plc.subscribe();

    client
        .write("DB1.DBX5.3", S7DataValue::Bool(true))
        .await
        .unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        PlcEvent::Write {
            area: S7Area::DB,
            db: 1,
            start: 5,
            bit: Some(3),
            data: vec![0x08],
        }
    );
    assert_eq!(plc.bytes(S7Area::DB, 1, 5, 1), vec![0x08]);

    client
        .write("DB1.DBX5.3", S7DataValue::Bool(false))
        .await
        .unwrap();
    assert_eq!(plc.bytes(S7Area::DB, 1, 5, 1), vec![0x00]);
}

#[tokio::test]
async fn test_write_then_read_dint() {
    init_tracing();
    let plc = MockPlc::start().await;
    let client = connected_client(&plc).await;
    client
        .write("DB2.DBD20", S7DataValue::DInt(-123_456))
        .await
        .unwrap();
    assert_eq!(plc.bytes(S7Area::DB, 2, 20, 4), (-123_456i32).to_be_bytes());
    assert_eq!(
        client.read("DB2.DBD20", S7DataType::DInt).await.unwrap(),
        S7DataValue::DInt(-123_456)
    );
}

#[tokio::test]
async fn test_read_bytes() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::Q, 0, 0, &[1, 2, 3, 4, 5]);
    let client = connected_client(&plc).await;
    let bytes = client.read_bytes("QB1", 3).await.unwrap();
    assert_eq!(&bytes[..], &[2, 3, 4]);
}

#[tokio::test]
async fn test_batch_read_with_invalid_address() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::DB, 1, 0, &[0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
    plc.set_bytes(S7Area::M, 0, 0, &[0x81]);
    let client = connected_client(&plc).await;
    let mut events = plc.subscribe();

    let request: HashMap<String, S7DataType> = [
        ("DB1.DBW0", S7DataType::Word),
        ("DB1.DBW2", S7DataType::Word),
        ("DB1.DBW4", S7DataType::Word),
        ("M0.0", S7DataType::Bool),
        ("M0.7", S7DataType::Bool),
        ("NOPE42", S7DataType::Word),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let result = client.read_batch(&request).await;
    assert!(!result.success);
    assert!(result.message.contains("NOPE42"));
    assert_eq!(result.values.len(), 6);
    assert_eq!(result.value("DB1.DBW0"), Some(S7DataValue::Word(1)));
    assert_eq!(result.value("DB1.DBW4"), Some(S7DataValue::Word(3)));
    assert_eq!(result.value("M0.0"), Some(S7DataValue::Bool(true)));
    assert_eq!(result.value("M0.7"), Some(S7DataValue::Bool(true)));
    assert_eq!(result.values["NOPE42"], (S7DataType::Word, None));
    assert!(matches!(
        result.ensure_success(),
        Err(Error::PartialBatchFailure { failed: 1, total: 6 })
    ));

    // one read for the three words, one for the marker byte
    let reads = std::iter::from_fn(|| events.try_recv().ok()).count();
    assert_eq!(reads, 2);
}

#[tokio::test]
async fn test_batch_read_failed_block_leaves_others() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::DB, 2, 0, &[0x12, 0x34]);
    let client = connected_client(&plc).await;

    let request: HashMap<String, S7DataType> = [
        ("DB9.DBW0".to_string(), S7DataType::Word),
        ("DB2.DBW0".to_string(), S7DataType::Word),
    ]
    .into_iter()
    .collect();
    let result = client.read_batch(&request).await;
    assert!(!result.success);
    assert_eq!(result.value("DB2.DBW0"), Some(S7DataValue::Word(0x1234)));
    assert_eq!(result.value("DB9.DBW0"), None);
    assert!(result.message.starts_with("DB9.DBW0: "));
    assert!(client.session().is_ready());
}

#[tokio::test]
async fn test_batch_write_partial_failure() {
    init_tracing();
    let plc = MockPlc::start().await;
    let client = connected_client(&plc).await;
    let mut events = plc.subscribe();

    let request: HashMap<String, S7DataValue> = [
        ("DB1.DBB0".to_string(), S7DataValue::Byte(7)),
        ("DB1.DBB1".to_string(), S7DataValue::Byte(8)),
        ("DB7.DBB0".to_string(), S7DataValue::Byte(9)),
        ("DB1.DBX9".to_string(), S7DataValue::Bool(true)),
    ]
    .into_iter()
    .collect();
    let result = client.write_batch(&request).await;
    assert!(!result.success);
    assert_eq!(result.failures.len(), 2);
    assert!(result.failures.contains_key("DB7.DBB0"));
    assert!(result.failures.contains_key("DB1.DBX9"));
    assert_eq!(result.message.matches("; ").count(), 1);
    assert_eq!(plc.bytes(S7Area::DB, 1, 0, 2), vec![7, 8]);

    // adjacent bytes are still written one request each
    let writes = std::iter::from_fn(|| events.try_recv().ok()).count();
    assert_eq!(writes, 2);
}

#[tokio::test]
async fn test_reconnect_after_drop() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::DB, 1, 0, &[0x00, 0x05]);
    let client = connected_client(&plc).await;

    plc.drop_connections();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        client.read("DB1.DBW0", S7DataType::Word).await.unwrap(),
        S7DataValue::Word(5)
    );
    assert_eq!(plc.connections_accepted(), 2);
    assert!(client.session().is_ready());
}

#[tokio::test]
async fn test_no_reconnect_fails_immediately() {
    init_tracing();
    let plc = MockPlc::start().await;
    let mut cfg = plc.client_config();
    cfg.connection.auto_reconnect = false;
    let client = S7Client::new(cfg).unwrap();
    client.connect().await.unwrap();

    plc.drop_connections();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client.read("DB1.DBW0", S7DataType::Word).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionLost);
    let err = client.read("DB1.DBW0", S7DataType::Word).await.unwrap_err();
    assert!(matches!(err, Error::ErrNotActive));
    assert_eq!(plc.connections_accepted(), 1);
}

#[tokio::test]
async fn test_persistent_connects_lazily() {
    init_tracing();
    let plc = MockPlc::start().await;
    let client = S7Client::new(plc.client_config()).unwrap();
    assert_eq!(*client.lifecycle().borrow(), SessionLifecycleState::Disconnected);
    client.read("MB0", S7DataType::Byte).await.unwrap();
    client.read("MB1", S7DataType::Byte).await.unwrap();
    assert_eq!(plc.connections_accepted(), 1);
}

#[tokio::test]
async fn test_reconnect_gives_up() {
    init_tracing();
    let plc = MockPlc::start().await;
    let mut cfg = plc.client_config();
    drop(plc);
    tokio::time::sleep(Duration::from_millis(20)).await;
    cfg.connection.connect_timeout_ms = 200;
    let client = S7Client::new(cfg).unwrap();
    let err = client.read("MB0", S7DataType::Byte).await.unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::ConnectionLost | ErrorKind::Timeout
    ));
}

#[tokio::test]
async fn test_disposable_mode_connects_per_operation() {
    init_tracing();
    let plc = MockPlc::start().await;
    let mut cfg = plc.client_config();
    cfg.connection.mode = ConnectionMode::Disposable;
    let client = S7Client::new(cfg).unwrap();

    client.write("MW10", S7DataValue::Word(0xBEEF)).await.unwrap();
    assert_eq!(*client.lifecycle().borrow(), SessionLifecycleState::Disconnected);
    assert_eq!(
        client.read("MW10", S7DataType::Word).await.unwrap(),
        S7DataValue::Word(0xBEEF)
    );
    assert_eq!(plc.connections_accepted(), 2);

    // failing operations still disconnect
    assert!(client.read("DB5.DBW0", S7DataType::Word).await.is_err());
    assert_eq!(*client.lifecycle().borrow(), SessionLifecycleState::Disconnected);
    assert_eq!(plc.connections_accepted(), 3);
}

#[tokio::test]
async fn test_request_timeout_then_reconnect() {
    init_tracing();
    let plc = MockPlc::start().await;
    plc.set_bytes(S7Area::DB, 1, 0, &[0x00, 0x07]);
    let mut cfg = plc.client_config();
    cfg.connection.read_timeout_ms = 200;
    let client = S7Client::new(cfg).unwrap();
    client.connect().await.unwrap();

    plc.ignore_reads(true);
    let err = client.read("DB1.DBW0", S7DataType::Word).await.unwrap_err();
    assert!(matches!(err, Error::ErrRequestTimeout), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(*client.lifecycle().borrow(), SessionLifecycleState::Disconnected);

    plc.ignore_reads(false);
    assert_eq!(
        client.read("DB1.DBW0", S7DataType::Word).await.unwrap(),
        S7DataValue::Word(7)
    );
    assert_eq!(plc.connections_accepted(), 2);
}

#[tokio::test]
async fn test_read_bytes_out_of_range_is_an_error() {
    init_tracing();
    let plc = MockPlc::start().await;
    let client = connected_client(&plc).await;
    let err = client
        .read_bytes("DB1.DBB2000000", u32::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ErrInvalidParam(_)), "{err:?}");
    assert!(client.session().is_ready());
}
