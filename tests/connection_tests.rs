//! Connection-level behaviour against the mock device: write ordering,
//! graceful and hard teardown.

mod common;

use common::{collect_text, next_chunk, open_mock_port, wait_until, within, ChannelConsumer};
use pretty_assertions::assert_eq;
use serial_link::{
    connect_serial_port, ConnectOptions, Connection, ConnectionError, ConsumerError, DecodedChunk,
    OutboundWriter,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

async fn connect(name: &str) -> (serial_link::MockSerialPort, Connection, common::ChunkRx) {
    let (device, port) = open_mock_port(name).await;
    let (consumer, rx) = ChannelConsumer::new();
    let connection = connect_serial_port(port, consumer, ConnectOptions::default())
        .await
        .unwrap();
    (device, connection, rx)
}

#[tokio::test]
async fn test_at_command_round_trip() {
    let (device, connection, mut rx) = connect("MOCK0").await;

    connection.write("AT\r\n").await.unwrap();
    assert_eq!(device.written(), b"AT\r\n");

    device.feed(b"OK");
    device.feed(b"\r\n");

    let first = next_chunk(&mut rx).await;
    assert_eq!(first.text(), "OK");
    assert_eq!(first.raw.as_deref(), Some(&b"OK"[..]));
    let second = next_chunk(&mut rx).await;
    assert_eq!(format!("{}{}", first.text(), second.text()), "OK\r\n");

    connection.cancel().await;
}

#[tokio::test]
async fn test_writes_reach_sink_in_call_order() {
    let (device, connection, _rx) = connect("MOCK0").await;

    let mut expected = String::new();
    for i in 0..50 {
        let text = format!("{i},");
        connection.write(&text).await.unwrap();
        expected.push_str(&text);
    }

    assert_eq!(String::from_utf8(device.written()).unwrap(), expected);
    assert_eq!(device.write_log().len(), 50);
}

#[tokio::test]
async fn test_cloned_writers_share_one_queue() {
    let (device, connection, _rx) = connect("MOCK0").await;
    let writer = connection.writer().cloned().unwrap();

    writer.write("a").await.unwrap();
    connection.write("b").await.unwrap();
    writer.write("c").await.unwrap();

    assert_eq!(device.written(), b"abc");
}

#[tokio::test]
async fn test_writer_created_callback_gets_the_writer() {
    let (_device, port) = open_mock_port("MOCK0").await;
    let (consumer, _rx) = ChannelConsumer::new();
    let (tx, rx) = oneshot::channel::<Option<OutboundWriter>>();

    let options = ConnectOptions::new().on_writer_created(move |writer| async move {
        let _ = tx.send(writer);
    });
    let connection = connect_serial_port(port, consumer, options).await.unwrap();

    let writer = within(rx).await.unwrap().expect("port has an outbound stream");
    writer.write("hello").await.unwrap();
    connection.cancel().await;
}

#[tokio::test]
async fn test_unopened_port_has_no_writer_and_no_loop() {
    let device = serial_link::MockSerialPort::new("MOCK0");
    let (consumer, _rx) = ChannelConsumer::new();
    let (tx, rx) = oneshot::channel::<Option<OutboundWriter>>();

    let options = ConnectOptions::new().on_writer_created(move |writer| async move {
        let _ = tx.send(writer);
    });
    let connection = connect_serial_port(device.handle(), consumer, options)
        .await
        .unwrap();

    assert!(within(rx).await.unwrap().is_none());
    assert!(within(connection.stopped()).await.is_ok());
    assert!(matches!(
        connection.write("AT").await,
        Err(ConnectionError::WriterClosed)
    ));
}

#[tokio::test]
async fn test_cancel_resolves_pending_read_and_releases_reader() {
    let (device, port) = open_mock_port("MOCK0").await;
    let (consumer, _rx) = ChannelConsumer::new();
    let readers = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&readers);
    let options = ConnectOptions::new().on_reader_created(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async {}
    });
    let connection = connect_serial_port(port, consumer, options).await.unwrap();

    wait_until(|| connection.reader().is_some()).await;
    let reader = connection.reader().unwrap();

    within(connection.cancel()).await;
    assert!(reader.is_cancelled());
    assert!(!connection.keep_reading());
    assert!(!connection.signal().is_aborted());

    within(connection.stopped()).await.unwrap();
    assert!(connection.reader().is_none());
    assert!(!connection.port().inbound().is_locked());
    assert_eq!(readers.load(Ordering::SeqCst), 1);

    // Nothing reads the port any more.
    device.feed(b"late");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(device.pending_inbound(), 1);
}

#[tokio::test]
async fn test_cancel_flushes_queued_write_before_closing() {
    let (device, connection, _rx) = connect("MOCK0").await;
    device.set_write_stalled(true);

    let writer = connection.writer().cloned().unwrap();
    let queued = tokio::spawn(async move { writer.write("queued").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let release = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!device.is_shutdown());
        device.set_write_stalled(false);
    };
    within(async { tokio::join!(connection.cancel(), release) }).await;

    assert!(within(queued).await.unwrap().is_ok());
    assert_eq!(device.written(), b"queued");
    assert_eq!(device.shutdown_after_writes(), Some(1));
    assert!(matches!(connection.writable_closed().outcome(), Some(Ok(()))));
}

#[tokio::test]
async fn test_abort_settles_pending_write_with_reason() {
    let (device, connection, _rx) = connect("MOCK0").await;
    wait_until(|| connection.reader().is_some()).await;
    device.set_write_stalled(true);

    let writer = connection.writer().cloned().unwrap();
    let pending = tokio::spawn(async move { writer.write("never").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    within(connection.abort("unplugged")).await;

    let result = within(pending).await.unwrap();
    assert!(matches!(result, Err(ConnectionError::Aborted(ref r)) if r == "unplugged"));
    assert!(matches!(
        connection.writable_closed().outcome(),
        Some(Err(ConnectionError::Aborted(ref r))) if r == "unplugged"
    ));
    assert!(matches!(
        connection.readable_closed().unwrap().outcome(),
        Some(Err(ConnectionError::Aborted(ref r))) if r == "unplugged"
    ));
    within(connection.stopped()).await.unwrap();
    assert!(device.written().is_empty());
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let (_device, connection, _rx) = connect("MOCK0").await;
    wait_until(|| connection.reader().is_some()).await;

    within(connection.cancel()).await;
    within(connection.cancel()).await;
    within(connection.abort("first")).await;
    within(connection.abort("second")).await;

    assert_eq!(connection.signal().reason(), Some("first"));
    within(connection.stopped()).await.unwrap();
}

#[tokio::test]
async fn test_write_after_cancel_fails() {
    let (_device, connection, _rx) = connect("MOCK0").await;
    connection.cancel().await;
    assert!(matches!(
        connection.write("late").await,
        Err(ConnectionError::WriterClosed)
    ));
}

#[tokio::test]
async fn test_write_after_abort_reports_reason() {
    let (_device, connection, _rx) = connect("MOCK0").await;
    connection.abort("closed by user").await;
    assert!(matches!(
        connection.write("late").await,
        Err(ConnectionError::Aborted(ref r)) if r == "closed by user"
    ));
}

#[tokio::test]
async fn test_cancel_does_not_wait_for_a_busy_consumer() {
    let (device, port) = open_mock_port("MOCK0").await;
    let gate = Arc::new(Notify::new());
    let (entered_tx, entered_rx) = oneshot::channel::<()>();
    let mut entered_tx = Some(entered_tx);
    let consumer = {
        let gate = Arc::clone(&gate);
        move |_chunk: DecodedChunk| {
            let gate = Arc::clone(&gate);
            let entered = entered_tx.take();
            async move {
                if let Some(entered) = entered {
                    let _ = entered.send(());
                }
                gate.notified().await;
                Ok::<_, ConsumerError>(())
            }
        }
    };
    let connection = connect_serial_port(port, consumer, ConnectOptions::default())
        .await
        .unwrap();

    device.feed(b"busy");
    within(entered_rx).await.unwrap();

    within(connection.cancel()).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(50), connection.stopped())
            .await
            .is_err(),
        "loop cannot exit while the consumer is still running"
    );

    gate.notify_one();
    within(connection.stopped()).await.unwrap();
}

#[tokio::test]
async fn test_chunks_arrive_in_order() {
    let (device, connection, mut rx) = connect("MOCK0").await;
    for line in ["one\n", "two\n", "three\n"] {
        device.feed(line.as_bytes());
    }
    assert_eq!(collect_text(&mut rx, "one\ntwo\nthree\n").await, "one\ntwo\nthree\n");
    connection.cancel().await;
}

type SharedConnection = Arc<parking_lot::Mutex<Option<Arc<Connection>>>>;

/// Connect with a consumer that tears the connection down from inside its own
/// callback, using `abort_reason` to pick `abort` over `cancel`.
async fn connect_self_stopping(
    abort_reason: Option<&'static str>,
) -> (serial_link::MockSerialPort, Arc<Connection>, Arc<AtomicUsize>) {
    let (device, port) = open_mock_port("MOCK0").await;
    let shared: SharedConnection = Arc::default();
    let stops = Arc::new(AtomicUsize::new(0));
    let consumer = {
        let shared = Arc::clone(&shared);
        let stops = Arc::clone(&stops);
        move |_chunk: DecodedChunk| {
            let connection = shared.lock().clone();
            let stops = Arc::clone(&stops);
            async move {
                if let Some(connection) = connection {
                    match abort_reason {
                        Some(reason) => connection.abort(reason).await,
                        None => connection.cancel().await,
                    }
                    stops.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<_, ConsumerError>(())
            }
        }
    };
    let connection = connect_serial_port(port, consumer, ConnectOptions::default())
        .await
        .unwrap();
    let connection = Arc::new(connection);
    *shared.lock() = Some(Arc::clone(&connection));
    (device, connection, stops)
}

#[tokio::test]
async fn test_consumer_can_cancel_from_its_callback() {
    let (device, connection, stops) = connect_self_stopping(None).await;

    connection.write("AT").await.unwrap();
    device.feed(b"bye");

    within(connection.stopped()).await.unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(!connection.keep_reading());
    assert!(!connection.signal().is_aborted());
    assert!(!connection.port().inbound().is_locked());
    assert_eq!(device.written(), b"AT");
}

#[tokio::test]
async fn test_consumer_can_abort_from_its_callback() {
    let (device, connection, stops) = connect_self_stopping(Some("consumer quit")).await;

    device.feed(b"bye");

    within(connection.stopped()).await.unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(connection.signal().reason(), Some("consumer quit"));
    assert!(!connection.port().inbound().is_locked());
}
