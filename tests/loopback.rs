//! End-to-end delivery tests against loopback collectors.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;

use syslog_courier::{Delivery, DeliveryClient, SyslogConfig};

const RECV_BUDGET: Duration = Duration::from_secs(5);

async fn recv_datagram(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 70_000];
    let (len, _) = timeout(RECV_BUDGET, socket.recv_from(&mut buf))
        .await
        .expect("datagram within budget")
        .expect("recv succeeds");
    buf.truncate(len);
    buf
}

#[tokio::test]
async fn udp_delivers_formatted_record_to_collector() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = collector.local_addr().unwrap().port();

    let config = SyslogConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .protocol("udp4")
        .localhost("testhost")
        .app_name("loopback")
        .pid(99)
        .build()
        .unwrap();
    let (client, _events) = DeliveryClient::new(config);

    let delivery = client.log("info", "hello collector").await.unwrap();
    assert_eq!(delivery, Delivery::Sent);

    let datagram = recv_datagram(&collector).await;
    let text = String::from_utf8(datagram).unwrap();
    // local0.info -> PRI 134
    assert!(text.starts_with("<134>"), "{text}");
    assert!(text.contains("testhost loopback[99]: hello collector"), "{text}");
    assert!(text.ends_with('\n'), "{text}");
}

#[tokio::test]
async fn udp_sends_large_message_as_single_datagram() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = collector.local_addr().unwrap().port();

    let config = SyslogConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .protocol("udp4")
        .build()
        .unwrap();
    let (client, _events) = DeliveryClient::new(config);

    // Well under the 65507-byte UDP ceiling: must arrive whole, unchunked.
    let body = "x".repeat(60_000);
    client.log("debug", &body).await.unwrap();

    let datagram = recv_datagram(&collector).await;
    let text = String::from_utf8(datagram).unwrap();
    assert!(text.contains(&body), "large message split or truncated");
}

#[tokio::test]
async fn severity_maps_into_priority_field() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = collector.local_addr().unwrap().port();

    let config = SyslogConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .protocol("udp4")
        .build()
        .unwrap();
    let (client, _events) = DeliveryClient::new(config);

    // local0 = 128; severity is the low three bits.
    for (level, pri) in [("emerg", 128), ("crit", 130), ("err", 131), ("debug", 135)] {
        client.log(level, "m").await.unwrap();
        let text = String::from_utf8(recv_datagram(&collector).await).unwrap();
        assert!(text.starts_with(&format!("<{pri}>")), "{level}: {text}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn unix_datagram_delivers_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devlog.sock");
    let collector = tokio::net::UnixDatagram::bind(&path).unwrap();

    let config = SyslogConfig::builder()
        .protocol("unix")
        .path(&path)
        .build()
        .unwrap();
    let (client, _events) = DeliveryClient::new(config);

    client.log("notice", "unix hello").await.unwrap();

    let mut buf = vec![0u8; 4096];
    let len = timeout(RECV_BUDGET, collector.recv(&mut buf))
        .await
        .expect("datagram within budget")
        .unwrap();
    let text = String::from_utf8(buf[..len].to_vec()).unwrap();
    assert!(text.contains("unix hello"), "{text}");
}

#[cfg(unix)]
#[tokio::test]
async fn unix_connect_queues_until_listener_appears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.sock");

    let config = SyslogConfig::builder()
        .protocol("unix-connect")
        .path(&path)
        .build()
        .unwrap();
    let (client, _events) = DeliveryClient::new(config);

    // No listener yet: the connect fails, the record is queued and the
    // failure is reported to the caller.
    let err = client.log("info", "first").await.unwrap_err();
    assert!(matches!(err, syslog_courier::ClientError::Connect(_)), "{err}");
    assert_eq!(client.pending().await.unwrap(), 1);

    // Listener appears; the next log call reconnects and flushes the
    // backlog in order before sending the fresh record.
    let collector = tokio::net::UnixDatagram::bind(&path).unwrap();
    let delivery = client.log("info", "second").await.unwrap();
    assert_eq!(delivery, Delivery::Sent);
    assert_eq!(client.pending().await.unwrap(), 0);

    let mut received = Vec::new();
    for _ in 0..2 {
        let mut buf = vec![0u8; 4096];
        let len = timeout(RECV_BUDGET, collector.recv(&mut buf))
            .await
            .expect("datagram within budget")
            .unwrap();
        received.push(String::from_utf8(buf[..len].to_vec()).unwrap());
    }
    assert!(received[0].contains("first"), "{:?}", received);
    assert!(received[1].contains("second"), "{:?}", received);
}

#[tokio::test]
async fn tcp_delivers_ordered_stream_and_closes_clean() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();
        data
    });

    let config = SyslogConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .protocol("tcp4")
        .build()
        .unwrap();
    let (client, _events) = DeliveryClient::new(config);

    assert_eq!(client.log("info", "first").await.unwrap(), Delivery::Sent);
    assert_eq!(client.log("info", "second").await.unwrap(), Delivery::Sent);

    let clean = client.close().await.unwrap();
    assert!(clean);

    let data = timeout(RECV_BUDGET, accept).await.unwrap().unwrap();
    let text = String::from_utf8(data).unwrap();
    let first = text.find("first").expect("first record present");
    let second = text.find("second").expect("second record present");
    assert!(first < second, "records out of order: {text}");
}

#[tokio::test]
async fn tcp_reconnects_and_flushes_after_collector_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = SyslogConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .protocol("tcp4")
        .build()
        .unwrap();
    let (client, mut events) = DeliveryClient::new(config);

    // First connection delivers, then the collector drops it.
    let (mut stream, _) = {
        let accept = listener.accept();
        let log = client.log("info", "before outage");
        let (accepted, logged) = tokio::join!(accept, log);
        logged.unwrap();
        accepted.unwrap()
    };
    let mut buf = vec![0u8; 4096];
    let len = timeout(RECV_BUDGET, stream.read(&mut buf)).await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&buf[..len]).contains("before outage"));
    drop(stream);

    // Give the client a moment to observe the closed connection, then log
    // into the outage: the record queues rather than failing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let delivery = client.log("info", "during outage").await.unwrap();
    assert_eq!(delivery, Delivery::Queued);

    // The reconnect timer fires after the one-second backoff and the
    // queued record flushes to the new connection.
    let (mut stream, _) = timeout(RECV_BUDGET, listener.accept()).await.unwrap().unwrap();
    let len = timeout(RECV_BUDGET, stream.read(&mut buf)).await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&buf[..len]).contains("during outage"));

    // Every record produced a Logged event, outage or not.
    let mut logged = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, syslog_courier::Event::Logged) {
            logged += 1;
        }
    }
    assert_eq!(logged, 2);
}
