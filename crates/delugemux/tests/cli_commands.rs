#![cfg(feature = "cli")]

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use delugemux_frame::{decode_request, encode_response, Event, FrameConfig, Request, Response, Value};

/// One-connection daemon stand-in running a script on a background thread.
struct FakeDaemon {
    endpoint: String,
    requests: mpsc::Receiver<Request>,
    handle: thread::JoinHandle<()>,
}

fn spawn_daemon<F>(script: F) -> FakeDaemon
where
    F: FnOnce(&mut Session) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let endpoint = listener
        .local_addr()
        .expect("listener should have an address")
        .to_string();
    let (tx, requests) = mpsc::channel();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("daemon should accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout should be settable");
        let mut session = Session {
            stream,
            wire: Vec::new(),
            seen: tx,
        };
        script(&mut session);
    });

    FakeDaemon {
        endpoint,
        requests,
        handle,
    }
}

struct Session {
    stream: TcpStream,
    wire: Vec<u8>,
    seen: mpsc::Sender<Request>,
}

impl Session {
    fn next_request(&mut self) -> Request {
        let config = FrameConfig::default();
        loop {
            if let Some((consumed, request)) =
                decode_request(&self.wire, &config).expect("request should decode")
            {
                self.wire.drain(..consumed);
                let _ = self.seen.send(request.clone());
                return request;
            }
            let mut buf = [0u8; 1024];
            let n = self.stream.read(&mut buf).expect("daemon read should succeed");
            assert!(n > 0, "client hung up before sending a request");
            self.wire.extend_from_slice(&buf[..n]);
        }
    }

    fn send(&mut self, response: Response) {
        let frame = encode_response(&response).expect("response should encode");
        self.stream
            .write_all(&frame)
            .expect("daemon write should succeed");
    }

    /// Block until the client hangs up.
    fn drain(&mut self) {
        let mut buf = [0u8; 1024];
        while matches!(self.stream.read(&mut buf), Ok(n) if n > 0) {}
    }
}

fn delugemux(endpoint: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_delugemux"))
        .arg("--log-level")
        .arg("error")
        .arg("--connect")
        .arg(endpoint)
        .args(args)
        .env_remove("DELUGE_DAEMON")
        .output()
        .expect("delugemux should run")
}

fn closed_port_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener should have an address");
    drop(listener);
    addr.to_string()
}

#[test]
fn call_prints_result_as_json() {
    let daemon = spawn_daemon(|session| {
        let request = session.next_request();
        let mut torrent = BTreeMap::new();
        torrent.insert("id".to_string(), Value::from("abc"));
        session.send(Response::Result {
            tag: request.tag,
            value: Value::List(vec![Value::Dict(torrent)]),
        });
        session.drain();
    });

    let output = delugemux(
        &daemon.endpoint,
        &["--format", "json", "call", "core.get_torrents"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), r#"[{"id":"abc"}]"#);

    let request = daemon.requests.recv().expect("daemon should see the request");
    assert_eq!(request.tag, 0);
    assert_eq!(request.method, "core.get_torrents");
    assert!(request.args.is_empty());
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn call_sends_json_args_and_kwargs() {
    let daemon = spawn_daemon(|session| {
        let request = session.next_request();
        session.send(Response::Result {
            tag: request.tag,
            value: Value::from("0123456789abcdef"),
        });
        session.drain();
    });

    let output = delugemux(
        &daemon.endpoint,
        &[
            "--format",
            "raw",
            "call",
            "core.add_torrent_url",
            "magnet:?xt=urn:btih:0123",
            "{\"download_location\": \"/data\"}",
            "--kwargs",
            "{\"add_paused\": true}",
        ],
    );
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "0123456789abcdef");

    let request = daemon.requests.recv().expect("daemon should see the request");
    let mut options = BTreeMap::new();
    options.insert("download_location".to_string(), Value::from("/data"));
    assert_eq!(
        request.args,
        vec![Value::from("magnet:?xt=urn:btih:0123"), Value::Dict(options)]
    );
    assert_eq!(request.kwargs.get("add_paused"), Some(&Value::Bool(true)));
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn remote_fault_exits_with_fault_code() {
    let daemon = spawn_daemon(|session| {
        let request = session.next_request();
        session.send(Response::Fault {
            tag: request.tag,
            error: Value::from("InvalidURL"),
        });
        session.drain();
    });

    let output = delugemux(
        &daemon.endpoint,
        &["call", "core.add_torrent_url", "not-a-url"],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("InvalidURL"));
    assert!(output.stdout.is_empty());
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn call_timeout_exits_124() {
    let daemon = spawn_daemon(|session| {
        session.next_request();
        session.drain();
    });

    let output = delugemux(
        &daemon.endpoint,
        &["call", "core.get_torrents_status", "--timeout", "200ms"],
    );

    assert_eq!(output.status.code(), Some(124));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no reply"));
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn malformed_reply_is_reported_as_invalid_data() {
    let daemon = spawn_daemon(|session| {
        session.next_request();
        session
            .stream
            .write_all(&[0x78, 0x9c, 0xff, 0xff, 0xff])
            .expect("daemon write should succeed");
        session.drain();
    });

    let output = delugemux(&daemon.endpoint, &["call", "daemon.info"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connection closed"));
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn invalid_json_argument_is_a_usage_error() {
    let output = delugemux(
        &closed_port_endpoint(),
        &["call", "core.get_torrents_status", "[1, 2"],
    );
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn refused_connection_is_a_transport_error() {
    let output = delugemux(&closed_port_endpoint(), &["call", "daemon.info"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn events_prints_pushed_events_until_count() {
    let daemon = spawn_daemon(|session| {
        let request = session.next_request();
        assert_eq!(request.method, "daemon.set_event_interest");
        session.send(Response::Result {
            tag: request.tag,
            value: Value::Bool(true),
        });
        for id in ["abc", "def"] {
            session.send(Response::Event(Event {
                name: "TorrentAddedEvent".to_string(),
                args: vec![Value::from(id), Value::Bool(false)],
            }));
        }
        session.drain();
    });

    let output = delugemux(
        &daemon.endpoint,
        &[
            "--format",
            "json",
            "events",
            "--register",
            "TorrentAddedEvent,TorrentRemovedEvent",
            "--count",
            "2",
        ],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"event\":\"TorrentAddedEvent\""));
    assert!(lines[0].contains("\"args\":[\"abc\",false]"));
    assert!(lines[1].contains("\"def\""));

    let request = daemon.requests.recv().expect("daemon should see the request");
    assert_eq!(
        request.args,
        vec![Value::List(vec![
            Value::from("TorrentAddedEvent"),
            Value::from("TorrentRemovedEvent"),
        ])]
    );
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn events_exits_when_daemon_disconnects() {
    let daemon = spawn_daemon(|session| {
        session.send(Response::Event(Event {
            name: "SessionPausedEvent".to_string(),
            args: vec![],
        }));
    });

    let output = delugemux(&daemon.endpoint, &["--format", "json", "events"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("SessionPausedEvent"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connection closed"));
    daemon.handle.join().expect("daemon thread should finish");
}

#[test]
fn version_prints_crate_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_delugemux"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("delugemux {}", env!("CARGO_PKG_VERSION"))
    );
}
