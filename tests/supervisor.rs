//! End-to-end tests that drive the built `raptord` binary over its real
//! Unix-socket RPC surface, the way an operator or an RPC client would.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

use raptor_daemon::protocol::{self, Request, Response};
use tokio::net::UnixStream;

struct Daemon {
    child: Child,
    socket_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_config(dir: &Path, services: serde_json::Value, startup: Vec<&str>) -> (PathBuf, PathBuf) {
    let ports_path = dir.join("ports.json");
    std::fs::write(
        &ports_path,
        serde_json::json!({"test": {"rpc": dir.join("rpc.sock").to_str().unwrap()}}).to_string(),
    )
    .unwrap();

    let config_path = dir.join("config.json");
    std::fs::write(
        &config_path,
        serde_json::json!({
            "LOG_DIR": dir.join("logs").to_str().unwrap(),
            "PORTS": ports_path.to_str().unwrap(),
            "SERVICES": services,
            "GROUPS": {"startup": startup},
        })
        .to_string(),
    )
    .unwrap();
    (config_path, ports_path)
}

/// Start `raptord --foreground --no-fork` against a freshly written config
/// and wait for its RPC socket to appear.
async fn start_daemon(services: serde_json::Value, startup: Vec<&str>) -> Daemon {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, _ports_path) = write_config(dir.path(), services, startup);
    let socket_path = dir.path().join("rpc.sock");

    let mut command = Command::new(assert_cmd::cargo::cargo_bin("raptord"));
    let child = command
        .arg("--config")
        .arg(&config_path)
        .arg("--foreground")
        .arg("--no-fork")
        .arg("--name")
        .arg("test")
        .arg("start")
        .spawn()
        .expect("spawn raptord");

    for _ in 0..200 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(socket_path.exists(), "rpc socket never appeared");

    Daemon {
        child,
        socket_path,
        _dir: dir,
    }
}

async fn roundtrip(socket_path: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket_path).await.expect("connect to rpc socket");
    let payload = protocol::encode(&request).unwrap();
    protocol::write_message(&mut stream, &payload).await.unwrap();
    let bytes = protocol::read_message(&mut stream).await.unwrap();
    protocol::decode(&bytes).unwrap()
}

#[tokio::test]
async fn start_and_stop_a_service_over_rpc() {
    let daemon = start_daemon(
        serde_json::json!({"sleep": {"command": "sleep 10000", "log": null}}),
        vec![],
    )
    .await;

    let resp = roundtrip(&daemon.socket_path, Request::Start { name: "sleep".into() }).await;
    assert!(matches!(resp, Response::Ok));

    let resp = roundtrip(&daemon.socket_path, Request::GetStatus { name: "sleep".into() }).await;
    match resp {
        Response::Status(status) => assert_eq!(status.status, raptor_core::ServiceState::Running),
        other => panic!("expected Status, got {other:?}"),
    }

    let resp = roundtrip(&daemon.socket_path, Request::Stop { name: "sleep".into() }).await;
    assert!(matches!(resp, Response::Ok));
}

#[tokio::test]
async fn startup_group_starts_services_and_quit_drains_them() {
    let daemon = start_daemon(
        serde_json::json!({"sleep": {"command": "sleep 10000", "log": null}}),
        vec!["sleep"],
    )
    .await;

    // Give the startup group a moment to run before we ask about it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let resp = roundtrip(&daemon.socket_path, Request::GetStatus { name: "sleep".into() }).await;
    match resp {
        Response::Status(status) => assert_eq!(status.status, raptor_core::ServiceState::Running),
        other => panic!("expected Status, got {other:?}"),
    }

    let resp = roundtrip(&daemon.socket_path, Request::Quit).await;
    assert!(matches!(resp, Response::Ok));
}

#[tokio::test]
async fn missing_executable_reports_failed_status() {
    let daemon = start_daemon(
        serde_json::json!({"ghost": {"command": "/no/such/executable-xyz", "log": null}}),
        vec![],
    )
    .await;

    let _ = roundtrip(&daemon.socket_path, Request::Start { name: "ghost".into() }).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let resp = roundtrip(&daemon.socket_path, Request::GetStatus { name: "ghost".into() }).await;
    match resp {
        Response::Status(status) => assert_eq!(status.status, raptor_core::ServiceState::Failed),
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_then_unsubscribe_ends_the_stream() {
    let daemon = start_daemon(
        serde_json::json!({"sleep": {"command": "sleep 10000", "log": null}}),
        vec![],
    )
    .await;

    let mut stream = UnixStream::connect(&daemon.socket_path).await.unwrap();
    let payload = protocol::encode(&Request::Subscribe { pattern: "*".into() }).unwrap();
    protocol::write_message(&mut stream, &payload).await.unwrap();

    let bytes = protocol::read_message(&mut stream).await.unwrap();
    let id = match protocol::decode(&bytes).unwrap() {
        Response::SubscribeAck { id } => id,
        other => panic!("expected SubscribeAck, got {other:?}"),
    };

    // Cancel from a second connection, the way the RPC client would.
    let _ = roundtrip(&daemon.socket_path, Request::Unsubscribe { id }).await;

    let bytes = protocol::read_message(&mut stream).await.unwrap();
    match protocol::decode(&bytes).unwrap() {
        Response::EndOfStream => {}
        other => panic!("expected EndOfStream, got {other:?}"),
    }
}

#[tokio::test]
async fn restart_while_running_leaves_the_service_active_again() {
    let daemon = start_daemon(
        serde_json::json!({"sleep": {"command": "sleep 10000", "log": null}}),
        vec![],
    )
    .await;

    let resp = roundtrip(&daemon.socket_path, Request::Start { name: "sleep".into() }).await;
    assert!(matches!(resp, Response::Ok));

    let resp = roundtrip(&daemon.socket_path, Request::Restart { name: "sleep".into() }).await;
    assert!(matches!(resp, Response::Ok));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let resp = roundtrip(&daemon.socket_path, Request::GetStatus { name: "sleep".into() }).await;
    match resp {
        Response::Status(status) => assert!(status.status.is_active()),
        other => panic!("expected Status, got {other:?}"),
    }
}

