//! End-to-end lifecycle tests against real `sh` processes
#![cfg(unix)]

use std::time::Duration;

use hearth_process::{
    InstanceRegistry, InstanceState, LaunchProfile, SupervisorConfig, SupervisorError,
    STREAM_END_SENTINEL,
};
use tempfile::TempDir;

/// Echoes commands back and exits cleanly on `stop`
const ECHO_SERVER: &str = r#"echo "Server ready"
while IFS= read -r line; do
  case "$line" in
    stop) echo "Stopping server"; exit 0 ;;
    *) echo "echo: $line" ;;
  esac
done
"#;

/// Ignores both the shutdown command and SIGTERM
const STUBBORN_SERVER: &str = r#"trap '' TERM
echo "Server ready"
while true; do sleep 1; done
"#;

/// Dies on its own with a non-zero code
const CRASHING_SERVER: &str = r#"echo "Server ready"
echo "fatal: out of cheese" >&2
exit 3
"#;

fn registry_with(script: &str) -> (TempDir, InstanceRegistry) {
    let root = tempfile::tempdir().unwrap();
    let profile = LaunchProfile::new("sh", "server.sh").seed_file("server.sh", script);
    let config = SupervisorConfig::new(root.path())
        .profile(profile)
        .stream_poll_interval(Duration::from_millis(20))
        .restart_settle(Duration::from_millis(50));
    (root, InstanceRegistry::new(config))
}

async fn wait_for_line(registry: &InstanceRegistry, id: &str, needle: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let lines = registry.console_snapshot(id, Some(1000)).await.unwrap();
        if lines.iter().any(|line| line.contains(needle)) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {needle:?}, console: {lines:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_exit(registry: &InstanceRegistry, id: &str) {
    let instance = registry.ensure_loaded(id).await.unwrap();
    assert!(
        instance.wait_for_exit(Duration::from_secs(5)).await,
        "instance {id} did not exit"
    );
}

#[tokio::test]
async fn test_start_reports_pid_and_rejects_second_start() {
    let (_root, registry) = registry_with(ECHO_SERVER);
    registry.create(Some("alpha")).await.unwrap();

    let pid = registry.start("alpha", None, &[]).await.unwrap();
    wait_for_line(&registry, "alpha", "Server ready").await;
    let status = registry.status("alpha").await.unwrap();
    assert!(status.running);
    assert_eq!(status.pid, Some(pid));
    assert_eq!(status.state, InstanceState::Running);
    let console = registry.console_snapshot("alpha", None).await.unwrap();

    let err = registry.start("alpha", None, &[]).await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning { pid: p } if p == pid));

    // The rejected start leaves the running process and its console alone
    assert_eq!(registry.status("alpha").await.unwrap(), status);
    assert_eq!(
        registry.console_snapshot("alpha", None).await.unwrap(),
        console
    );

    registry.kill("alpha").await.unwrap();
    wait_for_exit(&registry, "alpha").await;
}

#[tokio::test]
async fn test_graceful_stop_records_clean_exit() {
    let (_root, registry) = registry_with(ECHO_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();
    wait_for_line(&registry, "alpha", "Server ready").await;

    registry
        .stop("alpha", Some(Duration::from_secs(5)))
        .await
        .unwrap();

    let status = registry.status("alpha").await.unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(status.state, InstanceState::Stopped);

    let console = registry.console_snapshot("alpha", None).await.unwrap();
    assert!(console.contains(&"Stopping server".to_string()));
    assert_eq!(
        console.last().map(String::as_str),
        Some("[process exited with code 0]")
    );
}

#[tokio::test]
async fn test_stop_escalates_to_kill_after_timeout() {
    let (_root, registry) = registry_with(STUBBORN_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();
    wait_for_line(&registry, "alpha", "Server ready").await;

    let started = tokio::time::Instant::now();
    registry
        .stop("alpha", Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    let status = registry.status("alpha").await.unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(-9));
    assert_eq!(status.state, InstanceState::Stopped);
}

#[tokio::test]
async fn test_stop_is_bounded_when_stdin_is_full() {
    let root = tempfile::tempdir().unwrap();
    let profile = LaunchProfile::new("sh", "server.sh").seed_file("server.sh", STUBBORN_SERVER);
    let config = SupervisorConfig::new(root.path())
        .profile(profile)
        .stream_poll_interval(Duration::from_millis(20))
        .command_write_timeout(Duration::from_secs(3));
    let registry = InstanceRegistry::new(config);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();
    wait_for_line(&registry, "alpha", "Server ready").await;

    // The child never reads, so this fills the pipe and times out
    let flood = "x".repeat(512 * 1024);
    let err = registry.send_command("alpha", &flood).await.unwrap_err();
    assert!(matches!(err, SupervisorError::WriteFailure(_)));

    let started = tokio::time::Instant::now();
    registry
        .stop("alpha", Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert!(
        started.elapsed() < Duration::from_millis(2500),
        "stop took {:?}",
        started.elapsed()
    );
    let status = registry.status("alpha").await.unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(-9));
    let console = registry.console_snapshot("alpha", None).await.unwrap();
    assert!(console.iter().any(|line| line.starts_with("[stop failed:")));
}

#[tokio::test]
async fn test_unexpected_exit_is_crashed() {
    let (_root, registry) = registry_with(CRASHING_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();
    wait_for_exit(&registry, "alpha").await;

    let status = registry.status("alpha").await.unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(3));
    assert_eq!(status.state, InstanceState::Crashed);

    let console = registry.console_snapshot("alpha", None).await.unwrap();
    assert!(console.contains(&"fatal: out of cheese".to_string()));
    assert_eq!(
        console.last().map(String::as_str),
        Some("[process exited with code 3]")
    );
}

#[tokio::test]
async fn test_kill_reports_signal_exit() {
    let (_root, registry) = registry_with(STUBBORN_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();

    registry.kill("alpha").await.unwrap();
    registry.kill("alpha").await.unwrap();
    wait_for_exit(&registry, "alpha").await;

    let status = registry.status("alpha").await.unwrap();
    assert_eq!(status.exit_code, Some(-9));
    assert_eq!(status.state, InstanceState::Stopped);
}

#[tokio::test]
async fn test_commands_reach_stdin() {
    let (_root, registry) = registry_with(ECHO_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();

    registry.send_command("alpha", "say hi").await.unwrap();
    wait_for_line(&registry, "alpha", "echo: say hi").await;

    registry.stop("alpha", None).await.unwrap();
    let err = registry.send_command("alpha", "say hi").await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning));
}

#[tokio::test]
async fn test_restart_launches_fresh_process() {
    let (_root, registry) = registry_with(ECHO_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    let first = registry.start("alpha", None, &[]).await.unwrap();
    wait_for_line(&registry, "alpha", "Server ready").await;

    let second = registry.restart("alpha", None, &[]).await.unwrap();

    assert_ne!(first, second);
    let status = registry.status("alpha").await.unwrap();
    assert!(status.running);
    assert_eq!(status.pid, Some(second));
    assert_eq!(status.exit_code, None);

    registry.stop("alpha", None).await.unwrap();
}

#[tokio::test]
async fn test_missing_runtime_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let profile = LaunchProfile::new("hearth-no-such-runtime-8f3a", "server.sh")
        .seed_file("server.sh", ECHO_SERVER);
    let registry = InstanceRegistry::new(SupervisorConfig::new(root.path()).profile(profile));
    registry.create(Some("alpha")).await.unwrap();

    let err = registry.start("alpha", None, &[]).await.unwrap_err();

    assert!(matches!(err, SupervisorError::RuntimeMissing { .. }));
    assert_eq!(err.code(), "runtime_missing");
    assert!(!registry.status("alpha").await.unwrap().running);
}

#[tokio::test]
async fn test_stream_after_exit_replays_then_ends() {
    let (_root, registry) = registry_with(CRASHING_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();
    wait_for_exit(&registry, "alpha").await;

    let mut stream = registry.console_stream("alpha").await.unwrap();
    let mut lines = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), stream.next_event())
        .await
        .unwrap()
    {
        lines.push(event.line);
    }

    assert_eq!(lines.last().map(String::as_str), Some(STREAM_END_SENTINEL));
    assert_eq!(
        lines[lines.len() - 2],
        "[process exited with code 3]".to_string()
    );
    assert!(lines.contains(&"Server ready".to_string()));
}

#[tokio::test]
async fn test_delete_stops_running_instance() {
    let (root, registry) = registry_with(ECHO_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();

    registry.delete("alpha").await.unwrap();

    assert!(!root.path().join("alpha").exists());
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_racing_delete_never_relaunches() {
    let (root, registry) = registry_with(ECHO_SERVER);
    registry.create(Some("alpha")).await.unwrap();
    registry.start("alpha", None, &[]).await.unwrap();
    wait_for_line(&registry, "alpha", "Server ready").await;

    let starter = async {
        let mut launched = Vec::new();
        loop {
            match registry.start("alpha", None, &[]).await {
                Ok(pid) => launched.push(pid),
                Err(SupervisorError::NotFound { .. }) => return launched,
                Err(SupervisorError::AlreadyRunning { .. }) => {}
                Err(other) => panic!("unexpected start error: {other}"),
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let (deleted, launched) = tokio::join!(registry.delete("alpha"), starter);

    deleted.unwrap();
    assert!(launched.is_empty(), "start relaunched during delete: {launched:?}");
    assert!(!root.path().join("alpha").exists());
    assert!(matches!(
        registry.status("alpha").await.unwrap_err(),
        SupervisorError::NotFound { .. }
    ));
}
