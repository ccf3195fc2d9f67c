//! End-to-end supervisor scenarios across the process core
#![cfg(unix)]

use std::time::Duration;

use futures::StreamExt;
use hearth_integration_tests::{sh_supervisor as supervisor, wait_for_lines};
use hearth_process::{
    ConsoleBuffer, InstanceRegistry, InstanceState, LaunchProfile, SupervisorConfig,
    SupervisorError, STREAM_END_SENTINEL,
};

/// Prints five lines, then echoes input until `stop`
const CHATTY_SERVER: &str = r#"for i in 1 2 3 4 5; do echo "boot $i"; done
while IFS= read -r line; do
  case "$line" in
    stop) exit 0 ;;
    *) echo "> $line" ;;
  esac
done
"#;

/// Never reads its input
const DEAF_SERVER: &str = r#"trap '' TERM INT
echo "Server ready"
while true; do sleep 1; done
"#;

#[test]
fn scenario_bounded_buffer_keeps_newest() {
    let mut buffer = ConsoleBuffer::new(3);
    for line in ["A", "B", "C", "D"] {
        buffer.append(line);
    }
    assert_eq!(buffer.snapshot(3), vec!["B", "C", "D"]);
}

#[tokio::test]
async fn scenario_start_without_artifact() {
    let root = tempfile::tempdir().unwrap();
    let config =
        SupervisorConfig::new(root.path()).profile(LaunchProfile::new("sh", "server.sh"));
    let registry = InstanceRegistry::new(config);
    registry.create(Some("empty")).await.unwrap();

    let err = registry.start("empty", None, &[]).await.unwrap_err();

    assert!(matches!(err, SupervisorError::MissingArtifact { .. }));
    let status = registry.status("empty").await.unwrap();
    assert_eq!(status.state, InstanceState::Stopped);
    assert!(!status.running);
}

#[tokio::test]
async fn scenario_stop_forces_kill_after_timeout() {
    let (_root, registry) = supervisor(DEAF_SERVER);
    registry.create(Some("deaf")).await.unwrap();
    registry.start("deaf", None, &[]).await.unwrap();
    wait_for_lines(&registry, "deaf", 1).await;

    let begun = tokio::time::Instant::now();
    registry
        .stop("deaf", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    let took = begun.elapsed();

    assert!(took >= Duration::from_millis(900), "stopped after {took:?}");
    assert!(took < Duration::from_secs(5), "stopped after {took:?}");
    let status = registry.status("deaf").await.unwrap();
    assert!(!status.running);
    assert!(status.exit_code.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_concurrent_subscribers_agree() {
    let (_root, registry) = supervisor(CHATTY_SERVER);
    registry.create(Some("chatty")).await.unwrap();
    registry.start("chatty", None, &[]).await.unwrap();
    wait_for_lines(&registry, "chatty", 5).await;

    let first = registry.console_stream("chatty").await.unwrap();
    let second = registry.console_stream("chatty").await.unwrap();

    registry.send_command("chatty", "six").await.unwrap();
    registry.send_command("chatty", "seven").await.unwrap();
    wait_for_lines(&registry, "chatty", 7).await;
    registry.stop("chatty", None).await.unwrap();

    let collect = |stream: hearth_process::ConsoleStream| async move {
        tokio::time::timeout(
            Duration::from_secs(10),
            stream.map(|event| event.line).collect::<Vec<_>>(),
        )
        .await
        .unwrap()
    };
    let (first, second) = tokio::join!(collect(first), collect(second));

    assert_eq!(first, second);
    assert_eq!(
        &first[..7],
        &["boot 1", "boot 2", "boot 3", "boot 4", "boot 5", "> six", "> seven"]
    );
    assert_eq!(first.last().map(String::as_str), Some(STREAM_END_SENTINEL));
}

#[tokio::test]
async fn scenario_command_before_start() {
    let (_root, registry) = supervisor(CHATTY_SERVER);
    registry.create(Some("idle")).await.unwrap();

    let err = registry.send_command("idle", "say hi").await.unwrap_err();

    assert!(matches!(err, SupervisorError::NotRunning));
    assert!(registry
        .console_snapshot("idle", None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn repeated_runs_each_record_their_exit() {
    let (_root, registry) = supervisor(CHATTY_SERVER);
    registry.create(Some("cycled")).await.unwrap();

    let mut pids = Vec::new();
    for _ in 0..3 {
        pids.push(registry.start("cycled", None, &[]).await.unwrap());
        wait_for_lines(&registry, "cycled", 5).await;
        registry.stop("cycled", None).await.unwrap();

        let status = registry.status("cycled").await.unwrap();
        assert!(!status.running);
        assert_eq!(status.exit_code, Some(0));
    }

    pids.dedup();
    assert_eq!(pids.len(), 3);
    let exits = registry
        .console_snapshot("cycled", Some(1000))
        .await
        .unwrap()
        .into_iter()
        .filter(|line| line == "[process exited with code 0]")
        .count();
    assert_eq!(exits, 3);
}

#[tokio::test]
async fn shutdown_all_stops_every_instance() {
    let (_root, registry) = supervisor(CHATTY_SERVER);
    for id in ["one", "two"] {
        registry.create(Some(id)).await.unwrap();
        registry.start(id, None, &[]).await.unwrap();
    }

    registry.shutdown_all(Some(Duration::from_secs(5))).await;

    for summary in registry.list().await.unwrap() {
        assert!(!summary.running, "{} still running", summary.id);
    }
}
