// Shaping rule installer: step order, benign clear, abort behavior, idempotency

mod common;

use common::*;
use std::sync::Arc;
use tc_shaper::error::{ShapingError, Side, TcStep};
use tc_shaper::models::{ContainerRecord, Policy, VethPair};

fn record(rate: &str, ceil: &str) -> ContainerRecord {
    ContainerRecord::new(
        "abcdef0123456789",
        "web1",
        VethPair {
            host_interface: "veth123".into(),
            container_interface: "veth124".into(),
        },
        Policy::new(rate, ceil).unwrap(),
    )
}

const CLEAR_HOST: &str = "tc qdisc del dev veth123 root";
const ROOT_HOST: &str = "tc qdisc add dev veth123 root handle 1a1a: htb default 1";

#[tokio::test]
async fn issues_five_commands_per_side() {
    let runner = Arc::new(ScriptedRunner::default());
    installer(runner.clone())
        .install_shaping(&record("20mbps", "20mbps"))
        .await
        .unwrap();

    assert_eq!(
        runner.issued(),
        vec![
            "tc qdisc del dev veth123 root",
            "tc qdisc add dev veth123 root handle 1a1a: htb default 1",
            "tc class add dev veth123 parent 1a1a: classid 1a1a:1 htb rate 20mbps ceil 20mbps",
            "tc qdisc add dev veth123 parent 1a1a:1 handle 2a2a: sfq perturb 10",
            "tc filter add dev veth123 parent 1a1a: protocol ip prio 1 u32 match ip src 0.0.0.0/0 match ip dst 0.0.0.0/0 flowid 1a1a:1",
            "ip netns exec web1 tc qdisc del dev veth124 root",
            "ip netns exec web1 tc qdisc add dev veth124 root handle 1a1a: htb default 1",
            "ip netns exec web1 tc class add dev veth124 parent 1a1a: classid 1a1a:1 htb rate 20mbps ceil 20mbps",
            "ip netns exec web1 tc qdisc add dev veth124 parent 1a1a:1 handle 2a2a: sfq perturb 10",
            "ip netns exec web1 tc filter add dev veth124 parent 1a1a: protocol ip prio 1 u32 match ip src 0.0.0.0/0 match ip dst 0.0.0.0/0 flowid 1a1a:1",
        ]
    );
}

#[tokio::test]
async fn missing_root_qdisc_on_clear_is_success() {
    let runner = Arc::new(ScriptedRunner::default());
    runner.reply(
        CLEAR_HOST,
        failed("RTNETLINK answers: No such file or directory\n"),
    );
    installer(runner.clone())
        .install_shaping(&record("1mbit", "2mbit"))
        .await
        .unwrap();

    let issued = runner.issued();
    assert_eq!(issued.len(), 10);
    assert_eq!(issued[1], ROOT_HOST);
}

#[tokio::test]
async fn other_clear_failure_aborts_with_output() {
    let runner = Arc::new(ScriptedRunner::default());
    runner.reply(CLEAR_HOST, failed("Cannot find device \"veth123\"\n"));
    let err = installer(runner.clone())
        .install_shaping(&record("1mbit", "1mbit"))
        .await
        .unwrap_err();

    match err {
        ShapingError::Command {
            side,
            step,
            output,
            status,
            ..
        } => {
            assert_eq!(side, Side::Host);
            assert_eq!(step, TcStep::Clear);
            assert_eq!(status, Some(2));
            assert_eq!(output, "Cannot find device \"veth123\"");
        }
        other => panic!("expected command error, got {other:?}"),
    }
    assert_eq!(runner.issued(), vec![CLEAR_HOST]);
}

#[tokio::test]
async fn create_root_failure_stops_the_side() {
    let runner = Arc::new(ScriptedRunner::default());
    runner.reply(ROOT_HOST, failed("RTNETLINK answers: File exists\n"));
    let err = installer(runner.clone())
        .install_shaping(&record("1mbit", "1mbit"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShapingError::Command {
            side: Side::Host,
            step: TcStep::CreateRoot,
            ..
        }
    ));
    // No class, fair-queue or filter, and the container side is never attempted.
    assert_eq!(runner.issued(), vec![CLEAR_HOST, ROOT_HOST]);
}

#[tokio::test]
async fn container_side_failure_is_reported_as_container_side() {
    let runner = Arc::new(ScriptedRunner::default());
    runner.reply(
        "ip netns exec web1 tc qdisc add dev veth124 parent 1a1a:1 handle 2a2a: sfq perturb 10",
        failed("RTNETLINK answers: Invalid argument\n"),
    );
    let err = installer(runner.clone())
        .install_shaping(&record("1mbit", "1mbit"))
        .await
        .unwrap_err();

    assert_eq!(err.side(), Some(Side::Container));
    assert!(matches!(
        err,
        ShapingError::Command {
            step: TcStep::CreateFairQueue,
            ..
        }
    ));
    assert_eq!(runner.issued().len(), 9);
}

#[tokio::test]
async fn install_side_allows_retrying_one_end() {
    let runner = Arc::new(ScriptedRunner::default());
    let r = record("3mbit", "4mbit");
    installer(runner.clone())
        .install_side(Side::Container, &r.container_interface, &r.policy, Some(&r.name))
        .await
        .unwrap();

    let issued = runner.issued();
    assert_eq!(issued.len(), 5);
    assert!(issued.iter().all(|c| c.starts_with("ip netns exec web1 tc ")));
    assert!(issued[2].ends_with("htb rate 3mbit ceil 4mbit"));
}

#[tokio::test]
async fn reinstall_is_idempotent() {
    let tc = Arc::new(FakeTc::default());
    let inst = installer(tc.clone());
    let r = record("20mbps", "20mbps");

    inst.install_shaping(&r).await.unwrap();
    let first = tc.state.lock().unwrap().clone();
    inst.install_shaping(&r).await.unwrap();
    let second = tc.state.lock().unwrap().clone();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(tc.issued.lock().unwrap().len(), 20);
}

#[tokio::test]
async fn reinstall_replaces_a_previous_policy() {
    let tc = Arc::new(FakeTc::default());
    let inst = installer(tc.clone());

    inst.install_shaping(&record("1mbit", "1mbit")).await.unwrap();
    inst.install_shaping(&record("9mbit", "9mbit")).await.unwrap();

    let state = tc.state.lock().unwrap();
    let host = &state[&(None, "veth123".to_string())];
    assert_eq!(host.len(), 4);
    assert!(host[1].contains("rate 9mbit ceil 9mbit"));
    assert!(!host.iter().any(|o| o.contains("1mbit")));
}

#[tokio::test]
async fn spawn_failure_is_exec_error() {
    struct Broken;

    #[async_trait::async_trait]
    impl tc_shaper::command::CommandRunner for Broken {
        async fn run(
            &self,
            _cmd: &tc_shaper::command::ShellCommand,
        ) -> std::io::Result<tc_shaper::command::CommandOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "tc: not found"))
        }
    }

    let err = installer(Arc::new(Broken))
        .install_shaping(&record("1mbit", "1mbit"))
        .await
        .unwrap_err();
    match err {
        ShapingError::Exec {
            side,
            step,
            command,
            ..
        } => {
            assert_eq!(side, Side::Host);
            assert_eq!(step, TcStep::Clear);
            assert_eq!(command, CLEAR_HOST);
        }
        other => panic!("expected exec error, got {other:?}"),
    }
}

#[tokio::test]
async fn container_side_spawn_failure_reports_container_side() {
    struct NoNetnsExec;

    #[async_trait::async_trait]
    impl tc_shaper::command::CommandRunner for NoNetnsExec {
        async fn run(
            &self,
            cmd: &tc_shaper::command::ShellCommand,
        ) -> std::io::Result<tc_shaper::command::CommandOutput> {
            if cmd.netns.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "ip: permission denied",
                ));
            }
            Ok(ok(""))
        }
    }

    let err = installer(Arc::new(NoNetnsExec))
        .install_shaping(&record("1mbit", "1mbit"))
        .await
        .unwrap_err();
    assert_eq!(err.side(), Some(Side::Container));
    assert!(matches!(
        err,
        ShapingError::Exec {
            step: TcStep::Clear,
            ..
        }
    ));
}
