// Shared test helpers: fake container runtime, scripted and stateful command runners

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tc_shaper::command::{CommandOutput, CommandRunner, ShellCommand};
use tc_shaper::config::FailurePolicy;
use tc_shaper::discovery::Discovery;
use tc_shaper::docker_repo::{
    ContainerDetails, ContainerEvent, ContainerRuntime, ContainerSummary, EventStream,
};
use tc_shaper::error::RuntimeError;
use tc_shaper::link_repo::{LinkConfig, LinkRepo};
use tc_shaper::models::LABEL_ENABLED;
use tc_shaper::tc::{TcConfig, TcInstaller};

pub const HOST_LINKS_CMD: &str = "ip -o link show type veth";

pub fn netns_links_cmd(name: &str) -> String {
    format!("ip netns exec {name} ip -o link show type veth")
}

/// `ip -o link` line for a veth whose peer has ifindex `peer`.
pub fn link_line(index: u32, name: &str, peer: u32) -> String {
    format!(
        "{index}: {name}@if{peer}: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP mode DEFAULT group default \\    link/ether 02:42:ac:11:00:02 brd ff:ff:ff:ff:ff:ff link-netnsid 0\n"
    )
}

pub fn ok(output: &str) -> CommandOutput {
    CommandOutput {
        status: Some(0),
        output: output.to_string(),
    }
}

pub fn failed(output: &str) -> CommandOutput {
    CommandOutput {
        status: Some(2),
        output: output.to_string(),
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerSummary>>,
    details: Mutex<HashMap<String, ContainerDetails>>,
    list_error: Mutex<bool>,
    /// One batch per subscription; the stream ends after its batch. No batch left: never yields.
    event_batches: Mutex<VecDeque<Vec<Result<ContainerEvent, RuntimeError>>>>,
    pub list_calls: AtomicUsize,
    pub subscriptions: AtomicUsize,
}

impl FakeRuntime {
    /// Add a running, shaping-enabled container with a private namespace.
    pub fn add_container(&self, id: &str, raw_name: &str, extra_labels: &[(&str, &str)]) {
        let mut l = labels(extra_labels);
        l.insert(LABEL_ENABLED.to_string(), "1".to_string());
        self.containers.lock().unwrap().push(ContainerSummary {
            id: id.to_string(),
            labels: l,
        });
        self.details.lock().unwrap().insert(
            id.to_string(),
            ContainerDetails {
                name: Some(raw_name.to_string()),
                sandbox_key: Some(format!("/var/run/docker/netns/{}", &id[..6.min(id.len())])),
                network_mode: Some("bridge".to_string()),
            },
        );
    }

    /// Listed but unknown to inspect (exited between list and inspect).
    pub fn add_vanished(&self, id: &str) {
        let mut l = HashMap::new();
        l.insert(LABEL_ENABLED.to_string(), "1".to_string());
        self.containers.lock().unwrap().push(ContainerSummary {
            id: id.to_string(),
            labels: l,
        });
    }

    pub fn set_details(&self, id: &str, details: ContainerDetails) {
        self.details.lock().unwrap().insert(id.to_string(), details);
    }

    pub fn fail_listing(&self) {
        *self.list_error.lock().unwrap() = true;
    }

    pub fn push_event_batch(&self, batch: Vec<Result<ContainerEvent, RuntimeError>>) {
        self.event_batches.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_shaping_candidates(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.list_error.lock().unwrap() {
            return Err(RuntimeError::MissingField("Containers"));
        }
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        self.details
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    fn events(&self) -> EventStream {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        match self.event_batches.lock().unwrap().pop_front() {
            Some(batch) => stream::iter(batch).boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Replies by exact rendered command line; unknown commands succeed with empty output.
/// A queued reply with more behind it is used once; the last one repeats.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    pub issued: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn reply(&self, command: &str, out: CommandOutput) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(out);
        self
    }

    /// Host and in-namespace veth listings for a container with the given (host, container) pairs.
    /// Container-side ifindex starts at 100, host-side at 200.
    pub fn veths(&self, name: &str, pairs: &[(&str, &str)]) -> &Self {
        let mut inside = String::new();
        let mut host = self
            .replies
            .lock()
            .unwrap()
            .get(HOST_LINKS_CMD)
            .and_then(|q| q.back().map(|o| o.output.clone()))
            .unwrap_or_default();
        let offset = host.lines().count() as u32;
        for (i, (h, c)) in pairs.iter().enumerate() {
            let ci = 100 + offset + i as u32;
            let hi = 200 + offset + i as u32;
            inside.push_str(&link_line(ci, c, hi));
            host.push_str(&link_line(hi, h, ci));
        }
        let mut replies = self.replies.lock().unwrap();
        replies.insert(netns_links_cmd(name), VecDeque::from([ok(&inside)]));
        replies.insert(HOST_LINKS_CMD.to_string(), VecDeque::from([ok(&host)]));
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    pub fn issued_tc(&self) -> Vec<String> {
        self.issued()
            .into_iter()
            .filter(|c| !c.ends_with("link show type veth"))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, cmd: &ShellCommand) -> std::io::Result<CommandOutput> {
        let line = cmd.to_string();
        self.issued.lock().unwrap().push(line.clone());
        let mut replies = self.replies.lock().unwrap();
        let out = match replies.get_mut(&line) {
            Some(q) if q.len() > 1 => q.pop_front(),
            Some(q) => q.front().cloned(),
            None => None,
        };
        Ok(out.unwrap_or_else(|| ok("")))
    }
}

/// Minimal model of tc's per-device qdisc tree, enough to exercise the clear/rebuild protocol.
#[derive(Default)]
pub struct FakeTc {
    /// (namespace, device) -> objects installed under the root, in order.
    pub state: Mutex<HashMap<(Option<String>, String), Vec<String>>>,
    pub issued: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for FakeTc {
    async fn run(&self, cmd: &ShellCommand) -> std::io::Result<CommandOutput> {
        self.issued.lock().unwrap().push(cmd.to_string());
        let args = &cmd.args;
        let dev = args
            .iter()
            .position(|a| a == "dev")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let key = (cmd.netns.as_ref().map(|(_, n)| n.clone()), dev);
        let mut state = self.state.lock().unwrap();
        let verb = (args[0].as_str(), args[1].as_str());
        let is_root = args.get(4).is_some_and(|a| a == "root");
        match verb {
            ("qdisc", "del") => match state.remove(&key) {
                Some(_) => Ok(ok("")),
                None => Ok(failed("RTNETLINK answers: No such file or directory\n")),
            },
            ("qdisc", "add") if is_root => {
                if state.contains_key(&key) {
                    return Ok(failed("RTNETLINK answers: File exists\n"));
                }
                state.insert(key, vec![args[3..].join(" ")]);
                Ok(ok(""))
            }
            (_, "add") => match state.get_mut(&key) {
                Some(objs) => {
                    objs.push(format!("{} {}", args[0], args[3..].join(" ")));
                    Ok(ok(""))
                }
                None => Ok(failed("RTNETLINK answers: No such file or directory\n")),
            },
            _ => Ok(failed("Command line is not complete.\n")),
        }
    }
}

pub fn link_config() -> LinkConfig {
    LinkConfig {
        ip_path: "ip".into(),
        netns_dir: "/nonexistent/netns".into(),
        link_netns: false,
    }
}

pub fn tc_config() -> TcConfig {
    TcConfig {
        tc_path: "tc".into(),
        ip_path: "ip".into(),
    }
}

pub fn discovery(
    runtime: Arc<FakeRuntime>,
    runner: Arc<dyn CommandRunner>,
    policy: FailurePolicy,
) -> Discovery {
    let links = LinkRepo::new(runtime.clone(), runner, link_config());
    Discovery::new(runtime, links, policy)
}

pub fn installer(runner: Arc<dyn CommandRunner>) -> TcInstaller {
    TcInstaller::new(runner, tc_config())
}
