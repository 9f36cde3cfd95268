// Shaping targets built from Docker containers

use super::policy::Policy;
use serde::Serialize;

/// Length of the short container id used in records and logs.
pub const SHORT_ID_LEN: usize = 12;

/// One end-to-end veth pair: host end in the default namespace, container end in the container's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VethPair {
    pub host_interface: String,
    pub container_interface: String,
}

/// One shaping target: a single veth pair of one running container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub host_interface: String,
    pub container_interface: String,
    pub policy: Policy,
}

impl ContainerRecord {
    pub fn new(container_id: &str, name: &str, pair: VethPair, policy: Policy) -> Self {
        Self {
            id: short_id(container_id).to_string(),
            name: name.to_string(),
            host_interface: pair.host_interface,
            container_interface: pair.container_interface,
            policy,
        }
    }
}

/// First 12 characters of a runtime id (whole id when shorter).
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((i, _)) => &id[..i],
        None => id,
    }
}

/// Docker reports names as "/web1"; tc and ip netns address the bare name.
pub fn display_name(raw: &str) -> &str {
    raw.trim_start_matches('/')
}
