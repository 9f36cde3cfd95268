// Parsing `ip -o link show type veth` output and pairing the two namespaces' views.

use crate::models::VethPair;

/// One line of `ip -o link`: "12: veth3f2a@if11: <BROADCAST,...> mtu 1500 ...".
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LinkEntry {
    pub index: u32,
    pub name: String,
    /// ifindex of the peer in the other namespace ("@if11"); None for "@NONE" or no suffix.
    pub peer_index: Option<u32>,
}

pub(super) fn parse_link_line(line: &str) -> Option<LinkEntry> {
    let (index, rest) = line.split_once(':')?;
    let index = index.trim().parse::<u32>().ok()?;
    let (field, _) = rest.trim_start().split_once(':')?;
    let (name, peer_index) = match field.split_once('@') {
        Some((name, peer)) => (name, peer.strip_prefix("if").and_then(|p| p.parse().ok())),
        None => (field, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(LinkEntry {
        index,
        name: name.to_string(),
        peer_index,
    })
}

pub(super) fn parse_links(output: &str) -> Vec<LinkEntry> {
    output.lines().filter_map(parse_link_line).collect()
}

/// Pair each container-side veth with the host veth it points at.
///
/// Both ends must point at each other; ifindex values are per-namespace, so a one-sided match
/// can name an unrelated interface. Unmatched container links are dropped.
pub(super) fn pair_links(container: &[LinkEntry], host: &[LinkEntry]) -> Vec<VethPair> {
    container
        .iter()
        .filter_map(|c| {
            let peer = c.peer_index?;
            let h = host
                .iter()
                .find(|h| h.index == peer && h.peer_index.is_none_or(|p| p == c.index))?;
            Some(VethPair {
                host_interface: h.name.clone(),
                container_interface: c.name.clone(),
            })
        })
        .collect()
}
