// Docker event filtering: which lifecycle events warrant a reshaping pass.

use super::ContainerEvent;
use crate::models::LABEL_ENABLED;
use bollard::models::{EventMessage, EventMessageTypeEnum};
use std::collections::HashMap;

/// Container actions after which a container's veth pairs may be new or freshly recreated.
pub(super) const RESHAPE_ACTIONS: &[&str] = &["start", "restart", "unpause"];

/// Server-side filter: container events for shaped containers only.
pub(super) fn event_filters() -> HashMap<String, Vec<String>> {
    HashMap::from([
        ("type".to_string(), vec!["container".to_string()]),
        ("label".to_string(), vec![format!("{LABEL_ENABLED}=1")]),
        (
            "event".to_string(),
            RESHAPE_ACTIONS.iter().map(|a| a.to_string()).collect(),
        ),
    ])
}

/// Map a raw event to a ContainerEvent; None for anything the filter should have excluded.
pub(super) fn container_event(msg: &EventMessage) -> Option<ContainerEvent> {
    if msg.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }
    let action = msg.action.as_deref()?;
    // Older daemons report "exec_start: sh" style actions; only the verb matters.
    let verb = action.split(':').next().unwrap_or(action).trim();
    if !RESHAPE_ACTIONS.contains(&verb) {
        return None;
    }
    let id = msg.actor.as_ref()?.id.clone()?;
    Some(ContainerEvent {
        id,
        action: verb.to_string(),
    })
}
