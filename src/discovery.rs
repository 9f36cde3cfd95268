// Container record building and running-set enumeration

use crate::config::FailurePolicy;
use crate::docker_repo::ContainerRuntime;
use crate::error::ShapingError;
use crate::link_repo::LinkRepo;
use crate::models::{ContainerRecord, Policy, short_id};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct Discovery {
    runtime: Arc<dyn ContainerRuntime>,
    links: LinkRepo,
    failure_policy: FailurePolicy,
}

impl Discovery {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        links: LinkRepo,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            runtime,
            links,
            failure_policy,
        }
    }

    /// One record per veth pair of the container, all sharing id, name and policy.
    ///
    /// The policy is validated first so a malformed label never reaches host state.
    pub async fn build_records(
        &self,
        container_id: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<ContainerRecord>, ShapingError> {
        let policy = Policy::from_labels(labels)?;
        let resolved = self.links.resolve_interface_pairs(container_id).await?;
        if resolved.pairs.is_empty() {
            debug!(
                container_id = %short_id(container_id),
                name = %resolved.name,
                "no interface pairs, skipping"
            );
        }
        Ok(resolved
            .pairs
            .into_iter()
            .map(|pair| ContainerRecord::new(container_id, &resolved.name, pair, policy.clone()))
            .collect())
    }

    /// Records for every running container labelled for shaping, in listing order.
    ///
    /// Under `FailurePolicy::FailClosed` the first container error fails the pass with no
    /// partial result; under `SkipContainer` the container is logged and left out.
    #[instrument(skip_all, fields(failure_policy = ?self.failure_policy))]
    pub async fn list_eligible_containers(&self) -> Result<Vec<ContainerRecord>, ShapingError> {
        let containers = self
            .runtime
            .list_shaping_candidates()
            .await
            .map_err(ShapingError::List)?;

        let mut records = Vec::new();
        for c in &containers {
            match self.build_records(&c.id, &c.labels).await {
                Ok(r) => records.extend(r),
                Err(e) if self.failure_policy == FailurePolicy::SkipContainer => {
                    warn!(
                        container_id = %short_id(&c.id),
                        error = %e,
                        "skipping container"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            containers = containers.len(),
            records = records.len(),
            "enumerated running set"
        );
        Ok(records)
    }

    /// Drop netns links left behind by containers that are gone. Containers in `records` keep
    /// their links even when the namespace vanished after enumeration.
    pub async fn prune_links(&self, records: &[ContainerRecord]) -> usize {
        let keep: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
        self.links.prune_netns_links(&keep).await
    }
}
