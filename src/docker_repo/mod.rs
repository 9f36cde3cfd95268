// Container runtime access: the ContainerRuntime seam and its bollard implementation

mod events;

use crate::error::RuntimeError;
use crate::models::LABEL_ENABLED;
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{EventsOptions, InspectContainerOptions, ListContainersOptions};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use tracing::debug;

/// A running container selected by the shaping label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
}

/// The parts of an inspection the resolver needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Raw name as reported ("/web1").
    pub name: Option<String>,
    /// Network namespace handle, e.g. /var/run/docker/netns/1a2b3c4d5e6f.
    pub sandbox_key: Option<String>,
    pub network_mode: Option<String>,
}

/// A lifecycle event worth a reshaping pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub id: String,
    pub action: String,
}

pub type EventStream = BoxStream<'static, Result<ContainerEvent, RuntimeError>>;

/// Read-only view of the container runtime used by discovery and the event watcher.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Running containers labelled `org.label-schema.tc.enabled=1`.
    async fn list_shaping_candidates(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// Lifecycle events for shaped containers. Ends or errors when the connection drops.
    fn events(&self) -> EventStream;
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    /// Connect over the given unix socket, or bollard's defaults (DOCKER_HOST, /var/run/docker.sock).
    pub fn connect(socket: Option<&str>) -> anyhow::Result<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_unix_defaults()?,
        };
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRepo {
    async fn list_shaping_candidates(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let filters = HashMap::from([
            ("label".to_string(), vec![format!("{LABEL_ENABLED}=1")]),
            ("status".to_string(), vec!["running".to_string()]),
        ]);
        let options = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        debug!(count = containers.len(), "listed shaping candidates");
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let resp = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(r) => r,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(RuntimeError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };
        Ok(ContainerDetails {
            name: resp.name,
            sandbox_key: resp.network_settings.and_then(|n| n.sandbox_key),
            network_mode: resp.host_config.and_then(|h| h.network_mode),
        })
    }

    fn events(&self) -> EventStream {
        let options = EventsOptions {
            filters: Some(events::event_filters()),
            ..Default::default()
        };
        self.docker
            .events(Some(options))
            .filter_map(|res| async move {
                match res {
                    Ok(msg) => events::container_event(&msg).map(Ok),
                    Err(e) => Some(Err(RuntimeError::from(e))),
                }
            })
            .boxed()
    }
}
