// Interface resolution: container id -> display name + veth pairs

mod parse;

use crate::command::{CommandRunner, ShellCommand};
use crate::docker_repo::ContainerRuntime;
use crate::error::{LookupStep, RuntimeError, ShapingError};
use crate::models::{VethPair, display_name, short_id};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Network modes that never have a veth pair of their own.
const UNSHAPEABLE_NETWORK_MODES: &[&str] = &["host", "none"];

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub ip_path: String,
    /// Directory `ip netns` resolves names in (iproute2's NETNS_RUN_DIR).
    pub netns_dir: PathBuf,
    /// Symlink `<netns_dir>/<name>` to the container's sandbox key before entering it.
    pub link_netns: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterfaces {
    pub name: String,
    pub pairs: Vec<VethPair>,
}

pub struct LinkRepo {
    runtime: Arc<dyn ContainerRuntime>,
    runner: Arc<dyn CommandRunner>,
    config: LinkConfig,
}

impl LinkRepo {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        runner: Arc<dyn CommandRunner>,
        config: LinkConfig,
    ) -> Self {
        Self {
            runtime,
            runner,
            config,
        }
    }

    /// Resolve a container's display name and its veth pairs.
    ///
    /// Zero pairs is not an error: host/none networking, a namespace that has already gone away,
    /// or peers that disappeared mid-query all yield an empty list.
    #[instrument(skip_all, fields(container_id = %short_id(container_id)))]
    pub async fn resolve_interface_pairs(
        &self,
        container_id: &str,
    ) -> Result<ResolvedInterfaces, ShapingError> {
        let name = self.lookup_name(container_id).await?;
        let none = |name: String| ResolvedInterfaces {
            name,
            pairs: Vec::new(),
        };

        let Some(sandbox_key) = self.lookup_namespace(container_id).await? else {
            debug!(%name, "no private network namespace");
            return Ok(none(name));
        };

        if self.config.link_netns {
            if !tokio::fs::try_exists(&sandbox_key).await.unwrap_or(false) {
                debug!(%name, %sandbox_key, "network namespace vanished");
                return Ok(none(name));
            }
            self.link_netns(&name, &sandbox_key).await?;
        }

        let (container_links, host_links) = match self.query_links(&name).await {
            Ok(links) => links,
            Err(e) => {
                // The container exited between the existence check and the query.
                if self.config.link_netns
                    && !tokio::fs::try_exists(&sandbox_key).await.unwrap_or(true)
                {
                    debug!(%name, %sandbox_key, error = %e, "network namespace vanished mid-query");
                    return Ok(none(name));
                }
                return Err(e);
            }
        };

        let pairs = parse::pair_links(&container_links, &host_links);
        if pairs.len() < container_links.len() {
            debug!(
                %name,
                container_links = container_links.len(),
                paired = pairs.len(),
                "some container veths have no host peer"
            );
        }
        Ok(ResolvedInterfaces { name, pairs })
    }

    async fn lookup_name(&self, container_id: &str) -> Result<String, ShapingError> {
        let lookup_err = |source| ShapingError::Lookup {
            id: container_id.to_string(),
            step: LookupStep::Name,
            source,
        };
        let details = self.runtime.inspect(container_id).await.map_err(lookup_err)?;
        let name = details
            .name
            .as_deref()
            .map(display_name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| lookup_err(RuntimeError::MissingField("Name")))?;
        Ok(name.to_string())
    }

    /// Sandbox key of the container's private namespace; None when it has none.
    async fn lookup_namespace(&self, container_id: &str) -> Result<Option<String>, ShapingError> {
        let details = self
            .runtime
            .inspect(container_id)
            .await
            .map_err(|source| ShapingError::Lookup {
                id: container_id.to_string(),
                step: LookupStep::Namespace,
                source,
            })?;
        if details
            .network_mode
            .as_deref()
            .is_some_and(|m| UNSHAPEABLE_NETWORK_MODES.contains(&m))
        {
            return Ok(None);
        }
        Ok(details.sandbox_key.filter(|k| !k.is_empty()))
    }

    /// Point `<netns_dir>/<name>` at the sandbox key, replacing a stale link.
    async fn link_netns(&self, name: &str, sandbox_key: &str) -> Result<(), ShapingError> {
        let resolution_err = |reason: String| ShapingError::Resolution {
            name: name.to_string(),
            reason,
        };
        let dir = &self.config.netns_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| resolution_err(format!("create {}: {e}", dir.display())))?;

        let link = dir.join(name);
        match tokio::fs::read_link(&link).await {
            Ok(target) if target == Path::new(sandbox_key) => return Ok(()),
            Ok(_) => {
                tokio::fs::remove_file(&link)
                    .await
                    .map_err(|e| resolution_err(format!("remove stale {}: {e}", link.display())))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(resolution_err(format!(
                    "{} exists and is not a symlink: {e}",
                    link.display()
                )));
            }
        }
        tokio::fs::symlink(sandbox_key, &link)
            .await
            .map_err(|e| resolution_err(format!("link {}: {e}", link.display())))?;
        debug!(name, sandbox_key, "linked network namespace");
        Ok(())
    }

    /// Veth listings inside the container's namespace and on the host.
    async fn query_links(
        &self,
        name: &str,
    ) -> Result<(Vec<parse::LinkEntry>, Vec<parse::LinkEntry>), ShapingError> {
        let inside = ShellCommand::new(&self.config.ip_path, ["-o", "link", "show", "type", "veth"])
            .in_netns(&self.config.ip_path, name);
        let container_links = parse::parse_links(&self.query(name, &inside).await?);

        let host = ShellCommand::new(&self.config.ip_path, ["-o", "link", "show", "type", "veth"]);
        let host_links = parse::parse_links(&self.query(name, &host).await?);
        Ok((container_links, host_links))
    }

    /// Remove dangling symlinks in netns_dir that no current container uses.
    ///
    /// Only symlinks whose target is gone are touched; namespaces created by `ip netns add` and
    /// links of containers that are still running stay. Returns the number removed.
    pub async fn prune_netns_links(&self, keep: &HashSet<&str>) -> usize {
        if !self.config.link_netns {
            return 0;
        }
        let dir = &self.config.netns_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list netns links");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot list netns links");
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if keep.contains(name) {
                continue;
            }
            let is_symlink = entry
                .file_type()
                .await
                .map(|t| t.is_symlink())
                .unwrap_or(false);
            if !is_symlink || tokio::fs::try_exists(entry.path()).await.unwrap_or(true) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(name, "removed stale netns link");
                    removed += 1;
                }
                Err(e) => warn!(name, error = %e, "cannot remove stale netns link"),
            }
        }
        removed
    }

    async fn query(&self, name: &str, cmd: &ShellCommand) -> Result<String, ShapingError> {
        debug!(command = %cmd, "querying links");
        let out = self
            .runner
            .run(cmd)
            .await
            .map_err(|e| ShapingError::Resolution {
                name: name.to_string(),
                reason: format!("failed to execute `{cmd}`: {e}"),
            })?;
        if !out.success() {
            return Err(ShapingError::Resolution {
                name: name.to_string(),
                reason: format!("`{cmd}` failed: {}", out.output.trim()),
            });
        }
        Ok(out.output)
    }
}
