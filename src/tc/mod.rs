// Shaping rule installer: clear then rebuild the HTB tree on both ends of a veth pair

mod commands;

pub use commands::{
    CLASS_ID, MISSING_ROOT_QDISC_DIAGNOSTICS, ROOT_HANDLE, SFQ_HANDLE, is_missing_root_qdisc,
    shaping_steps,
};

use crate::command::CommandRunner;
use crate::error::{ShapingError, Side, TcStep};
use crate::models::{ContainerRecord, Policy};
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct TcConfig {
    pub tc_path: String,
    /// Used for the `ip netns exec` wrapper on the container side.
    pub ip_path: String,
}

pub struct TcInstaller {
    runner: Arc<dyn CommandRunner>,
    config: TcConfig,
}

impl TcInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>, config: TcConfig) -> Self {
        Self { runner, config }
    }

    /// Install the record's policy on the host end, then on the container end.
    ///
    /// A host-side failure returns before the container side is touched; the error's `side()`
    /// tells the caller which end to retry with `install_side`.
    #[instrument(skip_all, fields(container_id = %record.id, name = %record.name))]
    pub async fn install_shaping(&self, record: &ContainerRecord) -> Result<(), ShapingError> {
        self.install_side(Side::Host, &record.host_interface, &record.policy, None)
            .await?;
        self.install_side(
            Side::Container,
            &record.container_interface,
            &record.policy,
            Some(&record.name),
        )
        .await?;
        info!(
            host_interface = %record.host_interface,
            container_interface = %record.container_interface,
            rate = %record.policy.rate,
            ceil = %record.policy.ceil,
            "shaping installed"
        );
        Ok(())
    }

    /// Run the five-step sequence on one interface. `netns` names the namespace to enter.
    pub async fn install_side(
        &self,
        side: Side,
        interface: &str,
        policy: &Policy,
        netns: Option<&str>,
    ) -> Result<(), ShapingError> {
        for (step, cmd) in shaping_steps(&self.config.tc_path, interface, policy) {
            let cmd = match netns {
                Some(name) => cmd.in_netns(&self.config.ip_path, name),
                None => cmd,
            };
            let rendered = cmd.to_string();
            debug!(%side, %step, command = %rendered, "tc");

            let out = self
                .runner
                .run(&cmd)
                .await
                .map_err(|source| ShapingError::Exec {
                    side,
                    step,
                    command: rendered.clone(),
                    source,
                })?;
            if out.success() {
                continue;
            }
            if step == TcStep::Clear && is_missing_root_qdisc(&out) {
                debug!(%side, interface, "no root qdisc to clear");
                continue;
            }
            return Err(ShapingError::Command {
                side,
                step,
                interface: interface.to_string(),
                command: rendered,
                status: out.status,
                output: out.output.trim().to_string(),
            });
        }
        Ok(())
    }
}
