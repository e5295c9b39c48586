//! Bootstrap: bring a configured runtime to the point where `run` can take
//! over. Order matters: the logger service first (everything reports
//! through it), then the master role when this node hosts it, then the
//! optional inter-node transport, then the user's start service.

use anyhow::{Context, Result};
use tracing::{info, warn};

use weft_core::{LOGGER_NAME, Runtime};

use crate::config::RuntimeConfig;
use crate::services;

/// Build the runtime for `config` and launch the boot services. Returns
/// the runtime ready for [`Runtime::run`].
pub fn bootstrap(config: &RuntimeConfig) -> Result<Runtime> {
    let runtime = Runtime::builder()
        .harbor(config.harbor)
        .module_path(&config.cpath)
        .loader(services::builtin_loader())
        .build();

    crate::config::seed_env(config, runtime.env())
        .context("publishing config into the environment store")?;

    let logger = runtime
        .launch("logger", config.logger.as_deref())
        .context("launch logger")?;
    runtime
        .bind_name(logger, LOGGER_NAME)
        .context("bind logger name")?;

    if let Some(standalone) = &config.standalone {
        info!(standalone, "running cluster master locally");
        runtime
            .launch("master", Some(standalone))
            .context("launch standalone master")?;
    }

    if let (Some(master), Some(address)) = (&config.master, &config.address) {
        let param = format!("{master} {address} {}", config.harbor);
        let transport = runtime
            .launch("transport", Some(&param))
            .context("launch transport")?;
        runtime.set_transport(transport);
    }

    match &config.start {
        Some(start) => {
            runtime
                .launch(start, None)
                .with_context(|| format!("launch start service {start}"))?;
        }
        None => warn!("no start service configured, only boot services are running"),
    }

    Ok(runtime)
}
