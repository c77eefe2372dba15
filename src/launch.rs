//! Picks how a worker runs: under the service manager, in the foreground,
//! or not at all because an administrative command was given.

use crate::app::{Controller, RunOutcome};
use crate::config::LifecycleConfig;
use crate::diagnostics::TracingLog;
use crate::error::{Result, EXIT_WORKER_FAILURE};
use crate::gate::StopWaiter;
use crate::service::{spawn_console_feed, ConsoleReporter, ServiceCommand, ServiceRunner};
use std::sync::Arc;
use tracing::info;

pub use crate::service::usage;

/// What [`run`] did.
#[derive(Debug)]
pub enum Launch {
    /// The worker ran, interactively or as a service.
    Ran(RunOutcome),
    /// An administrative command completed.
    Administered(ServiceCommand),
}

impl Launch {
    pub fn exit_code(&self) -> i32 {
        match self {
            Launch::Ran(outcome) if !outcome.is_success() => EXIT_WORKER_FAILURE,
            _ => 0,
        }
    }
}

/// Run `worker` the way this process was launched.
///
/// Under the service manager the worker runs as a service. Otherwise the
/// configured command is performed, and with no command the worker runs in
/// the foreground until a terminal signal arrives.
pub async fn run<F>(worker: F, config: &LifecycleConfig) -> Result<Launch>
where
    F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
{
    if launched_by_manager() {
        return run_managed(worker, config).await.map(Launch::Ran);
    }

    match ServiceCommand::parse_optional(config.service.command.as_deref())? {
        None => {
            info!("Running {} interactively", config.service.name);
            Controller::default()
                .run_interactive(worker)
                .await
                .map(Launch::Ran)
        }
        Some(ServiceCommand::Debug) => run_debug(worker, config).await.map(Launch::Ran),
        Some(command) => administer(command, config)
            .await
            .map(|_| Launch::Administered(command)),
    }
}

async fn run_debug<F>(worker: F, config: &LifecycleConfig) -> Result<RunOutcome>
where
    F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
{
    let name = &config.service.name;
    let runner = ServiceRunner::new(
        name.clone(),
        Arc::new(ConsoleReporter::new(name.clone())),
        TracingLog::for_service(name.clone()).shared(),
    )
    .with_interrogate_delay(config.interrogate_delay());
    let requests = spawn_console_feed(runner.handle());
    runner.run(worker, requests).await
}

#[cfg(target_os = "linux")]
fn launched_by_manager() -> bool {
    crate::service::launched_by_manager()
}

#[cfg(not(target_os = "linux"))]
fn launched_by_manager() -> bool {
    false
}

#[cfg(target_os = "linux")]
async fn run_managed<F>(worker: F, config: &LifecycleConfig) -> Result<RunOutcome>
where
    F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
{
    use crate::service::systemd::{spawn_control_feed, watchdog_interval};
    use crate::service::NotifyReporter;

    let name = &config.service.name;
    let runner = ServiceRunner::new(
        name.clone(),
        Arc::new(NotifyReporter::from_env()?),
        TracingLog::for_service(name.clone()).shared(),
    )
    .with_interrogate_delay(config.interrogate_delay());
    let requests = spawn_control_feed(runner.handle(), watchdog_interval())?;
    runner.run(worker, requests).await
}

#[cfg(not(target_os = "linux"))]
async fn run_managed<F>(_worker: F, _config: &LifecycleConfig) -> Result<RunOutcome>
where
    F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
{
    Err(crate::error::SvcError::unsupported("no service manager on this platform"))
}

#[cfg(target_os = "linux")]
async fn administer(command: ServiceCommand, config: &LifecycleConfig) -> Result<()> {
    crate::service::SystemdAdmin::new(config).execute(command).await?;
    info!("{} {} succeeded", command, config.service.name);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn administer(command: ServiceCommand, _config: &LifecycleConfig) -> Result<()> {
    Err(crate::error::SvcError::unsupported(format!(
        "cannot {} a service on this platform",
        command
    )))
}
