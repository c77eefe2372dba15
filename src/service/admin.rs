use super::command::ServiceCommand;
use super::status::ServiceState;
use crate::config::LifecycleConfig;
use crate::error::{Result, SvcError};
use async_trait::async_trait;
use std::env;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Source of a service's current state while polling for a transition.
#[async_trait]
pub trait StateQuery: Send + Sync {
    async fn query(&self) -> Result<ServiceState>;
}

/// Poll `query` until it reports `target`, failing with
/// [`SvcError::Timeout`] once `timeout` has elapsed.
pub async fn wait_for_state(
    query: &dyn StateQuery,
    action: &str,
    target: ServiceState,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut state = query.query().await?;
    while state != target {
        if Instant::now() > deadline {
            return Err(SvcError::Timeout {
                action: action.to_string(),
                target,
                waited: started.elapsed(),
            });
        }
        tokio::time::sleep(poll_interval).await;
        state = query.query().await?;
        debug!("{}: service is {}, waiting for {}", action, state, target);
    }
    Ok(())
}

/// Administrative actions against systemd.
pub struct SystemdAdmin {
    unit: String,
    description: String,
    unit_dir: PathBuf,
    systemctl: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl SystemdAdmin {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            unit: unit_name(&config.service.name),
            description: config.service.description.clone(),
            unit_dir: PathBuf::from(&config.admin.unit_dir),
            systemctl: config.admin.systemctl.clone(),
            timeout: config.admin_timeout(),
            poll_interval: config.admin_poll_interval(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(&self.unit)
    }

    /// Perform one administrative command. `debug` is not an administrative
    /// action and is rejected here.
    pub async fn execute(&self, command: ServiceCommand) -> Result<()> {
        info!("Running service command '{}' for {}", command, self.unit);
        match command {
            ServiceCommand::Install => self.install().await,
            ServiceCommand::Remove => self.remove().await,
            ServiceCommand::Start => self.start().await,
            ServiceCommand::Stop => self.control("stop", &["stop", "--no-block"], ServiceState::Stopped).await,
            ServiceCommand::Pause => self.control("pause", &["freeze"], ServiceState::Paused).await,
            ServiceCommand::Continue => self.control("continue", &["thaw"], ServiceState::Running).await,
            ServiceCommand::Debug => Err(SvcError::InvalidCommand(command.to_string())),
        }
    }

    pub async fn install(&self) -> Result<()> {
        let path = self.unit_path();
        if path.exists() {
            return Err(SvcError::admin(
                "install",
                format!("service {} already exists", self.unit),
            ));
        }

        let exe = exe_path()?;
        tokio::fs::write(&path, render_unit(&self.description, &exe)).await?;
        info!("Wrote unit file {}", path.display());

        if let Err(e) = self.systemctl("install", &["daemon-reload"]).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        if let Err(e) = self.systemctl("install", &["enable", self.unit.as_str()]).await {
            self.roll_back_install(&path).await;
            return Err(e);
        }
        Ok(())
    }

    /// Undo a half-finished install so that a retry starts clean.
    async fn roll_back_install(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove unit file {}: {}", path.display(), e);
        }
        if let Err(e) = self.systemctl("install", &["daemon-reload"]).await {
            warn!("daemon-reload after failed install: {}", e);
        }
    }

    pub async fn remove(&self) -> Result<()> {
        let path = self.unit_path();
        if !path.exists() {
            return Err(SvcError::admin(
                "remove",
                format!("service {} is not installed", self.unit),
            ));
        }

        self.systemctl("remove", &["disable", self.unit.as_str()]).await?;
        tokio::fs::remove_file(&path).await?;
        self.systemctl("remove", &["daemon-reload"]).await?;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.systemctl("start", &["start", self.unit.as_str()])
            .await
            .map_err(|e| SvcError::admin("start", format!("could not start service: {}", e)))?;
        Ok(())
    }

    /// Send a control verb, then wait for the unit to reach `target`.
    async fn control(&self, action: &str, verb: &[&str], target: ServiceState) -> Result<()> {
        let mut args: Vec<&str> = verb.to_vec();
        args.push(self.unit.as_str());
        self.systemctl(action, &args).await?;

        let query = UnitStateQuery { admin: self };
        wait_for_state(&query, action, target, self.timeout, self.poll_interval).await
    }

    async fn systemctl(&self, action: &str, args: &[&str]) -> Result<String> {
        debug!("{} {}", self.systemctl, args.join(" "));
        let output = Command::new(&self.systemctl)
            .args(args)
            .output()
            .await
            .map_err(|e| SvcError::admin(action, format!("could not run {}: {}", self.systemctl, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SvcError::admin(
                action,
                if stderr.is_empty() {
                    format!("{} {} exited with {}", self.systemctl, args.join(" "), output.status)
                } else {
                    stderr
                },
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

struct UnitStateQuery<'a> {
    admin: &'a SystemdAdmin,
}

#[async_trait]
impl StateQuery for UnitStateQuery<'_> {
    async fn query(&self) -> Result<ServiceState> {
        let text = self
            .admin
            .systemctl(
                "query",
                &["show", "--property=ActiveState,FreezerState", self.admin.unit()],
            )
            .await?;
        parse_show_state(&text).ok_or_else(|| {
            SvcError::admin("query", "could not retrieve service status")
        })
    }
}

/// Map `systemctl show -p ActiveState,FreezerState` output to a state.
pub fn parse_show_state(text: &str) -> Option<ServiceState> {
    let mut active = None;
    let mut freezer = "running";
    for line in text.lines() {
        match line.split_once('=') {
            Some(("ActiveState", v)) => active = Some(v.trim()),
            Some(("FreezerState", v)) => freezer = v.trim(),
            _ => {}
        }
    }

    let state = match (active?, freezer) {
        (_, "frozen") => ServiceState::Paused,
        (_, "freezing") => ServiceState::PausePending,
        (_, "thawing") => ServiceState::ContinuePending,
        ("active", _) | ("reloading", _) => ServiceState::Running,
        ("activating", _) => ServiceState::StartPending,
        ("deactivating", _) => ServiceState::StopPending,
        ("inactive", _) | ("failed", _) => ServiceState::Stopped,
        _ => return None,
    };
    Some(state)
}

/// Turn a human-readable service name into a systemd unit name.
pub fn unit_name(service_name: &str) -> String {
    let base: String = service_name
        .trim()
        .trim_end_matches(".service")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}.service", base)
}

pub fn render_unit(description: &str, exec_start: &Path) -> String {
    format!(
        "[Unit]\n\
         Description={}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=notify\n\
         ExecStart={}\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        description,
        exec_start.display()
    )
}

/// Absolute path of the running executable.
pub fn exe_path() -> Result<PathBuf> {
    match env::current_exe() {
        Ok(path) => Ok(path),
        Err(_) => {
            let prog = env::args_os().next().unwrap_or_default();
            exe_path_from(Path::new(&prog))
        }
    }
}

/// Resolve `prog` against the working directory; it must name a file.
pub fn exe_path_from(prog: &Path) -> Result<PathBuf> {
    let path = if prog.is_absolute() {
        prog.to_path_buf()
    } else {
        env::current_dir()?.join(prog)
    };
    let meta = std::fs::metadata(&path)?;
    if meta.is_dir() {
        return Err(SvcError::admin(
            "install",
            format!("{} is directory", path.display()),
        ));
    }
    Ok(path)
}
