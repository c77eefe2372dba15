use crate::error::SvcError;
use std::fmt;
use std::str::FromStr;

/// Administrative commands accepted when not launched by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    Install,
    Remove,
    Start,
    Stop,
    Pause,
    Continue,
    /// Run under the service protocol in the foreground.
    Debug,
}

impl ServiceCommand {
    pub const ALL: [ServiceCommand; 7] = [
        ServiceCommand::Install,
        ServiceCommand::Remove,
        ServiceCommand::Debug,
        ServiceCommand::Start,
        ServiceCommand::Stop,
        ServiceCommand::Pause,
        ServiceCommand::Continue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCommand::Install => "install",
            ServiceCommand::Remove => "remove",
            ServiceCommand::Start => "start",
            ServiceCommand::Stop => "stop",
            ServiceCommand::Pause => "pause",
            ServiceCommand::Continue => "continue",
            ServiceCommand::Debug => "debug",
        }
    }

    /// Parse an optional command string; empty means "run the worker now".
    pub fn parse_optional(command: Option<&str>) -> Result<Option<Self>, SvcError> {
        match command.map(str::trim) {
            None | Some("") => Ok(None),
            Some(cmd) => cmd.parse().map(Some),
        }
    }
}

impl FromStr for ServiceCommand {
    type Err = SvcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| SvcError::InvalidCommand(s.to_string()))
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage text printed when an administrative command is invalid or fails.
pub fn usage(program: &str) -> String {
    format!(
        "usage: {} --svc <command>\n       where <command> is one of\n       install, remove, debug, start, stop, pause or continue.\n",
        program
    )
}
