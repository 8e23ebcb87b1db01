//! Controllers under test, run as supervised OS processes.

use crate::config::ReapConfig;
use crate::error::SimError;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use sts_env::{ControllerId, SimClock, WallClock};
use tracing::{debug, info, warn};

/// Placeholder in a command line replaced by the controller's listen port.
pub const PORT_PLACEHOLDER: &str = "__port__";

/// Placeholder in a command line replaced by the controller's listen address.
pub const ADDRESS_PLACEHOLDER: &str = "__address__";

/// Immutable description of one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Stable identity; assigned from the launch position when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ControllerId>,

    /// Short name used in logs (e.g. "c1")
    pub label: String,

    /// `host:port` the switches connect to
    pub address: String,

    /// Command line, possibly containing placeholders
    pub cmdline: Vec<String>,

    /// Working directory for the process
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ControllerConfig {
    /// Creates a config without an identity; see [`ControllerConfig::with_id`].
    pub fn new(label: impl Into<String>, address: impl Into<String>, cmdline: Vec<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            address: address.into(),
            cmdline,
            cwd: None,
        }
    }

    pub fn with_id(mut self, id: ControllerId) -> Self {
        self.id = Some(id);
        self
    }

    /// Host part of the address.
    pub fn host(&self) -> &str {
        self.address
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.address)
    }

    /// Port part of the address, if present and numeric.
    pub fn port(&self) -> Option<u16> {
        self.address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }

    /// Command line with `__address__` and `__port__` substituted.
    pub fn expanded_cmdline(&self) -> Vec<String> {
        let port = self.port().map(|p| p.to_string()).unwrap_or_default();
        self.cmdline
            .iter()
            .map(|arg| {
                arg.replace(ADDRESS_PLACEHOLDER, self.host())
                    .replace(PORT_PLACEHOLDER, &port)
            })
            .collect()
    }
}

/// Lifecycle of a supervised controller process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, process not launched yet
    Starting,
    Running,
    /// Termination signal sent, exit not yet observed
    Terminating,
    Dead,
}

/// A controller process handle.
#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    id: ControllerId,
    child: Option<Child>,
    pid: Option<u32>,
    state: ControllerState,
}

impl Controller {
    /// Wraps a config; a config without an identity gets a random one.
    pub fn new(config: ControllerConfig) -> Self {
        let id = config.id.unwrap_or_else(ControllerId::new);
        Self {
            config,
            id,
            child: None,
            pid: None,
            state: ControllerState::Starting,
        }
    }

    /// Launches the process.
    pub fn start(&mut self) -> Result<(), SimError> {
        let cmdline = self.config.expanded_cmdline();
        let Some((program, args)) = cmdline.split_first() else {
            return Err(SimError::spawn(&self.config.label, "empty command line"));
        };

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        let child = command
            .spawn()
            .map_err(|e| SimError::spawn(&self.config.label, e))?;
        let pid = child.id();
        info!(
            "Launched controller {} ({}): {} [PID {}]",
            self.config.label,
            self.id,
            cmdline.join(" "),
            pid
        );
        self.child = Some(child);
        self.pid = Some(pid);
        self.state = ControllerState::Running;
        Ok(())
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Checks liveness without blocking; records the exit when observed.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Controller {} exited: {}", self.config.label, status);
                self.mark_dead();
                false
            }
            Err(e) => {
                warn!("Cannot query controller {}: {}", self.config.label, e);
                self.mark_dead();
                false
            }
        }
    }

    /// Sends the termination signal. Already-dead processes are ignored.
    pub fn terminate(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill() {
                // Raced with a natural exit
                debug!("Signal to controller {} failed: {}", self.config.label, e);
            }
        }
        self.state = ControllerState::Terminating;
    }

    /// Waits, bounded by `reap.timeout` of real time, for the process to exit.
    ///
    /// Process exit happens on the wall clock, so the bound and the sleep
    /// between liveness polls use `wall`. Before each sleep `io` gets one
    /// dispatch pass (`delay(0)`) so control traffic keeps moving. Returns
    /// true if the process was observed dead.
    pub fn reap(&mut self, wall: &WallClock, io: &dyn SimClock, reap: &ReapConfig) -> bool {
        let deadline = wall.now().saturating_add(reap.timeout());
        loop {
            if !self.is_alive() {
                return true;
            }
            if wall.now() >= deadline {
                return false;
            }
            io.delay(Duration::ZERO);
            wall.delay(reap.poll_interval());
        }
    }

    fn mark_dead(&mut self) {
        self.state = ControllerState::Dead;
        self.child = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cmdline: &[&str]) -> ControllerConfig {
        ControllerConfig::new(
            "c1",
            "127.0.0.1:6633",
            cmdline.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_expanded_cmdline_substitutes_placeholders() {
        let cfg = config(&["./pox.py", "openflow.of_01", "--address=__address__", "--port=__port__"]);
        assert_eq!(cfg.host(), "127.0.0.1");
        assert_eq!(cfg.port(), Some(6633));
        assert_eq!(
            cfg.expanded_cmdline(),
            vec!["./pox.py", "openflow.of_01", "--address=127.0.0.1", "--port=6633"]
        );
    }

    #[test]
    fn test_empty_cmdline_fails_to_start() {
        let mut controller = Controller::new(config(&[]));
        assert!(matches!(controller.start(), Err(SimError::SpawnFailed { .. })));
        assert_eq!(controller.state(), ControllerState::Starting);
        assert!(!controller.is_alive());
    }

    #[test]
    fn test_missing_binary_fails_to_start() {
        let mut controller = Controller::new(config(&["/nonexistent/controller-binary"]));
        assert!(controller.start().is_err());
        assert_eq!(controller.pid(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_terminate_reap() {
        let mut controller = Controller::new(config(&["sleep", "30"]));
        controller.start().unwrap();
        assert_eq!(controller.state(), ControllerState::Running);
        assert!(controller.pid().is_some());
        assert!(controller.is_alive());

        controller.terminate();
        let clock = WallClock::new();
        assert!(controller.reap(&clock, &clock, &ReapConfig::default()));
        assert_eq!(controller.state(), ControllerState::Dead);

        // Terminating a dead controller is a no-op
        controller.terminate();
        assert_eq!(controller.state(), ControllerState::Dead);
    }

    #[test]
    fn test_identity_from_config_or_random() {
        let fixed = Controller::new(config(&["true"]).with_id(ControllerId::from_seed(4)));
        assert_eq!(fixed.id(), ControllerId::from_seed(4));

        let a = Controller::new(config(&["true"]));
        let b = Controller::new(config(&["true"]));
        assert_ne!(a.id(), b.id());
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_under_logical_clock_waits_in_real_time() {
        use crate::config::IoConfig;
        use crate::io_master::IoMaster;

        let io = IoMaster::new(IoConfig::default());
        let mut controller = Controller::new(config(&["sleep", "30"]));
        controller.start().unwrap();
        controller.terminate();

        assert!(controller.reap(&WallClock::new(), &io, &ReapConfig::default()));
        assert_eq!(controller.state(), ControllerState::Dead);
        // Only dispatch passes ran on the logical clock
        assert_eq!(io.now(), Duration::ZERO);
    }
}
