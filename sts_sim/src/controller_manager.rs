//! Tracks controller processes and supervises their bulk termination.

use crate::config::ReapConfig;
use crate::controller::Controller;

use std::rc::Rc;
use sts_env::{SimClock, WallClock};
use tracing::{info, warn};

/// Outcome of [`ControllerManager::kill_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    /// Controllers observed dead within the bounded wait
    pub reaped: usize,

    /// PIDs still running after the bounded wait (leaked)
    pub stragglers: Vec<u32>,
}

/// Set of live controller handles for one run.
pub struct ControllerManager {
    controllers: Vec<Controller>,

    /// IO context pumped while waiting for exits
    clock: Rc<dyn SimClock>,

    /// Real-time bound for the reap wait
    wall: WallClock,

    reap: ReapConfig,
}

impl ControllerManager {
    pub fn new(clock: Rc<dyn SimClock>, reap: ReapConfig) -> Self {
        Self {
            controllers: Vec::new(),
            clock,
            wall: WallClock::new(),
            reap,
        }
    }

    /// Starts tracking a launched controller.
    pub fn register(&mut self, controller: Controller) {
        self.controllers.push(controller);
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// PIDs of all tracked controllers.
    pub fn pids(&self) -> Vec<u32> {
        self.controllers.iter().filter_map(Controller::pid).collect()
    }

    /// Number of tracked controllers whose process is still running.
    pub fn live_count(&mut self) -> usize {
        let mut live = 0;
        for controller in &mut self.controllers {
            if controller.is_alive() {
                live += 1;
            }
        }
        live
    }

    /// Signals every controller, waits (bounded) for each to exit, and
    /// stops tracking all of them.
    ///
    /// Controllers that do not exit in time are logged and leaked; this
    /// never fails.
    pub fn kill_all(&mut self) -> KillReport {
        for controller in &mut self.controllers {
            controller.terminate();
        }

        let mut report = KillReport::default();
        for mut controller in self.controllers.drain(..) {
            if controller.reap(&self.wall, self.clock.as_ref(), &self.reap) {
                report.reaped += 1;
            } else {
                let pid = controller.pid().unwrap_or_default();
                warn!(
                    "Controller {} [PID {}] still running after {:?}; leaking it",
                    controller.config().label,
                    pid,
                    self.reap.timeout()
                );
                report.stragglers.push(pid);
            }
        }

        if report.reaped > 0 || !report.stragglers.is_empty() {
            info!(
                "Killed controllers: {} reaped, {} stragglers",
                report.reaped,
                report.stragglers.len()
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IoConfig;
    use crate::controller::ControllerConfig;
    use crate::io_master::IoMaster;

    #[test]
    fn test_kill_all_on_empty_manager() {
        let mut manager = ControllerManager::new(WallClock::shared(), ReapConfig::default());
        assert_eq!(manager.kill_all(), KillReport::default());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_never_started_controller_counts_as_reaped() {
        let mut manager = ControllerManager::new(WallClock::shared(), ReapConfig::default());
        manager.register(Controller::new(ControllerConfig::new("c1", "127.0.0.1:6633", vec![])));
        assert_eq!(manager.live_count(), 0);

        let report = manager.kill_all();
        assert_eq!(report.reaped, 1);
        assert!(manager.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_all_reaps_running_processes() {
        let mut manager = ControllerManager::new(WallClock::shared(), ReapConfig::default());
        for label in ["c1", "c2"] {
            let mut controller = Controller::new(ControllerConfig::new(
                label,
                "127.0.0.1:6633",
                vec!["sleep".to_string(), "30".to_string()],
            ));
            controller.start().unwrap();
            manager.register(controller);
        }
        assert_eq!(manager.live_count(), 2);
        assert_eq!(manager.pids().len(), 2);

        let report = manager.kill_all();
        assert_eq!(report.reaped, 2);
        assert!(report.stragglers.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_all_reaps_under_logical_clock() {
        for _ in 0..5 {
            let mut manager =
                ControllerManager::new(IoMaster::shared(IoConfig::default()), ReapConfig::default());
            for label in ["c1", "c2", "c3"] {
                let mut controller = Controller::new(ControllerConfig::new(
                    label,
                    "127.0.0.1:6633",
                    vec!["sleep".to_string(), "30".to_string()],
                ));
                controller.start().unwrap();
                manager.register(controller);
            }

            let report = manager.kill_all();
            assert_eq!(report.reaped, 3);
            assert!(report.stragglers.is_empty());
        }
    }
}
