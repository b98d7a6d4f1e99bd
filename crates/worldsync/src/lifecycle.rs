use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::SimulatorVersion;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
#[error("failed to launch {program}: {source}")]
pub struct LaunchError {
    pub program: String,
    #[source]
    pub source: io::Error,
}

/// How a subordinate process ended when asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Interrupted,
    Terminated,
    Killed,
}

/// A spawned child the coordinator is responsible for stopping.
#[derive(Debug)]
pub struct ManagedProcess {
    label: &'static str,
    child: Child,
}

impl ManagedProcess {
    pub fn spawn(label: &'static str, command: &mut Command) -> Result<Self, LaunchError> {
        let child = command.spawn().map_err(|source| LaunchError {
            program: command.get_program().to_string_lossy().into_owned(),
            source,
        })?;
        info!(process = label, pid = child.id(), "process_started");
        Ok(Self { label, child })
    }

    pub fn from_child(label: &'static str, child: Child) -> Self {
        Self { label, child }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Live means spawned and not yet exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Interrupt, then terminate, then kill, waiting up to `grace` after
    /// each signal. Never blocks longer than about `2 * grace`.
    pub fn terminate(mut self, grace: Duration) -> Termination {
        if !self.is_running() {
            return Termination::AlreadyExited;
        }

        #[cfg(unix)]
        {
            for (signal, outcome) in [
                (libc::SIGINT, Termination::Interrupted),
                (libc::SIGTERM, Termination::Terminated),
            ] {
                if self.signal(signal) && self.wait_for_exit(grace) {
                    info!(process = self.label, pid = self.id(), ?outcome, "process_stopped");
                    return outcome;
                }
                warn!(process = self.label, pid = self.id(), signal, "process_ignored_signal");
            }
        }

        if let Err(error) = self.child.kill() {
            warn!(process = self.label, pid = self.id(), %error, "process_kill_failed");
        }
        let _ = self.child.wait();
        info!(process = self.label, pid = self.id(), outcome = ?Termination::Killed, "process_stopped");
        Termination::Killed
    }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) -> bool {
        let Ok(pid) = libc::pid_t::try_from(self.child.id()) else {
            return false;
        };
        // SAFETY: `pid` belongs to our unreaped child, so it cannot have been
        // recycled for another process.
        unsafe { libc::kill(pid, signal) == 0 }
    }

    fn wait_for_exit(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => return false,
                Err(error) => {
                    warn!(process = self.label, %error, "process_wait_failed");
                    return false;
                }
            }
        }
    }
}

/// Owns the simulator and motion-replay processes of one session.
#[derive(Debug)]
pub struct LifecycleCoordinator {
    simulator: Option<ManagedProcess>,
    replay: Option<ManagedProcess>,
    grace: Duration,
}

impl LifecycleCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            simulator: None,
            replay: None,
            grace,
        }
    }

    pub fn is_simulator_running(&mut self) -> bool {
        self.simulator
            .as_mut()
            .is_some_and(ManagedProcess::is_running)
    }

    pub fn is_replay_running(&mut self) -> bool {
        self.replay.as_mut().is_some_and(ManagedProcess::is_running)
    }

    /// Starts `<cli> <subcommand> <scene>`, stopping any simulator this
    /// coordinator already owns.
    pub fn launch_simulator(
        &mut self,
        version: SimulatorVersion,
        scene_path: &Path,
    ) -> Result<(), LaunchError> {
        self.stop_simulator();
        let mut command = Command::new(version.cli_program());
        command
            .arg(version.launch_subcommand())
            .arg(scene_path)
            .stdin(Stdio::null());
        self.simulator = Some(ManagedProcess::spawn("simulator", &mut command)?);
        Ok(())
    }

    pub fn adopt_simulator(&mut self, process: ManagedProcess) {
        self.stop_simulator();
        self.simulator = Some(process);
    }

    /// Stops the previous replay instance first.
    pub fn start_replay(&mut self, interpreter: &str, program: &Path) -> Result<(), LaunchError> {
        self.stop_replay();
        let mut command = Command::new(interpreter);
        command.arg(program).stdin(Stdio::null());
        self.replay = Some(ManagedProcess::spawn("motion_replay", &mut command)?);
        Ok(())
    }

    pub fn adopt_replay(&mut self, process: ManagedProcess) {
        self.stop_replay();
        self.replay = Some(process);
    }

    pub fn stop_replay(&mut self) -> Option<Termination> {
        self.replay
            .take()
            .map(|process| process.terminate(self.grace))
    }

    pub fn stop_simulator(&mut self) -> Option<Termination> {
        self.simulator
            .take()
            .map(|process| process.terminate(self.grace))
    }

    /// Replay first, then the simulator. Safe to call repeatedly.
    pub fn stop_all(&mut self) {
        self.stop_replay();
        self.stop_simulator();
    }
}

impl Drop for LifecycleCoordinator {
    fn drop(&mut self) {
        self.stop_all();
    }
}
