use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::StartupError;

pub const SIM_VERSION_ENV_VAR: &str = "WORLDSYNC_SIM_VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulatorVersion {
    #[default]
    Fortress,
    Harmonic,
}

impl SimulatorVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            SimulatorVersion::Fortress => "fortress",
            SimulatorVersion::Harmonic => "harmonic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fortress" => Some(SimulatorVersion::Fortress),
            "harmonic" => Some(SimulatorVersion::Harmonic),
            _ => None,
        }
    }

    /// Command line tool that fronts both the simulator and its services.
    pub fn cli_program(self) -> &'static str {
        match self {
            SimulatorVersion::Fortress => "ign",
            SimulatorVersion::Harmonic => "gz",
        }
    }

    pub fn launch_subcommand(self) -> &'static str {
        match self {
            SimulatorVersion::Fortress => "gazebo",
            SimulatorVersion::Harmonic => "sim",
        }
    }

    pub fn message_namespace(self) -> &'static str {
        match self {
            SimulatorVersion::Fortress => "ignition.msgs",
            SimulatorVersion::Harmonic => "gz.msgs",
        }
    }

    pub fn schema_version(self) -> SchemaVersion {
        match self {
            SimulatorVersion::Fortress => SchemaVersion::V1_8,
            SimulatorVersion::Harmonic => SchemaVersion::V1_9,
        }
    }
}

impl fmt::Display for SimulatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1_8,
    V1_9,
}

impl SchemaVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVersion::V1_8 => "1.8",
            SchemaVersion::V1_9 => "1.9",
        }
    }
}

/// On-disk locations for one simulator version under a project root.
#[derive(Debug, Clone)]
pub struct WorldLayout {
    pub root: PathBuf,
    pub version: SimulatorVersion,
}

impl WorldLayout {
    pub fn new(root: impl Into<PathBuf>, version: SimulatorVersion) -> Self {
        Self {
            root: root.into(),
            version,
        }
    }

    pub fn worlds_dir(&self) -> PathBuf {
        self.root
            .join("worlds")
            .join("gazebo")
            .join(self.version.as_str())
    }

    pub fn template_path(&self) -> PathBuf {
        self.worlds_dir().join("empty_world.sdf")
    }

    pub fn scene_path(&self, world_name: &str) -> PathBuf {
        self.worlds_dir().join(format!("{world_name}.sdf"))
    }

    pub fn move_code_dir(&self) -> PathBuf {
        self.worlds_dir().join("move_code")
    }

    pub fn replay_program_path(&self, world_name: &str) -> PathBuf {
        self.move_code_dir()
            .join(format!("{world_name}_moveObstacles.py"))
    }

    pub fn launch_script_path(&self, world_name: &str) -> PathBuf {
        self.move_code_dir().join(format!("{world_name}_launch.sh"))
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub version: SimulatorVersion,
    /// Bound on every create/remove request.
    pub service_timeout: Duration,
    /// Bound on each pose update issued by the replay program.
    pub set_pose_timeout: Duration,
    /// Wait before a reconciliation pass so a freshly launched simulator can
    /// bring up its services.
    pub settle_before_pass: Duration,
    pub settle_after_create: Duration,
    /// Wait per escalation stage when stopping a child process.
    pub termination_grace: Duration,
    pub replay_interpreter: String,
    /// When false the simulator and replay program are never spawned.
    pub launch_processes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: SimulatorVersion::default(),
            service_timeout: Duration::from_millis(3_000),
            set_pose_timeout: Duration::from_millis(500),
            settle_before_pass: Duration::from_secs(2),
            settle_after_create: Duration::from_secs(1),
            termination_grace: Duration::from_secs(2),
            replay_interpreter: "python3".to_string(),
            launch_processes: true,
        }
    }
}

impl SessionConfig {
    /// Defaults with the simulator version taken from the environment when set.
    pub fn from_env() -> Result<Self, StartupError> {
        let mut config = Self::default();
        match env::var(SIM_VERSION_ENV_VAR) {
            Ok(value) => {
                config.version = SimulatorVersion::parse(&value)
                    .ok_or(StartupError::UnknownSimulatorVersion { value })?;
            }
            Err(env::VarError::NotPresent) => {}
            Err(source) => {
                return Err(StartupError::EnvVar {
                    var: SIM_VERSION_ENV_VAR,
                    source,
                })
            }
        }
        Ok(config)
    }

    /// No settle delays and short grace periods.
    pub fn immediate() -> Self {
        Self {
            settle_before_pass: Duration::ZERO,
            settle_after_create: Duration::ZERO,
            termination_grace: Duration::from_millis(200),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_selects_tooling_and_schema() {
        let fortress = SimulatorVersion::Fortress;
        assert_eq!(fortress.cli_program(), "ign");
        assert_eq!(fortress.message_namespace(), "ignition.msgs");
        assert_eq!(fortress.schema_version().as_str(), "1.8");

        let harmonic = SimulatorVersion::parse(" Harmonic ").expect("parse");
        assert_eq!(harmonic.cli_program(), "gz");
        assert_eq!(harmonic.launch_subcommand(), "sim");
        assert_eq!(harmonic.schema_version().as_str(), "1.9");
        assert!(SimulatorVersion::parse("garden").is_none());
    }

    #[test]
    fn layout_paths_hang_off_version_dir() {
        let layout = WorldLayout::new("/proj", SimulatorVersion::Harmonic);
        assert_eq!(
            layout.template_path(),
            PathBuf::from("/proj/worlds/gazebo/harmonic/empty_world.sdf")
        );
        assert_eq!(
            layout.scene_path("demo"),
            PathBuf::from("/proj/worlds/gazebo/harmonic/demo.sdf")
        );
        assert_eq!(
            layout.replay_program_path("demo"),
            PathBuf::from("/proj/worlds/gazebo/harmonic/move_code/demo_moveObstacles.py")
        );
        assert_eq!(
            layout.launch_script_path("demo"),
            PathBuf::from("/proj/worlds/gazebo/harmonic/move_code/demo_launch.sh")
        );
    }
}
