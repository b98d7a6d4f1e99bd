use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod config;
pub mod geometry;
pub mod lifecycle;
pub mod model;
pub mod motion;
pub mod reconcile;
pub mod scene;
mod session;
pub mod sim;
mod world;

pub use config::{SchemaVersion, SessionConfig, SimulatorVersion, WorldLayout, SIM_VERSION_ENV_VAR};
pub use geometry::{compute_inertia, derive_wall_placement, Inertia, WallPlacement, DEFAULT_DENSITY};
pub use lifecycle::{LaunchError, LifecycleCoordinator, ManagedProcess, Termination};
pub use model::{
    Color, Entity, EntityKind, EntityStatus, EntityStore, Geometry, InvalidEntityError, Motion,
    Vec2, Vec3,
};
pub use motion::{MotionState, ReplayError, ReplayProgram, SpeedJitter};
pub use reconcile::{ApplySummary, ChangeOp, FailedChange, ReconcileError};
pub use scene::{
    decode_entity, encode_entity, MalformedEntityError, SceneDocument, SceneError, XmlParseError,
};
pub use session::{SessionError, WorldSession};
pub use sim::{GzServiceClient, ServiceReply, ServiceRequest, SimulatorService};
pub use world::World;

pub const ROOT_ENV_VAR: &str = "WORLDSYNC_ROOT";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{var} could not be read: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("cannot locate the worldsync executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("worldsync executable {0} has no containing directory")]
    ExeHasNoParent(PathBuf),
    #[error("{path} is not a world root: no worlds/gazebo directory inside")]
    NotAWorldRoot { path: PathBuf },
    #[error("no world root found above {start_dir}; pass --root or set {env_var}")]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
    #[error("unknown simulator version '{value}' (expected fortress or harmonic)")]
    UnknownSimulatorVersion { value: String },
}

/// Project root holding `worlds/gazebo/<version>/`: `WORLDSYNC_ROOT` when
/// set, otherwise the nearest ancestor of the executable that has one.
pub fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => validate_root(Path::new(&value)),
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_root_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

/// Accepts `path` only when it holds a `worlds/gazebo` directory.
pub fn validate_root(path: &Path) -> Result<PathBuf, StartupError> {
    let normalized = normalize_path(path);
    if is_root_marker(&normalized) {
        Ok(normalized)
    } else {
        Err(StartupError::NotAWorldRoot { path: normalized })
    }
}

fn is_root_marker(path: &Path) -> bool {
    path.join("worlds").join("gazebo").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn root_marker_requires_worlds_gazebo() {
        let temp = TempDir::new().expect("temp");
        assert!(!is_root_marker(temp.path()));
        let err = validate_root(temp.path()).expect_err("no marker");
        assert!(matches!(err, StartupError::NotAWorldRoot { .. }));
        assert!(err
            .to_string()
            .ends_with("is not a world root: no worlds/gazebo directory inside"));

        fs::create_dir_all(temp.path().join("worlds").join("gazebo")).expect("mkdir");
        let root = validate_root(temp.path()).expect("valid root");
        assert_eq!(root, normalize_path(temp.path()));
    }
}
