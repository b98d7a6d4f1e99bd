use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{SimulatorVersion, WorldLayout};
use crate::model::{Entity, Motion};
use crate::scene::write_text_atomic;
use crate::sim::request::set_pose_format;
use crate::sim::Endpoint;

use super::stepper::{MotionState, LINEAR_STEP_SECONDS, MIN_SEGMENT_LENGTH, STEP_SECONDS};

const TEMPLATE: &str = include_str!("replay_template.py");
const TABLE_OPEN: &str = "TRACKS = json.loads(r\"\"\"\n";
const TABLE_CLOSE: &str = "\n\"\"\")";

const SUBPROCESS_IMPORTS: &str = "import subprocess\n";
const TRANSPORT_IMPORTS: &str = "\
from gz.msgs10.boolean_pb2 import Boolean
from gz.msgs10.pose_pb2 import Pose
from gz.transport13 import Node
";

const SERVICE_CLI_SET_POSE: &str = r#"CLI = "__CLI__"
NAMESPACE = "__NAMESPACE__"


def set_pose(track, x, y, z):
    request = track["pose_request"] % (x, y, z)
    command = [
        CLI, "service", "-s", "/world/%s/__SERVICE__" % WORLD_NAME,
        "--reqtype", NAMESPACE + ".__REQUEST_TYPE__",
        "--reptype", NAMESPACE + ".Boolean",
        "--timeout", str(SET_POSE_TIMEOUT_MS),
        "--req", request,
    ]
    result = subprocess.run(command, capture_output=True, text=True)
    if result.returncode != 0:
        print("set_pose %s: %s" % (track["name"], result.stderr.strip()), file=sys.stderr)
        return False
    return True"#;

const TRANSPORT_SET_POSE: &str = r#"NODE = Node()


def set_pose(track, x, y, z):
    request = Pose()
    request.name = track["name"]
    request.position.x = x
    request.position.y = y
    request.position.z = z
    request.orientation.w = 1.0
    ok, _reply = NODE.request(
        "/world/%s/__SERVICE__" % WORLD_NAME, request, Pose, Boolean, SET_POSE_TIMEOUT_MS)
    return ok"#;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to encode motion table: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One moving entity as the replay program sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTrack {
    pub name: String,
    /// Text-format `Pose` request with `%r` slots for x, y and z.
    pub pose_request: String,
    pub motion: Motion,
    pub state: MotionState,
}

impl ReplayTrack {
    pub fn for_entity(entity: &Entity) -> Option<Self> {
        let motion = entity.motion.clone()?;
        let state = MotionState::initial(entity)?;
        Some(Self {
            name: entity.name.clone(),
            pose_request: set_pose_format(&entity.name),
            motion,
            state,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReplayProgram {
    pub world: String,
    pub version: SimulatorVersion,
    pub set_pose_timeout: Duration,
    pub tracks: Vec<ReplayTrack>,
}

impl ReplayProgram {
    pub fn new(world: impl Into<String>, version: SimulatorVersion, set_pose_timeout: Duration) -> Self {
        Self {
            world: world.into(),
            version,
            set_pose_timeout,
            tracks: Vec::new(),
        }
    }

    /// Adds a track for every entity that carries motion; static ones are
    /// skipped.
    pub fn with_entities<'a>(mut self, entities: impl IntoIterator<Item = &'a Entity>) -> Self {
        self.tracks
            .extend(entities.into_iter().filter_map(ReplayTrack::for_entity));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn render(&self) -> Result<String, ReplayError> {
        let table = serde_json::to_string_pretty(&self.tracks)?;
        let world_literal = serde_json::to_string(&self.world)?;
        let (imports, set_pose) = match self.version {
            SimulatorVersion::Fortress => (
                SUBPROCESS_IMPORTS,
                SERVICE_CLI_SET_POSE
                    .replace("__CLI__", self.version.cli_program())
                    .replace("__NAMESPACE__", self.version.message_namespace())
                    .replace("__REQUEST_TYPE__", Endpoint::SetPose.request_type()),
            ),
            SimulatorVersion::Harmonic => (TRANSPORT_IMPORTS, TRANSPORT_SET_POSE.to_string()),
        };
        let set_pose = set_pose.replace("__SERVICE__", Endpoint::SetPose.service_name());

        Ok(TEMPLATE
            .replace("__WORLD_LABEL__", &self.world.replace('\n', " "))
            .replace("__TRANSPORT_IMPORTS__", imports)
            .replace("__WORLD_NAME__", &world_literal)
            .replace(
                "__SET_POSE_TIMEOUT_MS__",
                &self.set_pose_timeout.as_millis().to_string(),
            )
            .replace("__STEP_SECONDS__", &format!("{STEP_SECONDS:?}"))
            .replace("__LINEAR_STEP_SECONDS__", &format!("{LINEAR_STEP_SECONDS:?}"))
            .replace("__MIN_SEGMENT_LENGTH__", &format!("{MIN_SEGMENT_LENGTH:?}"))
            .replace("__SET_POSE__", &set_pose)
            .replace("__TRACKS__", &table))
    }
}

/// The JSON track table embedded in a rendered program.
pub fn embedded_table(program: &str) -> Option<&str> {
    let start = program.find(TABLE_OPEN)? + TABLE_OPEN.len();
    let len = program[start..].find(TABLE_CLOSE)?;
    Some(&program[start..start + len])
}

pub fn parse_embedded_tracks(program: &str) -> Option<Result<Vec<ReplayTrack>, serde_json::Error>> {
    embedded_table(program).map(serde_json::from_str)
}

/// Starts the simulator on the scene file, then the replay program, and
/// waits on both.
pub fn render_launch_script(
    version: SimulatorVersion,
    scene_path: &Path,
    program_path: &Path,
    interpreter: &str,
) -> String {
    format!(
        "#!/bin/bash\n{} {} {} &\nsleep 2\n{} {} &\nwait\n",
        version.cli_program(),
        version.launch_subcommand(),
        shell_quote(&scene_path.display().to_string()),
        interpreter,
        shell_quote(&program_path.display().to_string()),
    )
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayArtifacts {
    pub program: PathBuf,
    pub launch_script: PathBuf,
}

/// Writes the program and launch script under the layout's `move_code`
/// directory, both marked executable.
pub fn write_replay_artifacts(
    program: &ReplayProgram,
    layout: &WorldLayout,
    scene_path: &Path,
    interpreter: &str,
) -> Result<ReplayArtifacts, ReplayError> {
    let program_path = layout.replay_program_path(&program.world);
    let script_path = layout.launch_script_path(&program.world);

    write_executable(&program_path, &program.render()?)?;
    let script = render_launch_script(program.version, scene_path, &program_path, interpreter);
    write_executable(&script_path, &script)?;

    Ok(ReplayArtifacts {
        program: program_path,
        launch_script: script_path,
    })
}

fn write_executable(path: &Path, text: &str) -> Result<(), ReplayError> {
    let to_error = |source| ReplayError::Write {
        path: path.to_path_buf(),
        source,
    };
    write_text_atomic(path, text).map_err(to_error)?;
    set_executable(path).map_err(to_error)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(|_| ())
}
