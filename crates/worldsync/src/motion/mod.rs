mod program;
mod stepper;

pub use program::{
    embedded_table, parse_embedded_tracks, render_launch_script, write_replay_artifacts,
    ReplayArtifacts, ReplayError, ReplayProgram, ReplayTrack,
};
pub use stepper::{
    step_seconds, MotionState, SpeedJitter, LINEAR_STEP_SECONDS, MIN_SEGMENT_LENGTH, STEP_SECONDS,
};
