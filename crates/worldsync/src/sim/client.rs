use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::SimulatorVersion;

use super::request::TextMessage;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Extra time the service tool gets past its own `--timeout` before it is
/// killed.
const KILL_MARGIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Create,
    Remove,
    SetPose,
}

impl Endpoint {
    pub fn service_name(self) -> &'static str {
        match self {
            Endpoint::Create => "create",
            Endpoint::Remove => "remove",
            Endpoint::SetPose => "set_pose",
        }
    }

    pub fn request_type(self) -> &'static str {
        match self {
            Endpoint::Create => "EntityFactory",
            Endpoint::Remove => "Entity",
            Endpoint::SetPose => "Pose",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub world: String,
    pub endpoint: Endpoint,
    /// Entity the request concerns; used for logging and reporting.
    pub entity: String,
    pub payload: TextMessage,
}

impl ServiceRequest {
    pub fn service_path(&self) -> String {
        format!("/world/{}/{}", self.world, self.endpoint.service_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReply {
    pub success: bool,
    pub diagnostic: Option<String>,
}

impl ServiceReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostic: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Request/response access to a running simulator. Calls block until the
/// simulator answers or the bound expires; a timeout is a failed reply.
pub trait SimulatorService {
    fn call(&mut self, request: &ServiceRequest) -> ServiceReply;
}

/// Drives the simulator's `service` subcommand (`ign service` / `gz service`).
#[derive(Debug, Clone)]
pub struct GzServiceClient {
    version: SimulatorVersion,
    timeout: Duration,
}

impl GzServiceClient {
    pub fn new(version: SimulatorVersion, timeout: Duration) -> Self {
        Self { version, timeout }
    }

    pub fn command_args(&self, request: &ServiceRequest) -> Vec<String> {
        let namespace = self.version.message_namespace();
        vec![
            "service".to_string(),
            "-s".to_string(),
            request.service_path(),
            "--reqtype".to_string(),
            format!("{namespace}.{}", request.endpoint.request_type()),
            "--reptype".to_string(),
            format!("{namespace}.Boolean"),
            "--timeout".to_string(),
            self.timeout.as_millis().to_string(),
            "--req".to_string(),
            request.payload.render(),
        ]
    }

    fn run(&self, request: &ServiceRequest) -> Result<RawOutput, String> {
        let program = self.version.cli_program();
        let mut child = Command::new(program)
            .args(self.command_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| format!("failed to run {program}: {error}"))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || drain(stdout));
        let stderr_reader = thread::spawn(move || drain(stderr));

        let status = wait_with_deadline(&mut child, self.timeout + KILL_MARGIN);
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        match status {
            Some(status) => Ok(RawOutput {
                status,
                stdout,
                stderr,
            }),
            None => Err(format!(
                "{} timed out after {} ms",
                request.service_path(),
                self.timeout.as_millis()
            )),
        }
    }
}

impl SimulatorService for GzServiceClient {
    fn call(&mut self, request: &ServiceRequest) -> ServiceReply {
        debug!(
            endpoint = request.endpoint.service_name(),
            world = %request.world,
            entity = %request.entity,
            "service_call"
        );
        match self.run(request) {
            Ok(output) => classify_reply(request.endpoint, &output),
            Err(diagnostic) => ServiceReply::failed(diagnostic),
        }
    }
}

#[derive(Debug)]
struct RawOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Create must see an explicit `data: true`; remove and set-pose accept any
/// clean exit that does not report `data: false`.
fn classify_reply(endpoint: Endpoint, output: &RawOutput) -> ServiceReply {
    let accepted = match endpoint {
        Endpoint::Create => output.stdout.contains("data: true"),
        Endpoint::Remove | Endpoint::SetPose => !output.stdout.contains("data: false"),
    };
    if output.status.success() && accepted {
        return ServiceReply::ok();
    }
    let diagnostic = [output.stderr.trim(), output.stdout.trim()]
        .into_iter()
        .find(|text| !text.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("service exited with {}", output.status));
    ServiceReply::failed(diagnostic)
}

fn drain<R: Read>(source: Option<R>) -> String {
    let mut text = String::new();
    if let Some(mut source) = source {
        let _ = source.read_to_string(&mut text);
    }
    text
}

/// Polls until the child exits; kills and reaps it once `limit` passes.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) | Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }
}
