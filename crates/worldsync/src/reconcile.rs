use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{SchemaVersion, SessionConfig, WorldLayout};
use crate::model::{Entity, EntityStatus};
use crate::motion::{write_replay_artifacts, ReplayArtifacts, ReplayError, ReplayProgram};
use crate::scene::{encode_entity, entity_element, SceneError};
use crate::sim::request::{create_request, remove_request};
use crate::sim::{Endpoint, ServiceRequest, SimulatorService, TextMessage};
use crate::world::World;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("simulator is not running; create or load a world first")]
    SimulatorNotRunning,
    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Create,
    Update,
    Remove,
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeOp::Create => "create",
            ChangeOp::Update => "update",
            ChangeOp::Remove => "remove",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChange {
    pub name: String,
    pub op: ChangeOp,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    pub failures: Vec<FailedChange>,
    /// Set when the pass wrote a motion-replay program.
    pub replay_program: Option<PathBuf>,
}

impl ApplySummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changes applied, {} failed",
            self.applied,
            self.failures.len()
        )
    }
}

/// Timing and format knobs for a pass.
#[derive(Debug, Clone, Copy)]
pub struct PassSettings {
    pub schema: SchemaVersion,
    pub settle_before_pass: Duration,
    pub settle_after_create: Duration,
}

impl PassSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            schema: config.version.schema_version(),
            settle_before_pass: config.settle_before_pass,
            settle_after_create: config.settle_after_create,
        }
    }
}

/// Runs one pass. Fails only when the simulator is not live or the scene
/// document cannot be saved; remote rejections are reported in the summary.
pub fn apply_changes<S>(
    world: &mut World,
    service: &mut S,
    simulator_live: bool,
    settings: &PassSettings,
) -> Result<ApplySummary, ReconcileError>
where
    S: SimulatorService + ?Sized,
{
    if !simulator_live {
        return Err(ReconcileError::SimulatorNotRunning);
    }

    let pending = world.store.pending_names();
    info!(world = %world.name(), pending = pending.len(), "reconcile_pass_started");
    if !settings.settle_before_pass.is_zero() {
        thread::sleep(settings.settle_before_pass);
    }

    let mut pass = Pass {
        world,
        service,
        settings,
        summary: ApplySummary::default(),
    };
    for name in pending {
        pass.reconcile_entity(&name)?;
    }

    let Pass { world, summary, .. } = pass;
    if summary.is_clean() {
        world.store.prune();
    }
    info!(
        world = %world.name(),
        applied = summary.applied,
        failed = summary.failures.len(),
        "reconcile_pass_finished"
    );
    Ok(summary)
}

struct Pass<'a, S: ?Sized> {
    world: &'a mut World,
    service: &'a mut S,
    settings: &'a PassSettings,
    summary: ApplySummary,
}

impl<S: SimulatorService + ?Sized> Pass<'_, S> {
    fn reconcile_entity(&mut self, name: &str) -> Result<(), ReconcileError> {
        let Some(entity) = self.world.store.find_by_name(name).cloned() else {
            return Ok(());
        };
        match entity.status {
            EntityStatus::Clean => {}
            EntityStatus::Updated => {
                if self.remove_remote(&entity, ChangeOp::Update)? {
                    self.world.store.set_status(name, EntityStatus::New);
                    self.create_remote(&entity, ChangeOp::Update)?;
                }
            }
            EntityStatus::New => {
                self.create_remote(&entity, ChangeOp::Create)?;
            }
            EntityStatus::Removed => {
                if self.remove_remote(&entity, ChangeOp::Remove)? {
                    self.world.store.purge(name);
                    self.summary.applied += 1;
                }
            }
        }
        Ok(())
    }

    fn create_remote(&mut self, entity: &Entity, op: ChangeOp) -> Result<bool, ReconcileError> {
        if let Err(error) = entity.validate() {
            warn!(entity = %entity.name, %op, reason = %error.reason, "entity_change_rejected");
            self.summary.failures.push(FailedChange {
                name: entity.name.clone(),
                op,
                reason: error.reason,
            });
            return Ok(false);
        }
        let sdf = encode_entity(entity, self.settings.schema, true);
        let request = self.request(Endpoint::Create, entity, create_request(&sdf));
        if !self.call(&request, op) {
            return Ok(false);
        }

        self.world.document.upsert_model(entity_element(entity))?;
        self.world.document.save()?;
        self.world.store.set_status(&entity.name, EntityStatus::Clean);
        self.summary.applied += 1;
        if !self.settings.settle_after_create.is_zero() {
            thread::sleep(self.settings.settle_after_create);
        }
        Ok(true)
    }

    fn remove_remote(&mut self, entity: &Entity, op: ChangeOp) -> Result<bool, ReconcileError> {
        let request = self.request(Endpoint::Remove, entity, remove_request(&entity.name));
        if !self.call(&request, op) {
            return Ok(false);
        }

        let removed = self.world.document.remove_model(&entity.name)?;
        self.world.document.save()?;
        debug!(entity = %entity.name, elements = removed, "scene_model_removed");
        Ok(true)
    }

    fn request(
        &self,
        endpoint: Endpoint,
        entity: &Entity,
        payload: TextMessage,
    ) -> ServiceRequest {
        ServiceRequest {
            world: self.world.name().to_string(),
            endpoint,
            entity: entity.name.clone(),
            payload,
        }
    }

    fn call(&mut self, request: &ServiceRequest, op: ChangeOp) -> bool {
        let reply = self.service.call(request);
        if reply.success {
            return true;
        }
        let reason = reply
            .diagnostic
            .unwrap_or_else(|| "simulator rejected the request".to_string());
        warn!(
            world = %request.world,
            entity = %request.entity,
            endpoint = request.endpoint.service_name(),
            %op,
            reason = %reason,
            "entity_change_failed"
        );
        self.summary.failures.push(FailedChange {
            name: request.entity.clone(),
            op,
            reason,
        });
        false
    }
}

/// Writes the replay program and launch script for every moving entity the
/// simulator currently holds. Returns `None` when nothing moves.
pub fn author_replay(
    world: &World,
    layout: &WorldLayout,
    config: &SessionConfig,
) -> Result<Option<ReplayArtifacts>, ReplayError> {
    let accepted = world
        .store
        .entities()
        .iter()
        .filter(|entity| matches!(entity.status, EntityStatus::Clean | EntityStatus::Updated));
    let program = ReplayProgram::new(world.name(), config.version, config.set_pose_timeout)
        .with_entities(accepted);
    if program.is_empty() {
        return Ok(None);
    }
    let artifacts = write_replay_artifacts(
        &program,
        layout,
        world.document.path(),
        &config.replay_interpreter,
    )?;
    info!(
        world = %world.name(),
        tracks = program.tracks.len(),
        program = %artifacts.program.display(),
        "replay_program_written"
    );
    Ok(Some(artifacts))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::config::SimulatorVersion;
    use crate::model::{Color, Geometry, Motion, Vec2, Vec3};
    use crate::motion::parse_embedded_tracks;
    use crate::scene::{SceneDocument, XmlElement};
    use crate::sim::fake::RecordingService;

    const TEMPLATE: &str = r#"<?xml version="1.0" ?>
<sdf version="1.8"><world name="empty"><gravity>0 0 -9.8</gravity></world></sdf>
"#;

    fn settings() -> PassSettings {
        PassSettings::from_config(&SessionConfig::immediate())
    }

    fn new_world(dir: &Path) -> World {
        let template = dir.join("empty_world.sdf");
        fs::write(&template, TEMPLATE).expect("template");
        let document = SceneDocument::create_from_template(&template, "demo", &dir.join("demo.sdf"))
            .expect("create");
        World::new(document)
    }

    fn red_wall() -> Entity {
        Entity::new(
            "wall_1",
            Geometry::Wall {
                start: Vec2::new(0.0, 0.0),
                end: Vec2::new(2.0, 0.0),
                width: 0.1,
                height: 1.0,
            },
        )
        .with_color(Color::Red)
    }

    fn sphere(name: &str) -> Entity {
        Entity::new(
            name,
            Geometry::Sphere {
                position: Vec3::new(1.0, 1.0, 0.5),
                radius: 0.5,
            },
        )
    }

    fn saved_model(world: &World, name: &str) -> Option<XmlElement> {
        let (document, _) = SceneDocument::load(world.document.path()).expect("reload");
        document.model(name).cloned()
    }

    fn text_of(model: &XmlElement, tag: &str) -> Option<String> {
        model.find_descendant(tag).and_then(XmlElement::text)
    }

    #[test]
    fn red_wall_lands_in_saved_document() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        world.store.add(red_wall());
        let mut service = RecordingService::default();

        let summary = apply_changes(&mut world, &mut service, true, &settings()).expect("apply");
        assert_eq!(summary.applied, 1);
        assert!(summary.is_clean());
        assert_eq!(service.summary(), vec![(Endpoint::Create, "wall_1".to_string())]);
        assert!(service.calls[0].payload.render().starts_with(r#"sdf: "<sdf version=\"1.8\">"#));

        let model = saved_model(&world, "wall_1").expect("wall saved");
        assert_eq!(
            model.child("pose").and_then(XmlElement::text).as_deref(),
            Some("1.000000 0.000000 0.500000 0 0 0.000000")
        );
        assert_eq!(text_of(&model, "size").as_deref(), Some("2.000000 0.100000 1.000000"));
        assert_eq!(text_of(&model, "diffuse").as_deref(), Some("1 0 0 1"));
        assert_eq!(
            world.store.find_by_name("wall_1").map(|e| e.status),
            Some(EntityStatus::Clean)
        );
    }

    #[test]
    fn rejected_create_is_reported_and_retried_later() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        world.store.add(sphere("sphere_a"));
        world.store.add(sphere("sphere_b"));
        let mut service = RecordingService::rejecting(Endpoint::Create, "sphere_a");

        let summary = apply_changes(&mut world, &mut service, true, &settings()).expect("apply");
        assert_eq!(summary.applied, 1);
        assert_eq!(
            summary.failures,
            vec![FailedChange {
                name: "sphere_a".to_string(),
                op: ChangeOp::Create,
                reason: "data: false".to_string(),
            }]
        );
        assert_eq!(summary.to_string(), "1 changes applied, 1 failed");
        assert!(saved_model(&world, "sphere_a").is_none());
        assert!(saved_model(&world, "sphere_b").is_some());
        assert_eq!(
            world.store.find_by_name("sphere_a").map(|e| e.status),
            Some(EntityStatus::New)
        );
        assert_eq!(
            world.store.find_by_name("sphere_b").map(|e| e.status),
            Some(EntityStatus::Clean)
        );

        service.reject.clear();
        let retry = apply_changes(&mut world, &mut service, true, &settings()).expect("retry");
        assert_eq!(retry.applied, 1);
        assert_eq!(
            service.summary().last(),
            Some(&(Endpoint::Create, "sphere_a".to_string()))
        );
        assert!(world.store.pending_names().is_empty());
    }

    #[test]
    fn update_is_remove_then_create_and_removed_is_purged() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        world.store.add(sphere("sphere_1"));
        world.store.add(sphere("sphere_2"));
        let mut service = RecordingService::default();
        apply_changes(&mut world, &mut service, true, &settings()).expect("first pass");

        world
            .store
            .add(sphere("sphere_1").with_color(Color::Blue).with_status(EntityStatus::Updated));
        assert!(world.store.mark_removed("sphere_2"));
        service.calls.clear();
        let summary = apply_changes(&mut world, &mut service, true, &settings()).expect("apply");

        assert_eq!(summary.applied, 2);
        assert_eq!(
            service.summary(),
            vec![
                (Endpoint::Remove, "sphere_1".to_string()),
                (Endpoint::Create, "sphere_1".to_string()),
                (Endpoint::Remove, "sphere_2".to_string()),
            ]
        );
        assert_eq!(world.store.len(), 1);
        assert!(world.store.find_by_name("sphere_2").is_none());
        let model = saved_model(&world, "sphere_1").expect("sphere_1 saved");
        assert_eq!(text_of(&model, "diffuse").as_deref(), Some("0 0 1 1"));
        assert!(saved_model(&world, "sphere_2").is_none());
        assert_eq!(world.document.model_names(), vec!["sphere_1"]);
    }

    #[test]
    fn failed_update_keeps_updated_status_and_old_element() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        world.store.add(sphere("sphere_1"));
        let mut service = RecordingService::default();
        apply_changes(&mut world, &mut service, true, &settings()).expect("first pass");

        world
            .store
            .add(sphere("sphere_1").with_color(Color::Green).with_status(EntityStatus::Updated));
        let mut rejecting = RecordingService::rejecting(Endpoint::Remove, "sphere_1");
        let summary = apply_changes(&mut world, &mut rejecting, true, &settings()).expect("apply");

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].op, ChangeOp::Update);
        assert_eq!(rejecting.summary(), vec![(Endpoint::Remove, "sphere_1".to_string())]);
        assert_eq!(
            world.store.find_by_name("sphere_1").map(|e| e.status),
            Some(EntityStatus::Updated)
        );
        let model = saved_model(&world, "sphere_1").expect("old element kept");
        assert_eq!(text_of(&model, "diffuse").as_deref(), Some("0.5 0.5 0.5 1"));
    }

    #[test]
    fn dead_simulator_fails_before_any_call() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        world.store.add(red_wall());
        let mut service = RecordingService::default();
        let error = apply_changes(&mut world, &mut service, false, &settings()).expect_err("error");
        assert!(matches!(error, ReconcileError::SimulatorNotRunning));
        assert!(service.calls.is_empty());
        assert_eq!(
            world.store.find_by_name("wall_1").map(|e| e.status),
            Some(EntityStatus::New)
        );
    }

    #[test]
    fn replay_covers_only_accepted_moving_entities() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        let layout = WorldLayout::new(temp.path(), SimulatorVersion::Fortress);
        let motion = Motion::Polygon {
            velocity: 0.5,
            std: 0.1,
            path: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)],
        };
        world.store.add(sphere("mover_ok").with_motion(motion.clone()));
        world.store.add(sphere("mover_rejected").with_motion(motion));
        world.store.add(red_wall());
        let mut service = RecordingService::rejecting(Endpoint::Create, "mover_rejected");
        apply_changes(&mut world, &mut service, true, &settings()).expect("apply");

        let artifacts = author_replay(&world, &layout, &SessionConfig::immediate())
            .expect("write")
            .expect("program written");
        let program = fs::read_to_string(&artifacts.program).expect("read program");
        let tracks = parse_embedded_tracks(&program)
            .expect("table")
            .expect("parse");
        let names = tracks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["mover_ok"]);
    }

    #[test]
    fn static_world_writes_no_replay() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        let layout = WorldLayout::new(temp.path(), SimulatorVersion::Fortress);
        world.store.add(red_wall());
        apply_changes(&mut world, &mut RecordingService::default(), true, &settings())
            .expect("apply");
        assert!(author_replay(&world, &layout, &SessionConfig::immediate())
            .expect("author")
            .is_none());
        assert!(!layout.move_code_dir().exists());
    }

    #[test]
    fn scene_write_failure_aborts_the_pass() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        let scene = world.document.path().to_path_buf();
        fs::remove_file(&scene).expect("remove scene");
        fs::create_dir(&scene).expect("directory in place of scene");
        world.store.add(sphere("sphere_1"));
        let mut service = RecordingService::default();

        let err = apply_changes(&mut world, &mut service, true, &settings()).expect_err("error");
        match err {
            ReconcileError::Scene(SceneError::Write { path, .. }) => assert_eq!(path, scene),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.calls.len(), 1);
        assert_eq!(
            world.store.find_by_name("sphere_1").map(|e| e.status),
            Some(EntityStatus::New)
        );
    }

    #[test]
    fn invalid_entity_is_reported_without_contacting_simulator() {
        let temp = TempDir::new().expect("temp");
        let mut world = new_world(temp.path());
        world.store.add(sphere("sphere_1").with_motion(Motion::Polygon {
            velocity: 1.0,
            std: 0.0,
            path: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)],
        }));
        let mut service = RecordingService::default();

        let summary = apply_changes(&mut world, &mut service, true, &settings()).expect("apply");
        assert_eq!(summary.applied, 0);
        assert_eq!(
            summary.failures,
            vec![FailedChange {
                name: "sphere_1".to_string(),
                op: ChangeOp::Create,
                reason: "polygon motion needs at least 3 points, found 2".to_string(),
            }]
        );
        assert!(service.calls.is_empty());
        assert!(world.document.model("sphere_1").is_none());
        SceneDocument::load(world.document.path()).expect("scene still loads");
    }
}
