use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{SessionConfig, WorldLayout};
use crate::lifecycle::{LaunchError, LifecycleCoordinator, ManagedProcess};
use crate::model::{Entity, EntityStatus, InvalidEntityError};
use crate::reconcile::{apply_changes, author_replay, ApplySummary, PassSettings, ReconcileError};
use crate::scene::{SceneDocument, SceneError};
use crate::sim::{GzServiceClient, SimulatorService};
use crate::world::World;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    InvalidEntity(#[from] InvalidEntityError),
    #[error("no world is loaded; create or load a world first")]
    NoWorld,
    #[error("entity '{name}' does not exist in world '{world}'")]
    UnknownEntity { world: String, name: String },
}

/// Owns the single active world, the simulator client and the subordinate
/// processes. Dropping the session shuts it down.
pub struct WorldSession<S: SimulatorService = GzServiceClient> {
    layout: WorldLayout,
    config: SessionConfig,
    service: S,
    world: Option<World>,
    lifecycle: LifecycleCoordinator,
    shut_down: bool,
}

impl WorldSession<GzServiceClient> {
    pub fn new(root: impl Into<PathBuf>, config: SessionConfig) -> Self {
        let service = GzServiceClient::new(config.version, config.service_timeout);
        Self::with_service(root, config, service)
    }
}

impl<S: SimulatorService> WorldSession<S> {
    pub fn with_service(root: impl Into<PathBuf>, config: SessionConfig, service: S) -> Self {
        Self {
            layout: WorldLayout::new(root, config.version),
            lifecycle: LifecycleCoordinator::new(config.termination_grace),
            config,
            service,
            world: None,
            shut_down: false,
        }
    }

    /// Copies the empty template to `<name>.sdf`, renames its world and
    /// starts the simulator on it. Any previous world is shut down first.
    pub fn create_world(&mut self, name: &str) -> Result<&World, SessionError> {
        self.close_current();
        let document = SceneDocument::create_from_template(
            &self.layout.template_path(),
            name,
            &self.layout.scene_path(name),
        )?;
        self.open(World::new(document))
    }

    pub fn load_world(&mut self, name: &str) -> Result<&World, SessionError> {
        self.close_current();
        let (document, entities) = SceneDocument::load(&self.layout.scene_path(name))?;
        self.open(World::from_loaded(document, entities))
    }

    fn open(&mut self, world: World) -> Result<&World, SessionError> {
        self.shut_down = false;
        if self.config.launch_processes {
            self.lifecycle
                .launch_simulator(self.config.version, world.document.path())?;
        }
        info!(
            world = %world.name(),
            scene = %world.document.path().display(),
            entities = world.store.len(),
            version = %self.config.version,
            "world_opened"
        );
        Ok(self.world.insert(world))
    }

    fn close_current(&mut self) {
        if self.world.is_some() {
            self.shutdown();
        }
        self.world = None;
    }

    /// Stages a new entity; an existing record with the same name is replaced.
    pub fn add_entity(&mut self, entity: Entity) -> Result<(), SessionError> {
        let world = self.world.as_mut().ok_or(SessionError::NoWorld)?;
        entity.validate()?;
        world.store.add(entity.with_status(EntityStatus::New));
        Ok(())
    }

    /// Replaces an existing entity. One the simulator has never accepted
    /// stays `new`; otherwise it becomes `updated`.
    pub fn update_entity(&mut self, entity: Entity) -> Result<(), SessionError> {
        let world = self.world.as_mut().ok_or(SessionError::NoWorld)?;
        entity.validate()?;
        let previous = world
            .store
            .find_by_name(&entity.name)
            .map(|existing| existing.status)
            .ok_or_else(|| SessionError::UnknownEntity {
                world: world.name().to_string(),
                name: entity.name.clone(),
            })?;
        let status = match previous {
            EntityStatus::New => EntityStatus::New,
            EntityStatus::Clean | EntityStatus::Updated | EntityStatus::Removed => {
                EntityStatus::Updated
            }
        };
        world.store.add(entity.with_status(status));
        Ok(())
    }

    /// Marks an entity for removal. One the simulator has never accepted is
    /// dropped immediately since there is nothing remote to remove.
    pub fn remove_entity(&mut self, name: &str) -> Result<(), SessionError> {
        let world = self.world.as_mut().ok_or(SessionError::NoWorld)?;
        match world.store.find_by_name(name).map(|entity| entity.status) {
            Some(EntityStatus::New) => world.store.purge(name),
            Some(_) => {
                world.store.mark_removed(name);
            }
            None => {
                return Err(SessionError::UnknownEntity {
                    world: world.name().to_string(),
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Runs a reconciliation pass, then regenerates and restarts the motion
    /// replay. Replay problems are logged; they never fail the pass.
    pub fn apply_changes(&mut self) -> Result<ApplySummary, SessionError> {
        let live = self.lifecycle.is_simulator_running();
        let world = self
            .world
            .as_mut()
            .ok_or(SessionError::Reconcile(ReconcileError::SimulatorNotRunning))?;
        let settings = PassSettings::from_config(&self.config);
        let mut summary = apply_changes(world, &mut self.service, live, &settings)?;

        match author_replay(world, &self.layout, &self.config) {
            Ok(Some(artifacts)) => {
                if self.config.launch_processes {
                    if let Err(error) = self
                        .lifecycle
                        .start_replay(&self.config.replay_interpreter, &artifacts.program)
                    {
                        warn!(world = %world.name(), %error, "replay_process_start_failed");
                    }
                }
                summary.replay_program = Some(artifacts.program);
            }
            Ok(None) => {
                self.lifecycle.stop_replay();
            }
            Err(error) => {
                warn!(world = %world.name(), %error, "replay_program_write_failed");
            }
        }

        info!(world = %world.name(), %summary, "changes_applied");
        Ok(summary)
    }

    /// Saves the document, stops the replay program, then the simulator.
    /// Each step runs even if the previous one failed. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(world) = &self.world {
            match world.document.save() {
                Ok(()) => info!(scene = %world.document.path().display(), "world_saved_on_shutdown"),
                Err(error) => warn!(%error, "world_save_on_shutdown_failed"),
            }
        }
        if let Some(outcome) = self.lifecycle.stop_replay() {
            info!(?outcome, "replay_process_stopped");
        }
        if let Some(outcome) = self.lifecycle.stop_simulator() {
            info!(?outcome, "simulator_process_stopped");
        }
    }

    pub fn adopt_simulator(&mut self, process: ManagedProcess) {
        self.lifecycle.adopt_simulator(process);
    }

    pub fn is_simulator_running(&mut self) -> bool {
        self.lifecycle.is_simulator_running()
    }

    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<S: SimulatorService> Drop for WorldSession<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
