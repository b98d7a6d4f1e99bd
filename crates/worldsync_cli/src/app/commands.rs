use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{info, warn};
use worldsync::{encode_entity, SceneDocument, SchemaVersion, WorldSession};

use super::bootstrap::{project_root, session_config, Cli, Command};
use super::changes::{load_change_set, ChangeSet};

pub(crate) fn dispatch(cli: Cli) -> Result<(), String> {
    match &cli.command {
        Command::Encode { changes } => {
            let config = session_config(&cli)?;
            let changes = load_change_set(changes)?;
            print!("{}", render_encoded(&changes, config.version.schema_version()));
            Ok(())
        }
        Command::Inspect { scene } => {
            println!("{}", render_inspection(scene)?);
            Ok(())
        }
        Command::Apply {
            world,
            load,
            hold,
            changes,
        } => {
            let changes = load_change_set(changes)?;
            let config = session_config(&cli)?;
            let root = project_root(&cli)?;
            apply(WorldSession::new(root, config), world, *load, *hold, changes)
        }
    }
}

fn render_encoded(changes: &ChangeSet, schema: SchemaVersion) -> String {
    changes
        .staged_entities()
        .map(|entity| format!("{}\n", encode_entity(entity, schema, true)))
        .collect()
}

fn render_inspection(scene: &Path) -> Result<String, String> {
    let (document, entities) = SceneDocument::load(scene).map_err(|error| error.to_string())?;
    info!(
        world = %document.world_name(),
        entities = entities.len(),
        "scene_inspected"
    );
    serde_json::to_string_pretty(&entities).map_err(|error| format!("encode entities: {error}"))
}

fn apply(
    mut session: WorldSession,
    world: &str,
    load: bool,
    hold: bool,
    changes: ChangeSet,
) -> Result<(), String> {
    let opened = if load {
        session.load_world(world)
    } else {
        session.create_world(world)
    };
    opened.map_err(|error| error.to_string())?;

    stage_changes(&mut session, changes)?;
    let summary = session
        .apply_changes()
        .map_err(|error| error.to_string())?;
    println!("{summary}");
    for failure in &summary.failures {
        println!("  {} {}: {}", failure.op, failure.name, failure.reason);
    }
    if let Some(program) = &summary.replay_program {
        println!("motion replay: {}", program.display());
    }

    if hold {
        wait_for_enter();
    }
    session.shutdown();
    Ok(())
}

fn stage_changes(session: &mut WorldSession, changes: ChangeSet) -> Result<(), String> {
    let ChangeSet {
        added,
        updated,
        removed,
    } = changes;
    for entity in added {
        session.add_entity(entity).map_err(|error| error.to_string())?;
    }
    for entity in updated {
        let name = entity.name.clone();
        session.update_entity(entity).map_err(|error| {
            warn!(entity = %name, "update_rejected");
            error.to_string()
        })?;
    }
    for name in removed {
        session
            .remove_entity(&name)
            .map_err(|error| error.to_string())?;
    }
    Ok(())
}

fn wait_for_enter() {
    print!("simulator running; press Enter to shut down ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
