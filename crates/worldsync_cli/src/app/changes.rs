use std::fs;
use std::path::Path;

use serde::Deserialize;
use worldsync::Entity;

/// Edits handed to the core in one batch, as an editor would produce them.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ChangeSet {
    #[serde(default)]
    pub(crate) added: Vec<Entity>,
    #[serde(default)]
    pub(crate) updated: Vec<Entity>,
    #[serde(default)]
    pub(crate) removed: Vec<String>,
}

impl ChangeSet {
    pub(crate) fn staged_entities(&self) -> impl Iterator<Item = &Entity> {
        self.added.iter().chain(self.updated.iter())
    }
}

pub(crate) fn load_change_set(path: &Path) -> Result<ChangeSet, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read change file {}: {error}", path.display()))?;
    parse_change_set(&raw).map_err(|message| format!("{}: {message}", path.display()))
}

pub(crate) fn parse_change_set(raw: &str) -> Result<ChangeSet, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, ChangeSet>(&mut deserializer) {
        Ok(changes) => {
            validate_change_set(&changes)?;
            Ok(changes)
        }
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse change json: {source}"))
            } else {
                Err(format!("parse change json at {path}: {source}"))
            }
        }
    }
}

fn validate_change_set(changes: &ChangeSet) -> Result<(), String> {
    let sections = [("added", &changes.added), ("updated", &changes.updated)];
    for (section, entities) in sections {
        for (index, entity) in entities.iter().enumerate() {
            entity
                .validate()
                .map_err(|error| format!("change json at {section}[{index}]: {error}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use worldsync::{EntityKind, Motion};

    use super::*;

    #[test]
    fn parses_all_sections_with_defaults() {
        let changes = parse_change_set(
            r#"{
                "added": [
                    {"name": "wall_1", "color": "Red",
                     "geometry": {"kind": "wall", "start": {"x": 0, "y": 0}, "end": {"x": 2, "y": 0},
                                  "width": 0.1, "height": 1}},
                    {"name": "ball", "geometry": {"kind": "sphere", "position": {"x": 1, "y": 1, "z": 0.5}, "radius": 0.5},
                     "motion": {"type": "elliptical", "velocity": 1, "std": 0.1,
                                "semi_major": 2, "semi_minor": 1, "angle": 0}}
                ],
                "removed": ["old_box"]
            }"#,
        )
        .expect("parse");
        assert_eq!(changes.added.len(), 2);
        assert_eq!(changes.added[0].kind(), EntityKind::Wall);
        assert!(matches!(changes.added[1].motion, Some(Motion::Elliptical { .. })));
        assert!(changes.updated.is_empty());
        assert_eq!(changes.removed, vec!["old_box"]);
        assert_eq!(changes.staged_entities().count(), 2);
    }

    #[test]
    fn error_names_the_offending_path() {
        let error = parse_change_set(
            r#"{"added": [{"name": "b", "geometry": {"kind": "box", "position": {"x": 0, "y": 0, "z": 0}, "size": [1, 1]}}]}"#,
        )
        .expect_err("error");
        assert!(error.starts_with("parse change json at added[0].geometry"), "{error}");
    }

    #[test]
    fn polygon_with_two_points_is_rejected_before_staging() {
        let error = parse_change_set(
            r#"{"updated": [{"name": "box_1",
                "geometry": {"kind": "box", "position": {"x": 0, "y": 0, "z": 0.25}, "size": [0.5, 0.5, 0.5]},
                "motion": {"type": "polygon", "velocity": 1, "std": 0,
                           "path": [{"x": 0, "y": 0}, {"x": 1, "y": 0}]}}]}"#,
        )
        .expect_err("error");
        assert_eq!(
            error,
            "change json at updated[0]: invalid entity 'box_1': polygon motion needs at least 3 points, found 2"
        );
    }
}
