use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::model::Entity;

use super::atomic_io::write_text_atomic;
use super::codec::{decode_entity, is_foreign_model, MalformedEntityError};
use super::xml::{XmlElement, XmlParseError, XML_DECLARATION};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("empty world template not found: {path}")]
    TemplateNotFound { path: PathBuf },
    #[error("scene file not found: {path}")]
    SceneFileNotFound { path: PathBuf },
    #[error("failed to read scene file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("scene file {path} is not valid XML: {source}")]
    XmlMalformed {
        path: PathBuf,
        #[source]
        source: XmlParseError,
    },
    #[error("scene file {path} has no <world> element under its root")]
    MissingWorldElement { path: PathBuf },
    #[error("failed to load scene file {path}: {source}")]
    MalformedEntity {
        path: PathBuf,
        #[source]
        source: MalformedEntityError,
    },
    #[error("failed to write scene file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The parsed scene tree of one world plus the file it persists to.
#[derive(Debug, Clone)]
pub struct SceneDocument {
    root: XmlElement,
    world_name: String,
    path: PathBuf,
}

impl SceneDocument {
    /// Copies the template to `target`, renaming its world. The returned
    /// name is whatever the rewritten tree holds.
    pub fn create_from_template(
        template_path: &Path,
        world_name: &str,
        target: &Path,
    ) -> Result<Self, SceneError> {
        if !template_path.is_file() {
            return Err(SceneError::TemplateNotFound {
                path: template_path.to_path_buf(),
            });
        }
        let mut root = read_tree(template_path)?;
        let world = root
            .child_mut("world")
            .ok_or_else(|| SceneError::MissingWorldElement {
                path: template_path.to_path_buf(),
            })?;
        world.set_attr("name", world_name);
        let resolved = world.attr("name").unwrap_or(world_name).to_string();

        let document = Self {
            root,
            world_name: resolved,
            path: target.to_path_buf(),
        };
        document.save()?;
        info!(
            template = %template_path.display(),
            scene = %target.display(),
            world = %document.world_name,
            "scene_created_from_template"
        );
        Ok(document)
    }

    /// Parses an existing scene file and decodes every entity model under the
    /// world, in document order.
    pub fn load(path: &Path) -> Result<(Self, Vec<Entity>), SceneError> {
        if !path.exists() {
            return Err(SceneError::SceneFileNotFound {
                path: path.to_path_buf(),
            });
        }
        let root = read_tree(path)?;
        let world = root
            .child("world")
            .ok_or_else(|| SceneError::MissingWorldElement {
                path: path.to_path_buf(),
            })?;
        let world_name = world.attr("name").unwrap_or_default().to_string();

        let mut entities = Vec::new();
        for model in world.children_named("model") {
            if is_foreign_model(model) {
                debug!(model = model.attr("name").unwrap_or("<unnamed>"), "scene_foreign_model_kept");
                continue;
            }
            let entity = decode_entity(model).map_err(|source| SceneError::MalformedEntity {
                path: path.to_path_buf(),
                source,
            })?;
            entities.push(entity);
        }

        info!(
            scene = %path.display(),
            world = %world_name,
            entity_count = entities.len(),
            "scene_loaded"
        );
        Ok((
            Self {
                root,
                world_name,
                path: path.to_path_buf(),
            },
            entities,
        ))
    }

    pub fn save(&self) -> Result<(), SceneError> {
        self.save_to(&self.path)
    }

    /// Writes with an explicit encoding declaration, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), SceneError> {
        let mut text = String::from(XML_DECLARATION);
        self.root.write_into(&mut text);
        text.push('\n');
        write_text_atomic(path, &text).map_err(|source| SceneError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(scene = %path.display(), "scene_saved");
        Ok(())
    }

    /// Replaces any model with the same name, then appends `model` to the
    /// world.
    pub fn upsert_model(&mut self, model: XmlElement) -> Result<(), SceneError> {
        let name = model.attr("name").unwrap_or_default().to_string();
        let world = self.world_mut()?;
        world.remove_children_where(|child| is_model_named(child, &name));
        world.push_child(model);
        Ok(())
    }

    /// Returns how many model elements were removed.
    pub fn remove_model(&mut self, name: &str) -> Result<usize, SceneError> {
        let world = self.world_mut()?;
        Ok(world.remove_children_where(|child| is_model_named(child, name)))
    }

    pub fn model_names(&self) -> Vec<String> {
        self.world()
            .map(|world| {
                world
                    .children_named("model")
                    .filter_map(|model| model.attr("name"))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn model(&self, name: &str) -> Option<&XmlElement> {
        self.world()?
            .children_named("model")
            .find(|model| model.attr("name") == Some(name))
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    fn world(&self) -> Option<&XmlElement> {
        self.root.child("world")
    }

    fn world_mut(&mut self) -> Result<&mut XmlElement, SceneError> {
        let path = self.path.clone();
        self.root
            .child_mut("world")
            .ok_or(SceneError::MissingWorldElement { path })
    }
}

fn is_model_named(element: &XmlElement, name: &str) -> bool {
    element.name == "model" && element.attr("name") == Some(name)
}

fn read_tree(path: &Path) -> Result<XmlElement, SceneError> {
    let raw = fs::read_to_string(path).map_err(|source| SceneError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    XmlElement::parse(&raw).map_err(|source| SceneError::XmlMalformed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::model::{Color, EntityKind, Geometry, Vec2, Vec3};
    use crate::scene::codec::entity_element;

    const TEMPLATE: &str = r#"<?xml version="1.0" ?>
<sdf version="1.8">
  <world name="empty">
    <physics name="1ms" type="ignored"><max_step_size>0.001</max_step_size></physics>
    <model name="ground_plane">
      <static>true</static>
      <link name="link"><collision name="collision"><geometry><plane><normal>0 0 1</normal><size>100 100</size></plane></geometry></collision></link>
    </model>
  </world>
</sdf>
"#;

    fn write_template(dir: &Path) -> PathBuf {
        let path = dir.join("empty_world.sdf");
        fs::write(&path, TEMPLATE).expect("write template");
        path
    }

    fn wall(name: &str) -> Entity {
        Entity::new(
            name,
            Geometry::Wall {
                start: Vec2::new(0.0, 0.0),
                end: Vec2::new(2.0, 0.0),
                width: 0.1,
                height: 1.0,
            },
        )
        .with_color(Color::Red)
    }

    #[test]
    fn create_from_template_renames_world_and_writes_copy() {
        let temp = TempDir::new().expect("temp");
        let template = write_template(temp.path());
        let target = temp.path().join("out").join("demo.sdf");

        let document =
            SceneDocument::create_from_template(&template, "demo", &target).expect("create");
        assert_eq!(document.world_name(), "demo");
        let written = fs::read_to_string(&target).expect("read");
        assert!(written.starts_with("<?xml version='1.0' encoding='utf-8'?>"));
        assert!(written.contains("<world name=\"demo\">"));
        assert_eq!(fs::read_to_string(&template).expect("template"), TEMPLATE);
    }

    #[test]
    fn missing_template_and_scene_are_distinct_errors() {
        let temp = TempDir::new().expect("temp");
        let missing = temp.path().join("nope.sdf");
        let err = SceneDocument::create_from_template(&missing, "demo", &temp.path().join("x.sdf"))
            .expect_err("error");
        assert!(matches!(err, SceneError::TemplateNotFound { .. }));
        let err = SceneDocument::load(&missing).expect_err("error");
        assert!(matches!(err, SceneError::SceneFileNotFound { path } if path == missing));
    }

    #[test]
    fn template_without_world_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let template = temp.path().join("empty_world.sdf");
        fs::write(&template, "<sdf version=\"1.8\"></sdf>").expect("write");
        let err = SceneDocument::create_from_template(&template, "demo", &temp.path().join("d.sdf"))
            .expect_err("error");
        assert!(matches!(err, SceneError::MissingWorldElement { .. }));
    }

    #[test]
    fn upsert_save_load_preserves_order_and_skips_ground_plane() {
        let temp = TempDir::new().expect("temp");
        let template = write_template(temp.path());
        let target = temp.path().join("demo.sdf");
        let mut document =
            SceneDocument::create_from_template(&template, "demo", &target).expect("create");

        document.upsert_model(entity_element(&wall("wall_2"))).expect("upsert");
        document.upsert_model(entity_element(&wall("wall_1"))).expect("upsert");
        document
            .upsert_model(entity_element(&Entity::new(
                "sphere_1",
                Geometry::Sphere {
                    position: Vec3::new(1.0, 1.0, 0.5),
                    radius: 0.5,
                },
            )))
            .expect("upsert");
        document.upsert_model(entity_element(&wall("wall_2"))).expect("re-upsert");
        document.save().expect("save");

        let (loaded, entities) = SceneDocument::load(&target).expect("load");
        assert_eq!(loaded.world_name(), "demo");
        assert_eq!(
            loaded.model_names(),
            vec!["ground_plane", "wall_1", "sphere_1", "wall_2"]
        );
        let names = entities.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["wall_1", "sphere_1", "wall_2"]);
        assert_eq!(entities[0].kind(), EntityKind::Wall);
        assert_eq!(entities[0].color, Color::Red);
    }

    #[test]
    fn remove_model_drops_every_match() {
        let temp = TempDir::new().expect("temp");
        let template = write_template(temp.path());
        let mut document =
            SceneDocument::create_from_template(&template, "demo", &temp.path().join("d.sdf"))
                .expect("create");
        document.upsert_model(entity_element(&wall("wall_1"))).expect("upsert");
        assert_eq!(document.remove_model("wall_1").expect("remove"), 1);
        assert_eq!(document.remove_model("wall_1").expect("remove"), 0);
        assert!(document.model("wall_1").is_none());
    }

    #[test]
    fn malformed_model_fails_the_load() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("broken.sdf");
        let mut model = entity_element(&wall("wall_1"));
        model.remove_children_where(|child| child.name == "pose");
        let model = model.to_xml_string();
        fs::write(
            &path,
            format!("<sdf version=\"1.8\"><world name=\"w\">{model}</world></sdf>"),
        )
        .expect("write");
        let err = SceneDocument::load(&path).expect_err("error");
        match err {
            SceneError::MalformedEntity { source, .. } => assert_eq!(source.element, "wall_1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_xml_reports_location() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("bad.sdf");
        fs::write(&path, "<sdf><world name=\"w\"></sdf>").expect("write");
        let err = SceneDocument::load(&path).expect_err("error");
        assert!(matches!(err, SceneError::XmlMalformed { .. }));
    }
}
