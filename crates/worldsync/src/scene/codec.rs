use thiserror::Error;

use crate::config::SchemaVersion;
use crate::geometry::{compute_inertia, derive_wall_placement, wall_endpoints, DEFAULT_DENSITY};
use crate::model::{Color, Entity, EntityKind, EntityStatus, Geometry, Motion, Vec2, Vec3};

use super::classify::{classify_kind, KindEvidence, Primitive};
use super::xml::{XmlElement, XmlParseError};

/// A model element that cannot be turned back into an entity. `element` is
/// the model's name attribute, or its tag when the name is missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed entity element '{element}': {reason}")]
pub struct MalformedEntityError {
    pub element: String,
    pub reason: String,
}

impl MalformedEntityError {
    fn new(element: &str, reason: impl Into<String>) -> Self {
        Self {
            element: element.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fixed 6-decimal rendering used for every numeric field in the scene format.
pub fn fmt6(value: f64) -> String {
    format!("{value:.6}")
}

pub fn format_pose(position: Vec3, yaw: f64) -> String {
    format!(
        "{} {} {} 0 0 {}",
        fmt6(position.x),
        fmt6(position.y),
        fmt6(position.z),
        fmt6(yaw)
    )
}

/// Serializes one entity as a `<model>` element, optionally wrapped in an
/// `<sdf>` root carrying the schema version.
pub fn encode_entity(entity: &Entity, schema: SchemaVersion, wrap_in_document: bool) -> String {
    let model = entity_element(entity);
    if wrap_in_document {
        XmlElement::new("sdf")
            .with_attr("version", schema.as_str())
            .with_child(model)
            .to_xml_string()
    } else {
        model.to_xml_string()
    }
}

/// Parses an unwrapped model fragment produced by [`encode_entity`].
pub fn parse_model_fragment(raw: &str) -> Result<XmlElement, XmlParseError> {
    XmlElement::parse(raw)
}

pub fn entity_element(entity: &Entity) -> XmlElement {
    let (pose, shape) = placement_and_shape(&entity.geometry);
    let [r, g, b] = entity.color.rgb();

    let mut link = XmlElement::new("link")
        .with_attr("name", "link")
        .with_child(
            XmlElement::new("collision")
                .with_attr("name", "collision")
                .with_child(XmlElement::new("geometry").with_child(shape.clone())),
        )
        .with_child(
            XmlElement::new("visual")
                .with_attr("name", "visual")
                .with_child(XmlElement::new("geometry").with_child(shape))
                .with_child(XmlElement::new("material").with_child(XmlElement::leaf(
                    "diffuse",
                    format!("{r} {g} {b} 1"),
                ))),
        );

    if entity.is_dynamic() {
        let inertia = compute_inertia(&entity.geometry, DEFAULT_DENSITY);
        link.push_child(
            XmlElement::new("inertial")
                .with_child(XmlElement::leaf("mass", fmt6(inertia.mass)))
                .with_child(
                    XmlElement::new("inertia")
                        .with_child(XmlElement::leaf("ixx", fmt6(inertia.ixx)))
                        .with_child(XmlElement::leaf("ixy", "0"))
                        .with_child(XmlElement::leaf("ixz", "0"))
                        .with_child(XmlElement::leaf("iyy", fmt6(inertia.iyy)))
                        .with_child(XmlElement::leaf("iyz", "0"))
                        .with_child(XmlElement::leaf("izz", fmt6(inertia.izz))),
                ),
        );
        link.push_child(XmlElement::leaf("gravity", "false"));
    }

    let mut model = XmlElement::new("model")
        .with_attr("name", entity.name.as_str())
        .with_child(XmlElement::leaf(
            "static",
            if entity.is_dynamic() { "false" } else { "true" },
        ))
        .with_child(XmlElement::leaf("type", entity.kind().as_str()))
        .with_child(XmlElement::leaf("pose", pose))
        .with_child(link);

    if let Some(motion) = &entity.motion {
        model.push_child(motion_element(motion));
    }
    model
}

fn placement_and_shape(geometry: &Geometry) -> (String, XmlElement) {
    match *geometry {
        Geometry::Wall {
            start,
            end,
            width,
            height,
        } => {
            let placement = derive_wall_placement(start, end, height);
            let pose = format_pose(
                Vec3::new(placement.center_x, placement.center_y, placement.center_z),
                placement.yaw,
            );
            (pose, box_shape([placement.length, width, height]))
        }
        Geometry::Box { position, size } => (format_pose(position, 0.0), box_shape(size)),
        Geometry::Cylinder {
            position,
            radius,
            length,
        } => (
            format_pose(position, 0.0),
            XmlElement::new("cylinder")
                .with_child(XmlElement::leaf("radius", fmt6(radius)))
                .with_child(XmlElement::leaf("length", fmt6(length))),
        ),
        Geometry::Sphere { position, radius } => (
            format_pose(position, 0.0),
            XmlElement::new("sphere").with_child(XmlElement::leaf("radius", fmt6(radius))),
        ),
    }
}

fn box_shape(size: [f64; 3]) -> XmlElement {
    XmlElement::new("box").with_child(XmlElement::leaf(
        "size",
        format!("{} {} {}", fmt6(size[0]), fmt6(size[1]), fmt6(size[2])),
    ))
}

fn motion_element(motion: &Motion) -> XmlElement {
    let mut element = XmlElement::new("motion")
        .with_child(XmlElement::leaf("type", motion.type_name()))
        .with_child(XmlElement::leaf("velocity", fmt6(motion.velocity())))
        .with_child(XmlElement::leaf("std", fmt6(motion.std())));
    match motion {
        Motion::Linear { path, .. } => push_points(&mut element, path),
        Motion::Polygon { path, .. } => push_points(&mut element, path),
        Motion::Elliptical {
            semi_major,
            semi_minor,
            angle,
            ..
        } => {
            element.push_child(XmlElement::leaf("semi_major", fmt6(*semi_major)));
            element.push_child(XmlElement::leaf("semi_minor", fmt6(*semi_minor)));
            element.push_child(XmlElement::leaf("angle", fmt6(*angle)));
        }
    }
    element
}

fn push_points(element: &mut XmlElement, points: &[Vec2]) {
    for point in points {
        element.push_child(
            XmlElement::new("point")
                .with_child(XmlElement::leaf("x", fmt6(point.x)))
                .with_child(XmlElement::leaf("y", fmt6(point.y))),
        );
    }
}

/// Models this crate did not author (ground planes, meshes): no `<type>` tag
/// and geometry made of something other than a box, cylinder or sphere. They
/// stay in the document but never become entities.
pub fn is_foreign_model(element: &XmlElement) -> bool {
    if element.child("type").is_some() {
        return false;
    }
    match element.find_descendant("geometry") {
        Some(geometry) => [Primitive::Box, Primitive::Cylinder, Primitive::Sphere]
            .iter()
            .all(|primitive| geometry.child(primitive.tag()).is_none()),
        None => false,
    }
}

/// Rebuilds an entity from a `<model>` element. Decoded entities are `clean`:
/// they describe what the document already holds.
pub fn decode_entity(element: &XmlElement) -> Result<Entity, MalformedEntityError> {
    let name = element
        .attr("name")
        .ok_or_else(|| MalformedEntityError::new(&element.name, "missing name attribute"))?;

    let pose_text = element
        .child("pose")
        .and_then(XmlElement::text)
        .ok_or_else(|| MalformedEntityError::new(name, "missing <pose>"))?;
    let pose = parse_floats(&pose_text, name, "pose")?;
    if pose.len() != 6 {
        return Err(MalformedEntityError::new(
            name,
            format!("<pose> must hold 6 numbers, found {}", pose.len()),
        ));
    }
    let (position, yaw) = (Vec3::new(pose[0], pose[1], pose[2]), pose[5]);

    let geometry_element = element
        .find_descendant("geometry")
        .ok_or_else(|| MalformedEntityError::new(name, "missing <geometry>"))?;
    let primitive = [Primitive::Box, Primitive::Cylinder, Primitive::Sphere]
        .into_iter()
        .find(|primitive| geometry_element.child(primitive.tag()).is_some());

    let type_tag = match element.child("type").and_then(XmlElement::text) {
        Some(tag) => Some(EntityKind::parse(&tag).ok_or_else(|| {
            MalformedEntityError::new(name, format!("unknown <type> '{tag}'"))
        })?),
        None => None,
    };
    let kind = classify_kind(&KindEvidence {
        model_name: name,
        type_tag,
        primitive,
    })
    .map(|classification| classification.kind)
    .ok_or_else(|| MalformedEntityError::new(name, "no box, cylinder or sphere geometry"))?;

    let expected = Primitive::for_kind(kind);
    let shape = geometry_element.child(expected.tag()).ok_or_else(|| {
        MalformedEntityError::new(
            name,
            format!("kind '{kind}' requires <{}> geometry", expected.tag()),
        )
    })?;

    let geometry = match kind {
        EntityKind::Wall | EntityKind::Box => {
            let size = required_floats(shape, "size", name)?;
            let [a, b, c] = <[f64; 3]>::try_from(size.as_slice()).map_err(|_| {
                MalformedEntityError::new(name, "<size> must hold 3 numbers")
            })?;
            if kind == EntityKind::Wall {
                let (start, end) = wall_endpoints(position.xy(), yaw, a);
                Geometry::Wall {
                    start,
                    end,
                    width: b,
                    height: c,
                }
            } else {
                Geometry::Box {
                    position,
                    size: [a, b, c],
                }
            }
        }
        EntityKind::Cylinder => Geometry::Cylinder {
            position,
            radius: required_number(shape, "radius", name)?,
            length: required_number(shape, "length", name)?,
        },
        EntityKind::Sphere => Geometry::Sphere {
            position,
            radius: required_number(shape, "radius", name)?,
        },
    };

    let color = element
        .find_descendant("material")
        .and_then(|material| material.child("diffuse"))
        .and_then(XmlElement::text)
        .and_then(|text| {
            let values = text
                .split_whitespace()
                .take(3)
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            <[f64; 3]>::try_from(values.as_slice()).ok()
        })
        .map(Color::from_rgb)
        .unwrap_or_default();

    let motion = match element.find_descendant("motion") {
        Some(motion_element) => Some(decode_motion(motion_element, name)?),
        None => None,
    };

    Ok(Entity {
        name: name.to_string(),
        geometry,
        color,
        motion,
        status: EntityStatus::Clean,
    })
}

fn decode_motion(element: &XmlElement, name: &str) -> Result<Motion, MalformedEntityError> {
    let motion_type = element
        .child("type")
        .and_then(XmlElement::text)
        .ok_or_else(|| MalformedEntityError::new(name, "<motion> without <type>"))?;
    let velocity = required_number(element, "velocity", name)?;
    let std = match element.child("std") {
        Some(_) => required_number(element, "std", name)?,
        None => 0.0,
    };
    let points = element
        .children_named("point")
        .map(|point| {
            Ok(Vec2::new(
                required_number(point, "x", name)?,
                required_number(point, "y", name)?,
            ))
        })
        .collect::<Result<Vec<_>, MalformedEntityError>>()?;

    match motion_type.as_str() {
        "linear" => {
            let path = <[Vec2; 2]>::try_from(points.as_slice()).map_err(|_| {
                MalformedEntityError::new(
                    name,
                    format!("linear motion needs exactly 2 points, found {}", points.len()),
                )
            })?;
            Ok(Motion::Linear {
                velocity,
                std,
                path,
            })
        }
        "polygon" => {
            if points.len() < 3 {
                return Err(MalformedEntityError::new(
                    name,
                    format!("polygon motion needs at least 3 points, found {}", points.len()),
                ));
            }
            Ok(Motion::Polygon {
                velocity,
                std,
                path: points,
            })
        }
        "elliptical" => Ok(Motion::Elliptical {
            velocity,
            std,
            semi_major: required_number(element, "semi_major", name)?,
            semi_minor: required_number(element, "semi_minor", name)?,
            angle: required_number(element, "angle", name)?,
        }),
        other => Err(MalformedEntityError::new(
            name,
            format!("unknown motion type '{other}'"),
        )),
    }
}

fn required_floats(
    parent: &XmlElement,
    field: &str,
    name: &str,
) -> Result<Vec<f64>, MalformedEntityError> {
    let text = parent
        .child(field)
        .and_then(XmlElement::text)
        .ok_or_else(|| MalformedEntityError::new(name, format!("missing <{field}>")))?;
    parse_floats(&text, name, field)
}

fn required_number(parent: &XmlElement, field: &str, name: &str) -> Result<f64, MalformedEntityError> {
    let values = required_floats(parent, field, name)?;
    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(MalformedEntityError::new(
            name,
            format!("<{field}> must hold a single number"),
        )),
    }
}

fn parse_floats(text: &str, name: &str, field: &str) -> Result<Vec<f64>, MalformedEntityError> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                MalformedEntityError::new(
                    name,
                    format!("<{field}> value '{token}' is not a valid number"),
                )
            })
        })
        .collect()
}
