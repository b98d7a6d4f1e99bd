use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_to(self, other: Vec2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Wall,
    Box,
    Cylinder,
    Sphere,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Wall => "wall",
            EntityKind::Box => "box",
            EntityKind::Cylinder => "cylinder",
            EntityKind::Sphere => "sphere",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wall" => Some(EntityKind::Wall),
            "box" => Some(EntityKind::Box),
            "cylinder" => Some(EntityKind::Cylinder),
            "sphere" => Some(EntityKind::Sphere),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape data for one entity. The variant is the entity's kind, so wall and
/// primitive fields can never be mixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// Pose and size are derived from the endpoints at encode time.
    Wall {
        start: Vec2,
        end: Vec2,
        width: f64,
        height: f64,
    },
    Box {
        position: Vec3,
        /// width, length, height
        size: [f64; 3],
    },
    Cylinder {
        position: Vec3,
        radius: f64,
        length: f64,
    },
    Sphere {
        position: Vec3,
        radius: f64,
    },
}

impl Geometry {
    pub fn kind(&self) -> EntityKind {
        match self {
            Geometry::Wall { .. } => EntityKind::Wall,
            Geometry::Box { .. } => EntityKind::Box,
            Geometry::Cylinder { .. } => EntityKind::Cylinder,
            Geometry::Sphere { .. } => EntityKind::Sphere,
        }
    }

    /// Center of the body in world coordinates.
    pub fn center(&self) -> Vec3 {
        match *self {
            Geometry::Wall {
                start, end, height, ..
            } => Vec3::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0, height / 2.0),
            Geometry::Box { position, .. }
            | Geometry::Cylinder { position, .. }
            | Geometry::Sphere { position, .. } => position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Color {
    Black,
    #[default]
    Gray,
    White,
    Red,
    Blue,
    Green,
}

const COLOR_TABLE: [(Color, &str, [f64; 3]); 6] = [
    (Color::Black, "Black", [0.0, 0.0, 0.0]),
    (Color::Gray, "Gray", [0.5, 0.5, 0.5]),
    (Color::White, "White", [1.0, 1.0, 1.0]),
    (Color::Red, "Red", [1.0, 0.0, 0.0]),
    (Color::Blue, "Blue", [0.0, 0.0, 1.0]),
    (Color::Green, "Green", [0.0, 1.0, 0.0]),
];

impl Color {
    pub fn name(self) -> &'static str {
        COLOR_TABLE
            .iter()
            .find(|(color, _, _)| *color == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("Gray")
    }

    pub fn rgb(self) -> [f64; 3] {
        COLOR_TABLE
            .iter()
            .find(|(color, _, _)| *color == self)
            .map(|(_, _, rgb)| *rgb)
            .unwrap_or([0.5, 0.5, 0.5])
    }

    /// Unknown names fall back to gray.
    pub fn from_name(name: &str) -> Self {
        COLOR_TABLE
            .iter()
            .find(|(_, candidate, _)| *candidate == name)
            .map(|(color, _, _)| *color)
            .unwrap_or_default()
    }

    /// Exact match only; anything else decodes to gray.
    pub fn from_rgb(rgb: [f64; 3]) -> Self {
        COLOR_TABLE
            .iter()
            .find(|(_, _, candidate)| *candidate == rgb)
            .map(|(color, _, _)| *color)
            .unwrap_or_default()
    }
}

impl From<String> for Color {
    fn from(name: String) -> Self {
        Color::from_name(&name)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Motion {
    /// Bounces between the two endpoints.
    Linear {
        velocity: f64,
        std: f64,
        path: [Vec2; 2],
    },
    Elliptical {
        velocity: f64,
        std: f64,
        semi_major: f64,
        semi_minor: f64,
        /// Rotation relative to the world X axis, radians.
        angle: f64,
    },
    /// Closed loop through at least three points.
    Polygon {
        velocity: f64,
        std: f64,
        path: Vec<Vec2>,
    },
}

impl Motion {
    pub fn type_name(&self) -> &'static str {
        match self {
            Motion::Linear { .. } => "linear",
            Motion::Elliptical { .. } => "elliptical",
            Motion::Polygon { .. } => "polygon",
        }
    }

    pub fn velocity(&self) -> f64 {
        match *self {
            Motion::Linear { velocity, .. }
            | Motion::Elliptical { velocity, .. }
            | Motion::Polygon { velocity, .. } => velocity,
        }
    }

    pub fn std(&self) -> f64 {
        match *self {
            Motion::Linear { std, .. }
            | Motion::Elliptical { std, .. }
            | Motion::Polygon { std, .. } => std,
        }
    }

    pub fn path(&self) -> &[Vec2] {
        match self {
            Motion::Linear { path, .. } => path,
            Motion::Polygon { path, .. } => path,
            Motion::Elliptical { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Clean,
    New,
    Updated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entity '{name}': {reason}")]
pub struct InvalidEntityError {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub motion: Option<Motion>,
    #[serde(default, skip_serializing)]
    pub status: EntityStatus,
}

impl Entity {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            geometry,
            color: Color::default(),
            motion: None,
            status: EntityStatus::New,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_motion(mut self, motion: Motion) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.geometry.kind()
    }

    pub fn is_dynamic(&self) -> bool {
        self.motion.is_some()
    }

    /// Checks the record can be encoded and decoded back unchanged.
    pub fn validate(&self) -> Result<(), InvalidEntityError> {
        let fail = |reason: String| {
            Err(InvalidEntityError {
                name: self.name.clone(),
                reason,
            })
        };
        if self.name.trim().is_empty() {
            return fail("name must not be empty".to_string());
        }
        if let Err(reason) = check_geometry(&self.geometry) {
            return fail(reason);
        }
        if let Some(motion) = &self.motion {
            if let Err(reason) = check_motion(motion) {
                return fail(reason);
            }
        }
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be positive and finite, got {value}"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be non-negative and finite, got {value}"))
    }
}

fn check_geometry(geometry: &Geometry) -> Result<(), String> {
    match *geometry {
        Geometry::Wall {
            start,
            end,
            width,
            height,
        } => {
            if !start.is_finite() || !end.is_finite() {
                return Err("wall endpoints must be finite".to_string());
            }
            positive("wall length", start.distance_to(end))?;
            positive("width", width)?;
            positive("height", height)
        }
        Geometry::Box { position, size } => {
            finite_position(position)?;
            size.iter().try_for_each(|value| positive("size", *value))
        }
        Geometry::Cylinder {
            position,
            radius,
            length,
        } => {
            finite_position(position)?;
            positive("radius", radius)?;
            positive("length", length)
        }
        Geometry::Sphere { position, radius } => {
            finite_position(position)?;
            positive("radius", radius)
        }
    }
}

fn finite_position(position: Vec3) -> Result<(), String> {
    if position.is_finite() {
        Ok(())
    } else {
        Err("position must be finite".to_string())
    }
}

fn check_motion(motion: &Motion) -> Result<(), String> {
    non_negative("velocity", motion.velocity())?;
    non_negative("std", motion.std())?;
    if !motion.path().iter().all(|point| point.is_finite()) {
        return Err("motion path points must be finite".to_string());
    }
    match motion {
        Motion::Linear { .. } => Ok(()),
        Motion::Polygon { path, .. } if path.len() < 3 => Err(format!(
            "polygon motion needs at least 3 points, found {}",
            path.len()
        )),
        Motion::Polygon { .. } => Ok(()),
        Motion::Elliptical {
            semi_major,
            semi_minor,
            angle,
            ..
        } => {
            positive("semi_major", *semi_major)?;
            positive("semi_minor", *semi_minor)?;
            if angle.is_finite() {
                Ok(())
            } else {
                Err("angle must be finite".to_string())
            }
        }
    }
}
