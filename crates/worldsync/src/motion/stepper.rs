use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::model::{Entity, Motion, Vec2, Vec3};

/// Loop interval for elliptical and polygon motion, seconds.
pub const STEP_SECONDS: f64 = 0.005;
/// Loop interval for linear motion, seconds.
pub const LINEAR_STEP_SECONDS: f64 = 0.001;
/// Segments shorter than this are skipped; paths with nothing longer do not
/// move.
pub const MIN_SEGMENT_LENGTH: f64 = 0.001;

pub fn step_seconds(motion: &Motion) -> f64 {
    match motion {
        Motion::Linear { .. } => LINEAR_STEP_SECONDS,
        Motion::Elliptical { .. } | Motion::Polygon { .. } => STEP_SECONDS,
    }
}

/// Kinematic state carried between steps. Height stays fixed at the body's
/// initial center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionState {
    Linear {
        current: Vec2,
        /// `1.0` toward `path[1]`, `-1.0` toward `path[0]`.
        direction: f64,
        z: f64,
    },
    Elliptical {
        theta: f64,
        center: Vec2,
        z: f64,
    },
    Polygon {
        segment: usize,
        t: f64,
        z: f64,
    },
}

impl MotionState {
    /// Starting state for a moving entity; `None` for static ones.
    pub fn initial(entity: &Entity) -> Option<Self> {
        let motion = entity.motion.as_ref()?;
        let center = entity.geometry.center();
        Some(match motion {
            Motion::Linear { path, .. } => MotionState::Linear {
                current: path[0],
                direction: 1.0,
                z: center.z,
            },
            Motion::Elliptical { .. } => MotionState::Elliptical {
                theta: 0.0,
                center: center.xy(),
                z: center.z,
            },
            Motion::Polygon { .. } => MotionState::Polygon {
                segment: 0,
                t: 0.0,
                z: center.z,
            },
        })
    }

    /// `None` when the path is degenerate or the state belongs to another
    /// motion type.
    pub fn advance(&mut self, motion: &Motion, distance: f64) -> Option<Vec3> {
        match (self, motion) {
            (
                MotionState::Linear {
                    current,
                    direction,
                    z,
                },
                Motion::Linear { path, .. },
            ) => {
                let next = step_linear(path, current, direction, distance)?;
                Some(Vec3::new(next.x, next.y, *z))
            }
            (
                MotionState::Elliptical { theta, center, z },
                Motion::Elliptical {
                    semi_major,
                    semi_minor,
                    angle,
                    ..
                },
            ) => {
                if *semi_major <= 0.0 {
                    return None;
                }
                let circumference = 2.0 * std::f64::consts::PI * semi_major;
                *theta += distance / circumference * 2.0 * std::f64::consts::PI;
                let (local_x, local_y) = (semi_major * theta.cos(), semi_minor * theta.sin());
                let (sin, cos) = angle.sin_cos();
                Some(Vec3::new(
                    center.x + local_x * cos - local_y * sin,
                    center.y + local_x * sin + local_y * cos,
                    *z,
                ))
            }
            (MotionState::Polygon { segment, t, z }, Motion::Polygon { path, .. }) => {
                let point = step_polygon(path, segment, t, distance)?;
                Some(Vec3::new(point.x, point.y, *z))
            }
            _ => None,
        }
    }
}

fn step_linear(
    path: &[Vec2; 2],
    current: &mut Vec2,
    direction: &mut f64,
    distance: f64,
) -> Option<Vec2> {
    let [start, end] = *path;
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let length = start.distance_to(end);
    if length < MIN_SEGMENT_LENGTH {
        return None;
    }
    let moved_x = current.x + distance * *direction * dx / length;
    let moved_y = current.y + distance * *direction * dy / length;
    let projection = ((moved_x - start.x) * dx + (moved_y - start.y) * dy) / (length * length);

    let next = if projection > 1.0 {
        *direction = -*direction;
        end
    } else if projection < 0.0 {
        *direction = -*direction;
        start
    } else {
        Vec2::new(start.x + projection * dx, start.y + projection * dy)
    };
    *current = next;
    Some(next)
}

// `t` stays in [0, 1); leftover distance carries into the next segment.
fn step_polygon(path: &[Vec2], segment: &mut usize, t: &mut f64, distance: f64) -> Option<Vec2> {
    let count = path.len();
    if count < 2 {
        return None;
    }
    let segment_length = |idx: usize| path[idx].distance_to(path[(idx + 1) % count]);
    // Segments below the threshold are skipped, so only the rest count.
    let perimeter = (0..count)
        .map(segment_length)
        .filter(|length| *length >= MIN_SEGMENT_LENGTH)
        .sum::<f64>();
    if perimeter < MIN_SEGMENT_LENGTH {
        return None;
    }

    *segment %= count;
    let mut remaining = distance.max(0.0) % perimeter;
    loop {
        let length = segment_length(*segment);
        if length >= MIN_SEGMENT_LENGTH {
            let left = (1.0 - *t) * length;
            if remaining < left {
                *t += remaining / length;
                break;
            }
            remaining = (remaining - left).max(0.0);
        }
        *t = 0.0;
        *segment = (*segment + 1) % count;
    }

    let start = path[*segment];
    let end = path[(*segment + 1) % count];
    Some(Vec2::new(
        start.x + *t * (end.x - start.x),
        start.y + *t * (end.y - start.y),
    ))
}

/// Per-step speed drawn from a normal distribution around the nominal
/// velocity, clamped to `[0, 2 * velocity]`.
#[derive(Debug)]
pub struct SpeedJitter<R> {
    rng: R,
}

impl<R: Rng> SpeedJitter<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn sample(&mut self, velocity: f64, std: f64) -> f64 {
        let raw = match Normal::new(velocity, std) {
            Ok(normal) if std > 0.0 => normal.sample(&mut self.rng),
            _ => velocity,
        };
        raw.min(velocity * 2.0).max(0.0)
    }

    /// Distance covered in one loop interval of `motion`.
    pub fn step_distance(&mut self, motion: &Motion) -> f64 {
        self.sample(motion.velocity(), motion.std()) * step_seconds(motion)
    }
}
