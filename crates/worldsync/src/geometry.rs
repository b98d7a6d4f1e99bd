use crate::model::{Geometry, Vec2};

pub const DEFAULT_DENSITY: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallPlacement {
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub yaw: f64,
    pub length: f64,
}

pub fn derive_wall_placement(start: Vec2, end: Vec2, height: f64) -> WallPlacement {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    WallPlacement {
        center_x: (start.x + end.x) / 2.0,
        center_y: (start.y + end.y) / 2.0,
        center_z: height / 2.0,
        yaw: dy.atan2(dx),
        length: dx.hypot(dy),
    }
}

/// Inverse of [`derive_wall_placement`]: endpoints from center, yaw and length.
pub fn wall_endpoints(center: Vec2, yaw: f64, length: f64) -> (Vec2, Vec2) {
    let half_dx = length / 2.0 * yaw.cos();
    let half_dy = length / 2.0 * yaw.sin();
    (
        Vec2::new(center.x - half_dx, center.y - half_dy),
        Vec2::new(center.x + half_dx, center.y + half_dy),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inertia {
    pub mass: f64,
    pub ixx: f64,
    pub iyy: f64,
    pub izz: f64,
}

/// Solid-body mass and principal moments. Walls are treated as boxes of
/// (length, width, height); cylinders spin about their height axis.
pub fn compute_inertia(geometry: &Geometry, density: f64) -> Inertia {
    match *geometry {
        Geometry::Wall {
            start,
            end,
            width,
            height,
        } => box_inertia([start.distance_to(end), width, height], density),
        Geometry::Box { size, .. } => box_inertia(size, density),
        Geometry::Cylinder { radius, length, .. } => {
            let mass = density * std::f64::consts::PI * radius.powi(2) * length;
            let ixx = mass / 12.0 * (3.0 * radius.powi(2) + length.powi(2));
            Inertia {
                mass,
                ixx,
                iyy: ixx,
                izz: mass / 2.0 * radius.powi(2),
            }
        }
        Geometry::Sphere { radius, .. } => {
            let mass = density * 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
            let moment = 2.0 / 5.0 * mass * radius.powi(2);
            Inertia {
                mass,
                ixx: moment,
                iyy: moment,
                izz: moment,
            }
        }
    }
}

fn box_inertia([w, l, h]: [f64; 3], density: f64) -> Inertia {
    let mass = density * w * l * h;
    Inertia {
        mass,
        ixx: mass / 12.0 * (l.powi(2) + h.powi(2)),
        iyy: mass / 12.0 * (w.powi(2) + h.powi(2)),
        izz: mass / 12.0 * (w.powi(2) + l.powi(2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vec3;

    const EPS: f64 = 1e-9;

    #[test]
    fn wall_placement_on_x_axis() {
        let placement = derive_wall_placement(Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), 2.0);
        assert!((placement.center_x - 2.0).abs() < EPS);
        assert!(placement.center_y.abs() < EPS);
        assert!((placement.center_z - 1.0).abs() < EPS);
        assert!(placement.yaw.abs() < EPS);
        assert!((placement.length - 4.0).abs() < EPS);
    }

    #[test]
    fn wall_endpoints_invert_placement() {
        let start = Vec2::new(-1.0, 2.0);
        let end = Vec2::new(3.0, -0.5);
        let placement = derive_wall_placement(start, end, 1.0);
        let (back_start, back_end) = wall_endpoints(
            Vec2::new(placement.center_x, placement.center_y),
            placement.yaw,
            placement.length,
        );
        assert!(back_start.distance_to(start) < EPS);
        assert!(back_end.distance_to(end) < EPS);
    }

    #[test]
    fn unit_box_inertia() {
        let inertia = compute_inertia(
            &Geometry::Box {
                position: Vec3::default(),
                size: [1.0, 1.0, 1.0],
            },
            DEFAULT_DENSITY,
        );
        let expected = 1000.0 / 12.0 * 2.0;
        assert!((inertia.mass - 1000.0).abs() < EPS);
        assert!((inertia.ixx - expected).abs() < EPS);
        assert!((inertia.iyy - expected).abs() < EPS);
        assert!((inertia.izz - expected).abs() < EPS);
    }

    #[test]
    fn cylinder_and_sphere_inertia() {
        let cylinder = compute_inertia(
            &Geometry::Cylinder {
                position: Vec3::default(),
                radius: 0.5,
                length: 2.0,
            },
            DEFAULT_DENSITY,
        );
        let mass = 1000.0 * std::f64::consts::PI * 0.25 * 2.0;
        assert!((cylinder.mass - mass).abs() < 1e-6);
        assert!((cylinder.izz - mass / 2.0 * 0.25).abs() < 1e-6);
        assert!((cylinder.ixx - cylinder.iyy).abs() < EPS);

        let sphere = compute_inertia(
            &Geometry::Sphere {
                position: Vec3::default(),
                radius: 1.0,
            },
            DEFAULT_DENSITY,
        );
        let mass = 1000.0 * 4.0 / 3.0 * std::f64::consts::PI;
        assert!((sphere.mass - mass).abs() < 1e-6);
        assert!((sphere.ixx - 0.4 * mass).abs() < 1e-6);
    }
}
