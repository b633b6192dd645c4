use super::{FieldRegion, FieldSample, PhysicsField};
use crate::body::Shape;
use crate::math::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use std::f32::consts::{FRAC_PI_8, PI};

/// Gusting wind with aerodynamic drag on internodes and lift, drag and
/// flutter torque on leaves.
///
/// The gust strength at a body is fBm noise over its horizontal position
/// shifted by time, scaled by the mean wind speed.
#[derive(Debug, Clone)]
pub struct WindField {
    pub velocity: Vec3,
    pub air_density: f32,
    /// Leaf drag per unit mass
    pub air_resistance: f32,
    /// Normal over tangential drag on leaves
    pub drag_ratio: f32,
    /// Angle of the leaf flutter torque
    pub phi: f32,
    pub branch_scale: f32,
    pub leaf_scale: f32,
    noise: Fbm<Perlin>,
    region: FieldRegion,
}

impl Default for WindField {
    fn default() -> Self {
        Self::new(Vec3::new(2.0, 0.0, 7.0))
    }
}

impl WindField {
    pub fn new(velocity: Vec3) -> Self {
        Self {
            velocity,
            air_density: 0.1,
            air_resistance: 4.0,
            drag_ratio: 100.0,
            phi: FRAC_PI_8,
            branch_scale: 1.0,
            leaf_scale: 1.0,
            noise: Fbm::<Perlin>::new(0).set_octaves(4),
            region: FieldRegion::unbounded(),
        }
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.noise = Fbm::<Perlin>::new(seed).set_octaves(4);
        self
    }

    pub fn with_region(mut self, region: FieldRegion) -> Self {
        self.region = region;
        self
    }

    /// Local wind velocity at a point
    pub fn velocity_at(&self, position: &Vec3, time: f32) -> Vec3 {
        let speed = self.velocity.norm();
        if speed <= 1e-9 {
            return Vec3::zeros();
        }
        let sample = [(position.x + time) as f64, (position.y + time) as f64];
        let gust = self.noise.get(sample).abs() as f32 * speed;
        self.velocity / speed * gust
    }
}

impl PhysicsField for WindField {
    fn region(&self) -> &FieldRegion {
        &self.region
    }

    fn force(&self, body: &FieldSample, time: f32) -> Vec3 {
        let Some(shape) = body.shape else {
            return Vec3::zeros();
        };
        let relative = self.velocity_at(&body.center_of_mass, time) - body.velocity;

        match shape {
            Shape::Internode { .. } => {
                let axis = body.rotation * Vec3::y();
                let normal = relative - axis * relative.dot(&axis);
                normal * (self.branch_scale * self.air_density * shape.area() * normal.norm())
            }
            Shape::Leaf { .. } => {
                let up = body.rotation * Vec3::z();
                let normal = up * relative.dot(&up);
                let tangential = relative - normal;
                let lift = normal
                    * (self.leaf_scale * self.air_density * shape.area() * relative.norm());
                let drag = (normal + tangential / self.drag_ratio)
                    * (self.air_resistance * body.mass);
                lift + drag
            }
        }
    }

    fn torque(&self, body: &FieldSample, time: f32) -> Option<Vec3> {
        let Some(Shape::Leaf { .. }) = body.shape else {
            return None;
        };
        let area = body.shape.map_or(0.0, |s| s.area());
        let up = body.rotation * Vec3::z();
        let relative = self.velocity_at(&body.center_of_mass, time) - body.velocity;

        let k = self.leaf_scale * self.air_density * area / 2.0
            * (area / PI).sqrt()
            * relative.dot(&up);
        let (sin, cos) = self.phi.sin_cos();
        let flutter = up.cross(&(relative * cos + up.cross(&(relative * sin)))) * k;
        Some(flutter - body.inertia * body.angular_velocity * self.air_resistance)
    }
}
