use crate::math::{skew_squared, Mat3, Vec3};

/// Aggregate of a body and its whole subtree, rebuilt every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeBody {
    pub mass: f32,
    pub force: Vec3,
    /// About the owning body's pivot
    pub torque: Vec3,
    pub center_of_mass: Vec3,
    /// About `center_of_mass`, world frame
    pub inertia: Mat3,
}

impl Default for CompositeBody {
    fn default() -> Self {
        Self {
            mass: 0.0,
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
            center_of_mass: Vec3::zeros(),
            inertia: Mat3::zeros(),
        }
    }
}

impl CompositeBody {
    /// Aggregate a body with its children's composites.
    ///
    /// `own` carries the body's own mass, force, torque (about its pivot),
    /// center of mass and world inertia. Each child is given as the world
    /// position of its joint and its finished composite.
    pub fn aggregate<'a, I>(own: &CompositeBody, pivot: &Vec3, children: I) -> CompositeBody
    where
        I: Iterator<Item = (Vec3, &'a CompositeBody)> + Clone,
    {
        let mut mass = own.mass;
        let mut force = own.force;
        let mut torque = own.torque;
        let mut weighted = own.center_of_mass * own.mass;

        for (joint_position, child) in children.clone() {
            mass += child.mass;
            force += child.force;
            torque += (joint_position - pivot).cross(&child.force) + child.torque;
            weighted += child.center_of_mass * child.mass;
        }

        let center_of_mass = if mass > 0.0 {
            weighted / mass
        } else {
            own.center_of_mass
        };

        let mut inertia =
            own.inertia - own.mass * skew_squared(&(own.center_of_mass - center_of_mass));
        for (_, child) in children {
            let offset = child.center_of_mass - center_of_mass;
            inertia += child.inertia - child.mass * skew_squared(&offset);
        }

        CompositeBody {
            mass,
            force,
            torque,
            center_of_mass,
            inertia,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(mass: f32, at: Vec3, force: Vec3) -> CompositeBody {
        CompositeBody {
            mass,
            force,
            torque: Vec3::zeros(),
            center_of_mass: at,
            inertia: Mat3::zeros(),
        }
    }

    #[test]
    fn test_leaf_composite_is_own_values() {
        let own = point(2.0, Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, -1.0, 0.0));
        let composite = CompositeBody::aggregate(&own, &Vec3::zeros(), std::iter::empty());
        assert_eq!(composite, own);
    }

    #[test]
    fn test_two_point_masses() {
        let own = point(1.0, Vec3::zeros(), Vec3::zeros());
        let child = point(1.0, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        let joint = Vec3::new(2.0, 0.0, 0.0);
        let composite =
            CompositeBody::aggregate(&own, &Vec3::zeros(), std::iter::once((joint, &child)));

        assert_eq!(composite.mass, 2.0);
        assert_relative_eq!(composite.center_of_mass, Vec3::new(1.0, 0.0, 0.0));
        // Child force at lever (2, 0, 0)
        assert_relative_eq!(composite.torque, Vec3::new(0.0, 0.0, 2.0));
        // Two unit masses 1 m from the center along x
        assert_relative_eq!(
            composite.inertia,
            Mat3::from_diagonal(&Vec3::new(0.0, 2.0, 2.0)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_massless_subtree_keeps_center() {
        let own = point(0.0, Vec3::new(0.0, 1.0, 0.0), Vec3::zeros());
        let composite = CompositeBody::aggregate(&own, &Vec3::zeros(), std::iter::empty());
        assert_eq!(composite.center_of_mass, own.center_of_mass);
    }
}
