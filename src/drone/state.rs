use nalgebra::{UnitQuaternion, Vector3, Vector4};

use crate::actors::Actor;

/// Read-only kinematic snapshot of the drone, as reported by the physics backend.
#[derive(Clone, Debug, PartialEq)]
pub struct DroneState {
    pub position: Vector3<f64>,
    pub quaternion: UnitQuaternion<f64>,
    /// Roll, pitch, yaw (rad)
    pub rpy: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
    /// Motor speeds applied on the last physics tick
    pub last_rpm: Vector4<f64>,
}

impl DroneState {
    /// Drone at rest at `position` with attitude `rpy` and motors off.
    pub fn at_rest(position: Vector3<f64>, rpy: Vector3<f64>) -> Self {
        let quaternion = UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z);
        DroneState {
            position,
            quaternion,
            rpy,
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            last_rpm: Vector4::zeros(),
        }
    }

    /// Level drone at `position` with all motors at `hover_rpm`.
    pub fn hovering(position: Vector3<f64>, hover_rpm: f64) -> Self {
        DroneState {
            last_rpm: Vector4::repeat(hover_rpm),
            ..DroneState::at_rest(position, Vector3::zeros())
        }
    }

    /// Replaces the orientation, keeping quaternion and Euler angles in sync.
    pub fn set_orientation(&mut self, quaternion: UnitQuaternion<f64>) {
        let (roll, pitch, yaw) = quaternion.euler_angles();
        self.quaternion = quaternion;
        self.rpy = Vector3::new(roll, pitch, yaw);
    }

    pub fn yaw(&self) -> f64 {
        self.rpy.z
    }

    /// Flat 20-element layout: position, quaternion (x, y, z, w), rpy,
    /// velocity, angular velocity, last RPMs.
    pub fn to_vector(&self) -> [f64; 20] {
        let q = self.quaternion.coords;
        let mut out = [0.0; 20];
        out[0..3].copy_from_slice(self.position.as_slice());
        out[3..7].copy_from_slice(&[q.x, q.y, q.z, q.w]);
        out[7..10].copy_from_slice(self.rpy.as_slice());
        out[10..13].copy_from_slice(self.velocity.as_slice());
        out[13..16].copy_from_slice(self.angular_velocity.as_slice());
        out[16..20].copy_from_slice(self.last_rpm.as_slice());
        out
    }
}

impl Actor for DroneState {
    fn position(&self) -> Vector3<f64> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_layout() {
        let mut state = DroneState::hovering(Vector3::new(1.0, 2.0, 3.0), 100.0);
        state.velocity = Vector3::new(4.0, 5.0, 6.0);
        let v = state.to_vector();
        assert_eq!(&v[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&v[3..7], &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(&v[10..13], &[4.0, 5.0, 6.0]);
        assert_eq!(&v[16..20], &[100.0; 4]);
    }

    #[test]
    fn orientation_stays_in_sync() {
        let mut state = DroneState::at_rest(Vector3::zeros(), Vector3::zeros());
        state.set_orientation(UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3));
        assert!((state.rpy - Vector3::new(0.1, -0.2, 0.3)).norm() < 1e-12);
        assert!((state.yaw() - 0.3).abs() < 1e-12);
    }
}
