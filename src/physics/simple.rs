use log::debug;
use nalgebra::{UnitQuaternion, Vector3, Vector4};

use crate::drone::{DroneParams, DroneState};
use crate::error::Result;
use crate::physics::{BodyId, BodyKind, Image, PhysicsBackend};

const SKY: [u8; 3] = [135, 190, 235];
const GROUND: [u8; 3] = [110, 140, 80];

/// Explicit-Euler rigid body model of a quadrotor over flat ground.
pub struct SimplePhysics {
    params: DroneParams,
    timestep: f64,
    state: DroneState,
    bodies: Vec<(BodyKind, Vector3<f64>)>,
}

impl SimplePhysics {
    pub fn new(params: DroneParams, timestep: f64, initial: DroneState) -> Self {
        SimplePhysics {
            params,
            timestep,
            state: initial,
            bodies: Vec::new(),
        }
    }

    pub fn body(&self, id: BodyId) -> Option<(BodyKind, Vector3<f64>)> {
        self.bodies.get(id).copied()
    }

    fn body_torques(&self, forces: &Vector4<f64>, z_torques: &Vector4<f64>) -> Vector3<f64> {
        let l = self.params.arm;
        let (x, y) = if self.params.model.is_x_configuration() {
            let arm = l / std::f64::consts::SQRT_2;
            (
                (forces[0] + forces[1] - forces[2] - forces[3]) * arm,
                (-forces[0] + forces[1] + forces[2] - forces[3]) * arm,
            )
        } else {
            ((forces[1] - forces[3]) * l, (-forces[0] + forces[2]) * l)
        };
        let z = -z_torques[0] + z_torques[1] - z_torques[2] + z_torques[3];
        Vector3::new(x, y, z)
    }
}

impl PhysicsBackend for SimplePhysics {
    fn reset(&mut self, initial: &DroneState) {
        self.state = initial.clone();
    }

    fn apply_rpm(&mut self, rpm: &Vector4<f64>) {
        let dt = self.timestep;
        let sq = rpm.component_mul(rpm);
        let forces = sq * self.params.kf;
        let z_torques = sq * self.params.km;

        let thrust_world = self.state.quaternion * Vector3::new(0.0, 0.0, forces.sum());
        let force_world = thrust_world - Vector3::new(0.0, 0.0, self.params.gravity);

        let inertia = self.params.inertia_matrix();
        let omega = self.state.angular_velocity;
        let torques = self.body_torques(&forces, &z_torques) - omega.cross(&(inertia * omega));
        let omega_dot = torques.component_div(&self.params.inertia);

        let mut velocity = self.state.velocity + force_world / self.params.mass * dt;
        let angular_velocity = omega + omega_dot * dt;
        let mut position = self.state.position + velocity * dt;

        if position.z < 0.0 {
            position.z = 0.0;
            if velocity.z < 0.0 {
                velocity = Vector3::zeros();
            }
        }

        let quaternion =
            self.state.quaternion * UnitQuaternion::from_scaled_axis(angular_velocity * dt);
        self.state.position = position;
        self.state.velocity = velocity;
        self.state.angular_velocity = angular_velocity;
        self.state.set_orientation(quaternion);
        self.state.last_rpm = *rpm;
    }

    fn drone_state(&self) -> DroneState {
        self.state.clone()
    }

    /// Attitude-indicator view: sky above the horizon, ground below it.
    fn capture_image(&mut self, resolution: (u32, u32)) -> Result<Image> {
        let (width, height) = resolution;
        let mut image = Image::blank(width, height);
        let focal = width.max(1) as f64 / 2.0;
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;

        for v in 0..height {
            for u in 0..width {
                let ray_body = Vector3::new(focal, cx - u as f64, cy - v as f64);
                let ray_world = self.state.quaternion * ray_body;
                let color = if ray_world.z < 0.0 { GROUND } else { SKY };
                let offset = (v as usize * width as usize + u as usize) * 4;
                image.data[offset..offset + 3].copy_from_slice(&color);
                image.data[offset + 3] = 255;
            }
        }
        Ok(image)
    }

    fn spawn_body(&mut self, kind: BodyKind, position: Vector3<f64>) -> BodyId {
        self.bodies.push((kind, position));
        let id = self.bodies.len() - 1;
        debug!("spawned {:?} #{} at {:?}", kind, id, position.as_slice());
        id
    }

    fn move_body(&mut self, id: BodyId, position: Vector3<f64>) {
        if let Some(body) = self.bodies.get_mut(id) {
            body.1 = position;
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
