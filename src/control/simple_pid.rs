use log::warn;
use nalgebra::Vector3;
use std::f64::consts::PI;

use crate::control::{nnls_rpm, ControlOutput, ControlTarget, PidGains, PositionController};
use crate::drone::{DroneParams, DroneState};

const MAX_ROLL_PITCH: f64 = PI / 6.0;

/// Plain PID controller for the generic quadrotor.
///
/// Position error maps to a desired roll/pitch, attitude error to body
/// torques, and torques to RPMs through the non-negative allocation solver.
#[derive(Debug, Clone)]
pub struct SimplePidControl {
    params: DroneParams,
    gains: PidGains,
    control_counter: u64,
    last_pos_e: Vector3<f64>,
    integral_pos_e: Vector3<f64>,
    last_rpy_e: Vector3<f64>,
    integral_rpy_e: Vector3<f64>,
}

impl SimplePidControl {
    pub fn new(params: DroneParams) -> Self {
        SimplePidControl {
            gains: PidGains::reference(params.model),
            params,
            control_counter: 0,
            last_pos_e: Vector3::zeros(),
            integral_pos_e: Vector3::zeros(),
            last_rpy_e: Vector3::zeros(),
            integral_rpy_e: Vector3::zeros(),
        }
    }

    fn position_control(
        &mut self,
        control_timestep: f64,
        state: &DroneState,
        target_position: &Vector3<f64>,
    ) -> (f64, Vector3<f64>, Vector3<f64>) {
        let pos_e = target_position - state.position;
        let d_pos_e = (pos_e - self.last_pos_e) / control_timestep;
        self.last_pos_e = pos_e;
        self.integral_pos_e += pos_e * control_timestep;

        let target_force = Vector3::new(0.0, 0.0, self.params.gravity)
            + self.gains.p_pos.component_mul(&pos_e)
            + self.gains.i_pos.component_mul(&self.integral_pos_e)
            + self.gains.d_pos.component_mul(&d_pos_e);

        let sign_z = if target_force.z < 0.0 { -1.0 } else { 1.0 };
        let force_norm = target_force.norm();
        let roll = if force_norm > 0.0 {
            (-sign_z * target_force.y / force_norm).clamp(-1.0, 1.0).asin()
        } else {
            0.0
        };
        let pitch = (sign_z * target_force.x).atan2(sign_z * target_force.z);
        let target_rpy = Vector3::new(
            roll.clamp(-MAX_ROLL_PITCH, MAX_ROLL_PITCH),
            pitch.clamp(-MAX_ROLL_PITCH, MAX_ROLL_PITCH),
            0.0,
        );

        let thrust = (state.quaternion.to_rotation_matrix() * target_force).z;
        (thrust, target_rpy, pos_e)
    }

    fn attitude_torques(
        &mut self,
        control_timestep: f64,
        state: &DroneState,
        target_rpy: &Vector3<f64>,
    ) -> Vector3<f64> {
        let mut rpy_e = target_rpy - state.rpy;
        if rpy_e.z > PI {
            rpy_e.z -= 2.0 * PI;
        }
        if rpy_e.z < -PI {
            rpy_e.z += 2.0 * PI;
        }
        let d_rpy_e = (rpy_e - self.last_rpy_e) / control_timestep;
        self.last_rpy_e = rpy_e;
        self.integral_rpy_e += rpy_e * control_timestep;

        self.gains.p_att.component_mul(&rpy_e)
            + self.gains.i_att.component_mul(&self.integral_rpy_e)
            + self.gains.d_att.component_mul(&d_rpy_e)
    }
}

impl PositionController for SimplePidControl {
    fn compute_control(
        &mut self,
        control_timestep: f64,
        state: &DroneState,
        target: &ControlTarget,
    ) -> ControlOutput {
        self.control_counter += 1;
        if target.rpy.x != 0.0 || target.rpy.y != 0.0 {
            warn!(
                "ctrl it {}: roll/pitch targets {:?} are ignored by the simple PID controller",
                self.control_counter,
                (target.rpy.x, target.rpy.y)
            );
        }
        if target.velocity != Vector3::zeros() {
            warn!(
                "ctrl it {}: velocity targets are ignored by the simple PID controller",
                self.control_counter
            );
        }

        let (thrust, target_rpy, pos_error) =
            self.position_control(control_timestep, state, &target.position);
        let torques = self.attitude_torques(control_timestep, state, &target_rpy);
        let rpm = nnls_rpm(&self.params, thrust, torques);

        ControlOutput {
            rpm,
            pos_error,
            yaw_error: target_rpy.z - state.yaw(),
        }
    }

    fn set_pid_coefficients(&mut self, gains: &PidGains) {
        self.gains = gains.clone();
    }

    fn pid_coefficients(&self) -> &PidGains {
        &self.gains
    }

    fn reset(&mut self) {
        self.control_counter = 0;
        self.last_pos_e = Vector3::zeros();
        self.integral_pos_e = Vector3::zeros();
        self.last_rpy_e = Vector3::zeros();
        self.integral_rpy_e = Vector3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::DroneModel;

    #[test]
    fn hovering_at_target_commands_hover() {
        let params = DroneParams::for_model(DroneModel::Hb).unwrap();
        let hover = params.hover_rpm;
        let mut ctrl = SimplePidControl::new(params);
        let state = DroneState::hovering(Vector3::new(0.0, 0.0, 1.0), hover);
        let target = ControlTarget::position(state.position);
        let out = ctrl.compute_control(1.0 / 240.0, &state, &target);
        for rpm in out.rpm.iter() {
            assert!((rpm - hover).abs() < 1e-6 * hover);
        }
    }

    #[test]
    fn lateral_target_tilts_within_limits() {
        let params = DroneParams::for_model(DroneModel::Hb).unwrap();
        let hover = params.hover_rpm;
        let mut ctrl = SimplePidControl::new(params);
        let state = DroneState::hovering(Vector3::new(0.0, 0.0, 1.0), hover);
        let out = ctrl.compute_control(
            1.0 / 240.0,
            &state,
            &ControlTarget::position(Vector3::new(100.0, 0.0, 1.0)),
        );
        assert!(out.rpm.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(out.pos_error, Vector3::new(100.0, 0.0, 0.0));
    }
}
