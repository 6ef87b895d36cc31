use nalgebra::{Matrix3, Matrix4x3, Rotation3, UnitQuaternion, Vector3, Vector4};

use crate::control::{
    AttitudeController, ControlOutput, ControlTarget, PidGains, PositionController,
};
use crate::drone::{DroneParams, DroneState};

const PWM2RPM_SCALE: f64 = 0.2685;
const PWM2RPM_CONST: f64 = 4070.3;
const MIN_PWM: f64 = 20000.0;
const MAX_PWM: f64 = 65535.0;
const MAX_TORQUE: f64 = 3200.0;

/// Cascaded PID controller for the Crazyflie airframes.
///
/// The position loop turns the position/velocity error into a desired thrust
/// vector and attitude; the attitude loop turns the rotation error into PWM
/// torques that are mixed per motor.
#[derive(Debug, Clone)]
pub struct DslPidControl {
    kf: f64,
    gravity: f64,
    gains: PidGains,
    mixer: Matrix4x3<f64>,
    control_counter: u64,
    last_rpy: Vector3<f64>,
    integral_pos_e: Vector3<f64>,
    integral_rpy_e: Vector3<f64>,
}

impl DslPidControl {
    pub fn new(params: &DroneParams) -> Self {
        // Mixer follows the airframe: cf2p gets the + layout, not the X one.
        let mixer = if params.model.is_x_configuration() {
            Matrix4x3::new(
                0.5, -0.5, -1.0, //
                0.5, 0.5, 1.0, //
                -0.5, 0.5, -1.0, //
                -0.5, -0.5, 1.0,
            )
        } else {
            Matrix4x3::new(
                0.0, -1.0, -1.0, //
                1.0, 0.0, 1.0, //
                0.0, 1.0, -1.0, //
                -1.0, 0.0, 1.0,
            )
        };
        DslPidControl {
            kf: params.kf,
            gravity: params.gravity,
            gains: PidGains::reference(params.model),
            mixer,
            control_counter: 0,
            last_rpy: Vector3::zeros(),
            integral_pos_e: Vector3::zeros(),
            integral_rpy_e: Vector3::zeros(),
        }
    }

    pub fn control_counter(&self) -> u64 {
        self.control_counter
    }

    /// Returns the PWM thrust, the attitude to reach and the position error.
    fn position_control(
        &mut self,
        control_timestep: f64,
        state: &DroneState,
        target: &ControlTarget,
    ) -> (f64, Vector3<f64>, Vector3<f64>) {
        let cur_rotation = state.quaternion.to_rotation_matrix();
        let pos_e = target.position - state.position;
        let vel_e = target.velocity - state.velocity;

        self.integral_pos_e += pos_e * control_timestep;
        self.integral_pos_e = self.integral_pos_e.map(|v| v.clamp(-2.0, 2.0));
        self.integral_pos_e.z = self.integral_pos_e.z.clamp(-0.15, 0.15);

        let target_thrust = self.gains.p_pos.component_mul(&pos_e)
            + self.gains.i_pos.component_mul(&self.integral_pos_e)
            + self.gains.d_pos.component_mul(&vel_e)
            + Vector3::new(0.0, 0.0, self.gravity);
        let body_z = cur_rotation.matrix().column(2).into_owned();
        let scalar_thrust = target_thrust.dot(&body_z).max(0.0);
        let thrust = ((scalar_thrust / (4.0 * self.kf)).sqrt() - PWM2RPM_CONST) / PWM2RPM_SCALE;

        let yaw = target.rpy.z;
        let target_z_ax = target_thrust
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::z);
        let target_x_c = Vector3::new(yaw.cos(), yaw.sin(), 0.0);
        let target_y_ax = target_z_ax
            .cross(&target_x_c)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::y);
        let target_x_ax = target_y_ax.cross(&target_z_ax);
        let target_rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[
            target_x_ax,
            target_y_ax,
            target_z_ax,
        ]));
        let (roll, pitch, yaw) = target_rotation.euler_angles();

        (thrust, Vector3::new(roll, pitch, yaw), pos_e)
    }
}

impl AttitudeController for DslPidControl {
    fn attitude_control(
        &mut self,
        control_timestep: f64,
        thrust: &Vector4<f64>,
        cur_quat: &UnitQuaternion<f64>,
        target_euler: &Vector3<f64>,
        target_rpy_rates: &Vector3<f64>,
    ) -> Vector4<f64> {
        let cur_rotation = cur_quat.to_rotation_matrix().into_inner();
        let (roll, pitch, yaw) = cur_quat.euler_angles();
        let cur_rpy = Vector3::new(roll, pitch, yaw);
        let target_rotation =
            Rotation3::from_euler_angles(target_euler.x, target_euler.y, target_euler.z)
                .into_inner();

        let rot_matrix_e =
            target_rotation.transpose() * cur_rotation - cur_rotation.transpose() * target_rotation;
        let rot_e = Vector3::new(rot_matrix_e[(2, 1)], rot_matrix_e[(0, 2)], rot_matrix_e[(1, 0)]);
        let rpy_rates_e = target_rpy_rates - (cur_rpy - self.last_rpy) / control_timestep;
        self.last_rpy = cur_rpy;

        self.integral_rpy_e -= rot_e * control_timestep;
        self.integral_rpy_e = self.integral_rpy_e.map(|v| v.clamp(-1500.0, 1500.0));
        self.integral_rpy_e.x = self.integral_rpy_e.x.clamp(-1.0, 1.0);
        self.integral_rpy_e.y = self.integral_rpy_e.y.clamp(-1.0, 1.0);

        let target_torques = (-self.gains.p_att.component_mul(&rot_e)
            + self.gains.d_att.component_mul(&rpy_rates_e)
            + self.gains.i_att.component_mul(&self.integral_rpy_e))
        .map(|v| v.clamp(-MAX_TORQUE, MAX_TORQUE));

        let pwm = (thrust + self.mixer * target_torques).map(|v| v.clamp(MIN_PWM, MAX_PWM));
        pwm.map(|v| PWM2RPM_SCALE * v + PWM2RPM_CONST)
    }
}

impl PositionController for DslPidControl {
    fn compute_control(
        &mut self,
        control_timestep: f64,
        state: &DroneState,
        target: &ControlTarget,
    ) -> ControlOutput {
        self.control_counter += 1;
        let (thrust, target_euler, pos_error) =
            self.position_control(control_timestep, state, target);
        let rpm = self.attitude_control(
            control_timestep,
            &Vector4::repeat(thrust),
            &state.quaternion,
            &target_euler,
            &target.rpy_rates,
        );
        ControlOutput {
            rpm,
            pos_error,
            yaw_error: target_euler.z - state.yaw(),
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
        self.last_rpy = Vector3::zeros();
        self.integral_pos_e = Vector3::zeros();
        self.integral_rpy_e = Vector3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::DroneModel;

    fn controller() -> (DslPidControl, DroneParams) {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        (DslPidControl::new(&params), params)
    }

    #[test]
    fn hovering_at_target_commands_near_hover() {
        let (mut ctrl, params) = controller();
        let state = DroneState::hovering(Vector3::new(0.0, 0.0, 1.0), params.hover_rpm);
        let target = ControlTarget::position(state.position);
        let out = ctrl.compute_control(1.0 / 240.0, &state, &target);
        assert_eq!(out.pos_error, Vector3::zeros());
        for rpm in out.rpm.iter() {
            assert!((rpm - params.hover_rpm).abs() < 0.01 * params.hover_rpm);
        }
    }

    #[test]
    fn target_above_increases_rpm() {
        let (mut ctrl, params) = controller();
        let state = DroneState::hovering(Vector3::new(0.0, 0.0, 1.0), params.hover_rpm);
        let out = ctrl.compute_control(
            1.0 / 240.0,
            &state,
            &ControlTarget::position(Vector3::new(0.0, 0.0, 1.5)),
        );
        assert!(out.rpm.iter().all(|rpm| *rpm > params.hover_rpm));
    }

    #[test]
    fn reset_clears_memory() {
        let (mut ctrl, params) = controller();
        let state = DroneState::hovering(Vector3::zeros(), params.hover_rpm);
        let target = ControlTarget::position(Vector3::new(1.0, 0.0, 0.0));
        let first = ctrl.compute_control(0.01, &state, &target);
        ctrl.compute_control(0.01, &state, &target);
        assert_eq!(ctrl.control_counter(), 2);
        ctrl.reset();
        assert_eq!(ctrl.control_counter(), 0);
        let again = ctrl.compute_control(0.01, &state, &target);
        assert_eq!(first, again);
    }

    #[test]
    fn attitude_output_stays_in_pwm_range() {
        let (mut ctrl, _) = controller();
        let rpm = ctrl.attitude_control(
            0.01,
            &Vector4::repeat(0.5),
            &UnitQuaternion::from_euler_angles(0.3, -0.2, 0.1),
            &Vector3::zeros(),
            &Vector3::zeros(),
        );
        let min = PWM2RPM_SCALE * MIN_PWM + PWM2RPM_CONST;
        let max = PWM2RPM_SCALE * MAX_PWM + PWM2RPM_CONST;
        assert!(rpm.iter().all(|v| *v >= min - 1e-9 && *v <= max + 1e-9));
    }

    #[test]
    fn plus_airframe_uses_plus_mixer() {
        let roll = UnitQuaternion::from_euler_angles(0.2, 0.0, 0.0);
        let thrust = Vector4::repeat(40000.0);
        let command = |model| {
            let params = DroneParams::for_model(model).unwrap();
            DslPidControl::new(&params).attitude_control(
                0.01,
                &thrust,
                &roll,
                &Vector3::zeros(),
                &Vector3::zeros(),
            )
        };

        // a pure roll correction leaves the + airframe's pitch-axis motors alone
        let plus = command(DroneModel::Cf2p);
        assert!((plus[0] - plus[2]).abs() < 1e-9);
        assert!((plus[1] - plus[3]).abs() > 1.0);

        let x = command(DroneModel::Cf2x);
        assert!((x[0] - x[2]).abs() > 1.0);
    }
}
