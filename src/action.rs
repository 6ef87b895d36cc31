//! Action decoding: bounded action vector in, four motor RPMs out.
//!
//! The decoding rule is picked once when the decoder is built; each variant of
//! [`Strategy`] owns whatever controller it needs.

use log::{debug, info};
use nalgebra::{Vector3, Vector4};

use crate::actors::{TrackingContext, TrajectoryTracker};
use crate::control::{
    nnls_rpm, position_controller_for, AttitudeController, ControlTarget, DslPidControl, PidGains,
    PositionController,
};
use crate::drone::{DroneModel, DroneParams, DroneState};
use crate::error::{EnvError, Result};
use crate::spaces::{ActionType, BoxSpace};

/// Scale of RPM offsets around hover for the `rpm` encodings.
pub const RPM_ACTION_SCALE: f64 = 0.05;
/// Displacement (m) per unit action for the `pid` encodings.
pub const PID_DISPLACEMENT_SCALE: f64 = 0.1;
/// Fraction of the airframe maximum speed reachable with the `vel` encoding.
pub const SPEED_LIMIT_FRACTION: f64 = 0.03;

enum Strategy {
    Rpm,
    OneDRpm,
    Thr(DslPidControl),
    Dyn,
    OneDDyn,
    Pid(Box<dyn PositionController>),
    OneDPid(Box<dyn PositionController>),
    Vel {
        controller: Box<dyn PositionController>,
        speed_limit: f64,
    },
    Tun {
        controller: Box<dyn PositionController>,
        reference: PidGains,
        tracker: Box<dyn TrajectoryTracker>,
    },
}

pub struct ActionDecoder {
    action_type: ActionType,
    params: DroneParams,
    control_timestep: f64,
    sim_freq: u32,
    strategy: Strategy,
}

impl ActionDecoder {
    /// `tracker` is only used, and then required, for [`ActionType::Tun`].
    pub fn new(
        action_type: ActionType,
        params: DroneParams,
        control_timestep: f64,
        sim_freq: u32,
        tracker: Option<Box<dyn TrajectoryTracker>>,
    ) -> Result<Self> {
        let model = params.model;
        let strategy = match action_type {
            ActionType::Rpm => Strategy::Rpm,
            ActionType::OneDRpm => Strategy::OneDRpm,
            ActionType::Dyn => Strategy::Dyn,
            ActionType::OneDDyn => Strategy::OneDDyn,
            ActionType::Thr => match model {
                DroneModel::Cf2x | DroneModel::Cf2p => Strategy::Thr(DslPidControl::new(&params)),
                DroneModel::Hb => {
                    return Err(EnvError::UnsupportedController {
                        model,
                        action: action_type,
                    })
                }
            },
            ActionType::Pid => Strategy::Pid(position_controller_for(model)?),
            ActionType::OneDPid => Strategy::OneDPid(position_controller_for(model)?),
            ActionType::Vel => Strategy::Vel {
                controller: position_controller_for(model)?,
                speed_limit: SPEED_LIMIT_FRACTION * params.max_speed(),
            },
            ActionType::Tun => Strategy::Tun {
                controller: position_controller_for(model)?,
                reference: PidGains::reference(model),
                tracker: tracker.ok_or(EnvError::MissingTrajectoryTracker)?,
            },
        };
        info!("action decoder '{}' ready for {}", action_type, model);

        Ok(ActionDecoder {
            action_type,
            params,
            control_timestep,
            sim_freq,
            strategy,
        })
    }

    pub fn space(&self) -> BoxSpace {
        self.action_type.space()
    }

    /// Controller driven by this decoder, for the position-tracking encodings.
    pub fn controller(&self) -> Option<&dyn PositionController> {
        match &self.strategy {
            Strategy::Pid(c) | Strategy::OneDPid(c) => Some(c.as_ref()),
            Strategy::Vel { controller, .. } | Strategy::Tun { controller, .. } => {
                Some(controller.as_ref())
            }
            _ => None,
        }
    }

    /// Clears controller integrators at episode start.
    pub fn reset(&mut self) {
        match &mut self.strategy {
            Strategy::Pid(c) | Strategy::OneDPid(c) => c.reset(),
            Strategy::Vel { controller, .. } | Strategy::Tun { controller, .. } => {
                controller.reset()
            }
            Strategy::Thr(c) => c.reset(),
            Strategy::Rpm | Strategy::OneDRpm | Strategy::Dyn | Strategy::OneDDyn => {}
        }
    }

    /// Turns `action` into motor RPMs, clipped to `[0, max_rpm]`.
    pub fn decode(
        &mut self,
        action: &[f64],
        state: &DroneState,
        step_counter: u64,
    ) -> Result<Vector4<f64>> {
        let expected = self.action_type.width();
        if action.len() != expected {
            return Err(EnvError::ActionWidth {
                expected,
                got: action.len(),
            });
        }

        let params = &self.params;
        let dt = self.control_timestep;
        let rpm = match &mut self.strategy {
            Strategy::Rpm => Vector4::from_fn(|i, _| rpm_offset(params.hover_rpm, action[i])),
            Strategy::OneDRpm => Vector4::repeat(rpm_offset(params.hover_rpm, action[0])),
            Strategy::Thr(ctrl) => {
                let thrust = motor_thrusts(params.gravity, action);
                ctrl.attitude_control(
                    dt,
                    &thrust,
                    &state.quaternion,
                    &state.rpy,
                    &state.angular_velocity,
                )
            }
            Strategy::Dyn => nnls_rpm(
                params,
                params.gravity * (action[0] + 1.0),
                Vector3::new(
                    0.05 * params.max_xy_torque * action[1],
                    0.05 * params.max_xy_torque * action[2],
                    0.05 * params.max_z_torque * action[3],
                ),
            ),
            Strategy::OneDDyn => nnls_rpm(
                params,
                params.gravity * (1.0 + 0.05 * action[0]),
                Vector3::zeros(),
            ),
            Strategy::Pid(ctrl) => {
                let displacement = Vector3::new(action[0], action[1], action[2]);
                let target = state.position + PID_DISPLACEMENT_SCALE * displacement;
                ctrl.compute_control(dt, state, &ControlTarget::position(target)).rpm
            }
            Strategy::OneDPid(ctrl) => {
                let displacement = Vector3::new(0.0, 0.0, action[0]);
                let target = state.position + PID_DISPLACEMENT_SCALE * displacement;
                ctrl.compute_control(dt, state, &ControlTarget::position(target)).rpm
            }
            Strategy::Vel {
                controller,
                speed_limit,
            } => {
                let target = ControlTarget::position(state.position)
                    .with_rpy(Vector3::new(0.0, 0.0, state.yaw()))
                    .with_velocity(velocity_target(action, *speed_limit));
                controller.compute_control(dt, state, &target).rpm
            }
            Strategy::Tun {
                controller,
                reference,
                tracker,
            } => {
                let factors = [
                    action[0] + 1.0,
                    action[1] + 1.0,
                    action[2] + 1.0,
                    action[3] + 1.0,
                    action[4] + 1.0,
                    action[5] + 1.0,
                ];
                controller.set_pid_coefficients(&reference.scaled(factors));
                tracker.trajectory_tracking_rpms(TrackingContext {
                    controller: controller.as_mut(),
                    state,
                    control_timestep: dt,
                    step_counter,
                    sim_freq: self.sim_freq,
                })?
            }
        };

        let clipped = rpm.map(|v| v.clamp(0.0, params.max_rpm));
        debug!(
            "step {}: action {:?} -> rpm {:?}",
            step_counter,
            action,
            clipped.as_slice()
        );
        Ok(clipped)
    }
}

/// Per-motor thrust command of the `thr` encoding: `gravity * (a + 1)`.
pub fn motor_thrusts(gravity: f64, action: &[f64]) -> Vector4<f64> {
    Vector4::from_fn(|i, _| gravity * (action[i] + 1.0))
}

fn rpm_offset(hover_rpm: f64, action: f64) -> f64 {
    hover_rpm * (1.0 + RPM_ACTION_SCALE * action)
}

/// Target velocity for the `vel` encoding: direction from `action[0..3]`,
/// magnitude `speed_limit * |action[3]|`. A zero direction gives zero velocity.
pub fn velocity_target(action: &[f64], speed_limit: f64) -> Vector3<f64> {
    let direction = Vector3::new(action[0], action[1], action[2]);
    let norm = direction.norm();
    let unit = if norm != 0.0 {
        direction / norm
    } else {
        Vector3::zeros()
    };
    speed_limit * action[3].abs() * unit
}

/// Inverse of the `rpm` decoding, used to express applied RPMs as actions.
/// Note the factor is `1 / RPM_ACTION_SCALE`.
pub fn rpm_to_action(rpm: &Vector4<f64>, hover_rpm: f64) -> Vector4<f64> {
    rpm.map(|v| (v / hover_rpm - 1.0) / RPM_ACTION_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::ExpressionTrajectory;
    use nalgebra::UnitQuaternion;

    fn decoder(action_type: ActionType, model: DroneModel) -> Result<ActionDecoder> {
        let params = DroneParams::for_model(model)?;
        let tracker: Option<Box<dyn TrajectoryTracker>> = match action_type {
            ActionType::Tun => Some(Box::new(ExpressionTrajectory::parse("0, 0, 1")?)),
            _ => None,
        };
        ActionDecoder::new(action_type, params, 1.0 / 240.0, 240, tracker)
    }

    fn hovering(model: DroneModel) -> DroneState {
        let params = DroneParams::for_model(model).unwrap();
        DroneState::hovering(Vector3::new(0.0, 0.0, 1.0), params.hover_rpm)
    }

    fn clipped(rpm: Vector4<f64>, params: &DroneParams) -> Vector4<f64> {
        rpm.map(|v| v.clamp(0.0, params.max_rpm))
    }

    #[test]
    fn rpm_zero_action_is_hover() {
        let mut dec = decoder(ActionType::Rpm, DroneModel::Cf2x).unwrap();
        let hover = DroneParams::for_model(DroneModel::Cf2x).unwrap().hover_rpm;
        let rpm = dec.decode(&[0.0; 4], &hovering(DroneModel::Cf2x), 0).unwrap();
        assert_eq!(rpm, Vector4::repeat(hover));
    }

    #[test]
    fn one_d_rpm_broadcasts() {
        let mut dec = decoder(ActionType::OneDRpm, DroneModel::Cf2x).unwrap();
        let hover = DroneParams::for_model(DroneModel::Cf2x).unwrap().hover_rpm;
        let state = hovering(DroneModel::Cf2x);
        assert_eq!(dec.decode(&[0.0], &state, 0).unwrap(), Vector4::repeat(hover));
        let up = dec.decode(&[1.0], &state, 1).unwrap();
        assert_eq!(up, Vector4::repeat(hover * 1.05));
    }

    #[test]
    fn every_encoding_gives_four_finite_rpms() {
        let samples = [-1.0, -0.3, 0.0, 0.7, 1.0];
        for model in [DroneModel::Cf2x, DroneModel::Cf2p, DroneModel::Hb] {
            let max_rpm = DroneParams::for_model(model).unwrap().max_rpm;
            for act in ActionType::ALL {
                let mut dec = match decoder(act, model) {
                    Ok(dec) => dec,
                    Err(EnvError::UnsupportedController { .. }) => continue,
                    Err(e) => panic!("{act} on {model}: {e}"),
                };
                let state = hovering(model);
                for (step, s) in samples.iter().enumerate() {
                    let action: Vec<f64> = (0..act.width())
                        .map(|i| if i % 2 == 0 { *s } else { -*s })
                        .collect();
                    let rpm = dec.decode(&action, &state, step as u64).unwrap();
                    assert_eq!(rpm.len(), 4);
                    assert!(
                        rpm.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= max_rpm),
                        "{act} on {model} gave {rpm:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn wrong_width_is_rejected() {
        let mut dec = decoder(ActionType::Pid, DroneModel::Cf2x).unwrap();
        let err = dec.decode(&[0.0; 4], &hovering(DroneModel::Cf2x), 0);
        assert!(matches!(
            err,
            Err(EnvError::ActionWidth {
                expected: 3,
                got: 4
            })
        ));
    }

    #[test]
    fn zero_direction_gives_zero_velocity() {
        for x in [-1.0, 0.0, 0.5, 1.0] {
            assert_eq!(velocity_target(&[0.0, 0.0, 0.0, x], 0.25), Vector3::zeros());
        }
        let v = velocity_target(&[0.0, 3.0, 4.0, -0.5], 2.0);
        assert!((v - Vector3::new(0.0, 0.6, 0.8)).norm() < 1e-12);
    }

    #[test]
    fn thr_needs_attitude_controller() {
        assert!(matches!(
            decoder(ActionType::Thr, DroneModel::Hb),
            Err(EnvError::UnsupportedController { .. })
        ));
    }

    #[test]
    fn tun_needs_tracker() {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        assert!(matches!(
            ActionDecoder::new(ActionType::Tun, params, 1.0 / 240.0, 240, None),
            Err(EnvError::MissingTrajectoryTracker)
        ));
    }

    #[test]
    fn tun_rescales_gains() {
        let mut dec = decoder(ActionType::Tun, DroneModel::Cf2x).unwrap();
        dec.decode(&[1.0, 0.0, -1.0, 0.0, 0.0, 0.0], &hovering(DroneModel::Cf2x), 0)
            .unwrap();
        let reference = PidGains::reference(DroneModel::Cf2x);
        let gains = dec.controller().unwrap().pid_coefficients();
        assert_eq!(gains.p_pos, reference.p_pos * 2.0);
        assert_eq!(gains.i_pos, reference.i_pos);
        assert_eq!(gains.d_pos, Vector3::zeros());
    }

    #[test]
    fn pid_zero_action_holds_position() {
        let mut dec = decoder(ActionType::Pid, DroneModel::Cf2x).unwrap();
        let hover = DroneParams::for_model(DroneModel::Cf2x).unwrap().hover_rpm;
        let rpm = dec.decode(&[0.0; 3], &hovering(DroneModel::Cf2x), 0).unwrap();
        for v in rpm.iter() {
            assert!((v - hover).abs() < 0.01 * hover);
        }
    }

    #[test]
    fn rpm_to_action_inverts_decoding() {
        let hover = 14000.0;
        let rpm = Vector4::new(hover, hover * 1.05, hover * 0.95, hover);
        let action = rpm_to_action(&rpm, hover);
        assert!((action - Vector4::new(0.0, 1.0, -1.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn dyn_scales_thrust_and_torques() {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        let mut dec = decoder(ActionType::Dyn, DroneModel::Cf2x).unwrap();
        let state = hovering(DroneModel::Cf2x);

        let rpm = dec.decode(&[0.0; 4], &state, 0).unwrap();
        for v in rpm.iter() {
            assert!((v - params.hover_rpm).abs() < 1e-6 * params.hover_rpm);
        }

        let torques = Vector3::new(
            0.05 * params.max_xy_torque * 0.2,
            0.05 * params.max_xy_torque * -0.3,
            0.05 * params.max_z_torque * 0.4,
        );
        let expected = nnls_rpm(&params, params.gravity * (0.1 + 1.0), torques);
        let rpm = dec.decode(&[0.1, 0.2, -0.3, 0.4], &state, 1).unwrap();
        assert_eq!(rpm, clipped(expected, &params));
    }

    #[test]
    fn one_d_dyn_scales_collective_thrust() {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        let mut dec = decoder(ActionType::OneDDyn, DroneModel::Cf2x).unwrap();
        let expected = nnls_rpm(&params, params.gravity * (1.0 + 0.05 * 0.6), Vector3::zeros());
        let rpm = dec.decode(&[0.6], &hovering(DroneModel::Cf2x), 0).unwrap();
        assert_eq!(rpm, clipped(expected, &params));
        assert!(rpm.iter().all(|v| *v > params.hover_rpm));
    }

    #[test]
    fn one_d_pid_moves_along_z_only() {
        let state = hovering(DroneModel::Cf2x);
        let mut one_d = decoder(ActionType::OneDPid, DroneModel::Cf2x).unwrap();
        let mut vertical = decoder(ActionType::Pid, DroneModel::Cf2x).unwrap();
        let mut lateral = decoder(ActionType::Pid, DroneModel::Cf2x).unwrap();

        let rpm = one_d.decode(&[0.7], &state, 0).unwrap();
        assert_eq!(rpm, vertical.decode(&[0.0, 0.0, 0.7], &state, 0).unwrap());
        assert_ne!(rpm, lateral.decode(&[0.7, 0.0, 0.0], &state, 0).unwrap());
    }

    #[test]
    fn thr_feeds_motor_thrusts_to_attitude_loop() {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        let action = [0.5, -0.5, 0.25, 0.0];
        let g = params.gravity;
        assert_eq!(motor_thrusts(g, &action), Vector4::new(g * 1.5, g * 0.5, g * 1.25, g));

        let mut state = hovering(DroneModel::Cf2x);
        state.set_orientation(UnitQuaternion::from_euler_angles(0.1, 0.0, 0.0));
        let mut ctrl = DslPidControl::new(&params);
        let expected = ctrl.attitude_control(
            1.0 / 240.0,
            &motor_thrusts(g, &action),
            &state.quaternion,
            &state.rpy,
            &state.angular_velocity,
        );

        let mut dec = decoder(ActionType::Thr, DroneModel::Cf2x).unwrap();
        let rpm = dec.decode(&action, &state, 0).unwrap();
        assert_eq!(rpm, clipped(expected, &params));
    }

    #[test]
    fn vel_tracks_three_percent_of_max_speed() {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        let state = hovering(DroneModel::Cf2x);
        let speed = 0.03 * params.max_speed() * 0.5;
        let target = ControlTarget::position(state.position)
            .with_rpy(Vector3::new(0.0, 0.0, state.yaw()))
            .with_velocity(Vector3::new(speed, 0.0, 0.0));
        let mut ctrl = position_controller_for(DroneModel::Cf2x).unwrap();
        let expected = ctrl.compute_control(1.0 / 240.0, &state, &target).rpm;

        let mut dec = decoder(ActionType::Vel, DroneModel::Cf2x).unwrap();
        let rpm = dec.decode(&[1.0, 0.0, 0.0, 0.5], &state, 0).unwrap();
        assert_eq!(rpm, clipped(expected, &params));
    }
}
