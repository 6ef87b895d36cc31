//! Closed-loop flight controllers consumed by the action decoder.
//!
//! Two PID implementations are provided: [`DslPidControl`] for the Crazyflie
//! airframes and [`SimplePidControl`] for the generic `hb` quadrotor. Both are
//! driven through [`PositionController`]; only the DSL controller exposes an
//! attitude-only loop through [`AttitudeController`].

pub mod dsl_pid;
pub mod rpm_solver;
pub mod simple_pid;

pub use crate::control::dsl_pid::DslPidControl;
pub use crate::control::rpm_solver::{nnls, nnls_rpm};
pub use crate::control::simple_pid::SimplePidControl;

use nalgebra::{UnitQuaternion, Vector3, Vector4};

use crate::drone::{DroneModel, DroneParams, DroneState};
use crate::error::Result;

/// The six gain groups of a cascaded position/attitude PID.
#[derive(Debug, Clone, PartialEq)]
pub struct PidGains {
    pub p_pos: Vector3<f64>,
    pub i_pos: Vector3<f64>,
    pub d_pos: Vector3<f64>,
    pub p_att: Vector3<f64>,
    pub i_att: Vector3<f64>,
    pub d_att: Vector3<f64>,
}

impl PidGains {
    /// Reference gains used as the unit of the TUN action.
    pub fn reference(model: DroneModel) -> Self {
        match model {
            DroneModel::Cf2x | DroneModel::Cf2p => PidGains {
                p_pos: Vector3::new(0.4, 0.4, 1.25),
                i_pos: Vector3::new(0.05, 0.05, 0.05),
                d_pos: Vector3::new(0.2, 0.2, 0.5),
                p_att: Vector3::new(70000.0, 70000.0, 60000.0),
                i_att: Vector3::new(0.0, 0.0, 500.0),
                d_att: Vector3::new(20000.0, 20000.0, 12000.0),
            },
            DroneModel::Hb => PidGains {
                p_pos: Vector3::new(0.1, 0.1, 0.2),
                i_pos: Vector3::repeat(0.0001),
                d_pos: Vector3::new(0.3, 0.3, 0.4),
                p_att: Vector3::new(0.3, 0.3, 0.05),
                i_att: Vector3::repeat(0.0001),
                d_att: Vector3::new(0.3, 0.3, 0.5),
            },
        }
    }

    /// Multiplies each gain group by its own factor, in the order
    /// position P, I, D then attitude P, I, D.
    pub fn scaled(&self, factors: [f64; 6]) -> Self {
        PidGains {
            p_pos: self.p_pos * factors[0],
            i_pos: self.i_pos * factors[1],
            d_pos: self.d_pos * factors[2],
            p_att: self.p_att * factors[3],
            i_att: self.i_att * factors[4],
            d_att: self.d_att * factors[5],
        }
    }
}

/// Setpoint for a position controller call.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlTarget {
    pub position: Vector3<f64>,
    pub rpy: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub rpy_rates: Vector3<f64>,
}

impl ControlTarget {
    /// Hold `position` with zero attitude, velocity and rates.
    pub fn position(position: Vector3<f64>) -> Self {
        ControlTarget {
            position,
            rpy: Vector3::zeros(),
            velocity: Vector3::zeros(),
            rpy_rates: Vector3::zeros(),
        }
    }

    pub fn with_rpy(mut self, rpy: Vector3<f64>) -> Self {
        self.rpy = rpy;
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = velocity;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlOutput {
    pub rpm: Vector4<f64>,
    pub pos_error: Vector3<f64>,
    pub yaw_error: f64,
}

/// Position-tracking controller: state + target in, motor RPMs out.
///
/// Implementations keep integrator and derivative memory between calls.
pub trait PositionController {
    fn compute_control(
        &mut self,
        control_timestep: f64,
        state: &DroneState,
        target: &ControlTarget,
    ) -> ControlOutput;

    fn set_pid_coefficients(&mut self, gains: &PidGains);

    fn pid_coefficients(&self) -> &PidGains;

    /// Clears integrators and derivative memory.
    fn reset(&mut self);
}

/// Attitude-only loop taking a per-motor thrust command.
pub trait AttitudeController {
    fn attitude_control(
        &mut self,
        control_timestep: f64,
        thrust: &Vector4<f64>,
        cur_quat: &UnitQuaternion<f64>,
        target_euler: &Vector3<f64>,
        target_rpy_rates: &Vector3<f64>,
    ) -> Vector4<f64>;
}

/// Picks the position controller matching `model`.
pub fn position_controller_for(model: DroneModel) -> Result<Box<dyn PositionController>> {
    let params = DroneParams::for_model(model)?;
    Ok(match model {
        DroneModel::Cf2x | DroneModel::Cf2p => Box::new(DslPidControl::new(&params)),
        DroneModel::Hb => Box::new(SimplePidControl::new(params)),
    })
}
