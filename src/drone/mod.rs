pub mod state;

pub use crate::drone::state::DroneState;

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;
use std::fmt;
use std::str::FromStr;

use crate::error::{EnvError, Result};

/// Gravitational acceleration (m/s^2)
pub const G: f64 = 9.8;

/// Supported airframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneModel {
    /// Bitcraze Crazyflie 2.x in X configuration
    Cf2x,
    /// Bitcraze Crazyflie 2.x in + configuration
    Cf2p,
    /// Generic quadrotor in + configuration
    Hb,
}

impl DroneModel {
    pub fn name(self) -> &'static str {
        match self {
            DroneModel::Cf2x => "cf2x",
            DroneModel::Cf2p => "cf2p",
            DroneModel::Hb => "hb",
        }
    }

    pub fn is_x_configuration(self) -> bool {
        self == DroneModel::Cf2x
    }
}

impl fmt::Display for DroneModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DroneModel {
    type Err = EnvError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cf2x" => Ok(DroneModel::Cf2x),
            "cf2p" => Ok(DroneModel::Cf2p),
            "hb" => Ok(DroneModel::Hb),
            other => Err(EnvError::UnknownDroneModel(other.to_string())),
        }
    }
}

/// Physical constants of an airframe plus the limits derived from them.
#[derive(Debug, Clone)]
pub struct DroneParams {
    pub model: DroneModel,
    /// Mass (kg)
    pub mass: f64,
    /// Arm length (m)
    pub arm: f64,
    /// Thrust coefficient: F = kf * rpm^2
    pub kf: f64,
    /// Torque coefficient: tau = km * rpm^2
    pub km: f64,
    pub thrust2weight: f64,
    pub max_speed_kmh: f64,
    /// Diagonal of the inertia tensor (kg*m^2)
    pub inertia: Vector3<f64>,
    /// Weight force (N)
    pub gravity: f64,
    pub hover_rpm: f64,
    pub max_rpm: f64,
    pub max_thrust: f64,
    pub max_xy_torque: f64,
    pub max_z_torque: f64,
    /// Maps squared RPMs to (thrust, x torque, y torque, z torque) up to `b_coeff`
    pub a: Matrix4<f64>,
    pub inv_a: Matrix4<f64>,
    pub b_coeff: Vector4<f64>,
}

impl DroneParams {
    pub fn for_model(model: DroneModel) -> Result<Self> {
        let (mass, arm, kf, km, thrust2weight, max_speed_kmh, inertia) = match model {
            DroneModel::Cf2x | DroneModel::Cf2p => (
                0.027,
                0.0397,
                3.16e-10,
                7.94e-12,
                2.25,
                30.0,
                Vector3::new(1.4e-5, 1.4e-5, 2.17e-5),
            ),
            DroneModel::Hb => (
                0.5,
                0.175,
                6.11e-8,
                1.5e-9,
                2.0,
                50.0,
                Vector3::new(0.0023, 0.0023, 0.004),
            ),
        };

        let gravity = G * mass;
        let hover_rpm = (gravity / (4.0 * kf)).sqrt();
        let max_rpm = (thrust2weight * gravity / (4.0 * kf)).sqrt();
        let max_thrust = 4.0 * kf * max_rpm.powi(2);
        let max_xy_torque = if model.is_x_configuration() {
            2.0 * arm * kf * max_rpm.powi(2) / SQRT_2
        } else {
            arm * kf * max_rpm.powi(2)
        };
        let max_z_torque = 2.0 * km * max_rpm.powi(2);

        let a = if model.is_x_configuration() {
            let s = 1.0 / SQRT_2;
            Matrix4::new(
                1.0, 1.0, 1.0, 1.0, //
                s, s, -s, -s, //
                -s, s, s, -s, //
                -1.0, 1.0, -1.0, 1.0,
            )
        } else {
            Matrix4::new(
                1.0, 1.0, 1.0, 1.0, //
                0.0, 1.0, 0.0, -1.0, //
                -1.0, 0.0, 1.0, 0.0, //
                -1.0, 1.0, -1.0, 1.0,
            )
        };
        let inv_a = a.try_inverse().ok_or_else(|| {
            EnvError::InvalidConfig(format!("singular allocation matrix for {model}"))
        })?;
        let b_coeff = Vector4::new(1.0 / kf, 1.0 / (kf * arm), 1.0 / (kf * arm), 1.0 / km);

        Ok(DroneParams {
            model,
            mass,
            arm,
            kf,
            km,
            thrust2weight,
            max_speed_kmh,
            inertia,
            gravity,
            hover_rpm,
            max_rpm,
            max_thrust,
            max_xy_torque,
            max_z_torque,
            a,
            inv_a,
            b_coeff,
        })
    }

    pub fn inertia_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&self.inertia)
    }

    /// Maximum speed in m/s.
    pub fn max_speed(&self) -> f64 {
        self.max_speed_kmh * 1000.0 / 3600.0
    }
}
