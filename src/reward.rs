//! Reward shaping and episode termination.

use nalgebra::{Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::action::rpm_to_action;
use crate::drone::DroneState;

/// Reward for sitting exactly on the target, level, still and at hover.
pub const MAX_REWARD: f64 = 2.0;

const POSITION_WEIGHT: f64 = 1.0;
const VELOCITY_WEIGHT: f64 = 0.04;
const ATTITUDE_WEIGHT: f64 = 0.02;
const ACTION_WEIGHT: f64 = 0.02;
const ACTION_RATE_WEIGHT: f64 = 0.001;

/// Tracks the previously applied action to penalise its rate of change.
#[derive(Debug, Clone)]
pub struct RewardEvaluator {
    hover_rpm: f64,
    aggregate_phy_steps: u32,
    prev_action: Option<Vector4<f64>>,
}

impl RewardEvaluator {
    pub fn new(hover_rpm: f64, aggregate_phy_steps: u32) -> Self {
        RewardEvaluator {
            hover_rpm,
            aggregate_phy_steps,
            prev_action: None,
        }
    }

    /// Forgets the previous action; the next reward sees no action change.
    pub fn reset(&mut self) {
        self.prev_action = None;
    }

    pub fn previous_action(&self) -> Option<&Vector4<f64>> {
        self.prev_action.as_ref()
    }

    pub fn compute_reward(&mut self, state: &DroneState, target: &Vector3<f64>) -> f64 {
        let action = rpm_to_action(&state.last_rpm, self.hover_rpm);
        let prev = self.prev_action.replace(action).unwrap_or(action);
        let da = (action - prev) / self.aggregate_phy_steps as f64;

        let pos_err = (state.position - target).norm();
        let vel_err = state.velocity.norm();
        let att_err = state.rpy.norm();
        let act_err = action.norm();

        MAX_REWARD
            - POSITION_WEIGHT * pos_err
            - VELOCITY_WEIGHT * vel_err
            - ATTITUDE_WEIGHT * att_err
            - ACTION_WEIGHT * act_err
            - ACTION_RATE_WEIGHT * da.norm()
    }
}

/// Conditions ending an episode. All comparisons are strict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    /// Bound on |x|, |y| and |z| (m)
    pub position_limit: f64,
    /// Minimum altitude (m)
    pub min_altitude: f64,
    /// Bound on |roll|, |pitch| and |yaw| (rad)
    pub attitude_limit: f64,
    /// Episode length (s); `None` disables the time limit
    pub time_limit_sec: Option<f64>,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        TerminationConfig {
            position_limit: 3.0,
            min_altitude: 0.02,
            attitude_limit: FRAC_PI_2,
            time_limit_sec: None,
        }
    }
}

impl TerminationConfig {
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_sec = Some(seconds);
        self
    }

    pub fn out_of_bounds(&self, state: &DroneState) -> bool {
        // Signed altitude: a backend reporting z below the floor counts as crashed.
        state.position.iter().any(|p| p.abs() > self.position_limit)
            || state.position.z < self.min_altitude
    }

    pub fn flipped(&self, state: &DroneState) -> bool {
        state.rpy.iter().any(|a| a.abs() > self.attitude_limit)
    }

    pub fn timed_out(&self, step_counter: u64, sim_freq: u32) -> bool {
        match self.time_limit_sec {
            Some(limit) => step_counter as f64 / sim_freq as f64 > limit,
            None => false,
        }
    }

    pub fn is_done(&self, state: &DroneState, step_counter: u64, sim_freq: u32) -> bool {
        self.out_of_bounds(state) || self.flipped(state) || self.timed_out(step_counter, sim_freq)
    }
}
