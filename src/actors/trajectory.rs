use meval::{Context, Expr};
use nalgebra::{Vector3, Vector4};

use crate::control::{ControlTarget, PositionController};
use crate::drone::DroneState;
use crate::error::{EnvError, Result};

/// What a trajectory tracker gets to work with on each tick.
pub struct TrackingContext<'a> {
    /// Controller whose gains were just set from the action
    pub controller: &'a mut dyn PositionController,
    pub state: &'a DroneState,
    pub control_timestep: f64,
    pub step_counter: u64,
    pub sim_freq: u32,
}

impl TrackingContext<'_> {
    /// Elapsed simulated time (s).
    pub fn time(&self) -> f64 {
        self.step_counter as f64 / self.sim_freq as f64
    }
}

/// Capability required by the `tun` action type: fly a reference trajectory
/// with the freshly tuned controller and return the motor RPMs.
pub trait TrajectoryTracker {
    fn trajectory_tracking_rpms(&mut self, ctx: TrackingContext<'_>) -> Result<Vector4<f64>>;
}

/// Reference trajectory given as three expressions in `t`, e.g.
/// `"0.5*cos(t), 0.5*sin(t), 1"`.
#[derive(Debug, Clone)]
pub struct ExpressionTrajectory {
    source: String,
    components: [Expr; 3],
}

impl ExpressionTrajectory {
    pub fn parse(trajectory_fn: &str) -> Result<Self> {
        let parts = split_top_level(trajectory_fn);
        if parts.len() != 3 {
            return Err(EnvError::InvalidConfig(format!(
                "trajectory '{}' needs 3 comma separated expressions, got {}",
                trajectory_fn,
                parts.len()
            )));
        }
        let x: Expr = parts[0].parse()?;
        let y: Expr = parts[1].parse()?;
        let z: Expr = parts[2].parse()?;

        let trajectory = ExpressionTrajectory {
            source: trajectory_fn.to_string(),
            components: [x, y, z],
        };
        // Surfaces unknown variables and functions at construction.
        trajectory.position_at(0.0)?;
        Ok(trajectory)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn position_at(&self, t: f64) -> Result<Vector3<f64>> {
        let mut out = Vector3::zeros();
        for (i, expr) in self.components.iter().enumerate() {
            let mut ctx = Context::new();
            ctx.var("t", t);
            out[i] = expr.eval_with_context(ctx)?;
        }
        Ok(out)
    }
}

impl TrajectoryTracker for ExpressionTrajectory {
    fn trajectory_tracking_rpms(&mut self, ctx: TrackingContext<'_>) -> Result<Vector4<f64>> {
        let target = self.position_at(ctx.time())?;
        let output = ctx.controller.compute_control(
            ctx.control_timestep,
            ctx.state,
            &ControlTarget::position(target),
        );
        Ok(output.rpm)
    }
}

/// Splits on commas that are not nested inside parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::DslPidControl;
    use crate::drone::{DroneModel, DroneParams};

    #[test]
    fn evaluates_each_axis() {
        let traj = ExpressionTrajectory::parse("0.5*cos(t), 0.5*sin(t), 1 + t").unwrap();
        let p = traj.position_at(0.0).unwrap();
        assert!((p - Vector3::new(0.5, 0.0, 1.0)).norm() < 1e-12);
        let p = traj.position_at(2.0).unwrap();
        assert!((p.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn nested_commas_are_kept() {
        let traj = ExpressionTrajectory::parse("max(t, 1), 0, min(t, 2)").unwrap();
        assert_eq!(traj.position_at(3.0).unwrap(), Vector3::new(3.0, 0.0, 2.0));
    }

    #[test]
    fn rejects_wrong_arity_and_unknown_variables() {
        assert!(matches!(
            ExpressionTrajectory::parse("t, t"),
            Err(EnvError::InvalidConfig(_))
        ));
        assert!(matches!(
            ExpressionTrajectory::parse("t, q, 1"),
            Err(EnvError::Expression(_))
        ));
    }

    #[test]
    fn tracks_with_given_controller() {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        let mut ctrl = DslPidControl::new(&params);
        let mut traj = ExpressionTrajectory::parse("0, 0, 1").unwrap();
        let state = DroneState::hovering(Vector3::new(0.0, 0.0, 1.0), params.hover_rpm);
        let rpm = traj
            .trajectory_tracking_rpms(TrackingContext {
                controller: &mut ctrl,
                state: &state,
                control_timestep: 1.0 / 240.0,
                step_counter: 0,
                sim_freq: 240,
            })
            .unwrap();
        for v in rpm.iter() {
            assert!((v - params.hover_rpm).abs() < 0.01 * params.hover_rpm);
        }
    }
}
