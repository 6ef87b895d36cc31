use log::warn;
use nalgebra::{DMatrix, DVector, Matrix4, Vector3, Vector4};

use crate::drone::DroneParams;

/// Motor RPMs producing the requested collective thrust (N) and body torques (N*m).
///
/// Squared RPMs come from inverting the allocation matrix; when that asks for a
/// negative squared speed the closest non-negative solution is used instead.
pub fn nnls_rpm(params: &DroneParams, thrust: f64, torques: Vector3<f64>) -> Vector4<f64> {
    if thrust < 0.0 || thrust > params.max_thrust {
        warn!(
            "unfeasible thrust {:.4} outside range [0, {:.4}]",
            thrust, params.max_thrust
        );
    }
    if torques.x.abs() > params.max_xy_torque {
        warn!(
            "unfeasible roll torque {:.6} outside range [{:.6}, {:.6}]",
            torques.x, -params.max_xy_torque, params.max_xy_torque
        );
    }
    if torques.y.abs() > params.max_xy_torque {
        warn!(
            "unfeasible pitch torque {:.6} outside range [{:.6}, {:.6}]",
            torques.y, -params.max_xy_torque, params.max_xy_torque
        );
    }
    if torques.z.abs() > params.max_z_torque {
        warn!(
            "unfeasible yaw torque {:.6} outside range [{:.6}, {:.6}]",
            torques.z, -params.max_z_torque, params.max_z_torque
        );
    }

    let b = Vector4::new(thrust, torques.x, torques.y, torques.z).component_mul(&params.b_coeff);
    let mut sq_rpm = params.inv_a * b;
    if sq_rpm.min() < 0.0 {
        let solution = nnls(&params.a, &b);
        log::debug!(
            "negative squared rpm {:?} replaced by non-negative solution {:?}",
            sq_rpm.as_slice(),
            solution.as_slice()
        );
        sq_rpm = solution;
    }
    sq_rpm.map(|v| v.max(0.0).sqrt())
}

/// Non-negative least squares: `argmin |a x - b|` subject to `x >= 0`.
///
/// The optimum is the unconstrained least-squares solution restricted to its
/// own support, so with four unknowns every support is tried and the best
/// feasible one kept.
pub fn nnls(a: &Matrix4<f64>, b: &Vector4<f64>) -> Vector4<f64> {
    let b_dyn = DVector::from_column_slice(b.as_slice());
    let mut best = Vector4::zeros();
    let mut best_residual = b.norm();

    for support in 1u8..16 {
        let cols: Vec<usize> = (0..4).filter(|c| support & (1 << c) != 0).collect();
        let a_sub = DMatrix::from_fn(4, cols.len(), |r, c| a[(r, cols[c])]);
        let x_sub = match a_sub.clone().svd(true, true).solve(&b_dyn, 1e-12) {
            Ok(x) => x,
            Err(_) => continue,
        };
        if x_sub.iter().any(|v| *v < 0.0) {
            continue;
        }
        let residual = (&a_sub * &x_sub - &b_dyn).norm();
        if residual < best_residual - 1e-12 * best_residual.max(1.0) {
            best_residual = residual;
            best = Vector4::zeros();
            for (i, col) in cols.iter().enumerate() {
                best[*col] = x_sub[i];
            }
        }
    }
    best
}
