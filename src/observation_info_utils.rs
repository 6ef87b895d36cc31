use log::debug;
use nalgebra::{Rotation3, Vector3};
use std::path::PathBuf;

use crate::drone::DroneState;
use crate::error::Result;
use crate::physics::{Image, PhysicsBackend};
use crate::spaces::{BoxSpace, ObservationType, KIN_OBS_SIZE};

#[cfg(feature = "python")]
use numpy::{ndarray::Array3, PyArray1, PyArray3};
#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyDict;
#[cfg(feature = "python")]
use pyo3::IntoPyObjectExt;

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Target offset [3], velocity [3], angular velocity [3], rotation matrix
    /// row-major [9]. Not clipped to the declared bounds.
    Kinematic([f64; KIN_OBS_SIZE]),
    Image(Image),
}

impl Observation {
    pub fn as_kinematic(&self) -> Option<&[f64; KIN_OBS_SIZE]> {
        match self {
            Observation::Kinematic(values) => Some(values),
            Observation::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Observation::Image(image) => Some(image),
            Observation::Kinematic(_) => None,
        }
    }

    /// Shape as declared by the observation space.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Observation::Kinematic(_) => vec![KIN_OBS_SIZE],
            Observation::Image(image) => image.shape().to_vec(),
        }
    }

    // Convert to a numpy array: float64 (18,) or uint8 (H, W, 4)
    #[cfg(feature = "python")]
    pub fn to_numpy(&self, py: Python) -> PyResult<PyObject> {
        match self {
            Observation::Kinematic(values) => PyArray1::from_slice(py, &values[..]).into_py_any(py),
            Observation::Image(image) => {
                let [h, w, c] = image.shape();
                let array = Array3::from_shape_vec((h, w, c), image.data.clone()).map_err(|e| {
                    pyo3::exceptions::PyValueError::new_err(format!("bad image buffer: {}", e))
                })?;
                PyArray3::from_owned_array(py, array).into_py_any(py)
            }
        }
    }
}

/// Kinematic observation of `state` relative to `target`.
pub fn kinematic_observation(state: &DroneState, target: &Vector3<f64>) -> [f64; KIN_OBS_SIZE] {
    let diff = target - state.position;
    let rotation = Rotation3::from_euler_angles(state.rpy.x, state.rpy.y, state.rpy.z);
    let matrix = rotation.matrix();

    let mut obs = [0.0; KIN_OBS_SIZE];
    obs[0..3].copy_from_slice(diff.as_slice());
    obs[3..6].copy_from_slice(state.velocity.as_slice());
    obs[6..9].copy_from_slice(state.angular_velocity.as_slice());
    for row in 0..3 {
        for col in 0..3 {
            obs[9 + row * 3 + col] = matrix[(row, col)];
        }
    }
    obs
}

/// Builds observations of the configured kind, caching camera frames between captures.
pub struct ObservationEncoder {
    obs_type: ObservationType,
    img_res: (u32, u32),
    capture_period: u64,
    record_folder: Option<PathBuf>,
    last_image: Option<Image>,
}

impl ObservationEncoder {
    /// `capture_period` is in physics steps; `record_folder` enables PNG output.
    pub fn new(
        obs_type: ObservationType,
        img_res: (u32, u32),
        capture_period: u64,
        record_folder: Option<PathBuf>,
    ) -> Self {
        ObservationEncoder {
            obs_type,
            img_res,
            capture_period: capture_period.max(1),
            record_folder,
            last_image: None,
        }
    }

    pub fn space(&self) -> BoxSpace {
        self.obs_type.space(self.img_res)
    }

    /// Drops the cached frame.
    pub fn reset(&mut self) {
        self.last_image = None;
    }

    pub fn encode(
        &mut self,
        state: &DroneState,
        target: &Vector3<f64>,
        step_counter: u64,
        physics: &mut dyn PhysicsBackend,
    ) -> Result<Observation> {
        match self.obs_type {
            ObservationType::Kin => {
                Ok(Observation::Kinematic(kinematic_observation(state, target)))
            }
            ObservationType::Rgb => {
                let due = step_counter % self.capture_period == 0;
                let cached = if due { None } else { self.last_image.clone() };
                let image = match cached {
                    Some(image) => image,
                    None => {
                        // The cache is only replaced once a capture succeeded.
                        let image = self.capture(step_counter, physics)?;
                        self.last_image = Some(image.clone());
                        image
                    }
                };
                Ok(Observation::Image(image))
            }
        }
    }

    fn capture(&self, step_counter: u64, physics: &mut dyn PhysicsBackend) -> Result<Image> {
        let image = physics.capture_image(self.img_res)?;
        if let Some(folder) = &self.record_folder {
            let frame = step_counter / self.capture_period;
            let path = folder.join(format!("frame_{}.png", frame));
            image.save_png(&path)?;
            debug!("saved onboard frame {}", path.display());
        }
        Ok(image)
    }
}

/// Per-step info payload. Carries no diagnostics beyond the clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Information {
    pub step_counter: u64,
    pub time: f64,
}

impl Information {
    #[cfg(feature = "python")]
    pub fn to_py_dict(&self, py: Python) -> PyResult<Py<PyDict>> {
        let dict = PyDict::new(py);

        dict.set_item("step_counter", self.step_counter)?;
        dict.set_item("time", self.time)?;

        Ok(dict.unbind())
    }
}
