pub mod action;
pub mod actors;
pub mod config;
pub mod control;
pub mod drone;
pub mod error;
pub mod observation_info_utils;
pub mod physics;
pub mod reward;
pub mod spaces;

use log::{debug, info};
use nalgebra::Vector3;
use std::fs;

use action::ActionDecoder;
use actors::{Actor, ExpressionTrajectory, TargetManager, TrajectoryTracker};
pub use config::EnvConfig;
use drone::{DroneParams, DroneState};
pub use error::{EnvError, Result};
pub use observation_info_utils::{Information, Observation};
use observation_info_utils::ObservationEncoder;
use physics::{BodyKind, PhysicsBackend, SimplePhysics};
use reward::{RewardEvaluator, TerminationConfig};
use spaces::{BoxSpace, ObservationType};

/// Landmarks placed around the origin for camera observations.
const LANDMARKS: [(BodyKind, [f64; 3]); 4] = [
    (BodyKind::Block, [1.0, 0.0, 0.1]),
    (BodyKind::Cube, [0.0, 1.0, 0.1]),
    (BodyKind::Duck, [-1.0, 0.0, 0.1]),
    (BodyKind::Teddy, [0.0, -1.0, 0.1]),
];

/// Result of one environment step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: Information,
}

// Single drone environment for RL training
pub struct DroneEnvironment {
    config: EnvConfig,
    physics: Box<dyn PhysicsBackend>,
    decoder: ActionDecoder,
    encoder: ObservationEncoder,
    reward: RewardEvaluator,
    termination: TerminationConfig,
    target: TargetManager,
    initial_state: DroneState,
    step_counter: u64,
}

impl DroneEnvironment {
    /// Builds the environment around `physics`. `tracker` is required for the
    /// `tun` action type and ignored otherwise.
    pub fn new(
        config: EnvConfig,
        mut physics: Box<dyn PhysicsBackend>,
        tracker: Option<Box<dyn TrajectoryTracker>>,
    ) -> Result<Self> {
        config.validate()?;
        let params = DroneParams::for_model(config.drone.model)?;
        let sim = &config.simulation;
        let env_config = &config.environment;

        let decoder = ActionDecoder::new(
            env_config.act,
            params.clone(),
            sim.control_timestep(),
            sim.freq,
            tracker,
        )?;

        let record_folder = if sim.record {
            fs::create_dir_all(&sim.output_folder)?;
            Some(sim.output_folder.clone())
        } else {
            None
        };
        let encoder = ObservationEncoder::new(
            env_config.obs,
            sim.img_res,
            sim.img_capture_period() as u64,
            record_folder,
        );

        let initial_state = DroneState::at_rest(
            actors::actor::tuple_to_vector3(config.drone.initial_xyz),
            actors::actor::tuple_to_vector3(config.drone.initial_rpy),
        );
        physics.reset(&initial_state);

        if env_config.obs == ObservationType::Rgb {
            for (kind, [x, y, z]) in LANDMARKS {
                physics.spawn_body(kind, Vector3::new(x, y, z));
            }
        }

        let target_position = env_config
            .target
            .map(actors::actor::tuple_to_vector3)
            .unwrap_or(initial_state.position);
        let mut target = TargetManager::new(target_position);
        if env_config.visual_target {
            target.set(target_position, true, physics.as_mut());
        }

        info!(
            "drone environment ready: {} drone, {} actions, {} observations, {} Hz x {}",
            params.model, env_config.act, env_config.obs, sim.freq, sim.aggregate_phy_steps
        );

        Ok(DroneEnvironment {
            reward: RewardEvaluator::new(params.hover_rpm, sim.aggregate_phy_steps),
            termination: env_config.termination.clone(),
            config,
            physics,
            decoder,
            encoder,
            target,
            initial_state,
            step_counter: 0,
        })
    }

    /// Create DroneEnvironment from configuration struct, simulated by [`SimplePhysics`]
    pub fn from_config(config: EnvConfig) -> Result<Self> {
        let params = DroneParams::for_model(config.drone.model)?;
        let initial = DroneState::at_rest(
            actors::actor::tuple_to_vector3(config.drone.initial_xyz),
            actors::actor::tuple_to_vector3(config.drone.initial_rpy),
        );
        let timestep = 1.0 / config.simulation.freq.max(1) as f64;
        let physics = SimplePhysics::new(params, timestep, initial);

        let tracker: Option<Box<dyn TrajectoryTracker>> = match &config.tuning {
            Some(tuning) => Some(Box::new(ExpressionTrajectory::parse(&tuning.trajectory_fn)?)),
            None => None,
        };

        Self::new(config, Box::new(physics), tracker)
    }

    /// Create DroneEnvironment from YAML configuration file
    pub fn from_yaml_config<P: AsRef<std::path::Path>>(config_path: P) -> Result<Self> {
        let config = EnvConfig::from_yaml_file(config_path)?;
        Self::from_config(config)
    }

    pub fn reset(&mut self) -> Result<Observation> {
        self.physics.reset(&self.initial_state);
        self.decoder.reset();
        self.reward.reset();
        self.encoder.reset();
        self.step_counter = 0;
        info!("episode reset");

        self.compute_observation()
    }

    pub fn step(&mut self, action: &[f64]) -> Result<StepOutcome> {
        let state = self.physics.drone_state();
        let rpm = self.decoder.decode(action, &state, self.step_counter)?;

        let aggregate = self.config.simulation.aggregate_phy_steps;
        for _ in 0..aggregate {
            self.physics.apply_rpm(&rpm);
        }
        self.step_counter += aggregate as u64;

        let observation = self.compute_observation()?;
        let reward = self.compute_reward();
        let done = self.compute_done();
        debug!("step {}: reward {:.4}, done {}", self.step_counter, reward, done);

        Ok(StepOutcome {
            observation,
            reward,
            done,
            info: self.information(),
        })
    }

    pub fn compute_observation(&mut self) -> Result<Observation> {
        let state = self.physics.drone_state();
        let target = self.target.position();
        self.encoder.encode(&state, &target, self.step_counter, self.physics.as_mut())
    }

    /// Updates the stored previous action.
    pub fn compute_reward(&mut self) -> f64 {
        let state = self.physics.drone_state();
        self.reward.compute_reward(&state, &self.target.position())
    }

    pub fn compute_done(&self) -> bool {
        self.termination.is_done(
            &self.physics.drone_state(),
            self.step_counter,
            self.config.simulation.freq,
        )
    }

    /// Moves the target and clears the previous action used by the reward.
    pub fn set_target(&mut self, position: Vector3<f64>, visual: bool) {
        self.target.set(position, visual, self.physics.as_mut());
        self.reward.reset();
    }

    pub fn target(&self) -> Vector3<f64> {
        self.target.position()
    }

    /// Scene handle of the target marker, if one was spawned.
    pub fn target_marker(&self) -> Option<physics::BodyId> {
        self.target.marker()
    }

    pub fn action_space(&self) -> BoxSpace {
        self.decoder.space()
    }

    pub fn observation_space(&self) -> BoxSpace {
        self.encoder.space()
    }

    pub fn state(&self) -> DroneState {
        self.physics.drone_state()
    }

    pub fn physics(&self) -> &dyn PhysicsBackend {
        self.physics.as_ref()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Physics steps taken since the last reset.
    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    pub fn information(&self) -> Information {
        Information {
            step_counter: self.step_counter,
            time: self.step_counter as f64 / self.config.simulation.freq as f64,
        }
    }
}

#[cfg(feature = "python")]
mod python {
    use pyo3::exceptions::{PyIOError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::{PyDict, PyTuple};
    use pyo3::IntoPyObjectExt;

    use crate::spaces::BoxSpace;
    use crate::{DroneEnvironment, EnvConfig, EnvError};

    fn to_py_err(e: EnvError) -> PyErr {
        match e {
            EnvError::Io(_) | EnvError::Yaml(_) | EnvError::Image(_) => {
                PyIOError::new_err(e.to_string())
            }
            other => PyValueError::new_err(other.to_string()),
        }
    }

    fn space_to_py_dict(py: Python, space: &BoxSpace) -> PyResult<Py<PyDict>> {
        let dict = PyDict::new(py);

        dict.set_item("shape", space.shape.clone())?;
        dict.set_item("low", space.low.clone())?;
        dict.set_item("high", space.high.clone())?;
        dict.set_item("dtype", space.dtype.name())?;

        Ok(dict.unbind())
    }

    #[pyclass(unsendable)]
    struct DroneEnvWrapper {
        drone_environment: DroneEnvironment,
    }

    #[pymethods]
    impl DroneEnvWrapper {
        #[new]
        #[pyo3(signature = (config_path=None))]
        fn new(config_path: Option<String>) -> PyResult<Self> {
            let drone_environment = match config_path {
                Some(path) => DroneEnvironment::from_yaml_config(path),
                None => DroneEnvironment::from_config(EnvConfig::default()),
            }
            .map_err(to_py_err)?;
            Ok(DroneEnvWrapper { drone_environment })
        }

        fn reset(&mut self) -> PyResult<PyObject> {
            let obs = self.drone_environment.reset().map_err(to_py_err)?;
            Python::with_gil(|py| obs.to_numpy(py))
        }

        /// Returns `(observation, reward, done, info)`
        fn step(&mut self, action: Vec<f64>) -> PyResult<Py<PyTuple>> {
            let outcome = self.drone_environment.step(&action).map_err(to_py_err)?;

            Python::with_gil(|py| {
                let observation = outcome.observation.to_numpy(py)?;
                let reward = outcome.reward.into_py_any(py)?;
                let done = outcome.done.into_py_any(py)?;
                let info = outcome.info.to_py_dict(py)?.into_py_any(py)?;

                let result = PyTuple::new(py, &[observation, reward, done, info])?;
                Ok(result.unbind())
            })
        }

        #[pyo3(signature = (position, visual=true))]
        fn set_target(&mut self, position: (f64, f64, f64), visual: bool) {
            self.drone_environment
                .set_target(crate::actors::actor::tuple_to_vector3(position), visual);
        }

        fn get_target(&self) -> (f64, f64, f64) {
            crate::actors::actor::vector3_to_tuple(self.drone_environment.target())
        }

        fn action_space(&self) -> PyResult<Py<PyDict>> {
            Python::with_gil(|py| space_to_py_dict(py, &self.drone_environment.action_space()))
        }

        fn observation_space(&self) -> PyResult<Py<PyDict>> {
            Python::with_gil(|py| {
                space_to_py_dict(py, &self.drone_environment.observation_space())
            })
        }

        fn get_information(&self) -> PyResult<Py<PyDict>> {
            Python::with_gil(|py| self.drone_environment.information().to_py_dict(py))
        }
    }

    // Python module definition
    #[pymodule]
    #[pyo3(name = "_lib")]
    fn single_drone_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
        pyo3_log::init();
        m.add_class::<DroneEnvWrapper>()?;
        Ok(())
    }
}
