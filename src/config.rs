use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::drone::DroneModel;
use crate::error::{EnvError, Result};
use crate::reward::TerminationConfig;
use crate::spaces::{ActionType, ObservationType};

/// Largest accepted camera width or height (pixels).
pub const MAX_IMG_SIDE: u32 = 4096;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DroneConfig {
    pub model: DroneModel,
    pub initial_xyz: (f64, f64, f64),
    pub initial_rpy: (f64, f64, f64),
}

impl Default for DroneConfig {
    fn default() -> Self {
        DroneConfig {
            model: DroneModel::Cf2x,
            initial_xyz: (0.0, 0.0, 1.0),
            initial_rpy: (0.0, 0.0, 0.0),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Physics steps per second
    pub freq: u32,
    /// Physics steps per environment step
    pub aggregate_phy_steps: u32,
    /// Save onboard camera frames
    pub record: bool,
    pub output_folder: PathBuf,
    /// Camera resolution (width, height)
    pub img_res: (u32, u32),
    pub img_frames_per_sec: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            freq: 240,
            aggregate_phy_steps: 1,
            record: false,
            output_folder: PathBuf::from("results"),
            img_res: (64, 48),
            img_frames_per_sec: 24,
        }
    }
}

impl SimulationConfig {
    /// Duration of one environment step (s).
    pub fn control_timestep(&self) -> f64 {
        self.aggregate_phy_steps as f64 / self.freq as f64
    }

    /// Physics steps between two camera captures.
    pub fn img_capture_period(&self) -> u32 {
        self.freq / self.img_frames_per_sec.max(1)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub obs: ObservationType,
    pub act: ActionType,
    pub termination: TerminationConfig,
    /// Initial target; defaults to the initial drone position
    pub target: Option<(f64, f64, f64)>,
    pub visual_target: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            obs: ObservationType::Kin,
            act: ActionType::Rpm,
            termination: TerminationConfig::default(),
            target: None,
            visual_target: false,
        }
    }
}

/// Reference trajectory flown by the `tun` action type.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TuningConfig {
    /// Three comma separated expressions in `t`
    pub trajectory_fn: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EnvConfig {
    pub drone: DroneConfig,
    pub simulation: SimulationConfig,
    pub environment: EnvironmentConfig,
    pub tuning: Option<TuningConfig>,
}

impl EnvConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: EnvConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml_string = serde_yaml::to_string(self)?;
        fs::write(path, yaml_string)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if sim.freq == 0 {
            return Err(EnvError::InvalidConfig("simulation.freq must be positive".into()));
        }
        if sim.aggregate_phy_steps == 0 {
            return Err(EnvError::InvalidConfig(
                "simulation.aggregate_phy_steps must be positive".into(),
            ));
        }
        if self.environment.obs == ObservationType::Rgb {
            let period = sim.img_capture_period();
            if period == 0 || period % sim.aggregate_phy_steps != 0 {
                return Err(EnvError::InvalidConfig(format!(
                    "image capture period {} (freq {} / {} fps) must be a positive \
                     multiple of aggregate_phy_steps {}",
                    period, sim.freq, sim.img_frames_per_sec, sim.aggregate_phy_steps
                )));
            }
            let (width, height) = sim.img_res;
            if width == 0 || height == 0 || width > MAX_IMG_SIDE || height > MAX_IMG_SIDE {
                return Err(EnvError::InvalidConfig(format!(
                    "simulation.img_res {}x{} must be within 1..={} per side",
                    width, height, MAX_IMG_SIDE
                )));
            }
        }
        Ok(())
    }
}
