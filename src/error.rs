use thiserror::Error;

use crate::drone::DroneModel;
use crate::spaces::ActionType;

/// Errors raised while building or driving a [`crate::DroneEnvironment`].
///
/// Everything except `ActionWidth` describes an unusable configuration and is
/// reported from construction.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("unknown observation type: {0}")]
    UnknownObservationType(String),

    #[error("unknown drone model: {0}")]
    UnknownDroneModel(String),

    #[error("no controller is available for drone model {model} with action type {action}")]
    UnsupportedController { model: DroneModel, action: ActionType },

    #[error("action type tun requires a trajectory tracker")]
    MissingTrajectoryTracker,

    #[error("action must have {expected} elements, got {got}")]
    ActionWidth { expected: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("expression error: {0}")]
    Expression(#[from] meval::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, EnvError>;
