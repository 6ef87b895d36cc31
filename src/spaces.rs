use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EnvError;

/// Length of the kinematic observation vector.
pub const KIN_OBS_SIZE: usize = 18;

/// Encoding of the action vector handed to [`crate::DroneEnvironment::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Per-motor RPM offsets around hover
    Rpm,
    /// Desired thrust and torques
    Dyn,
    /// Per-motor thrusts fed to the attitude controller
    Thr,
    /// Position displacement tracked by PID control
    Pid,
    /// Velocity input tracked by PID control
    Vel,
    /// Rescaling of the PID gains of the controller
    Tun,
    /// Same RPM offset on all motors
    OneDRpm,
    /// Collective thrust only
    OneDDyn,
    /// Vertical displacement tracked by PID control
    OneDPid,
}

impl ActionType {
    pub const ALL: [ActionType; 9] = [
        ActionType::Rpm,
        ActionType::Dyn,
        ActionType::Thr,
        ActionType::Pid,
        ActionType::Vel,
        ActionType::Tun,
        ActionType::OneDRpm,
        ActionType::OneDDyn,
        ActionType::OneDPid,
    ];

    /// Number of elements the action vector must have.
    pub fn width(self) -> usize {
        match self {
            ActionType::Tun => 6,
            ActionType::Rpm | ActionType::Dyn | ActionType::Vel | ActionType::Thr => 4,
            ActionType::Pid => 3,
            ActionType::OneDRpm | ActionType::OneDDyn | ActionType::OneDPid => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionType::Rpm => "rpm",
            ActionType::Dyn => "dyn",
            ActionType::Thr => "thr",
            ActionType::Pid => "pid",
            ActionType::Vel => "vel",
            ActionType::Tun => "tun",
            ActionType::OneDRpm => "one_d_rpm",
            ActionType::OneDDyn => "one_d_dyn",
            ActionType::OneDPid => "one_d_pid",
        }
    }

    pub fn space(self) -> BoxSpace {
        let size = self.width();
        BoxSpace {
            shape: vec![size],
            low: vec![-1.0; size],
            high: vec![1.0; size],
            dtype: ElementType::F32,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionType {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| EnvError::UnknownActionType(s.to_string()))
    }
}

/// Kind of observation produced each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    /// Target offset, velocities and rotation matrix
    Kin,
    /// Onboard camera capture
    Rgb,
}

impl ObservationType {
    pub fn name(self) -> &'static str {
        match self {
            ObservationType::Kin => "kin",
            ObservationType::Rgb => "rgb",
        }
    }

    /// Observation space; `img_res` is `(width, height)` and only used for RGB.
    pub fn space(self, img_res: (u32, u32)) -> BoxSpace {
        match self {
            ObservationType::Kin => BoxSpace {
                shape: vec![KIN_OBS_SIZE],
                low: vec![-1.0; KIN_OBS_SIZE],
                high: vec![1.0; KIN_OBS_SIZE],
                dtype: ElementType::F32,
            },
            ObservationType::Rgb => {
                let (w, h) = (img_res.0 as usize, img_res.1 as usize);
                BoxSpace {
                    shape: vec![h, w, 4],
                    low: vec![0.0],
                    high: vec![255.0],
                    dtype: ElementType::U8,
                }
            }
        }
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObservationType {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kin" => Ok(ObservationType::Kin),
            "rgb" => Ok(ObservationType::Rgb),
            other => Err(EnvError::UnknownObservationType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    U8,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::F32 => "float32",
            ElementType::U8 => "uint8",
        }
    }
}

/// Shape and bounds of a box-shaped space.
///
/// `low`/`high` hold either one bound per element or a single bound shared by
/// all elements. Bounds are advisory; nothing clips to them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    pub shape: Vec<usize>,
    pub low: Vec<f64>,
    pub high: Vec<f64>,
    pub dtype: ElementType,
}

impl BoxSpace {
    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    fn bound(bounds: &[f64], i: usize) -> f64 {
        if bounds.len() == 1 {
            bounds[0]
        } else {
            bounds[i]
        }
    }

    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.size()
            && values.iter().enumerate().all(|(i, v)| {
                *v >= Self::bound(&self.low, i) && *v <= Self::bound(&self.high, i)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_widths_match_encoding() {
        let widths: Vec<usize> = ActionType::ALL.iter().map(|a| a.width()).collect();
        assert_eq!(widths, vec![4, 4, 4, 3, 4, 6, 1, 1, 1]);
        for act in ActionType::ALL {
            assert_eq!(act.space().size(), act.width());
        }
    }

    #[test]
    fn action_type_parses_from_name() {
        for act in ActionType::ALL {
            assert_eq!(act.name().parse::<ActionType>().unwrap(), act);
        }
        assert!(matches!(
            "throttle".parse::<ActionType>(),
            Err(EnvError::UnknownActionType(_))
        ));
    }

    #[test]
    fn observation_spaces() {
        assert_eq!(ObservationType::Kin.space((64, 48)).shape, vec![18]);
        let rgb = ObservationType::Rgb.space((64, 48));
        assert_eq!(rgb.shape, vec![48, 64, 4]);
        assert_eq!(rgb.dtype, ElementType::U8);
        assert!("depth".parse::<ObservationType>().is_err());
    }

    #[test]
    fn contains_checks_length_and_bounds() {
        let space = ActionType::Pid.space();
        assert!(space.contains(&[0.0, -1.0, 1.0]));
        assert!(!space.contains(&[0.0, -1.0]));
        assert!(!space.contains(&[0.0, -1.1, 1.0]));
    }
}
