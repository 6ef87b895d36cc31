//! Interface to the physics engine that owns the drone and the scene.

pub mod simple;

pub use crate::physics::simple::SimplePhysics;

use nalgebra::{Vector3, Vector4};
use std::path::Path;

use crate::drone::DroneState;
use crate::error::{EnvError, Result};

/// Handle of a non-drone body placed in the scene.
pub type BodyId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Small cube marking the current target
    TargetMarker,
    Block,
    Cube,
    Duck,
    Teddy,
}

/// RGBA image, row-major, `height * width * 4` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    pub fn blank(width: u32, height: u32) -> Self {
        Image {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, 4]
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let buffer = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                EnvError::InvalidConfig(format!(
                    "image buffer of {} bytes does not match {}x{}",
                    self.data.len(),
                    self.width,
                    self.height
                ))
            })?;
        buffer.save(path)?;
        Ok(())
    }
}

/// Physics-engine collaborator driven by [`crate::DroneEnvironment`].
///
/// One call to [`PhysicsBackend::apply_rpm`] is one physics tick.
pub trait PhysicsBackend {
    /// Puts the drone back into `initial`. Scene bodies are kept.
    fn reset(&mut self, initial: &DroneState);

    /// Applies motor speeds for one physics tick.
    fn apply_rpm(&mut self, rpm: &Vector4<f64>);

    fn drone_state(&self) -> DroneState;

    /// Renders the onboard camera at `(width, height)`.
    fn capture_image(&mut self, resolution: (u32, u32)) -> Result<Image>;

    fn spawn_body(&mut self, kind: BodyKind, position: Vector3<f64>) -> BodyId;

    fn move_body(&mut self, id: BodyId, position: Vector3<f64>);

    fn body_count(&self) -> usize;
}
