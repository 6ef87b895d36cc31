use log::info;
use nalgebra::Vector3;

use crate::actors::actor::Actor;
use crate::physics::{BodyId, BodyKind, PhysicsBackend};

/// Position the drone is asked to reach, optionally shown as a cube in the scene.
#[derive(Clone, Debug)]
pub struct TargetManager {
    position: Vector3<f64>,
    marker: Option<BodyId>,
}

impl Actor for TargetManager {
    fn position(&self) -> Vector3<f64> {
        self.position
    }
}

impl TargetManager {
    pub fn new(position: Vector3<f64>) -> Self {
        TargetManager {
            position,
            marker: None,
        }
    }

    /// Stores `position` as the active target. With `visual`, the marker is
    /// spawned on first use and moved in place afterwards.
    pub fn set(&mut self, position: Vector3<f64>, visual: bool, physics: &mut dyn PhysicsBackend) {
        self.position = position;
        info!("target set to {:?}", position.as_slice());

        if visual {
            match self.marker {
                Some(id) => physics.move_body(id, position),
                None => self.marker = Some(physics.spawn_body(BodyKind::TargetMarker, position)),
            }
        }
    }

    /// Scene handle of the marker, once one was spawned.
    pub fn marker(&self) -> Option<BodyId> {
        self.marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::{DroneModel, DroneParams, DroneState};
    use crate::physics::SimplePhysics;

    fn physics() -> SimplePhysics {
        let params = DroneParams::for_model(DroneModel::Cf2x).unwrap();
        let initial = DroneState::at_rest(Vector3::zeros(), Vector3::zeros());
        SimplePhysics::new(params, 1.0 / 240.0, initial)
    }

    #[test]
    fn marker_is_created_once() {
        let mut sim = physics();
        let mut target = TargetManager::new(Vector3::zeros());

        target.set(Vector3::new(1.0, 0.0, 1.0), true, &mut sim);
        let first = target.marker();
        target.set(Vector3::new(0.0, 1.0, 1.0), true, &mut sim);

        assert!(first.is_some());
        assert_eq!(target.marker(), first);
        assert_eq!(sim.body_count(), 1);
        assert_eq!(
            sim.body(first.unwrap()).map(|b| b.1),
            Some(Vector3::new(0.0, 1.0, 1.0))
        );
        assert_eq!(target.position(), Vector3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn invisible_target_spawns_nothing() {
        let mut sim = physics();
        let mut target = TargetManager::new(Vector3::zeros());
        target.set(Vector3::new(0.5, 0.5, 0.5), false, &mut sim);
        assert_eq!(target.marker(), None);
        assert_eq!(sim.body_count(), 0);
        assert_eq!(target.position_tuple(), (0.5, 0.5, 0.5));
    }
}
