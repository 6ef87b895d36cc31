pub mod actor;
pub mod target;
pub mod trajectory;

pub use crate::actors::actor::Actor;
pub use crate::actors::target::TargetManager;
pub use crate::actors::trajectory::{ExpressionTrajectory, TrackingContext, TrajectoryTracker};
