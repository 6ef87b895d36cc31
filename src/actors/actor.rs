use nalgebra::Vector3;

/// Anything placed at a point in the world frame.
pub trait Actor {
    fn position(&self) -> Vector3<f64>;

    fn position_tuple(&self) -> (f64, f64, f64) {
        vector3_to_tuple(self.position())
    }
}

pub fn vector3_to_tuple(vec: Vector3<f64>) -> (f64, f64, f64) {
    (vec.x, vec.y, vec.z)
}

pub fn tuple_to_vector3(tuple: (f64, f64, f64)) -> Vector3<f64> {
    Vector3::new(tuple.0, tuple.1, tuple.2)
}
