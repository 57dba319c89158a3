//! Fixed-layout aggregate types shared between the host and every plugin
//!
//! These structs are the wire contract for aggregate values crossing the
//! native boundary. Fields are packed `f32`s in declaration order with no
//! padding. Changing either layout requires bumping [`crate::PLUME_ABI_VERSION`].

/// Fully qualified name of [`Vector3`] as seen by signatures and plugins
pub const VECTOR3_TYPE_NAME: &str = "Plume.Core.Vector3";

/// Fully qualified name of [`Transform`] as seen by signatures and plugins
pub const TRANSFORM_TYPE_NAME: &str = "Plume.Core.Transform";

/// Namespace prefix reserved for shared core types
pub const CORE_NAMESPACE: &str = "Plume.Core.";

/// Three-component float vector (x, y, z)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    /// Size of the packed wire representation in bytes
    pub const SIZE: usize = 12;

    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum
    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise product
    pub fn mul(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Position, rotation (euler angles) and scale, in that order
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub position: Vector3,
    pub rotation: Vector3,
    pub scale: Vector3,
}

impl Transform {
    /// Size of the packed wire representation in bytes
    pub const SIZE: usize = 36;

    pub const fn new(position: Vector3, rotation: Vector3, scale: Vector3) -> Self {
        Self { position, rotation, scale }
    }

    pub const fn identity() -> Self {
        Self {
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            scale: Vector3::ONE,
        }
    }

    /// Flatten into the nine packed floats of the wire layout
    pub fn to_array(self) -> [f32; 9] {
        let p = self.position;
        let r = self.rotation;
        let s = self.scale;
        [p.x, p.y, p.z, r.x, r.y, r.z, s.x, s.y, s.z]
    }

    pub fn from_array(v: [f32; 9]) -> Self {
        Self {
            position: Vector3::new(v[0], v[1], v[2]),
            rotation: Vector3::new(v[3], v[4], v[5]),
            scale: Vector3::new(v[6], v[7], v[8]),
        }
    }
}

const _: () = assert!(std::mem::size_of::<Vector3>() == Vector3::SIZE);
const _: () = assert!(std::mem::size_of::<Transform>() == Transform::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_ops() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 5.0, 6.0);

        assert_eq!(a.add(b), Vector3::new(5.0, 7.0, 9.0));
        assert_eq!(a.mul(b), Vector3::new(4.0, 10.0, 18.0));
        assert_eq!(a.dot(b), 32.0);
    }

    #[test]
    fn test_transform_flatten_order() {
        let t = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(4.0, 5.0, 6.0),
            Vector3::new(7.0, 8.0, 9.0),
        );
        assert_eq!(t.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(Transform::from_array(t.to_array()), t);
        assert_eq!(Transform::identity().scale, Vector3::ONE);
    }
}
