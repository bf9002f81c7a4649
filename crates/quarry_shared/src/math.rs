//! Spatial types shared between the engine and the host world.
//!
//! Block coordinates are integers; facing directions are floats.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - facing direction, particle offsets
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Snaps the vector onto its dominant axis.
    ///
    /// Returns a unit block step such as `(0, 0, -1)`. Ties prefer the
    /// horizontal axes (x before z) over y so that a player looking slightly
    /// down still fires forward. A zero vector yields `None`.
    #[must_use]
    pub fn dominant_axis(self) -> Option<BlockPos> {
        let (ax, ay, az) = (self.x.abs(), self.y.abs(), self.z.abs());
        if self.length_squared() <= f32::EPSILON || ax.is_nan() || ay.is_nan() || az.is_nan() {
            return None;
        }

        let sign = |v: f32| if v < 0.0 { -1 } else { 1 };
        if ax >= az && ax >= ay {
            Some(BlockPos::new(sign(self.x), 0, 0))
        } else if az >= ay {
            Some(BlockPos::new(0, 0, sign(self.z)))
        } else {
            Some(BlockPos::new(0, sign(self.y), 0))
        }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Integer block coordinate.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// X coordinate
    pub x: i32,
    /// Y coordinate (up)
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The origin
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    /// One block straight up
    pub const UP: Self = Self::new(0, 1, 0);

    /// Offsets this position by `(dx, dy, dz)`, saturating at the i32 bounds.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }

    /// Moves `steps` times along the unit step `dir`.
    #[must_use]
    pub const fn step(self, dir: Self, steps: i32) -> Self {
        self.offset(
            dir.x.saturating_mul(steps),
            dir.y.saturating_mul(steps),
            dir.z.saturating_mul(steps),
        )
    }
}

impl std::ops::Add for BlockPos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.offset(rhs.x, rhs.y, rhs.z)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
