//! Minimal geometry types shared by the editing crates.
#![forbid(unsafe_code)]

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline]
    pub fn cross(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn distance(self, rhs: Vec3) -> f32 {
        (self - rhs).length()
    }

    #[inline]
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > 0.0 { self / len } else { self }
    }

    /// Integer cell containing this point.
    #[inline]
    pub fn floor(self) -> IVec3 {
        IVec3::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    #[inline]
    fn sub_assign(&mut self, rhs: Vec3) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn div(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Length of the main diagonal.
    #[inline]
    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).length()
    }

    /// The eight corners, min corner first.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// Integer block coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct IVec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl IVec3 {
    pub const ZERO: IVec3 = IVec3 { x: 0, y: 0, z: 0 };
    pub const ONE: IVec3 = IVec3 { x: 1, y: 1, z: 1 };
    pub const UP: IVec3 = IVec3 { x: 0, y: 1, z: 0 };
    pub const DOWN: IVec3 = IVec3 { x: 0, y: -1, z: 0 };

    /// Six face directions in +Y,-Y,+X,-X,+Z,-Z order.
    pub const FACES: [IVec3; 6] = [
        IVec3 { x: 0, y: 1, z: 0 },
        IVec3 { x: 0, y: -1, z: 0 },
        IVec3 { x: 1, y: 0, z: 0 },
        IVec3 { x: -1, y: 0, z: 0 },
        IVec3 { x: 0, y: 0, z: 1 },
        IVec3 { x: 0, y: 0, z: -1 },
    ];

    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: i32) -> Self {
        Self { x: v, y: v, z: v }
    }

    #[inline]
    pub fn min(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    /// Component-wise euclidean remainder; always non-negative for positive `rhs`.
    #[inline]
    pub fn rem_euclid(self, rhs: IVec3) -> IVec3 {
        IVec3::new(
            self.x.rem_euclid(rhs.x),
            self.y.rem_euclid(rhs.y),
            self.z.rem_euclid(rhs.z),
        )
    }

    #[inline]
    pub fn div_euclid(self, rhs: IVec3) -> IVec3 {
        IVec3::new(
            self.x.div_euclid(rhs.x),
            self.y.div_euclid(rhs.y),
            self.z.div_euclid(rhs.z),
        )
    }

    #[inline]
    pub fn as_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// Center of the unit cell at this coordinate.
    #[inline]
    pub fn center(self) -> Vec3 {
        self.as_vec3() + Vec3::new(0.5, 0.5, 0.5)
    }

    #[inline]
    pub fn get(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl Add for IVec3 {
    type Output = IVec3;
    #[inline]
    fn add(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for IVec3 {
    #[inline]
    fn add_assign(&mut self, rhs: IVec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for IVec3 {
    type Output = IVec3;
    #[inline]
    fn sub(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<i32> for IVec3 {
    type Output = IVec3;
    #[inline]
    fn mul(self, rhs: i32) -> IVec3 {
        IVec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for IVec3 {
    type Output = IVec3;
    #[inline]
    fn neg(self) -> IVec3 {
        IVec3::new(-self.x, -self.y, -self.z)
    }
}

impl core::fmt::Display for IVec3 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Inclusive integer cuboid. `min <= max` holds component-wise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockBox {
    pub min: IVec3,
    pub max: IVec3,
}

impl BlockBox {
    /// Bounding box of two arbitrary corners.
    #[inline]
    pub fn from_corners(a: IVec3, b: IVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    #[inline]
    pub fn single(p: IVec3) -> Self {
        Self { min: p, max: p }
    }

    #[inline]
    pub fn size(&self) -> IVec3 {
        self.max - self.min + IVec3::ONE
    }

    /// Number of blocks covered.
    #[inline]
    pub fn volume(&self) -> u64 {
        let s = self.size();
        s.x as u64 * s.y as u64 * s.z as u64
    }

    #[inline]
    pub fn contains(&self, p: IVec3) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// Smallest box containing both.
    #[inline]
    pub fn union(&self, other: &BlockBox) -> BlockBox {
        BlockBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn translate(&self, by: IVec3) -> BlockBox {
        BlockBox {
            min: self.min + by,
            max: self.max + by,
        }
    }

    /// Linear index of `p` inside the box, x fastest then z then y.
    #[inline]
    pub fn index_of(&self, p: IVec3) -> usize {
        let s = self.size();
        let l = p - self.min;
        ((l.y as usize * s.z as usize) + l.z as usize) * s.x as usize + l.x as usize
    }

    /// Inverse of [`BlockBox::index_of`].
    #[inline]
    pub fn pos_at(&self, idx: usize) -> IVec3 {
        let s = self.size();
        let sx = s.x as usize;
        let sz = s.z as usize;
        let x = idx % sx;
        let z = (idx / sx) % sz;
        let y = idx / (sx * sz);
        self.min + IVec3::new(x as i32, y as i32, z as i32)
    }

    /// Float bounds spanning the full extent of the covered cells.
    #[inline]
    pub fn as_aabb(&self) -> Aabb {
        Aabb::new(self.min.as_vec3(), (self.max + IVec3::ONE).as_vec3())
    }

    /// Iterate every position in [`BlockBox::index_of`] order.
    pub fn iter(&self) -> impl Iterator<Item = IVec3> + '_ {
        let n = self.volume() as usize;
        (0..n).map(move |i| self.pos_at(i))
    }

    /// Split into sub-boxes no larger than `chunk` on any axis.
    pub fn split(&self, chunk: i32) -> Vec<BlockBox> {
        let chunk = chunk.max(1);
        let mut out = Vec::new();
        let mut y = self.min.y;
        while y <= self.max.y {
            let y1 = (y + chunk - 1).min(self.max.y);
            let mut z = self.min.z;
            while z <= self.max.z {
                let z1 = (z + chunk - 1).min(self.max.z);
                let mut x = self.min.x;
                while x <= self.max.x {
                    let x1 = (x + chunk - 1).min(self.max.x);
                    out.push(BlockBox {
                        min: IVec3::new(x, y, z),
                        max: IVec3::new(x1, y1, z1),
                    });
                    x = x1 + 1;
                }
                z = z1 + 1;
            }
            y = y1 + 1;
        }
        out
    }
}
