//! Pose and joint value types.
//!
//! [`Pose`] is a 4x4 homogeneous transform (translation in millimeters,
//! rotation in the 3x3 block, fixed bottom row `[0,0,0,1]`). The client
//! treats it as a value: construction, composition and Euler conversion are
//! provided so callers can build targets, but no orthonormality check is
//! performed — feeding a non-rigid matrix to the simulator is the caller's
//! responsibility.
//!
//! The wire format streams poses as 16 doubles in column-major order;
//! [`Pose::to_col_major`] / [`Pose::from_col_major`] define that order in
//! one place for the protocol layer.

use std::ops::Mul;

/// Maximum degrees of freedom the protocol stages in a joint array.
pub const MAX_DOF: usize = 12;

/// 4x4 homogeneous rigid transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    // Row-major storage; (row, col) indexing throughout.
    m: [[f64; 4]; 4],
}

impl Pose {
    /// Identity transform.
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { m }
    }

    /// Pure translation, in millimeters.
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut pose = Self::identity();
        pose.set_pos(x, y, z);
        pose
    }

    /// Rotation of `rx` radians around the X axis.
    pub fn rot_x(rx: f64) -> Self {
        let (s, c) = rx.sin_cos();
        Self::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, c, -s, 0.0],
            [0.0, s, c, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Rotation of `ry` radians around the Y axis.
    pub fn rot_y(ry: f64) -> Self {
        let (s, c) = ry.sin_cos();
        Self::from_rows([
            [c, 0.0, s, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [-s, 0.0, c, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Rotation of `rz` radians around the Z axis.
    pub fn rot_z(rz: f64) -> Self {
        let (s, c) = rz.sin_cos();
        Self::from_rows([
            [c, -s, 0.0, 0.0],
            [s, c, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Build from translation (mm) and XYZWPR Euler angles (degrees).
    ///
    /// Equivalent to `translation(x,y,z) * rot_z(w) * rot_y(p) * rot_x(r)`
    /// with the angles converted to radians.
    pub fn from_xyzwpr(x: f64, y: f64, z: f64, r: f64, p: f64, w: f64) -> Self {
        let a = r.to_radians();
        let b = p.to_radians();
        let c = w.to_radians();
        let (sa, ca) = a.sin_cos();
        let (sb, cb) = b.sin_cos();
        let (sc, cc) = c.sin_cos();
        Self::from_rows([
            [cb * cc, cc * sa * sb - ca * sc, sa * sc + ca * cc * sb, x],
            [cb * sc, ca * cc + sa * sb * sc, ca * sb * sc - cc * sa, y],
            [-sb, cb * sa, ca * cb, z],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Translation (mm) and XYZWPR Euler angles (degrees) of this pose,
    /// as `[x, y, z, r, p, w]`.
    pub fn to_xyzwpr(&self) -> [f64; 6] {
        let x = self.get(0, 3);
        let y = self.get(1, 3);
        let z = self.get(2, 3);
        let (r, p, w);
        if self.get(2, 0) > 1.0 - 1e-6 {
            p = -std::f64::consts::FRAC_PI_2;
            r = 0.0;
            w = (-self.get(1, 2)).atan2(self.get(1, 1));
        } else if self.get(2, 0) < -1.0 + 1e-6 {
            p = std::f64::consts::FRAC_PI_2;
            r = 0.0;
            w = self.get(1, 2).atan2(self.get(1, 1));
        } else {
            p = (-self.get(2, 0))
                .atan2((self.get(0, 0).powi(2) + self.get(1, 0).powi(2)).sqrt());
            w = self.get(1, 0).atan2(self.get(0, 0));
            r = self.get(2, 1).atan2(self.get(2, 2));
        }
        [x, y, z, r.to_degrees(), p.to_degrees(), w.to_degrees()]
    }

    fn from_rows(m: [[f64; 4]; 4]) -> Self {
        Self { m }
    }

    /// Element at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.m[row][col]
    }

    /// Set the element at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.m[row][col] = value;
    }

    /// Translation component, in millimeters.
    pub fn pos(&self) -> [f64; 3] {
        [self.get(0, 3), self.get(1, 3), self.get(2, 3)]
    }

    /// Replace the translation component.
    pub fn set_pos(&mut self, x: f64, y: f64, z: f64) {
        self.m[0][3] = x;
        self.m[1][3] = y;
        self.m[2][3] = z;
    }

    /// Inverse of a rigid transform (transposed rotation, negated
    /// back-rotated translation). Only valid when the 3x3 block is
    /// orthonormal.
    pub fn inv(&self) -> Self {
        let mut out = Self::identity();
        for r in 0..3 {
            for c in 0..3 {
                out.m[r][c] = self.m[c][r];
            }
        }
        let [x, y, z] = self.pos();
        for r in 0..3 {
            out.m[r][3] = -(out.m[r][0] * x + out.m[r][1] * y + out.m[r][2] * z);
        }
        out
    }

    /// The 16 elements in wire order (column-major).
    pub fn to_col_major(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for c in 0..4 {
            for r in 0..4 {
                out[c * 4 + r] = self.m[r][c];
            }
        }
        out
    }

    /// Rebuild from 16 elements in wire order (column-major).
    pub fn from_col_major(values: &[f64; 16]) -> Self {
        let mut pose = Self::identity();
        for c in 0..4 {
            for r in 0..4 {
                pose.m[r][c] = values[c * 4 + r];
            }
        }
        pose
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        let mut out = Pose::from_rows([[0.0; 4]; 4]);
        for r in 0..4 {
            for c in 0..4 {
                out.m[r][c] = (0..4).map(|k| self.m[r][k] * rhs.m[k][c]).sum();
            }
        }
        out
    }
}

/// Ordered joint values of a robot or mechanism, in degrees (or
/// millimeters for linear axes).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Joints {
    values: Vec<f64>,
}

impl Joints {
    /// Joint vector from a slice, truncated to [`MAX_DOF`] values.
    pub fn new(values: &[f64]) -> Self {
        Self {
            values: values[..values.len().min(MAX_DOF)].to_vec(),
        }
    }

    /// Empty joint vector (encodes "no joints" on the wire as count 0).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl From<Vec<f64>> for Joints {
    fn from(values: Vec<f64>) -> Self {
        Self::new(&values)
    }
}

impl From<&[f64]> for Joints {
    fn from(values: &[f64]) -> Self {
        Self::new(values)
    }
}

impl<const N: usize> From<[f64; N]> for Joints {
    fn from(values: [f64; N]) -> Self {
        Self::new(&values)
    }
}
