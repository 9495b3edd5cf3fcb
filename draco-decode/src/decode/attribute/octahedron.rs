//! Integer octahedral coordinate math shared by the normal transforms and
//! the geometric-normal predictor.
//!
//! A unit vector is projected onto the octahedron |x|+|y|+|z| = 1 and the
//! two folded coordinates (s, t) are quantized into [0, max_value]. All
//! decode-side operations run on signed integers centered at `center_value`.

#[derive(Debug, Clone, Copy)]
pub(crate) struct OctahedronToolBox {
    max_quantized_value: i32,
    max_value: i32,
    center_value: i32,
}

impl OctahedronToolBox {
    /// `max_quantized_value` must be `2^bits - 1` for bits in 2..=30.
    pub(crate) fn with_max_quantized_value(max_quantized_value: i32) -> Option<Self> {
        if max_quantized_value < 3 || (max_quantized_value as u32 + 1).count_ones() != 1 {
            return None;
        }
        Some(Self {
            max_quantized_value,
            max_value: max_quantized_value - 1,
            center_value: (max_quantized_value - 1) / 2,
        })
    }

    pub(crate) fn with_quantization_bits(bits: u32) -> Option<Self> {
        if !(2..=30).contains(&bits) {
            return None;
        }
        Self::with_max_quantized_value((1i32 << bits) - 1)
    }

    #[inline]
    pub(crate) fn center_value(&self) -> i32 {
        self.center_value
    }

    #[inline]
    pub(crate) fn max_value(&self) -> i32 {
        self.max_value
    }

    /// Wraps a value into [-center, center].
    #[inline]
    pub(crate) fn mod_max(&self, x: i32) -> i32 {
        if x > self.center_value {
            x - self.max_quantized_value
        } else if x < -self.center_value {
            x + self.max_quantized_value
        } else {
            x
        }
    }

    #[inline]
    pub(crate) fn is_in_diamond(&self, s: i32, t: i32) -> bool {
        s.abs() + t.abs() <= self.center_value
    }

    /// Reflects a point outside the diamond across its nearest corner edge.
    pub(crate) fn invert_diamond(&self, s: &mut i32, t: &mut i32) {
        let (sign_s, sign_t) = if *s >= 0 && *t >= 0 {
            (1, 1)
        } else if *s <= 0 && *t <= 0 {
            (-1, -1)
        } else {
            (if *s > 0 { 1 } else { -1 }, if *t > 0 { 1 } else { -1 })
        };
        let corner_point_s = sign_s * self.center_value;
        let corner_point_t = sign_t * self.center_value;
        let mut us = 2 * *s - corner_point_s;
        let mut ut = 2 * *t - corner_point_t;
        if sign_s * sign_t >= 0 {
            let temp = us;
            us = -ut;
            ut = -temp;
        } else {
            std::mem::swap(&mut us, &mut ut);
        }
        *s = (us + corner_point_s) / 2;
        *t = (ut + corner_point_t) / 2;
    }

    pub(crate) fn is_in_bottom_left(&self, s: i32, t: i32) -> bool {
        if s == 0 && t == 0 {
            return true;
        }
        s < 0 && t <= 0
    }

    /// Number of clockwise quarter turns taking the point into the bottom
    /// left quadrant.
    pub(crate) fn rotation_count(&self, s: i32, t: i32) -> i32 {
        if s == 0 {
            if t == 0 {
                0
            } else if t > 0 {
                3
            } else {
                1
            }
        } else if s > 0 {
            if t >= 0 {
                2
            } else {
                1
            }
        } else if t <= 0 {
            0
        } else {
            3
        }
    }

    pub(crate) fn rotate_point(&self, s: i32, t: i32, rotation_count: i32) -> (i32, i32) {
        match rotation_count & 3 {
            1 => (t, -s),
            2 => (-s, -t),
            3 => (-t, s),
            _ => (s, t),
        }
    }

    /// Scales an integer vector so its L1 norm equals the center value, the
    /// octahedron surface in integer coordinates.
    pub(crate) fn canonicalize_integer_vector(&self, vec: &mut [i64; 3]) {
        let abs_sum = vec[0].abs() + vec[1].abs() + vec[2].abs();
        if abs_sum == 0 {
            vec[0] = self.center_value as i64;
            vec[1] = 0;
            vec[2] = 0;
            return;
        }
        let center = self.center_value as i64;
        vec[0] = vec[0] * center / abs_sum;
        vec[1] = vec[1] * center / abs_sum;
        let rest = center - vec[0].abs() - vec[1].abs();
        vec[2] = if vec[2] >= 0 { rest } else { -rest };
    }

    /// Maps a canonicalized integer vector to quantized (s, t), folding the
    /// negative-x hemisphere outward.
    pub(crate) fn integer_vector_to_quantized_octahedral_coords(
        &self,
        vec: &[i64; 3],
    ) -> (i32, i32) {
        let center = self.center_value as i64;
        let (s, t) = if vec[0] >= 0 {
            (vec[1] + center, vec[2] + center)
        } else {
            let s = if vec[1] < 0 {
                vec[2].abs()
            } else {
                2 * center - vec[2].abs()
            };
            let t = if vec[2] < 0 {
                vec[1].abs()
            } else {
                2 * center - vec[1].abs()
            };
            (s, t)
        };
        (s as i32, t as i32)
    }

    /// Dequantizes (s, t) back to a unit vector.
    pub(crate) fn quantized_octahedral_coords_to_unit_vector(&self, s: i32, t: i32) -> [f32; 3] {
        let scale = 2.0 / self.max_value as f32;
        let y = s as f32 * scale - 1.0;
        let z = t as f32 * scale - 1.0;
        let x = 1.0 - y.abs() - z.abs();
        let (y, z) = if x < 0.0 {
            (
                (1.0 - z.abs()) * if y >= 0.0 { 1.0 } else { -1.0 },
                (1.0 - y.abs()) * if z >= 0.0 { 1.0 } else { -1.0 },
            )
        } else {
            (y, z)
        };
        let norm = (x * x + y * y + z * z).sqrt();
        if norm == 0.0 {
            return [1.0, 0.0, 0.0];
        }
        [x / norm, y / norm, z / norm]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolbox() -> OctahedronToolBox {
        OctahedronToolBox::with_quantization_bits(8).unwrap()
    }

    #[test]
    fn construction_rejects_bad_parameters() {
        assert!(OctahedronToolBox::with_quantization_bits(1).is_none());
        assert!(OctahedronToolBox::with_quantization_bits(31).is_none());
        assert!(OctahedronToolBox::with_max_quantized_value(200).is_none());
        assert!(OctahedronToolBox::with_max_quantized_value(255).is_some());
    }

    #[test]
    fn mod_max_wraps_symmetrically() {
        let tb = toolbox();
        let c = tb.center_value();
        assert_eq!(tb.mod_max(c), c);
        assert_eq!(tb.mod_max(c + 1), c + 1 - 255);
        assert_eq!(tb.mod_max(-c - 1), -c - 1 + 255);
        assert_eq!(tb.mod_max(0), 0);
    }

    #[test]
    fn diamond_inversion_is_an_involution_on_the_outside() {
        let tb = toolbox();
        let c = tb.center_value();
        for &(s0, t0) in &[(c, 40), (-c, 13), (90, 80), (-70, 100), (-90, -90)] {
            if tb.is_in_diamond(s0, t0) {
                continue;
            }
            let (mut s, mut t) = (s0, t0);
            tb.invert_diamond(&mut s, &mut t);
            assert!(tb.is_in_diamond(s, t), "({}, {}) -> ({}, {})", s0, t0, s, t);
            tb.invert_diamond(&mut s, &mut t);
            assert_eq!((s, t), (s0, t0));
        }
    }

    #[test]
    fn rotation_moves_points_to_the_bottom_left() {
        let tb = toolbox();
        for &(s, t) in &[(5, 7), (-5, 7), (5, -7), (-5, -7), (0, 9), (9, 0)] {
            let rot = tb.rotation_count(s, t);
            let (rs, rt) = tb.rotate_point(s, t, rot);
            assert!(tb.is_in_bottom_left(rs, rt), "({}, {})", rs, rt);
            let (bs, bt) = tb.rotate_point(rs, rt, (4 - rot) % 4);
            assert_eq!((bs, bt), (s, t));
        }
    }

    #[test]
    fn axis_vectors_round_trip_through_quantization() {
        let tb = toolbox();
        for &axis in &[
            [1.0f32, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ] {
            let mut vec = [
                (axis[0] * 1000.0) as i64,
                (axis[1] * 1000.0) as i64,
                (axis[2] * 1000.0) as i64,
            ];
            tb.canonicalize_integer_vector(&mut vec);
            let (s, t) = tb.integer_vector_to_quantized_octahedral_coords(&vec);
            assert!((0..=tb.max_value()).contains(&s));
            assert!((0..=tb.max_value()).contains(&t));
            let unit = tb.quantized_octahedral_coords_to_unit_vector(s, t);
            for k in 0..3 {
                assert!(
                    (unit[k] - axis[k]).abs() < 1e-2,
                    "axis {:?} decoded as {:?}",
                    axis,
                    unit
                );
            }
        }
    }

    #[test]
    fn decoded_normals_are_unit_length() {
        let tb = toolbox();
        for s in (0..=tb.max_value()).step_by(17) {
            for t in (0..=tb.max_value()).step_by(23) {
                let v = tb.quantized_octahedral_coords_to_unit_vector(s, t);
                let norm2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
                assert!((norm2 - 1.0).abs() < 1e-4);
            }
        }
    }
}
