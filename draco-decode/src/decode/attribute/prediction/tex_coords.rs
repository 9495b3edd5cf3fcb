//! Portable texture-coordinate prediction: a uv value is predicted by
//! projecting its triangle onto the already-decoded uv edge, in pure
//! integer arithmetic so every decoder reconstructs identical values.

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::GenericCornerTable;
use crate::decode::attribute::inverse_transform::InverseTransform;
use crate::decode::attribute::prediction::PredictionContext;
use crate::decode::entropy::rans::RansBitDecoder;
use crate::decode::Err;

#[derive(Default)]
pub(crate) struct TexCoordsPortableData {
    /// Consumed back to front: the encoder processed entries in reverse.
    orientations: Vec<bool>,
}

impl TexCoordsPortableData {
    pub(crate) fn decode_orientations(&mut self, buffer: &mut DecoderBuffer) -> Result<(), Err> {
        let offset = buffer.pos();
        let num_orientations = buffer.read_i32().map_err(Err::from)?;
        if num_orientations < 0 {
            return Err(Err::Corrupt(
                format!("negative orientation count {}", num_orientations),
                offset,
            ));
        }
        let num_orientations = num_orientations as usize;
        if num_orientations > buffer.remaining().saturating_add(4).saturating_mul(8) {
            return Err(Err::Corrupt(
                format!("{} orientations cannot fit the stream", num_orientations),
                offset,
            ));
        }
        self.orientations = Vec::with_capacity(num_orientations);
        if num_orientations > 0 {
            // Orientations are delta coded: a zero bit flips the last one.
            let mut decoder = RansBitDecoder::new(buffer)?;
            let mut last_orientation = true;
            for _ in 0..num_orientations {
                if !decoder.decode_next_bit() {
                    last_orientation = !last_orientation;
                }
                self.orientations.push(last_orientation);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compute(
        &mut self,
        corrections: &[i32],
        num_components: usize,
        num_entries: usize,
        transform: &InverseTransform,
        table: &dyn GenericCornerTable,
        ctx: &PredictionContext,
        offset: usize,
    ) -> Result<Vec<i64>, Err> {
        if num_components != 2 {
            return Err(Err::Corrupt(
                format!("uv prediction on {} components", num_components),
                offset,
            ));
        }
        let mut out = vec![0i64; num_entries * 2];
        let mut value = [0i64; 2];
        for i in 0..num_entries {
            let corner = ctx.data_to_corner[i];
            let prediction = self.predict_uv(i, corner, table, ctx, &out, offset)?;
            transform.compute_original_value(
                &prediction,
                &corrections[i * 2..i * 2 + 2],
                &mut value,
            )?;
            out[i * 2..i * 2 + 2].copy_from_slice(&value);
        }
        Ok(out)
    }

    fn predict_uv(
        &mut self,
        entry: usize,
        corner: usize,
        table: &dyn GenericCornerTable,
        ctx: &PredictionContext,
        data: &[i64],
        offset: usize,
    ) -> Result<[i64; 2], Err> {
        let entry_of = |corner: usize| -> Option<usize> {
            let e = *ctx.vertex_to_data.get(table.vertex(corner))?;
            if e >= 0 && (e as usize) < entry {
                Some(e as usize)
            } else {
                None
            }
        };
        let next_entry = entry_of(table.next(corner));
        let prev_entry = entry_of(table.previous(corner));

        if let (Some(next_entry), Some(prev_entry)) = (next_entry, prev_entry) {
            let n_uv = [data[next_entry * 2], data[next_entry * 2 + 1]];
            let p_uv = [data[prev_entry * 2], data[prev_entry * 2 + 1]];
            if n_uv == p_uv {
                return Ok(p_uv);
            }

            let tip_pos = ctx.pos_by_entry[entry];
            let next_pos = ctx.pos_by_entry[next_entry];
            let prev_pos = ctx.pos_by_entry[prev_entry];
            let pn = sub3(prev_pos, next_pos);
            let pn_norm2 = dot3(pn, pn);
            if pn_norm2 != 0 {
                let cn = sub3(tip_pos, next_pos);
                let cn_dot_pn = dot3(pn, cn);
                let pn_uv = [
                    (p_uv[0] - n_uv[0]) as i128,
                    (p_uv[1] - n_uv[1]) as i128,
                ];

                // Projection of the tip onto the edge, scaled by |pn|^2 to
                // stay integral.
                let x_uv = [
                    n_uv[0] as i128 * pn_norm2 + cn_dot_pn * pn_uv[0],
                    n_uv[1] as i128 * pn_norm2 + cn_dot_pn * pn_uv[1],
                ];
                let x_pos = [
                    next_pos[0] as i128 + cn_dot_pn * pn[0] / pn_norm2,
                    next_pos[1] as i128 + cn_dot_pn * pn[1] / pn_norm2,
                    next_pos[2] as i128 + cn_dot_pn * pn[2] / pn_norm2,
                ];
                let cx = [
                    tip_pos[0] as i128 - x_pos[0],
                    tip_pos[1] as i128 - x_pos[1],
                    tip_pos[2] as i128 - x_pos[2],
                ];
                let cx_norm2 = cx[0] * cx[0] + cx[1] * cx[1] + cx[2] * cx[2];

                // The perpendicular offset, with the side picked by the
                // decoded orientation bit.
                let norm = int_sqrt((cx_norm2 * pn_norm2) as u128) as i128;
                let perp_uv = [pn_uv[1] * norm, -pn_uv[0] * norm];

                let orientation = self.orientations.pop().ok_or_else(|| {
                    Err::Corrupt("uv orientation bits exhausted".to_string(), offset)
                })?;
                let predicted = if orientation {
                    [
                        (x_uv[0] + perp_uv[0]) / pn_norm2,
                        (x_uv[1] + perp_uv[1]) / pn_norm2,
                    ]
                } else {
                    [
                        (x_uv[0] - perp_uv[0]) / pn_norm2,
                        (x_uv[1] - perp_uv[1]) / pn_norm2,
                    ]
                };
                return Ok([predicted[0] as i64, predicted[1] as i64]);
            }
        }

        // Degenerate triangle or missing neighbors: difference prediction
        // from whatever is available.
        let fallback = prev_entry.or(next_entry);
        if let Some(e) = fallback {
            return Ok([data[e * 2], data[e * 2 + 1]]);
        }
        if entry > 0 {
            return Ok([data[(entry - 1) * 2], data[(entry - 1) * 2 + 1]]);
        }
        Ok([0, 0])
    }
}

fn sub3(a: [i64; 3], b: [i64; 3]) -> [i128; 3] {
    [
        (a[0] - b[0]) as i128,
        (a[1] - b[1]) as i128,
        (a[2] - b[2]) as i128,
    ]
}

fn dot3(a: [i128; 3], b: [i128; 3]) -> i128 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Floor of the square root, on the magnitudes this predictor produces.
fn int_sqrt(n: u128) -> u128 {
    if n == 0 {
        return 0;
    }
    let mut x = 1u128 << ((128 - n.leading_zeros() as u32).div_ceil(2));
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corner_table::CornerTable;

    #[test]
    fn int_sqrt_is_exact_on_squares() {
        for v in [0u128, 1, 2, 3, 4, 15, 16, 17, 255, 256, 1 << 40] {
            let s = int_sqrt(v * v);
            assert_eq!(s, v);
        }
        assert_eq!(int_sqrt(8), 2);
        assert_eq!(int_sqrt(99), 9);
    }

    #[test]
    fn right_triangle_prediction_is_exact() {
        // One triangle in the z=0 plane with uvs equal to xy positions: the
        // projection predicts the tip uv exactly (up to rounding).
        let table = CornerTable::from_faces(&[[0, 1, 2]]);
        let data_to_corner = vec![1, 2, 0];
        let vertex_to_data = vec![2isize, 0, 1];
        let pos_by_entry = vec![[100, 0, 0], [0, 100, 0], [0, 0, 0]];
        let ctx = PredictionContext {
            table: Some(&table),
            data_to_corner: &data_to_corner,
            vertex_to_data: &vertex_to_data,
            pos_by_entry: &pos_by_entry,
            pos_by_corner: &[],
        };

        let mut transform = InverseTransform::from_type_byte(1, 0).unwrap();
        let mut tdata = Vec::new();
        tdata.extend_from_slice(&(-1000i32).to_le_bytes());
        tdata.extend_from_slice(&1000i32.to_le_bytes());
        let mut tbuffer = DecoderBuffer::new(&tdata);
        transform.decode_transform_data(&mut tbuffer).unwrap();

        let mut data = TexCoordsPortableData {
            orientations: vec![false],
        };
        // Entries 0 and 1 are delta coded; entry 2 is predicted. With the
        // uvs matching positions the prediction lands exactly on (0, 0), and
        // a zero correction keeps it.
        let corrections = vec![100, 0, -100, 100, 0, 0];
        let out = data
            .compute(&corrections, 2, 3, &transform, &table, &ctx, 0)
            .unwrap();
        assert_eq!(&out[0..2], &[100, 0]);
        assert_eq!(&out[2..4], &[0, 100]);
        let tip = [out[4], out[5]];
        assert!(
            tip[0].abs() <= 1 && tip[1].abs() <= 1,
            "predicted uv {:?}",
            tip
        );
    }

    #[test]
    fn exhausted_orientations_are_corrupt() {
        let table = CornerTable::from_faces(&[[0, 1, 2]]);
        let data_to_corner = vec![1, 2, 0];
        let vertex_to_data = vec![2isize, 0, 1];
        let pos_by_entry = vec![[100, 0, 0], [0, 100, 0], [0, 0, 0]];
        let ctx = PredictionContext {
            table: Some(&table),
            data_to_corner: &data_to_corner,
            vertex_to_data: &vertex_to_data,
            pos_by_entry: &pos_by_entry,
            pos_by_corner: &[],
        };
        let mut transform = InverseTransform::from_type_byte(1, 0).unwrap();
        let mut tdata = Vec::new();
        tdata.extend_from_slice(&(-1000i32).to_le_bytes());
        tdata.extend_from_slice(&1000i32.to_le_bytes());
        let mut tbuffer = DecoderBuffer::new(&tdata);
        transform.decode_transform_data(&mut tbuffer).unwrap();

        let mut data = TexCoordsPortableData {
            orientations: vec![],
        };
        let corrections = vec![100, 0, -100, 100, 0, 0];
        assert!(matches!(
            data.compute(&corrections, 2, 3, &transform, &table, &ctx, 0),
            Err(Err::Corrupt(..))
        ));
    }
}
