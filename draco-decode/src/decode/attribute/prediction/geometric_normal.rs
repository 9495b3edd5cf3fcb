//! Geometric normal prediction: the normal at a vertex is estimated from
//! the area-weighted cross products of its incident faces' position edges,
//! projected onto the quantized octahedron. A per-entry flip bit corrects
//! the orientation.

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::GenericCornerTable;
use crate::core::shared::VERSION_2_2;
use crate::decode::attribute::inverse_transform::InverseTransform;
use crate::decode::attribute::prediction::PredictionContext;
use crate::decode::entropy::rans::RansBitDecoder;
use crate::decode::Err;

/// Accumulated normals are scaled down under this bound before
/// quantization.
const NORMAL_UPPER_BOUND: i64 = 1 << 29;

#[derive(Default)]
pub(crate) struct GeometricNormalData {
    flip_bits: Vec<bool>,
}

impl GeometricNormalData {
    /// Runs after the transform data was read; the flip stream is plain
    /// rANS bits, one per entry.
    pub(crate) fn decode_flips(
        &mut self,
        buffer: &mut DecoderBuffer,
        num_entries: usize,
    ) -> Result<(), Err> {
        if buffer.version() < VERSION_2_2 {
            let mode = buffer.read_u8().map_err(Err::from)?;
            // Only the triangle-area predictor survived into this decoder.
            if mode != 1 {
                return Err(Err::Unsupported(
                    format!("geometric normal prediction mode {}", mode),
                    buffer.pos() - 1,
                ));
            }
        }
        let mut decoder = RansBitDecoder::new(buffer)?;
        self.flip_bits = (0..num_entries).map(|_| decoder.decode_next_bit()).collect();
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
                format!("octahedral normal prediction on {} components", num_components),
                offset,
            ));
        }
        let toolbox = transform.octahedron_toolbox().ok_or_else(|| {
            Err::Corrupt(
                "geometric normal prediction without an octahedron transform".to_string(),
                offset,
            )
        })?;

        let mut out = vec![0i64; num_entries * 2];
        let mut value = [0i64; 2];
        for i in 0..num_entries {
            let corner = ctx.data_to_corner[i];
            let mut normal = accumulate_face_normals(corner, table, ctx.pos_by_corner);

            let abs_sum = normal[0].abs() + normal[1].abs() + normal[2].abs();
            if abs_sum > NORMAL_UPPER_BOUND {
                let quotient = abs_sum / NORMAL_UPPER_BOUND;
                for comp in normal.iter_mut() {
                    *comp /= quotient;
                }
            }
            toolbox.canonicalize_integer_vector(&mut normal);
            let flip = self.flip_bits.get(i).copied().ok_or_else(|| {
                Err::Corrupt("normal flip bits exhausted".to_string(), offset)
            })?;
            if flip {
                for comp in normal.iter_mut() {
                    *comp = -*comp;
                }
            }
            let (s, t) = toolbox.integer_vector_to_quantized_octahedral_coords(&normal);

            transform.compute_original_value(
                &[s as i64, t as i64],
                &corrections[i * 2..i * 2 + 2],
                &mut value,
            )?;
            out[i * 2..i * 2 + 2].copy_from_slice(&value);
        }
        Ok(out)
    }
}

/// Sums the cross products of the position edges of every face around the
/// vertex under `corner`.
fn accumulate_face_normals(
    start_corner: usize,
    table: &dyn GenericCornerTable,
    pos_by_corner: &[[i64; 3]],
) -> [i64; 3] {
    let mut normal = [0i64; 3];
    let mut add_face = |corner: usize| {
        let cent = pos_by_corner[corner];
        let next = pos_by_corner[table.next(corner)];
        let prev = pos_by_corner[table.previous(corner)];
        let dn = [next[0] - cent[0], next[1] - cent[1], next[2] - cent[2]];
        let dp = [prev[0] - cent[0], prev[1] - cent[1], prev[2] - cent[2]];
        normal[0] += dn[1] * dp[2] - dn[2] * dp[1];
        normal[1] += dn[2] * dp[0] - dn[0] * dp[2];
        normal[2] += dn[0] * dp[1] - dn[1] * dp[0];
    };

    let bound = table.num_corners();
    let mut steps = 0;
    let mut wrapped = false;
    let mut corner = Some(start_corner);
    while let Some(c) = corner {
        add_face(c);
        steps += 1;
        if steps > bound {
            return normal;
        }
        corner = table.swing_right(c);
        if corner == Some(start_corner) {
            wrapped = true;
            break;
        }
    }
    if !wrapped {
        // Open fan: cover the left side too.
        corner = table.swing_left(start_corner);
        while let Some(c) = corner {
            add_face(c);
            steps += 1;
            if steps > bound {
                break;
            }
            corner = table.swing_left(c);
        }
    }
    normal
}
