//! Constrained multi-parallelogram prediction: the encoder chose, per
//! vertex, which of the surrounding parallelograms participate, and stored
//! the choices as per-context crease bits.

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::GenericCornerTable;
use crate::core::shared::{CornerIdx, VERSION_2_2};
use crate::decode::attribute::inverse_transform::InverseTransform;
use crate::decode::attribute::prediction::compute_parallelogram_prediction;
use crate::decode::entropy::rans::RansBitDecoder;
use crate::decode::Err;

/// At most this many parallelograms take part in one prediction; one bit
/// context per possible count.
const MAX_NUM_PARALLELOGRAMS: usize = 4;

#[derive(Default)]
pub(crate) struct ConstrainedMultiData {
    is_crease_edge: Vec<Vec<bool>>,
    positions: Vec<usize>,
}

impl ConstrainedMultiData {
    pub(crate) fn decode_flags(&mut self, buffer: &mut DecoderBuffer) -> Result<(), Err> {
        if buffer.version() < VERSION_2_2 {
            // Selection mode byte; only the optimal mode was ever written.
            let mode = buffer.read_u8().map_err(Err::from)?;
            if mode != 0 {
                return Err(Err::Unsupported(
                    format!("constrained multi-parallelogram mode {}", mode),
                    buffer.pos() - 1,
                ));
            }
        }
        self.is_crease_edge.clear();
        for _ in 0..MAX_NUM_PARALLELOGRAMS {
            let offset = buffer.pos();
            let num_flags = if buffer.version() < VERSION_2_2 {
                buffer.read_u32().map_err(Err::from)? as usize
            } else {
                buffer.decode_varint_u32().map_err(Err::from)? as usize
            };
            if num_flags > buffer.remaining().saturating_add(4).saturating_mul(8) {
                return Err(Err::Corrupt(
                    format!("{} crease flags cannot fit the stream", num_flags),
                    offset,
                ));
            }
            let mut flags = Vec::with_capacity(num_flags);
            if num_flags > 0 {
                let mut decoder = RansBitDecoder::new(buffer)?;
                for _ in 0..num_flags {
                    flags.push(decoder.decode_next_bit());
                }
            }
            self.is_crease_edge.push(flags);
        }
        self.positions = vec![0; MAX_NUM_PARALLELOGRAMS];
        Ok(())
    }

    fn next_flag(&mut self, context: usize, offset: usize) -> Result<bool, Err> {
        let pos = self.positions[context];
        let flag = self
            .is_crease_edge
            .get(context)
            .and_then(|flags| flags.get(pos))
            .copied()
            .ok_or_else(|| {
                Err::Corrupt(
                    format!("crease flags for context {} exhausted", context),
                    offset,
                )
            })?;
        self.positions[context] += 1;
        Ok(flag)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compute(
        &mut self,
        corrections: &[i32],
        num_components: usize,
        num_entries: usize,
        transform: &InverseTransform,
        table: &dyn GenericCornerTable,
        data_to_corner: &[CornerIdx],
        vertex_to_data: &[isize],
        offset: usize,
    ) -> Result<Vec<i64>, Err> {
        let mut out = vec![0i64; num_entries * num_components];
        if num_entries == 0 {
            return Ok(out);
        }

        let zero = vec![0i64; num_components];
        let mut value = vec![0i64; num_components];
        transform.compute_original_value(&zero, &corrections[..num_components], &mut value)?;
        out[..num_components].copy_from_slice(&value);

        let mut single = vec![0i64; num_components];
        let mut candidates: Vec<Vec<i64>> = Vec::with_capacity(MAX_NUM_PARALLELOGRAMS);
        for i in 1..num_entries {
            let start_corner = data_to_corner[i];
            candidates.clear();

            let mut corner = Some(start_corner);
            let mut steps = 0;
            while let Some(c) = corner {
                if candidates.len() == MAX_NUM_PARALLELOGRAMS {
                    break;
                }
                if compute_parallelogram_prediction(
                    c,
                    i,
                    num_components,
                    table,
                    vertex_to_data,
                    &out,
                    &mut single,
                ) {
                    candidates.push(single.clone());
                }
                steps += 1;
                if steps > table.num_corners() {
                    break;
                }
                corner = table.swing_right(c);
                if corner == Some(start_corner) {
                    break;
                }
            }

            let mut prediction = vec![0i64; num_components];
            let mut num_used = 0i64;
            if !candidates.is_empty() {
                let context = candidates.len() - 1;
                for candidate in &candidates {
                    let is_crease = self.next_flag(context, offset)?;
                    if !is_crease {
                        for comp in 0..num_components {
                            prediction[comp] += candidate[comp];
                        }
                        num_used += 1;
                    }
                }
            }
            if num_used > 0 {
                for comp in prediction.iter_mut() {
                    *comp /= num_used;
                }
            } else {
                prediction.copy_from_slice(&out[(i - 1) * num_components..i * num_components]);
            }
            transform.compute_original_value(
                &prediction,
                &corrections[i * num_components..(i + 1) * num_components],
                &mut value,
            )?;
            out[i * num_components..(i + 1) * num_components].copy_from_slice(&value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corner_table::CornerTable;
    use crate::core::shared::bitstream_version;
    use crate::decode::entropy::rans::test_coder::write_bit_chunk;
    use crate::utils::bit_coder::leb128_write;

    fn wrap_transform(min: i32, max: i32) -> InverseTransform {
        let mut transform = InverseTransform::from_type_byte(1, 0).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&min.to_le_bytes());
        data.extend_from_slice(&max.to_le_bytes());
        let mut buffer = DecoderBuffer::new(&data);
        transform.decode_transform_data(&mut buffer).unwrap();
        transform
    }

    /// v2.2 side-data: per context a varint count plus a bit chunk.
    fn build_flag_stream(flags_per_context: &[Vec<bool>]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for flags in flags_per_context {
            leb128_write(flags.len() as u64, &mut bytes);
            if !flags.is_empty() {
                write_bit_chunk(flags, 128, &mut bytes);
            }
        }
        bytes
    }

    #[test]
    fn crease_bits_disable_parallelograms() {
        let table = CornerTable::from_faces(&[[0, 1, 2], [2, 1, 3]]);
        let data_to_corner = vec![0, 1, 2, 5];
        let vertex_to_data = vec![0isize, 1, 2, 3];
        let transform = wrap_transform(-1000, 1000);

        // Entry 3 has exactly one candidate parallelogram (context 0). The
        // single flag marks it a crease, forcing the delta fallback.
        let mut data = ConstrainedMultiData::default();
        let stream = build_flag_stream(&[vec![true], vec![], vec![], vec![]]);
        let mut buffer = DecoderBuffer::new(&stream);
        buffer.set_version(bitstream_version(2, 2));
        data.decode_flags(&mut buffer).unwrap();

        let corrections = vec![0, 10, -5, 7];
        let out = data
            .compute(
                &corrections,
                1,
                4,
                &transform,
                &table,
                &data_to_corner,
                &vertex_to_data,
                0,
            )
            .unwrap();
        // Delta chain: 0, 10, 5, then 5 + 7 = 12 (not the parallelogram).
        assert_eq!(out, vec![0, 10, 5, 12]);
    }

    #[test]
    fn accepted_parallelogram_is_used() {
        let table = CornerTable::from_faces(&[[0, 1, 2], [2, 1, 3]]);
        let data_to_corner = vec![0, 1, 2, 5];
        let vertex_to_data = vec![0isize, 1, 2, 3];
        let transform = wrap_transform(-1000, 1000);

        let mut data = ConstrainedMultiData::default();
        let stream = build_flag_stream(&[vec![false], vec![], vec![], vec![]]);
        let mut buffer = DecoderBuffer::new(&stream);
        buffer.set_version(bitstream_version(2, 2));
        data.decode_flags(&mut buffer).unwrap();

        let corrections = vec![0, 10, -5, 0];
        let out = data
            .compute(
                &corrections,
                1,
                4,
                &transform,
                &table,
                &data_to_corner,
                &vertex_to_data,
                0,
            )
            .unwrap();
        // Parallelogram: 10 + 5 - 0 = 15.
        assert_eq!(out, vec![0, 10, 5, 15]);
    }

    #[test]
    fn missing_flags_are_corrupt() {
        let table = CornerTable::from_faces(&[[0, 1, 2], [2, 1, 3]]);
        let data_to_corner = vec![0, 1, 2, 5];
        let vertex_to_data = vec![0isize, 1, 2, 3];
        let transform = wrap_transform(-1000, 1000);

        let mut data = ConstrainedMultiData::default();
        let stream = build_flag_stream(&[vec![], vec![], vec![], vec![]]);
        let mut buffer = DecoderBuffer::new(&stream);
        buffer.set_version(bitstream_version(2, 2));
        data.decode_flags(&mut buffer).unwrap();

        let corrections = vec![0, 10, -5, 0];
        assert!(matches!(
            data.compute(
                &corrections,
                1,
                4,
                &transform,
                &table,
                &data_to_corner,
                &vertex_to_data,
                0,
            ),
            Err(Err::Corrupt(..))
        ));
    }
}
