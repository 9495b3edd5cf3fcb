//! Single-parallelogram prediction over the mesh: the tip of the face
//! opposite the traversal corner completes a parallelogram with the other
//! two corners. Boundary corners fall back to difference prediction.

use crate::core::corner_table::GenericCornerTable;
use crate::core::shared::CornerIdx;
use crate::decode::attribute::inverse_transform::InverseTransform;
use crate::decode::attribute::prediction::compute_parallelogram_prediction;
use crate::decode::Err;

#[allow(clippy::too_many_arguments)]
pub(crate) fn compute(
    corrections: &[i32],
    num_components: usize,
    num_entries: usize,
    transform: &InverseTransform,
    table: &dyn GenericCornerTable,
    data_to_corner: &[CornerIdx],
    vertex_to_data: &[isize],
) -> Result<Vec<i64>, Err> {
    let mut out = vec![0i64; num_entries * num_components];
    if num_entries == 0 {
        return Ok(out);
    }

    let zero = vec![0i64; num_components];
    let mut value = vec![0i64; num_components];
    transform.compute_original_value(&zero, &corrections[..num_components], &mut value)?;
    out[..num_components].copy_from_slice(&value);

    let mut prediction = vec![0i64; num_components];
    for i in 1..num_entries {
        let corner = data_to_corner[i];
        let predicted = compute_parallelogram_prediction(
            corner,
            i,
            num_components,
            table,
            vertex_to_data,
            &out,
            &mut prediction,
        );
        if !predicted {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::DecoderBuffer;
    use crate::core::corner_table::CornerTable;

    fn wrap_transform(min: i32, max: i32) -> InverseTransform {
        let mut transform = InverseTransform::from_type_byte(1, 0).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&min.to_le_bytes());
        data.extend_from_slice(&max.to_le_bytes());
        let mut buffer = DecoderBuffer::new(&data);
        transform.decode_transform_data(&mut buffer).unwrap();
        transform
    }

    #[test]
    fn completes_the_parallelogram_across_the_shared_edge() {
        // Two faces sharing edge (1, 2); vertex 3 completes the
        // parallelogram 1-0-2-3.
        let table = CornerTable::from_faces(&[[0, 1, 2], [2, 1, 3]]);
        let data_to_corner = vec![0, 1, 2, 5];
        let vertex_to_data = vec![0isize, 1, 2, 3];
        let transform = wrap_transform(-1000, 1000);

        // Entry values: v0=(10,10), v1=(20,10), v2=(10,30).
        // Parallelogram predicts v3 = v1 + v2 - v0 = (20, 30).
        // Stream carries corrections; entry 3's correction is (1, -2), so
        // the reconstructed value is (21, 28).
        let corrections = vec![10, 10, 10, 0, -10, 20, 1, -2];
        let out = compute(
            &corrections,
            2,
            4,
            &transform,
            &table,
            &data_to_corner,
            &vertex_to_data,
        )
        .unwrap();
        assert_eq!(&out[..6], &[10, 10, 20, 10, 10, 30]);
        assert_eq!(&out[6..], &[21, 28]);
    }

    #[test]
    fn boundary_corners_fall_back_to_difference() {
        let table = CornerTable::from_faces(&[[0, 1, 2]]);
        let data_to_corner = vec![0, 1, 2];
        let vertex_to_data = vec![0isize, 1, 2];
        let transform = wrap_transform(-1000, 1000);

        // All corners are on the boundary; every entry is delta-coded.
        let corrections = vec![5, 2, -1];
        let out = compute(
            &corrections,
            1,
            3,
            &transform,
            &table,
            &data_to_corner,
            &vertex_to_data,
        )
        .unwrap();
        assert_eq!(out, vec![5, 7, 6]);
    }
}
