//! Multi-parallelogram prediction: the average of every parallelogram that
//! can be completed around the traversal corner's vertex.

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

    let mut single = vec![0i64; num_components];
    let mut total = vec![0i64; num_components];
    for i in 1..num_entries {
        let start_corner = data_to_corner[i];
        total.fill(0);
        let mut num_parallelograms = 0i64;

        let mut corner = Some(start_corner);
        let mut steps = 0;
        while let Some(c) = corner {
            if compute_parallelogram_prediction(
                c,
                i,
                num_components,
                table,
                vertex_to_data,
                &out,
                &mut single,
            ) {
                for comp in 0..num_components {
                    total[comp] += single[comp];
                }
                num_parallelograms += 1;
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
        if num_parallelograms > 0 {
            for comp in 0..num_components {
                prediction[comp] = total[comp] / num_parallelograms;
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
