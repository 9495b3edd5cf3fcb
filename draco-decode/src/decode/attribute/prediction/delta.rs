//! Difference prediction: every entry is predicted from the previous one,
//! the first from zero.

use crate::decode::attribute::inverse_transform::InverseTransform;
use crate::decode::Err;

pub(crate) fn compute(
    corrections: &[i32],
    num_components: usize,
    num_entries: usize,
    transform: &InverseTransform,
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
        prediction.copy_from_slice(&out[(i - 1) * num_components..i * num_components]);
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
    fn accumulates_differences() {
        let transform = wrap_transform(-100, 100);
        // Values 5, 8, 6: corrections 5, 3, -2 per component.
        let corrections = vec![5, 50, 3, -20, -2, 1];
        let out = compute(&corrections, 2, 3, &transform).unwrap();
        assert_eq!(out, vec![5, 50, 8, 30, 6, 31]);
    }

    #[test]
    fn wraps_into_the_declared_range() {
        let transform = wrap_transform(0, 10);
        // 9 + 4 wraps to 2.
        let corrections = vec![9, 4];
        let out = compute(&corrections, 1, 2, &transform).unwrap();
        assert_eq!(out, vec![9, 2]);
    }

    #[test]
    fn plain_transform_accumulates_unbounded() {
        // The other transform delta prediction pairs with: no range, the
        // running sum is taken as-is.
        let transform = InverseTransform::from_type_byte(0, 0).unwrap();
        let corrections = vec![1000, 1000, -2500];
        let out = compute(&corrections, 1, 3, &transform).unwrap();
        assert_eq!(out, vec![1000, 2000, -500]);
    }
}
