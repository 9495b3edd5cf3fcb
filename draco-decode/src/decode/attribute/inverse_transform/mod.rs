//! Inverse prediction transforms: they combine a prediction with a decoded
//! correction and map the result back into the portable value range.

use crate::core::buffer::DecoderBuffer;
use crate::core::shared::VERSION_2_2;
use crate::decode::attribute::octahedron::OctahedronToolBox;
use crate::decode::Err;

const TRANSFORM_DELTA: i8 = 0;
const TRANSFORM_WRAP: i8 = 1;
const TRANSFORM_NORMAL_OCTAHEDRON: i8 = 2;
const TRANSFORM_NORMAL_OCTAHEDRON_CANONICALIZED: i8 = 3;

pub(crate) enum InverseTransform {
    Delta,
    Wrap(WrapTransform),
    Octahedron(OctahedronTransform),
    OctahedronCanonicalized(OctahedronTransform),
}

impl InverseTransform {
    pub(crate) fn from_type_byte(byte: i8, offset: usize) -> Result<Self, Err> {
        match byte {
            TRANSFORM_DELTA => Ok(InverseTransform::Delta),
            TRANSFORM_WRAP => Ok(InverseTransform::Wrap(WrapTransform::default())),
            TRANSFORM_NORMAL_OCTAHEDRON => {
                Ok(InverseTransform::Octahedron(OctahedronTransform::default()))
            }
            TRANSFORM_NORMAL_OCTAHEDRON_CANONICALIZED => Ok(
                InverseTransform::OctahedronCanonicalized(OctahedronTransform::default()),
            ),
            other => Err(Err::Unsupported(
                format!("prediction transform type {}", other),
                offset,
            )),
        }
    }

    /// Whether decoded corrections skip the zig-zag un-mapping.
    pub(crate) fn are_corrections_positive(&self) -> bool {
        matches!(
            self,
            InverseTransform::Octahedron(_) | InverseTransform::OctahedronCanonicalized(_)
        )
    }

    pub(crate) fn decode_transform_data(&mut self, buffer: &mut DecoderBuffer) -> Result<(), Err> {
        match self {
            // The plain transform carries no parameters.
            InverseTransform::Delta => Ok(()),
            InverseTransform::Wrap(wrap) => {
                wrap.min_value = buffer.read_i32().map_err(Err::from)?;
                wrap.max_value = buffer.read_i32().map_err(Err::from)?;
                if wrap.min_value > wrap.max_value {
                    return Err(Err::Corrupt(
                        "wrap transform with min above max".to_string(),
                        buffer.pos() - 8,
                    ));
                }
                Ok(())
            }
            InverseTransform::Octahedron(oct) | InverseTransform::OctahedronCanonicalized(oct) => {
                let offset = buffer.pos();
                let max_quantized_value = buffer.read_i32().map_err(Err::from)?;
                if buffer.version() < VERSION_2_2 {
                    // Redundant center value carried by older streams.
                    let _ = buffer.read_i32().map_err(Err::from)?;
                }
                oct.toolbox = Some(
                    OctahedronToolBox::with_max_quantized_value(max_quantized_value).ok_or_else(
                        || {
                            Err::Corrupt(
                                format!("octahedron max quantized value {}", max_quantized_value),
                                offset,
                            )
                        },
                    )?,
                );
                Ok(())
            }
        }
    }

    /// Octahedron transforms expose their tool box to the geometric-normal
    /// predictor, which must quantize predictions the same way.
    pub(crate) fn octahedron_toolbox(&self) -> Option<&OctahedronToolBox> {
        match self {
            InverseTransform::Octahedron(oct) | InverseTransform::OctahedronCanonicalized(oct) => {
                oct.toolbox.as_ref()
            }
            InverseTransform::Delta | InverseTransform::Wrap(_) => None,
        }
    }

    /// Reconstructs one value from its prediction and correction.
    pub(crate) fn compute_original_value(
        &self,
        predicted: &[i64],
        corrections: &[i32],
        out: &mut [i64],
    ) -> Result<(), Err> {
        match self {
            // Unbounded: the correction is applied as-is.
            InverseTransform::Delta => {
                for c in 0..out.len() {
                    out[c] = predicted[c] + corrections[c] as i64;
                }
                Ok(())
            }
            InverseTransform::Wrap(wrap) => {
                wrap.compute_original_value(predicted, corrections, out);
                Ok(())
            }
            InverseTransform::Octahedron(oct) => {
                oct.compute_original_value(predicted, corrections, out, false)
            }
            InverseTransform::OctahedronCanonicalized(oct) => {
                oct.compute_original_value(predicted, corrections, out, true)
            }
        }
    }
}

/// Wrap transform: predictions are clamped into the value range and sums are
/// wrapped back into it by the range length.
#[derive(Default)]
pub(crate) struct WrapTransform {
    min_value: i32,
    max_value: i32,
}

impl WrapTransform {
    fn compute_original_value(&self, predicted: &[i64], corrections: &[i32], out: &mut [i64]) {
        let min = self.min_value as i64;
        let max = self.max_value as i64;
        let max_dif = 1 + max - min;
        for c in 0..out.len() {
            let pred = predicted[c].clamp(min, max);
            let mut value = pred + corrections[c] as i64;
            if value > max {
                value -= max_dif;
            } else if value < min {
                value += max_dif;
            }
            out[c] = value;
        }
    }
}

/// Octahedron transforms: values are (s, t) pairs on the quantized
/// octahedron; additions wrap within the diamond, and the canonicalized
/// variant also rotates predictions into the bottom-left quadrant.
#[derive(Default)]
pub(crate) struct OctahedronTransform {
    toolbox: Option<OctahedronToolBox>,
}

impl OctahedronTransform {
    fn compute_original_value(
        &self,
        predicted: &[i64],
        corrections: &[i32],
        out: &mut [i64],
        canonicalized: bool,
    ) -> Result<(), Err> {
        let toolbox = self.toolbox.as_ref().ok_or_else(|| {
            Err::Internal("octahedron transform used before its data".to_string(), 0)
        })?;
        let center = toolbox.center_value();

        let mut pred_s = predicted[0] as i32 - center;
        let mut pred_t = predicted[1] as i32 - center;
        let corr_s = corrections[0];
        let corr_t = corrections[1];

        let pred_is_in_diamond = toolbox.is_in_diamond(pred_s, pred_t);
        if !pred_is_in_diamond {
            toolbox.invert_diamond(&mut pred_s, &mut pred_t);
        }

        let (mut orig_s, mut orig_t);
        if canonicalized {
            let pred_is_in_bottom_left = toolbox.is_in_bottom_left(pred_s, pred_t);
            let rotation_count = toolbox.rotation_count(pred_s, pred_t);
            if !pred_is_in_bottom_left {
                let (s, t) = toolbox.rotate_point(pred_s, pred_t, rotation_count);
                pred_s = s;
                pred_t = t;
            }
            orig_s = toolbox.mod_max(pred_s.wrapping_add(corr_s));
            orig_t = toolbox.mod_max(pred_t.wrapping_add(corr_t));
            if !pred_is_in_bottom_left {
                let (s, t) = toolbox.rotate_point(orig_s, orig_t, (4 - rotation_count) % 4);
                orig_s = s;
                orig_t = t;
            }
        } else {
            orig_s = toolbox.mod_max(pred_s.wrapping_add(corr_s));
            orig_t = toolbox.mod_max(pred_t.wrapping_add(corr_t));
        }
        if !pred_is_in_diamond {
            toolbox.invert_diamond(&mut orig_s, &mut orig_t);
        }

        out[0] = (orig_s + center) as i64;
        out[1] = (orig_t + center) as i64;
        Ok(())
    }
}
