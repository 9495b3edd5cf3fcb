//! Prediction schemes: given decoded corrections and already-reconstructed
//! neighbors, they rebuild the portable integer values.
//!
//! The scheme byte in the stream picks the variant; mesh schemes run over
//! the (attribute) corner table in the traversal order captured by
//! `data_to_corner`.

pub(crate) mod constrained_multi;
pub(crate) mod delta;
pub(crate) mod geometric_normal;
pub(crate) mod multi_parallelogram;
pub(crate) mod parallelogram;
pub(crate) mod tex_coords;

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::GenericCornerTable;
use crate::core::shared::CornerIdx;
use crate::decode::attribute::inverse_transform::InverseTransform;
use crate::decode::Err;

use constrained_multi::ConstrainedMultiData;
use geometric_normal::GeometricNormalData;
use tex_coords::TexCoordsPortableData;

/// Mesh context handed to the schemes. `vertex_to_data` maps a corner-table
/// vertex to its entry in the decoded value array (-1 when absent), and
/// `data_to_corner` is its inverse restricted to the traversal order.
pub(crate) struct PredictionContext<'a> {
    pub table: Option<&'a dyn GenericCornerTable>,
    pub data_to_corner: &'a [CornerIdx],
    pub vertex_to_data: &'a [isize],
    /// Portable position of each data entry; used by the uv predictor.
    pub pos_by_entry: &'a [[i64; 3]],
    /// Portable position under each corner; used by the normal predictor.
    pub pos_by_corner: &'a [[i64; 3]],
}

impl PredictionContext<'_> {
    fn table(&self, offset: usize) -> Result<&dyn GenericCornerTable, Err> {
        self.table.ok_or_else(|| {
            Err::Corrupt(
                "mesh prediction scheme without connectivity".to_string(),
                offset,
            )
        })
    }
}

pub(crate) enum PredictionScheme {
    None,
    Delta,
    Parallelogram,
    MultiParallelogram,
    ConstrainedMulti(ConstrainedMultiData),
    TexCoordsPortable(TexCoordsPortableData),
    GeometricNormal(GeometricNormalData),
}

impl PredictionScheme {
    /// The stream stores the method as an int8; negative means none.
    pub(crate) fn from_method_byte(byte: i8, offset: usize) -> Result<Self, Err> {
        match byte {
            b if b < 0 => Ok(PredictionScheme::None),
            0 => Ok(PredictionScheme::Delta),
            1 => Ok(PredictionScheme::Parallelogram),
            // Deprecated since v2.2 but still present in older streams.
            2 => Ok(PredictionScheme::MultiParallelogram),
            4 => Ok(PredictionScheme::ConstrainedMulti(
                ConstrainedMultiData::default(),
            )),
            5 => Ok(PredictionScheme::TexCoordsPortable(
                TexCoordsPortableData::default(),
            )),
            6 => Ok(PredictionScheme::GeometricNormal(
                GeometricNormalData::default(),
            )),
            other => Err(Err::Unsupported(
                format!("prediction scheme method {}", other),
                offset,
            )),
        }
    }

    pub(crate) fn is_none(&self) -> bool {
        matches!(self, PredictionScheme::None)
    }

    /// Side data each scheme reads after the correction symbols. Every
    /// scheme ends with its transform parameters.
    pub(crate) fn decode_prediction_data(
        &mut self,
        buffer: &mut DecoderBuffer,
        transform: &mut InverseTransform,
        num_entries: usize,
    ) -> Result<(), Err> {
        match self {
            PredictionScheme::None => Ok(()),
            PredictionScheme::Delta
            | PredictionScheme::Parallelogram
            | PredictionScheme::MultiParallelogram => transform.decode_transform_data(buffer),
            PredictionScheme::ConstrainedMulti(data) => {
                data.decode_flags(buffer)?;
                transform.decode_transform_data(buffer)
            }
            PredictionScheme::TexCoordsPortable(data) => {
                data.decode_orientations(buffer)?;
                transform.decode_transform_data(buffer)
            }
            PredictionScheme::GeometricNormal(data) => {
                // The predictor quantizes with the transform's parameters,
                // so the transform data comes first here.
                transform.decode_transform_data(buffer)?;
                data.decode_flips(buffer, num_entries)
            }
        }
    }

    /// Rebuilds all portable values from the (already un-zig-zagged when
    /// applicable) corrections.
    pub(crate) fn compute_original_values(
        &mut self,
        corrections: &[i32],
        num_components: usize,
        num_entries: usize,
        transform: &InverseTransform,
        ctx: &PredictionContext,
        offset: usize,
    ) -> Result<Vec<i64>, Err> {
        if corrections.len() < num_entries * num_components {
            return Err(Err::Internal(
                "fewer corrections than entries".to_string(),
                offset,
            ));
        }
        match self {
            PredictionScheme::None => Ok(corrections
                .iter()
                .take(num_entries * num_components)
                .map(|&c| c as i64)
                .collect()),
            PredictionScheme::Delta => {
                delta::compute(corrections, num_components, num_entries, transform)
            }
            PredictionScheme::Parallelogram => parallelogram::compute(
                corrections,
                num_components,
                num_entries,
                transform,
                ctx.table(offset)?,
                ctx.data_to_corner,
                ctx.vertex_to_data,
            ),
            PredictionScheme::MultiParallelogram => multi_parallelogram::compute(
                corrections,
                num_components,
                num_entries,
                transform,
                ctx.table(offset)?,
                ctx.data_to_corner,
                ctx.vertex_to_data,
            ),
            PredictionScheme::ConstrainedMulti(data) => {
                let table = ctx.table(offset)?;
                data.compute(
                    corrections,
                    num_components,
                    num_entries,
                    transform,
                    table,
                    ctx.data_to_corner,
                    ctx.vertex_to_data,
                    offset,
                )
            }
            PredictionScheme::TexCoordsPortable(data) => {
                let table = ctx.table(offset)?;
                data.compute(
                    corrections,
                    num_components,
                    num_entries,
                    transform,
                    table,
                    ctx,
                    offset,
                )
            }
            PredictionScheme::GeometricNormal(data) => {
                let table = ctx.table(offset)?;
                data.compute(
                    corrections,
                    num_components,
                    num_entries,
                    transform,
                    table,
                    ctx,
                    offset,
                )
            }
        }
    }

    /// Combined with the transform: raw symbols stay unsigned when the
    /// transform guarantees positive corrections.
    pub(crate) fn are_corrections_positive(&self, transform: &InverseTransform) -> bool {
        transform.are_corrections_positive()
    }
}

/// Parallelogram prediction through the face opposite `corner`: the tip is
/// predicted as `next + prev - opposite`. Fails when any of the three
/// entries is missing or not yet decoded.
pub(crate) fn compute_parallelogram_prediction(
    corner: CornerIdx,
    max_entry: usize,
    num_components: usize,
    table: &dyn GenericCornerTable,
    vertex_to_data: &[isize],
    data: &[i64],
    out_prediction: &mut [i64],
) -> bool {
    let Some(opp) = table.opposite(corner) else {
        return false;
    };
    let entry_of = |corner: CornerIdx| -> Option<usize> {
        let vertex = table.vertex(corner);
        let entry = *vertex_to_data.get(vertex)?;
        if entry < 0 || entry as usize >= max_entry {
            None
        } else {
            Some(entry as usize)
        }
    };
    let Some(opp_entry) = entry_of(opp) else {
        return false;
    };
    let Some(next_entry) = entry_of(table.next(opp)) else {
        return false;
    };
    let Some(prev_entry) = entry_of(table.previous(opp)) else {
        return false;
    };
    for c in 0..num_components {
        out_prediction[c] = data[next_entry * num_components + c]
            + data[prev_entry * num_components + c]
            - data[opp_entry * num_components + c];
    }
    true
}
