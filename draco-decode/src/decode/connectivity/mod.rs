pub(crate) mod edgebreaker;
pub(crate) mod sequential;

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::attribute_corner_table::MeshAttributeCornerTable;
use crate::core::corner_table::CornerTable;
use crate::core::shared::{CornerIdx, PointIdx};
use crate::decode::header::{EncoderMethod, Header};
use crate::decode::Err;

/// Everything the attribute pipeline needs from a decoded mesh topology.
pub(crate) struct DecodedConnectivity {
    pub faces: Vec<[PointIdx; 3]>,
    pub num_points: usize,
    pub corner_table: CornerTable,
    /// Point id at each corner.
    pub corner_to_point: Vec<PointIdx>,
    /// Seam-aware corner tables, indexed by attribute-data id (edgebreaker).
    pub attribute_data: Vec<MeshAttributeCornerTable>,
    /// Corners seeding the encoder-order traversal, one per decoded face in
    /// encoder order. Empty for sequential streams, which keep point order.
    pub traversal_seeds: Vec<CornerIdx>,
}

pub(crate) fn decode_connectivity(
    buffer: &mut DecoderBuffer,
    header: &Header,
) -> Result<DecodedConnectivity, Err> {
    match header.encoder_method {
        EncoderMethod::Sequential => sequential::decode_connectivity(buffer, header),
        EncoderMethod::Edgebreaker => edgebreaker::decode_connectivity(buffer, header),
        EncoderMethod::KdTree => Err(Err::Internal(
            "kd-tree method on a mesh stream".to_string(),
            buffer.pos(),
        )),
    }
}
