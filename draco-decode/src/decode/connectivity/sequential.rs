//! Sequential mesh connectivity: faces stored as plain index triples, either
//! raw at the narrowest width that fits the point count or as
//! entropy-coded deltas.

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::CornerTable;
use crate::core::shared::{PointIdx, VERSION_2_2};
use crate::decode::connectivity::DecodedConnectivity;
use crate::decode::entropy::symbol_coding::decode_symbols;
use crate::decode::header::Header;
use crate::decode::Err;

const METHOD_COMPRESSED: u8 = 0;
const METHOD_RAW: u8 = 1;

pub(crate) fn decode_connectivity(
    buffer: &mut DecoderBuffer,
    header: &Header,
) -> Result<DecodedConnectivity, Err> {
    let counts_offset = buffer.pos();
    let (num_faces, num_points) = if header.version < VERSION_2_2 {
        (
            buffer.read_u32().map_err(Err::from)? as usize,
            buffer.read_u32().map_err(Err::from)? as usize,
        )
    } else {
        (
            buffer.decode_varint_u32().map_err(Err::from)? as usize,
            buffer.decode_varint_u32().map_err(Err::from)? as usize,
        )
    };

    if num_faces as u64 > u32::MAX as u64 / 3 {
        return Err(Err::Corrupt(
            format!("face count {} exceeds the format limit", num_faces),
            counts_offset,
        ));
    }
    // Loose bound: each face needs at least three bytes of payload.
    if num_faces > buffer.remaining() / 3 {
        return Err(Err::Corrupt(
            format!(
                "face count {} cannot fit in {} remaining bytes",
                num_faces,
                buffer.remaining()
            ),
            counts_offset,
        ));
    }

    let mut faces: Vec<[PointIdx; 3]> = Vec::with_capacity(num_faces);
    if num_faces > 0 && num_points > 0 {
        let method = buffer.read_u8().map_err(Err::from)?;
        let indices = match method {
            METHOD_COMPRESSED => decode_compressed_indices(buffer, num_faces, num_points)?,
            METHOD_RAW => decode_raw_indices(buffer, header, num_faces, num_points)?,
            other => {
                return Err(Err::Unsupported(
                    format!("sequential connectivity method {}", other),
                    buffer.pos() - 1,
                ))
            }
        };
        for f in 0..num_faces {
            faces.push([indices[3 * f], indices[3 * f + 1], indices[3 * f + 2]]);
        }
    }

    let corner_table = CornerTable::from_faces(&faces);
    let corner_to_point: Vec<PointIdx> = faces.iter().flatten().copied().collect();

    Ok(DecodedConnectivity {
        faces,
        num_points,
        corner_table,
        corner_to_point,
        attribute_data: Vec::new(),
        traversal_seeds: Vec::new(),
    })
}

/// Symbol-coded deltas: each symbol is a magnitude with its sign in the low
/// bit, accumulated into a running index.
fn decode_compressed_indices(
    buffer: &mut DecoderBuffer,
    num_faces: usize,
    num_points: usize,
) -> Result<Vec<PointIdx>, Err> {
    let offset = buffer.pos();
    let symbols = decode_symbols(num_faces * 3, 1, buffer)?;
    let mut indices = Vec::with_capacity(num_faces * 3);
    let mut last: i64 = 0;
    for symbol in symbols {
        let mut delta = (symbol >> 1) as i64;
        if symbol & 1 != 0 {
            delta = -delta;
        }
        let index = last + delta;
        if index < 0 || index as usize >= num_points {
            return Err(Err::Corrupt(
                format!("face index {} outside the {} points", index, num_points),
                offset,
            ));
        }
        indices.push(index as usize);
        last = index;
    }
    Ok(indices)
}

fn decode_raw_indices(
    buffer: &mut DecoderBuffer,
    header: &Header,
    num_faces: usize,
    num_points: usize,
) -> Result<Vec<PointIdx>, Err> {
    let num_indices = num_faces * 3;
    let mut indices = Vec::with_capacity(num_indices);
    if num_points < 256 {
        for _ in 0..num_indices {
            indices.push(buffer.read_u8().map_err(Err::from)? as usize);
        }
    } else if num_points < 1 << 16 {
        for _ in 0..num_indices {
            indices.push(buffer.read_u16().map_err(Err::from)? as usize);
        }
    } else if num_points < 1 << 21 && header.version >= VERSION_2_2 {
        for _ in 0..num_indices {
            indices.push(buffer.decode_varint_u32().map_err(Err::from)? as usize);
        }
    } else {
        for _ in 0..num_indices {
            indices.push(buffer.read_u32().map_err(Err::from)? as usize);
        }
    }
    for &index in &indices {
        if index >= num_points {
            return Err(Err::Corrupt(
                format!("face index {} outside the {} points", index, num_points),
                buffer.pos(),
            ));
        }
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corner_table::GenericCornerTable;
    use crate::core::shared::bitstream_version;
    use crate::utils::bit_coder::leb128_write;

    fn v22_header() -> Header {
        Header {
            geometry_type: crate::decode::GeometryType::Mesh,
            encoder_method: crate::decode::header::EncoderMethod::Sequential,
            version: bitstream_version(2, 2),
            flags: 0,
            contains_metadata: false,
        }
    }

    fn decode(bytes: &[u8], header: &Header) -> Result<DecodedConnectivity, Err> {
        let mut buffer = DecoderBuffer::new(bytes);
        buffer.set_version(header.version);
        decode_connectivity(&mut buffer, header)
    }

    #[test]
    fn raw_u8_indices() {
        let mut bytes = Vec::new();
        leb128_write(2, &mut bytes); // num_faces
        leb128_write(4, &mut bytes); // num_points
        bytes.push(METHOD_RAW);
        bytes.extend_from_slice(&[0, 1, 2, 2, 1, 3]);

        let conn = decode(&bytes, &v22_header()).unwrap();
        assert_eq!(conn.num_points, 4);
        assert_eq!(conn.faces, vec![[0, 1, 2], [2, 1, 3]]);
        assert_eq!(conn.corner_table.num_faces(), 2);
        // The shared edge must be recovered.
        assert_eq!(conn.corner_table.opposite(0), Some(5));
    }

    #[test]
    fn raw_u16_indices() {
        let mut bytes = Vec::new();
        leb128_write(1, &mut bytes);
        leb128_write(500, &mut bytes);
        bytes.push(METHOD_RAW);
        for idx in [10u16, 499, 0] {
            bytes.extend_from_slice(&idx.to_le_bytes());
        }
        let conn = decode(&bytes, &v22_header()).unwrap();
        assert_eq!(conn.faces, vec![[10, 499, 0]]);
    }

    #[test]
    fn raw_index_out_of_range_is_corrupt() {
        let mut bytes = Vec::new();
        leb128_write(1, &mut bytes);
        leb128_write(3, &mut bytes);
        bytes.push(METHOD_RAW);
        bytes.extend_from_slice(&[0, 1, 3]); // 3 >= num_points
        assert!(matches!(
            decode(&bytes, &v22_header()),
            Err(Err::Corrupt(..))
        ));
    }

    #[test]
    fn pre_v22_counts_are_u32() {
        let mut header = v22_header();
        header.version = bitstream_version(2, 1);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.push(METHOD_RAW);
        bytes.extend_from_slice(&[0, 1, 2]);
        let conn = decode(&bytes, &header).unwrap();
        assert_eq!(conn.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn absurd_face_count_is_corrupt() {
        let mut bytes = Vec::new();
        leb128_write(u32::MAX as u64 / 2, &mut bytes);
        leb128_write(4, &mut bytes);
        assert!(matches!(
            decode(&bytes, &v22_header()),
            Err(Err::Corrupt(..))
        ));
    }

    #[test]
    fn zero_faces_yield_an_empty_mesh() {
        let mut bytes = Vec::new();
        leb128_write(0, &mut bytes);
        leb128_write(5, &mut bytes);
        let conn = decode(&bytes, &v22_header()).unwrap();
        assert_eq!(conn.num_points, 5);
        assert!(conn.faces.is_empty());
    }
}
