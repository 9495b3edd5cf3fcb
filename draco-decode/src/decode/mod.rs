use crate::core::buffer::{DecoderBuffer, ReaderErr};
use crate::core::mesh::{Mesh, PointCloud};
use crate::core::shared::VERSION_VARINT_COUNTS;

mod attribute;
mod connectivity;
mod entropy;
mod header;
mod metadata;

use header::EncoderMethod;

/// What kind of geometry a bitstream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    PointCloud,
    Mesh,
}

/// Decoder failure. Every variant carries a short diagnostic and the buffer
/// offset at which it was raised.
#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    /// The stream violates the format: bad magic, impossible counts,
    /// inconsistent probability tables.
    #[error("corrupt bitstream at offset {1}: {0}")]
    Corrupt(String, usize),
    /// A decoder invariant broke during reconstruction. Indicates a decoder
    /// bug rather than a bad input.
    #[error("decoder invariant violated at offset {1}: {0}")]
    Internal(String, usize),
    /// The buffer ran out while a read was pending.
    #[error("io error at offset {1}: {0}")]
    Io(String, usize),
    /// The stream uses a feature this decoder does not implement.
    #[error("unsupported at offset {1}: {0}")]
    Unsupported(String, usize),
    /// The stream declares a version newer than the decoder.
    #[error("unsupported version at offset {1}: {0}")]
    UnsupportedVersion(String, usize),
}

impl Err {
    /// Buffer offset the error was raised at.
    pub fn offset(&self) -> usize {
        match self {
            Err::Corrupt(_, offset)
            | Err::Internal(_, offset)
            | Err::Io(_, offset)
            | Err::Unsupported(_, offset)
            | Err::UnsupportedVersion(_, offset) => *offset,
        }
    }
}

impl From<ReaderErr> for Err {
    fn from(e: ReaderErr) -> Self {
        match e {
            ReaderErr::NotEnoughData(offset) => Err::Io("buffer underflow".to_string(), offset),
            ReaderErr::VarintTooLong(offset) => {
                Err::Corrupt("varint with runaway continuation".to_string(), offset)
            }
        }
    }
}

/// Peeks the header and reports whether the stream holds a mesh or a point
/// cloud.
pub fn get_encoded_geometry_type(data: &[u8]) -> Result<GeometryType, Err> {
    let mut buffer = DecoderBuffer::new(data);
    Ok(header::decode_header(&mut buffer)?.geometry_type)
}

/// Decodes a mesh bitstream into a [`Mesh`].
pub fn decode_mesh(data: &[u8]) -> Result<Mesh, Err> {
    let mut buffer = DecoderBuffer::new(data);
    let header = header::decode_header(&mut buffer)?;
    if header.geometry_type != GeometryType::Mesh {
        return Err(Err::Unsupported(
            "the stream encodes a point cloud, not a mesh".to_string(),
            buffer.pos(),
        ));
    }
    decode_mesh_body(&mut buffer, &header)
}

/// Decodes a point-cloud bitstream into a [`PointCloud`].
pub fn decode_point_cloud(data: &[u8]) -> Result<PointCloud, Err> {
    let mut buffer = DecoderBuffer::new(data);
    let header = header::decode_header(&mut buffer)?;
    if header.geometry_type != GeometryType::PointCloud {
        return Err(Err::Unsupported(
            "the stream encodes a mesh, not a point cloud".to_string(),
            buffer.pos(),
        ));
    }
    decode_point_cloud_body(&mut buffer, &header)
}

fn decode_mesh_body(buffer: &mut DecoderBuffer, header: &header::Header) -> Result<Mesh, Err> {
    if header.contains_metadata {
        metadata::skip_metadata(buffer)?;
    }

    let connectivity = connectivity::decode_connectivity(buffer, header)?;
    let attributes = attribute::decode_attributes(
        buffer,
        header,
        Some(&connectivity),
        connectivity.num_points,
    )?;

    Ok(Mesh {
        cloud: PointCloud {
            num_points: connectivity.num_points,
            attributes,
        },
        faces: connectivity.faces,
    })
}

fn decode_point_cloud_body(
    buffer: &mut DecoderBuffer,
    header: &header::Header,
) -> Result<PointCloud, Err> {
    if header.contains_metadata {
        metadata::skip_metadata(buffer)?;
    }

    if header.encoder_method == EncoderMethod::KdTree {
        return Err(Err::Unsupported(
            "kd-tree point cloud encoding".to_string(),
            buffer.pos(),
        ));
    }

    let num_points = if header.version < VERSION_VARINT_COUNTS {
        buffer.read_u32().map_err(Err::from)? as usize
    } else {
        buffer.decode_varint_u32().map_err(Err::from)? as usize
    };

    let attributes = attribute::decode_attributes(buffer, header, None, num_points)?;

    Ok(PointCloud {
        num_points,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_type_peek() {
        let mut bytes = b"DRACO".to_vec();
        bytes.extend_from_slice(&[2, 2, 0, 0, 0, 0]);
        assert_eq!(
            get_encoded_geometry_type(&bytes).unwrap(),
            GeometryType::PointCloud
        );
        bytes[7] = 1;
        assert_eq!(
            get_encoded_geometry_type(&bytes).unwrap(),
            GeometryType::Mesh
        );
    }

    #[test]
    fn mesh_api_rejects_point_cloud_streams() {
        let mut bytes = b"DRACO".to_vec();
        bytes.extend_from_slice(&[2, 2, 0, 0, 0, 0]);
        assert!(matches!(decode_mesh(&bytes), Err(Err::Unsupported(..))));
    }

    #[test]
    fn error_offsets_are_exposed() {
        let err = Err::Corrupt("x".to_string(), 17);
        assert_eq!(err.offset(), 17);
    }
}
