use crate::core::buffer::DecoderBuffer;
use crate::core::shared::{bitstream_version, MAX_SUPPORTED_VERSION, VERSION_HEADER_FLAGS};
use crate::decode::{Err, GeometryType};

/// The metadata bit of the header flags.
const METADATA_FLAG_MASK: u16 = 0x8000;

/// How the geometry body was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EncoderMethod {
    Sequential,
    Edgebreaker,
    KdTree,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub geometry_type: GeometryType,
    pub encoder_method: EncoderMethod,
    pub version: u16,
    #[allow(unused)]
    pub flags: u16,
    pub contains_metadata: bool,
}

/// Parses the fixed header and stamps the version on the buffer.
pub(crate) fn decode_header(buffer: &mut DecoderBuffer) -> Result<Header, Err> {
    let mut magic = [0u8; 5];
    buffer
        .read_bytes(&mut magic)
        .map_err(|_| Err::Io("header shorter than the magic".to_string(), 0))?;
    if &magic != b"DRACO" {
        return Err(Err::Corrupt("Invalid Draco magic".to_string(), 0));
    }

    let version_offset = buffer.pos();
    let major = buffer.read_u8().map_err(Err::from)?;
    let minor = buffer.read_u8().map_err(Err::from)?;
    let version = bitstream_version(major, minor);
    if version > MAX_SUPPORTED_VERSION || version < bitstream_version(0, 9) {
        return Err(Err::UnsupportedVersion(
            format!("bitstream version {}.{}", major, minor),
            version_offset,
        ));
    }
    buffer.set_version(version);

    let geometry_type = match buffer.read_u8().map_err(Err::from)? {
        0 => GeometryType::PointCloud,
        1 => GeometryType::Mesh,
        other => {
            return Err(Err::Corrupt(
                format!("unknown encoder type {}", other),
                buffer.pos() - 1,
            ))
        }
    };

    let method_byte = buffer.read_u8().map_err(Err::from)?;
    let encoder_method = match (geometry_type, method_byte) {
        (_, 0) => EncoderMethod::Sequential,
        (GeometryType::Mesh, 1) => EncoderMethod::Edgebreaker,
        (GeometryType::PointCloud, 1) => EncoderMethod::KdTree,
        (_, other) => {
            return Err(Err::Corrupt(
                format!("unknown encoder method {}", other),
                buffer.pos() - 1,
            ))
        }
    };

    let flags = if version >= VERSION_HEADER_FLAGS {
        buffer.read_u16().map_err(Err::from)?
    } else {
        0
    };

    Ok(Header {
        geometry_type,
        encoder_method,
        version,
        flags,
        contains_metadata: flags & METADATA_FLAG_MASK != 0,
    })
}
