//! Skips the key/value metadata block that precedes the geometry body when
//! the header's metadata flag is set. The decoder does not surface metadata;
//! it only has to land the cursor on the first geometry byte.

use crate::core::buffer::DecoderBuffer;
use crate::decode::Err;

/// Sub-metadata nesting deeper than this is treated as corrupt rather than
/// recursed into.
const MAX_METADATA_DEPTH: u32 = 64;

pub(crate) fn skip_metadata(buffer: &mut DecoderBuffer) -> Result<(), Err> {
    let num_attribute_metadata = buffer.decode_varint_u32().map_err(Err::from)?;
    for _ in 0..num_attribute_metadata {
        // Attribute unique id this metadata is bound to.
        let _ = buffer.decode_varint_u32().map_err(Err::from)?;
        skip_single_metadata(buffer, 0)?;
    }
    // Geometry-level metadata.
    skip_single_metadata(buffer, 0)
}

fn skip_single_metadata(buffer: &mut DecoderBuffer, depth: u32) -> Result<(), Err> {
    if depth > MAX_METADATA_DEPTH {
        return Err(Err::Corrupt(
            "metadata nesting too deep".to_string(),
            buffer.pos(),
        ));
    }

    let num_entries = buffer.decode_varint_u32().map_err(Err::from)?;
    for _ in 0..num_entries {
        let name_len = buffer.read_u8().map_err(Err::from)? as usize;
        buffer.advance(name_len).map_err(Err::from)?;
        let data_size = buffer.decode_varint_u32().map_err(Err::from)? as usize;
        if data_size == 0 {
            return Err(Err::Corrupt(
                "metadata entry with empty value".to_string(),
                buffer.pos(),
            ));
        }
        buffer.advance(data_size).map_err(Err::from)?;
    }

    let num_sub_metadata = buffer.decode_varint_u32().map_err(Err::from)? as usize;
    if num_sub_metadata > buffer.remaining() {
        return Err(Err::Corrupt(
            "sub-metadata count exceeds the remaining stream".to_string(),
            buffer.pos(),
        ));
    }
    for _ in 0..num_sub_metadata {
        let name_len = buffer.read_u8().map_err(Err::from)? as usize;
        buffer.advance(name_len).map_err(Err::from)?;
        skip_single_metadata(buffer, depth + 1)?;
    }
    Ok(())
}
