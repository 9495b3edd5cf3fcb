//! The symbol-coding layer above the raw rANS decoders: picks between the
//! tagged-length scheme and the raw scheme, and undoes zig-zag mapping for
//! schemes with signed corrections.

use crate::core::buffer::DecoderBuffer;
use crate::decode::entropy::rans::RansSymbolDecoder;
use crate::decode::Err;

const TAGGED_SCHEME: u8 = 0;
const RAW_SCHEME: u8 = 1;

/// Tags are bit lengths of 32-bit values, stored in five bits.
const TAG_BIT_LENGTH: u32 = 5;

/// The raw scheme caps its symbol width; larger declared widths are corrupt.
const MAX_RAW_BIT_LENGTH: u32 = 18;

/// Decodes `num_values` integers. Values belonging to one entry of
/// `num_components` components share a length tag in the tagged scheme.
pub(crate) fn decode_symbols(
    num_values: usize,
    num_components: usize,
    buffer: &mut DecoderBuffer,
) -> Result<Vec<u32>, Err> {
    if num_values == 0 {
        return Ok(Vec::new());
    }
    let scheme = buffer.read_u8().map_err(Err::from)?;
    match scheme {
        TAGGED_SCHEME => decode_tagged_symbols(num_values, num_components.max(1), buffer),
        RAW_SCHEME => decode_raw_symbols(num_values, buffer),
        _ => Err(Err::Unsupported(
            format!("symbol coding scheme {}", scheme),
            buffer.pos() - 1,
        )),
    }
}

fn decode_tagged_symbols(
    num_values: usize,
    num_components: usize,
    buffer: &mut DecoderBuffer,
) -> Result<Vec<u32>, Err> {
    let mut tag_decoder = RansSymbolDecoder::new(buffer, TAG_BIT_LENGTH)?;
    tag_decoder.start_decoding(buffer)?;
    let has_tags = tag_decoder.num_symbols() > 0;

    // The value bits follow the tag model in one unsized bit section.
    buffer.start_bit_decoding(false).map_err(Err::from)?;
    let mut out = Vec::with_capacity(num_values);
    while out.len() < num_values {
        // Without a tag model the bit lengths sit inline before each group.
        let bit_length = if has_tags {
            tag_decoder.decode_symbol() as u32
        } else {
            buffer.decode_lsb_bits(TAG_BIT_LENGTH).map_err(Err::from)?
        };
        if bit_length > 32 {
            let offset = buffer.pos();
            buffer.end_bit_decoding();
            return Err(Err::Corrupt(
                format!("value bit length {} exceeds 32", bit_length),
                offset,
            ));
        }
        for _ in 0..num_components {
            if out.len() == num_values {
                break;
            }
            let value = buffer.decode_lsb_bits(bit_length).map_err(Err::from)?;
            out.push(value);
        }
    }
    buffer.end_bit_decoding();
    Ok(out)
}

fn decode_raw_symbols(num_values: usize, buffer: &mut DecoderBuffer) -> Result<Vec<u32>, Err> {
    let max_bit_length = buffer.read_u8().map_err(Err::from)? as u32;
    if max_bit_length == 0 || max_bit_length > MAX_RAW_BIT_LENGTH {
        return Err(Err::Corrupt(
            format!("raw symbol bit length {} out of range", max_bit_length),
            buffer.pos() - 1,
        ));
    }
    let mut decoder = RansSymbolDecoder::new(buffer, max_bit_length)?;
    decoder.start_decoding(buffer)?;
    let mut out = Vec::with_capacity(num_values);
    for _ in 0..num_values {
        out.push(decoder.decode_symbol() as u32);
    }
    Ok(out)
}

/// Zig-zag un-mapping: `1 -> -1, 2 -> 1, 3 -> -2, ...`
#[inline]
pub(crate) fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Applies zig-zag un-mapping to a whole symbol array.
pub(crate) fn convert_symbols_to_signed(symbols: &[u32]) -> Vec<i32> {
    symbols.iter().map(|&s| zigzag_decode(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::entropy::rans::test_coder::RansEncoder;
    use crate::decode::entropy::rans::test_coder::write_freq_table;
    use crate::utils::bit_coder::leb128_write;

    /// Raw-scheme stream for the given values.
    fn build_raw_stream(values: &[u32], max_bit_length: u32) -> Vec<u8> {
        let num_symbols = 1usize << max_bit_length;
        let mut freq_counts = vec![0u32; num_symbols];
        for &v in values {
            freq_counts[v as usize] += 1;
        }
        // Spread the remaining probability mass so the total hits the
        // precision exactly; slot 0 absorbs the remainder.
        let precision_bits = crate::decode::entropy::compute_rans_precision_bits(max_bit_length);
        let precision = 1u32 << precision_bits;
        let total: u32 = freq_counts.iter().sum();
        let mut scaled: Vec<u32> = freq_counts
            .iter()
            .map(|&f| if f == 0 { 0 } else { (f * precision / total).max(1) })
            .collect();
        let scaled_total: u32 = scaled.iter().sum();
        let first_used = scaled.iter().position(|&f| f > 0).unwrap();
        scaled[first_used] = scaled[first_used] + precision - scaled_total;

        let mut stream = vec![RAW_SCHEME, max_bit_length as u8];
        write_freq_table(&scaled, &mut stream);
        let mut encoder = RansEncoder::new(&scaled, precision_bits);
        for &v in values.iter().rev() {
            encoder.write(v as usize);
        }
        let payload = encoder.flush();
        leb128_write(payload.len() as u64, &mut stream);
        stream.extend_from_slice(&payload);
        stream
    }

    #[test]
    fn raw_scheme_round_trip() {
        let values = vec![0u32, 5, 3, 3, 7, 1, 0, 6, 2, 2, 2, 5];
        let stream = build_raw_stream(&values, 3);
        let mut buffer = DecoderBuffer::new(&stream);
        let decoded = decode_symbols(values.len(), 1, &mut buffer).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn tagged_scheme_with_single_tag() {
        // One tag symbol with full probability makes the rANS stream carry
        // no renormalization bytes: the tag table says "always 4 bits".
        let values = vec![3u32, 9, 14, 1, 0, 7];
        let mut stream = vec![TAGGED_SCHEME];
        // Tag model: tags 0..3 at zero probability, tag "4 bits" at full mass.
        let freqs = vec![0u32, 0, 0, 0, 4096];
        write_freq_table(&freqs, &mut stream);
        // Empty payload: just the state tag byte.
        leb128_write(1, &mut stream);
        stream.push(0);
        // Value bits, LSB-first, 4 bits each, packed by hand.
        let mut bits: u64 = 0;
        for (i, &v) in values.iter().enumerate() {
            bits |= (v as u64) << (4 * i);
        }
        stream.extend_from_slice(&bits.to_le_bytes()[..3]);

        let mut buffer = DecoderBuffer::new(&stream);
        let decoded = decode_symbols(values.len(), 1, &mut buffer).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn empty_input_reads_nothing() {
        let stream: Vec<u8> = Vec::new();
        let mut buffer = DecoderBuffer::new(&stream);
        assert!(decode_symbols(0, 3, &mut buffer).unwrap().is_empty());
    }

    #[test]
    fn unknown_scheme_is_unsupported() {
        let stream = vec![9u8];
        let mut buffer = DecoderBuffer::new(&stream);
        assert!(matches!(
            decode_symbols(4, 1, &mut buffer),
            Err(Err::Unsupported(..))
        ));
    }

    #[test]
    fn zigzag_matches_the_reference_mapping() {
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_decode(4), 2);
        assert_eq!(convert_symbols_to_signed(&[6, 5]), vec![3, -3]);
    }
}
