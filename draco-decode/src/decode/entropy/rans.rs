//! Range-asymmetric-numeral-systems decoders.
//!
//! Every coder here consumes its payload back to front: the encoder emits
//! renormalization bytes forward, so the decoder must read them in reverse
//! to unwind the state transitions.

use crate::core::buffer::{DecoderBuffer, ReverseByteReader};
use crate::core::shared::VERSION_2_2;
use crate::decode::entropy::{
    compute_rans_precision_bits, rans_build_tables, RansSymbol, L_RABS_BASE, RABS_PRECISION,
};
use crate::decode::Err;

/// Reads the tagged final bytes of a coded chunk and returns the seeded
/// state. The top two bits of the last byte say how many earlier bytes
/// participate; the remaining six are the most significant state bits.
fn read_initial_state(reader: &mut ReverseByteReader, l_base: u64) -> Result<u64, Err> {
    let offset = reader.offset();
    let metadata = reader
        .read_u8_back()
        .map_err(|_| Err::Io("rans stream too short for its state tag".to_string(), offset))?;
    let tag = metadata >> 6;
    let mut state: u64 = 0;
    for shift in (0..tag).rev() {
        let byte = reader.read_u8_back().map_err(|_| {
            Err::Io(
                "rans stream too short for its initial state".to_string(),
                offset,
            )
        })?;
        state |= (byte as u64) << (8 * shift);
    }
    state |= ((metadata & 0x3F) as u64) << (8 * tag);
    Ok(state + l_base)
}

/// Multi-symbol rANS decoder over an explicit probability table.
pub(crate) struct RansDecoder<'data> {
    state: u64,
    reader: ReverseByteReader<'data>,
    slot_table: Vec<u32>,
    rans_syms: Vec<RansSymbol>,
    precision_bits: u32,
    l_rans_base: u64,
}

impl<'data> RansDecoder<'data> {
    /// The chunk of `num_bytes` coded bytes is taken from the buffer; the
    /// buffer cursor ends up past it.
    pub(crate) fn new(
        buffer: &mut DecoderBuffer<'data>,
        num_bytes: usize,
        freq_counts: &[u32],
        precision_bits: u32,
    ) -> Result<Self, Err> {
        let table_offset = buffer.pos();
        let mut reader = buffer
            .spawn_reverse_reader(num_bytes)
            .map_err(Err::from)?;
        // The symbol coder renormalizes against four times its precision.
        let l_rans_base = 4u64 << precision_bits;
        let state = read_initial_state(&mut reader, l_rans_base)?;
        let (slot_table, rans_syms) = rans_build_tables(freq_counts, precision_bits, table_offset)?;
        Ok(Self {
            state,
            reader,
            slot_table,
            rans_syms,
            precision_bits,
            l_rans_base,
        })
    }

    /// Decodes one symbol. An exhausted stream keeps yielding symbols from
    /// the residual state; the caller bounds the number of calls.
    pub(crate) fn read(&mut self) -> usize {
        while self.state < self.l_rans_base {
            match self.reader.try_read_u8_back() {
                Some(byte) => self.state = self.state * 256 + byte as u64,
                None => break,
            }
        }
        let precision = 1u64 << self.precision_bits;
        let quotient = self.state / precision;
        let remainder = self.state % precision;
        let symbol_idx = self.slot_table[remainder as usize] as usize;
        let symbol = &self.rans_syms[symbol_idx];
        self.state = quotient * symbol.freq_count as u64 + remainder - symbol.freq_cumulative as u64;
        symbol_idx
    }
}

/// Binary rANS decoder parameterized by the probability of a zero bit.
pub(crate) struct RabsDecoder<'data> {
    state: u64,
    reader: ReverseByteReader<'data>,
    prob_zero: u64,
}

impl<'data> RabsDecoder<'data> {
    pub(crate) fn new(
        buffer: &mut DecoderBuffer<'data>,
        num_bytes: usize,
        prob_zero: u8,
    ) -> Result<Self, Err> {
        let mut reader = buffer.spawn_reverse_reader(num_bytes).map_err(Err::from)?;
        let state = read_initial_state(&mut reader, L_RABS_BASE)?;
        Ok(Self {
            state,
            reader,
            prob_zero: prob_zero as u64,
        })
    }

    pub(crate) fn read(&mut self) -> bool {
        let prob_one = RABS_PRECISION - self.prob_zero;
        if self.state < L_RABS_BASE {
            if let Some(byte) = self.reader.try_read_u8_back() {
                self.state = self.state * 256 + byte as u64;
            }
        }
        let x = self.state;
        let quotient = x / RABS_PRECISION;
        let remainder = x % RABS_PRECISION;
        let xn = quotient * prob_one;
        if remainder < prob_one {
            self.state = xn + remainder;
            true
        } else {
            self.state = x - xn - prob_one;
            false
        }
    }
}

/// Bit decoder framing used all over the stream: one probability byte, a
/// size, and the coded chunk.
pub(crate) struct RansBitDecoder<'data> {
    rabs: RabsDecoder<'data>,
}

impl<'data> RansBitDecoder<'data> {
    pub(crate) fn new(buffer: &mut DecoderBuffer<'data>) -> Result<Self, Err> {
        let prob_zero = buffer.read_u8().map_err(Err::from)?;
        let size = if buffer.version() < VERSION_2_2 {
            buffer.read_u32().map_err(Err::from)? as usize
        } else {
            buffer.decode_varint_u32().map_err(Err::from)? as usize
        };
        if size > buffer.remaining() {
            return Err(Err::Io(
                "bit coder chunk runs past the end of the buffer".to_string(),
                buffer.pos(),
            ));
        }
        let rabs = RabsDecoder::new(buffer, size, prob_zero)?;
        Ok(Self { rabs })
    }

    pub(crate) fn decode_next_bit(&mut self) -> bool {
        self.rabs.read()
    }
}

/// Symbol decoder that owns its probability model, read from the stream.
pub(crate) struct RansSymbolDecoder<'data> {
    num_symbols: usize,
    decoder: Option<RansDecoder<'data>>,
    freq_counts: Vec<u32>,
    precision_bits: u32,
}

impl<'data> RansSymbolDecoder<'data> {
    /// Reads the probability table. `max_symbol_bit_length` fixes the
    /// decoder precision.
    pub(crate) fn new(
        buffer: &mut DecoderBuffer<'data>,
        max_symbol_bit_length: u32,
    ) -> Result<Self, Err> {
        let precision_bits = compute_rans_precision_bits(max_symbol_bit_length);
        let num_symbols = buffer.decode_varint_u32().map_err(Err::from)? as usize;
        if num_symbols > 1 << 20 {
            return Err(Err::Corrupt(
                format!("rans model declares {} symbols", num_symbols),
                buffer.pos(),
            ));
        }
        let mut freq_counts = vec![0u32; num_symbols];

        let mut i = 0;
        while i < num_symbols {
            let prob_data = buffer.read_u8().map_err(Err::from)? as u32;
            let token = prob_data & 3;
            if token == 3 {
                // A run of zero-probability symbols, length in the top bits.
                let offset = (prob_data >> 2) as usize;
                if i + offset >= num_symbols {
                    return Err(Err::Corrupt(
                        "zero-probability run overflows the symbol table".to_string(),
                        buffer.pos(),
                    ));
                }
                i += offset;
            } else {
                // `token` extra bytes extend the probability.
                let mut prob = prob_data >> 2;
                for b in 0..token {
                    let extra = buffer.read_u8().map_err(Err::from)? as u32;
                    prob |= extra << (8 * (b + 1) - 2);
                }
                freq_counts[i] = prob;
            }
            i += 1;
        }

        Ok(Self {
            num_symbols,
            decoder: None,
            freq_counts,
            precision_bits,
        })
    }

    pub(crate) fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    /// Reads the coded chunk length and seeds the rANS state.
    pub(crate) fn start_decoding(&mut self, buffer: &mut DecoderBuffer<'data>) -> Result<(), Err> {
        let bytes_encoded = buffer.decode_varint_u64().map_err(Err::from)? as usize;
        if bytes_encoded > buffer.remaining() {
            return Err(Err::Io(
                "rans chunk runs past the end of the buffer".to_string(),
                buffer.pos(),
            ));
        }
        self.decoder = Some(RansDecoder::new(
            buffer,
            bytes_encoded,
            &self.freq_counts,
            self.precision_bits,
        )?);
        Ok(())
    }

    pub(crate) fn decode_symbol(&mut self) -> usize {
        self.decoder
            .as_mut()
            .expect("start_decoding must run before decode_symbol")
            .read()
    }
}


#[cfg(test)]
mod tests {
    use super::test_coder::*;
    use super::*;

    #[test]
    fn rans_round_trip() {
        let num_symbols = 43;
        let precision_bits = 12;
        let (data, freq_counts) = {
            let mut data = Vec::new();
            let mut freq_counts = vec![0u32; num_symbols];
            let mut x = 3usize;
            for _ in 0..1 << precision_bits {
                x = (x + 37) % num_symbols;
                data.push(x);
                freq_counts[x] += 1;
            }
            (data, freq_counts)
        };

        let mut encoder = RansEncoder::new(&freq_counts, precision_bits);
        for &symbol in data.iter().rev() {
            encoder.write(symbol);
        }
        let chunk = encoder.flush();

        let mut buffer = DecoderBuffer::new(&chunk);
        let mut decoder =
            RansDecoder::new(&mut buffer, chunk.len(), &freq_counts, precision_bits).unwrap();
        for &symbol in &data {
            assert_eq!(decoder.read(), symbol);
        }
    }

    #[test]
    fn rans_skewed_distribution() {
        // Symbol 0 takes almost the whole range.
        let freq_counts = vec![4093u32, 2, 1];
        let data = vec![0, 0, 1, 0, 2, 0, 0, 1, 0, 0, 0, 2, 0];

        let mut encoder = RansEncoder::new(&freq_counts, 12);
        for &symbol in data.iter().rev() {
            encoder.write(symbol);
        }
        let chunk = encoder.flush();

        let mut buffer = DecoderBuffer::new(&chunk);
        let mut decoder = RansDecoder::new(&mut buffer, chunk.len(), &freq_counts, 12).unwrap();
        for &symbol in &data {
            assert_eq!(decoder.read(), symbol);
        }
    }

    #[test]
    fn rabs_round_trip() {
        let prob_zero = 100u8;
        let bits: Vec<bool> = (0..2000).map(|i| (i * 67) % 256 >= 100).collect();

        let mut encoder = RabsEncoder::new(prob_zero);
        for &bit in bits.iter().rev() {
            encoder.write(bit);
        }
        let chunk = encoder.flush();

        let mut buffer = DecoderBuffer::new(&chunk);
        let mut decoder = RabsDecoder::new(&mut buffer, chunk.len(), prob_zero).unwrap();
        for &bit in &bits {
            assert_eq!(decoder.read(), bit);
        }
    }

    #[test]
    fn bit_decoder_reads_its_own_framing() {
        let bits = vec![true, false, false, true, true, true, false, true];
        let mut stream = Vec::new();
        write_bit_chunk(&bits, 128, &mut stream);
        stream.push(0xEE); // trailing data the decoder must not touch

        let mut buffer = DecoderBuffer::new(&stream);
        buffer.set_version(crate::core::shared::bitstream_version(2, 2));
        let mut decoder = RansBitDecoder::new(&mut buffer).unwrap();
        for &bit in &bits {
            assert_eq!(decoder.decode_next_bit(), bit);
        }
        assert_eq!(buffer.read_u8().unwrap(), 0xEE);
    }

    #[test]
    fn symbol_decoder_reads_model_and_stream() {
        let freq_counts = vec![2048u32, 1024, 512, 512];
        let data = vec![0usize, 1, 0, 2, 3, 1, 0, 0, 2, 1, 3, 0];

        let mut stream = Vec::new();
        write_freq_table(&freq_counts, &mut stream);
        let mut encoder = RansEncoder::new(&freq_counts, 12);
        for &symbol in data.iter().rev() {
            encoder.write(symbol);
        }
        let payload = encoder.flush();
        crate::utils::bit_coder::leb128_write(payload.len() as u64, &mut stream);
        stream.extend_from_slice(&payload);

        let mut buffer = DecoderBuffer::new(&stream);
        // Bit length 5 keeps the precision at the 12-bit floor.
        let mut decoder = RansSymbolDecoder::new(&mut buffer, 5).unwrap();
        assert_eq!(decoder.num_symbols(), 4);
        decoder.start_decoding(&mut buffer).unwrap();
        for &symbol in &data {
            assert_eq!(decoder.decode_symbol(), symbol);
        }
    }

    #[test]
    fn probability_sum_mismatch_is_corrupt() {
        // Declares two symbols whose probabilities cannot reach 4096.
        let mut stream = Vec::new();
        write_freq_table(&[5, 6], &mut stream);
        stream.extend_from_slice(&[1, 0]);
        let mut buffer = DecoderBuffer::new(&stream);
        let mut decoder = RansSymbolDecoder::new(&mut buffer, 5).unwrap();
        assert!(matches!(
            decoder.start_decoding(&mut buffer),
            Err(Err::Corrupt(..))
        ));
    }

    #[test]
    fn exhausted_stream_does_not_panic() {
        let freq_counts = vec![4096u32];
        let chunk = vec![0u8]; // state tag 0, state 0
        let mut buffer = DecoderBuffer::new(&chunk);
        let mut decoder = RansDecoder::new(&mut buffer, 1, &freq_counts, 12).unwrap();
        for _ in 0..100 {
            assert_eq!(decoder.read(), 0);
        }
    }
}
