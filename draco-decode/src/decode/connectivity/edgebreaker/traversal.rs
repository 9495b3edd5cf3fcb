//! The three CLERS symbol sources of the edgebreaker stream.
//!
//! Standard reads the variable-length code directly from a bit section.
//! Predictive guesses the next symbol from vertex valences and reads only a
//! confirmation bit when a guess exists. Valence groups symbols by the
//! valence of the active vertex and keeps one symbol array per group.

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::{CornerTable, GenericCornerTable};
use crate::core::shared::{CornerIdx, VertexIdx, VERSION_2_2};
use crate::decode::entropy::rans::RansBitDecoder;
use crate::decode::entropy::symbol_coding::decode_symbols;
use crate::decode::Err;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClersSymbol {
    C,
    S,
    L,
    R,
    E,
}

/// Symbol order used by the valence contexts.
const SYMBOL_FROM_ID: [ClersSymbol; 5] = [
    ClersSymbol::C,
    ClersSymbol::S,
    ClersSymbol::L,
    ClersSymbol::R,
    ClersSymbol::E,
];

const MIN_VALENCE: i32 = 2;
const MAX_VALENCE: i32 = 7;
const NUM_VALENCE_CONTEXTS: usize = (MAX_VALENCE - MIN_VALENCE + 1) as usize;

/// Start-face configuration bits come from a plain bit section before v2.2
/// and from a binary rANS stream after.
enum StartFaceSource<'data> {
    Bits(DecoderBuffer<'data>),
    Rans(RansBitDecoder<'data>),
}

impl StartFaceSource<'_> {
    fn decode_bit(&mut self) -> Result<bool, Err> {
        match self {
            StartFaceSource::Bits(buffer) => {
                Ok(buffer.decode_lsb_bits(1).map_err(Err::from)? != 0)
            }
            StartFaceSource::Rans(decoder) => Ok(decoder.decode_next_bit()),
        }
    }
}

fn decode_start_faces<'data>(
    buffer: &mut DecoderBuffer<'data>,
) -> Result<StartFaceSource<'data>, Err> {
    if buffer.version() < VERSION_2_2 {
        let mut section = buffer.clone();
        let size = section.start_bit_decoding(true)? as usize;
        buffer.seek(section.pos() + size).map_err(Err::from)?;
        Ok(StartFaceSource::Bits(section))
    } else {
        Ok(StartFaceSource::Rans(RansBitDecoder::new(buffer)?))
    }
}

fn decode_attribute_seam_decoders<'data>(
    buffer: &mut DecoderBuffer<'data>,
    num_attribute_data: usize,
) -> Result<Vec<RansBitDecoder<'data>>, Err> {
    let mut decoders = Vec::with_capacity(num_attribute_data);
    for _ in 0..num_attribute_data {
        decoders.push(RansBitDecoder::new(buffer)?);
    }
    Ok(decoders)
}

/// Splits off the size-prefixed CLERS bit section and leaves the main
/// cursor after it.
fn decode_symbol_section<'data>(
    buffer: &mut DecoderBuffer<'data>,
) -> Result<DecoderBuffer<'data>, Err> {
    let mut section = buffer.clone();
    let size = section.start_bit_decoding(true)? as usize;
    if size > buffer.remaining() {
        return Err(Err::Io(
            "traversal symbol section runs past the buffer".to_string(),
            buffer.pos(),
        ));
    }
    buffer.seek(section.pos() + size).map_err(Err::from)?;
    Ok(section)
}

fn decode_clers_bits(symbol_buffer: &mut DecoderBuffer) -> Result<ClersSymbol, Err> {
    if symbol_buffer.decode_lsb_bits(1).map_err(Err::from)? == 0 {
        return Ok(ClersSymbol::C);
    }
    Ok(match symbol_buffer.decode_lsb_bits(2).map_err(Err::from)? {
        0 => ClersSymbol::S,
        1 => ClersSymbol::L,
        2 => ClersSymbol::R,
        _ => ClersSymbol::E,
    })
}

/// Valence bookkeeping shared by the predictive and valence variants.
struct ValenceTracker {
    valences: Vec<i32>,
    last_symbol: Option<ClersSymbol>,
}

impl ValenceTracker {
    fn new(num_vertices: usize) -> Self {
        Self {
            valences: vec![0; num_vertices],
            last_symbol: None,
        }
    }

    fn valence(&mut self, vertex: VertexIdx) -> i32 {
        if vertex >= self.valences.len() {
            self.valences.resize(vertex + 1, 0);
        }
        self.valences[vertex]
    }

    fn add(&mut self, vertex: VertexIdx, amount: i32) {
        if vertex >= self.valences.len() {
            self.valences.resize(vertex + 1, 0);
        }
        self.valences[vertex] += amount;
    }

    /// Applies the valence increments the last glued face implies.
    fn on_new_corner(&mut self, corner: CornerIdx, table: &CornerTable) {
        let next = table.vertex(table.next(corner));
        let prev = table.vertex(table.previous(corner));
        let tip = table.vertex(corner);
        match self.last_symbol {
            Some(ClersSymbol::C) | Some(ClersSymbol::S) => {
                self.add(next, 1);
                self.add(prev, 1);
            }
            Some(ClersSymbol::R) => {
                self.add(tip, 1);
                self.add(next, 1);
                self.add(prev, 2);
            }
            Some(ClersSymbol::L) => {
                self.add(tip, 1);
                self.add(next, 2);
                self.add(prev, 1);
            }
            Some(ClersSymbol::E) => {
                self.add(tip, 2);
                self.add(next, 2);
                self.add(prev, 2);
            }
            None => {}
        }
    }

    fn merge(&mut self, dest: VertexIdx, source: VertexIdx) {
        let src_valence = self.valence(source);
        self.add(dest, src_valence);
    }
}

pub(crate) struct StandardTraversal<'data> {
    symbol_buffer: DecoderBuffer<'data>,
    start_faces: StartFaceSource<'data>,
    seam_decoders: Vec<RansBitDecoder<'data>>,
}

pub(crate) struct PredictiveTraversal<'data> {
    symbol_buffer: DecoderBuffer<'data>,
    start_faces: StartFaceSource<'data>,
    seam_decoders: Vec<RansBitDecoder<'data>>,
    prediction_decoder: RansBitDecoder<'data>,
    tracker: ValenceTracker,
    predicted: Option<ClersSymbol>,
}

pub(crate) struct ValenceTraversal<'data> {
    start_faces: StartFaceSource<'data>,
    seam_decoders: Vec<RansBitDecoder<'data>>,
    tracker: ValenceTracker,
    context_symbols: Vec<Vec<u32>>,
    context_counters: Vec<usize>,
    active_context: Option<usize>,
}

pub(crate) enum TraversalDecoder<'data> {
    Standard(StandardTraversal<'data>),
    Predictive(PredictiveTraversal<'data>),
    Valence(ValenceTraversal<'data>),
}

impl<'data> TraversalDecoder<'data> {
    /// Reads the traversal sections from the stream. `num_vertices` bounds
    /// the valence arrays, `num_faces` sanity-checks the context symbol
    /// counts.
    pub(crate) fn start(
        traversal_type: u8,
        buffer: &mut DecoderBuffer<'data>,
        num_vertices: usize,
        num_faces: usize,
        num_attribute_data: usize,
    ) -> Result<Self, Err> {
        match traversal_type {
            0 => {
                let symbol_buffer = decode_symbol_section(buffer)?;
                let start_faces = decode_start_faces(buffer)?;
                let seam_decoders = decode_attribute_seam_decoders(buffer, num_attribute_data)?;
                Ok(TraversalDecoder::Standard(StandardTraversal {
                    symbol_buffer,
                    start_faces,
                    seam_decoders,
                }))
            }
            1 => {
                let symbol_buffer = decode_symbol_section(buffer)?;
                let start_faces = decode_start_faces(buffer)?;
                let seam_decoders = decode_attribute_seam_decoders(buffer, num_attribute_data)?;
                let prediction_decoder = RansBitDecoder::new(buffer)?;
                Ok(TraversalDecoder::Predictive(PredictiveTraversal {
                    symbol_buffer,
                    start_faces,
                    seam_decoders,
                    prediction_decoder,
                    tracker: ValenceTracker::new(num_vertices),
                    predicted: None,
                }))
            }
            2 => {
                if buffer.version() < VERSION_2_2 {
                    return Err(Err::Unsupported(
                        "valence traversal before bitstream 2.2".to_string(),
                        buffer.pos(),
                    ));
                }
                let start_faces = decode_start_faces(buffer)?;
                let seam_decoders = decode_attribute_seam_decoders(buffer, num_attribute_data)?;

                let mut context_symbols = Vec::with_capacity(NUM_VALENCE_CONTEXTS);
                let mut context_counters = Vec::with_capacity(NUM_VALENCE_CONTEXTS);
                for _ in 0..NUM_VALENCE_CONTEXTS {
                    let num_symbols = buffer.decode_varint_u32().map_err(Err::from)? as usize;
                    if num_symbols > num_faces {
                        return Err(Err::Corrupt(
                            format!(
                                "valence context with {} symbols but only {} faces",
                                num_symbols, num_faces
                            ),
                            buffer.pos(),
                        ));
                    }
                    let symbols = decode_symbols(num_symbols, 1, buffer)?;
                    context_counters.push(symbols.len());
                    context_symbols.push(symbols);
                }

                Ok(TraversalDecoder::Valence(ValenceTraversal {
                    start_faces,
                    seam_decoders,
                    tracker: ValenceTracker::new(num_vertices),
                    context_symbols,
                    context_counters,
                    active_context: None,
                }))
            }
            other => Err(Err::Unsupported(
                format!("traversal decoder type {}", other),
                buffer.pos(),
            )),
        }
    }

    pub(crate) fn decode_symbol(&mut self) -> Result<ClersSymbol, Err> {
        match self {
            TraversalDecoder::Standard(t) => decode_clers_bits(&mut t.symbol_buffer),
            TraversalDecoder::Predictive(t) => {
                if let Some(predicted) = t.predicted {
                    if t.prediction_decoder.decode_next_bit() {
                        t.tracker.last_symbol = Some(predicted);
                        return Ok(predicted);
                    }
                }
                let symbol = decode_clers_bits(&mut t.symbol_buffer)?;
                t.tracker.last_symbol = Some(symbol);
                Ok(symbol)
            }
            TraversalDecoder::Valence(t) => {
                let symbol = match t.active_context {
                    Some(context) => {
                        if t.context_counters[context] == 0 {
                            return Err(Err::Corrupt(
                                "valence context ran out of symbols".to_string(),
                                0,
                            ));
                        }
                        t.context_counters[context] -= 1;
                        let symbol_id =
                            t.context_symbols[context][t.context_counters[context]] as usize;
                        *SYMBOL_FROM_ID.get(symbol_id).ok_or_else(|| {
                            Err::Corrupt(format!("valence symbol id {}", symbol_id), 0)
                        })?
                    }
                    // The first symbol of a component has no context; it is
                    // always the end symbol opening a new triangle.
                    None => ClersSymbol::E,
                };
                t.tracker.last_symbol = Some(symbol);
                Ok(symbol)
            }
        }
    }

    pub(crate) fn decode_start_face_configuration(&mut self) -> Result<bool, Err> {
        match self {
            TraversalDecoder::Standard(t) => t.start_faces.decode_bit(),
            TraversalDecoder::Predictive(t) => t.start_faces.decode_bit(),
            TraversalDecoder::Valence(t) => t.start_faces.decode_bit(),
        }
    }

    pub(crate) fn decode_attribute_seam(&mut self, attribute: usize) -> Result<bool, Err> {
        let decoders = match self {
            TraversalDecoder::Standard(t) => &mut t.seam_decoders,
            TraversalDecoder::Predictive(t) => &mut t.seam_decoders,
            TraversalDecoder::Valence(t) => &mut t.seam_decoders,
        };
        match decoders.get_mut(attribute) {
            Some(decoder) => Ok(decoder.decode_next_bit()),
            None => Err(Err::Internal(
                format!("no seam decoder for attribute data {}", attribute),
                0,
            )),
        }
    }

    /// Called once per glued face with its tip corner, after the corner
    /// table was updated.
    pub(crate) fn new_active_corner_reached(&mut self, corner: CornerIdx, table: &CornerTable) {
        match self {
            TraversalDecoder::Standard(_) => {}
            TraversalDecoder::Predictive(t) => {
                t.tracker.on_new_corner(corner, table);
                let last = t.tracker.last_symbol;
                t.predicted = match last {
                    Some(ClersSymbol::C) | Some(ClersSymbol::R) => {
                        let pivot = table.vertex(table.next(corner));
                        if t.tracker.valence(pivot) < 6 {
                            Some(ClersSymbol::R)
                        } else {
                            Some(ClersSymbol::C)
                        }
                    }
                    _ => None,
                };
            }
            TraversalDecoder::Valence(t) => {
                t.tracker.on_new_corner(corner, table);
                let pivot = table.vertex(table.next(corner));
                let valence = t.tracker.valence(pivot).clamp(MIN_VALENCE, MAX_VALENCE);
                t.active_context = Some((valence - MIN_VALENCE) as usize);
            }
        }
    }

    /// Called when an S symbol merges two boundary vertices.
    pub(crate) fn merge_vertices(&mut self, dest: VertexIdx, source: VertexIdx) {
        match self {
            TraversalDecoder::Standard(_) => {}
            TraversalDecoder::Predictive(t) => t.tracker.merge(dest, source),
            TraversalDecoder::Valence(t) => t.tracker.merge(dest, source),
        }
    }
}

/// Packs CLERS symbols into a size-prefixed v2.2 bit section. Fixture
/// support for the connectivity tests.
#[cfg(test)]
pub(crate) fn write_clers_section(symbols: &[ClersSymbol], out: &mut Vec<u8>) {
    use crate::utils::bit_coder::leb128_write;
    let mut bits: Vec<bool> = Vec::new();
    for &s in symbols {
        match s {
            ClersSymbol::C => bits.push(false),
            ClersSymbol::S => bits.extend_from_slice(&[true, false, false]),
            ClersSymbol::L => bits.extend_from_slice(&[true, true, false]),
            ClersSymbol::R => bits.extend_from_slice(&[true, false, true]),
            ClersSymbol::E => bits.extend_from_slice(&[true, true, true]),
        }
    }
    let num_bytes = (bits.len() + 7) / 8;
    leb128_write(num_bytes as u64, out);
    let mut bytes = vec![0u8; num_bytes];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    out.extend_from_slice(&bytes);
}
