//! The attribute pipeline: per attributes-decoder metadata, encoder-type
//! selection, portable integer decoding with prediction, transform
//! parameters, and the final conversion to the original format.
//!
//! Phases run globally: every decoder finishes a phase before any decoder
//! enters the next one, and within a phase decoders run in declared order.

pub(crate) mod inverse_transform;
pub(crate) mod octahedron;
pub(crate) mod prediction;
pub(crate) mod transform;
pub(crate) mod traverser;

use crate::core::attribute::{AttributeType, DataType, PointAttribute};
use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::GenericCornerTable;
use crate::core::shared::{
    CornerIdx, PointIdx, VERSION_TRAVERSAL_METHOD, VERSION_VARINT_COUNTS, VERSION_VARINT_UNIQUE_ID,
};
use crate::decode::connectivity::DecodedConnectivity;
use crate::decode::entropy::symbol_coding::{convert_symbols_to_signed, decode_symbols};
use crate::decode::header::{EncoderMethod, Header};
use crate::decode::{Err, GeometryType};
use inverse_transform::InverseTransform;
use prediction::{PredictionContext, PredictionScheme};
use transform::{OctahedronParams, QuantizationParams};
use traverser::{generate_sequence, TraversalMethod};

const ENCODER_GENERIC: u8 = 0;
const ENCODER_INTEGER: u8 = 1;
const ENCODER_QUANTIZATION: u8 = 2;
const ENCODER_NORMALS: u8 = 3;

/// Decoded portable position data, kept around for the predictors that
/// need a parent position attribute.
struct PositionStore {
    values: Vec<i64>,
    num_components: usize,
    point_to_entry: Vec<usize>,
}

struct AttributeSlot {
    attribute: PointAttribute,
    encoder_type: u8,
    portable: Vec<i64>,
    portable_nc: usize,
    raw: Vec<u8>,
    quant: Option<QuantizationParams>,
    oct: Option<OctahedronParams>,
}

struct DecoderState<'conn> {
    att_data_id: i8,
    traversal_method: TraversalMethod,
    slots: Vec<AttributeSlot>,
    table: Option<&'conn dyn GenericCornerTable>,
    point_ids: Vec<PointIdx>,
    data_to_corner: Vec<CornerIdx>,
    vertex_to_data: Vec<isize>,
    explicit_mapping: Option<Vec<usize>>,
}

pub(crate) fn decode_attributes(
    buffer: &mut DecoderBuffer,
    header: &Header,
    connectivity: Option<&DecodedConnectivity>,
    num_points: usize,
) -> Result<Vec<PointAttribute>, Err> {
    let version = header.version;
    let num_attributes_decoders = buffer.read_u8().map_err(Err::from)? as usize;
    let is_edgebreaker = header.geometry_type == GeometryType::Mesh
        && header.encoder_method == EncoderMethod::Edgebreaker;

    let mut decoders: Vec<DecoderState> = Vec::with_capacity(num_attributes_decoders);
    for _ in 0..num_attributes_decoders {
        let (att_data_id, traversal_method) = if is_edgebreaker {
            let offset = buffer.pos();
            let att_data_id = buffer.read_i8().map_err(Err::from)?;
            let num_attribute_data = connectivity.map_or(0, |c| c.attribute_data.len());
            if att_data_id < -1 || att_data_id as i64 >= num_attribute_data as i64 {
                return Err(Err::Corrupt(
                    format!("attribute data id {} out of range", att_data_id),
                    offset,
                ));
            }
            // Decoder type byte (vertex vs corner attributes); the corner
            // table binding above already captures it.
            let _ = buffer.read_u8().map_err(Err::from)?;
            let traversal_method = if version >= VERSION_TRAVERSAL_METHOD {
                TraversalMethod::from_byte(buffer.read_u8().map_err(Err::from)?, buffer.pos() - 1)?
            } else {
                TraversalMethod::DepthFirst
            };
            (att_data_id, traversal_method)
        } else {
            (-1, TraversalMethod::DepthFirst)
        };
        decoders.push(DecoderState {
            att_data_id,
            traversal_method,
            slots: Vec::new(),
            table: None,
            point_ids: Vec::new(),
            data_to_corner: Vec::new(),
            vertex_to_data: Vec::new(),
            explicit_mapping: None,
        });
    }

    // Attribute metadata.
    for decoder in decoders.iter_mut() {
        let offset = buffer.pos();
        let num_attributes = if version < VERSION_VARINT_COUNTS {
            buffer.read_u32().map_err(Err::from)? as usize
        } else {
            buffer.decode_varint_u32().map_err(Err::from)? as usize
        };
        if num_attributes == 0 {
            return Err(Err::Corrupt(
                "attributes decoder with no attributes".to_string(),
                offset,
            ));
        }
        if num_attributes > buffer.remaining() {
            return Err(Err::Corrupt(
                format!("{} attributes cannot fit the stream", num_attributes),
                offset,
            ));
        }
        for _ in 0..num_attributes {
            let offset = buffer.pos();
            let att_type_byte = buffer.read_u8().map_err(Err::from)?;
            let att_type = AttributeType::from_id(att_type_byte).ok_or_else(|| {
                Err::Corrupt(format!("attribute type {}", att_type_byte), offset)
            })?;
            let data_type_byte = buffer.read_u8().map_err(Err::from)?;
            let data_type = DataType::from_id(data_type_byte).ok_or_else(|| {
                Err::Corrupt(format!("attribute data type {}", data_type_byte), offset)
            })?;
            let num_components = buffer.read_u8().map_err(Err::from)?;
            if num_components == 0 {
                return Err(Err::Corrupt(
                    "attribute with zero components".to_string(),
                    offset,
                ));
            }
            let normalized = buffer.read_u8().map_err(Err::from)? != 0;
            let unique_id = if version < VERSION_VARINT_UNIQUE_ID {
                buffer.read_u16().map_err(Err::from)? as u32
            } else {
                buffer.decode_varint_u32().map_err(Err::from)?
            };
            decoder.slots.push(AttributeSlot {
                attribute: PointAttribute::new(
                    att_type,
                    data_type,
                    num_components,
                    normalized,
                    unique_id,
                ),
                encoder_type: 0,
                portable: Vec::new(),
                portable_nc: 0,
                raw: Vec::new(),
                quant: None,
                oct: None,
            });
        }
    }

    // Phase 1: encoder selection.
    for decoder in decoders.iter_mut() {
        for slot in decoder.slots.iter_mut() {
            slot.encoder_type = buffer.read_u8().map_err(Err::from)?;
        }
    }

    // The traversal sequence of each decoder is fixed before any portable
    // data is read.
    for decoder in decoders.iter_mut() {
        build_sequence(decoder, connectivity, is_edgebreaker, num_points)?;
    }

    // Phase 2: portable integer values.
    let mut position_store: Option<PositionStore> = None;
    for decoder in decoders.iter_mut() {
        for slot_idx in 0..decoder.slots.len() {
            decode_portable_slot(buffer, decoder, slot_idx, connectivity, &position_store)?;
            let slot = &decoder.slots[slot_idx];
            if slot.attribute.attribute_type() == AttributeType::Position
                && position_store.is_none()
                && !slot.portable.is_empty()
            {
                let mut point_to_entry = vec![0usize; num_points];
                for (entry, &point) in decoder.point_ids.iter().enumerate() {
                    if point < num_points {
                        point_to_entry[point] = entry;
                    }
                }
                position_store = Some(PositionStore {
                    values: slot.portable.clone(),
                    num_components: slot.portable_nc,
                    point_to_entry,
                });
            }
        }
    }

    // Phase 3: transform parameters.
    for decoder in decoders.iter_mut() {
        for slot in decoder.slots.iter_mut() {
            match slot.encoder_type {
                ENCODER_QUANTIZATION => {
                    slot.quant = Some(QuantizationParams::decode(
                        buffer,
                        slot.attribute.num_components() as usize,
                    )?);
                }
                ENCODER_NORMALS => {
                    slot.oct = Some(OctahedronParams::decode(buffer)?);
                }
                _ => {}
            }
        }
    }

    // Phase 4: original format.
    let offset = buffer.pos();
    let mut attributes = Vec::new();
    for decoder in decoders.iter_mut() {
        let num_entries = decoder.point_ids.len();
        for slot in decoder.slots.iter_mut() {
            transform_slot_to_original_format(slot, num_entries, offset)?;
            if let Some(mapping) = &decoder.explicit_mapping {
                slot.attribute.set_explicit_mapping(mapping.clone());
            }
            attributes.push(std::mem::replace(
                &mut slot.attribute,
                PointAttribute::new(AttributeType::Generic, DataType::Uint8, 1, false, 0),
            ));
        }
    }
    Ok(attributes)
}

/// Fixes the decode-order sequence (entry -> corner/point) for one
/// attributes-decoder.
fn build_sequence<'conn>(
    decoder: &mut DecoderState<'conn>,
    connectivity: Option<&'conn DecodedConnectivity>,
    is_edgebreaker: bool,
    num_points: usize,
) -> Result<(), Err> {
    match connectivity {
        None => {
            // Point clouds keep point order.
            decoder.point_ids = (0..num_points).collect();
            decoder.vertex_to_data = (0..num_points as isize).collect();
        }
        Some(conn) if is_edgebreaker => {
            let table: &'conn dyn GenericCornerTable = if decoder.att_data_id < 0 {
                &conn.corner_table
            } else {
                let data = &conn.attribute_data[decoder.att_data_id as usize];
                if data.has_seams() {
                    data
                } else {
                    &conn.corner_table
                }
            };
            let sequence = generate_sequence(
                table,
                &conn.traversal_seeds,
                decoder.traversal_method,
                &conn.corner_to_point,
            );

            // Every point resolves to the entry decoded at its corner.
            let mut mapping = vec![0usize; num_points];
            for corner in 0..table.num_corners() {
                let point = conn.corner_to_point[corner];
                let entry = sequence
                    .vertex_to_data
                    .get(table.vertex(corner))
                    .copied()
                    .unwrap_or(-1);
                if entry >= 0 && point < num_points {
                    mapping[point] = entry as usize;
                }
            }

            decoder.table = Some(table);
            decoder.point_ids = sequence.point_ids;
            decoder.data_to_corner = sequence.data_to_corner;
            decoder.vertex_to_data = sequence.vertex_to_data;
            decoder.explicit_mapping = Some(mapping);
        }
        Some(conn) => {
            // Sequential meshes keep point order; the corner table still
            // drives the mesh prediction schemes.
            decoder.point_ids = (0..num_points).collect();
            decoder.vertex_to_data = (0..num_points as isize).collect();
            decoder.data_to_corner = (0..num_points)
                .map(|p| {
                    if p < conn.corner_table.num_vertices() {
                        conn.corner_table.left_most_corner(p).unwrap_or(0)
                    } else {
                        0
                    }
                })
                .collect();
            decoder.table = Some(&conn.corner_table);
        }
    }
    Ok(())
}

fn decode_portable_slot(
    buffer: &mut DecoderBuffer,
    decoder: &mut DecoderState,
    slot_idx: usize,
    connectivity: Option<&DecodedConnectivity>,
    position_store: &Option<PositionStore>,
) -> Result<(), Err> {
    let num_entries = decoder.point_ids.len();
    let encoder_type = decoder.slots[slot_idx].encoder_type;
    let attribute_nc = decoder.slots[slot_idx].attribute.num_components() as usize;
    match encoder_type {
        ENCODER_GENERIC => {
            let stride = decoder.slots[slot_idx].attribute.byte_stride();
            let mut raw = vec![0u8; num_entries * stride];
            buffer.read_bytes(&mut raw).map_err(Err::from)?;
            let slot = &mut decoder.slots[slot_idx];
            slot.raw = raw;
            slot.portable_nc = attribute_nc;
            Ok(())
        }
        ENCODER_INTEGER | ENCODER_QUANTIZATION | ENCODER_NORMALS => {
            let portable_nc = if encoder_type == ENCODER_NORMALS {
                2
            } else {
                attribute_nc
            };
            let values = decode_integer_values(
                buffer,
                portable_nc,
                num_entries,
                decoder.table,
                &decoder.data_to_corner,
                &decoder.vertex_to_data,
                &decoder.point_ids,
                connectivity,
                position_store,
            )?;
            let slot = &mut decoder.slots[slot_idx];
            slot.portable_nc = portable_nc;
            slot.portable = values;
            Ok(())
        }
        6 | 14 => Err(Err::Unsupported(
            "kd-tree attribute encoding".to_string(),
            buffer.pos(),
        )),
        other => Err(Err::Unsupported(
            format!("sequential attribute encoder type {}", other),
            buffer.pos(),
        )),
    }
}

/// Phase-2 core shared by the integer, quantization and normal paths.
#[allow(clippy::too_many_arguments)]
fn decode_integer_values(
    buffer: &mut DecoderBuffer,
    num_components: usize,
    num_entries: usize,
    table: Option<&dyn GenericCornerTable>,
    data_to_corner: &[CornerIdx],
    vertex_to_data: &[isize],
    point_ids: &[PointIdx],
    connectivity: Option<&DecodedConnectivity>,
    position_store: &Option<PositionStore>,
) -> Result<Vec<i64>, Err> {
    let method_offset = buffer.pos();
    let method_byte = buffer.read_i8().map_err(Err::from)?;

    let mut scheme;
    let mut transform;
    if method_byte < 0 {
        scheme = PredictionScheme::None;
        transform = None;
    } else {
        let transform_offset = buffer.pos();
        let transform_byte = buffer.read_i8().map_err(Err::from)?;
        scheme = PredictionScheme::from_method_byte(method_byte, method_offset)?;
        transform = Some(InverseTransform::from_type_byte(
            transform_byte,
            transform_offset,
        )?);
    }

    // Correction symbols.
    let compressed = buffer.read_u8().map_err(Err::from)?;
    let num_values = num_entries * num_components;
    let symbols = if compressed > 0 {
        decode_symbols(num_values, num_components, buffer)?
    } else {
        let offset = buffer.pos();
        let num_bytes = buffer.read_u8().map_err(Err::from)? as usize;
        if !(1..=4).contains(&num_bytes) {
            return Err(Err::Corrupt(
                format!("raw integer width of {} bytes", num_bytes),
                offset,
            ));
        }
        let mut symbols = Vec::with_capacity(num_values);
        let mut bytes = [0u8; 4];
        for _ in 0..num_values {
            bytes = [0; 4];
            buffer
                .read_bytes(&mut bytes[..num_bytes])
                .map_err(Err::from)?;
            symbols.push(u32::from_le_bytes(bytes));
        }
        symbols
    };

    let corrections_positive = transform
        .as_ref()
        .map(|t| scheme.are_corrections_positive(t))
        .unwrap_or(false);
    let corrections: Vec<i32> = if corrections_positive {
        symbols.iter().map(|&s| s as i32).collect()
    } else {
        convert_symbols_to_signed(&symbols)
    };

    if scheme.is_none() {
        return Ok(corrections.iter().map(|&c| c as i64).collect());
    }
    let mut transform = transform.expect("schemes other than none carry a transform");

    // Scheme side data, transform parameters last.
    scheme.decode_prediction_data(buffer, &mut transform, num_entries)?;

    // Parent position data for the uv and normal predictors.
    let needs_entry_positions = matches!(scheme, PredictionScheme::TexCoordsPortable(_));
    let needs_corner_positions = matches!(scheme, PredictionScheme::GeometricNormal(_));
    let mut pos_by_entry: Vec<[i64; 3]> = Vec::new();
    let mut pos_by_corner: Vec<[i64; 3]> = Vec::new();
    if needs_entry_positions || needs_corner_positions {
        let store = position_store.as_ref().ok_or_else(|| {
            Err::Corrupt(
                "prediction scheme needs a decoded position attribute".to_string(),
                method_offset,
            )
        })?;
        if store.num_components < 3 {
            return Err(Err::Corrupt(
                "position attribute with fewer than three components".to_string(),
                method_offset,
            ));
        }
        let position_of_point = |point: PointIdx| -> [i64; 3] {
            let entry = store.point_to_entry.get(point).copied().unwrap_or(0);
            let base = entry * store.num_components;
            match store.values.get(base..base + 3) {
                Some(v) => [v[0], v[1], v[2]],
                None => [0, 0, 0],
            }
        };
        if needs_entry_positions {
            pos_by_entry = point_ids.iter().map(|&p| position_of_point(p)).collect();
        }
        if needs_corner_positions {
            let corner_to_point = connectivity.map(|c| c.corner_to_point.as_slice()).ok_or_else(
                || {
                    Err::Corrupt(
                        "normal prediction without mesh connectivity".to_string(),
                        method_offset,
                    )
                },
            )?;
            pos_by_corner = corner_to_point
                .iter()
                .map(|&p| position_of_point(p))
                .collect();
        }
    }

    let ctx = PredictionContext {
        table,
        data_to_corner,
        vertex_to_data,
        pos_by_entry: &pos_by_entry,
        pos_by_corner: &pos_by_corner,
    };
    scheme.compute_original_values(
        &corrections,
        num_components,
        num_entries,
        &transform,
        &ctx,
        method_offset,
    )
}

fn transform_slot_to_original_format(
    slot: &mut AttributeSlot,
    num_entries: usize,
    offset: usize,
) -> Result<(), Err> {
    match slot.encoder_type {
        ENCODER_GENERIC => {
            slot.attribute.resize_values(num_entries);
            slot.attribute.values_mut().copy_from_slice(&slot.raw);
        }
        ENCODER_INTEGER => {
            let nc = slot.portable_nc;
            slot.attribute.resize_values(num_entries);
            for entry in 0..num_entries {
                for c in 0..nc {
                    slot.attribute
                        .write_component_i64(entry, c, slot.portable[entry * nc + c]);
                }
            }
        }
        ENCODER_QUANTIZATION => {
            let params = slot.quant.as_ref().ok_or_else(|| {
                Err::Internal("quantized attribute without parameters".to_string(), offset)
            })?;
            let nc = slot.portable_nc;
            slot.attribute.resize_values(num_entries);
            for entry in 0..num_entries {
                for c in 0..nc {
                    let value = params.dequantize(slot.portable[entry * nc + c], c);
                    slot.attribute.write_component_f32(entry, c, value);
                }
            }
        }
        ENCODER_NORMALS => {
            if slot.attribute.num_components() != 3 {
                return Err(Err::Corrupt(
                    "normal attribute without three components".to_string(),
                    offset,
                ));
            }
            let params = slot.oct.as_ref().ok_or_else(|| {
                Err::Internal("normal attribute without parameters".to_string(), offset)
            })?;
            slot.attribute.resize_values(num_entries);
            for entry in 0..num_entries {
                let s = slot.portable[entry * 2];
                let t = slot.portable[entry * 2 + 1];
                let unit = params.to_unit_vector(s, t);
                for c in 0..3 {
                    slot.attribute.write_component_f32(entry, c, unit[c]);
                }
            }
        }
        _ => {
            return Err(Err::Internal(
                format!("encoder type {} survived phase 2", slot.encoder_type),
                offset,
            ))
        }
    }
    Ok(())
}
