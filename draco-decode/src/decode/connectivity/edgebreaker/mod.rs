//! Edgebreaker connectivity decoding.
//!
//! The CLERS symbol stream is replayed in reverse encoder order: each symbol
//! glues one triangle onto the active gate, growing the corner table. Split
//! symbols pair up through the topology-split table, and once all symbols
//! are processed the remaining gates are resolved as interior start faces or
//! hole boundaries.

pub(crate) mod traversal;

use std::collections::HashMap;

use crate::core::buffer::DecoderBuffer;
use crate::core::corner_table::attribute_corner_table::MeshAttributeCornerTable;
use crate::core::corner_table::{CornerTable, GenericCornerTable};
use crate::core::shared::{
    bitstream_version, CornerIdx, PointIdx, VertexIdx, INVALID, VERSION_2_2,
    VERSION_VARINT_COUNTS,
};
use crate::decode::connectivity::DecodedConnectivity;
use crate::decode::header::Header;
use crate::decode::Err;
use traversal::{ClersSymbol, TraversalDecoder};

struct TopologySplitEvent {
    split_symbol_id: u32,
    source_symbol_id: u32,
    /// True when the split continues over the right face edge.
    source_edge_is_right: bool,
}

pub(crate) fn decode_connectivity(
    buffer: &mut DecoderBuffer,
    header: &Header,
) -> Result<DecodedConnectivity, Err> {
    let version = header.version;
    let traversal_type = buffer.read_u8().map_err(Err::from)?;

    let read_count = |buffer: &mut DecoderBuffer| -> Result<usize, Err> {
        if version < VERSION_VARINT_COUNTS {
            Ok(buffer.read_u32().map_err(Err::from)? as usize)
        } else {
            Ok(buffer.decode_varint_u32().map_err(Err::from)? as usize)
        }
    };

    if version < VERSION_2_2 {
        // Number of new vertices; implied by the other counts since v2.2.
        let _ = read_count(buffer)?;
    }
    let num_encoded_vertices = read_count(buffer)?;
    let counts_offset = buffer.pos();
    let num_faces = read_count(buffer)?;
    let num_attribute_data = buffer.read_u8().map_err(Err::from)? as usize;
    let num_encoded_symbols = read_count(buffer)?;
    let num_split_symbols = read_count(buffer)?;

    if num_faces as u64 > u32::MAX as u64 / 3 {
        return Err(Err::Corrupt(
            format!("face count {} exceeds the format limit", num_faces),
            counts_offset,
        ));
    }
    // Every face costs at least one symbol bit.
    if num_faces > buffer.remaining().saturating_mul(8) {
        return Err(Err::Corrupt(
            format!("face count {} cannot fit the remaining stream", num_faces),
            counts_offset,
        ));
    }
    if num_encoded_symbols > num_faces {
        return Err(Err::Corrupt(
            format!(
                "{} symbols declared for {} faces",
                num_encoded_symbols, num_faces
            ),
            counts_offset,
        ));
    }
    if num_split_symbols > num_encoded_symbols {
        return Err(Err::Corrupt(
            format!(
                "{} split symbols out of {} symbols",
                num_split_symbols, num_encoded_symbols
            ),
            counts_offset,
        ));
    }

    // Topology split events live past the connectivity block for v2.2+ and
    // inline before it for older streams.
    let mut split_events;
    let mut post_connectivity_pos = None;
    if version >= VERSION_2_2 {
        let encoded_connectivity_size =
            buffer.decode_varint_u64().map_err(Err::from)? as usize;
        if encoded_connectivity_size == 0 || encoded_connectivity_size > buffer.remaining() {
            return Err(Err::Corrupt(
                format!("connectivity block of {} bytes", encoded_connectivity_size),
                buffer.pos(),
            ));
        }
        let mut event_buffer = buffer.clone();
        event_buffer
            .seek(buffer.pos() + encoded_connectivity_size)
            .map_err(Err::from)?;
        split_events = decode_topology_split_events(&mut event_buffer, version)?;
        post_connectivity_pos = Some(event_buffer.pos());
    } else {
        split_events = decode_topology_split_events(buffer, version)?;
    }

    let max_num_vertices = num_encoded_vertices + num_split_symbols;
    let mut corner_table = CornerTable::reset(num_faces);
    let mut traversal = TraversalDecoder::start(
        traversal_type,
        buffer,
        max_num_vertices,
        num_faces,
        num_attribute_data,
    )?;

    let mut active_corner_stack: Vec<CornerIdx> = Vec::new();
    let mut split_active_corners: HashMap<usize, CornerIdx> = HashMap::new();
    let mut is_vert_hole = vec![true; max_num_vertices];
    let mut seam_corners: Vec<Vec<CornerIdx>> = vec![Vec::new(); num_attribute_data];
    let mut traversal_seeds: Vec<CornerIdx> = Vec::with_capacity(num_faces);
    let mut num_decoded_faces = 0usize;

    for symbol_id in 0..num_encoded_symbols {
        let face = num_decoded_faces;
        num_decoded_faces += 1;
        let corner = 3 * face;
        let offset = buffer.pos();
        let symbol = traversal.decode_symbol()?;

        match symbol {
            ClersSymbol::C => {
                let corner_a = *active_corner_stack.last().ok_or_else(|| {
                    Err::Corrupt("C symbol with no active gate".to_string(), offset)
                })?;
                let vertex_x = corner_table.vertex(corner_table.next(corner_a));
                let corner_b = corner_table.next(
                    corner_table.left_most_corner(vertex_x).ok_or_else(|| {
                        Err::Corrupt("C symbol around an unmapped vertex".to_string(), offset)
                    })?,
                );
                if corner_a == corner_b {
                    return Err(Err::Corrupt(
                        "C symbol glues a corner to itself".to_string(),
                        offset,
                    ));
                }
                let vert_a_prev = corner_table.vertex(corner_table.previous(corner_a));
                let vert_b_next = corner_table.vertex(corner_table.next(corner_b));
                if vertex_x == vert_a_prev || vertex_x == vert_b_next {
                    return Err(Err::Corrupt(
                        "C symbol forms a degenerate face".to_string(),
                        offset,
                    ));
                }
                corner_table.set_opposite_corners(corner_a, corner + 1);
                corner_table.set_opposite_corners(corner_b, corner + 2);
                corner_table.map_corner_to_vertex(corner, vertex_x);
                corner_table.map_corner_to_vertex(corner + 1, vert_b_next);
                corner_table.map_corner_to_vertex(corner + 2, vert_a_prev);
                corner_table.set_left_most_corner(vert_a_prev, corner + 2);
                is_vert_hole[vertex_x] = false;
                *active_corner_stack.last_mut().unwrap() = corner;
            }
            ClersSymbol::R | ClersSymbol::L => {
                let corner_a = *active_corner_stack.last().ok_or_else(|| {
                    Err::Corrupt("R/L symbol with no active gate".to_string(), offset)
                })?;
                if corner_table.opposite(corner_a).is_some() {
                    return Err(Err::Corrupt(
                        "R/L symbol on a closed gate".to_string(),
                        offset,
                    ));
                }
                let opp_corner = if symbol == ClersSymbol::R {
                    corner + 2
                } else {
                    corner + 1
                };
                corner_table.set_opposite_corners(corner_a, opp_corner);

                if corner_table.num_vertices() >= max_num_vertices {
                    return Err(Err::Corrupt(
                        "more vertices than the stream declared".to_string(),
                        offset,
                    ));
                }
                let new_vertex = corner_table.add_new_vertex();
                let vert_a_next = corner_table.vertex(corner_table.next(corner_a));
                let vert_a_prev = corner_table.vertex(corner_table.previous(corner_a));
                if symbol == ClersSymbol::R {
                    corner_table.map_corner_to_vertex(corner, vert_a_prev);
                    corner_table.map_corner_to_vertex(corner + 1, vert_a_next);
                    corner_table.map_corner_to_vertex(corner + 2, new_vertex);
                    corner_table.set_left_most_corner(new_vertex, corner + 2);
                    corner_table.set_left_most_corner(vert_a_prev, corner);
                } else {
                    corner_table.map_corner_to_vertex(corner, vert_a_next);
                    corner_table.map_corner_to_vertex(corner + 1, new_vertex);
                    corner_table.map_corner_to_vertex(corner + 2, vert_a_prev);
                    corner_table.set_left_most_corner(new_vertex, corner + 1);
                    corner_table.set_left_most_corner(vert_a_prev, corner + 2);
                }
                *active_corner_stack.last_mut().unwrap() = corner;
            }
            ClersSymbol::E => {
                if corner_table.num_vertices() + 3 > max_num_vertices {
                    return Err(Err::Corrupt(
                        "more vertices than the stream declared".to_string(),
                        offset,
                    ));
                }
                for i in 0..3 {
                    let v = corner_table.add_new_vertex();
                    corner_table.map_corner_to_vertex(corner + i, v);
                    corner_table.set_left_most_corner(v, corner + i);
                }
                active_corner_stack.push(corner);
            }
            ClersSymbol::S => {
                let corner_b = active_corner_stack.pop().ok_or_else(|| {
                    Err::Corrupt("S symbol with no active gate".to_string(), offset)
                })?;
                // A topology split may have stashed the second gate.
                if let Some(&stored) = split_active_corners.get(&symbol_id) {
                    active_corner_stack.push(stored);
                }
                let corner_a = *active_corner_stack.last().ok_or_else(|| {
                    Err::Corrupt("S symbol with a single active gate".to_string(), offset)
                })?;
                if corner_a == corner_b
                    || corner_table.opposite(corner_a).is_some()
                    || corner_table.opposite(corner_b).is_some()
                {
                    return Err(Err::Corrupt(
                        "S symbol on invalid gates".to_string(),
                        offset,
                    ));
                }

                let vertex_p = corner_table.vertex(corner_table.previous(corner_a));
                let vert_b = corner_table.vertex(corner_table.next(corner_b));
                if vertex_p == vert_b {
                    return Err(Err::Corrupt(
                        "S symbol merges a vertex into itself".to_string(),
                        offset,
                    ));
                }

                // Remap the whole fan of the merged vertex before gluing, so
                // the walk only sees the old corners.
                let fan_start = corner_table.next(corner_b);
                remap_vertex_fan(&mut corner_table, fan_start, vertex_p);
                if let Some(b_left_most) = corner_table.left_most_corner(vert_b) {
                    corner_table.set_left_most_corner(vertex_p, b_left_most);
                }

                corner_table.set_opposite_corners(corner_a, corner + 2);
                corner_table.set_opposite_corners(corner_b, corner + 1);
                let vert_a_next = corner_table.vertex(corner_table.next(corner_a));
                let vert_b_prev = corner_table.vertex(corner_table.previous(corner_b));
                corner_table.map_corner_to_vertex(corner, vertex_p);
                corner_table.map_corner_to_vertex(corner + 1, vert_a_next);
                corner_table.map_corner_to_vertex(corner + 2, vert_b_prev);

                traversal.merge_vertices(vertex_p, vert_b);
                is_vert_hole[vert_b] = false;
                corner_table.make_vertex_isolated(vert_b);
                *active_corner_stack.last_mut().unwrap() = corner;
            }
        }

        traversal.new_active_corner_reached(corner, &corner_table);
        traversal_seeds.push(corner);

        if num_attribute_data > 0 {
            decode_attribute_seams_on_face(
                corner,
                &corner_table,
                &mut traversal,
                &mut seam_corners,
            )?;
        }

        // Splits sourced at this symbol (in encoder numbering) stash a gate
        // for the matching S symbol later in the decode.
        let encoder_symbol_id = num_encoded_symbols - symbol_id - 1;
        while let Some(event) = split_events.last() {
            if (event.source_symbol_id as usize) < encoder_symbol_id {
                break;
            }
            if (event.source_symbol_id as usize) > encoder_symbol_id {
                return Err(Err::Corrupt(
                    "topology split references an unprocessed symbol".to_string(),
                    offset,
                ));
            }
            let event = split_events.pop().unwrap();
            if (event.split_symbol_id as usize) > encoder_symbol_id {
                return Err(Err::Corrupt(
                    "topology split older than its source".to_string(),
                    offset,
                ));
            }
            let decoder_split_id = num_encoded_symbols - event.split_symbol_id as usize - 1;
            let gate = if event.source_edge_is_right {
                corner + 1
            } else {
                corner + 2
            };
            split_active_corners.insert(decoder_split_id, gate);
        }
    }

    // Resolve the remaining gates: each is either the interior start face of
    // a closed component or the boundary of a hole.
    while let Some(corner) = active_corner_stack.pop() {
        let offset = buffer.pos();
        let interior = traversal.decode_start_face_configuration()?;
        if !interior {
            continue;
        }
        if num_decoded_faces >= num_faces {
            return Err(Err::Corrupt(
                "more faces than the stream declared".to_string(),
                offset,
            ));
        }
        let face = num_decoded_faces;
        num_decoded_faces += 1;
        let new_corner = 3 * face;

        let corner_a = corner;
        let vert_n = corner_table.vertex(corner_table.next(corner_a));
        let corner_b = corner_table.next(corner_table.left_most_corner(vert_n).ok_or_else(
            || Err::Corrupt("start face around an unmapped vertex".to_string(), offset),
        )?);
        let vert_x = corner_table.vertex(corner_table.next(corner_b));
        let corner_c = corner_table.next(corner_table.left_most_corner(vert_x).ok_or_else(
            || Err::Corrupt("start face around an unmapped vertex".to_string(), offset),
        )?);
        let vert_p = corner_table.vertex(corner_table.next(corner_c));
        if corner_a == corner_b || corner_a == corner_c || corner_b == corner_c {
            return Err(Err::Corrupt(
                "interior start face glues overlapping gates".to_string(),
                offset,
            ));
        }

        corner_table.set_opposite_corners(new_corner, corner_a);
        corner_table.set_opposite_corners(new_corner + 1, corner_b);
        corner_table.set_opposite_corners(new_corner + 2, corner_c);
        corner_table.map_corner_to_vertex(new_corner, vert_x);
        corner_table.map_corner_to_vertex(new_corner + 1, vert_p);
        corner_table.map_corner_to_vertex(new_corner + 2, vert_n);
        for v in [vert_x, vert_p, vert_n] {
            is_vert_hole[v] = false;
        }
        traversal_seeds.push(new_corner);

        if num_attribute_data > 0 {
            decode_attribute_seams_on_face(
                new_corner,
                &corner_table,
                &mut traversal,
                &mut seam_corners,
            )?;
        }
    }

    if num_decoded_faces != num_faces {
        return Err(Err::Corrupt(
            format!(
                "decoded {} faces where the stream declared {}",
                num_decoded_faces, num_faces
            ),
            buffer.pos(),
        ));
    }

    // Continue the main stream after the split events.
    if let Some(pos) = post_connectivity_pos {
        if pos > buffer.pos() {
            buffer.seek(pos).map_err(Err::from)?;
        }
    }

    let mut attribute_data = Vec::with_capacity(num_attribute_data);
    for corners in &seam_corners {
        let mut table = MeshAttributeCornerTable::new(&corner_table);
        for &c in corners {
            table.add_seam_edge(c);
        }
        table.recompute_vertices(&corner_table);
        attribute_data.push(table);
    }

    let (corner_to_point, num_points) =
        assign_points_to_corners(&corner_table, &attribute_data, &is_vert_hole);

    let mut faces: Vec<[PointIdx; 3]> = Vec::with_capacity(num_faces);
    for f in 0..num_faces {
        let mut face = [0usize; 3];
        for (k, slot) in face.iter_mut().enumerate() {
            let point = corner_to_point[3 * f + k];
            if point == INVALID {
                return Err(Err::Internal(
                    "corner left without a point".to_string(),
                    buffer.pos(),
                ));
            }
            *slot = point;
        }
        faces.push(face);
    }

    traversal_seeds.reverse();

    Ok(DecodedConnectivity {
        faces,
        num_points,
        corner_table,
        corner_to_point,
        attribute_data,
        traversal_seeds,
    })
}

/// Remaps every corner in the open fan around `vertex(start_corner)` to
/// `dest`, walking both directions from `start_corner`.
fn remap_vertex_fan(table: &mut CornerTable, start_corner: CornerIdx, dest: VertexIdx) {
    let bound = table.num_corners();
    let mut corner = Some(start_corner);
    let mut steps = 0;
    while let Some(c) = corner {
        table.map_corner_to_vertex(c, dest);
        steps += 1;
        if steps > bound {
            break;
        }
        corner = table.swing_right(c);
        if corner == Some(start_corner) {
            return; // closed fan, fully remapped
        }
    }
    corner = table.swing_left(start_corner);
    while let Some(c) = corner {
        table.map_corner_to_vertex(c, dest);
        steps += 1;
        if steps > bound {
            break;
        }
        corner = table.swing_left(c);
    }
}

/// Seam flags are decoded for every face edge whose opposite face was
/// already processed; boundary edges are implicit seams.
fn decode_attribute_seams_on_face(
    corner: CornerIdx,
    table: &CornerTable,
    traversal: &mut TraversalDecoder,
    seam_corners: &mut [Vec<CornerIdx>],
) -> Result<(), Err> {
    let corners = [corner, table.next(corner), table.previous(corner)];
    for ci in corners {
        if table.opposite(ci).is_none() {
            continue;
        }
        for (attribute, seams) in seam_corners.iter_mut().enumerate() {
            if traversal.decode_attribute_seam(attribute)? {
                seams.push(ci);
            }
        }
    }
    Ok(())
}

fn decode_topology_split_events(
    buffer: &mut DecoderBuffer,
    version: u16,
) -> Result<Vec<TopologySplitEvent>, Err> {
    let num_splits = if version < VERSION_VARINT_COUNTS {
        buffer.read_u32().map_err(Err::from)? as usize
    } else {
        buffer.decode_varint_u32().map_err(Err::from)? as usize
    };
    if num_splits > buffer.remaining().saturating_add(1).saturating_mul(8) {
        return Err(Err::Corrupt(
            format!("{} topology splits cannot fit the stream", num_splits),
            buffer.pos(),
        ));
    }

    let mut events = Vec::with_capacity(num_splits);
    if version < bitstream_version(1, 2) {
        for _ in 0..num_splits {
            let split_symbol_id = buffer.read_u32().map_err(Err::from)?;
            let source_symbol_id = buffer.read_u32().map_err(Err::from)?;
            let edge = buffer.read_u8().map_err(Err::from)?;
            events.push(TopologySplitEvent {
                split_symbol_id,
                source_symbol_id,
                source_edge_is_right: edge & 1 != 0,
            });
        }
        // Ancient streams stored explicit hole events here.
        let num_hole_events = buffer.read_u32().map_err(Err::from)?;
        if num_hole_events > 0 {
            return Err(Err::Unsupported(
                "pre-1.2 hole events".to_string(),
                buffer.pos(),
            ));
        }
    } else if num_splits > 0 {
        // Source ids are delta coded against each other; split ids hang
        // below their source.
        let mut last_source = 0u32;
        for _ in 0..num_splits {
            let offset = buffer.pos();
            let delta = buffer.decode_varint_u32().map_err(Err::from)?;
            let source_symbol_id = last_source.checked_add(delta).ok_or_else(|| {
                Err::Corrupt("topology split source overflows".to_string(), offset)
            })?;
            let below = buffer.decode_varint_u32().map_err(Err::from)?;
            let split_symbol_id = source_symbol_id.checked_sub(below).ok_or_else(|| {
                Err::Corrupt(
                    "topology split id underflows its source".to_string(),
                    offset,
                )
            })?;
            last_source = source_symbol_id;
            events.push(TopologySplitEvent {
                split_symbol_id,
                source_symbol_id,
                source_edge_is_right: false,
            });
        }
        // Source edges follow as a bit section.
        buffer.start_bit_decoding(false).map_err(Err::from)?;
        let bits_per_event = if version < VERSION_2_2 { 2 } else { 1 };
        for event in &mut events {
            let bits = buffer.decode_lsb_bits(bits_per_event).map_err(Err::from)?;
            event.source_edge_is_right = bits & 1 != 0;
        }
        buffer.end_bit_decoding();
    }
    Ok(events)
}

/// Computes the point id at every corner. Without attribute seams points
/// coincide with vertices; with seams every seam-separated wedge of a fan
/// becomes its own point.
fn assign_points_to_corners(
    table: &CornerTable,
    attribute_data: &[MeshAttributeCornerTable],
    is_vert_hole: &[bool],
) -> (Vec<PointIdx>, usize) {
    let num_corners = table.num_corners();
    let mut corner_to_point = vec![INVALID; num_corners];

    if attribute_data.is_empty() {
        for (corner, point) in corner_to_point.iter_mut().enumerate() {
            *point = table.vertex(corner);
        }
        return (corner_to_point, table.num_vertices());
    }

    let crosses_seam = |corner: CornerIdx| {
        attribute_data
            .iter()
            .any(|a| a.is_corner_opposite_to_seam_edge(corner))
    };

    let mut num_points = 0usize;
    for v in 0..table.num_vertices() {
        let Some(left_most) = table.left_most_corner(v) else {
            continue;
        };

        // Interior fans wrap, so anchor the walk right after a seam if one
        // exists; otherwise any corner works.
        let mut first = left_most;
        if v < is_vert_hole.len() && !is_vert_hole[v] {
            let mut candidate = left_most;
            let mut steps = 0;
            loop {
                // The edge crossed when swinging left from `candidate` is the
                // one opposite its next corner.
                if crosses_seam(table.next(candidate)) {
                    first = candidate;
                    break;
                }
                steps += 1;
                if steps > num_corners {
                    break;
                }
                match table.swing_right(candidate) {
                    Some(c) if c != left_most => candidate = c,
                    _ => break,
                }
            }
        }

        let mut point = num_points;
        num_points += 1;
        corner_to_point[first] = point;
        let mut corner = first;
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > num_corners {
                break;
            }
            let Some(next_corner) = table.swing_right(corner) else {
                break;
            };
            if next_corner == first {
                break;
            }
            // Swinging right from `corner` crosses the edge opposite its
            // previous corner.
            if crosses_seam(table.previous(corner)) {
                point = num_points;
                num_points += 1;
            }
            corner_to_point[next_corner] = point;
            corner = next_corner;
        }
    }

    // Any corner missed by the fan walks still needs a point.
    for point in corner_to_point.iter_mut() {
        if *point == INVALID {
            *point = num_points;
            num_points += 1;
        }
    }

    (corner_to_point, num_points)
}
