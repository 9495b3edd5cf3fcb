//! End-to-end decoding of handcrafted bitstreams through the public API.

use draco_decode::prelude::*;

fn leb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Binary rANS encoder mirroring the decoder's bit-chunk framing, used to
/// author the start-face streams of edgebreaker fixtures.
fn write_bit_chunk(bits: &[bool], prob_zero: u8, out: &mut Vec<u8>) {
    const L_BASE: u64 = 4096;
    const PRECISION: u64 = 256;
    let p0 = prob_zero as u64;
    let mut state = L_BASE;
    let mut payload = Vec::new();
    for &bit in bits.iter().rev() {
        let p = if bit { PRECISION - p0 } else { p0 };
        let limit = L_BASE / PRECISION * 256 * p;
        while state >= limit {
            payload.push((state % 256) as u8);
            state /= 256;
        }
        if bit {
            let p1 = PRECISION - p0;
            state = (state / p1) * PRECISION + state % p1;
        } else {
            state = (state / p0) * PRECISION + state % p0 + (PRECISION - p0);
        }
    }
    state -= L_BASE;
    if state < 1 << 6 {
        payload.push(state as u8);
    } else if state < 1 << 14 {
        payload.extend_from_slice(&(((1u32 << 14) | state as u32) as u16).to_le_bytes());
    } else {
        let v = (2u32 << 22) | state as u32;
        payload.extend_from_slice(&v.to_le_bytes()[..3]);
    }
    out.push(prob_zero);
    leb128(payload.len() as u64, out);
    out.extend_from_slice(&payload);
}

fn header(major: u8, minor: u8, geometry: u8, method: u8) -> Vec<u8> {
    let mut bytes = b"DRACO".to_vec();
    bytes.extend_from_slice(&[major, minor, geometry, method, 0, 0]);
    bytes
}

#[test]
fn point_cloud_with_raw_colors() {
    let num_points = 21usize;
    let positions: Vec<[f32; 3]> = (0..num_points)
        .map(|i| [i as f32, i as f32 * 0.5, -(i as f32)])
        .collect();
    let colors: Vec<[u8; 3]> = (0..num_points)
        .map(|i| [(i * 11) as u8, (255 - i * 7) as u8, (i * 3 + 100) as u8])
        .collect();

    let mut bytes = header(2, 3, 0, 0);
    leb128(num_points as u64, &mut bytes);
    bytes.push(1); // one attributes decoder
    leb128(2, &mut bytes); // with two attributes
    bytes.extend_from_slice(&[0, 9, 3, 0]); // Position, Float32, 3, raw
    leb128(0, &mut bytes); // unique id
    bytes.extend_from_slice(&[2, 2, 3, 1]); // Color, Uint8, 3, normalized
    leb128(1, &mut bytes); // unique id
    bytes.push(0); // position: generic encoder
    bytes.push(1); // color: integer encoder

    // Phase 2. Positions are stored verbatim.
    for pos in &positions {
        for c in pos {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }
    // Colors: no prediction, uncompressed zig-zagged integers, two bytes
    // each since zig-zag doubles the magnitude.
    bytes.push(0xFE); // prediction method: none
    bytes.push(0); // not entropy coded
    bytes.push(2); // two bytes per value
    for color in &colors {
        for &c in color {
            let zigzag = (c as u16) << 1;
            bytes.extend_from_slice(&zigzag.to_le_bytes());
        }
    }

    let cloud = decode_point_cloud(&bytes).unwrap();
    assert_eq!(cloud.num_points(), num_points);
    assert_eq!(cloud.attributes().len(), 2);

    let pos_att = cloud.named_attribute(AttributeType::Position).unwrap();
    assert_eq!(pos_att.data_type(), DataType::Float32);
    for p in 0..num_points {
        let v = pos_att.mapped_index(p);
        for c in 0..3 {
            assert_eq!(pos_att.component_as_f64(v, c) as f32, positions[p][c]);
        }
    }

    let color_att = cloud.named_attribute(AttributeType::Color).unwrap();
    assert_eq!(color_att.data_type(), DataType::Uint8);
    assert!(color_att.normalized());
    for p in 0..num_points {
        let v = color_att.mapped_index(p);
        for c in 0..3 {
            assert_eq!(color_att.component_as_f64(v, c) as u8, colors[p][c]);
        }
    }
}

#[test]
fn sequential_mesh_with_raw_u16_indices() {
    let num_points = 500usize;
    let num_faces = 998usize;

    let mut bytes = header(2, 2, 1, 0);
    leb128(num_faces as u64, &mut bytes);
    leb128(num_points as u64, &mut bytes);
    bytes.push(1); // raw indices
    let mut faces = Vec::with_capacity(num_faces);
    for i in 0..num_faces {
        let face = [i % num_points, (i + 1) % num_points, (i + 2) % num_points];
        faces.push(face);
        for &v in &face {
            bytes.extend_from_slice(&(v as u16).to_le_bytes());
        }
    }

    // One quantized position attribute; all points sit at the range
    // minimum, so every correction is zero.
    bytes.push(1); // one attributes decoder
    leb128(1, &mut bytes);
    bytes.extend_from_slice(&[0, 9, 3, 0]); // Position, Float32, 3
    leb128(0, &mut bytes);
    bytes.push(2); // quantization encoder

    bytes.push(0); // prediction method: difference
    bytes.push(1); // transform: wrap
    bytes.push(0); // not entropy coded
    bytes.push(1); // one byte per value
    bytes.extend_from_slice(&vec![0u8; num_points * 3]);
    // Wrap transform bounds.
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&255i32.to_le_bytes());
    // Phase 3: min values, range, quantization bits.
    for _ in 0..3 {
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
    }
    bytes.extend_from_slice(&2.0f32.to_le_bytes());
    bytes.push(8);

    let mesh = decode_mesh(&bytes).unwrap();
    assert_eq!(mesh.num_faces(), num_faces);
    assert_eq!(mesh.num_points(), num_points);
    for (face, expected) in mesh.faces().iter().zip(&faces) {
        assert_eq!(face, expected);
        for &v in face {
            assert!(v < num_points);
        }
    }

    let pos_att = mesh.named_attribute(AttributeType::Position).unwrap();
    for p in 0..num_points {
        let v = pos_att.mapped_index(p);
        for c in 0..3 {
            // Quantized value 0 decodes to the component minimum.
            assert_eq!(pos_att.component_as_f64(v, c) as f32, 0.25);
        }
    }
}

#[test]
fn edgebreaker_strip_with_generic_positions() {
    // Two-face strip: symbols E then R, boundary start face.
    let mut bytes = header(2, 2, 1, 1);
    bytes.push(0); // standard traversal
    leb128(4, &mut bytes); // num_encoded_vertices
    leb128(2, &mut bytes); // num_faces
    bytes.push(0); // num_attribute_data
    leb128(2, &mut bytes); // num_encoded_symbols
    leb128(0, &mut bytes); // num_split_symbols

    let mut block = Vec::new();
    // CLERS bits, LSB-first: E = 111, R = 101 -> 0b101111.
    leb128(1, &mut block);
    block.push(0b0010_1111);
    write_bit_chunk(&[false], 128, &mut block);
    leb128(block.len() as u64, &mut bytes);
    bytes.extend_from_slice(&block);
    leb128(0, &mut bytes); // no topology splits

    // Attributes: one decoder bound to the position corner table.
    bytes.push(1);
    bytes.push(0xFF); // att_data_id -1
    bytes.push(0); // decoder type
    bytes.push(0); // depth-first traversal
    leb128(1, &mut bytes);
    bytes.extend_from_slice(&[0, 9, 3, 0]); // Position, Float32, 3
    leb128(0, &mut bytes);
    bytes.push(0); // generic encoder

    // Values arrive in traversal order: points 1, 3, 2, 0.
    let point_positions = [
        [0.0f32, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 1.0, 0.0],
    ];
    for &point in &[1usize, 3, 2, 0] {
        for c in point_positions[point] {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }

    let mesh = decode_mesh(&bytes).unwrap();
    assert_eq!(mesh.num_faces(), 2);
    assert_eq!(mesh.num_points(), 4);
    assert_eq!(mesh.faces(), &[[0, 1, 2], [2, 1, 3]]);

    let pos_att = mesh.named_attribute(AttributeType::Position).unwrap();
    for p in 0..4 {
        let v = pos_att.mapped_index(p);
        for c in 0..3 {
            assert_eq!(
                pos_att.component_as_f64(v, c) as f32,
                point_positions[p][c],
                "point {} component {}",
                p,
                c
            );
        }
    }
}

#[test]
fn bad_magic_is_rejected() {
    let mut bytes = header(2, 2, 1, 0);
    bytes[4] = b'X';
    match decode_mesh(&bytes) {
        Err(DecodeErr::Corrupt(msg, offset)) => {
            assert_eq!(msg, "Invalid Draco magic");
            assert!(offset <= 4);
        }
        other => panic!("expected Corrupt, got {:?}", other),
    }
}

#[test]
fn future_version_is_rejected() {
    let bytes = header(99, 99, 1, 0);
    match decode_mesh(&bytes) {
        Err(DecodeErr::UnsupportedVersion(_, offset)) => {
            assert!((5..=6).contains(&offset));
        }
        other => panic!("expected UnsupportedVersion, got {:?}", other),
    }
}

#[test]
fn truncated_stream_fails_with_io() {
    // A valid 11-byte header and nothing else.
    let bytes = header(2, 2, 1, 1);
    assert_eq!(bytes.len(), 11);
    assert!(matches!(decode_mesh(&bytes), Err(DecodeErr::Io(..))));
}

#[test]
fn geometry_type_is_peekable() {
    assert_eq!(
        get_encoded_geometry_type(&header(2, 2, 0, 0)).unwrap(),
        GeometryType::PointCloud
    );
    assert_eq!(
        get_encoded_geometry_type(&header(2, 2, 1, 1)).unwrap(),
        GeometryType::Mesh
    );
}
