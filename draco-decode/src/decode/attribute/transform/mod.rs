//! Phase-3 transform parameters and the phase-4 conversion of portable
//! integers back to the original value space.

use crate::core::buffer::DecoderBuffer;
use crate::decode::attribute::octahedron::OctahedronToolBox;
use crate::decode::Err;

/// Uniform quantization over `[min, min + range]` per component.
pub(crate) struct QuantizationParams {
    min_values: Vec<f32>,
    range: f32,
    bits: u8,
}

impl QuantizationParams {
    pub(crate) fn decode(buffer: &mut DecoderBuffer, num_components: usize) -> Result<Self, Err> {
        let offset = buffer.pos();
        let mut min_values = Vec::with_capacity(num_components);
        for _ in 0..num_components {
            min_values.push(buffer.read_f32().map_err(Err::from)?);
        }
        let range = buffer.read_f32().map_err(Err::from)?;
        let bits = buffer.read_u8().map_err(Err::from)?;
        if bits > 31 {
            return Err(Err::Corrupt(
                format!("quantization with {} bits", bits),
                offset,
            ));
        }
        Ok(Self {
            min_values,
            range,
            bits,
        })
    }

    pub(crate) fn dequantize(&self, quantized: i64, component: usize) -> f32 {
        if self.bits == 0 {
            return 0.0;
        }
        let max_quantized = ((1u64 << self.bits) - 1) as f32;
        let scale = self.range / max_quantized;
        quantized as f32 * scale + self.min_values[component]
    }
}

/// Octahedral normal quantization; phase 4 turns (s, t) back into a unit
/// vector.
pub(crate) struct OctahedronParams {
    toolbox: OctahedronToolBox,
}

impl OctahedronParams {
    pub(crate) fn decode(buffer: &mut DecoderBuffer) -> Result<Self, Err> {
        let offset = buffer.pos();
        let bits = buffer.read_u8().map_err(Err::from)?;
        let toolbox = OctahedronToolBox::with_quantization_bits(bits as u32).ok_or_else(|| {
            Err::Corrupt(format!("octahedral quantization with {} bits", bits), offset)
        })?;
        Ok(Self { toolbox })
    }

    pub(crate) fn to_unit_vector(&self, s: i64, t: i64) -> [f32; 3] {
        self.toolbox
            .quantized_octahedral_coords_to_unit_vector(s as i32, t as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequantization_recovers_the_range_ends() {
        // min = (-1, 0), range = 2, 8 bits.
        let mut data = Vec::new();
        data.extend_from_slice(&(-1.0f32).to_le_bytes());
        data.extend_from_slice(&0.0f32.to_le_bytes());
        data.extend_from_slice(&2.0f32.to_le_bytes());
        data.push(8);
        let mut buffer = DecoderBuffer::new(&data);
        let params = QuantizationParams::decode(&mut buffer, 2).unwrap();

        assert_eq!(params.dequantize(0, 0), -1.0);
        assert_eq!(params.dequantize(255, 0), 1.0);
        assert_eq!(params.dequantize(0, 1), 0.0);
        assert!((params.dequantize(128, 1) - 2.0 * 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn zero_bits_decode_to_zero() {
        let mut data = Vec::new();
        data.extend_from_slice(&5.0f32.to_le_bytes());
        data.extend_from_slice(&2.0f32.to_le_bytes());
        data.push(0);
        let mut buffer = DecoderBuffer::new(&data);
        let params = QuantizationParams::decode(&mut buffer, 1).unwrap();
        assert_eq!(params.dequantize(17, 0), 0.0);
    }

    #[test]
    fn octahedron_params_produce_unit_normals() {
        let data = [8u8];
        let mut buffer = DecoderBuffer::new(&data);
        let params = OctahedronParams::decode(&mut buffer).unwrap();
        let v = params.to_unit_vector(100, 200);
        let norm2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
        assert!((norm2 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn absurd_quantization_bits_are_corrupt() {
        let data = [77u8];
        let mut buffer = DecoderBuffer::new(&data);
        assert!(matches!(
            OctahedronParams::decode(&mut buffer),
            Err(Err::Corrupt(..))
        ));
    }
}
