// lib.rs

/// Contains the shared definitions, the native geometry objects, and the
/// decoder buffer.
pub mod core;

/// Defines the bitstream decoders.
pub mod decode;

/// Contains small helpers used across the decoder.
pub(crate) mod utils;

/// Contains the most commonly used traits, types, and objects.
pub mod prelude {
    pub use crate::core::attribute::{AttributeType, DataType, PointAttribute};
    pub use crate::core::mesh::{Mesh, PointCloud};
    pub use crate::decode::{
        decode_mesh, decode_point_cloud, get_encoded_geometry_type, Err as DecodeErr,
        GeometryType,
    };
}
