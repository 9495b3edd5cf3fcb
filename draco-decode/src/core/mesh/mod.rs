use serde::Serialize;

use crate::core::attribute::{AttributeType, PointAttribute};
use crate::core::shared::PointIdx;

/// A decoded point cloud: a point count and the attributes addressing it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PointCloud {
    pub(crate) num_points: usize,
    pub(crate) attributes: Vec<PointAttribute>,
}

impl PointCloud {
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn attributes(&self) -> &[PointAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, idx: usize) -> &PointAttribute {
        &self.attributes[idx]
    }

    /// First attribute of the given type, if any.
    pub fn named_attribute(&self, att_type: AttributeType) -> Option<&PointAttribute> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == att_type)
    }

    pub(crate) fn add_attribute(&mut self, attribute: PointAttribute) {
        self.attributes.push(attribute);
    }
}

/// A decoded triangular mesh: a point cloud plus connectivity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Mesh {
    pub(crate) cloud: PointCloud,
    pub(crate) faces: Vec<[PointIdx; 3]>,
}

impl Mesh {
    pub fn num_points(&self) -> usize {
        self.cloud.num_points()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn faces(&self) -> &[[PointIdx; 3]] {
        &self.faces
    }

    pub fn attributes(&self) -> &[PointAttribute] {
        self.cloud.attributes()
    }

    pub fn attribute(&self, idx: usize) -> &PointAttribute {
        self.cloud.attribute(idx)
    }

    pub fn named_attribute(&self, att_type: AttributeType) -> Option<&PointAttribute> {
        self.cloud.named_attribute(att_type)
    }

    pub fn point_cloud(&self) -> &PointCloud {
        &self.cloud
    }
}
