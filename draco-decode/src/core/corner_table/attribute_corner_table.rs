//! Seam-aware view of a corner table.
//!
//! Attributes that are discontinuous across an edge (a UV seam, a hard
//! normal crease) must not be predicted across it. This table redirects
//! `opposite` to a boundary at every seam edge and renumbers vertices so
//! that each seam-separated wedge of a fan gets its own attribute vertex.

use crate::core::corner_table::{CornerTable, GenericCornerTable};
use crate::core::shared::{CornerIdx, VertexIdx, INVALID};

#[derive(Debug, Clone)]
pub(crate) struct MeshAttributeCornerTable {
    opposite_corners: Vec<CornerIdx>,
    is_edge_on_seam: Vec<bool>,
    corner_to_vertex: Vec<VertexIdx>,
    left_most_corners: Vec<CornerIdx>,
    num_vertices: usize,
    num_seams: usize,
}

impl MeshAttributeCornerTable {
    pub(crate) fn new(table: &CornerTable) -> Self {
        let num_corners = table.num_corners();
        let mut opposite_corners = Vec::with_capacity(num_corners);
        for corner in 0..num_corners {
            opposite_corners.push(table.opposite_raw(corner));
        }
        Self {
            opposite_corners,
            is_edge_on_seam: vec![false; num_corners],
            corner_to_vertex: vec![INVALID; num_corners],
            left_most_corners: Vec::new(),
            num_vertices: 0,
            num_seams: 0,
        }
    }

    /// Breaks the opposite link across the edge opposite `corner`.
    pub(crate) fn add_seam_edge(&mut self, corner: CornerIdx) {
        if !self.is_edge_on_seam[corner] {
            self.num_seams += 1;
        }
        self.is_edge_on_seam[corner] = true;
        let opp = self.opposite_corners[corner];
        if opp != INVALID {
            self.is_edge_on_seam[opp] = true;
            self.opposite_corners[opp] = INVALID;
            self.opposite_corners[corner] = INVALID;
        } else {
            self.opposite_corners[corner] = INVALID;
        }
    }

    pub(crate) fn has_seams(&self) -> bool {
        self.num_seams > 0
    }

    pub(crate) fn is_corner_opposite_to_seam_edge(&self, corner: CornerIdx) -> bool {
        self.is_edge_on_seam[corner]
    }

    /// Assigns attribute vertices wedge by wedge. Must run after all seam
    /// edges were added.
    pub(crate) fn recompute_vertices(&mut self, table: &CornerTable) {
        self.corner_to_vertex.fill(INVALID);
        self.left_most_corners.clear();
        self.num_vertices = 0;

        for v in 0..table.num_vertices() {
            let Some(base_first) = table.left_most_corner(v) else {
                continue;
            };

            // Start at the most counterclockwise corner of the attribute fan.
            // If swinging left wraps, the fan has no seam at this vertex.
            let mut wedge_start = base_first;
            let mut closed = false;
            {
                let mut corner = base_first;
                let mut steps = 0;
                while let Some(left) = self.swing_left(corner) {
                    if left == base_first {
                        closed = true;
                        break;
                    }
                    steps += 1;
                    if steps > self.num_corners() {
                        break;
                    }
                    corner = left;
                }
                if !closed {
                    wedge_start = corner;
                }
            }

            let mut attr_vertex = self.new_vertex(wedge_start);
            let mut corner = wedge_start;
            let mut steps = 0;
            loop {
                // A fan can never be larger than the corner count; a longer
                // walk means the table is inconsistent.
                steps += 1;
                if steps > self.num_corners() {
                    break;
                }
                self.corner_to_vertex[corner] = attr_vertex;
                match self.swing_right(corner) {
                    Some(right) if right == wedge_start => break,
                    Some(right) => corner = right,
                    None => {
                        // Seam or mesh boundary; the base fan may continue.
                        match table.swing_right(corner) {
                            Some(right) if right == wedge_start => break,
                            Some(right) => {
                                attr_vertex = self.new_vertex(right);
                                corner = right;
                            }
                            None => break,
                        }
                    }
                }
            }
        }
    }

    fn new_vertex(&mut self, left_most: CornerIdx) -> VertexIdx {
        self.left_most_corners.push(left_most);
        self.num_vertices += 1;
        self.num_vertices - 1
    }
}

impl GenericCornerTable for MeshAttributeCornerTable {
    #[inline]
    fn num_faces(&self) -> usize {
        self.opposite_corners.len() / 3
    }

    #[inline]
    fn num_corners(&self) -> usize {
        self.opposite_corners.len()
    }

    #[inline]
    fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    #[inline]
    fn vertex(&self, corner: CornerIdx) -> VertexIdx {
        self.corner_to_vertex[corner]
    }

    #[inline]
    fn opposite(&self, corner: CornerIdx) -> Option<CornerIdx> {
        let opp = self.opposite_corners[corner];
        if opp == INVALID {
            None
        } else {
            Some(opp)
        }
    }

    #[inline]
    fn left_most_corner(&self, vertex: VertexIdx) -> Option<CornerIdx> {
        let corner = self.left_most_corners[vertex];
        if corner == INVALID {
            None
        } else {
            Some(corner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_seams_vertices_match_the_base_table() {
        let faces = vec![[0, 1, 2], [2, 1, 3]];
        let table = CornerTable::from_faces(&faces);
        let mut attr = MeshAttributeCornerTable::new(&table);
        attr.recompute_vertices(&table);
        assert!(!attr.has_seams());
        assert_eq!(attr.num_vertices(), table.num_vertices());
        // Corners at the same base vertex share the attribute vertex.
        for c0 in 0..table.num_corners() {
            for c1 in 0..table.num_corners() {
                assert_eq!(
                    table.vertex(c0) == table.vertex(c1),
                    attr.vertex(c0) == attr.vertex(c1)
                );
            }
        }
    }

    #[test]
    fn seam_splits_the_shared_edge_vertices() {
        // Two triangles sharing the edge (1, 2); the seam runs along it.
        let faces = vec![[0, 1, 2], [2, 1, 3]];
        let table = CornerTable::from_faces(&faces);
        let mut attr = MeshAttributeCornerTable::new(&table);
        // Corner 0 is opposite the shared edge.
        attr.add_seam_edge(0);
        attr.recompute_vertices(&table);
        assert!(attr.has_seams());
        assert_eq!(attr.opposite(0), None);
        assert_eq!(attr.opposite(5), None);
        // Vertices 1 and 2 are split in two, 0 and 3 are not: 6 in total.
        assert_eq!(attr.num_vertices(), 6);
        // The corners of face 0 and face 1 no longer share attribute
        // vertices across the seam.
        assert_ne!(attr.vertex(1), attr.vertex(4));
        assert_ne!(attr.vertex(2), attr.vertex(3));
    }
}
