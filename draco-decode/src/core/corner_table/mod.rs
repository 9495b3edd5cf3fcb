pub(crate) mod attribute_corner_table;

use std::collections::HashMap;

use crate::core::shared::{CornerIdx, FaceIdx, VertexIdx, INVALID};

/// Operations shared by the mesh corner table and the seam-aware attribute
/// corner table, so traversers and prediction schemes can run on either.
pub(crate) trait GenericCornerTable {
    fn num_faces(&self) -> usize;
    fn num_corners(&self) -> usize;
    fn num_vertices(&self) -> usize;
    fn vertex(&self, corner: CornerIdx) -> VertexIdx;
    fn opposite(&self, corner: CornerIdx) -> Option<CornerIdx>;
    fn left_most_corner(&self, vertex: VertexIdx) -> Option<CornerIdx>;

    #[inline]
    fn next(&self, corner: CornerIdx) -> CornerIdx {
        if corner % 3 == 2 {
            corner - 2
        } else {
            corner + 1
        }
    }

    #[inline]
    fn previous(&self, corner: CornerIdx) -> CornerIdx {
        if corner % 3 == 0 {
            corner + 2
        } else {
            corner - 1
        }
    }

    #[inline]
    fn face(&self, corner: CornerIdx) -> FaceIdx {
        corner / 3
    }

    #[inline]
    fn first_corner(&self, face: FaceIdx) -> CornerIdx {
        face * 3
    }

    /// Clockwise step around `vertex(corner)`.
    fn swing_right(&self, corner: CornerIdx) -> Option<CornerIdx> {
        self.opposite(self.previous(corner)).map(|c| self.previous(c))
    }

    /// Counterclockwise step around `vertex(corner)`.
    fn swing_left(&self, corner: CornerIdx) -> Option<CornerIdx> {
        self.opposite(self.next(corner)).map(|c| self.next(c))
    }

    /// The corner left of `corner`, across the edge `(corner, previous)`.
    fn left_corner(&self, corner: CornerIdx) -> Option<CornerIdx> {
        self.opposite(self.previous(corner))
    }

    /// The corner right of `corner`, across the edge `(corner, next)`.
    fn right_corner(&self, corner: CornerIdx) -> Option<CornerIdx> {
        self.opposite(self.next(corner))
    }

    /// A vertex is on the boundary when its fan is open: the left-most
    /// corner of a closed fan can still swing left.
    fn is_vertex_on_boundary(&self, vertex: VertexIdx) -> bool {
        match self.left_most_corner(vertex) {
            Some(corner) => self.swing_left(corner).is_none(),
            None => true,
        }
    }
}

/// The ordered-triangle connectivity model: two parallel arrays indexed by
/// corner id, plus the left-most corner per vertex.
#[derive(Debug, Clone)]
pub(crate) struct CornerTable {
    opposite_corners: Vec<CornerIdx>,
    corner_to_vertex: Vec<VertexIdx>,
    left_most_corners: Vec<CornerIdx>,
    num_vertices: usize,
}

impl CornerTable {
    /// Empty table for `num_faces` faces whose corners get mapped
    /// incrementally during edgebreaker reconstruction.
    pub(crate) fn reset(num_faces: usize) -> Self {
        Self {
            opposite_corners: vec![INVALID; num_faces * 3],
            corner_to_vertex: vec![INVALID; num_faces * 3],
            left_most_corners: Vec::new(),
            num_vertices: 0,
        }
    }

    /// Builds the table from explicit faces, matching half edges to recover
    /// the opposite relation. Non-manifold edges stay unmatched, which keeps
    /// them as boundaries.
    pub(crate) fn from_faces(faces: &[[VertexIdx; 3]]) -> Self {
        let num_vertices = faces
            .iter()
            .flatten()
            .copied()
            .max()
            .map_or(0, |max| max + 1);
        let mut table = Self {
            opposite_corners: vec![INVALID; faces.len() * 3],
            corner_to_vertex: faces.iter().flatten().copied().collect(),
            left_most_corners: vec![INVALID; num_vertices],
            num_vertices,
        };

        // A corner's edge runs from vertex(next) to vertex(prev); its
        // opposite carries the same edge reversed.
        let mut open_edges: HashMap<(VertexIdx, VertexIdx), CornerIdx> = HashMap::new();
        for corner in 0..table.num_corners() {
            let source = table.vertex(table.next(corner));
            let sink = table.vertex(table.previous(corner));
            if source == sink {
                continue; // degenerate
            }
            if let Some(opp) = open_edges.remove(&(sink, source)) {
                table.opposite_corners[corner] = opp;
                table.opposite_corners[opp] = corner;
            } else {
                open_edges.insert((source, sink), corner);
            }
        }

        table.compute_left_most_corners();
        table
    }

    fn compute_left_most_corners(&mut self) {
        for corner in 0..self.num_corners() {
            let v = self.corner_to_vertex[corner];
            if v != INVALID && self.left_most_corners[v] == INVALID {
                self.left_most_corners[v] = corner;
            }
        }
        for v in 0..self.num_vertices {
            let start = self.left_most_corners[v];
            if start == INVALID {
                continue;
            }
            let mut corner = start;
            while let Some(left) = self.swing_left(corner) {
                if left == start {
                    break; // closed fan
                }
                corner = left;
            }
            self.left_most_corners[v] = corner;
        }
    }

    pub(crate) fn add_new_vertex(&mut self) -> VertexIdx {
        self.left_most_corners.push(INVALID);
        self.num_vertices += 1;
        self.num_vertices - 1
    }

    pub(crate) fn set_opposite_corners(&mut self, a: CornerIdx, b: CornerIdx) {
        self.opposite_corners[a] = b;
        self.opposite_corners[b] = a;
    }

    pub(crate) fn map_corner_to_vertex(&mut self, corner: CornerIdx, vertex: VertexIdx) {
        self.corner_to_vertex[corner] = vertex;
    }

    pub(crate) fn set_left_most_corner(&mut self, vertex: VertexIdx, corner: CornerIdx) {
        self.left_most_corners[vertex] = corner;
    }

    /// Detaches a merged-away vertex so nothing resolves to it anymore.
    pub(crate) fn make_vertex_isolated(&mut self, vertex: VertexIdx) {
        self.left_most_corners[vertex] = INVALID;
    }

    pub(crate) fn opposite_raw(&self, corner: CornerIdx) -> CornerIdx {
        self.opposite_corners[corner]
    }
}

impl GenericCornerTable for CornerTable {
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
    fn two_triangle_strip() {
        let faces = vec![[0, 1, 2], [2, 1, 3]];
        let table = CornerTable::from_faces(&faces);
        assert_eq!(table.num_faces(), 2);
        assert_eq!(table.num_corners(), 6);
        assert_eq!(table.num_vertices(), 4);
        // The shared edge (1, 2) pairs corner 0 with corner 5.
        assert_eq!(table.opposite(0), Some(5));
        assert_eq!(table.opposite(5), Some(0));
        for c in [1, 2, 3, 4] {
            assert_eq!(table.opposite(c), None);
        }
    }

    #[test]
    fn opposite_is_an_involution() {
        let faces = vec![[0, 1, 2], [2, 1, 3], [2, 3, 4], [4, 3, 5]];
        let table = CornerTable::from_faces(&faces);
        for c in 0..table.num_corners() {
            if let Some(opp) = table.opposite(c) {
                assert_eq!(table.opposite(opp), Some(c));
                assert_eq!(table.vertex(table.next(c)), table.vertex(table.previous(opp)));
            }
        }
    }

    #[test]
    fn next_previous_cycle_within_face() {
        let table = CornerTable::from_faces(&[[0, 1, 2]]);
        for c in 0..3 {
            assert_eq!(table.next(table.next(table.next(c))), c);
            assert_eq!(table.previous(table.next(c)), c);
        }
    }

    #[test]
    fn boundary_detection() {
        // Fan of three triangles around vertex 0; every rim vertex is on the
        // boundary, and so is 0 (the fan is open).
        let faces = vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]];
        let table = CornerTable::from_faces(&faces);
        for v in 0..5 {
            assert!(table.is_vertex_on_boundary(v));
        }
    }

    #[test]
    fn left_most_corner_reaches_the_ccw_end() {
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let table = CornerTable::from_faces(&faces);
        let leftmost = table.left_most_corner(0).unwrap();
        // Swinging further left from the left-most corner exits the fan.
        assert!(table.swing_left(leftmost).is_none());
    }
}
