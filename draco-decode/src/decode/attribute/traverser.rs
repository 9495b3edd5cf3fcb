//! Vertex traversers: replay the encoder's walk over the corner table so
//! attribute values decode in the exact order they were written.

use crate::core::corner_table::GenericCornerTable;
use crate::core::shared::{CornerIdx, PointIdx, VertexIdx};
use crate::decode::Err;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TraversalMethod {
    DepthFirst,
    PredictionDegree,
}

impl TraversalMethod {
    pub(crate) fn from_byte(byte: u8, offset: usize) -> Result<Self, Err> {
        match byte {
            0 => Ok(TraversalMethod::DepthFirst),
            1 => Ok(TraversalMethod::PredictionDegree),
            other => Err(Err::Unsupported(
                format!("traversal method {}", other),
                offset,
            )),
        }
    }
}

/// The decode-order sequence of one attributes-decoder.
pub(crate) struct TraversalSequence {
    /// Entry -> the corner at which its vertex was first reached.
    pub data_to_corner: Vec<CornerIdx>,
    /// Entry -> point id.
    pub point_ids: Vec<PointIdx>,
    /// Vertex -> entry, -1 when the vertex was never reached.
    pub vertex_to_data: Vec<isize>,
}

/// Walks the table from the given seed corners and records every vertex in
/// first-visit order.
pub(crate) fn generate_sequence(
    table: &dyn GenericCornerTable,
    seeds: &[CornerIdx],
    method: TraversalMethod,
    corner_to_point: &[PointIdx],
) -> TraversalSequence {
    let mut state = TraverserState {
        table,
        corner_to_point,
        visited_vertices: vec![false; table.num_vertices()],
        visited_faces: vec![false; table.num_faces()],
        sequence: TraversalSequence {
            data_to_corner: Vec::with_capacity(table.num_vertices()),
            point_ids: Vec::with_capacity(table.num_vertices()),
            vertex_to_data: vec![-1; table.num_vertices()],
        },
    };

    for &seed in seeds {
        match method {
            TraversalMethod::DepthFirst => state.traverse_depth_first(seed),
            TraversalMethod::PredictionDegree => state.traverse_prediction_degree(seed),
        }
    }
    // Faces not reachable from the seeds (or all faces, when no seeds were
    // recorded) are traversed in face order.
    for face in 0..table.num_faces() {
        if state.visited_faces[face] {
            continue;
        }
        let corner = table.first_corner(face);
        match method {
            TraversalMethod::DepthFirst => state.traverse_depth_first(corner),
            TraversalMethod::PredictionDegree => state.traverse_prediction_degree(corner),
        }
    }
    // Leftover vertices with corners (none in a well-formed table).
    for v in 0..table.num_vertices() {
        if !state.visited_vertices[v] {
            if let Some(corner) = table.left_most_corner(v) {
                state.visit_vertex(v, corner);
            }
        }
    }

    state.sequence
}

struct TraverserState<'a> {
    table: &'a dyn GenericCornerTable,
    corner_to_point: &'a [PointIdx],
    visited_vertices: Vec<bool>,
    visited_faces: Vec<bool>,
    sequence: TraversalSequence,
}

impl TraverserState<'_> {
    fn visit_vertex(&mut self, vertex: VertexIdx, corner: CornerIdx) {
        if vertex >= self.visited_vertices.len() || self.visited_vertices[vertex] {
            return;
        }
        self.visited_vertices[vertex] = true;
        self.sequence.vertex_to_data[vertex] = self.sequence.data_to_corner.len() as isize;
        self.sequence.data_to_corner.push(corner);
        let point = self
            .corner_to_point
            .get(corner)
            .copied()
            .unwrap_or(corner);
        self.sequence.point_ids.push(point);
    }

    /// Depth-first walk preferring the right neighbor, the traversal the
    /// encoder pairs with parallelogram prediction.
    fn traverse_depth_first(&mut self, start_corner: CornerIdx) {
        let table = self.table;
        let start_face = table.face(start_corner);
        if self.visited_faces[start_face] {
            return;
        }

        let mut corner_stack = vec![start_corner];

        let next_c = table.next(start_corner);
        let prev_c = table.previous(start_corner);
        self.visit_vertex(table.vertex(next_c), next_c);
        self.visit_vertex(table.vertex(prev_c), prev_c);

        while let Some(&top) = corner_stack.last() {
            let face = table.face(top);
            if self.visited_faces[face] {
                corner_stack.pop();
                continue;
            }

            let mut corner = top;
            loop {
                let face = table.face(corner);
                if self.visited_faces[face] {
                    corner_stack.pop();
                    break;
                }
                self.visited_faces[face] = true;

                let vertex = table.vertex(corner);
                if vertex < self.visited_vertices.len() && !self.visited_vertices[vertex] {
                    let on_boundary = table.is_vertex_on_boundary(vertex);
                    self.visit_vertex(vertex, corner);
                    if !on_boundary {
                        if let Some(right) = table.right_corner(corner) {
                            corner = right;
                            continue;
                        }
                        corner_stack.pop();
                        break;
                    }
                }

                // Vertex known or on boundary: descend into unvisited
                // neighbors.
                let right = table.right_corner(corner);
                let left = table.left_corner(corner);
                let right_visited =
                    right.map_or(true, |c| self.visited_faces[table.face(c)]);
                let left_visited = left.map_or(true, |c| self.visited_faces[table.face(c)]);

                match (right_visited, left_visited) {
                    (true, true) => {
                        corner_stack.pop();
                        break;
                    }
                    (true, false) => corner = left.unwrap(),
                    (false, true) => corner = right.unwrap(),
                    (false, false) => {
                        // Both sides open: split the traversal.
                        *corner_stack.last_mut().unwrap() = left.unwrap();
                        corner_stack.push(right.unwrap());
                        break;
                    }
                }
            }
        }
    }

    /// Traversal preferring corners whose tip vertex already has multiple
    /// predictable neighbors.
    fn traverse_prediction_degree(&mut self, start_corner: CornerIdx) {
        let table = self.table;
        let start_face = table.face(start_corner);
        if self.visited_faces[start_face] {
            return;
        }

        let mut prediction_degree = vec![0u32; table.num_vertices()];
        let mut stacks: [Vec<CornerIdx>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let mut best_priority = 0usize;

        let next_c = table.next(start_corner);
        let prev_c = table.previous(start_corner);
        self.visit_vertex(table.vertex(next_c), next_c);
        self.visit_vertex(table.vertex(prev_c), prev_c);
        self.visit_vertex(table.vertex(start_corner), start_corner);

        stacks[0].push(start_corner);

        loop {
            let mut corner = match pop_next_corner(&mut stacks, &mut best_priority) {
                Some(c) => c,
                None => break,
            };
            if self.visited_faces[table.face(corner)] {
                continue;
            }

            loop {
                let face = table.face(corner);
                if self.visited_faces[face] {
                    break;
                }
                self.visited_faces[face] = true;

                let vertex = table.vertex(corner);
                if vertex < self.visited_vertices.len() && !self.visited_vertices[vertex] {
                    self.visit_vertex(vertex, corner);
                }

                let right = table.right_corner(corner);
                let left = table.left_corner(corner);
                let right_visited =
                    right.map_or(true, |c| self.visited_faces[table.face(c)]);
                let left_visited = left.map_or(true, |c| self.visited_faces[table.face(c)]);

                let mut continued = false;
                if !left_visited {
                    let left_corner = left.unwrap();
                    let priority =
                        self.corner_priority(left_corner, &mut prediction_degree);
                    if right_visited && priority <= best_priority {
                        corner = left_corner;
                        continued = true;
                    } else {
                        push_corner(&mut stacks, &mut best_priority, left_corner, priority);
                    }
                }
                if !continued && !right_visited {
                    let right_corner = right.unwrap();
                    let priority =
                        self.corner_priority(right_corner, &mut prediction_degree);
                    if priority <= best_priority {
                        corner = right_corner;
                        continued = true;
                    } else {
                        push_corner(&mut stacks, &mut best_priority, right_corner, priority);
                    }
                }
                if !continued {
                    break;
                }
            }
        }
    }

    fn corner_priority(
        &self,
        corner: CornerIdx,
        prediction_degree: &mut [u32],
    ) -> usize {
        let vertex = self.table.vertex(corner);
        if vertex >= self.visited_vertices.len() {
            return 2;
        }
        if self.visited_vertices[vertex] {
            return 0;
        }
        prediction_degree[vertex] += 1;
        if prediction_degree[vertex] > 1 {
            1
        } else {
            2
        }
    }
}

fn push_corner(
    stacks: &mut [Vec<CornerIdx>; 3],
    best_priority: &mut usize,
    corner: CornerIdx,
    priority: usize,
) {
    let p = priority.min(2);
    stacks[p].push(corner);
    if p < *best_priority {
        *best_priority = p;
    }
}

fn pop_next_corner(
    stacks: &mut [Vec<CornerIdx>; 3],
    best_priority: &mut usize,
) -> Option<CornerIdx> {
    for p in *best_priority..3 {
        if let Some(c) = stacks[p].pop() {
            *best_priority = p;
            return Some(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corner_table::CornerTable;

    #[test]
    fn depth_first_covers_every_vertex_once() {
        let faces = vec![[0, 1, 2], [2, 1, 3], [2, 3, 4], [4, 3, 5]];
        let table = CornerTable::from_faces(&faces);
        let corner_to_point: Vec<usize> = (0..table.num_corners())
            .map(|c| table.vertex(c))
            .collect();
        let seq = generate_sequence(
            &table,
            &[0],
            TraversalMethod::DepthFirst,
            &corner_to_point,
        );
        assert_eq!(seq.data_to_corner.len(), 6);
        let mut seen = seq.point_ids.clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        // The inverse map is consistent.
        for (entry, &corner) in seq.data_to_corner.iter().enumerate() {
            assert_eq!(seq.vertex_to_data[table.vertex(corner)], entry as isize);
        }
    }

    #[test]
    fn prediction_degree_covers_every_vertex_once() {
        let faces = vec![[0, 1, 2], [2, 1, 3], [2, 3, 4], [4, 3, 5]];
        let table = CornerTable::from_faces(&faces);
        let corner_to_point: Vec<usize> = (0..table.num_corners())
            .map(|c| table.vertex(c))
            .collect();
        let seq = generate_sequence(
            &table,
            &[0],
            TraversalMethod::PredictionDegree,
            &corner_to_point,
        );
        let mut seen = seq.point_ids.clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn disconnected_components_are_reached_without_seeds() {
        let faces = vec![[0, 1, 2], [3, 4, 5]];
        let table = CornerTable::from_faces(&faces);
        let corner_to_point: Vec<usize> = (0..table.num_corners())
            .map(|c| table.vertex(c))
            .collect();
        let seq =
            generate_sequence(&table, &[], TraversalMethod::DepthFirst, &corner_to_point);
        assert_eq!(seq.point_ids.len(), 6);
    }

    #[test]
    fn unknown_method_byte_is_unsupported() {
        assert!(TraversalMethod::from_byte(0, 0).is_ok());
        assert!(TraversalMethod::from_byte(1, 0).is_ok());
        assert!(matches!(
            TraversalMethod::from_byte(9, 0),
            Err(Err::Unsupported(..))
        ));
    }
}
