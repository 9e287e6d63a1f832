//! Assembly of corner candidates into an ordered `cols × rows` grid.

use std::collections::{HashMap, VecDeque};

use camcal_core::PatternGeometry;
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Point2, Vector2};

use crate::geom::{classify_edge, dominant_axis, NeighborDirection};
use crate::params::GridGraphParams;

#[derive(Clone, Copy, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    /// Angular deviation from the assigned axis direction; smaller is better.
    pub score: f32,
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> [Option<NodeNeighbor>; 4] {
    let mut best: [Option<NodeNeighbor>; 4] = [None; 4];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best
}

/// Mutual 4-neighbour graph over corner candidates.
pub struct GridGraph {
    /// For each node, its neighbour in each direction (`NeighborDirection::slot` order).
    pub neighbors: Vec<[Option<NodeNeighbor>; 4]>,
    /// Angle of the board `u` axis used for direction classification.
    pub axis: f32,
}

impl GridGraph {
    /// Build the graph, or `None` if no grid direction can be estimated.
    pub fn new(points: &[Point2<f32>], params: &GridGraphParams) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let coords = points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        let k = params.k_neighbors.max(1) + 1;

        // Side-length candidate edges (i -> j), before classification.
        let mut raw_edges: Vec<Vec<(usize, Vector2<f32>, f32)>> =
            Vec::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            let results = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], k);
            let mut near: Vec<(usize, Vector2<f32>, f32)> = results
                .into_iter()
                .filter_map(|nn| {
                    let j = nn.item as usize;
                    if j == i {
                        return None;
                    }
                    let e = points[j] - *p;
                    let d = e.norm();
                    (d >= params.min_spacing_pix && d <= params.max_spacing_pix)
                        .then_some((j, e, d))
                })
                .collect();

            // kd-tree ties are not ordered by index; make the edge order stable.
            near.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
            if let Some(nearest) = near.first().map(|n| n.2) {
                near.retain(|n| n.2 <= params.side_ratio_max * nearest);
            }
            raw_edges.push(near);
        }

        let axis = dominant_axis(raw_edges.iter().flatten().map(|(_, e, _)| *e))?;
        let tolerance = params.axis_tolerance_deg.to_radians();

        let directed: Vec<[Option<NodeNeighbor>; 4]> = raw_edges
            .iter()
            .map(|edges| {
                let candidates = edges
                    .iter()
                    .filter_map(|&(j, e, d)| {
                        let (direction, score) = classify_edge(axis, &e, tolerance)?;
                        Some(NodeNeighbor {
                            direction,
                            index: j,
                            distance: d,
                            score,
                        })
                    })
                    .collect();
                select_neighbors(candidates)
            })
            .collect();

        // Keep only edges confirmed from both ends.
        let neighbors = directed
            .iter()
            .enumerate()
            .map(|(i, slots)| {
                let mut kept = [None; 4];
                for n in slots.iter().flatten() {
                    let back = directed[n.index][n.direction.opposite().slot()];
                    if back.is_some_and(|b| b.index == i) {
                        kept[n.direction.slot()] = Some(*n);
                    }
                }
                kept
            })
            .collect();

        Some(Self { neighbors, axis })
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.len()];
    let mut components = Vec::new();

    for start in 0..graph.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in graph.neighbors[node].iter().flatten() {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        component.sort_unstable();
        components.push(component);
    }

    components
}

/// BFS integer coordinates `(node, i, j)` for one component.
///
/// Returns `None` when the component is not a consistent lattice: a node
/// reached with two different coordinates, or two nodes claiming the same
/// cell.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut placed: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut queue = VecDeque::new();
    placed.insert(start, (0, 0));
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = placed[&node];
        for neighbor in graph.neighbors[node].iter().flatten() {
            let (di, dj) = neighbor.direction.step();
            let cell = (i + di, j + dj);
            match placed.get(&neighbor.index) {
                Some(&existing) if existing != cell => return None,
                Some(_) => {}
                None => {
                    placed.insert(neighbor.index, cell);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let mut coords: Vec<(usize, i32, i32)> =
        placed.into_iter().map(|(n, (i, j))| (n, i, j)).collect();
    coords.sort_unstable_by_key(|&(n, _, _)| n);

    let mut cells: Vec<(i32, i32)> = coords.iter().map(|&(_, i, j)| (i, j)).collect();
    cells.sort_unstable();
    cells.dedup();
    if cells.len() != coords.len() {
        return None;
    }

    Some(coords)
}

/// Average image displacement of one grid step `(di, dj)`.
fn mean_step(
    points: &[Point2<f32>],
    cells: &[(usize, i32, i32)],
    lattice: &HashMap<(i32, i32), usize>,
    di: i32,
    dj: i32,
) -> Vector2<f32> {
    let mut sum = Vector2::<f32>::zeros();
    let mut n = 0usize;
    for &(a, i, j) in cells {
        if let Some(&b) = lattice.get(&(i + di, j + dj)) {
            sum += points[b] - points[a];
            n += 1;
        }
    }
    if n == 0 {
        sum
    } else {
        sum / n as f32
    }
}

/// Order a complete lattice of `cols × rows` nodes row-major.
///
/// `coords` must use `(i, j)` cells starting anywhere; they are shifted to
/// the origin, transposed if the pattern is stored rotated, and flipped so
/// that `+i` runs towards `+x` and `+j` towards `+y` in the image as far as
/// the board layout allows.
fn order_lattice(
    points: &[Point2<f32>],
    coords: &[(usize, i32, i32)],
    geometry: PatternGeometry,
) -> Option<Vec<usize>> {
    let cols = geometry.cols() as i32;
    let rows = geometry.rows() as i32;

    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let mut cells: Vec<(usize, i32, i32)> = coords
        .iter()
        .map(|&(n, i, j)| (n, i - min_i, j - min_j))
        .collect();
    let width = cells.iter().map(|c| c.1).max()? + 1;
    let height = cells.iter().map(|c| c.2).max()? + 1;

    let lattice_of = |cells: &[(usize, i32, i32)]| -> HashMap<(i32, i32), usize> {
        cells.iter().map(|&(n, i, j)| ((i, j), n)).collect()
    };

    let transpose = |cells: &mut Vec<(usize, i32, i32)>| {
        for c in cells.iter_mut() {
            std::mem::swap(&mut c.1, &mut c.2);
        }
    };

    if (width, height) == (cols, rows) {
        if cols == rows {
            // Square boards: prefer `i` along the more horizontal image axis.
            let lattice = lattice_of(&cells);
            let di = mean_step(points, &cells, &lattice, 1, 0);
            if di.x.abs() < di.y.abs() {
                transpose(&mut cells);
            }
        }
    } else if (height, width) == (cols, rows) {
        transpose(&mut cells);
    } else {
        debug!("lattice {width}x{height} does not match pattern {geometry}");
        return None;
    }

    let lattice = lattice_of(&cells);
    let di = mean_step(points, &cells, &lattice, 1, 0);
    let dj = mean_step(points, &cells, &lattice, 0, 1);
    let flip_i = if di.x.abs() >= di.y.abs() {
        di.x < 0.0
    } else {
        di.y < 0.0
    };
    let flip_j = if dj.y.abs() >= dj.x.abs() {
        dj.y < 0.0
    } else {
        dj.x < 0.0
    };

    let mut order = vec![usize::MAX; (cols * rows) as usize];
    for &(n, i, j) in &cells {
        let c = if flip_i { cols - 1 - i } else { i };
        let r = if flip_j { rows - 1 - j } else { j };
        order[(r * cols + c) as usize] = n;
    }
    if order.contains(&usize::MAX) {
        return None;
    }
    Some(order)
}

/// Find the `cols × rows` corner lattice among `points` and return the
/// candidate indices in row-major pattern order.
///
/// Only a component containing exactly the full grid is accepted; partial
/// boards are rejected.
pub fn assemble_grid(
    points: &[Point2<f32>],
    geometry: PatternGeometry,
    params: &GridGraphParams,
) -> Option<Vec<usize>> {
    let expected = geometry.corner_count();
    if points.len() < expected {
        debug!(
            "only {} candidates for a {} pattern ({} needed)",
            points.len(),
            geometry,
            expected
        );
        return None;
    }

    let graph = GridGraph::new(points, params)?;
    let mut components = connected_components(&graph);
    components.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

    debug!(
        "grid graph: {} nodes, axis {:.1} deg, largest component {}",
        graph.len(),
        graph.axis.to_degrees(),
        components.first().map_or(0, Vec::len)
    );

    components
        .iter()
        .filter(|c| c.len() == expected)
        .find_map(|component| {
            let coords = assign_grid_coordinates(&graph, component)?;
            order_lattice(points, &coords, geometry)
        })
}
