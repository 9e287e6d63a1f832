use chess_corners::ChessConfig;
use serde::{Deserialize, Serialize};

/// Neighbour search used to link ChESS candidates into a 4-connected grid.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Shortest accepted corner-to-corner edge, in pixels.
    pub min_spacing_pix: f32,
    /// Longest accepted corner-to-corner edge, in pixels.
    pub max_spacing_pix: f32,
    /// Neighbours queried per candidate in the kd-tree.
    pub k_neighbors: usize,
    /// Maximal angle between an edge and the board axis it is assigned to.
    pub axis_tolerance_deg: f32,
    /// Edges longer than `side_ratio_max` times the candidate's nearest
    /// neighbour distance are dropped (this removes square diagonals).
    pub side_ratio_max: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 200.0,
            k_neighbors: 8,
            axis_tolerance_deg: 30.0,
            side_ratio_max: 1.3,
        }
    }
}

/// Iterative gradient-based corner refinement.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct SubpixParams {
    /// Search window half-size in pixels; the window is `2 * half_window + 1` wide.
    pub half_window: u32,
    /// Iteration cap.
    pub max_iters: u32,
    /// Stop once the corner moves less than this many pixels in one step.
    pub epsilon: f32,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 3,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Parameters of the checkerboard detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Candidates must respond strictly above this ChESS strength.
    pub min_corner_strength: f32,

    /// Upper bound on candidates fed into the grid search, strongest first.
    pub max_candidates: usize,

    /// ChESS threshold relative to the strongest response in the image.
    pub chess_threshold_rel: f32,

    /// ChESS non-maximum suppression radius, in pixels.
    pub chess_nms_radius: u32,

    /// Stretch intensities to the full 8-bit range before corner search.
    pub normalize_intensity: bool,

    /// Lower/upper percentile used by the contrast stretch.
    pub normalize_percentiles: [f32; 2],

    pub graph: GridGraphParams,
    pub subpix: SubpixParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_corner_strength: 0.0,
            max_candidates: 2048,
            chess_threshold_rel: 0.2,
            chess_nms_radius: 2,
            normalize_intensity: true,
            normalize_percentiles: [1.0, 99.0],
            graph: GridGraphParams::default(),
            subpix: SubpixParams::default(),
        }
    }
}

impl ChessboardParams {
    /// Single-scale ChESS configuration derived from these parameters.
    pub fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = self.chess_threshold_rel;
        cfg.params.nms_radius = self.chess_nms_radius;
        cfg
    }
}
