//! The persisted calibration record.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use camcal_solver::CalibrationResult;
use serde::{Deserialize, Serialize};

use crate::config::write_json;
use crate::error::IoError;

/// Calibration output in its exchange layout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CalibrationRecord {
    pub reprojection_error: f64,
    /// Row-major 3×3 intrinsic matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// `[k1, k2, p1, p2, k3]`.
    pub dist_coeffs: Vec<f64>,
    /// `[width, height]`.
    pub image_size: [u32; 2],
}

impl From<&CalibrationResult> for CalibrationRecord {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            reprojection_error: result.rms_error,
            camera_matrix: result.camera_matrix,
            dist_coeffs: result.distortion.clone(),
            image_size: result.image_size.to_array(),
        }
    }
}

impl CalibrationRecord {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(path.as_ref(), self)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(IoError::io(path))?;
        serde_json::from_reader(BufReader::new(file)).map_err(IoError::json(path))
    }
}

/// `calib_<unix seconds>.json`.
pub fn default_result_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("calib_{secs}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::ImageSize;

    fn result() -> CalibrationResult {
        CalibrationResult {
            rms_error: 0.25,
            camera_matrix: [[800.0, 0.0, 320.0], [0.0, 790.0, 240.0], [0.0, 0.0, 1.0]],
            distortion: vec![-0.1, 0.01, 0.0, 0.0, 0.0],
            image_size: ImageSize::new(640, 480),
            views: Vec::new(),
            iterations: 7,
        }
    }

    #[test]
    fn record_uses_exchange_field_names() {
        let record = CalibrationRecord::from(&result());
        let json = serde_json::to_value(&record).expect("json");
        assert_eq!(json["reprojection_error"], 0.25);
        assert_eq!(json["camera_matrix"][1][1], 790.0);
        assert_eq!(json["dist_coeffs"].as_array().map(Vec::len), Some(5));
        assert_eq!(json["image_size"], serde_json::json!([640, 480]));
    }

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(default_result_filename());
        let record = CalibrationRecord::from(&result());
        record.write_json(&path).expect("write");
        assert_eq!(CalibrationRecord::load_json(&path).expect("read"), record);
    }

    #[test]
    fn default_name_is_timestamped() {
        let name = default_result_filename();
        let stamp = name
            .strip_prefix("calib_")
            .and_then(|s| s.strip_suffix(".json"))
            .expect("shape");
        assert!(stamp.parse::<u64>().expect("number") > 1_600_000_000);
    }
}
