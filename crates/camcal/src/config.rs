//! JSON configuration for a calibration session.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use camcal_chessboard::ChessboardParams;
use camcal_core::PatternGeometry;
use camcal_solver::SolverOptions;
use serde::{Deserialize, Serialize};

use crate::error::IoError;
use crate::source::DeviceOptions;

/// Everything a session needs besides the images themselves.
///
/// Every section defaults, so `{}` is a valid config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    pub pattern: PatternGeometry,
    pub detector: ChessboardParams,
    pub solver: SolverOptions,
    pub device: DeviceOptions,
}

impl CalibConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(IoError::io(path))?;
        serde_json::from_reader(BufReader::new(file)).map_err(IoError::json(path))
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(path.as_ref(), self)
    }
}

pub(crate) fn write_json(path: &Path, value: &impl Serialize) -> Result<(), IoError> {
    let mut file = File::create(path).map_err(IoError::io(path))?;
    serde_json::to_writer_pretty(&mut file, value).map_err(IoError::json(path))?;
    file.write_all(b"\n").map_err(IoError::io(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let cfg: CalibConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg.pattern, PatternGeometry::default());
        assert_eq!(cfg.solver, SolverOptions::default());
        assert_eq!(cfg.device, DeviceOptions::default());
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cfg.json");
        let cfg = CalibConfig {
            pattern: PatternGeometry::new(7, 5).expect("valid"),
            solver: SolverOptions {
                fix_k3: true,
                ..SolverOptions::default()
            },
            ..CalibConfig::default()
        };
        cfg.write_json(&path).expect("write");
        let back = CalibConfig::load_json(&path).expect("load");
        assert_eq!(back.pattern, cfg.pattern);
        assert!(back.solver.fix_k3);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = serde_json::from_str::<CalibConfig>(r#"{"pattern": {"cols": 2, "rows": 6}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = CalibConfig::load_json("/no/such/cfg.json").unwrap_err();
        assert!(err.to_string().starts_with("/no/such/cfg.json"));
    }
}
