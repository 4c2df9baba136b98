//! Unified error type for margin and critical-time calculations
//!
//! [`GatError`] covers the two fatal families a calculation can hit:
//! configuration errors (raised before any probe runs) and infrastructure
//! errors (files, directories, process links). Probe outcomes such as a
//! diverging simulation are not errors at this level; they are recorded in
//! [`crate::SimulationResult::status`].
//!
//! # Example
//!
//! ```ignore
//! use gat_core::{GatError, GatResult};
//!
//! fn check(accuracy: u32) -> GatResult<()> {
//!     if accuracy == 0 || accuracy > 100 {
//!         return Err(GatError::IncoherentAccuracy(accuracy));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for all calculation entry points.
#[derive(Error, Debug)]
pub enum GatError {
    /// I/O errors (file access, result exchange, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no margin calculation task defined in the calculation descriptor")]
    MarginCalculationTaskNotFound,

    #[error("no critical time calculation task defined in the calculation descriptor")]
    CriticalTimeCalculationTaskNotFound,

    #[error("no scenarios defined in the calculation descriptor")]
    ScenariosNotDefined,

    /// Margin accuracy must be an integer percentage in `[1, 100]`
    #[error("incoherent margin accuracy {0}: expected an integer in [1, 100]")]
    IncoherentAccuracy(u32),

    /// Critical-time accuracy must lie in `(0, 1]`
    #[error("incoherent critical time accuracy {0}: expected a value in (0, 1]")]
    IncoherentCriticalTimeAccuracy(f64),

    #[error("incoherent bounds [{min}, {max}]: the range must exceed twice the accuracy {accuracy}")]
    IncoherentMinMax { min: f64, max: f64, accuracy: f64 },

    /// The dynamic model targeted by a critical-time search is absent from the scenario
    #[error("dynamic model id '{id}' not found in {}", .file.display())]
    DydIdNotFound { id: String, file: PathBuf },

    #[error("file {} does not exist", .0.display())]
    FileDoesNotExist(PathBuf),

    #[error("directory {} does not exist", .0.display())]
    DirectoryDoesNotExist(PathBuf),

    #[error("input file format not supported: {}", .0.display())]
    InputFileFormatNotSupported(PathBuf),

    /// A rank lost its link to the rest of the cluster
    #[error("work distribution error: {0}")]
    Distribution(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl GatError {
    /// True for errors caused by the calculation descriptor rather than the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GatError::Config(_)
                | GatError::MarginCalculationTaskNotFound
                | GatError::CriticalTimeCalculationTaskNotFound
                | GatError::ScenariosNotDefined
                | GatError::IncoherentAccuracy(_)
                | GatError::IncoherentCriticalTimeAccuracy(_)
                | GatError::IncoherentMinMax { .. }
                | GatError::DydIdNotFound { .. }
        )
    }
}

/// Convenience type alias for Results using GatError.
pub type GatResult<T> = Result<T, GatError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for GatError {
    fn from(err: anyhow::Error) -> Self {
        GatError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for GatError {
    fn from(s: String) -> Self {
        GatError::Other(s)
    }
}

impl From<&str> for GatError {
    fn from(s: &str) -> Self {
        GatError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for GatError {
    fn from(err: serde_json::Error) -> Self {
        GatError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatError::IncoherentMinMax {
            min: 1.0,
            max: 1.5,
            accuracy: 0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("[1, 1.5]"));
        assert!(msg.contains("0.5"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let gat_err: GatError = io_err.into();
        assert!(matches!(gat_err, GatError::Io(_)));
        assert!(!gat_err.is_configuration());
    }

    #[test]
    fn test_configuration_family() {
        assert!(GatError::ScenariosNotDefined.is_configuration());
        assert!(GatError::IncoherentAccuracy(0).is_configuration());
        assert!(GatError::DydIdNotFound {
            id: "FAULT".into(),
            file: PathBuf::from("s1.dyd"),
        }
        .is_configuration());
        assert!(!GatError::Distribution("closed".into()).is_configuration());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GatResult<()> {
            Err(GatError::MarginCalculationTaskNotFound)
        }

        fn outer() -> GatResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(
            outer(),
            Err(GatError::MarginCalculationTaskNotFound)
        ));
    }

    #[test]
    fn test_string_conversion() {
        let err: GatError = "worker vanished".into();
        assert_eq!(err.to_string(), "worker vanished");
    }
}
