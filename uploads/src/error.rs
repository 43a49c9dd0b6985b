//! Upload error types.

use std::fmt;

/// Errors that can occur while uploading or relocating resource data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The resource has the wrong kind for the requested operation.
    InvalidResourceKind {
        /// Kind the operation requires.
        expected: &'static str,
        /// Kind that was actually passed.
        found: &'static str,
    },
    /// A sub-range locator was passed where a whole resource is required.
    NotWholeResource(String),
    /// A partial 2D plane update was requested without updating every lod level.
    PartialPlaneRequiresAllLods,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An event list slot was about to be overwritten while clients still reference it.
    EventSlotInUse {
        /// Index of the slot in the ring.
        slot: usize,
        /// Outstanding client references.
        references: u32,
    },
    /// Mapping a resource for CPU access failed.
    MapFailed(String),
    /// The GPU device was lost.
    DeviceLost,
    /// The backend does not support the requested operation.
    Unsupported(String),
    /// A backend call failed.
    Backend(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidResourceKind { expected, found } => {
                write!(f, "invalid resource kind: expected {expected}, found {found}")
            }
            Self::NotWholeResource(what) => {
                write!(f, "{what} must refer to a whole resource, not a sub-range")
            }
            Self::PartialPlaneRequiresAllLods => write!(
                f,
                "When updating texture data for only part of the 2D plane, you must update all lod levels"
            ),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::EventSlotInUse { slot, references } => write!(
                f,
                "event list slot {slot} still has {references} client references; ring is undersized"
            ),
            Self::MapFailed(msg) => write!(f, "resource map failed: {msg}"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::Unsupported(msg) => write!(f, "unsupported operation: {msg}"),
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for UploadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UploadError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = UploadError::InvalidResourceKind {
            expected: "linear buffer",
            found: "texture",
        };
        assert_eq!(
            err.to_string(),
            "invalid resource kind: expected linear buffer, found texture"
        );

        let err = UploadError::PartialPlaneRequiresAllLods;
        assert!(err.to_string().contains("must update all lod levels"));
    }
}
