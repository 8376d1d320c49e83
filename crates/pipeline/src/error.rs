use std::io;
use std::path::PathBuf;

use crate::api::ApiError;
use crate::session::RenderStage;

/// Every way a render can fail. All of them are fatal for the session.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no GPU device at platform {platform}, device {device}: {reason}")]
    DeviceUnavailable {
        platform: usize,
        device: usize,
        reason: String,
    },
    #[error("compute program failed to compile:\n{log}")]
    Compile { log: String },
    #[error("compute program does not export an entry point named `{name}`")]
    EntryPointNotFound { name: String },
    #[error("failed to allocate a {width}x{height} output surface")]
    Allocation {
        width: u32,
        height: u32,
        #[source]
        source: ApiError,
    },
    #[error("failed to bind kernel parameter slot {slot} ({name})")]
    ParameterBind {
        slot: u32,
        name: &'static str,
        #[source]
        source: ApiError,
    },
    #[error("kernel dispatch was rejected")]
    Dispatch(#[source] ApiError),
    #[error("failed to read the output surface back to host memory")]
    Readback(#[source] ApiError),
    #[error("failed to read compute program source {}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write image {}", path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl RenderError {
    /// The stage the render was in when this error stopped it.
    pub fn failed_stage(&self) -> RenderStage {
        match self {
            RenderError::SourceRead { .. } | RenderError::DeviceUnavailable { .. } => {
                RenderStage::Idle
            }
            RenderError::Compile { .. } | RenderError::EntryPointNotFound { .. } => {
                RenderStage::DeviceSelected
            }
            RenderError::Allocation { .. } => RenderStage::ProgramBuilt,
            RenderError::ParameterBind { .. } => RenderStage::SurfaceAllocated,
            RenderError::Dispatch(_) => RenderStage::ParametersBound,
            RenderError::Readback(_) => RenderStage::Dispatched,
            RenderError::ImageWrite { .. } => RenderStage::ReadBack,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
