//! Host side of the GPU ray tracer.
//!
//! One render walks a fixed sequence of stages, each owned by its own
//! module, all hanging off a single [`Session`]:
//!
//! ```text
//!   kernel source ──▶ Session::open ──▶ build_program ──▶ allocate_output_surface
//!                                                               │
//!        output.png ◀── write_png ◀── dispatch (+ readback) ◀── bind_parameters
//! ```
//!
//! Device work goes through the [`ComputeApi`] trait. [`WgpuApi`] drives a
//! real adapter; the unit tests use a recording double instead. Whatever
//! happens, dropping the session releases every device handle it acquired.

mod api;
mod config;
mod device;
mod dispatch;
mod error;
mod params;
mod pixels;
mod program;
mod session;
mod source;
mod surface;
#[cfg(test)]
mod testing;
mod wgpu_backend;

pub use api::{
    ApiError, ChannelOrder, ChannelType, ComputeApi, ImageDesc, ImageFormat, KernelArg, MemAccess,
};
pub use config::{
    RenderConfig, DEFAULT_KERNEL_PATH, DEFAULT_OUTPUT, HEIGHT, KERNEL_ENTRY_POINT, WIDTH,
};
pub use device::{select_device, SelectedDevice};
pub use error::{RenderError, RenderResult};
pub use params::{KernelScalars, ParamKind, ParamSpec, RENDER_KERNEL_PARAMS};
pub use pixels::PixelBuffer;
pub use session::{RenderStage, Session};
pub use source::load_program_source;
pub use wgpu_backend::{WgpuApi, WgpuDevice};

/// Renders one frame with `config` and writes it to `config.output`.
///
/// The program source is read before any device work starts. When this
/// returns, every device resource has been released and the output file
/// either exists in full or does not exist at all.
pub fn render_to_file<A: ComputeApi>(api: &mut A, config: &RenderConfig) -> RenderResult<()> {
    let source = load_program_source(&config.kernel_path)?;

    let mut session = Session::open(api, config.platform_index, config.device_index)?;
    session.build_program(&source)?;
    session.allocate_output_surface(config.width, config.height)?;
    session.bind_parameters(&KernelScalars {
        width: config.width,
        height: config.height,
        animation: config.animation,
    })?;
    let pixels = session.dispatch()?;
    pixels.write_png(&config.output)?;
    session.advance(RenderStage::Encoded);

    tracing::info!(
        output = %config.output.display(),
        animation = config.animation,
        "render complete"
    );
    Ok(())
}
