//! Handle-based seam over the native compute API.
//!
//! Every native call the pipeline makes goes through [`ComputeApi`]. The
//! stage modules only ever see the associated handle types, which keeps the
//! production backend ([`crate::WgpuApi`]) and the recording double used in
//! tests interchangeable.

use std::fmt;

/// Channel order of a device image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
}

/// Per-channel storage type of a device image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelType {
    UnsignedInt8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub channel_type: ChannelType,
}

impl ImageFormat {
    pub const RGBA8_UINT: ImageFormat = ImageFormat {
        order: ChannelOrder::Rgba,
        channel_type: ChannelType::UnsignedInt8,
    };

    pub fn bytes_per_pixel(&self) -> usize {
        let channels = match self.order {
            ChannelOrder::Rgba => 4,
        };
        let width = match self.channel_type {
            ChannelType::UnsignedInt8 => 1,
        };
        channels * width
    }
}

/// How the kernel may touch a memory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemAccess {
    WriteOnly,
}

/// Shape and format of a 2-D device image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub access: MemAccess,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// A value bound to one kernel argument slot.
#[derive(Debug)]
pub enum KernelArg<'a, M> {
    Memory(&'a M),
    Int(i32),
}

/// Failure reported by a native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The program failed to compile; carries the compiler log.
    Build { log: String },
    /// The program has no kernel with the requested name.
    InvalidKernelName { name: String },
    /// The kernel does not accept this value in this slot.
    InvalidArg { index: u32, reason: String },
    /// The device could not satisfy an allocation.
    OutOfResources(String),
    /// Any other rejection, carrying the driver message.
    Failed(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Build { log } => write!(f, "program build failed:\n{log}"),
            ApiError::InvalidKernelName { name } => write!(f, "no kernel named `{name}`"),
            ApiError::InvalidArg { index, reason } => {
                write!(f, "invalid argument for slot {index}: {reason}")
            }
            ApiError::OutOfResources(message) => write!(f, "out of resources: {message}"),
            ApiError::Failed(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Native compute API, modelled on a handle-oriented driver interface.
///
/// Handles are released explicitly through the `release_*` methods; after a
/// release the handle must not be passed back to the API.
pub trait ComputeApi {
    type Platform: Clone + fmt::Debug;
    type Device: Clone + fmt::Debug;
    type Context;
    type Program;
    type Kernel;
    type Memory;
    type Queue;

    fn platforms(&mut self) -> Result<Vec<Self::Platform>, ApiError>;

    /// Lists the GPU-class devices exposed by `platform`.
    fn gpu_devices(&mut self, platform: &Self::Platform) -> Result<Vec<Self::Device>, ApiError>;

    fn create_context(
        &mut self,
        platform: &Self::Platform,
        device: &Self::Device,
    ) -> Result<Self::Context, ApiError>;

    fn create_program_with_source(
        &mut self,
        context: &Self::Context,
        source: &str,
    ) -> Result<Self::Program, ApiError>;

    fn build_program(
        &mut self,
        program: &mut Self::Program,
        device: &Self::Device,
    ) -> Result<(), ApiError>;

    fn create_kernel(
        &mut self,
        program: &Self::Program,
        name: &str,
    ) -> Result<Self::Kernel, ApiError>;

    fn create_image_2d(
        &mut self,
        context: &Self::Context,
        desc: &ImageDesc,
    ) -> Result<Self::Memory, ApiError>;

    fn set_kernel_arg(
        &mut self,
        kernel: &mut Self::Kernel,
        index: u32,
        arg: KernelArg<'_, Self::Memory>,
    ) -> Result<(), ApiError>;

    fn create_command_queue(
        &mut self,
        context: &Self::Context,
        device: &Self::Device,
    ) -> Result<Self::Queue, ApiError>;

    /// Submits `kernel` over the global index space `global_work_size`.
    fn enqueue_nd_range_kernel(
        &mut self,
        queue: &mut Self::Queue,
        kernel: &Self::Kernel,
        global_work_size: &[usize],
    ) -> Result<(), ApiError>;

    /// Blocking read of `region` (`[width, height, depth]`) of `image` into
    /// `dst`, laid out with `row_pitch` bytes per row. Returns once the copy
    /// has landed in host memory.
    fn enqueue_read_image(
        &mut self,
        queue: &mut Self::Queue,
        image: &Self::Memory,
        region: [usize; 3],
        row_pitch: usize,
        dst: &mut [u8],
    ) -> Result<(), ApiError>;

    fn release_command_queue(&mut self, queue: &Self::Queue);
    fn release_mem_object(&mut self, memory: &Self::Memory);
    fn release_kernel(&mut self, kernel: &Self::Kernel);
    fn release_program(&mut self, program: &Self::Program);
    fn release_context(&mut self, context: &Self::Context);
}
