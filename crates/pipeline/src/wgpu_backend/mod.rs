//! [`ComputeApi`] on top of `wgpu`.
//!
//! The handle model maps onto wgpu like this:
//! - platform: a [`wgpu::Backend`] exposing at least one adapter;
//! - device: a GPU-class adapter on that backend;
//! - context: the `wgpu::Device`/`wgpu::Queue` pair requested from it;
//! - program: WGSL text, compiled and validated by naga before wgpu sees it;
//! - kernel: a compute pipeline whose bind group 0 layout is reflected from
//!   the program, one binding per argument slot;
//! - image: an `Rgba8Uint` storage texture;
//! - command queue: one command encoder per submission on the context queue.
//!
//! Errors that wgpu reports asynchronously are captured with error scopes so
//! every call fails where it was made.

mod reflect;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::api::{
    ApiError, ChannelOrder, ChannelType, ComputeApi, ImageDesc, ImageFormat, KernelArg, MemAccess,
};
use reflect::{KernelSignature, ParamType, ReflectedParam};

/// Adapter types that count as GPU devices.
const GPU_DEVICE_TYPES: [wgpu::DeviceType; 3] = [
    wgpu::DeviceType::DiscreteGpu,
    wgpu::DeviceType::IntegratedGpu,
    wgpu::DeviceType::VirtualGpu,
];

/// Scalar uniforms are padded to 16 bytes.
const SCALAR_UNIFORM_WORDS: usize = 4;

pub struct WgpuApi {
    instance: wgpu::Instance,
    adapters: Vec<wgpu::Adapter>,
}

#[derive(Clone, Debug)]
pub struct WgpuDevice {
    adapter: wgpu::Adapter,
    info: wgpu::AdapterInfo,
}

impl WgpuDevice {
    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }
}

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: wgpu::Limits,
}

pub struct WgpuProgram {
    device: wgpu::Device,
    source: String,
    built: Option<BuiltProgram>,
}

struct BuiltProgram {
    module: wgpu::naga::Module,
    shader: wgpu::ShaderModule,
}

pub struct WgpuKernel {
    device: wgpu::Device,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    signature: KernelSignature,
    bound: BTreeMap<u32, BoundArg>,
}

enum BoundArg {
    Image(wgpu::TextureView),
    Uniform(wgpu::Buffer),
}

pub struct WgpuImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub struct WgpuQueue {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuApi {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        Self {
            instance,
            adapters: Vec::new(),
        }
    }
}

impl Default for WgpuApi {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `op` inside validation and out-of-memory error scopes.
fn scoped<T>(device: &wgpu::Device, op: impl FnOnce() -> T) -> Result<T, wgpu::Error> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = op();
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());
    match out_of_memory.or(validation) {
        Some(err) => Err(err),
        None => Ok(value),
    }
}

fn failed(err: wgpu::Error) -> ApiError {
    match err {
        wgpu::Error::OutOfMemory { .. } => ApiError::OutOfResources(err.to_string()),
        other => ApiError::Failed(other.to_string()),
    }
}

fn texture_format(desc: &ImageDesc) -> wgpu::TextureFormat {
    match (desc.format.order, desc.format.channel_type) {
        (ChannelOrder::Rgba, ChannelType::UnsignedInt8) => wgpu::TextureFormat::Rgba8Uint,
    }
}

/// Checks that `arg` is the kind of value the program declares for `param`.
fn check_arg_kind<M>(param: &ReflectedParam, arg: &KernelArg<'_, M>) -> Result<(), ApiError> {
    let got = match (&param.ty, arg) {
        (ParamType::WriteOnlyRgba8Image, KernelArg::Memory(_))
        | (ParamType::Int32Uniform, KernelArg::Int(_)) => return Ok(()),
        (_, KernelArg::Memory(_)) => "a memory object",
        (_, KernelArg::Int(_)) => "a 32-bit integer",
    };
    Err(ApiError::InvalidArg {
        index: param.slot,
        reason: format!("`{}` is {:?}, got {got}", param.name, param.ty),
    })
}

/// Copies `row_bytes` from each `padded_row_bytes`-wide row of `mapped` into
/// rows of `dst` spaced `row_pitch` apart.
fn unpad_rows(
    mapped: &[u8],
    padded_row_bytes: usize,
    row_bytes: usize,
    row_pitch: usize,
    dst: &mut [u8],
) {
    for (src, out) in mapped
        .chunks_exact(padded_row_bytes)
        .zip(dst.chunks_exact_mut(row_pitch))
    {
        out[..row_bytes].copy_from_slice(&src[..row_bytes]);
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

impl ComputeApi for WgpuApi {
    type Platform = wgpu::Backend;
    type Device = WgpuDevice;
    type Context = WgpuContext;
    type Program = WgpuProgram;
    type Kernel = WgpuKernel;
    type Memory = WgpuImage;
    type Queue = WgpuQueue;

    fn platforms(&mut self) -> Result<Vec<wgpu::Backend>, ApiError> {
        self.adapters = self.instance.enumerate_adapters(wgpu::Backends::all());
        let mut backends = Vec::new();
        for adapter in &self.adapters {
            let backend = adapter.get_info().backend;
            if !backends.contains(&backend) {
                backends.push(backend);
            }
        }
        tracing::debug!(adapters = self.adapters.len(), ?backends, "enumerated platforms");
        Ok(backends)
    }

    fn gpu_devices(&mut self, platform: &wgpu::Backend) -> Result<Vec<WgpuDevice>, ApiError> {
        let devices = self
            .adapters
            .iter()
            .map(|adapter| WgpuDevice {
                adapter: adapter.clone(),
                info: adapter.get_info(),
            })
            .filter(|device| {
                device.info.backend == *platform
                    && GPU_DEVICE_TYPES.contains(&device.info.device_type)
            })
            .collect::<Vec<_>>();
        for (index, device) in devices.iter().enumerate() {
            tracing::debug!(
                index,
                name = %device.info.name,
                device_type = ?device.info.device_type,
                driver = %device.info.driver,
                "found GPU device"
            );
        }
        Ok(devices)
    }

    fn create_context(
        &mut self,
        _platform: &wgpu::Backend,
        device: &WgpuDevice,
    ) -> Result<WgpuContext, ApiError> {
        let limits = device.adapter.limits();
        let (wgpu_device, queue) =
            pollster::block_on(device.adapter.request_device(&wgpu::DeviceDescriptor {
                label: Some("raytrace device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::default(),
            }))
            .map_err(|err| ApiError::Failed(err.to_string()))?;
        Ok(WgpuContext {
            device: wgpu_device,
            queue,
            limits,
        })
    }

    fn create_program_with_source(
        &mut self,
        context: &WgpuContext,
        source: &str,
    ) -> Result<WgpuProgram, ApiError> {
        if source.trim().is_empty() {
            return Err(ApiError::Build {
                log: "program source is empty".to_string(),
            });
        }
        Ok(WgpuProgram {
            device: context.device.clone(),
            source: source.to_string(),
            built: None,
        })
    }

    fn build_program(
        &mut self,
        program: &mut WgpuProgram,
        _device: &WgpuDevice,
    ) -> Result<(), ApiError> {
        let module = reflect::compile(&program.source).map_err(|log| ApiError::Build { log })?;
        let shader = scoped(&program.device, || {
            program
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("render program"),
                    source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(program.source.as_str())),
                })
        })
        .map_err(|err| ApiError::Build {
            log: err.to_string(),
        })?;
        program.built = Some(BuiltProgram { module, shader });
        Ok(())
    }

    fn create_kernel(&mut self, program: &WgpuProgram, name: &str) -> Result<WgpuKernel, ApiError> {
        let built = program
            .built
            .as_ref()
            .ok_or_else(|| ApiError::Failed("program has not been built".to_string()))?;
        let signature =
            reflect::reflect_kernel(&built.module, name).ok_or_else(|| {
                ApiError::InvalidKernelName {
                    name: name.to_string(),
                }
            })?;

        let mut entries = Vec::with_capacity(signature.params.len());
        for param in &signature.params {
            let ty = match &param.ty {
                ParamType::WriteOnlyRgba8Image => wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                ParamType::Int32Uniform => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(4),
                },
                ParamType::Unsupported(description) => {
                    return Err(ApiError::Build {
                        log: format!(
                            "kernel parameter `{}` (slot {}) has unsupported type {description}",
                            param.name, param.slot
                        ),
                    })
                }
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: param.slot,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty,
                count: None,
            });
        }

        let device = &program.device;
        let (layout, pipeline) = scoped(device, || {
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("kernel parameters"),
                entries: &entries,
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("kernel pipeline layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("render kernel"),
                layout: Some(&pipeline_layout),
                module: &built.shader,
                entry_point: Some(name),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            (layout, pipeline)
        })
        .map_err(|err| ApiError::Build {
            log: err.to_string(),
        })?;

        tracing::debug!(
            entry_point = name,
            workgroup_size = ?signature.workgroup_size,
            params = signature.params.len(),
            "created kernel"
        );
        Ok(WgpuKernel {
            device: device.clone(),
            pipeline,
            layout,
            signature,
            bound: BTreeMap::new(),
        })
    }

    fn create_image_2d(
        &mut self,
        context: &WgpuContext,
        desc: &ImageDesc,
    ) -> Result<WgpuImage, ApiError> {
        let max = context.limits.max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(ApiError::OutOfResources(format!(
                "image of {}x{} exceeds device limit of {max} per dimension",
                desc.width, desc.height
            )));
        }
        let usage = match desc.access {
            MemAccess::WriteOnly => {
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC
            }
        };
        let texture = scoped(&context.device, || {
            context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("output surface"),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc),
                usage,
                view_formats: &[],
            })
        })
        .map_err(failed)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuImage { texture, view })
    }

    fn set_kernel_arg(
        &mut self,
        kernel: &mut WgpuKernel,
        index: u32,
        arg: KernelArg<'_, WgpuImage>,
    ) -> Result<(), ApiError> {
        let param = kernel
            .signature
            .param(index)
            .ok_or_else(|| ApiError::InvalidArg {
                index,
                reason: "the kernel declares no parameter in this slot".to_string(),
            })?;
        check_arg_kind(param, &arg)?;
        let bound = match arg {
            KernelArg::Memory(image) => BoundArg::Image(image.view.clone()),
            KernelArg::Int(value) => {
                let mut words = [0i32; SCALAR_UNIFORM_WORDS];
                words[0] = value;
                let device = &kernel.device;
                let buffer = scoped(device, || {
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(param.name.as_str()),
                        contents: bytemuck::cast_slice(&words),
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
                })
                .map_err(failed)?;
                BoundArg::Uniform(buffer)
            }
        };
        kernel.bound.insert(index, bound);
        Ok(())
    }

    fn create_command_queue(
        &mut self,
        context: &WgpuContext,
        _device: &WgpuDevice,
    ) -> Result<WgpuQueue, ApiError> {
        Ok(WgpuQueue {
            device: context.device.clone(),
            queue: context.queue.clone(),
        })
    }

    fn enqueue_nd_range_kernel(
        &mut self,
        queue: &mut WgpuQueue,
        kernel: &WgpuKernel,
        global_work_size: &[usize],
    ) -> Result<(), ApiError> {
        if global_work_size.is_empty() || global_work_size.len() > 3 {
            return Err(ApiError::Failed(format!(
                "global work size must have 1 to 3 dimensions, got {}",
                global_work_size.len()
            )));
        }
        let mut groups = [1u32; 3];
        for (axis, &extent) in global_work_size.iter().enumerate() {
            let extent = u32::try_from(extent)
                .map_err(|_| ApiError::Failed(format!("global size {extent} overflows u32")))?;
            groups[axis] = extent.div_ceil(kernel.signature.workgroup_size[axis].max(1));
        }

        let mut entries = Vec::with_capacity(kernel.signature.params.len());
        for param in &kernel.signature.params {
            let resource = match kernel.bound.get(&param.slot) {
                Some(BoundArg::Image(view)) => wgpu::BindingResource::TextureView(view),
                Some(BoundArg::Uniform(buffer)) => buffer.as_entire_binding(),
                None => {
                    return Err(ApiError::InvalidArg {
                        index: param.slot,
                        reason: format!("kernel argument `{}` is not set", param.name),
                    })
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: param.slot,
                resource,
            });
        }

        tracing::debug!(?global_work_size, ?groups, "dispatching workgroups");
        scoped(&queue.device, || {
            let bind_group = queue.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kernel arguments"),
                layout: &kernel.layout,
                entries: &entries,
            });
            let mut encoder = queue
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render dispatch"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("render"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&kernel.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            }
            queue.queue.submit(Some(encoder.finish()));
        })
        .map_err(failed)
    }

    fn enqueue_read_image(
        &mut self,
        queue: &mut WgpuQueue,
        image: &WgpuImage,
        region: [usize; 3],
        row_pitch: usize,
        dst: &mut [u8],
    ) -> Result<(), ApiError> {
        let [width, height, depth] = region;
        let row_bytes = width * ImageFormat::RGBA8_UINT.bytes_per_pixel();
        if depth != 1 || row_bytes == 0 || row_pitch < row_bytes || dst.len() < row_pitch * height {
            return Err(ApiError::Failed(format!(
                "host buffer of {} bytes cannot hold region {region:?} at row pitch {row_pitch}",
                dst.len()
            )));
        }
        let width = u32::try_from(width).map_err(|err| ApiError::Failed(err.to_string()))?;
        let height = u32::try_from(height).map_err(|err| ApiError::Failed(err.to_string()))?;
        let padded_row_bytes = align_to(row_bytes as u32, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let device = &queue.device;
        let readback = scoped(device, || {
            let readback = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback"),
                size: u64::from(padded_row_bytes) * u64::from(height),
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &image.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &readback,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row_bytes),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
            queue.queue.submit(Some(encoder.finish()));
            readback
        })
        .map_err(failed)?;

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| ApiError::Failed(format!("device poll failed: {err}")))?;
        receiver
            .recv()
            .map_err(|_| ApiError::Failed("readback map callback was dropped".to_string()))?
            .map_err(|err| ApiError::Failed(format!("readback map failed: {err}")))?;

        {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, padded_row_bytes as usize, row_bytes, row_pitch, dst);
        }
        readback.unmap();
        Ok(())
    }

    fn release_command_queue(&mut self, _queue: &WgpuQueue) {}

    fn release_mem_object(&mut self, memory: &WgpuImage) {
        memory.texture.destroy();
    }

    fn release_kernel(&mut self, _kernel: &WgpuKernel) {}

    fn release_program(&mut self, _program: &WgpuProgram) {}

    fn release_context(&mut self, context: &WgpuContext) {
        context.device.destroy();
    }
}
