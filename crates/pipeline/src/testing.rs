//! Recording [`ComputeApi`] double used by the unit tests.

use crate::api::{ApiError, ComputeApi, ImageDesc, KernelArg};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Handle(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BoundValue {
    Memory(Handle),
    Int(i32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Platforms,
    GpuDevices(Handle),
    CreateContext(Handle),
    CreateProgram(Handle),
    BuildProgram(Handle),
    CreateKernel { kernel: Handle, name: String },
    CreateImage { memory: Handle, desc: ImageDesc },
    SetArg { slot: u32, value: BoundValue },
    CreateQueue(Handle),
    EnqueueKernel { queue: Handle, global: Vec<usize> },
    ReadImage {
        queue: Handle,
        memory: Handle,
        region: [usize; 3],
        row_pitch: usize,
    },
    ReleaseQueue(Handle),
    ReleaseMem(Handle),
    ReleaseKernel(Handle),
    ReleaseProgram(Handle),
    ReleaseContext(Handle),
}

pub(crate) struct RecordingApi {
    pub platform_count: usize,
    pub device_count: usize,
    pub compile_log: Option<String>,
    pub exported: Vec<String>,
    pub fail_allocation: bool,
    pub reject_slot: Option<u32>,
    pub fail_dispatch: bool,
    pub fail_readback: bool,
    /// Pixel the simulated kernel writes everywhere.
    pub fill: [u8; 4],
    pub calls: Vec<Call>,
    /// Id handed to the next created handle.
    pub next_id: u32,
}

impl Default for RecordingApi {
    fn default() -> Self {
        Self {
            platform_count: 1,
            device_count: 1,
            compile_log: None,
            exported: vec!["render".to_string()],
            fail_allocation: false,
            reject_slot: None,
            fail_dispatch: false,
            fail_readback: false,
            fill: [255, 0, 0, 255],
            calls: Vec::new(),
            next_id: 1,
        }
    }
}

impl RecordingApi {
    fn next(&mut self) -> Handle {
        let handle = Handle(self.next_id);
        self.next_id += 1;
        handle
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(predicate)
    }

    pub fn allocated_memory(&self) -> Vec<Handle> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::CreateImage { memory, .. } => Some(*memory),
                _ => None,
            })
            .collect()
    }

    pub fn released_memory(&self) -> Vec<Handle> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::ReleaseMem(memory) => Some(*memory),
                _ => None,
            })
            .collect()
    }

    /// Slot/value pairs in the order they were bound.
    pub fn bound_args(&self) -> Vec<(u32, BoundValue)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SetArg { slot, value } => Some((*slot, value.clone())),
                _ => None,
            })
            .collect()
    }
}

impl ComputeApi for RecordingApi {
    type Platform = Handle;
    type Device = Handle;
    type Context = Handle;
    type Program = Handle;
    type Kernel = Handle;
    type Memory = Handle;
    type Queue = Handle;

    fn platforms(&mut self) -> Result<Vec<Handle>, ApiError> {
        self.calls.push(Call::Platforms);
        Ok((0..self.platform_count as u32)
            .map(|index| Handle(1000 + index))
            .collect())
    }

    fn gpu_devices(&mut self, platform: &Handle) -> Result<Vec<Handle>, ApiError> {
        self.calls.push(Call::GpuDevices(*platform));
        Ok((0..self.device_count as u32)
            .map(|index| Handle(2000 + index))
            .collect())
    }

    fn create_context(&mut self, _platform: &Handle, _device: &Handle) -> Result<Handle, ApiError> {
        let context = self.next();
        self.calls.push(Call::CreateContext(context));
        Ok(context)
    }

    fn create_program_with_source(
        &mut self,
        _context: &Handle,
        _source: &str,
    ) -> Result<Handle, ApiError> {
        let program = self.next();
        self.calls.push(Call::CreateProgram(program));
        Ok(program)
    }

    fn build_program(&mut self, program: &mut Handle, _device: &Handle) -> Result<(), ApiError> {
        self.calls.push(Call::BuildProgram(*program));
        match &self.compile_log {
            Some(log) => Err(ApiError::Build { log: log.clone() }),
            None => Ok(()),
        }
    }

    fn create_kernel(&mut self, _program: &Handle, name: &str) -> Result<Handle, ApiError> {
        if !self.exported.iter().any(|exported| exported == name) {
            return Err(ApiError::InvalidKernelName {
                name: name.to_string(),
            });
        }
        let kernel = self.next();
        self.calls.push(Call::CreateKernel {
            kernel,
            name: name.to_string(),
        });
        Ok(kernel)
    }

    fn create_image_2d(&mut self, _context: &Handle, desc: &ImageDesc) -> Result<Handle, ApiError> {
        if self.fail_allocation {
            return Err(ApiError::OutOfResources("simulated".into()));
        }
        let memory = self.next();
        self.calls.push(Call::CreateImage {
            memory,
            desc: *desc,
        });
        Ok(memory)
    }

    fn set_kernel_arg(
        &mut self,
        _kernel: &mut Handle,
        index: u32,
        arg: KernelArg<'_, Handle>,
    ) -> Result<(), ApiError> {
        if self.reject_slot == Some(index) {
            return Err(ApiError::InvalidArg {
                index,
                reason: "simulated".into(),
            });
        }
        let value = match arg {
            KernelArg::Memory(memory) => BoundValue::Memory(*memory),
            KernelArg::Int(value) => BoundValue::Int(value),
        };
        self.calls.push(Call::SetArg { slot: index, value });
        Ok(())
    }

    fn create_command_queue(&mut self, _context: &Handle, _device: &Handle) -> Result<Handle, ApiError> {
        let queue = self.next();
        self.calls.push(Call::CreateQueue(queue));
        Ok(queue)
    }

    fn enqueue_nd_range_kernel(
        &mut self,
        queue: &mut Handle,
        _kernel: &Handle,
        global_work_size: &[usize],
    ) -> Result<(), ApiError> {
        if self.fail_dispatch {
            return Err(ApiError::Failed("invalid work-group geometry".into()));
        }
        self.calls.push(Call::EnqueueKernel {
            queue: *queue,
            global: global_work_size.to_vec(),
        });
        Ok(())
    }

    fn enqueue_read_image(
        &mut self,
        queue: &mut Handle,
        image: &Handle,
        region: [usize; 3],
        row_pitch: usize,
        dst: &mut [u8],
    ) -> Result<(), ApiError> {
        if self.fail_readback {
            return Err(ApiError::Failed("device lost".into()));
        }
        self.calls.push(Call::ReadImage {
            queue: *queue,
            memory: *image,
            region,
            row_pitch,
        });
        let [width, height, _] = region;
        for row in dst.chunks_exact_mut(row_pitch).take(height) {
            for pixel in row[..width * 4].chunks_exact_mut(4) {
                pixel.copy_from_slice(&self.fill);
            }
        }
        Ok(())
    }

    fn release_command_queue(&mut self, queue: &Handle) {
        self.calls.push(Call::ReleaseQueue(*queue));
    }

    fn release_mem_object(&mut self, memory: &Handle) {
        self.calls.push(Call::ReleaseMem(*memory));
    }

    fn release_kernel(&mut self, kernel: &Handle) {
        self.calls.push(Call::ReleaseKernel(*kernel));
    }

    fn release_program(&mut self, program: &Handle) {
        self.calls.push(Call::ReleaseProgram(*program));
    }

    fn release_context(&mut self, context: &Handle) {
        self.calls.push(Call::ReleaseContext(*context));
    }
}
