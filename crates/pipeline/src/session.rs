//! Render session: single owner of every device-side resource.
//!
//! A [`Session`] is created once a device has been selected and a context
//! exists. From then on every handle the pipeline acquires is registered on
//! the session before anything else can fail, and `Drop` tears them down in
//! reverse creation order: memory objects (in allocation order), kernel,
//! program, context. That makes teardown run on success and on every error
//! path alike, exactly once per handle.
//!
//! The stage components add their operations to `Session` from their own
//! modules (`program`, `surface`, `params`, `dispatch`).

use std::fmt;

use crate::api::{ComputeApi, ImageDesc};
use crate::device::select_device;
use crate::error::{RenderError, RenderResult};

/// Progress of one render invocation. Stages only ever advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderStage {
    Idle,
    DeviceSelected,
    ProgramBuilt,
    SurfaceAllocated,
    ParametersBound,
    Dispatched,
    ReadBack,
    Encoded,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Idle => "idle",
            RenderStage::DeviceSelected => "device selected",
            RenderStage::ProgramBuilt => "program built",
            RenderStage::SurfaceAllocated => "surface allocated",
            RenderStage::ParametersBound => "parameters bound",
            RenderStage::Dispatched => "dispatched",
            RenderStage::ReadBack => "read back",
            RenderStage::Encoded => "encoded",
        };
        f.write_str(name)
    }
}

/// The output surface among the live allocations.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OutputSurface {
    /// Index into `Session::memory`.
    pub index: usize,
    pub desc: ImageDesc,
}

pub struct Session<'a, A: ComputeApi> {
    pub(crate) api: &'a mut A,
    pub(crate) device: A::Device,
    pub(crate) context: A::Context,
    pub(crate) program: Option<A::Program>,
    pub(crate) kernel: Option<A::Kernel>,
    /// Live device allocations, in allocation order.
    pub(crate) memory: Vec<A::Memory>,
    pub(crate) output: Option<OutputSurface>,
    pub(crate) stage: RenderStage,
}

impl<'a, A: ComputeApi> Session<'a, A> {
    /// Selects the device at the fixed indices and binds it into a context.
    ///
    /// Nothing is allocated when selection fails.
    pub fn open(api: &'a mut A, platform_index: usize, device_index: usize) -> RenderResult<Self> {
        let selected = select_device(api, platform_index, device_index)?;
        let context = api
            .create_context(&selected.platform, &selected.device)
            .map_err(|err| RenderError::DeviceUnavailable {
                platform: platform_index,
                device: device_index,
                reason: format!("context creation failed: {err}"),
            })?;
        tracing::debug!(device = ?selected.device, "created compute context");

        Ok(Self {
            api,
            device: selected.device,
            context,
            program: None,
            kernel: None,
            memory: Vec::new(),
            output: None,
            stage: RenderStage::DeviceSelected,
        })
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    /// Number of device memory objects currently owned by the session.
    pub fn live_allocations(&self) -> usize {
        self.memory.len()
    }

    pub(crate) fn advance(&mut self, next: RenderStage) {
        debug_assert!(next > self.stage, "render stages only advance");
        tracing::debug!(from = %self.stage, to = %next, "render stage");
        self.stage = next;
    }
}

impl<A: ComputeApi> Drop for Session<'_, A> {
    fn drop(&mut self) {
        let memory_objects = self.memory.len();
        for memory in &self.memory {
            self.api.release_mem_object(memory);
        }
        self.memory.clear();
        self.output = None;
        if let Some(kernel) = self.kernel.take() {
            self.api.release_kernel(&kernel);
        }
        if let Some(program) = self.program.take() {
            self.api.release_program(&program);
        }
        self.api.release_context(&self.context);
        tracing::debug!(memory_objects, stage = %self.stage, "released device resources");
    }
}
