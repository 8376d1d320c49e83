use crate::api::{ApiError, ComputeApi};
use crate::error::{RenderError, RenderResult};
use crate::pixels::PixelBuffer;
use crate::session::{RenderStage, Session};

/// Command queue that lives for exactly one dispatch and one readback.
///
/// Released on drop, whichever way the render leaves the scope.
struct QueueScope<'q, A: ComputeApi> {
    api: &'q mut A,
    queue: A::Queue,
}

impl<'q, A: ComputeApi> QueueScope<'q, A> {
    fn create(api: &'q mut A, context: &A::Context, device: &A::Device) -> Result<Self, ApiError> {
        let queue = api.create_command_queue(context, device)?;
        Ok(Self { api, queue })
    }

    fn enqueue_kernel(&mut self, kernel: &A::Kernel, global: &[usize]) -> Result<(), ApiError> {
        self.api
            .enqueue_nd_range_kernel(&mut self.queue, kernel, global)
    }

    fn read_image(
        &mut self,
        image: &A::Memory,
        region: [usize; 3],
        row_pitch: usize,
        dst: &mut [u8],
    ) -> Result<(), ApiError> {
        self.api
            .enqueue_read_image(&mut self.queue, image, region, row_pitch, dst)
    }
}

impl<A: ComputeApi> Drop for QueueScope<'_, A> {
    fn drop(&mut self) {
        self.api.release_command_queue(&self.queue);
    }
}

impl<A: ComputeApi> Session<'_, A> {
    /// Runs the kernel over a `[height, width]` index space sized from the
    /// output surface and blocks until the surface has been copied into a
    /// fresh host buffer.
    ///
    /// The first dispatch axis is the image row, the second the column. The
    /// compute program must index its output the same way or the image comes
    /// out transposed.
    pub fn dispatch(&mut self) -> RenderResult<PixelBuffer> {
        let not_ready = |what: &str| RenderError::Dispatch(ApiError::Failed(what.to_string()));
        if self.stage != RenderStage::ParametersBound {
            return Err(not_ready("kernel parameters are not bound"));
        }
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| not_ready("no kernel has been built"))?;
        let output = self
            .output
            .ok_or_else(|| not_ready("no output surface has been allocated"))?;
        let surface = self
            .memory
            .get(output.index)
            .ok_or_else(|| not_ready("output surface is no longer live"))?;
        let (width, height) = (output.desc.width, output.desc.height);

        let global = [height as usize, width as usize];
        let mut queue = QueueScope::create(&mut *self.api, &self.context, &self.device)
            .map_err(RenderError::Dispatch)?;

        tracing::info!(width, height, "ray tracing");
        queue
            .enqueue_kernel(kernel, &global)
            .map_err(RenderError::Dispatch)?;

        let mut pixels = PixelBuffer::new(width, height);
        let row_pitch = pixels.row_pitch();
        let read = queue.read_image(
            surface,
            [width as usize, height as usize, 1],
            row_pitch,
            pixels.as_mut_bytes(),
        );
        drop(queue);

        self.advance(RenderStage::Dispatched);
        read.map_err(RenderError::Readback)?;
        self.advance(RenderStage::ReadBack);
        Ok(pixels)
    }
}
