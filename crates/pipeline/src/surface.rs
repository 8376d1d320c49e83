use crate::api::{ComputeApi, ImageDesc, ImageFormat, MemAccess};
use crate::error::{RenderError, RenderResult};
use crate::session::{OutputSurface, RenderStage, Session};

impl<A: ComputeApi> Session<'_, A> {
    /// Allocates the write-only RGBA8 output image and registers it as a live
    /// allocation of the session.
    pub fn allocate_output_surface(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let desc = ImageDesc {
            access: MemAccess::WriteOnly,
            format: ImageFormat::RGBA8_UINT,
            width,
            height,
        };
        let memory = self
            .api
            .create_image_2d(&self.context, &desc)
            .map_err(|source| RenderError::Allocation {
                width,
                height,
                source,
            })?;
        self.memory.push(memory);
        self.output = Some(OutputSurface {
            index: self.memory.len() - 1,
            desc,
        });

        tracing::debug!(width, height, "allocated output surface");
        self.advance(RenderStage::SurfaceAllocated);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn output_surface(&self) -> Option<&A::Memory> {
        self.output.and_then(|output| self.memory.get(output.index))
    }
}
