use crate::api::{ApiError, ComputeApi};
use crate::config::KERNEL_ENTRY_POINT;
use crate::error::{RenderError, RenderResult};
use crate::session::{RenderStage, Session};

impl<A: ComputeApi> Session<'_, A> {
    /// Compiles `source` for the session device and extracts the `render`
    /// kernel.
    ///
    /// The program handle is owned by the session as soon as it exists, so a
    /// failed build still releases it.
    pub fn build_program(&mut self, source: &str) -> RenderResult<()> {
        let program = self
            .api
            .create_program_with_source(&self.context, source)
            .map_err(compile_error)?;
        let program = self.program.insert(program);

        self.api
            .build_program(program, &self.device)
            .map_err(compile_error)?;

        let kernel = self
            .api
            .create_kernel(program, KERNEL_ENTRY_POINT)
            .map_err(|err| match err {
                ApiError::InvalidKernelName { name } => RenderError::EntryPointNotFound { name },
                other => compile_error(other),
            })?;
        self.kernel = Some(kernel);

        tracing::debug!(entry_point = KERNEL_ENTRY_POINT, "built compute program");
        self.advance(RenderStage::ProgramBuilt);
        Ok(())
    }
}

fn compile_error(err: ApiError) -> RenderError {
    match err {
        ApiError::Build { log } => RenderError::Compile { log },
        other => RenderError::Compile {
            log: other.to_string(),
        },
    }
}
