//! Positional kernel parameter binding.
//!
//! The device API only knows argument slots. [`RENDER_KERNEL_PARAMS`] is the
//! one place that names them; the compute program has to declare its
//! parameters in the same order, otherwise the render silently goes wrong.

use crate::api::{ApiError, ComputeApi, KernelArg};
use crate::error::{RenderError, RenderResult};
use crate::session::{RenderStage, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Write-only 2-D image with 4 x u8 channels.
    WriteOnlyImage2d,
    Int32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

/// Kernel parameters in slot order.
pub const RENDER_KERNEL_PARAMS: [ParamSpec; 4] = [
    ParamSpec {
        name: "target_image",
        kind: ParamKind::WriteOnlyImage2d,
    },
    ParamSpec {
        name: "width",
        kind: ParamKind::Int32,
    },
    ParamSpec {
        name: "height",
        kind: ParamKind::Int32,
    },
    ParamSpec {
        name: "animation",
        kind: ParamKind::Int32,
    },
];

/// Scalar configuration bound after the memory objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelScalars {
    pub width: u32,
    pub height: u32,
    pub animation: i32,
}

impl KernelScalars {
    /// Scalar values paired with their schema names, in slot order.
    fn values(&self) -> [(&'static str, Result<i32, ApiError>); 3] {
        let int = |value: u32| {
            i32::try_from(value).map_err(|_| ApiError::Failed(format!("{value} overflows i32")))
        };
        let [_, width, height, animation] = RENDER_KERNEL_PARAMS;
        [
            (width.name, int(self.width)),
            (height.name, int(self.height)),
            (animation.name, Ok(self.animation)),
        ]
    }
}

impl<A: ComputeApi> Session<'_, A> {
    /// Binds every live memory object in allocation order, then width,
    /// height and animation index as 32-bit integers.
    ///
    /// The first rejected slot aborts binding; a partially bound kernel is
    /// never dispatched.
    pub fn bind_parameters(&mut self, scalars: &KernelScalars) -> RenderResult<()> {
        let Some(kernel) = self.kernel.as_mut() else {
            return Err(RenderError::ParameterBind {
                slot: 0,
                name: RENDER_KERNEL_PARAMS[0].name,
                source: ApiError::Failed("no kernel has been built".into()),
            });
        };

        let mut slot = 0u32;
        for memory in &self.memory {
            let name = RENDER_KERNEL_PARAMS
                .get(slot as usize)
                .filter(|spec| spec.kind == ParamKind::WriteOnlyImage2d)
                .map_or("memory", |spec| spec.name);
            self.api
                .set_kernel_arg(kernel, slot, KernelArg::Memory(memory))
                .map_err(|source| RenderError::ParameterBind { slot, name, source })?;
            tracing::debug!(slot, name, "bound memory object");
            slot += 1;
        }

        for (name, value) in scalars.values() {
            let value =
                value.map_err(|source| RenderError::ParameterBind { slot, name, source })?;
            self.api
                .set_kernel_arg(kernel, slot, KernelArg::Int(value))
                .map_err(|source| RenderError::ParameterBind { slot, name, source })?;
            tracing::debug!(slot, name, value, "bound scalar");
            slot += 1;
        }

        self.advance(RenderStage::ParametersBound);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BoundValue, RecordingApi};

    fn scalars(animation: i32) -> KernelScalars {
        KernelScalars {
            width: 1800,
            height: 1000,
            animation,
        }
    }

    #[test]
    fn schema_lists_image_then_width_height_animation() {
        let names: Vec<_> = RENDER_KERNEL_PARAMS.iter().map(|spec| spec.name).collect();
        assert_eq!(names, ["target_image", "width", "height", "animation"]);
        assert_eq!(RENDER_KERNEL_PARAMS[0].kind, ParamKind::WriteOnlyImage2d);
    }

    #[test]
    fn scalars_pair_with_schema_names() {
        let values = scalars(-2).values();
        let names: Vec<_> = values.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["width", "height", "animation"]);
        assert_eq!(values[2].1, Ok(-2));
    }

    #[test]
    fn memory_objects_bind_before_scalars_in_fixed_order() {
        let mut api = RecordingApi::default();
        {
            let mut session = Session::open(&mut api, 0, 0).unwrap();
            session.build_program("source").unwrap();
            session.allocate_output_surface(1800, 1000).unwrap();
            session.bind_parameters(&scalars(7)).unwrap();
            assert_eq!(session.stage(), RenderStage::ParametersBound);
        }
        let surface = api.allocated_memory()[0];
        assert_eq!(
            api.bound_args(),
            vec![
                (0, BoundValue::Memory(surface)),
                (1, BoundValue::Int(1800)),
                (2, BoundValue::Int(1000)),
                (3, BoundValue::Int(7)),
            ]
        );
    }

    #[test]
    fn rejected_slot_stops_binding() {
        let mut api = RecordingApi {
            reject_slot: Some(2),
            ..RecordingApi::default()
        };
        {
            let mut session = Session::open(&mut api, 0, 0).unwrap();
            session.build_program("source").unwrap();
            session.allocate_output_surface(1800, 1000).unwrap();
            let err = session.bind_parameters(&scalars(0)).unwrap_err();
            assert!(matches!(
                err,
                RenderError::ParameterBind {
                    slot: 2,
                    name: "height",
                    ..
                }
            ));
        }
        assert_eq!(api.bound_args().len(), 2);
    }

    #[test]
    fn oversized_dimension_fails_its_slot() {
        let mut api = RecordingApi::default();
        let mut session = Session::open(&mut api, 0, 0).unwrap();
        session.build_program("source").unwrap();
        session.allocate_output_surface(4, 4).unwrap();
        let err = session
            .bind_parameters(&KernelScalars {
                width: u32::MAX,
                height: 4,
                animation: 0,
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::ParameterBind { slot: 1, .. }));
    }
}
