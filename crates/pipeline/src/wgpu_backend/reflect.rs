//! Front-end compilation and parameter reflection of WGSL programs.

use wgpu::naga;

/// Type of one kernel parameter as declared by the program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ParamType {
    /// `texture_storage_2d<rgba8uint, write>`.
    WriteOnlyRgba8Image,
    /// `var<uniform> name: i32`.
    Int32Uniform,
    Unsupported(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ReflectedParam {
    /// Binding number in group 0; doubles as the argument slot.
    pub slot: u32,
    pub name: String,
    pub ty: ParamType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct KernelSignature {
    pub workgroup_size: [u32; 3],
    /// Parameters sorted by slot.
    pub params: Vec<ReflectedParam>,
}

impl KernelSignature {
    pub fn param(&self, slot: u32) -> Option<&ReflectedParam> {
        self.params.iter().find(|param| param.slot == slot)
    }
}

/// Parses and validates WGSL, returning the compiler diagnostic on failure.
pub(crate) fn compile(source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| err.emit_to_string(source))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|err| err.emit_to_string(source))?;
    Ok(module)
}

/// Reflects the compute entry point `name`, or `None` if the module does
/// not export one.
pub(crate) fn reflect_kernel(module: &naga::Module, name: &str) -> Option<KernelSignature> {
    let entry_point = module
        .entry_points
        .iter()
        .find(|entry| entry.name == name && entry.stage == naga::ShaderStage::Compute)?;

    let mut params: Vec<ReflectedParam> = module
        .global_variables
        .iter()
        .filter_map(|(_, global)| {
            let binding = global.binding.as_ref()?;
            if binding.group != 0 {
                return None;
            }
            Some(ReflectedParam {
                slot: binding.binding,
                name: global
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("binding{}", binding.binding)),
                ty: classify(module, global),
            })
        })
        .collect();
    params.sort_by_key(|param| param.slot);

    Some(KernelSignature {
        workgroup_size: entry_point.workgroup_size,
        params,
    })
}

fn classify(module: &naga::Module, global: &naga::GlobalVariable) -> ParamType {
    let inner = &module.types[global.ty].inner;
    match (global.space, inner) {
        (
            naga::AddressSpace::Handle,
            naga::TypeInner::Image {
                dim: naga::ImageDimension::D2,
                arrayed: false,
                class:
                    naga::ImageClass::Storage {
                        format: naga::StorageFormat::Rgba8Uint,
                        access,
                    },
            },
        ) if *access == naga::StorageAccess::STORE => ParamType::WriteOnlyRgba8Image,
        (
            naga::AddressSpace::Uniform,
            naga::TypeInner::Scalar(naga::Scalar {
                kind: naga::ScalarKind::Sint,
                width: 4,
            }),
        ) => ParamType::Int32Uniform,
        (space, inner) => ParamType::Unsupported(format!("{inner:?} in {space:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLID: &str = r"
@group(0) @binding(0) var target_image: texture_storage_2d<rgba8uint, write>;
@group(0) @binding(2) var<uniform> height: i32;
@group(0) @binding(1) var<uniform> width: i32;
@group(0) @binding(3) var<uniform> animation: i32;

@compute @workgroup_size(8, 8, 1)
fn render(@builtin(global_invocation_id) id: vec3<u32>) {
    let y = i32(id.x);
    let x = i32(id.y);
    if (y >= height || x >= width) {
        return;
    }
    textureStore(target_image, vec2<i32>(x, y), vec4<u32>(255u, 0u, 0u, 255u));
}
";

    #[test]
    fn reflects_params_in_slot_order() {
        let module = compile(SOLID).unwrap();
        let signature = reflect_kernel(&module, "render").unwrap();
        assert_eq!(signature.workgroup_size, [8, 8, 1]);
        let names: Vec<_> = signature.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["target_image", "width", "height", "animation"]);
        assert_eq!(signature.params[0].ty, ParamType::WriteOnlyRgba8Image);
        assert!(signature.params[1..]
            .iter()
            .all(|p| p.ty == ParamType::Int32Uniform));
    }

    #[test]
    fn missing_entry_point_reflects_nothing() {
        let module = compile(SOLID).unwrap();
        assert!(reflect_kernel(&module, "main").is_none());
    }

    #[test]
    fn syntax_error_produces_diagnostic() {
        let log = compile("@compute @workgroup_size(1) fn render() { let x = ; }").unwrap_err();
        assert!(!log.is_empty());
    }

    #[test]
    fn float_uniform_is_unsupported() {
        let module = compile(
            r"
@group(0) @binding(0) var<uniform> scale: f32;
@compute @workgroup_size(1) fn render() { let s = scale; }
",
        )
        .unwrap();
        let signature = reflect_kernel(&module, "render").unwrap();
        assert!(matches!(signature.params[0].ty, ParamType::Unsupported(_)));
    }

    #[test]
    fn bundled_program_matches_kernel_contract() {
        let source = include_str!("../../../../kernels/render.wgsl");
        let module = compile(source).unwrap();
        let signature = reflect_kernel(&module, "render").unwrap();
        let types: Vec<_> = signature.params.iter().map(|p| p.ty.clone()).collect();
        assert_eq!(
            types,
            [
                ParamType::WriteOnlyRgba8Image,
                ParamType::Int32Uniform,
                ParamType::Int32Uniform,
                ParamType::Int32Uniform,
            ]
        );
    }
}
