// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SPIR-V → Metal Shading Language translation.

use naga::back::msl;
use naga::{AddressSpace, StorageAccess, TypeInner};

use crate::backend::reflect::ModuleReflection;
use crate::{Error, Result};

// Buffer index reserved for naga's runtime-sized array length buffer; Metal
// caps the argument table at 31.
const SIZES_BUFFER_INDEX: u8 = 30;

pub fn translate(refl: &ModuleReflection, lang_version: (u8, u8)) -> Result<String> {
    let module = refl.module();
    let mut binding_map = msl::BindingMap::default();
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        let slot = u8::try_from(binding.binding).map_err(|_| {
            Error::Backend(format!(
                "binding slot {} is out of range for MSL",
                binding.binding
            ))
        })?;
        let binding_ty = match module.types[var.ty].inner {
            TypeInner::BindingArray { base, .. } => &module.types[base].inner,
            ref ty => ty,
        };
        let mut target = msl::BindTarget::default();
        match binding_ty {
            TypeInner::Image { .. } => target.texture = Some(slot),
            TypeInner::Sampler { .. } => {
                target.sampler = Some(msl::BindSamplerTarget::Resource(slot));
            }
            _ => {
                target.buffer = Some(slot);
                if let AddressSpace::Storage { access } = var.space {
                    target.mutable = access.contains(StorageAccess::STORE);
                }
            }
        }
        binding_map.insert(
            naga::ResourceBinding {
                group: binding.group,
                binding: binding.binding,
            },
            target,
        );
    }
    let mut per_entry_point_map = msl::EntryPointResourceMap::default();
    per_entry_point_map.insert(
        refl.entry_point_name().to_owned(),
        msl::EntryPointResources {
            resources: binding_map,
            push_constant_buffer: None,
            sizes_buffer: Some(SIZES_BUFFER_INDEX),
        },
    );
    let options = msl::Options {
        lang_version,
        per_entry_point_map,
        fake_missing_bindings: false,
        ..Default::default()
    };
    let (source, _) = msl::write_string(
        module,
        refl.module_info(),
        &options,
        &msl::PipelineOptions::default(),
    )
    .map_err(|e| Error::Backend(e.to_string()))?;
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_buffers_and_textures() {
        let module = naga::front::wgsl::parse_str(
            "\
@group(0) @binding(0) var<uniform> tint: vec4<f32>;
@group(0) @binding(1) var img: texture_2d<f32>;
@group(0) @binding(2) var smp: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return tint * textureSample(img, smp, uv);
}
",
        )
        .unwrap();
        let refl = ModuleReflection::from_module(module).unwrap();
        let source = translate(&refl, (2, 0)).unwrap();
        assert!(source.contains("#include <metal_stdlib>"), "{source}");
        assert!(source.contains("[[texture(1)]]"), "{source}");
        assert!(source.contains("[[sampler(2)]]"), "{source}");
        assert!(source.contains("[[buffer(0)]]"), "{source}");
    }
}
