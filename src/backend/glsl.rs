// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SPIR-V → GLSL translation.
//!
//! naga's GLSL writer does not reuse module names for resources: textures
//! come out as `_group_G_binding_B_<stage>` and uniform blocks as
//! `<Type>_block_N<Stage>`, with the original names reported through
//! [`naga::back::glsl::ReflectionInfo`]. The translated source is
//! post-processed to restore the module's names, so combined image/samplers
//! appear under the `<image>_<sampler>` name they were given during
//! synthesis and uniform blocks stay addressable by their declared name.

use naga::back::glsl::{self, PipelineOptions, Version};

use crate::backend::reflect::{display_name, ModuleReflection};
use crate::{Error, Result};

pub fn translate(
    refl: &ModuleReflection,
    version_major: u32,
    version_minor: u32,
    es: bool,
) -> Result<String> {
    let lang_version = (version_major * 100 + version_minor * 10) as u16;
    let version = if es {
        Version::Embedded {
            version: lang_version,
            is_webgl: false,
        }
    } else {
        Version::Desktop(lang_version)
    };
    let module = refl.module();
    let mut binding_map = glsl::BindingMap::default();
    for (_, var) in module.global_variables.iter() {
        if let Some(binding) = &var.binding {
            let slot = u8::try_from(binding.binding).map_err(|_| {
                Error::Backend(format!(
                    "binding slot {} is out of range for GLSL",
                    binding.binding
                ))
            })?;
            binding_map.insert(binding.clone(), slot);
        }
    }
    let options = glsl::Options {
        version,
        binding_map,
        ..Default::default()
    };
    let pipeline_options = PipelineOptions {
        shader_stage: refl.entry_point_stage(),
        entry_point: refl.entry_point_name().to_owned(),
        multiview: None,
    };
    let mut output = String::new();
    let reflection = {
        let mut writer = glsl::Writer::new(
            &mut output,
            module,
            refl.module_info(),
            &options,
            &pipeline_options,
            naga::proc::BoundsCheckPolicies::default(),
        )
        .map_err(|e| Error::Backend(e.to_string()))?;
        writer.write().map_err(|e| Error::Backend(e.to_string()))?
    };

    // Restore module names. The generated identifiers are unique tokens, so
    // plain text replacement is exact; replacements are independent of each
    // other and of iteration order.
    for (glsl_name, mapping) in &reflection.texture_mapping {
        let name = display_name(module, mapping.texture);
        if *glsl_name != name {
            output = output.replace(glsl_name.as_str(), &name);
        }
    }
    for (handle, glsl_name) in &reflection.uniforms {
        let name = display_name(module, *handle);
        if *glsl_name != name {
            output = output.replace(glsl_name.as_str(), &name);
        }
    }
    Ok(output)
}
