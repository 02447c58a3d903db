// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A unified reflection view over a parsed SPIR-V module.
//!
//! Resource identity is the naga global-variable handle index, which plays
//! the role SPIR-V result ids play in the wire format: stable within one
//! module, meaningful only within one module. Combined image/sampler ids are
//! allocated after the last global id.

use std::collections::HashMap;

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{
    AddressSpace, Expression, Function, GlobalVariable, Handle, ImageClass, Module,
    ResourceBinding, TypeInner,
};

use crate::{Error, Result};

/// One reflected resource: id, name and the binding the front end gave it.
#[derive(Clone, Debug)]
pub struct ResourceInfo {
    pub id: u32,
    pub name: String,
    pub set: u32,
    pub slot: u32,
}

/// The per-kind resource lists of one shader module, in declaration order,
/// restricted to resources the entry point actually uses.
#[derive(Clone, Debug, Default)]
pub struct ReflectedResources {
    pub uniform_buffers: Vec<ResourceInfo>,
    pub storage_buffers: Vec<ResourceInfo>,
    pub separate_samplers: Vec<ResourceInfo>,
    pub separate_images: Vec<ResourceInfo>,
}

/// A (separate image, separate sampler) pair that is sampled together
/// somewhere in the module, plus the id allocated for the fused binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CombinedImageSampler {
    pub image_id: u32,
    pub sampler_id: u32,
    pub combined_id: u32,
}

/// Reflection data for one SPIR-V module, with the mutations the
/// combined-sampler synthesizer and the layout remapper need.
///
/// The resource lists and the combined-sampler pairing are snapshotted at
/// construction, so they always report the front end's original bindings and
/// names even after the module has been remapped.
pub struct ModuleReflection {
    module: Module,
    info: ModuleInfo,
    handles: Vec<Handle<GlobalVariable>>,
    resources: ReflectedResources,
    combined: Vec<CombinedImageSampler>,
    combined_to_image: HashMap<u32, Handle<GlobalVariable>>,
}

impl ModuleReflection {
    /// Parses and validates a SPIR-V word stream.
    pub fn from_spirv(words: &[u32]) -> Result<Self> {
        let module = naga::front::spv::parse_u8_slice(
            bytemuck::cast_slice(words),
            &naga::front::spv::Options::default(),
        )
        .map_err(|e| Error::Backend(format!("failed to parse SPIR-V: {e}")))?;
        Self::from_module(module)
    }

    /// Builds reflection over an already-parsed module. The module must have
    /// exactly one entry point.
    pub fn from_module(module: Module) -> Result<Self> {
        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| Error::Backend(format!("shader failed validation: {e}")))?;
        if module.entry_points.len() != 1 {
            return Err(Error::Backend(format!(
                "expected exactly one entry point, found {}",
                module.entry_points.len()
            )));
        }

        let handles: Vec<_> = module.global_variables.iter().map(|(h, _)| h).collect();
        let entry_info = info.get_entry_point(0);
        let mut resources = ReflectedResources::default();
        for (handle, var) in module.global_variables.iter() {
            if entry_info[handle].is_empty() {
                continue;
            }
            let Some(binding) = &var.binding else {
                continue;
            };
            let id = handle.index() as u32;
            let res = ResourceInfo {
                id,
                name: display_name(&module, handle),
                set: binding.group,
                slot: binding.binding,
            };
            let binding_ty = match module.types[var.ty].inner {
                TypeInner::BindingArray { base, .. } => &module.types[base].inner,
                ref ty => ty,
            };
            match binding_ty {
                TypeInner::Image { class, .. } => match class {
                    ImageClass::Storage { .. } => {
                        log::warn!("storage image \"{}\" has no descriptor mapping", res.name);
                    }
                    _ => resources.separate_images.push(res),
                },
                TypeInner::Sampler { .. } => resources.separate_samplers.push(res),
                _ => match var.space {
                    AddressSpace::Uniform => resources.uniform_buffers.push(res),
                    AddressSpace::Storage { .. } => resources.storage_buffers.push(res),
                    _ => {}
                },
            }
        }

        let pairs = find_sampling_pairs(&module);
        let first_combined_id = module.global_variables.len() as u32;
        let mut combined = Vec::with_capacity(pairs.len());
        let mut combined_to_image = HashMap::new();
        for (idx, (image, sampler)) in pairs.iter().enumerate() {
            let combined_id = first_combined_id + idx as u32;
            combined.push(CombinedImageSampler {
                image_id: image.index() as u32,
                sampler_id: sampler.index() as u32,
                combined_id,
            });
            combined_to_image.insert(combined_id, *image);
        }

        Ok(Self {
            module,
            info,
            handles,
            resources,
            combined,
            combined_to_image,
        })
    }

    pub fn resources(&self) -> &ReflectedResources {
        &self.resources
    }

    /// Every image/sampler combination actually sampled in the module. The
    /// pairing is a pure function of the module, so it is identical no matter
    /// which back end consumes it.
    pub fn combined_image_samplers(&self) -> &[CombinedImageSampler] {
        &self.combined
    }

    /// Original reflection record for a separate resource id, if any.
    pub fn resource_info(&self, id: u32) -> Option<&ResourceInfo> {
        self.resources
            .uniform_buffers
            .iter()
            .chain(&self.resources.storage_buffers)
            .chain(&self.resources.separate_samplers)
            .chain(&self.resources.separate_images)
            .find(|r| r.id == id)
    }

    /// Whether `id` names a separate image that participates in a combined
    /// image/sampler pair.
    pub fn is_combined_image(&self, id: u32) -> bool {
        self.combined.iter().any(|cis| cis.image_id == id)
    }

    /// Renames the resource `id` in the module. For a combined id, the rename
    /// lands on the backing image global, which is the variable the GLSL and
    /// MSL writers derive the fused binding's name from.
    pub fn set_name(&mut self, id: u32, name: &str) {
        let Some(handle) = self.resolve(id) else {
            log::warn!("set_name: unknown resource id {id}");
            return;
        };
        self.module.global_variables.get_mut(handle).name = Some(name.to_owned());
    }

    /// Rebinds the resource `id` to `(set, slot)` in the module.
    pub fn set_binding(&mut self, id: u32, set: u32, slot: u32) {
        let Some(handle) = self.resolve(id) else {
            log::warn!("set_binding: unknown resource id {id}");
            return;
        };
        self.module.global_variables.get_mut(handle).binding = Some(ResourceBinding {
            group: set,
            binding: slot,
        });
    }

    fn resolve(&self, id: u32) -> Option<Handle<GlobalVariable>> {
        if let Some(handle) = self.handles.get(id as usize) {
            Some(*handle)
        } else {
            self.combined_to_image.get(&id).copied()
        }
    }

    pub(crate) fn module(&self) -> &Module {
        &self.module
    }

    pub(crate) fn module_info(&self) -> &ModuleInfo {
        &self.info
    }

    pub(crate) fn entry_point_name(&self) -> &str {
        &self.module.entry_points[0].name
    }

    pub(crate) fn entry_point_stage(&self) -> naga::ShaderStage {
        self.module.entry_points[0].stage
    }
}

/// The name a resource is reported under: the variable's own name when the
/// front end emitted one, else the name of its type. Buffer blocks commonly
/// carry their name on the block type only.
pub(crate) fn display_name(module: &Module, handle: Handle<GlobalVariable>) -> String {
    let var = &module.global_variables[handle];
    if let Some(name) = &var.name {
        if !name.is_empty() {
            return name.clone();
        }
    }
    if let Some(name) = &module.types[var.ty].name {
        if !name.is_empty() {
            return name.clone();
        }
    }
    format!("_{}", handle.index())
}

/// Collects every (image, sampler) global pair used by a sampling expression,
/// deduplicated, in first-use order: functions in declaration order, then
/// entry points, expressions in arena order within each body.
fn find_sampling_pairs(module: &Module) -> Vec<(Handle<GlobalVariable>, Handle<GlobalVariable>)> {
    let mut pairs = Vec::new();
    let mut scan = |function: &Function| {
        for (_, expr) in function.expressions.iter() {
            if let Expression::ImageSample { image, sampler, .. } = expr {
                let (Some(image), Some(sampler)) = (
                    as_global(function, *image),
                    as_global(function, *sampler),
                ) else {
                    continue;
                };
                if !pairs.contains(&(image, sampler)) {
                    pairs.push((image, sampler));
                }
            }
        }
    };
    for (_, function) in module.functions.iter() {
        scan(function);
    }
    for entry_point in &module.entry_points {
        scan(&entry_point.function);
    }
    pairs
}

fn as_global(function: &Function, expr: Handle<Expression>) -> Option<Handle<GlobalVariable>> {
    match function.expressions[expr] {
        Expression::GlobalVariable(handle) => Some(handle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflect(wgsl: &str) -> ModuleReflection {
        let module = naga::front::wgsl::parse_str(wgsl).unwrap();
        ModuleReflection::from_module(module).unwrap()
    }

    const SAMPLED: &str = "\
@group(0) @binding(0) var<uniform> globals: vec4<f32>;
@group(0) @binding(1) var img: texture_2d<f32>;
@group(0) @binding(2) var smp: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return globals + textureSample(img, smp, uv);
}
";

    #[test]
    fn classifies_resources_in_declaration_order() {
        let refl = reflect(SAMPLED);
        let res = refl.resources();
        assert_eq!(res.uniform_buffers.len(), 1);
        assert_eq!(res.uniform_buffers[0].name, "globals");
        assert_eq!((res.uniform_buffers[0].set, res.uniform_buffers[0].slot), (0, 0));
        assert_eq!(res.separate_images[0].name, "img");
        assert_eq!(res.separate_images[0].slot, 1);
        assert_eq!(res.separate_samplers[0].name, "smp");
        assert_eq!(res.separate_samplers[0].slot, 2);
        assert!(res.storage_buffers.is_empty());
    }

    #[test]
    fn pairs_sampled_images_with_their_samplers() {
        let refl = reflect(SAMPLED);
        let cis = refl.combined_image_samplers();
        assert_eq!(cis.len(), 1);
        let image = refl.resource_info(cis[0].image_id).unwrap();
        let sampler = refl.resource_info(cis[0].sampler_id).unwrap();
        assert_eq!(image.name, "img");
        assert_eq!(sampler.name, "smp");
        assert!(cis[0].combined_id > cis[0].image_id);
        assert!(cis[0].combined_id > cis[0].sampler_id);
        assert!(refl.is_combined_image(cis[0].image_id));
        assert!(!refl.is_combined_image(cis[0].sampler_id));
    }

    #[test]
    fn one_image_many_samplers_yields_distinct_pairs() {
        let refl = reflect(
            "\
@group(0) @binding(0) var img: texture_2d<f32>;
@group(0) @binding(1) var near: sampler;
@group(0) @binding(2) var far: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(img, near, uv) + textureSample(img, far, uv);
}
",
        );
        let cis = refl.combined_image_samplers();
        assert_eq!(cis.len(), 2);
        assert_eq!(cis[0].image_id, cis[1].image_id);
        assert_ne!(cis[0].sampler_id, cis[1].sampler_id);
        assert_ne!(cis[0].combined_id, cis[1].combined_id);
    }

    #[test]
    fn unused_resources_are_not_reflected() {
        let refl = reflect(
            "\
@group(0) @binding(0) var<uniform> used: vec4<f32>;
@group(1) @binding(0) var<uniform> unused: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return used;
}
",
        );
        assert_eq!(refl.resources().uniform_buffers.len(), 1);
        assert_eq!(refl.resources().uniform_buffers[0].name, "used");
    }

    #[test]
    fn mutations_edit_the_module() {
        let mut refl = reflect(SAMPLED);
        let img_id = refl.resources().separate_images[0].id;
        refl.set_name(img_id, "img_smp");
        refl.set_binding(img_id, 9, 0);
        let (_, var) = refl
            .module()
            .global_variables
            .iter()
            .find(|(_, v)| v.name.as_deref() == Some("img_smp"))
            .expect("renamed global");
        let binding = var.binding.as_ref().unwrap();
        assert_eq!((binding.group, binding.binding), (9, 0));
    }

    #[test]
    fn combined_id_mutations_land_on_the_image_global() {
        let mut refl = reflect(SAMPLED);
        let cis = refl.combined_image_samplers()[0];
        refl.set_name(cis.combined_id, "img_smp");
        assert!(refl
            .module()
            .global_variables
            .iter()
            .any(|(_, v)| v.name.as_deref() == Some("img_smp")));
    }
}
