// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compilation driver: parse → front-end compile → for each target
//! { reflect, synthesize combined samplers, build layout, translate, emit }.

use std::fs;
use std::path::PathBuf;

use crate::backend::Backend;
use crate::combined::SeparateToCombinedMap;
use crate::frontend::Frontend;
use crate::header::HeaderWriter;
use crate::layout::{DescriptorType, PipelineLayout, AUTOGEN_CIS_SET};
use crate::target::{Api, NamedTarget};
use crate::technique::parse_techniques;
use crate::{metadata, Error, Result, Stage};

/// One invocation of the toolchain.
pub struct Job {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub targets: Vec<&'static NamedTarget>,
    /// Header file path relative to `out_dir`; `None` disables emission.
    pub header_path: Option<String>,
    /// Namespace prefix for generated header symbols.
    pub namespace: Option<String>,
}

/// Runs a job to completion. Any failure aborts the whole run; partial
/// outputs may be left behind in the output directory.
pub fn run(job: &Job) -> Result<()> {
    if job.targets.is_empty() {
        return Err(Error::Usage(
            "no target shader flavors specified; use -t to pick at least one".into(),
        ));
    }
    let mut source =
        fs::read_to_string(&job.input).map_err(|e| Error::io(job.input.clone(), e))?;
    // A directive on the last line would be lost without a terminator.
    if !source.ends_with('\n') {
        source.push('\n');
    }

    let techniques = parse_techniques(&source)?;
    if techniques.is_empty() {
        return Err(Error::InvalidTechnique {
            line: 1,
            msg: "input file does not define any techniques; declare them with //T: comments"
                .into(),
        });
    }

    let frontend = Frontend::new()?;
    let mut modules: Vec<Vec<Vec<u32>>> = Vec::with_capacity(techniques.len());
    for tech in &techniques {
        let mut per_technique = Vec::with_capacity(tech.entry_points.len());
        for ep in &tech.entry_points {
            log::info!("compiling {}:{} to SPIR-V", tech.name, ep.name);
            per_technique.push(frontend.compile(&source, &job.input, tech, ep)?);
        }
        modules.push(per_technique);
    }

    // Deterministic processing order no matter how targets were requested.
    let mut sorted_targets = job.targets.clone();
    sorted_targets.sort_by_key(|t| t.target.api);

    let mut header = job
        .header_path
        .as_ref()
        .map(|p| HeaderWriter::new(&job.out_dir, p, job.namespace.as_deref()));

    // The metadata file is written on the first target iteration only; the
    // bytes are kept so later iterations can verify they would have produced
    // the same artifact.
    let mut first_metadata: Vec<Option<Vec<u8>>> = vec![None; techniques.len()];
    let mut emit_metadata = true;
    for named in &sorted_targets {
        let target = &named.target;
        let do_remapping = target.api != Api::Vulkan;
        for (ti, tech) in techniques.iter().enumerate() {
            let mut layout = PipelineLayout::new();
            let mut image_map = SeparateToCombinedMap::new();
            let mut sampler_map = SeparateToCombinedMap::new();
            let mut cis_index = 0u32;
            let mut backends = Vec::with_capacity(tech.entry_points.len());
            for (ei, ep) in tech.entry_points.iter().enumerate() {
                let mut backend = Backend::new(&modules[ti][ei], target)?;
                synthesize_combined_samplers(
                    &mut backend,
                    ep.stage,
                    &mut layout,
                    &mut image_map,
                    &mut sampler_map,
                    &mut cis_index,
                );
                if do_remapping || emit_metadata {
                    feed_resources(&mut backend, ep.stage, &mut layout)?;
                }
                backends.push(backend);
            }
            for (ep, backend) in tech.entry_points.iter().zip(&backends) {
                let bytes = backend.compile()?;
                let file_name = format!(
                    "{}.{}.{}",
                    tech.name,
                    ep.stage.file_tag(),
                    target.file_ext
                );
                let path = job.out_dir.join(file_name);
                fs::write(&path, &bytes).map_err(|e| Error::io(path.clone(), e))?;
            }
            if emit_metadata {
                let bytes =
                    metadata::serialize(&layout, &image_map, &sampler_map, &tech.metadata);
                let path = job.out_dir.join(format!("{}.pipeline", tech.name));
                fs::write(&path, &bytes).map_err(|e| Error::io(path.clone(), e))?;
                if let Some(header) = header.as_mut() {
                    header.write_technique(&tech.name, &layout);
                }
                first_metadata[ti] = Some(bytes);
            } else if do_remapping {
                debug_assert_eq!(
                    first_metadata[ti].as_deref(),
                    Some(
                        metadata::serialize(&layout, &image_map, &sampler_map, &tech.metadata)
                            .as_slice()
                    ),
                    "pipeline metadata diverged across targets for technique {}",
                    tech.name
                );
            }
        }
        emit_metadata = false;
    }
    if let Some(header) = header {
        header.finish()?;
    }
    Ok(())
}

/// Synthesizes combined image/samplers for one entry point: names and binds
/// every fused resource, records provenance in both maps, and claims the next
/// autogen-set slots. `cis_index` runs across all entry points of a
/// technique.
fn synthesize_combined_samplers(
    backend: &mut Backend<'_>,
    stage: Stage,
    layout: &mut PipelineLayout,
    image_map: &mut SeparateToCombinedMap,
    sampler_map: &mut SeparateToCombinedMap,
    cis_index: &mut u32,
) {
    let combined = backend.reflection().combined_image_samplers().to_vec();
    for cis in combined {
        let refl = backend.reflection();
        let (Some(image), Some(sampler)) = (
            refl.resource_info(cis.image_id).cloned(),
            refl.resource_info(cis.sampler_id).cloned(),
        ) else {
            // Sampled only from code the entry point never reaches.
            continue;
        };
        let combined_name = format!("{}_{}", image.name, sampler.name);
        backend.set_name(cis.combined_id, &combined_name);
        backend.set_binding(cis.combined_id, AUTOGEN_CIS_SET, *cis_index);
        image_map.add_resource(cis.image_id, &image.name, image.set, image.slot, cis.combined_id);
        sampler_map.add_resource(
            cis.sampler_id,
            &sampler.name,
            sampler.set,
            sampler.slot,
            cis.combined_id,
        );
        layout.add_combined_sampler(*cis_index, &combined_name, stage.mask_bit());
        *cis_index += 1;
    }
}

/// Feeds one entry point's reflected resources into the layout, in the fixed
/// kind order that keeps slot assignment deterministic, and rebinds each
/// resource in the translated shader when the target remaps.
fn feed_resources(
    backend: &mut Backend<'_>,
    stage: Stage,
    layout: &mut PipelineLayout,
) -> Result<()> {
    let stage_bit = stage.mask_bit();
    let do_remapping = backend.do_remapping();
    let resources = backend.reflection().resources().clone();
    for (list, ty) in [
        (&resources.uniform_buffers, DescriptorType::UniformBuffer),
        (&resources.storage_buffers, DescriptorType::StorageBuffer),
        (&resources.separate_samplers, DescriptorType::Sampler),
        (&resources.separate_images, DescriptorType::Texture),
    ] {
        for res in list {
            // The layout always records canonical densely assigned slots, so
            // the serialized metadata is the same no matter which target's
            // iteration produced it. Targets that don't remap just never
            // apply the assignment to their output.
            let assigned =
                layout.process_resource(res.set, res.slot, ty, stage_bit, &res.name, true)?;
            // Images fused into a combined binding already carry their
            // autogen-set binding; rebinding them here would undo it.
            let fused = ty == DescriptorType::Texture
                && backend.reflection().is_combined_image(res.id);
            if do_remapping && !fused {
                backend.set_binding(res.id, res.set, assigned);
            }
        }
    }
    Ok(())
}
