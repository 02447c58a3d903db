// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Merging of per-stage resources into a deterministic pipeline layout.

use std::collections::BTreeMap;

use crate::{Error, Result};

/// The descriptor set that auto-generated combined image/samplers land in.
/// One past the largest register space the toolchain accepts, so it can never
/// collide with a set produced by the front end.
pub const AUTOGEN_CIS_SET: u32 = 9;

/// The kind of resource a descriptor binds. The discriminants are persisted
/// in the pipeline metadata file and must not be reordered.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum DescriptorType {
    UniformBuffer = 0,
    StorageBuffer = 1,
    Sampler = 2,
    Texture = 3,
    CombinedImageSampler = 4,
}

impl DescriptorType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::UniformBuffer,
            1 => Self::StorageBuffer,
            2 => Self::Sampler,
            3 => Self::Texture,
            4 => Self::CombinedImageSampler,
            _ => return None,
        })
    }
}

/// A single binding slot in the pipeline.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Descriptor {
    pub original_set: u32,
    pub original_slot: u32,
    /// The slot the resource occupies in translated shaders. Equal to
    /// `original_slot` when the target does not remap.
    pub assigned_slot: u32,
    pub ty: DescriptorType,
    pub stage_mask: u32,
    pub name: String,
}

/// Descriptors of one set, keyed and iterated by original slot.
#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayout {
    descriptors: BTreeMap<u32, Descriptor>,
    next_slot: u32,
}

impl DescriptorSetLayout {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in original-slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.values()
    }
}

/// The merged descriptor-set layouts of one technique.
///
/// Feeding order is what makes the result deterministic: entry points in
/// source order, resource kinds in a fixed sequence within an entry point,
/// resources in reflection order within a kind. Given that order and a fixed
/// set of SPIR-V modules, the layout is identical for every target.
#[derive(Clone, Debug, Default)]
pub struct PipelineLayout {
    sets: BTreeMap<u32, DescriptorSetLayout>,
}

impl PipelineLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one reflected resource.
    ///
    /// A resource already present at `(set, slot)` must agree on `ty`; its
    /// stage mask is OR-ed with `stage_mask_bit`. New resources receive the
    /// set's next free slot when `do_remapping` is set, their original slot
    /// otherwise. Returns the assigned slot so the caller can rebind the
    /// resource in the translated shader.
    pub fn process_resource(
        &mut self,
        set: u32,
        slot: u32,
        ty: DescriptorType,
        stage_mask_bit: u32,
        name: &str,
        do_remapping: bool,
    ) -> Result<u32> {
        let set_layout = self.sets.entry(set).or_default();
        if let Some(existing) = set_layout.descriptors.get_mut(&slot) {
            if existing.ty != ty {
                return Err(Error::LayoutConflict {
                    set,
                    slot,
                    existing: existing.ty,
                    incoming: ty,
                });
            }
            existing.stage_mask |= stage_mask_bit;
            return Ok(existing.assigned_slot);
        }
        let assigned_slot = if do_remapping {
            let assigned = set_layout.next_slot;
            set_layout.next_slot += 1;
            assigned
        } else {
            slot
        };
        set_layout.descriptors.insert(
            slot,
            Descriptor {
                original_set: set,
                original_slot: slot,
                assigned_slot,
                ty,
                stage_mask: stage_mask_bit,
                name: name.to_owned(),
            },
        );
        Ok(assigned_slot)
    }

    /// Records a synthesized combined image/sampler at the given running
    /// index of [`AUTOGEN_CIS_SET`]. Assigned and original slots coincide, so
    /// the entry is target-independent by construction.
    pub fn add_combined_sampler(&mut self, index: u32, name: &str, stage_mask_bit: u32) {
        let set_layout = self.sets.entry(AUTOGEN_CIS_SET).or_default();
        debug_assert!(
            !set_layout.descriptors.contains_key(&index),
            "combined sampler index {index} assigned twice"
        );
        set_layout.descriptors.insert(
            index,
            Descriptor {
                original_set: AUTOGEN_CIS_SET,
                original_slot: index,
                assigned_slot: index,
                ty: DescriptorType::CombinedImageSampler,
                stage_mask: stage_mask_bit,
                name: name.to_owned(),
            },
        );
        set_layout.next_slot = set_layout.next_slot.max(index + 1);
    }

    /// Number of sets the serialized layout spans: highest occupied index
    /// plus one. Unoccupied sets below it serialize as empty.
    pub fn set_count(&self) -> u32 {
        self.sets
            .last_key_value()
            .map(|(set, _)| set + 1)
            .unwrap_or(0)
    }

    /// The layout of `set`, or `None` if nothing landed in it.
    pub fn set(&self, set: u32) -> Option<&DescriptorSetLayout> {
        self.sets.get(&set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{STAGE_MASK_FRAGMENT, STAGE_MASK_VERTEX};

    #[test]
    fn shared_resource_merges_stage_masks() {
        let mut layout = PipelineLayout::new();
        layout
            .process_resource(0, 0, DescriptorType::UniformBuffer, STAGE_MASK_VERTEX, "globals", false)
            .unwrap();
        layout
            .process_resource(0, 0, DescriptorType::UniformBuffer, STAGE_MASK_FRAGMENT, "globals", false)
            .unwrap();
        let set = layout.set(0).unwrap();
        assert_eq!(set.len(), 1);
        let d = set.iter().next().unwrap();
        assert_eq!(d.stage_mask, STAGE_MASK_VERTEX | STAGE_MASK_FRAGMENT);
    }

    #[test]
    fn type_conflict_fails() {
        let mut layout = PipelineLayout::new();
        layout
            .process_resource(0, 0, DescriptorType::UniformBuffer, STAGE_MASK_VERTEX, "a", false)
            .unwrap();
        let e = layout
            .process_resource(0, 0, DescriptorType::StorageBuffer, STAGE_MASK_FRAGMENT, "b", false)
            .unwrap_err();
        assert!(matches!(
            e,
            Error::LayoutConflict {
                set: 0,
                slot: 0,
                existing: DescriptorType::UniformBuffer,
                incoming: DescriptorType::StorageBuffer,
            }
        ));
    }

    #[test]
    fn remapped_slots_are_dense_per_set() {
        let mut layout = PipelineLayout::new();
        // Sparse original slots across two sets.
        for (set, slot, name) in [(0, 4, "a"), (0, 9, "b"), (1, 7, "c"), (0, 2, "d")] {
            layout
                .process_resource(set, slot, DescriptorType::Texture, STAGE_MASK_FRAGMENT, name, true)
                .unwrap();
        }
        let mut set0: Vec<u32> = layout.set(0).unwrap().iter().map(|d| d.assigned_slot).collect();
        set0.sort_unstable();
        assert_eq!(set0, vec![0, 1, 2]);
        assert_eq!(layout.set(1).unwrap().iter().next().unwrap().assigned_slot, 0);
    }

    #[test]
    fn without_remapping_original_slots_are_kept() {
        let mut layout = PipelineLayout::new();
        let assigned = layout
            .process_resource(2, 5, DescriptorType::Sampler, STAGE_MASK_VERTEX, "s", false)
            .unwrap();
        assert_eq!(assigned, 5);
    }

    #[test]
    fn merge_returns_first_assignment() {
        let mut layout = PipelineLayout::new();
        let first = layout
            .process_resource(0, 8, DescriptorType::UniformBuffer, STAGE_MASK_VERTEX, "u", true)
            .unwrap();
        let second = layout
            .process_resource(0, 8, DescriptorType::UniformBuffer, STAGE_MASK_FRAGMENT, "u", true)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn combined_samplers_occupy_the_autogen_set() {
        let mut layout = PipelineLayout::new();
        layout.add_combined_sampler(0, "img_smp", STAGE_MASK_FRAGMENT);
        layout.add_combined_sampler(1, "img_other", STAGE_MASK_FRAGMENT);
        assert_eq!(layout.set_count(), AUTOGEN_CIS_SET + 1);
        let set = layout.set(AUTOGEN_CIS_SET).unwrap();
        let slots: Vec<u32> = set.iter().map(|d| d.assigned_slot).collect();
        assert_eq!(slots, vec![0, 1]);
        assert!(set.iter().all(|d| d.ty == DescriptorType::CombinedImageSampler));
    }

    #[test]
    fn set_count_of_empty_layout_is_zero() {
        assert_eq!(PipelineLayout::new().set_count(), 0);
    }
}
