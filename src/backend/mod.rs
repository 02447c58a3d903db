// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A multiplexer over the per-API back-end compilers.
//!
//! Every back end shares the same naga-based reflection core; they differ in
//! whether binding remapping applies and in how `compile` renders the module.
//! The Vulkan back end never mutates reflection state and emits the front
//! end's SPIR-V words verbatim.

mod glsl;
mod msl;
pub mod reflect;

pub use reflect::{CombinedImageSampler, ModuleReflection, ReflectedResources, ResourceInfo};

use crate::target::{Api, PlatformClass, Target};
use crate::Result;

/// A back-end compiler for one (SPIR-V module, target) pair.
pub enum Backend<'a> {
    Gl {
        refl: ModuleReflection,
        version: (u32, u32),
        es: bool,
    },
    Vulkan {
        refl: ModuleReflection,
        words: &'a [u32],
    },
    Metal {
        refl: ModuleReflection,
        lang_version: (u8, u8),
    },
}

impl<'a> Backend<'a> {
    /// Parses `words` and instantiates the back end selected by `target`.
    ///
    /// The word buffer is only borrowed: it is owned by the orchestrator and
    /// shared by every target's back-end instance.
    pub fn new(words: &'a [u32], target: &Target) -> Result<Self> {
        let refl = ModuleReflection::from_spirv(words)?;
        Ok(match target.api {
            Api::Gl => Self::Gl {
                refl,
                version: (target.version_major, target.version_minor),
                es: target.platform == PlatformClass::Mobile,
            },
            Api::Vulkan => Self::Vulkan { refl, words },
            Api::Metal => Self::Metal {
                refl,
                lang_version: (target.version_major as u8, target.version_minor as u8),
            },
        })
    }

    pub fn reflection(&self) -> &ModuleReflection {
        match self {
            Self::Gl { refl, .. } | Self::Vulkan { refl, .. } | Self::Metal { refl, .. } => refl,
        }
    }

    /// Whether descriptor bindings are remapped to densely assigned slots for
    /// this back end.
    pub fn do_remapping(&self) -> bool {
        !matches!(self, Self::Vulkan { .. })
    }

    /// Renames a resource in the translated output. No-op on Vulkan, which
    /// reproduces the input SPIR-V bit for bit.
    pub fn set_name(&mut self, id: u32, name: &str) {
        match self {
            Self::Gl { refl, .. } | Self::Metal { refl, .. } => refl.set_name(id, name),
            Self::Vulkan { .. } => {}
        }
    }

    /// Rebinds a resource in the translated output. No-op on Vulkan.
    pub fn set_binding(&mut self, id: u32, set: u32, slot: u32) {
        match self {
            Self::Gl { refl, .. } | Self::Metal { refl, .. } => refl.set_binding(id, set, slot),
            Self::Vulkan { .. } => {}
        }
    }

    /// Renders the module for this back end's target language.
    pub fn compile(&self) -> Result<Vec<u8>> {
        match self {
            Self::Gl { refl, version, es } => {
                Ok(glsl::translate(refl, version.0, version.1, *es)?.into_bytes())
            }
            Self::Vulkan { words, .. } => Ok(bytemuck::cast_slice(words).to_vec()),
            Self::Metal { refl, lang_version } => {
                Ok(msl::translate(refl, *lang_version)?.into_bytes())
            }
        }
    }
}
