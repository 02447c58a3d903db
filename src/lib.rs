// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Offline HLSL shader toolchain.
//!
//! Takes a single HLSL source file containing one or more annotated
//! "techniques", compiles each technique's entry points to SPIR-V, cross
//! compiles the SPIR-V to a configured set of target shading languages
//! (desktop/mobile GLSL, Metal Shading Language, or raw SPIR-V), and emits a
//! compact binary pipeline metadata file describing the pipeline's descriptor
//! layout, plus an optional generated header with symbolic binding constants.
//!
//! The interesting part lives in the reflection-and-remapping core: resources
//! reflected from every shader stage are reconciled into a single
//! deterministic descriptor-set layout, combined image/sampler bindings are
//! synthesized for APIs that lack separate-sampler semantics, and the
//! provenance of every synthesized binding is recorded so that runtime code
//! can map separate resources back to the combined ones.

pub mod backend;
pub mod combined;
pub mod compile;
pub mod frontend;
pub mod header;
pub mod include;
pub mod layout;
pub mod metadata;
pub mod target;
pub mod technique;

use std::path::PathBuf;

use thiserror::Error;

pub use compile::Job;
pub use layout::{Descriptor, DescriptorType, PipelineLayout, AUTOGEN_CIS_SET};
pub use metadata::PipelineMetadata;
pub use target::{Api, Target};
pub use technique::Technique;

pub type Result<T> = std::result::Result<T, Error>;

/// A shader stage a technique entry point can run in.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Stage {
    Vertex,
    Fragment,
}

/// Bit for the vertex stage in a [`Stage`] mask.
pub const STAGE_MASK_VERTEX: u32 = 0x1;
/// Bit for the fragment stage in a [`Stage`] mask.
pub const STAGE_MASK_FRAGMENT: u32 = 0x2;

impl Stage {
    /// The bit this stage contributes to a descriptor's stage mask.
    pub fn mask_bit(self) -> u32 {
        match self {
            Self::Vertex => STAGE_MASK_VERTEX,
            Self::Fragment => STAGE_MASK_FRAGMENT,
        }
    }

    /// The tag used in output file names (`<technique>.<tag>.<ext>`).
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::Vertex => "vs",
            Self::Fragment => "ps",
        }
    }
}

/// Errors produced by the toolchain. All of them are fatal to the run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid technique (line {line}): {msg}")]
    InvalidTechnique { line: usize, msg: String },

    #[error("could not resolve include \"{requested}\" (included from {from})")]
    IncludeNotFound { requested: String, from: String },

    #[error("{0}")]
    Frontend(String),

    #[error("{0}")]
    Backend(String),

    #[error(
        "descriptor type conflict at set {set} binding {slot}: \
         {existing:?} vs {incoming:?}"
    )]
    LayoutConflict {
        set: u32,
        slot: u32,
        existing: layout::DescriptorType,
        incoming: layout::DescriptorType,
    },

    #[error("unknown target \"{0}\"")]
    UnknownTarget(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
