// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The HLSL→SPIR-V front end, a thin wrapper over `shaderc` that applies the
//! project-wide option set.

use std::path::Path;

use shaderc::{CompileOptions, Compiler, ShaderKind, SourceLanguage};

use crate::include::Includer;
use crate::technique::{EntryPoint, Technique};
use crate::{Error, Result, Stage};

// HLSL matrices are translated assuming row-major storage; shaders can test
// this macro instead of hardcoding the convention.
const FORCE_COLUMN_MAJOR: (&str, &str) = ("force_column_major", "row_major");

/// Drives HLSL→SPIR-V compilation for every technique entry point.
///
/// The returned word buffers are owned by the caller and outlive the compiler
/// instance: one module is compiled per entry point and then reused across
/// every configured target.
pub struct Frontend {
    compiler: Compiler,
    includer: Includer,
}

impl Stage {
    fn shader_kind(self) -> ShaderKind {
        match self {
            Self::Vertex => ShaderKind::Vertex,
            Self::Fragment => ShaderKind::Fragment,
        }
    }
}

impl Frontend {
    pub fn new() -> Result<Self> {
        let compiler = Compiler::new()
            .ok_or_else(|| Error::Frontend("failed to initialize the shader compiler".into()))?;
        Ok(Self {
            compiler,
            includer: Includer::new(),
        })
    }

    /// Compiles one entry point of a technique to a SPIR-V word stream.
    pub fn compile(
        &self,
        source: &str,
        input_path: &Path,
        technique: &Technique,
        entry_point: &EntryPoint,
    ) -> Result<Vec<u32>> {
        let mut options = CompileOptions::new()
            .ok_or_else(|| Error::Frontend("failed to initialize compile options".into()))?;
        options.set_source_language(SourceLanguage::HLSL);
        options.set_auto_bind_uniforms(true);
        options.set_auto_map_locations(true);
        options.set_warnings_as_errors();
        for (name, value) in &technique.defines {
            options.add_macro_definition(name, value.as_deref());
        }
        options.add_macro_definition(FORCE_COLUMN_MAJOR.0, Some(FORCE_COLUMN_MAJOR.1));
        let includer = self.includer.clone();
        options.set_include_callback(move |requested, ty, requesting, _depth| {
            includer
                .resolve(requested, ty, requesting)
                .map_err(|e| e.to_string())
        });

        let artifact = self
            .compiler
            .compile_into_spirv(
                source,
                entry_point.stage.shader_kind(),
                &input_path.to_string_lossy(),
                &entry_point.name,
                Some(&options),
            )
            .map_err(|e| Error::Frontend(e.to_string()))?;
        Ok(artifact.as_binary().to_vec())
    }
}
