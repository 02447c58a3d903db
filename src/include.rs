// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resolution of `#include` directives during front-end compilation.

use std::fs;
use std::path::{Path, PathBuf};

use shaderc::{IncludeType, ResolvedInclude};

use crate::{Error, Result};

/// Resolves shader includes on behalf of the front-end compiler.
///
/// Quoted includes are looked up relative to the including file's directory;
/// angle includes are looked up against the configured search paths. The
/// search-path list is empty by default.
#[derive(Clone, Debug, Default)]
pub struct Includer {
    search_paths: Vec<PathBuf>,
}

impl Includer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a single include request.
    ///
    /// `requesting` is the path of the file the directive appears in, exactly
    /// as previously reported by this resolver (or the top-level input path).
    pub fn resolve(
        &self,
        requested: &str,
        ty: IncludeType,
        requesting: &str,
    ) -> Result<ResolvedInclude> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        match ty {
            IncludeType::Relative => {
                let base = Path::new(requesting).parent().unwrap_or(Path::new(""));
                candidates.push(base.join(requested));
            }
            IncludeType::Standard => {
                for dir in &self.search_paths {
                    candidates.push(dir.join(requested));
                }
            }
        }
        for candidate in candidates {
            if let Ok(content) = fs::read_to_string(&candidate) {
                return Ok(ResolvedInclude {
                    resolved_name: candidate.to_string_lossy().into_owned(),
                    content,
                });
            }
        }
        Err(Error::IncludeNotFound {
            requested: requested.to_owned(),
            from: requesting.to_owned(),
        })
    }
}
