// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Extraction of technique blocks from `//T:` comment directives.
//!
//! A technique is introduced by a `name:` directive; every directive after it
//! and before the next `name:` belongs to it:
//!
//! ```text
//! //T: name:blinn_phong
//! //T: entry_point:vs:VSMain
//! //T: entry_point:ps:PSMain
//! //T: define:NUM_LIGHTS=4
//! //T: meta:pass=forward
//! ```

use smallvec::SmallVec;

use crate::{Error, Result, Stage};

const SENTINEL: &str = "//T:";

/// A shader entry point declared by a technique.
#[derive(Clone, Debug)]
pub struct EntryPoint {
    pub name: String,
    pub stage: Stage,
}

/// A named group of entry points plus macro defines and user metadata.
#[derive(Clone, Debug, Default)]
pub struct Technique {
    pub name: String,
    /// Preprocessor defines, in declaration order. A `None` value stands for
    /// a definition without a value.
    pub defines: Vec<(String, Option<String>)>,
    pub entry_points: SmallVec<[EntryPoint; 2]>,
    /// User-supplied key/value metadata, in declaration order.
    pub metadata: Vec<(String, String)>,
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn err(line: usize, msg: impl Into<String>) -> Error {
    Error::InvalidTechnique {
        line,
        msg: msg.into(),
    }
}

/// Scans the source for technique directives.
///
/// Lines that don't begin with the sentinel are passed over; the source is
/// otherwise treated as opaque. Returns the techniques in declaration order.
pub fn parse_techniques(source: &str) -> Result<Vec<Technique>> {
    let mut techniques: Vec<Technique> = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let Some(directive) = line.trim_start().strip_prefix(SENTINEL) else {
            continue;
        };
        let directive = directive.trim();
        let Some((key, value)) = directive.split_once(':') else {
            return Err(err(line_no, format!("malformed directive \"{directive}\"")));
        };
        let (key, value) = (key.trim(), value.trim());
        if key == "name" {
            if !is_ident(value) {
                return Err(err(line_no, format!("\"{value}\" is not a valid name")));
            }
            if techniques.iter().any(|t| t.name == value) {
                return Err(err(line_no, format!("duplicate technique \"{value}\"")));
            }
            techniques.push(Technique {
                name: value.to_owned(),
                ..Technique::default()
            });
            continue;
        }
        let Some(tech) = techniques.last_mut() else {
            return Err(err(line_no, format!("\"{key}\" directive precedes name")));
        };
        match key {
            "entry_point" => {
                let Some((stage, name)) = value.split_once(':') else {
                    return Err(err(line_no, "expected entry_point:<vs|ps>:<identifier>"));
                };
                let (stage, name) = (stage.trim(), name.trim());
                let stage = match stage {
                    "vs" => Stage::Vertex,
                    "ps" => Stage::Fragment,
                    other => {
                        return Err(err(line_no, format!("unknown stage \"{other}\"")));
                    }
                };
                if !is_ident(name) {
                    return Err(err(line_no, format!("\"{name}\" is not a valid name")));
                }
                if tech.entry_points.iter().any(|ep| ep.name == name) {
                    return Err(err(line_no, format!("duplicate entry point \"{name}\"")));
                }
                tech.entry_points.push(EntryPoint {
                    name: name.to_owned(),
                    stage,
                });
            }
            "define" => {
                let (macro_name, macro_value) = match value.split_once('=') {
                    Some((n, v)) => (n.trim(), Some(v.trim().to_owned())),
                    None => (value, None),
                };
                if !is_ident(macro_name) {
                    return Err(err(
                        line_no,
                        format!("\"{macro_name}\" is not a valid macro name"),
                    ));
                }
                if tech.defines.iter().any(|(n, _)| n == macro_name) {
                    return Err(err(line_no, format!("duplicate define \"{macro_name}\"")));
                }
                tech.defines.push((macro_name.to_owned(), macro_value));
            }
            "meta" => {
                let Some((meta_key, meta_value)) = value.split_once('=') else {
                    return Err(err(line_no, "expected meta:<key>=<value>"));
                };
                let meta_key = meta_key.trim();
                if meta_key.is_empty() {
                    return Err(err(line_no, "metadata key may not be empty"));
                }
                // Keys and values are serialized as zero-terminated strings.
                if meta_key.contains('\0') || meta_value.contains('\0') {
                    return Err(err(line_no, "metadata may not contain NUL bytes"));
                }
                tech.metadata
                    .push((meta_key.to_owned(), meta_value.trim().to_owned()));
            }
            other => {
                return Err(err(line_no, format!("unknown directive \"{other}\"")));
            }
        }
    }
    for tech in &techniques {
        if tech.entry_points.is_empty() {
            log::warn!("technique \"{}\" declares no entry points", tech.name);
        }
    }
    Ok(techniques)
}
