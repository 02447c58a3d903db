// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The optional generated header with symbolic binding constants.
//!
//! The emitter is language agnostic: it only knows how to print
//! `#define`-style constants, grouped by technique, using each descriptor's
//! recorded name, owning set, and assigned slot:
//!
//! ```text
//! #define MYAPP_blinn_phong_globals_SET 0
//! #define MYAPP_blinn_phong_globals_BINDING 0
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use crate::layout::{Descriptor, PipelineLayout};
use crate::{Error, Result};

pub struct HeaderWriter {
    path: PathBuf,
    prefix: String,
    buf: String,
}

impl HeaderWriter {
    /// `rel_path` is interpreted relative to the output directory.
    pub fn new(out_dir: &std::path::Path, rel_path: &str, namespace: Option<&str>) -> Self {
        let prefix = namespace.map(|ns| format!("{ns}_")).unwrap_or_default();
        let mut buf = String::new();
        buf.push_str("/* Generated by ngf_shaderc. Do not edit. */\n");
        buf.push_str("#pragma once\n");
        Self {
            path: out_dir.join(rel_path),
            prefix,
            buf,
        }
    }

    pub fn begin_technique(&mut self, name: &str) {
        let _ = writeln!(self.buf, "\n/* {name} */");
    }

    pub fn write_descriptor(&mut self, technique: &str, descriptor: &Descriptor, set: u32) {
        let symbol = format!("{}{}_{}", self.prefix, technique, descriptor.name);
        let _ = writeln!(self.buf, "#define {symbol}_SET {set}");
        let _ = writeln!(self.buf, "#define {symbol}_BINDING {}", descriptor.assigned_slot);
    }

    /// Emits one block for every descriptor of a technique's layout.
    pub fn write_technique(&mut self, technique: &str, layout: &PipelineLayout) {
        self.begin_technique(technique);
        for set in 0..layout.set_count() {
            let Some(set_layout) = layout.set(set) else {
                continue;
            };
            for descriptor in set_layout.iter() {
                self.write_descriptor(technique, descriptor, set);
            }
        }
    }

    /// Writes the accumulated header to disk.
    pub fn finish(self) -> Result<()> {
        fs::write(&self.path, self.buf.as_bytes()).map_err(|e| Error::io(self.path, e))
    }

    #[cfg(test)]
    fn contents(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DescriptorType;
    use crate::{STAGE_MASK_FRAGMENT, STAGE_MASK_VERTEX};
    use std::path::Path;

    fn sample_layout() -> PipelineLayout {
        let mut layout = PipelineLayout::new();
        layout
            .process_resource(0, 0, DescriptorType::UniformBuffer, STAGE_MASK_VERTEX, "globals", true)
            .unwrap();
        layout
            .process_resource(1, 3, DescriptorType::Texture, STAGE_MASK_FRAGMENT, "img", true)
            .unwrap();
        layout.add_combined_sampler(0, "img_smp", STAGE_MASK_FRAGMENT);
        layout
    }

    #[test]
    fn symbols_embed_namespace_technique_and_resource() {
        let mut writer = HeaderWriter::new(Path::new("out"), "bindings.h", Some("MYAPP"));
        writer.write_technique("blinn_phong", &sample_layout());
        let text = writer.contents();
        assert!(text.contains("#define MYAPP_blinn_phong_globals_SET 0"));
        assert!(text.contains("#define MYAPP_blinn_phong_globals_BINDING 0"));
        assert!(text.contains("#define MYAPP_blinn_phong_img_SET 1"));
        assert!(text.contains("#define MYAPP_blinn_phong_img_BINDING 0"));
        assert!(text.contains("#define MYAPP_blinn_phong_img_smp_SET 9"));
        assert!(text.contains("#define MYAPP_blinn_phong_img_smp_BINDING 0"));
    }

    #[test]
    fn namespace_is_optional() {
        let mut writer = HeaderWriter::new(Path::new("out"), "bindings.h", None);
        writer.write_technique("t", &sample_layout());
        assert!(writer.contents().contains("#define t_globals_SET 0"));
    }

    #[test]
    fn header_lands_under_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = HeaderWriter::new(dir.path(), "shaders/bindings.h", None);
        writer.write_technique("t", &sample_layout());
        fs::create_dir_all(dir.path().join("shaders")).unwrap();
        writer.finish().unwrap();
        let text = fs::read_to_string(dir.path().join("shaders/bindings.h")).unwrap();
        assert!(text.starts_with("/* Generated by ngf_shaderc."));
    }
}
