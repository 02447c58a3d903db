// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The versioned binary pipeline metadata file.
//!
//! Layout: a 32-byte header of eight little-endian `u32`s (magic, header
//! size, version major/minor, then the byte offsets of the four records),
//! followed by the pipeline-layout record, the two separate-to-combined map
//! records, and the user-metadata record. Records start on 4-byte boundaries.

use thiserror::Error;

use crate::combined::SeparateToCombinedMap;
use crate::layout::{DescriptorType, PipelineLayout};

pub const MAGIC: u32 = 0x4D46_474E;
pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 0;

const HEADER_SIZE: u32 = 32;
const NUM_RECORDS: usize = 4;

/// An append-only writer with a running cursor and a table of record offsets
/// that is patched into the header when the file is finalized.
pub struct MetadataWriter {
    buf: Vec<u8>,
    record_offsets: Vec<u32>,
}

impl MetadataWriter {
    pub fn new() -> Self {
        Self {
            buf: vec![0; HEADER_SIZE as usize],
            record_offsets: Vec::with_capacity(NUM_RECORDS),
        }
    }

    /// Aligns the cursor to 4 bytes and marks the start of the next record.
    pub fn start_new_record(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
        self.record_offsets.push(self.buf.len() as u32);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a zero-terminated string. The parser guarantees metadata is
    /// NUL-free by the time it gets here.
    pub fn write_cstr(&mut self, s: &str) {
        debug_assert!(!s.contains('\0'), "embedded NUL in metadata string");
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Patches the header and returns the finished artifact.
    pub fn finalize(mut self) -> Vec<u8> {
        assert_eq!(
            self.record_offsets.len(),
            NUM_RECORDS,
            "metadata file requires exactly {NUM_RECORDS} records"
        );
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        for field in [MAGIC, HEADER_SIZE, VERSION_MAJOR, VERSION_MINOR] {
            header.extend_from_slice(&field.to_le_bytes());
        }
        for offset in &self.record_offsets {
            header.extend_from_slice(&offset.to_le_bytes());
        }
        self.buf[..HEADER_SIZE as usize].copy_from_slice(&header);
        self.buf
    }
}

impl Default for MetadataWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes one technique's pipeline description.
pub fn serialize(
    layout: &PipelineLayout,
    image_to_combined: &SeparateToCombinedMap,
    sampler_to_combined: &SeparateToCombinedMap,
    user_metadata: &[(String, String)],
) -> Vec<u8> {
    let mut writer = MetadataWriter::new();

    writer.start_new_record();
    writer.write_u32(layout.set_count());
    for set in 0..layout.set_count() {
        match layout.set(set) {
            Some(set_layout) => {
                writer.write_u32(set_layout.len() as u32);
                for d in set_layout.iter() {
                    writer.write_u32(d.assigned_slot);
                    writer.write_u32(d.ty as u32);
                    writer.write_u32(d.stage_mask);
                }
            }
            None => writer.write_u32(0),
        }
    }

    writer.start_new_record();
    image_to_combined.serialize(&mut writer);
    writer.start_new_record();
    sampler_to_combined.serialize(&mut writer);

    writer.start_new_record();
    writer.write_u32(user_metadata.len() as u32);
    for (key, value) in user_metadata {
        writer.write_cstr(key);
        writer.write_cstr(value);
    }

    writer.finalize()
}

/// Errors produced when reading a pipeline metadata file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unexpected end of file at offset {0}")]
    UnexpectedEof(usize),
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported header size {0}")]
    BadHeaderSize(u32),
    #[error("unknown descriptor type {0}")]
    BadDescriptorType(u32),
    #[error("string at offset {0} is not terminated")]
    UnterminatedString(usize),
    #[error("string at offset {0} is not valid UTF-8")]
    BadString(usize),
}

/// One descriptor as recorded on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaDescriptor {
    pub slot: u32,
    pub ty: DescriptorType,
    pub stage_mask: u32,
}

/// One separate-to-combined map entry as recorded on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaMapEntry {
    pub separate_id: u32,
    pub combined_ids: Vec<u32>,
}

/// A fully parsed pipeline metadata file.
#[derive(Clone, Debug, Default)]
pub struct PipelineMetadata {
    pub version: (u32, u32),
    /// Descriptor sets, dense from set 0; unoccupied sets are empty.
    pub sets: Vec<Vec<MetaDescriptor>>,
    pub image_to_combined: Vec<MetaMapEntry>,
    pub sampler_to_combined: Vec<MetaMapEntry>,
    pub user_metadata: Vec<(String, String)>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn seek(&mut self, offset: u32) {
        self.cursor = offset as usize;
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let end = self.cursor + 4;
        let bytes = self
            .bytes
            .get(self.cursor..end)
            .ok_or(ParseError::UnexpectedEof(self.cursor))?;
        self.cursor = end;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_cstr(&mut self) -> Result<String, ParseError> {
        let start = self.cursor;
        let rest = self
            .bytes
            .get(start..)
            .ok_or(ParseError::UnexpectedEof(start))?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ParseError::UnterminatedString(start))?;
        self.cursor = start + len + 1;
        String::from_utf8(rest[..len].to_vec()).map_err(|_| ParseError::BadString(start))
    }

    fn read_map(&mut self) -> Result<Vec<MetaMapEntry>, ParseError> {
        let num_entries = self.read_u32()?;
        let mut entries = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            let separate_id = self.read_u32()?;
            let num_combined = self.read_u32()?;
            let mut combined_ids = Vec::with_capacity(num_combined as usize);
            for _ in 0..num_combined {
                combined_ids.push(self.read_u32()?);
            }
            entries.push(MetaMapEntry {
                separate_id,
                combined_ids,
            });
        }
        Ok(entries)
    }
}

impl PipelineMetadata {
    /// Parses a `.pipeline` file.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut r = Reader { bytes, cursor: 0 };
        let magic = r.read_u32()?;
        if magic != MAGIC {
            return Err(ParseError::BadMagic(magic));
        }
        let header_size = r.read_u32()?;
        if header_size != HEADER_SIZE {
            return Err(ParseError::BadHeaderSize(header_size));
        }
        let version = (r.read_u32()?, r.read_u32()?);
        let layout_offset = r.read_u32()?;
        let image_map_offset = r.read_u32()?;
        let sampler_map_offset = r.read_u32()?;
        let user_metadata_offset = r.read_u32()?;

        r.seek(layout_offset);
        let num_sets = r.read_u32()?;
        let mut sets = Vec::with_capacity(num_sets as usize);
        for _ in 0..num_sets {
            let num_descriptors = r.read_u32()?;
            let mut descriptors = Vec::with_capacity(num_descriptors as usize);
            for _ in 0..num_descriptors {
                let slot = r.read_u32()?;
                let raw_ty = r.read_u32()?;
                let ty =
                    DescriptorType::from_u32(raw_ty).ok_or(ParseError::BadDescriptorType(raw_ty))?;
                let stage_mask = r.read_u32()?;
                descriptors.push(MetaDescriptor {
                    slot,
                    ty,
                    stage_mask,
                });
            }
            sets.push(descriptors);
        }

        r.seek(image_map_offset);
        let image_to_combined = r.read_map()?;
        r.seek(sampler_map_offset);
        let sampler_to_combined = r.read_map()?;

        r.seek(user_metadata_offset);
        let num_pairs = r.read_u32()?;
        let mut user_metadata = Vec::with_capacity(num_pairs as usize);
        for _ in 0..num_pairs {
            let key = r.read_cstr()?;
            let value = r.read_cstr()?;
            user_metadata.push((key, value));
        }

        Ok(Self {
            version,
            sets,
            image_to_combined,
            sampler_to_combined,
            user_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::AUTOGEN_CIS_SET;
    use crate::{STAGE_MASK_FRAGMENT, STAGE_MASK_VERTEX};

    fn sample_artifact() -> Vec<u8> {
        let mut layout = PipelineLayout::new();
        layout
            .process_resource(0, 0, DescriptorType::UniformBuffer, STAGE_MASK_VERTEX, "globals", true)
            .unwrap();
        layout
            .process_resource(0, 0, DescriptorType::UniformBuffer, STAGE_MASK_FRAGMENT, "globals", true)
            .unwrap();
        layout
            .process_resource(0, 2, DescriptorType::Sampler, STAGE_MASK_FRAGMENT, "smp", true)
            .unwrap();
        layout
            .process_resource(0, 1, DescriptorType::Texture, STAGE_MASK_FRAGMENT, "img", true)
            .unwrap();
        layout.add_combined_sampler(0, "img_smp", STAGE_MASK_FRAGMENT);
        let mut image_map = SeparateToCombinedMap::new();
        image_map.add_resource(1, "img", 0, 1, 100);
        let mut sampler_map = SeparateToCombinedMap::new();
        sampler_map.add_resource(2, "smp", 0, 2, 100);
        let meta = vec![
            ("pass".to_owned(), "forward".to_owned()),
            ("queue".to_owned(), "opaque".to_owned()),
        ];
        serialize(&layout, &image_map, &sampler_map, &meta)
    }

    #[test]
    fn header_is_little_endian_with_fixed_size() {
        let bytes = sample_artifact();
        assert_eq!(&bytes[0..4], &MAGIC.to_le_bytes());
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 32);
        // First record starts right after the header.
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 32);
        // All record offsets are 4-byte aligned.
        for field in 4..8 {
            let off = u32::from_le_bytes(bytes[field * 4..field * 4 + 4].try_into().unwrap());
            assert_eq!(off % 4, 0);
        }
    }

    #[test]
    fn round_trips_through_the_reader() {
        let bytes = sample_artifact();
        let parsed = PipelineMetadata::parse(&bytes).unwrap();
        assert_eq!(parsed.version, (VERSION_MAJOR, VERSION_MINOR));
        assert_eq!(parsed.sets.len(), (AUTOGEN_CIS_SET + 1) as usize);
        assert_eq!(parsed.sets[0].len(), 3);
        // Set 0 in original-slot order: globals, img, smp.
        assert_eq!(
            parsed.sets[0][0],
            MetaDescriptor {
                slot: 0,
                ty: DescriptorType::UniformBuffer,
                stage_mask: STAGE_MASK_VERTEX | STAGE_MASK_FRAGMENT,
            }
        );
        assert_eq!(parsed.sets[0][1].ty, DescriptorType::Texture);
        assert_eq!(parsed.sets[0][2].ty, DescriptorType::Sampler);
        // Intermediate sets serialize as empty.
        for set in 1..AUTOGEN_CIS_SET as usize {
            assert!(parsed.sets[set].is_empty());
        }
        let cis = &parsed.sets[AUTOGEN_CIS_SET as usize];
        assert_eq!(cis.len(), 1);
        assert_eq!(cis[0].ty, DescriptorType::CombinedImageSampler);
        assert_eq!(
            parsed.image_to_combined,
            vec![MetaMapEntry {
                separate_id: 1,
                combined_ids: vec![100],
            }]
        );
        assert_eq!(parsed.sampler_to_combined[0].separate_id, 2);
        assert_eq!(
            parsed.user_metadata,
            vec![
                ("pass".to_owned(), "forward".to_owned()),
                ("queue".to_owned(), "opaque".to_owned()),
            ]
        );
    }

    #[test]
    fn serialization_is_deterministic() {
        assert_eq!(sample_artifact(), sample_artifact());
    }

    #[test]
    fn empty_pipeline_serializes_and_parses() {
        let bytes = serialize(
            &PipelineLayout::new(),
            &SeparateToCombinedMap::new(),
            &SeparateToCombinedMap::new(),
            &[],
        );
        let parsed = PipelineMetadata::parse(&bytes).unwrap();
        assert!(parsed.sets.is_empty());
        assert!(parsed.image_to_combined.is_empty());
        assert!(parsed.user_metadata.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_artifact();
        bytes[0] ^= 0xff;
        assert!(matches!(
            PipelineMetadata::parse(&bytes),
            Err(ParseError::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = sample_artifact();
        assert!(PipelineMetadata::parse(&bytes[..bytes.len() - 2]).is_err());
    }
}
