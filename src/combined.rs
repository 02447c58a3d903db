// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Traceability from separate images and samplers to the combined bindings
//! they participate in.

use std::collections::BTreeMap;

use crate::metadata::MetadataWriter;

/// Everything recorded about one separate resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeparateResource {
    pub name: String,
    pub original_set: u32,
    pub original_slot: u32,
    /// Combined ids this resource participates in, in synthesis order. A set:
    /// the same separate image or sampler may appear in several combinations,
    /// but each combination is recorded once.
    pub combined_ids: Vec<u32>,
}

/// Map from a separate resource's id to the combined bindings built from it.
#[derive(Clone, Debug, Default)]
pub struct SeparateToCombinedMap {
    entries: BTreeMap<u32, SeparateResource>,
}

impl SeparateToCombinedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the separate resource `id` participates in `combined_id`.
    pub fn add_resource(
        &mut self,
        id: u32,
        name: &str,
        original_set: u32,
        original_slot: u32,
        combined_id: u32,
    ) {
        let entry = self.entries.entry(id).or_insert_with(|| SeparateResource {
            name: name.to_owned(),
            original_set,
            original_slot,
            combined_ids: Vec::new(),
        });
        if !entry.combined_ids.contains(&combined_id) {
            entry.combined_ids.push(combined_id);
        }
    }

    pub fn get(&self, id: u32) -> Option<&SeparateResource> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in separate-id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SeparateResource)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Appends this map's record to a metadata file: entry count, then per
    /// entry the separate id, the combined-id count, and the combined ids.
    pub fn serialize(&self, writer: &mut MetadataWriter) {
        writer.write_u32(self.entries.len() as u32);
        for (id, entry) in self.iter() {
            writer.write_u32(id);
            writer.write_u32(entry.combined_ids.len() as u32);
            for combined_id in &entry.combined_ids {
                writer.write_u32(*combined_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_every_combination_once() {
        let mut map = SeparateToCombinedMap::new();
        map.add_resource(3, "img", 0, 1, 100);
        map.add_resource(3, "img", 0, 1, 101);
        map.add_resource(3, "img", 0, 1, 100);
        let entry = map.get(3).unwrap();
        assert_eq!(entry.combined_ids, vec![100, 101]);
        assert_eq!(entry.name, "img");
        assert_eq!((entry.original_set, entry.original_slot), (0, 1));
    }

    #[test]
    fn iterates_in_id_order() {
        let mut map = SeparateToCombinedMap::new();
        map.add_resource(7, "b", 0, 0, 100);
        map.add_resource(2, "a", 0, 1, 100);
        let ids: Vec<u32> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 7]);
    }
}
