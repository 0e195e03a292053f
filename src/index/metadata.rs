//! Index persistence
//!
//! One self-contained stream: magic + version, a JSON properties blob,
//! the term dictionary, the offset and document-length tables, the
//! posting arena, and the precomputed score-bound sets. Loading validates
//! structure up front and fails with corruption errors; it never yields a
//! partially usable index.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::scoring::ScoringKind;
use crate::structures::CompactTable;
use crate::TermId;

use super::{InvertedIndex, ScoreBounds, TermEntry};

const MAGIC: u32 = u32::from_le_bytes(*b"QVIX");
const FORMAT_VERSION: u32 = 1;

/// Collection-level properties, stored as JSON inside the index stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexProperties {
    pub documents: u32,
    pub avg_doc_len: f64,
    pub occurrences: u64,
    pub block_size: u32,
    pub active_scoring: ScoringKind,
}

impl InvertedIndex {
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;

        let props =
            serde_json::to_vec(&self.props).map_err(|e| Error::Serialization(e.to_string()))?;
        writer.write_u32::<LittleEndian>(props.len() as u32)?;
        writer.write_all(&props)?;

        writer.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for (name, entry) in self.term_names.iter().zip(&self.entries) {
            writer.write_u16::<LittleEndian>(name.len() as u16)?;
            writer.write_all(name.as_bytes())?;
            writer.write_u32::<LittleEndian>(entry.doc_freq)?;
            writer.write_u64::<LittleEndian>(entry.collection_freq)?;
            writer.write_f32::<LittleEndian>(entry.max_score)?;
        }

        self.offsets.serialize(writer)?;
        self.doc_lens.serialize(writer)?;

        writer.write_u64::<LittleEndian>(self.postings.len() as u64)?;
        writer.write_all(&self.postings)?;

        writer.write_u32::<LittleEndian>(self.bounds.len() as u32)?;
        for (&kind, bounds) in &self.bounds {
            writer.write_u8(kind.to_tag())?;
            for &b in &bounds.term_bounds {
                writer.write_f32::<LittleEndian>(b)?;
            }
            writer.write_u32::<LittleEndian>(bounds.block_bounds.len() as u32)?;
            for &s in &bounds.block_starts {
                writer.write_u32::<LittleEndian>(s)?;
            }
            for &b in &bounds.block_bounds {
                writer.write_f32::<LittleEndian>(b)?;
            }
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(Error::Corruption(format!("bad index magic {magic:#x}")));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported index format version {version}"
            )));
        }

        let props_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut props_buf = vec![0u8; props_len];
        reader.read_exact(&mut props_buf)?;
        let props: IndexProperties =
            serde_json::from_slice(&props_buf).map_err(|e| Error::Serialization(e.to_string()))?;

        let term_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut term_ids = FxHashMap::default();
        let mut term_names = Vec::with_capacity(term_count);
        let mut entries = Vec::with_capacity(term_count);
        for t in 0..term_count {
            let name_len = reader.read_u16::<LittleEndian>()? as usize;
            let mut name_buf = vec![0u8; name_len];
            reader.read_exact(&mut name_buf)?;
            let name = String::from_utf8(name_buf)
                .map_err(|_| Error::Corruption(format!("term {t}: name is not UTF-8")))?;
            let doc_freq = reader.read_u32::<LittleEndian>()?;
            let collection_freq = reader.read_u64::<LittleEndian>()?;
            let max_score = reader.read_f32::<LittleEndian>()?;
            if term_ids.insert(name.clone(), t as TermId).is_some() {
                return Err(Error::Corruption(format!("duplicate term '{name}'")));
            }
            term_names.push(name);
            entries.push(TermEntry {
                doc_freq,
                collection_freq,
                max_score,
            });
        }

        let offsets = CompactTable::deserialize(reader)?;
        if offsets.len() != term_count + 1 {
            return Err(Error::Corruption(format!(
                "offset table holds {} entries for {term_count} terms",
                offsets.len()
            )));
        }
        let doc_lens = CompactTable::deserialize(reader)?;
        if doc_lens.len() != props.documents as usize {
            return Err(Error::Corruption(format!(
                "document-length table holds {} entries for {} documents",
                doc_lens.len(),
                props.documents
            )));
        }

        let arena_len = reader.read_u64::<LittleEndian>()? as usize;
        let mut postings = vec![0u8; arena_len];
        reader.read_exact(&mut postings)?;
        if offsets.get(term_count) as usize != arena_len {
            return Err(Error::Corruption(
                "offset table end disagrees with posting arena length".into(),
            ));
        }

        let nsets = reader.read_u32::<LittleEndian>()? as usize;
        let mut bounds = FxHashMap::default();
        for _ in 0..nsets {
            let kind = ScoringKind::from_tag(reader.read_u8()?)?;
            let mut term_bounds = Vec::with_capacity(term_count);
            for _ in 0..term_count {
                term_bounds.push(reader.read_f32::<LittleEndian>()?);
            }
            let total_blocks = reader.read_u32::<LittleEndian>()? as usize;
            let mut block_starts = Vec::with_capacity(term_count + 1);
            for _ in 0..=term_count {
                block_starts.push(reader.read_u32::<LittleEndian>()?);
            }
            if block_starts.first() != Some(&0)
                || block_starts.last() != Some(&(total_blocks as u32))
                || block_starts.windows(2).any(|w| w[0] > w[1])
            {
                return Err(Error::Corruption(format!(
                    "malformed block-bound directory for {}",
                    kind.name()
                )));
            }
            let mut block_bounds = Vec::with_capacity(total_blocks);
            for _ in 0..total_blocks {
                block_bounds.push(reader.read_f32::<LittleEndian>()?);
            }
            bounds.insert(
                kind,
                ScoreBounds {
                    term_bounds,
                    block_starts,
                    block_bounds,
                },
            );
        }

        Ok(InvertedIndex::from_parts(
            term_ids, term_names, entries, offsets, postings, doc_lens, props, bounds,
        ))
    }
}
