//! Block-compressed posting lists with skip support
//!
//! A posting list is encoded as a directory of fixed-capacity blocks
//! followed by one contiguous packed-data region. Each block header keeps
//! the base (first) and last document id, the posting count and the bit
//! widths used for its packed payload, so a cursor can locate the block
//! owning a target document id without touching the payload at all.
//!
//! The cursor is forward-only: `next_geq` never re-decodes a block it has
//! already passed, which makes repeated calls with non-decreasing targets
//! cost at most one decode per block over the whole list.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Error, Result};
use crate::{DocId, TermFreq, TermId};

use super::bitpacking::{
    binary_search_first_geq, bits_needed, delta_decode, pack_values, packed_len, unpack_values,
};

/// Sentinel document id indicating an exhausted cursor
pub const TERMINATED: DocId = DocId::MAX;

/// Default number of postings per block
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Byte size of one encoded block header
const BLOCK_META_BYTES: usize = 16;

/// A posting entry: document id plus within-document frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: TermFreq,
}

/// Block ordinal owning posting `i` under the given block size
#[inline]
pub fn block_index(i: usize, block_size: usize) -> usize {
    i / block_size
}

/// Number of blocks needed for `n` postings under the given block size
#[inline]
pub fn block_count(n: usize, block_size: usize) -> usize {
    n.div_ceil(block_size)
}

fn corrupt(term_id: TermId, detail: impl std::fmt::Display) -> Error {
    Error::Corruption(format!("term {term_id}: {detail}"))
}

fn corrupt_block(term_id: TermId, block: usize, detail: impl std::fmt::Display) -> Error {
    Error::Corruption(format!("term {term_id}, block {block}: {detail}"))
}

/// Builder for one encoded posting list
///
/// Postings must be pushed in strictly increasing document-id order with
/// frequencies >= 1; both are builder contracts checked with debug
/// assertions here and validated with real errors at the index boundary.
pub struct PostingListBuilder {
    block_size: usize,
    postings: Vec<Posting>,
}

impl Default for PostingListBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingListBuilder {
    pub fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            postings: Vec::new(),
        }
    }

    /// Use a non-default block size (1..=65535 postings per block)
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        if block_size == 0 || block_size > u16::MAX as usize {
            return Err(Error::Config(format!(
                "invalid posting block size: {block_size}"
            )));
        }
        Ok(Self {
            block_size,
            postings: Vec::new(),
        })
    }

    pub fn push(&mut self, doc_id: DocId, term_freq: TermFreq) {
        debug_assert!(
            self.postings.is_empty() || self.postings.last().unwrap().doc_id < doc_id,
            "postings must be pushed in strictly increasing doc_id order"
        );
        debug_assert!(term_freq >= 1, "term frequency must be >= 1");
        self.postings.push(Posting { doc_id, term_freq });
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Encode to the block layout, appending to `out`
    pub fn encode_into<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let nblocks = block_count(self.postings.len(), self.block_size);
        out.write_u32::<LittleEndian>(self.postings.len() as u32)?;
        out.write_u32::<LittleEndian>(nblocks as u32)?;

        let mut data = Vec::new();
        let mut metas = Vec::with_capacity(nblocks);
        let mut deltas = vec![0u32; self.block_size];
        let mut tfs = vec![0u32; self.block_size];

        for chunk in self.postings.chunks(self.block_size) {
            let base_doc = chunk[0].doc_id;
            let last_doc = chunk[chunk.len() - 1].doc_id;

            let mut max_delta = 0u32;
            for (j, pair) in chunk.windows(2).enumerate() {
                let delta = pair[1].doc_id - pair[0].doc_id - 1;
                deltas[j] = delta;
                max_delta = max_delta.max(delta);
            }
            let mut max_tf = 0u32;
            for (j, posting) in chunk.iter().enumerate() {
                tfs[j] = posting.term_freq - 1;
                max_tf = max_tf.max(posting.term_freq - 1);
            }

            let doc_width = bits_needed(max_delta);
            let tf_width = bits_needed(max_tf);
            let data_offset = data.len() as u32;
            pack_values(&deltas[..chunk.len() - 1], doc_width, &mut data);
            pack_values(&tfs[..chunk.len()], tf_width, &mut data);

            metas.push(BlockMeta {
                base_doc,
                last_doc,
                data_offset,
                count: chunk.len() as u16,
                doc_width,
                tf_width,
            });
        }

        for meta in &metas {
            out.write_u32::<LittleEndian>(meta.base_doc)?;
            out.write_u32::<LittleEndian>(meta.last_doc)?;
            out.write_u32::<LittleEndian>(meta.data_offset)?;
            out.write_u16::<LittleEndian>(meta.count)?;
            out.write_u8(meta.doc_width)?;
            out.write_u8(meta.tf_width)?;
        }
        out.write_all(&data)?;
        Ok(())
    }

    /// Encode to a fresh byte buffer
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

/// Parsed header of one block
#[derive(Debug, Clone, Copy)]
struct BlockMeta {
    base_doc: DocId,
    last_doc: DocId,
    data_offset: u32,
    count: u16,
    doc_width: u8,
    tf_width: u8,
}

impl BlockMeta {
    #[inline]
    fn payload_len(&self) -> usize {
        packed_len(self.count as usize - 1, self.doc_width)
            + packed_len(self.count as usize, self.tf_width)
    }
}

/// Read-only view over one encoded posting list
///
/// `open` parses and structurally validates the block directory; after a
/// successful open, block decoding cannot fail. The view borrows the
/// encoded bytes (typically a slice of the index's posting arena) and
/// never stores pointers into them, only offsets.
#[derive(Debug)]
pub struct PostingListView<'a> {
    data: &'a [u8],
    blocks: Vec<BlockMeta>,
    doc_count: u32,
    term_id: TermId,
}

impl<'a> PostingListView<'a> {
    /// Parse and validate an encoded posting list.
    ///
    /// `expected_len` is the posting count recorded in the term entry,
    /// `max_doc` the exclusive upper bound on document ids (collection
    /// size), and `term_id` is carried for diagnostics only.
    pub fn open(
        bytes: &'a [u8],
        expected_len: u32,
        block_size: usize,
        max_doc: DocId,
        term_id: TermId,
    ) -> Result<Self> {
        let mut reader = bytes;
        if bytes.len() < 8 {
            return Err(corrupt(term_id, "truncated posting list header"));
        }
        let doc_count = reader.read_u32::<LittleEndian>().map_err(Error::Io)?;
        let nblocks = reader.read_u32::<LittleEndian>().map_err(Error::Io)? as usize;

        if doc_count != expected_len {
            return Err(corrupt(
                term_id,
                format!("posting count {doc_count} disagrees with term entry {expected_len}"),
            ));
        }
        if nblocks != block_count(doc_count as usize, block_size) {
            return Err(corrupt(
                term_id,
                format!("block count {nblocks} disagrees with posting count {doc_count}"),
            ));
        }
        let directory_end = 8 + nblocks * BLOCK_META_BYTES;
        if bytes.len() < directory_end {
            return Err(corrupt(term_id, "truncated block directory"));
        }

        let mut blocks = Vec::with_capacity(nblocks);
        let mut total = 0u64;
        let mut expected_offset = 0u32;
        let mut prev_last: Option<DocId> = None;

        for b in 0..nblocks {
            let base_doc = reader.read_u32::<LittleEndian>().map_err(Error::Io)?;
            let last_doc = reader.read_u32::<LittleEndian>().map_err(Error::Io)?;
            let data_offset = reader.read_u32::<LittleEndian>().map_err(Error::Io)?;
            let count = reader.read_u16::<LittleEndian>().map_err(Error::Io)?;
            let doc_width = reader.read_u8().map_err(Error::Io)?;
            let tf_width = reader.read_u8().map_err(Error::Io)?;

            if count == 0 || count as usize > block_size {
                return Err(corrupt_block(term_id, b, format!("bad posting count {count}")));
            }
            if doc_width > 32 || tf_width > 32 {
                return Err(corrupt_block(term_id, b, "bad bit width"));
            }
            if base_doc > last_doc || last_doc >= max_doc {
                return Err(corrupt_block(
                    term_id,
                    b,
                    format!("doc-id range {base_doc}..={last_doc} out of bounds"),
                ));
            }
            if let Some(prev) = prev_last
                && base_doc <= prev
            {
                return Err(corrupt_block(term_id, b, "doc-id ranges overlap"));
            }
            if data_offset != expected_offset {
                return Err(corrupt_block(
                    term_id,
                    b,
                    format!("payload offset {data_offset}, expected {expected_offset}"),
                ));
            }

            let meta = BlockMeta {
                base_doc,
                last_doc,
                data_offset,
                count,
                doc_width,
                tf_width,
            };
            expected_offset = expected_offset
                .checked_add(meta.payload_len() as u32)
                .ok_or_else(|| corrupt_block(term_id, b, "payload offset overflow"))?;
            total += count as u64;
            prev_last = Some(last_doc);
            blocks.push(meta);
        }

        if total != doc_count as u64 {
            return Err(corrupt(
                term_id,
                format!("block counts sum to {total}, expected {doc_count}"),
            ));
        }
        let data = &bytes[directory_end..];
        if data.len() != expected_offset as usize {
            return Err(corrupt(
                term_id,
                format!(
                    "payload region is {} bytes, counts require {expected_offset}",
                    data.len()
                ),
            ));
        }

        Ok(Self {
            data,
            blocks,
            doc_count,
            term_id,
        })
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn term_id(&self) -> TermId {
        self.term_id
    }

    /// Create a forward cursor over this list
    pub fn into_cursor(self) -> PostingCursor<'a> {
        PostingCursor::new(self)
    }
}

/// Forward-only cursor with block skipping
pub struct PostingCursor<'a> {
    view: PostingListView<'a>,
    current_block: usize,
    decoded: bool,
    docs: Vec<u32>,
    tfs: Vec<u32>,
    pos: usize,
    exhausted: bool,
}

impl<'a> PostingCursor<'a> {
    fn new(view: PostingListView<'a>) -> Self {
        let exhausted = view.blocks.is_empty();
        let mut cursor = Self {
            view,
            current_block: 0,
            decoded: false,
            docs: Vec::new(),
            tfs: Vec::new(),
            pos: 0,
            exhausted,
        };
        if !cursor.exhausted {
            cursor.decode_current();
        }
        cursor
    }

    fn decode_current(&mut self) {
        let meta = self.view.blocks[self.current_block];
        let count = meta.count as usize;
        let payload = &self.view.data[meta.data_offset as usize..];

        let mut deltas = vec![0u32; count - 1];
        let doc_bytes = packed_len(count - 1, meta.doc_width);
        unpack_values(&payload[..doc_bytes], meta.doc_width, &mut deltas);

        self.docs.resize(count, 0);
        delta_decode(&mut self.docs, &deltas, meta.base_doc, count);

        self.tfs.resize(count, 0);
        let tf_bytes = packed_len(count, meta.tf_width);
        unpack_values(
            &payload[doc_bytes..doc_bytes + tf_bytes],
            meta.tf_width,
            &mut self.tfs,
        );
        for tf in &mut self.tfs {
            *tf += 1;
        }
        self.decoded = true;
    }

    fn ensure_decoded(&mut self) {
        if !self.decoded && !self.exhausted {
            self.decode_current();
        }
    }

    /// Current document id, or TERMINATED once exhausted
    #[inline]
    pub fn doc(&self) -> DocId {
        if self.exhausted {
            TERMINATED
        } else if self.decoded {
            self.docs[self.pos]
        } else {
            // Undecoded blocks are always freshly entered, so the cursor
            // sits on the block's first posting.
            self.view.blocks[self.current_block].base_doc
        }
    }

    /// Frequency of the current posting
    #[inline]
    pub fn term_freq(&mut self) -> TermFreq {
        if self.exhausted {
            return 0;
        }
        self.ensure_decoded();
        self.tfs[self.pos]
    }

    /// Ordinal of the block the cursor currently sits in
    #[inline]
    pub fn block_ordinal(&self) -> usize {
        self.current_block
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advance to the next posting
    pub fn advance(&mut self) -> DocId {
        if self.exhausted {
            return TERMINATED;
        }
        self.ensure_decoded();
        self.pos += 1;
        if self.pos >= self.docs.len() {
            self.current_block += 1;
            self.pos = 0;
            if self.current_block >= self.view.blocks.len() {
                self.exhausted = true;
                return TERMINATED;
            }
            self.decode_current();
        }
        self.doc()
    }

    /// Move the block pointer forward (without decoding) to the first
    /// block whose doc-id range can contain `target`, returning its
    /// ordinal. Exhausts the cursor when every remaining block ends
    /// before `target`.
    pub fn skip_to_block(&mut self, target: DocId) -> Option<usize> {
        if self.exhausted {
            return None;
        }
        if target <= self.view.blocks[self.current_block].last_doc {
            return Some(self.current_block);
        }
        let rel = self.view.blocks[self.current_block + 1..]
            .partition_point(|meta| meta.last_doc < target);
        let next = self.current_block + 1 + rel;
        if next >= self.view.blocks.len() {
            self.exhausted = true;
            return None;
        }
        self.current_block = next;
        self.decoded = false;
        self.pos = 0;
        Some(next)
    }

    /// Position on the first posting with doc id >= target.
    ///
    /// Targets must be non-decreasing across calls; an earlier target
    /// simply returns the current posting.
    pub fn next_geq(&mut self, target: DocId) -> DocId {
        if self.exhausted {
            return TERMINATED;
        }
        if target <= self.doc() {
            return self.doc();
        }
        if self.skip_to_block(target).is_none() {
            return TERMINATED;
        }
        self.ensure_decoded();
        self.pos += binary_search_first_geq(&self.docs[self.pos..], target);
        debug_assert!(self.pos < self.docs.len());
        self.doc()
    }
}
