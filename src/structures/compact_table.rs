//! Succinct block-compressed integer array
//!
//! A compact table stores `count` u64 values varint-encoded in fixed-size
//! blocks, with a directory of byte offsets (one leader per block) for O(1)
//! block lookup and O(block_size) local decode. Delta mode subtracts each
//! block's local minimum (its first value) from the block's values, which
//! shrinks monotone data such as posting-arena offsets.
//!
//! Used for per-document statistics (document lengths) and for directory
//! structures (posting-list offsets, per-term block-bound offsets).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Error, Result};

use super::bitpacking::{read_vint, write_vint};

const FLAG_DELTA: u32 = 1;

/// Default number of values per block
pub const DEFAULT_TABLE_BLOCK_SIZE: usize = 256;

/// Block-compressed array of u64 values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactTable {
    count: u32,
    block_size: u32,
    delta: bool,
    /// Byte offset of each block within `data`
    leaders: Vec<u32>,
    data: Vec<u8>,
}

impl CompactTable {
    /// Build a table from `values`.
    ///
    /// # Panics
    ///
    /// In delta mode, values must be non-decreasing within each block;
    /// violating this is a builder contract error and panics.
    pub fn build(values: &[u64], delta: bool, block_size: usize) -> Result<Self> {
        if block_size == 0 || block_size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "invalid compact table block size: {block_size}"
            )));
        }
        let mut leaders = Vec::with_capacity(values.len().div_ceil(block_size));
        let mut data = Vec::new();

        for block in values.chunks(block_size) {
            leaders.push(data.len() as u32);
            if delta {
                let base = block[0];
                write_vint(&mut data, base).map_err(Error::Io)?;
                for &v in block {
                    assert!(
                        v >= base,
                        "delta-encoded compact table requires non-decreasing values within a block"
                    );
                    write_vint(&mut data, v - base).map_err(Error::Io)?;
                }
            } else {
                for &v in block {
                    write_vint(&mut data, v).map_err(Error::Io)?;
                }
            }
        }

        Ok(Self {
            count: values.len() as u32,
            block_size: block_size as u32,
            delta,
            leaders,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn block_size(&self) -> usize {
        self.block_size as usize
    }

    /// Value at `i`; decodes only the owning block.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    pub fn get(&self, i: usize) -> u64 {
        assert!(i < self.count as usize, "compact table index out of range");
        let block = i / self.block_size as usize;
        let rel = i % self.block_size as usize;
        let mut reader = &self.data[self.leaders[block] as usize..];

        // Block payloads are complete varint runs once built/deserialized;
        // a short read here cannot occur.
        if self.delta {
            let base = read_vint(&mut reader).unwrap_or(0);
            let mut value = 0;
            for _ in 0..=rel {
                value = read_vint(&mut reader).unwrap_or(0);
            }
            base + value
        } else {
            let mut value = 0;
            for _ in 0..=rel {
                value = read_vint(&mut reader).unwrap_or(0);
            }
            value
        }
    }

    /// Query-local cursor caching the last decoded block
    pub fn cursor(&self) -> CompactTableCursor<'_> {
        CompactTableCursor {
            table: self,
            cached_block: usize::MAX,
            values: Vec::new(),
        }
    }

    fn decode_block(&self, block: usize, out: &mut Vec<u64>) {
        let start = block * self.block_size as usize;
        let len = (self.count as usize - start).min(self.block_size as usize);
        let mut reader = &self.data[self.leaders[block] as usize..];
        out.clear();
        out.reserve(len);
        let base = if self.delta {
            read_vint(&mut reader).unwrap_or(0)
        } else {
            0
        };
        for _ in 0..len {
            out.push(base + read_vint(&mut reader).unwrap_or(0));
        }
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.count)?;
        writer.write_u32::<LittleEndian>(self.block_size)?;
        writer.write_u32::<LittleEndian>(if self.delta { FLAG_DELTA } else { 0 })?;
        for &leader in &self.leaders {
            writer.write_u32::<LittleEndian>(leader)?;
        }
        writer.write_u64::<LittleEndian>(self.data.len() as u64)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let count = reader.read_u32::<LittleEndian>()?;
        let block_size = reader.read_u32::<LittleEndian>()?;
        let flags = reader.read_u32::<LittleEndian>()?;
        if block_size == 0 {
            return Err(Error::Corruption("compact table: zero block size".into()));
        }
        if flags & !FLAG_DELTA != 0 {
            return Err(Error::Corruption(format!(
                "compact table: unknown flags {flags:#x}"
            )));
        }

        let nblocks = (count as usize).div_ceil(block_size as usize);
        let mut leaders = Vec::with_capacity(nblocks);
        let mut prev = 0u32;
        for b in 0..nblocks {
            let leader = reader.read_u32::<LittleEndian>()?;
            if b > 0 && leader <= prev {
                return Err(Error::Corruption(
                    "compact table: non-monotone block directory".into(),
                ));
            }
            prev = leader;
            leaders.push(leader);
        }

        let data_len = reader.read_u64::<LittleEndian>()? as usize;
        if let Some(&last) = leaders.last()
            && last as usize >= data_len
        {
            return Err(Error::Corruption(
                "compact table: block offset past end of data".into(),
            ));
        }
        let mut data = vec![0u8; data_len];
        reader.read_exact(&mut data)?;

        Ok(Self {
            count,
            block_size,
            delta: flags & FLAG_DELTA != 0,
            leaders,
            data,
        })
    }
}

/// Cached reader for clustered access patterns (O(1) amortized for scans)
pub struct CompactTableCursor<'a> {
    table: &'a CompactTable,
    cached_block: usize,
    values: Vec<u64>,
}

impl CompactTableCursor<'_> {
    /// Value at `i`, decoding the owning block only on block change.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    pub fn get(&mut self, i: usize) -> u64 {
        assert!(
            i < self.table.count as usize,
            "compact table index out of range"
        );
        let block = i / self.table.block_size as usize;
        if block != self.cached_block {
            self.table.decode_block(block, &mut self.values);
            self.cached_block = block;
        }
        self.values[i % self.table.block_size as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_roundtrip() {
        let values: Vec<u64> = (0..1000).map(|i| (i * 37) % 541).collect();
        let table = CompactTable::build(&values, false, 128).unwrap();
        assert_eq!(table.len(), 1000);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(table.get(i), v);
        }
    }

    #[test]
    fn test_delta_monotone() {
        let values: Vec<u64> = (0..700).map(|i| i * i).collect();
        let table = CompactTable::build(&values, true, 64).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(table.get(i), v);
        }
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn test_delta_contract_violation_panics() {
        let values = vec![10u64, 5, 20];
        let _ = CompactTable::build(&values, true, 16);
    }

    #[test]
    fn test_invalid_block_size() {
        assert!(matches!(
            CompactTable::build(&[1, 2], false, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let values: Vec<u64> = (0..513).map(|i| i * 3 + 7).collect();
        let table = CompactTable::build(&values, true, 256).unwrap();

        let mut buf = Vec::new();
        table.serialize(&mut buf).unwrap();
        let restored = CompactTable::deserialize(&mut &buf[..]).unwrap();
        assert_eq!(restored, table);
        assert_eq!(restored.get(512), 512 * 3 + 7);
    }

    #[test]
    fn test_deserialize_rejects_bad_directory() {
        let values: Vec<u64> = (0..600).map(|i| i + 1).collect();
        let table = CompactTable::build(&values, false, 256).unwrap();
        let mut buf = Vec::new();
        table.serialize(&mut buf).unwrap();

        // Swap the second block's leader to break monotonicity
        let leader1_pos = 12 + 4;
        buf[leader1_pos..leader1_pos + 4].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            CompactTable::deserialize(&mut &buf[..]),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_cursor_matches_get() {
        let values: Vec<u64> = (0..300).map(|i| i * 11).collect();
        let table = CompactTable::build(&values, true, 32).unwrap();
        let mut cursor = table.cursor();
        for i in [0usize, 1, 31, 32, 33, 299, 150, 150, 0] {
            assert_eq!(cursor.get(i), table.get(i));
        }
    }
}
