mod bitpacking;
mod compact_table;
mod posting;

pub use bitpacking::{
    binary_search_first_geq, bits_needed, delta_decode, pack_values, packed_len, read_vint,
    unpack_values, write_vint,
};
pub use compact_table::{CompactTable, CompactTableCursor, DEFAULT_TABLE_BLOCK_SIZE};
pub use posting::{
    DEFAULT_BLOCK_SIZE, Posting, PostingCursor, PostingListBuilder, PostingListView, TERMINATED,
    block_count, block_index,
};
