//! On-disk block addressing and the common per-block header every block
//! kind (file header, table of contents, data) starts with.

pub type BlockId = u64;
pub type RowId = u32;

pub const DEFAULT_BLOCK_SIZE: u64 = 4096;
pub const MIN_BLOCKS: u64 = 4;

pub const FILE_HEADER_BLOCK: BlockId = 0;
pub const TOC_BLOCK: BlockId = 1;
/// Reserved for a future keyed index root; nothing in this crate parses or
/// allocates rows into it yet.
pub const INDEX_ROOT_BLOCK: BlockId = 2;
pub const FIRST_DATA_BLOCK: BlockId = 3;

pub const BLOCK_TYPE_FREE: u8 = 0;
pub const BLOCK_TYPE_FILE_HEADER: u8 = 1;
pub const BLOCK_TYPE_TOC: u8 = 2;
pub const BLOCK_TYPE_INDEX_ROOT: u8 = 3;
pub const BLOCK_TYPE_DATA: u8 = 4;

pub const BLOCK_HEADER_SIZE: usize = 13; // block_id:8 + block_type:1 + checksum:4

/// The fixed-size prefix carried by every block: which block this is, what
/// kind it is, and a CRC32 over the remainder of the block's payload.
#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    pub block_id: BlockId,
    pub block_type: u8,
    pub checksum: u32,
}

impl BlockHeader {
    pub fn write(&self, block: &mut [u8]) {
        block[0..8].copy_from_slice(&self.block_id.to_le_bytes());
        block[8] = self.block_type;
        block[9..13].copy_from_slice(&self.checksum.to_le_bytes());
    }

    pub fn read(block: &[u8]) -> Self {
        let block_id = BlockId::from_le_bytes(block[0..8].try_into().unwrap());
        let block_type = block[8];
        let checksum = u32::from_le_bytes(block[9..13].try_into().unwrap());
        Self { block_id, block_type, checksum }
    }
}

/// Recompute and store the checksum over `block[BLOCK_HEADER_SIZE..]`.
pub fn seal_checksum(block: &mut [u8]) {
    let checksum = crc32fast::hash(&block[BLOCK_HEADER_SIZE..]);
    block[9..13].copy_from_slice(&checksum.to_le_bytes());
}

/// Verify the checksum written by [`seal_checksum`].
pub fn verify_checksum(block: &[u8]) -> bool {
    let stored = u32::from_le_bytes(block[9..13].try_into().unwrap());
    crc32fast::hash(&block[BLOCK_HEADER_SIZE..]) == stored
}
