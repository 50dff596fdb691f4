//! Block 0: the file header. Ported from the original storage engine's
//! `FileHeader::BlockDef` — magic, geometry, and a handful of descriptive
//! strings set once at creation time.

use crate::error::{Error, Result};
use crate::layout::{BLOCK_HEADER_SIZE, BLOCK_TYPE_FILE_HEADER, BlockHeader, seal_checksum, verify_checksum};

pub const MAGIC: u64 = 2_004_196_816_041_969;
pub const VERSION: u16 = 1;

const FIXED_SIZE: usize = 8 + 8 + 8 + 2 + 8 + 2 + 2 + 2; // magic,blocksize,blocks,version,created,name_len,description_len,contact_len
const FIXED_START: usize = BLOCK_HEADER_SIZE;
const STRINGS_START: usize = FIXED_START + FIXED_SIZE;

/// An owned, decoded view of block 0. Strings are read out once at open
/// time; nothing keeps a borrow into the mmap after construction.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub blocksize: u64,
    pub blocks: u64,
    pub version: u16,
    pub created: i64,
    pub name: String,
    pub description: String,
    pub contact: String,
}

impl FileHeader {
    pub fn new(blocksize: u64, blocks: u64, created: i64, name: &str, description: &str, contact: &str) -> Self {
        Self {
            blocksize,
            blocks,
            version: VERSION,
            created,
            name: name.to_string(),
            description: description.to_string(),
            contact: contact.to_string(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        STRINGS_START + self.name.len() + self.description.len() + self.contact.len()
    }

    pub fn write(&self, block: &mut [u8]) {
        assert!(block.len() >= self.encoded_len(), "block too small for file header");
        BlockHeader { block_id: 0, block_type: BLOCK_TYPE_FILE_HEADER, checksum: 0 }.write(block);

        let mut off = FIXED_START;
        block[off..off + 8].copy_from_slice(&MAGIC.to_le_bytes());
        off += 8;
        block[off..off + 8].copy_from_slice(&self.blocksize.to_le_bytes());
        off += 8;
        block[off..off + 8].copy_from_slice(&self.blocks.to_le_bytes());
        off += 8;
        block[off..off + 2].copy_from_slice(&self.version.to_le_bytes());
        off += 2;
        block[off..off + 8].copy_from_slice(&self.created.to_le_bytes());
        off += 8;
        block[off..off + 2].copy_from_slice(&(self.name.len() as u16).to_le_bytes());
        off += 2;
        block[off..off + 2].copy_from_slice(&(self.description.len() as u16).to_le_bytes());
        off += 2;
        block[off..off + 2].copy_from_slice(&(self.contact.len() as u16).to_le_bytes());
        off += 2;
        debug_assert_eq!(off, STRINGS_START);

        block[off..off + self.name.len()].copy_from_slice(self.name.as_bytes());
        off += self.name.len();
        block[off..off + self.description.len()].copy_from_slice(self.description.as_bytes());
        off += self.description.len();
        block[off..off + self.contact.len()].copy_from_slice(self.contact.as_bytes());

        seal_checksum(block);
    }

    /// Read just the blocksize field, without checksum validation. Used to
    /// learn how many bytes of a freshly mapped file belong to block 0
    /// before the rest of it can be verified.
    pub fn peek_blocksize(block: &[u8]) -> u64 {
        let off = FIXED_START + 8;
        u64::from_le_bytes(block[off..off + 8].try_into().unwrap())
    }

    pub fn read(block: &[u8]) -> Result<Self> {
        if !verify_checksum(block) {
            return Err(Error::Checksum(0));
        }
        let header = BlockHeader::read(block);
        if header.block_type != BLOCK_TYPE_FILE_HEADER {
            return Err(Error::BadMagic);
        }

        let mut off = FIXED_START;
        let magic = u64::from_le_bytes(block[off..off + 8].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }
        off += 8;
        let blocksize = u64::from_le_bytes(block[off..off + 8].try_into().unwrap());
        off += 8;
        let blocks = u64::from_le_bytes(block[off..off + 8].try_into().unwrap());
        off += 8;
        let version = u16::from_le_bytes(block[off..off + 2].try_into().unwrap());
        off += 2;
        let created = i64::from_le_bytes(block[off..off + 8].try_into().unwrap());
        off += 8;
        let name_len = u16::from_le_bytes(block[off..off + 2].try_into().unwrap()) as usize;
        off += 2;
        let description_len = u16::from_le_bytes(block[off..off + 2].try_into().unwrap()) as usize;
        off += 2;
        let contact_len = u16::from_le_bytes(block[off..off + 2].try_into().unwrap()) as usize;
        off += 2;
        debug_assert_eq!(off, STRINGS_START);

        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let name = String::from_utf8_lossy(&block[off..off + name_len]).into_owned();
        off += name_len;
        let description = String::from_utf8_lossy(&block[off..off + description_len]).into_owned();
        off += description_len;
        let contact = String::from_utf8_lossy(&block[off..off + contact_len]).into_owned();

        Ok(Self { blocksize, blocks, version, created, name, description, contact })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_block() {
        let header = FileHeader::new(4096, 64, 1_700_000_000, "trades", "tick store", "ops@example.com");
        let mut block = vec![0u8; 4096];
        header.write(&mut block);

        let read = FileHeader::read(&block).unwrap();
        assert_eq!(read.blocksize, 4096);
        assert_eq!(read.blocks, 64);
        assert_eq!(read.name, "trades");
        assert_eq!(read.description, "tick store");
        assert_eq!(read.contact, "ops@example.com");
    }

    #[test]
    fn rejects_bad_magic() {
        let block = vec![0u8; 4096];
        assert!(matches!(FileHeader::read(&block), Err(Error::Checksum(_))));
    }

    #[test]
    fn rejects_corrupted_block() {
        let header = FileHeader::new(4096, 64, 0, "a", "b", "c");
        let mut block = vec![0u8; 4096];
        header.write(&mut block);
        block[BLOCK_HEADER_SIZE] ^= 0xff;
        assert!(matches!(FileHeader::read(&block), Err(Error::Checksum(_))));
    }
}
