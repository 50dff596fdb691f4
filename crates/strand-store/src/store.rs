//! Ties the block layout together into a single memory-mapped file: block 0
//! is the file header, block 1 the table of contents, block 2 a reserved
//! index root, and every block from 3 on is a data block holding rows.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::debug;

use crate::data::{DataBlock, ENTRIES_START, ROW_ENTRY_SIZE};
use crate::error::{Error, Result};
use crate::header::FileHeader;
use crate::layout::{
    BLOCK_TYPE_DATA, BLOCK_TYPE_FILE_HEADER, BLOCK_TYPE_INDEX_ROOT, BLOCK_TYPE_TOC, BlockId, FILE_HEADER_BLOCK,
    FIRST_DATA_BLOCK, INDEX_ROOT_BLOCK, MIN_BLOCKS, RowId, TOC_BLOCK,
};
use crate::lock::{ReadBlockLock, write_lock_ascending};
use crate::toc::Toc;

/// How many blocks a full store grows by when it runs out of data blocks.
const EXTEND_BLOCKS: u64 = 16;

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

pub struct Store {
    path: PathBuf,
    lock_path: PathBuf,
    file: File,
    mmap: MmapMut,
    blocksize: u64,
    blocks: u64,
}

impl Store {
    pub fn create(
        path: impl AsRef<Path>,
        blocksize: u64,
        blocks: u64,
        name: &str,
        description: &str,
        contact: &str,
        created: i64,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let blocks = blocks.max(MIN_BLOCKS);
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        file.set_len(blocksize * blocks)?;
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header = FileHeader::new(blocksize, blocks, created, name, description, contact);
        header.write(&mut mmap[..blocksize as usize]);

        {
            let toc_block = &mut mmap[(blocksize * TOC_BLOCK) as usize..(blocksize * (TOC_BLOCK + 1)) as usize];
            let mut toc = Toc::init(toc_block);
            toc.set_entry(FILE_HEADER_BLOCK, BLOCK_TYPE_FILE_HEADER);
            toc.set_entry(TOC_BLOCK, BLOCK_TYPE_TOC);
            toc.set_entry(INDEX_ROOT_BLOCK, BLOCK_TYPE_INDEX_ROOT);
            toc.seal();
        }
        {
            use crate::layout::{BlockHeader, seal_checksum};
            let index_block =
                &mut mmap[(blocksize * INDEX_ROOT_BLOCK) as usize..(blocksize * (INDEX_ROOT_BLOCK + 1)) as usize];
            BlockHeader { block_id: INDEX_ROOT_BLOCK, block_type: BLOCK_TYPE_INDEX_ROOT, checksum: 0 }
                .write(index_block);
            seal_checksum(index_block);
        }
        mmap.flush()?;

        let lock_path = lock_path(&path);
        File::options().read(true).write(true).create(true).truncate(false).open(&lock_path)?;

        Ok(Self { path, lock_path, file, mmap, blocksize, blocks })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let blocksize = FileHeader::peek_blocksize(&mmap);
        if blocksize == 0 || blocksize as usize > mmap.len() {
            return Err(Error::BadMagic);
        }
        let header = FileHeader::read(&mmap[..blocksize as usize])?;
        let blocks = header.blocks;

        Ok(Self { path: path.clone(), lock_path: lock_path(&path), file, mmap, blocksize, blocks })
    }

    pub fn header(&self) -> Result<FileHeader> {
        FileHeader::read(&self.mmap[..self.blocksize as usize])
    }

    fn block_mut(&mut self, id: BlockId) -> &mut [u8] {
        let start = (id * self.blocksize) as usize;
        let end = start + self.blocksize as usize;
        &mut self.mmap[start..end]
    }

    fn toc_capacity(&mut self) -> Result<u64> {
        let block = self.block_mut(TOC_BLOCK);
        Ok(Toc::open(block)?.capacity())
    }

    fn max_single_row_payload(&self) -> usize {
        (self.blocksize as usize).saturating_sub(ENTRIES_START + ROW_ENTRY_SIZE)
    }

    /// Grow the file by `EXTEND_BLOCKS`, remapping it and updating the
    /// header's recorded block count. Existing block contents are
    /// untouched; only the file's tail grows.
    fn extend(&mut self) -> Result<()> {
        let new_blocks = self.blocks + EXTEND_BLOCKS;
        self.file.set_len(self.blocksize * new_blocks)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.blocks = new_blocks;

        let mut header = self.header()?;
        header.blocks = new_blocks;
        let blocksize = self.blocksize;
        header.write(&mut self.mmap[..blocksize as usize]);
        debug!(blocks = new_blocks, "extended store file");
        Ok(())
    }

    /// Store a value, splitting it across two blocks if it doesn't fit one.
    /// Returns the block id and rowid of its first (head) row.
    pub fn put(&mut self, data: &[u8]) -> Result<(BlockId, RowId)> {
        let max_payload = self.max_single_row_payload();
        if data.len() <= max_payload {
            self.insert_into_any_block(data, crate::data::NO_CONTINUATION, 0)
        } else {
            let (head, tail) = data.split_at(max_payload);
            if tail.len() > max_payload {
                return Err(Error::BlockFull(0, data.len() as u32));
            }
            let (tail_block, tail_row) = self.insert_into_any_block(tail, crate::data::NO_CONTINUATION, 0)?;
            self.insert_into_any_block(head, tail_block, tail_row)
        }
    }

    fn insert_into_any_block(
        &mut self,
        payload: &[u8],
        next_block: BlockId,
        next_rowid: RowId,
    ) -> Result<(BlockId, RowId)> {
        let needed = payload.len() as u32 + ROW_ENTRY_SIZE as u32;

        for block_id in FIRST_DATA_BLOCK..self.blocks {
            let is_data = {
                let toc_block = self.block_mut(TOC_BLOCK);
                Toc::open(toc_block)?.entry(block_id) == BLOCK_TYPE_DATA
            };
            if !is_data {
                continue;
            }
            let free = {
                let slice = self.block_mut(block_id);
                DataBlock::open(block_id, slice)?.free_space()
            };
            if free >= needed {
                let mut locks = vec![TOC_BLOCK, block_id];
                let _guards = write_lock_ascending(&self.lock_path, &mut locks)?;
                let slice = self.block_mut(block_id);
                let mut db = DataBlock::open(block_id, slice)?;
                let rowid = db.insert_row(payload, next_block, next_rowid)?;
                return Ok((block_id, rowid));
            }
        }

        let toc_capacity = self.toc_capacity()?;
        let block_id = {
            let toc_block = self.block_mut(TOC_BLOCK);
            Toc::open(toc_block)?.find_free(FIRST_DATA_BLOCK).ok_or(Error::StoreFull)?
        };
        if block_id >= toc_capacity {
            return Err(Error::StoreFull);
        }
        if block_id >= self.blocks {
            self.extend()?;
        }

        let mut locks = vec![TOC_BLOCK, block_id];
        let _guards = write_lock_ascending(&self.lock_path, &mut locks)?;

        {
            let slice = self.block_mut(block_id);
            DataBlock::init(block_id, slice);
        }
        {
            let toc_block = self.block_mut(TOC_BLOCK);
            let mut toc = Toc::open(toc_block)?;
            toc.set_entry(block_id, BLOCK_TYPE_DATA);
            toc.seal();
        }
        let slice = self.block_mut(block_id);
        let mut db = DataBlock::open(block_id, slice)?;
        let rowid = db.insert_row(payload, next_block, next_rowid)?;
        Ok((block_id, rowid))
    }

    pub fn get(&mut self, block_id: BlockId, rowid: RowId) -> Result<Vec<u8>> {
        let _guard = ReadBlockLock::acquire(&self.lock_path, block_id)?;
        let (entry, mut payload) = {
            let slice = self.block_mut(block_id);
            let db = DataBlock::open(block_id, slice)?;
            let entry = db.entry(rowid).ok_or(Error::RowNotFound(rowid))?;
            (entry, db.get_row(rowid)?)
        };
        if entry.next_block != crate::data::NO_CONTINUATION {
            let tail = self.get(entry.next_block, entry.next_rowid)?;
            payload.extend_from_slice(&tail);
        }
        Ok(payload)
    }

    pub fn delete(&mut self, block_id: BlockId, rowid: RowId) -> Result<()> {
        let mut locks = vec![TOC_BLOCK, block_id];
        let _guards = write_lock_ascending(&self.lock_path, &mut locks)?;

        let removed = {
            let slice = self.block_mut(block_id);
            DataBlock::open(block_id, slice)?.release_row(rowid)?
        };

        let now_empty = {
            let slice = self.block_mut(block_id);
            DataBlock::open(block_id, slice)?.num_rows() == 0
        };
        if now_empty {
            let toc_block = self.block_mut(TOC_BLOCK);
            let mut toc = Toc::open(toc_block)?;
            toc.set_entry(block_id, crate::layout::BLOCK_TYPE_FREE);
            toc.seal();
        }
        drop(_guards);

        if removed.next_block != crate::data::NO_CONTINUATION {
            self.delete(removed.next_block, removed.next_rowid)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn blocksize(&self) -> u64 {
        self.blocksize
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("strand-store-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn creates_stores_and_reads_back_a_value() {
        let path = temp_path("roundtrip");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(lock_path(&path));

        let mut store = Store::create(&path, 4096, MIN_BLOCKS, "t", "d", "c", 0).unwrap();
        let (block, row) = store.put(b"hello, store").unwrap();
        assert_eq!(store.get(block, row).unwrap(), b"hello, store");

        store.delete(block, row).unwrap();
        assert!(store.get(block, row).is_err());

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(lock_path(&path));
    }

    #[test]
    fn splits_oversized_values_across_two_blocks() {
        let path = temp_path("split");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(lock_path(&path));

        let mut store = Store::create(&path, 4096, MIN_BLOCKS, "t", "d", "c", 0).unwrap();
        let big = vec![0xab; 6000];
        let (block, row) = store.put(&big).unwrap();
        assert_eq!(store.get(block, row).unwrap(), big);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(lock_path(&path));
    }

    #[test]
    fn allocates_a_second_data_block_once_the_first_is_full() {
        let path = temp_path("grow");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(lock_path(&path));

        let mut store = Store::create(&path, 512, MIN_BLOCKS, "t", "d", "c", 0).unwrap();
        let mut placements = Vec::new();
        for _ in 0..20 {
            placements.push(store.put(b"row").unwrap());
        }
        let distinct_blocks: std::collections::HashSet<_> = placements.iter().map(|(b, _)| *b).collect();
        assert!(distinct_blocks.len() > 1);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(lock_path(&path));
    }
}
