// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The block/page store is an external collaborator: this module
//! defines only the interface the append tree needs from it.
//! Compression, caching, and batching are the store's business, not ours.

use crate::error::{Result, Status, StoreError};
use crate::sample::LogicalAddr;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// Reads/writes fixed-size opaque blocks by logical address.
///
/// Append-only in practice: `append` is the only way to create new
/// addresses. The tree treats blocks as opaque byte strings.
pub trait BlockStore: Send + Sync {
    /// Reads the block at `addr`.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a dangling address, [`Status::Io`] on a
    /// lower-level I/O failure.
    fn read(&self, addr: LogicalAddr) -> Result<Vec<u8>>;

    /// Appends a new block, returning its address.
    ///
    /// # Errors
    ///
    /// [`Status::Io`] on a lower-level I/O failure.
    fn append(&self, block: Vec<u8>) -> Result<LogicalAddr>;

    /// Durably persists everything appended so far.
    ///
    /// # Errors
    ///
    /// [`Status::Io`] on a lower-level I/O failure.
    fn sync(&self) -> Result<()>;
}

/// An in-memory block store: address is simply the insertion index.
///
/// Used by tests and as a default for single-process, non-persistent use;
/// not a production store (nothing here survives a restart).
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: Mutex<Vec<Vec<u8>>>,
}

impl InMemoryBlockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn read(&self, addr: LogicalAddr) -> Result<Vec<u8>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let blocks = self.blocks.lock().expect("lock poisoned");
        #[expect(
            clippy::cast_possible_truncation,
            reason = "addresses handed out by this store never exceed its own Vec length"
        )]
        blocks
            .get(addr.0 as usize)
            .cloned()
            .ok_or_else(|| StoreError::new(Status::NotFound))
    }

    fn append(&self, block: Vec<u8>) -> Result<LogicalAddr> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut blocks = self.blocks.lock().expect("lock poisoned");
        let addr = LogicalAddr(blocks.len() as u64);
        blocks.push(block);
        drop(blocks);
        Ok(addr)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// An append-only flat-file block store.
///
/// Blocks are length-prefixed (`u32` little-endian) records appended to a
/// single file; the address is the byte offset of the record's length
/// prefix. Grounded on the `StdFileSystem` idiom of wrapping `std::fs`
/// behind a small trait (`src/fs.rs` in the teacher crate) rather than
/// anything resembling real page-store internals, which are out of scope.
pub struct FileBlockStore {
    file: Mutex<std::fs::File>,
}

impl FileBlockStore {
    /// Opens (creating if necessary) a block file at `path`.
    ///
    /// # Errors
    ///
    /// [`Status::Io`] if the file cannot be opened.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl BlockStore for FileBlockStore {
    fn read(&self, addr: LogicalAddr) -> Result<Vec<u8>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut file = self.file.lock().expect("lock poisoned");
        file.seek(SeekFrom::Start(addr.0))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut block = vec![0u8; len];
        file.read_exact(&mut block)?;
        drop(file);
        Ok(block)
    }

    fn append(&self, block: Vec<u8>) -> Result<LogicalAddr> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut file = self.file.lock().expect("lock poisoned");
        let addr = file.seek(SeekFrom::End(0))?;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "blocks are bounded well under u32::MAX"
        )]
        let len = block.len() as u32;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&block)?;
        drop(file);
        Ok(LogicalAddr(addr))
    }

    fn sync(&self) -> Result<()> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let file = self.file.lock().expect("lock poisoned");
        file.sync_all()?;
        drop(file);
        Ok(())
    }
}
