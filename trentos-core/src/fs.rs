//! Filesystem + Partition Manager.
//!
//! On-disk layout and partition-table formats are out of scope here; this
//! module models the partition bookkeeping and file-handle discipline
//! above an injected [`BlockDevice`], the same dependency-injection shape
//! used throughout this crate for anything touching real hardware.

use crate::error::{CoreError, ErrorCode, Result};
use std::collections::HashMap;

/// Injected block-addressable storage. Implementing a real device driver is
/// out of scope; [`MemoryBlockDevice`] stands in for tests.
pub trait BlockDevice: Send + Sync {
    fn block_size(&self) -> usize;
    fn block_count(&self) -> u64;
    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<()>;
    fn write_block(&self, index: u64, data: &[u8]) -> Result<()>;
}

pub struct MemoryBlockDevice {
    block_size: usize,
    blocks: parking_lot::Mutex<Vec<Vec<u8>>>,
}

impl MemoryBlockDevice {
    pub fn new(block_size: usize, block_count: u64) -> Self {
        Self {
            block_size,
            blocks: parking_lot::Mutex::new(vec![vec![0u8; block_size]; block_count as usize]),
        }
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.blocks.lock().len() as u64
    }

    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        let blocks = self.blocks.lock();
        let block = blocks
            .get(index as usize)
            .ok_or_else(|| CoreError::new(ErrorCode::DeviceInvalidBlock, "block index out of range"))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, index: u64, data: &[u8]) -> Result<()> {
        let mut blocks = self.blocks.lock();
        let block = blocks
            .get_mut(index as usize)
            .ok_or_else(|| CoreError::new(ErrorCode::DeviceInvalidBlock, "block index out of range"))?;
        block.copy_from_slice(data);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug)]
pub struct PartitionDescriptor {
    pub id: u32,
    pub start_block: u64,
    pub end_block: u64,
    pub block_size: usize,
    pub mode: PartitionMode,
}

/// Owns the partition table for one block device. `init` validates the
/// descriptors exactly: extents within the disk, `start <
/// end`, distinct ids, positive block size.
pub struct PartitionManager {
    device: Box<dyn BlockDevice>,
    partitions: HashMap<u32, PartitionDescriptor>,
}

impl PartitionManager {
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        Self { device, partitions: HashMap::new() }
    }

    pub fn init(&mut self, descriptors: Vec<PartitionDescriptor>) -> Result<()> {
        let disk_blocks = self.device.block_count();
        let mut seen_ids = std::collections::HashSet::new();
        for d in &descriptors {
            if d.block_size == 0 {
                return Err(CoreError::invalid_parameter("partition block_size must be positive"));
            }
            if d.start_block >= d.end_block {
                return Err(CoreError::new(ErrorCode::FsPartitionId, "partition start_block must be before end_block"));
            }
            if d.end_block > disk_blocks {
                return Err(CoreError::new(ErrorCode::FsPartitionId, "partition extent exceeds disk size"));
            }
            if !seen_ids.insert(d.id) {
                return Err(CoreError::new(ErrorCode::FsPartitionId, "duplicate partition id"));
            }
        }
        self.partitions = descriptors.into_iter().map(|d| (d.id, d)).collect();
        Ok(())
    }

    pub fn partition(&self, id: u32) -> Result<&PartitionDescriptor> {
        self.partitions
            .get(&id)
            .ok_or_else(|| CoreError::new(ErrorCode::FsPartitionId, format!("no partition with id {id}")))
    }

    pub fn device(&self) -> &dyn BlockDevice {
        self.device.as_ref()
    }
}

macro_rules! bitflags_open_mode {
    ($(#[$meta:meta])* pub struct $name:ident: u32 { $(const $flag:ident = $value:expr;)+ }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name(u32);

        impl $name {
            $(pub const $flag: Self = Self($value);)+

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

bitflags_open_mode! {
    pub struct OpenMode: u32 {
        const CREATE = 1 << 0;
        const EXCLUSIVE = 1 << 1;
        const TRUNCATE = 1 << 2;
    }
}

struct OpenFile {
    name: String,
    cursor: u64,
    contents: Vec<u8>,
}

/// Mounted filesystem over one open partition handle. Unmount
/// closes every open file; files stay closed if the owning partition is
/// unmounted while they are held open (no "keep-alive" semantics).
pub struct FilesystemContext {
    partition_id: u32,
    mode: PartitionMode,
    max_open_files: usize,
    mounted: parking_lot::Mutex<bool>,
    files: parking_lot::Mutex<HashMap<u32, OpenFile>>,
    next_handle: std::sync::atomic::AtomicU32,
    storage: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
}

impl FilesystemContext {
    pub fn new(partition_id: u32, mode: PartitionMode, max_open_files: usize) -> Self {
        Self {
            partition_id,
            mode,
            max_open_files,
            mounted: parking_lot::Mutex::new(false),
            files: parking_lot::Mutex::new(HashMap::new()),
            next_handle: std::sync::atomic::AtomicU32::new(1),
            storage: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn mount(&self) -> Result<()> {
        let mut mounted = self.mounted.lock();
        if *mounted {
            return Err(CoreError::new(ErrorCode::FsAlreadyMounted, "partition is already mounted"));
        }
        *mounted = true;
        Ok(())
    }

    /// Unmount, closing every currently open file.
    pub fn unmount(&self) -> Result<()> {
        let mut mounted = self.mounted.lock();
        if !*mounted {
            return Err(CoreError::new(ErrorCode::FsNotMounted, "partition is not mounted"));
        }
        self.files.lock().clear();
        *mounted = false;
        Ok(())
    }

    fn require_mounted(&self) -> Result<()> {
        if !*self.mounted.lock() {
            return Err(CoreError::new(ErrorCode::FsNotMounted, "filesystem is not mounted"));
        }
        Ok(())
    }

    pub fn open(&self, name: &str, mode: OpenMode) -> Result<u32> {
        self.require_mounted()?;
        let mut storage = self.storage.lock();
        let exists = storage.contains_key(name);
        if exists && mode.contains(OpenMode::EXCLUSIVE) && mode.contains(OpenMode::CREATE) {
            return Err(CoreError::new(ErrorCode::FsOpen, "file already exists and CREATE|EXCLUSIVE was requested"));
        }
        if !exists && !mode.contains(OpenMode::CREATE) {
            return Err(CoreError::new(ErrorCode::FsOpen, format!("no file named '{name}'")));
        }
        if !exists {
            storage.insert(name.to_string(), Vec::new());
        } else if mode.contains(OpenMode::TRUNCATE) {
            storage.get_mut(name).unwrap().clear();
        }
        let contents = storage.get(name).cloned().unwrap_or_default();
        drop(storage);

        let mut files = self.files.lock();
        if files.len() >= self.max_open_files {
            return Err(CoreError::new(ErrorCode::FsTooManyOpenFiles, "too many open files on this partition"));
        }
        let handle = self.next_handle.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        files.insert(handle, OpenFile { name: name.to_string(), cursor: 0, contents });
        Ok(handle)
    }

    pub fn read(&self, handle: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.require_mounted()?;
        let mut files = self.files.lock();
        let file = files
            .get_mut(&handle)
            .ok_or_else(|| CoreError::invalid_handle("file handle does not map to an open file"))?;
        if offset > file.contents.len() as u64 {
            return Err(CoreError::new(ErrorCode::FsOffset, "read offset past end of file"));
        }
        let start = offset as usize;
        let n = buf.len().min(file.contents.len() - start);
        buf[..n].copy_from_slice(&file.contents[start..start + n]);
        file.cursor = offset + n as u64;
        Ok(n)
    }

    pub fn write(&self, handle: u32, offset: u64, data: &[u8]) -> Result<usize> {
        self.require_mounted()?;
        if self.mode == PartitionMode::ReadOnly {
            return Err(CoreError::new(ErrorCode::FsOperationDenied, "partition is mounted read-only"));
        }
        let mut files = self.files.lock();
        let file = files
            .get_mut(&handle)
            .ok_or_else(|| CoreError::invalid_handle("file handle does not map to an open file"))?;
        let start = offset as usize;
        if file.contents.len() < start + data.len() {
            file.contents.resize(start + data.len(), 0);
        }
        file.contents[start..start + data.len()].copy_from_slice(data);
        file.cursor = offset + data.len() as u64;
        let name = file.name.clone();
        let contents = file.contents.clone();
        drop(files);
        self.storage.lock().insert(name, contents);
        Ok(data.len())
    }

    pub fn close(&self, handle: u32) -> Result<()> {
        self.require_mounted()?;
        self.files
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| CoreError::invalid_handle("file handle does not map to an open file"))
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    /// Close the partition handle. A still-mounted partition is implicitly
    /// unmounted first (closing every open file along the way); closing an
    /// already-unmounted partition is a no-op.
    pub fn close_partition(&self) -> Result<()> {
        if *self.mounted.lock() {
            self.unmount()?;
        }
        Ok(())
    }
}
