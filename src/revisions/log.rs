//! Durable, append-only revision log.
//!
//! Revisions are written as fixed-framed binary records. Every field is
//! immutable once written except `removed_at`, which occupies a reserved
//! slot in the fixed header so it can be patched in place without rewriting
//! the frame. The payload checksum covers the payload only, so the patch
//! never invalidates it.

use crate::error::{Result, StoreError};
use crate::identity::IdentityAllocator;
use crate::types::{EntityId, PayloadEncoding, Revision, RevisionId, RevisionInput, Timestamp};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the revision log.
const LOG_MAGIC: &[u8; 4] = b"REV\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Flag bit: the `removed_at` slot holds a value.
const FLAG_REMOVED: u8 = 0b0000_0001;

/// Offset of the flags byte within a frame.
const FLAGS_OFFSET: u64 = 5; // magic + version

/// Offset of the reserved `removed_at` slot within a frame.
const REMOVED_AT_OFFSET: u64 = 4 + 1 + 1 + 8 + 8 + 8; // ... + id + entity + added_at

/// Append-only revision log.
pub struct RevisionLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Next revision ID to assign.
    next_id: RwLock<u64>,

    /// Current file size (for appending).
    file_size: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: RwLock<u64>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl RevisionLog {
    /// Default sync interval - sync every 100 writes for balance of
    /// durability and performance.
    const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a revision log with the default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a revision log with a custom sync interval.
    /// - sync_interval = 1: sync every write (safest, slowest)
    /// - sync_interval = 100: sync every 100 writes (good balance)
    /// - sync_interval = 1000: sync every 1000 writes (fastest, least durable)
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let metadata = file.metadata()?;
        let file_size = metadata.len();

        // Recover next ID by scanning if the file has content
        let next_id = if file_size > 0 {
            Self::find_max_id(&file)? + 1
        } else {
            1
        };

        tracing::debug!(path = %path.display(), file_size, next_id, "opened revision log");

        Ok(Self {
            path,
            file: RwLock::new(file),
            next_id: RwLock::new(next_id),
            file_size: RwLock::new(file_size),
            writes_since_sync: RwLock::new(0),
            sync_interval: if sync_interval == 0 { 1 } else { sync_interval },
        })
    }

    /// Append a revision to the log.
    ///
    /// Assigns the revision id, resolves the entity id, and stamps
    /// `added_at` with the current time when absent. Enforces
    /// `entity <= id` and `added_at <= removed_at` with
    /// `ConstraintViolation` before anything is written.
    ///
    /// Returns the revision and the offset where it was written.
    pub fn append(&self, input: RevisionInput) -> Result<(Revision, u64)> {
        let mut file = self.file.write();

        // Assign ID
        let id = RevisionId(*self.next_id.read());

        let entity = IdentityAllocator::assign(input.entity, id)?;
        let added_at = input.added_at.unwrap_or_else(Timestamp::now);

        if let Some(removed_at) = input.removed_at {
            if added_at > removed_at {
                return Err(StoreError::ConstraintViolation(format!(
                    "added_at {:?} exceeds removed_at {:?}",
                    added_at, removed_at
                )));
            }
        }

        // All checks passed; the append can no longer fail validation
        *self.next_id.write() += 1;

        let revision = Revision {
            id,
            entity,
            added_at,
            removed_at: input.removed_at,
            payload: input.payload,
            encoding: input.encoding,
        };

        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        Self::write_revision(&mut file, &revision)?;

        let new_size = file.stream_position()?;
        *self.file_size.write() = new_size;

        self.count_write(&mut file)?;

        Ok((revision, offset))
    }

    /// Patch the `removed_at` slot of the frame at `offset`.
    ///
    /// The slot may be set once and thereafter only moved earlier; a patch
    /// that would loosen the interval, or end it before it starts, fails
    /// with `ConstraintViolation` and leaves the frame untouched.
    pub fn set_removed(&self, offset: u64, at: Timestamp) -> Result<()> {
        let mut file = self.file.write();

        file.seek(SeekFrom::Start(offset + FLAGS_OFFSET))?;
        let mut flags = [0u8; 1];
        file.read_exact(&mut flags)?;
        let flags = flags[0];

        // Skip id + entity to the interval start
        file.seek(SeekFrom::Current(16))?;
        let mut added_bytes = [0u8; 8];
        file.read_exact(&mut added_bytes)?;
        let added_at = i64::from_le_bytes(added_bytes);

        if at.0 < added_at {
            return Err(StoreError::ConstraintViolation(format!(
                "removed_at {:?} precedes added_at {:?}",
                at,
                Timestamp(added_at)
            )));
        }

        if flags & FLAG_REMOVED != 0 {
            let mut current = [0u8; 8];
            file.seek(SeekFrom::Start(offset + REMOVED_AT_OFFSET))?;
            file.read_exact(&mut current)?;
            let current = i64::from_le_bytes(current);
            if at.0 > current {
                return Err(StoreError::ConstraintViolation(format!(
                    "removed_at may only tighten: {:?} is later than {:?}",
                    at,
                    Timestamp(current)
                )));
            }
        }

        file.seek(SeekFrom::Start(offset + FLAGS_OFFSET))?;
        file.write_all(&[flags | FLAG_REMOVED])?;
        file.seek(SeekFrom::Start(offset + REMOVED_AT_OFFSET))?;
        file.write_all(&at.0.to_le_bytes())?;

        self.count_write(&mut file)?;

        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Read the revision at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<Revision> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        Self::read_revision(&mut file)
    }

    /// Iterate all revisions from a given offset.
    pub fn iter_from(&self, offset: u64) -> RevisionIterator<'_> {
        RevisionIterator {
            log: self,
            offset,
            end: *self.file_size.read(),
        }
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync periodically based on sync_interval.
    fn count_write(&self, file: &mut File) -> Result<()> {
        let mut writes = self.writes_since_sync.write();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_all()?;
            *writes = 0;
        }
        Ok(())
    }

    /// Write a revision frame at the file's current position.
    fn write_revision(file: &mut File, revision: &Revision) -> Result<()> {
        // Magic
        file.write_all(LOG_MAGIC)?;

        // Version
        file.write_all(&[LOG_VERSION])?;

        // Flags
        let flags = if revision.removed_at.is_some() {
            FLAG_REMOVED
        } else {
            0
        };
        file.write_all(&[flags])?;

        // Revision ID
        file.write_all(&revision.id.0.to_le_bytes())?;

        // Entity ID
        file.write_all(&revision.entity.0.to_le_bytes())?;

        // Added at
        file.write_all(&revision.added_at.0.to_le_bytes())?;

        // Removed at (reserved slot, valid iff flag set)
        let removed = revision.removed_at.map_or(0, |t| t.0);
        file.write_all(&removed.to_le_bytes())?;

        // Encoding
        let encoding_byte = match revision.encoding {
            PayloadEncoding::Json => 0u8,
            PayloadEncoding::MessagePack => 1u8,
            PayloadEncoding::Raw => 2u8,
        };
        file.write_all(&[encoding_byte])?;

        // Payload
        file.write_all(&(revision.payload.len() as u32).to_le_bytes())?;
        file.write_all(&revision.payload)?;

        // Checksum of the payload
        let checksum = crc32fast::hash(&revision.payload);
        file.write_all(&checksum.to_le_bytes())?;

        Ok(())
    }

    /// Read a revision frame from the file at its current position.
    fn read_revision(file: &mut File) -> Result<Revision> {
        // Magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid revision magic".into()));
        }

        // Version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        // Flags
        let mut flags = [0u8; 1];
        file.read_exact(&mut flags)?;

        // Revision ID
        let mut id_bytes = [0u8; 8];
        file.read_exact(&mut id_bytes)?;
        let id = RevisionId(u64::from_le_bytes(id_bytes));

        // Entity ID
        let mut entity_bytes = [0u8; 8];
        file.read_exact(&mut entity_bytes)?;
        let entity = EntityId(u64::from_le_bytes(entity_bytes));

        // Added at
        let mut added_bytes = [0u8; 8];
        file.read_exact(&mut added_bytes)?;
        let added_at = Timestamp(i64::from_le_bytes(added_bytes));

        // Removed at
        let mut removed_bytes = [0u8; 8];
        file.read_exact(&mut removed_bytes)?;
        let removed_at = if flags[0] & FLAG_REMOVED != 0 {
            Some(Timestamp(i64::from_le_bytes(removed_bytes)))
        } else {
            None
        };

        // Encoding
        let mut encoding_byte = [0u8; 1];
        file.read_exact(&mut encoding_byte)?;
        let encoding = match encoding_byte[0] {
            0 => PayloadEncoding::Json,
            1 => PayloadEncoding::MessagePack,
            _ => PayloadEncoding::Raw,
        };

        // Payload
        let mut payload_len_bytes = [0u8; 4];
        file.read_exact(&mut payload_len_bytes)?;
        let payload_len = u32::from_le_bytes(payload_len_bytes) as usize;
        let mut payload = vec![0u8; payload_len];
        file.read_exact(&mut payload)?;

        // Checksum
        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&payload);

        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(Revision {
            id,
            entity,
            added_at,
            removed_at,
            payload,
            encoding,
        })
    }

    /// Find the maximum revision ID in the log.
    fn find_max_id(file: &File) -> Result<u64> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;

        let mut max_id = 0u64;
        let file_size = file.metadata()?.len();

        while file.stream_position()? < file_size {
            // Read magic
            let mut magic = [0u8; 4];
            if file.read_exact(&mut magic).is_err() {
                break;
            }

            if &magic != LOG_MAGIC {
                break;
            }

            // Skip version and flags
            file.seek(SeekFrom::Current(2))?;

            // Read ID
            let mut id_bytes = [0u8; 8];
            file.read_exact(&mut id_bytes)?;
            let id = u64::from_le_bytes(id_bytes);
            max_id = max_id.max(id);

            // Skip entity(8) + added_at(8) + removed_at(8) + encoding(1)
            file.seek(SeekFrom::Current(25))?;

            // Read payload length, skip payload and checksum
            let mut payload_len_bytes = [0u8; 4];
            file.read_exact(&mut payload_len_bytes)?;
            let payload_len = u32::from_le_bytes(payload_len_bytes) as i64;
            file.seek(SeekFrom::Current(payload_len + 4))?;
        }

        Ok(max_id)
    }
}

/// Iterator over `(offset, Revision)` pairs in the log.
pub struct RevisionIterator<'a> {
    log: &'a RevisionLog,
    offset: u64,
    end: u64,
}

impl Iterator for RevisionIterator<'_> {
    type Item = Result<(u64, Revision)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current_offset = self.offset;
        let mut file = self.log.file.write();

        let result = file
            .seek(SeekFrom::Start(current_offset))
            .map_err(StoreError::from)
            .and_then(|_| RevisionLog::read_revision(&mut file));

        match result {
            Ok(revision) => {
                self.offset = file.stream_position().unwrap_or(self.end);
                Some(Ok((current_offset, revision)))
            }
            Err(e) => {
                self.offset = self.end; // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}
