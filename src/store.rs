//! Main Store struct tying all components together.

use crate::attribution::{Actor, AttributionHook};
use crate::error::{Result, StoreError};
use crate::revisions::{RevisionIndex, RevisionLog};
use crate::snapshot::SnapshotView;
use crate::supersede::SupersessionResolver;
use crate::types::{EntityId, Revision, RevisionId, RevisionInput, StoreStats, Timestamp};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do when an insert supplies an entity id that already has an
/// active revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Treat the insert as a logical update: the new revision supersedes
    /// the active one. The documented insert-or-replace behavior.
    #[default]
    AllowAsUpdate,
    /// Fail with `DuplicateIdentifier`.
    Reject,
}

/// What to do when an update supplies a different entity id than the one
/// being updated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IdentityChangePolicy {
    /// Close the old entity's active revision at now, then insert under the
    /// new identity. Semantically unusual but permitted.
    #[default]
    Allow,
    /// Fail with `IdentityChangeRejected`.
    Reject,
}

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store directory.
    pub path: PathBuf,

    /// Fsync the log every N writes.
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Policy for explicit entity ids colliding with an active revision.
    pub on_duplicate_identifier: DuplicatePolicy,

    /// Policy for identity changes during update.
    pub on_identity_change: IdentityChangePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./revlog"),
            sync_interval: 100,
            create_if_missing: true,
            on_duplicate_identifier: DuplicatePolicy::default(),
            on_identity_change: IdentityChangePolicy::default(),
        }
    }
}

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"RVL\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Per-entity mutation locks.
///
/// Append + resolve for one entity must be serialized; writers of different
/// entities share nothing and proceed in parallel.
struct EntityLocks {
    inner: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn for_entity(&self, entity: EntityId) -> Arc<Mutex<()>> {
        Arc::clone(self.inner.lock().entry(entity).or_default())
    }
}

/// The main revision store.
///
/// Provides a unified interface for:
/// - Appending revisions to the log
/// - Insert/Update/Delete over logical entities
/// - Point-in-time queries at past, present, or future instants
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Revision log (shared with the resolver and snapshot views).
    log: Arc<RevisionLog>,

    /// Revision index, rebuilt from the log on open.
    index: Arc<RevisionIndex>,

    /// Supersession resolver.
    resolver: SupersessionResolver,

    /// Per-entity mutation locks.
    locks: EntityLocks,

    /// Optional attribution hook, invoked post-commit for mutations that
    /// carry an actor.
    attribution: RwLock<Option<Arc<dyn AttributionHook>>>,
}

impl Store {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;

        Self::write_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;

        let log = Arc::new(RevisionLog::open_with_sync_interval(
            config.path.join("revisions.log"),
            config.sync_interval,
        )?);
        let index = Arc::new(RevisionIndex::new());
        let resolver = SupersessionResolver::new(Arc::clone(&log), Arc::clone(&index));

        tracing::debug!(path = %config.path.display(), "created store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            resolver,
            locks: EntityLocks::new(),
            attribution: RwLock::new(None),
        })
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;

        let log = Arc::new(RevisionLog::open_with_sync_interval(
            config.path.join("revisions.log"),
            config.sync_interval,
        )?);
        let index = Arc::new(RevisionIndex::new());

        // Rebuild the index from the log (not persisted separately)
        for result in log.iter_from(0) {
            let (offset, revision) = result?;
            index.add(
                revision.id,
                revision.entity,
                revision.added_at,
                revision.removed_at,
                offset,
            );
        }

        let resolver = SupersessionResolver::new(Arc::clone(&log), Arc::clone(&index));

        tracing::debug!(
            path = %config.path.display(),
            revisions = index.count(),
            entities = index.entity_count(),
            "opened store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            resolver,
            locks: EntityLocks::new(),
            attribution: RwLock::new(None),
        })
    }

    /// Install the attribution hook. Replaces any previous hook.
    pub fn set_attribution(&self, hook: Arc<dyn AttributionHook>) {
        *self.attribution.write() = Some(hook);
    }

    // --- Mutations ---

    /// Append a revision: allocate identity, write to the log, resolve
    /// supersession. The low-level operation every facade mutation maps to.
    ///
    /// Fails with `ConstraintViolation` if an explicit entity id exceeds the
    /// assigned revision id, or if `removed_at` (when supplied directly,
    /// which normal callers never do) precedes `added_at`.
    pub fn append(&self, input: RevisionInput) -> Result<Revision> {
        match input.entity {
            Some(entity) => {
                let lock = self.locks.for_entity(entity);
                let _guard = lock.lock();
                self.append_under_lock(input)
            }
            None => {
                // Fresh entity: nobody can contend for its id before we
                // return it, so append first, then take the entity lock for
                // index registration and resolve.
                let mut input = input;
                let actor = input.actor.take();
                let (revision, offset) = self.log.append(input)?;
                let lock = self.locks.for_entity(revision.entity);
                let _guard = lock.lock();
                self.commit_appended(revision, offset, actor)
            }
        }
    }

    /// Insert a revision (conventional "create a row").
    ///
    /// With an explicit entity id that already has an active revision, the
    /// configured `DuplicatePolicy` decides between insert-or-replace
    /// (default) and rejection.
    pub fn insert(&self, input: RevisionInput) -> Result<Revision> {
        if let Some(entity) = input.entity {
            if self.config.on_duplicate_identifier == DuplicatePolicy::Reject {
                let mut input = input;
                // Pin the effective instant so the collision check and the
                // append agree on it.
                let added_at = *input.added_at.get_or_insert_with(Timestamp::now);

                let lock = self.locks.for_entity(entity);
                let _guard = lock.lock();
                if self.index.active_at(entity, added_at)?.is_some() {
                    return Err(StoreError::DuplicateIdentifier(entity));
                }
                return self.append_under_lock(input);
            }
        }
        self.append(input)
    }

    /// Update an entity (conventional "modify a row").
    ///
    /// When `input.entity` is absent or equal to `entity`, this is exactly
    /// an insert under `entity`: the resolver closes the prior active
    /// revision automatically. A differing `input.entity` changes the
    /// entity's identity — the old identity's active revision is closed
    /// explicitly (the resolver only links revisions sharing an entity id)
    /// before inserting under the new one, subject to the configured
    /// `IdentityChangePolicy`.
    pub fn update(&self, entity: EntityId, input: RevisionInput) -> Result<Revision> {
        match input.entity {
            None => {
                let input = input.with_entity(entity);
                self.append(input)
            }
            Some(target) if target == entity => self.append(input),
            Some(target) => {
                if self.config.on_identity_change == IdentityChangePolicy::Reject {
                    return Err(StoreError::IdentityChangeRejected {
                        from: entity,
                        to: target,
                    });
                }
                let actor = input.actor.clone();
                self.close_active(entity, actor.as_ref())?;
                self.append(input)
            }
        }
    }

    /// Delete an entity: close its active revision at now.
    ///
    /// A logical delete — history is retained, and a later insert can make
    /// the entity visible again. Returns the closed revision, or `None`
    /// when nothing was active (a no-op).
    pub fn delete(&self, entity: EntityId) -> Result<Option<Revision>> {
        self.close_active(entity, None)
    }

    /// Delete with an actor context for the attribution hook.
    pub fn delete_with_actor(&self, entity: EntityId, actor: &Actor) -> Result<Option<Revision>> {
        self.close_active(entity, Some(actor))
    }

    fn close_active(&self, entity: EntityId, actor: Option<&Actor>) -> Result<Option<Revision>> {
        let lock = self.locks.for_entity(entity);
        let _guard = lock.lock();

        let now = Timestamp::now();
        let id = match self.index.active_at(entity, now)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let offset = self
            .index
            .offset_of(id)
            .ok_or(StoreError::RevisionNotFound(id))?;
        self.log.set_removed(offset, now)?;
        self.index.set_removed(entity, id, now);

        tracing::debug!(%entity, revision = %id, removed_at = now.0, "deleted entity");

        if let Some(actor) = actor {
            if let Some(hook) = self.attribution.read().as_ref() {
                hook.revision_closed(id, actor);
            }
        }

        Ok(Some(self.log.read_at(offset)?))
    }

    fn append_under_lock(&self, mut input: RevisionInput) -> Result<Revision> {
        let actor = input.actor.take();
        let (revision, offset) = self.log.append(input)?;
        self.commit_appended(revision, offset, actor)
    }

    /// Index the appended revision, resolve supersession, fire the hook.
    /// Caller holds the entity lock.
    fn commit_appended(
        &self,
        revision: Revision,
        offset: u64,
        actor: Option<Actor>,
    ) -> Result<Revision> {
        self.index.add(
            revision.id,
            revision.entity,
            revision.added_at,
            revision.removed_at,
            offset,
        );

        let tightened = self.resolver.resolve(revision.entity)?;

        tracing::debug!(
            revision = %revision.id,
            entity = %revision.entity,
            added_at = revision.added_at.0,
            superseded = tightened.len(),
            "appended revision"
        );

        if let Some(actor) = actor {
            if let Some(hook) = self.attribution.read().as_ref() {
                hook.revision_opened(revision.id, &actor);
                for (id, _) in &tightened {
                    hook.revision_closed(*id, &actor);
                }
            }
        }

        // The resolver may have tightened the new revision itself (insert
        // between two existing revisions); report the stored state.
        let offset = self
            .index
            .offset_of(revision.id)
            .ok_or(StoreError::RevisionNotFound(revision.id))?;
        self.log.read_at(offset)
    }

    // --- Reads ---

    /// Get a revision by ID.
    pub fn revision(&self, id: RevisionId) -> Result<Option<Revision>> {
        match self.index.offset_of(id) {
            Some(offset) => Ok(Some(self.log.read_at(offset)?)),
            None => Ok(None),
        }
    }

    /// All revisions of an entity, by revision id ascending.
    pub fn revisions_of(&self, entity: EntityId) -> Result<Vec<Revision>> {
        let mut ids: Vec<RevisionId> = self.index.timeline(entity).iter().map(|e| e.id).collect();
        ids.sort();

        let mut revisions = Vec::with_capacity(ids.len());
        for id in ids {
            let offset = self
                .index
                .offset_of(id)
                .ok_or(StoreError::RevisionNotFound(id))?;
            revisions.push(self.log.read_at(offset)?);
        }
        Ok(revisions)
    }

    /// A read-only point-in-time view of the store.
    pub fn snapshot(&self) -> SnapshotView {
        SnapshotView::new(Arc::clone(&self.log), Arc::clone(&self.index))
    }

    /// The active revision of every entity at `at`.
    pub fn as_of(&self, at: Timestamp) -> Result<BTreeMap<EntityId, Revision>> {
        self.snapshot().as_of(at)
    }

    /// The active revision of one entity at `at`, if any.
    pub fn entity_as_of(&self, entity: EntityId, at: Timestamp) -> Result<Option<Revision>> {
        self.snapshot().entity_as_of(entity, at)
    }

    /// The active revision of every entity right now.
    pub fn current(&self) -> Result<BTreeMap<EntityId, Revision>> {
        self.snapshot().current()
    }

    // --- Maintenance ---

    /// Store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            revision_count: self.index.count() as u64,
            entity_count: self.index.entity_count() as u64,
            log_size_bytes: self.log.size(),
        }
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Store Files ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
