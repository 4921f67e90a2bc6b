//! File-backed persistent tier
//!
//! One JSON file per record:
//!
//! ```text
//! <root>/entities/<id>.json
//! <root>/relationships/<id>.json
//! ```
//!
//! # Crash Safety
//!
//! Every put follows the write-fsync-rename pattern:
//! 1. Write to a temporary file (`.{id}.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to the final path
//! 4. fsync the parent directory (unix)
//!
//! Either the complete record exists or it doesn't; a partially written
//! record is never visible.
//!
//! # Type index
//!
//! An in-memory `type → ids` index is rebuilt by scanning on open and
//! maintained on every put/delete. `query_entities` resolves the type
//! filter through it and post-filters everything else client-side.

use parking_lot::RwLock;
use recon_core::{
    BaseEntity, EntityId, PersistentBackend, QueryOptions, RecondbError, Relationship,
    RelationshipId, Result,
};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ENTITIES_DIR: &str = "entities";
const RELATIONSHIPS_DIR: &str = "relationships";

/// File-per-record persistent backend
pub struct FileBackend {
    root: PathBuf,
    /// type → ids, rebuilt on open, maintained on put/delete
    type_index: RwLock<HashMap<String, HashSet<EntityId>>>,
    /// id → type, so deletes and type changes can fix the index
    entity_types: RwLock<HashMap<EntityId, String>>,
}

impl FileBackend {
    /// Open (or create) a file backend rooted at the given directory
    ///
    /// Scans the entities directory to rebuild the type index. Records
    /// that fail to parse are skipped with a warning rather than
    /// poisoning the open.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(ENTITIES_DIR))?;
        fs::create_dir_all(root.join(RELATIONSHIPS_DIR))?;

        let backend = Self {
            root,
            type_index: RwLock::new(HashMap::new()),
            entity_types: RwLock::new(HashMap::new()),
        };
        backend.rebuild_index()?;
        info!(
            root = %backend.root.display(),
            entities = backend.entity_types.read().len(),
            "opened file backend"
        );
        Ok(backend)
    }

    fn rebuild_index(&self) -> Result<()> {
        let mut type_index: HashMap<String, HashSet<EntityId>> = HashMap::new();
        let mut entity_types: HashMap<EntityId, String> = HashMap::new();

        for entry in fs::read_dir(self.root.join(ENTITIES_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record::<BaseEntity>(&path) {
                Ok(entity) => {
                    type_index
                        .entry(entity.entity_type.clone())
                        .or_default()
                        .insert(entity.id);
                    entity_types.insert(entity.id, entity.entity_type);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }

        *self.type_index.write() = type_index;
        *self.entity_types.write() = entity_types;
        Ok(())
    }

    fn entity_path(&self, id: &EntityId) -> PathBuf {
        self.root.join(ENTITIES_DIR).join(format!("{}.json", id))
    }

    fn relationship_path(&self, id: &RelationshipId) -> PathBuf {
        self.root
            .join(RELATIONSHIPS_DIR)
            .join(format!("{}.json", id))
    }

    /// Crash-safe single-record write: temp file, fsync, atomic rename
    fn write_record<T: serde::Serialize>(path: &Path, record: &T) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| RecondbError::storage("record path has no parent"))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RecondbError::storage("record path has no file name"))?;
        let temp_path = parent.join(format!(".{}.tmp", file_name));

        let bytes = serde_json::to_vec_pretty(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;

        #[cfg(unix)]
        File::open(parent)?.sync_all()?;

        Ok(())
    }

    fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn remove_record(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl PersistentBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn put_entity(&self, entity: &BaseEntity) -> Result<()> {
        Self::write_record(&self.entity_path(&entity.id), entity)?;

        let mut entity_types = self.entity_types.write();
        let mut type_index = self.type_index.write();
        if let Some(old_type) = entity_types.insert(entity.id, entity.entity_type.clone()) {
            if old_type != entity.entity_type {
                if let Some(ids) = type_index.get_mut(&old_type) {
                    ids.remove(&entity.id);
                }
            }
        }
        type_index
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(entity.id);

        debug!(id = %entity.id, "persisted entity record");
        Ok(())
    }

    fn get_entity(&self, id: &EntityId) -> Result<BaseEntity> {
        let path = self.entity_path(id);
        if !path.exists() {
            return Err(RecondbError::NotFound(*id));
        }
        Self::read_record(&path)
    }

    fn delete_entity(&self, id: &EntityId) -> Result<()> {
        Self::remove_record(&self.entity_path(id))?;
        let mut entity_types = self.entity_types.write();
        if let Some(old_type) = entity_types.remove(id) {
            if let Some(ids) = self.type_index.write().get_mut(&old_type) {
                ids.remove(id);
            }
        }
        Ok(())
    }

    fn contains_entity(&self, id: &EntityId) -> Result<bool> {
        Ok(self.entity_types.read().contains_key(id))
    }

    fn query_entities(&self, options: &QueryOptions) -> Result<Vec<BaseEntity>> {
        // Resolve the type filter through the index, then read and
        // post-filter the candidates.
        let candidate_ids: Vec<EntityId> = {
            let type_index = self.type_index.read();
            if options.types.is_empty() {
                self.entity_types.read().keys().copied().collect()
            } else {
                options
                    .types
                    .iter()
                    .filter_map(|t| type_index.get(t))
                    .flat_map(|ids| ids.iter().copied())
                    .collect()
            }
        };

        let mut candidates = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            match self.get_entity(&id) {
                Ok(entity) => candidates.push(entity),
                // Index raced a concurrent delete; treat as absent.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(options.apply(candidates))
    }

    fn entity_count(&self) -> Result<usize> {
        Ok(self.entity_types.read().len())
    }

    fn put_relationship(&self, relationship: &Relationship) -> Result<()> {
        Self::write_record(&self.relationship_path(&relationship.id), relationship)?;
        debug!(id = %relationship.id, "persisted relationship record");
        Ok(())
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        let path = self.relationship_path(id);
        if !path.exists() {
            return Err(RecondbError::RelationshipNotFound(*id));
        }
        Self::read_record(&path)
    }

    fn delete_relationship(&self, id: &RelationshipId) -> Result<()> {
        Self::remove_record(&self.relationship_path(id))?;
        Ok(())
    }

    fn relationships_for(&self, id: &EntityId) -> Result<Vec<Relationship>> {
        let mut found: Vec<Relationship> = self
            .list_relationships()?
            .into_iter()
            .filter(|r| r.touches(id))
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    fn list_relationships(&self) -> Result<Vec<Relationship>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(self.root.join(RELATIONSHIPS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            found.push(Self::read_record(&path)?);
        }
        found.sort_by_key(|r: &Relationship| r.id);
        Ok(found)
    }

    fn flush(&self) -> Result<()> {
        // Every put already fsyncs before returning.
        Ok(())
    }
}
