//! # Registry
//!
//! [`SchemaRegistry`] is an append-only namespace of descriptors keyed by fully qualified
//! names (e.g. `v2ray.core.app.stats.command.StatsService`).
//!
//! ## Loading model
//!
//! * Files are compiled outside of any lock, then merged into a staged copy of the pool.
//!   The copy only replaces the live pool once the merge succeeded, so a broken file never
//!   leaves the registry half populated.
//! * Files already present in the pool (shared imports, redundant lazy loads) are skipped,
//!   which makes loading idempotent per file.
//! * Descriptors handed out earlier keep pointing at the snapshot they were resolved from,
//!   so later loads never invalidate them.
use super::resolver::SchemaResolver;
use prost_reflect::{DescriptorError, DescriptorPool, MessageDescriptor, ServiceDescriptor};
use prost_types::FileDescriptorSet;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::debug;

/// Errors raised while loading schema files or resolving names.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to compile schema file '{path}': '{source}'")]
    Compile {
        path: String,
        #[source]
        source: Box<protox::Error>,
    },
    #[error("Failed to merge schema file '{path}' into the registry: '{source}'")]
    Merge {
        path: String,
        #[source]
        source: DescriptorError,
    },
    #[error("Message type '{0}' not found")]
    TypeNotFound(String),
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
}

#[derive(Debug)]
struct RegistryState {
    pool: DescriptorPool,
    loaded: BTreeSet<String>,
}

/// A lazily populated registry of protobuf descriptors backed by a schema directory.
///
/// The registry is shared behind an `Arc` by every client and codec of a manager. Lookups
/// only take a read lock and clone cheap descriptor handles.
#[derive(Debug)]
pub struct SchemaRegistry {
    root: PathBuf,
    state: RwLock<RegistryState>,
}

impl SchemaRegistry {
    /// Creates an empty registry resolving schema files relative to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: RwLock::new(RegistryState {
                pool: DescriptorPool::new(),
                loaded: BTreeSet::new(),
            }),
        }
    }

    /// The schema directory this registry reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compiles a schema file (relative to the root) and merges its declarations, along with
    /// every file it imports, into the registry.
    ///
    /// Loading the same file again is a no-op.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The file's types and services are now resolvable.
    /// * `Err(SchemaError)` - The file could not be read, parsed or linked. The registry is left
    ///   exactly as it was before the call.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let name = schema_name(path.as_ref());

        if self.read().loaded.contains(&name) {
            debug!(schema = %name, "Schema file already loaded");
            return Ok(());
        }

        let files = compile(&self.root, &name)?;

        let mut state = self.write();
        let mut staged = state.pool.clone();

        let fresh: Vec<_> = files
            .file
            .into_iter()
            .filter(|file| staged.get_file_by_name(file.name()).is_none())
            .collect();
        let added = fresh.len();

        staged
            .add_file_descriptor_protos(fresh)
            .map_err(|source| SchemaError::Merge {
                path: name.clone(),
                source,
            })?;

        state.pool = staged;
        state.loaded.insert(name.clone());

        debug!(schema = %name, added, "Loaded schema file");

        Ok(())
    }

    /// Returns `true` if `path` was loaded explicitly through [`SchemaRegistry::load`].
    pub fn is_loaded(&self, path: impl AsRef<Path>) -> bool {
        self.read().loaded.contains(&schema_name(path.as_ref()))
    }

    /// Schema files loaded explicitly so far, in lexical order.
    pub fn loaded_files(&self) -> Vec<String> {
        self.read().loaded.iter().cloned().collect()
    }

    /// Fully qualified names of every message type currently resolvable, in lexical order.
    pub fn message_names(&self) -> BTreeSet<String> {
        self.read()
            .pool
            .all_messages()
            .map(|m| m.full_name().to_string())
            .collect()
    }

    /// A snapshot of the current descriptor pool.
    pub fn descriptor_pool(&self) -> DescriptorPool {
        self.read().pool.clone()
    }

    /// Looks up a message type by its fully qualified name (e.g. `v2ray.core.common.protocol.User`).
    pub fn lookup_type(&self, name: &str) -> Result<MessageDescriptor, SchemaError> {
        self.read()
            .pool
            .get_message_by_name(name)
            .ok_or_else(|| SchemaError::TypeNotFound(name.to_string()))
    }

    /// Looks up a service by its fully qualified name (e.g. `v2ray.core.app.stats.command.StatsService`).
    pub fn lookup_service(&self, name: &str) -> Result<ServiceDescriptor, SchemaError> {
        self.read()
            .pool
            .get_service_by_name(name)
            .ok_or_else(|| SchemaError::ServiceNotFound(name.to_string()))
    }

    /// Looks up a message type, loading `schema_file` first if the type is not known yet.
    pub fn resolve_type(
        &self,
        name: &str,
        schema_file: Option<&str>,
    ) -> Result<MessageDescriptor, SchemaError> {
        match (self.lookup_type(name), schema_file) {
            (Err(SchemaError::TypeNotFound(_)), Some(file)) => {
                self.load(file)?;
                self.lookup_type(name)
            }
            (result, _) => result,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn compile(root: &Path, name: &str) -> Result<FileDescriptorSet, SchemaError> {
    let mut compiler = protox::Compiler::with_file_resolver(SchemaResolver::new(root.to_path_buf()));
    compiler.include_imports(true);
    compiler
        .open_file(name)
        .map_err(|source| SchemaError::Compile {
            path: name.to_string(),
            source: Box::new(source),
        })?;

    Ok(compiler.file_descriptor_set())
}

/// Normalizes a schema path into the slash-separated form protobuf imports use.
fn schema_name(path: &Path) -> String {
    let name = path.to_string_lossy().replace('\\', "/");
    name.trim_start_matches("./").to_string()
}
