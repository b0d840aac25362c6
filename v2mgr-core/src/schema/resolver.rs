use protox::file::{File, FileResolver, GoogleFileResolver, IncludeFileResolver};
use std::path::{Path, PathBuf};

/// Imports under this prefix are served by the bundled well-known types and never read
/// from the schema directory.
const RESERVED_PREFIX: &str = "google/";

/// Resolves imports relative to the managed schema directory.
pub(crate) struct SchemaResolver {
    include: IncludeFileResolver,
    well_known: GoogleFileResolver,
}

impl SchemaResolver {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            include: IncludeFileResolver::new(root),
            well_known: GoogleFileResolver::new(),
        }
    }
}

impl FileResolver for SchemaResolver {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        self.include.resolve_path(path)
    }

    fn open_file(&self, name: &str) -> Result<File, protox::Error> {
        if name.starts_with(RESERVED_PREFIX) {
            self.well_known.open_file(name)
        } else {
            self.include.open_file(name)
        }
    }
}
