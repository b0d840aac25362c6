//! # Schema Staging
//!
//! V2Ray does not ship its `.proto` files with release binaries. `sync-protos` copies them out
//! of a source checkout into the schema directory, keeping the source layout so import paths
//! keep resolving.
use anyhow::{Context, Result, bail};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Copies every `*.proto` file below `source` into `dest`, returning how many were copied.
pub fn sync_protos(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        bail!("'{}' is not a directory", source.display());
    }

    fs::create_dir_all(dest).with_context(|| format!("Failed to create '{}'", dest.display()))?;

    // Walk and compare in canonical form, so `.` and `protos` still match `./protos`.
    let source = canonical(source)?;
    let dest = canonical(dest)?;

    let mut copied = 0;
    copy_tree(&source, &source, &dest, &mut copied)?;
    Ok(copied)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Failed to resolve '{}'", path.display()))
}

fn copy_tree(root: &Path, dir: &Path, dest: &Path, copied: &mut usize) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read '{}'", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read '{}'", dir.display()))?;
        let path = entry.path();

        // The schema directory may live inside the checkout.
        if path == dest {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(root, &path, dest, copied)?;
            continue;
        }

        if !file_type.is_file() || path.extension().is_none_or(|ext| ext != "proto") {
            continue;
        }

        let target = dest.join(path.strip_prefix(root)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
        fs::copy(&path, &target)
            .with_context(|| format!("Failed to copy '{}'", path.display()))?;

        debug!(schema = %target.display(), "Staged schema file");
        *copied += 1;
    }

    Ok(())
}
