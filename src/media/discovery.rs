use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{KindFilter, MediaKind};
use crate::error::{Result, CompressifyError};
use crate::profile::ProfileParams;

/// A compressible file found under the input root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the input root
    pub relative: PathBuf,
    pub kind: MediaKind,
    pub size: u64,
}

impl DiscoveredFile {
    /// Destination under `output_root`, extension swapped for the target format
    pub fn destination(&self, output_root: &Path, params: &ProfileParams) -> PathBuf {
        destination_path(output_root, &self.relative, self.kind, params)
    }
}

/// Output path for a source relative to the input root
pub fn destination_path(
    output_root: &Path,
    relative: &Path,
    kind: MediaKind,
    params: &ProfileParams,
) -> PathBuf {
    output_root
        .join(relative)
        .with_extension(kind.target_extension(params))
}

/// Root against which discovered paths are relative
pub fn input_root(input: &Path) -> PathBuf {
    if input.is_file() {
        input.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        input.to_path_buf()
    }
}

/// List eligible files under `input` sorted by relative path
pub fn discover_files(input: &Path, filter: KindFilter) -> Result<Vec<DiscoveredFile>> {
    if !input.exists() {
        return Err(CompressifyError::InvalidInput(format!(
            "Input path does not exist: {}",
            input.display()
        )));
    }

    let root = input_root(input);
    let mut files = Vec::new();

    for entry in WalkDir::new(input).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", input.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(kind) = MediaKind::detect(path) else {
            continue;
        };
        if !filter.accepts(kind) {
            continue;
        }

        let relative = pathdiff::diff_paths(path, &root)
            .unwrap_or_else(|| PathBuf::from(entry.file_name()));
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(DiscoveredFile { relative, kind, size });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    debug!("Discovered {} eligible files under {}", files.len(), input.display());
    Ok(files)
}
