use crate::config::NODE_CACHE_VERSION;
use crate::minter::{NodeKind, NodeTable};
use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{info, warn};

#[derive(Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,
    pub node_count: usize,
}

#[derive(Deserialize)]
struct NodeCacheDe {
    metadata: CacheMetadata,
    nodes: Vec<(NodeKind, String, Vec<u8>)>,
}

#[derive(Serialize)]
struct NodeCacheSer<'a> {
    metadata: CacheMetadata,
    nodes: Vec<(NodeKind, &'a str, &'a [u8])>,
}

/// Returns `Ok(Some(table))` if the file holds a current cache, `Ok(None)` if
/// it is missing, corrupt or from another format version.
pub fn try_load(path: &Path) -> Result<Option<NodeTable>> {
    if !path.exists() {
        return Ok(None);
    }

    let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let file = File::open(path)
        .with_context(|| format!("Failed to open node cache: {:?}", path))?;
    let reader = BufReader::with_capacity(256 * 1024, file);

    let options = bincode::options().with_limit(file_size.saturating_add(1024));

    let cache: NodeCacheDe = match options.deserialize_from(reader) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, path = ?path, "Node cache is corrupt or unreadable");
            return Ok(None);
        }
    };

    if cache.metadata.version != NODE_CACHE_VERSION {
        info!(
            cached = cache.metadata.version,
            current = NODE_CACHE_VERSION,
            "Node cache version mismatch"
        );
        return Ok(None);
    }

    let table: NodeTable = cache
        .nodes
        .into_iter()
        .map(|(kind, id, content)| ((kind, id), content))
        .collect();
    info!(nodes = table.len(), path = ?path, "Node cache loaded");

    Ok(Some(table))
}

/// Writes the cache atomically via a temp file and rename.
pub fn save(table: &NodeTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let mut nodes: Vec<_> = table
        .iter()
        .map(|((kind, id), content)| (*kind, id.as_str(), content.as_slice()))
        .collect();
    nodes.sort_unstable_by(|a, b| (a.0.name(), a.1).cmp(&(b.0.name(), b.1)));

    let snapshot = NodeCacheSer {
        metadata: CacheMetadata {
            version: NODE_CACHE_VERSION,
            node_count: nodes.len(),
        },
        nodes,
    };

    let tmp_path = path.with_extension("tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp cache file: {:?}", tmp_path))?;
    let writer = BufWriter::new(file);

    bincode::DefaultOptions::new()
        .serialize_into(writer, &snapshot)
        .context("Failed to serialize node cache")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename temp cache file to: {:?}", path))?;

    info!(nodes = snapshot.metadata.node_count, path = ?path, "Node cache saved");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minter::{LocalCache, NodeCache};
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_table() -> NodeTable {
        let mut cache = LocalCache::new();
        cache.register(NodeKind::Reference, "r1", b"one").unwrap();
        cache.register(NodeKind::Value, "v1", b"two").unwrap();
        cache.into_table()
    }

    #[test]
    fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(try_load(&dir.path().join("nodes.cache")).unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.cache");
        save(&sample_table(), &path).unwrap();

        let mut loaded = LocalCache::from_table(try_load(&path).unwrap().unwrap());
        assert_eq!(loaded.len(), 2);
        assert!(loaded.register(NodeKind::Reference, "r1", b"one").is_ok());
        assert!(loaded.register(NodeKind::Reference, "r1", b"changed").is_err());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.cache");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"not valid bincode data").unwrap();

        assert!(try_load(&path).unwrap().is_none());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("nodes.cache");
        save(&sample_table(), &path).unwrap();
        assert!(path.exists());
    }
}
