//! Disk persistence for HNSW graphs.
//!
//! Snapshots are written with the [`codec`](super::codec) layout. File writes go to a
//! temp file that is renamed over the target, so a crash mid-save never leaves a
//! half-written snapshot under the final name.

use crate::error::Result;
use crate::hnsw::distance::DistanceKind;
use crate::hnsw::graph::HnswGraph;
use crate::storage::codec;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Write a snapshot of `graph` to `writer`. Returns the number of bytes written.
pub fn save_to_writer<W: Write>(graph: &HnswGraph, mut writer: W) -> Result<usize> {
    let bytes = codec::encode(graph);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(bytes.len())
}

/// Read a snapshot from `reader` and rebuild the graph.
pub fn load_from_reader<R: Read>(
    mut reader: R,
    kind: DistanceKind,
    dimension: usize,
) -> Result<HnswGraph> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    codec::decode(&bytes, kind, dimension)
}

/// Save `graph` to `path` atomically (temp file + fsync + rename).
pub fn save_graph(graph: &HnswGraph, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let bytes = codec::encode(graph);
    if let Err(e) = write_and_rename(tmp_path, path, &bytes) {
        let _ = fs::remove_file(tmp_path);
        tracing::warn!("Failed to save index to {:?}: {}", path, e);
        return Err(e);
    }

    tracing::info!(
        "Saved index to {:?} ({} points, {} bytes)",
        path,
        graph.len(),
        bytes.len()
    );
    Ok(())
}

fn write_and_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Load a graph from `path`, validating it against `kind` and `dimension`.
pub fn load_graph(path: &Path, kind: DistanceKind, dimension: usize) -> Result<HnswGraph> {
    let bytes = fs::read(path)?;
    let graph = codec::decode(&bytes, kind, dimension)?;
    tracing::info!(
        "Loaded index from {:?} ({} points, {} bytes)",
        path,
        graph.len(),
        bytes.len()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HnswError;
    use crate::hnsw::graph::HnswParams;

    fn graph() -> HnswGraph {
        let g = HnswGraph::new(DistanceKind::InnerProduct, 2, HnswParams::with_capacity(8)).unwrap();
        g.insert(&[1.0, 0.0], 1).unwrap();
        g.insert(&[0.0, 1.0], 2).unwrap();
        g
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.hnsw");
        save_graph(&graph(), &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("index.hnsw.tmp").exists());

        let back = load_graph(&path, DistanceKind::InnerProduct, 2).unwrap();
        assert_eq!(back.labels(), vec![1, 2]);
        assert_eq!(back.get_vector(2).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_writer_reader_round_trip() {
        let mut buf = Vec::new();
        let written = save_to_writer(&graph(), &mut buf).unwrap();
        assert_eq!(written, buf.len());
        let back = load_from_reader(buf.as_slice(), DistanceKind::InnerProduct, 2).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_graph(&dir.path().join("absent"), DistanceKind::Euclidean, 2).unwrap_err();
        assert!(matches!(err, HnswError::Io(_)));
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // renaming a file over a non-empty directory fails
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();

        assert!(matches!(save_graph(&graph(), &target), Err(HnswError::Io(_))));
        assert!(!dir.path().join("occupied.tmp").exists());
        assert!(target.join("keep").exists());
    }
}
