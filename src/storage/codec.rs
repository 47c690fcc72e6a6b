//! Binary snapshot codec.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "HNSW" | u32 version | u32 dimension | u8 distance tag | u64 max_elements
//! u32 M | u32 ef_construction | u64 seed | u64 count | u32 entry point | u32 top layer
//! count × { dimension × f32 vector | u32 level | (level + 1) × { u32 n | n × u32 id } }
//! u64 n_labels | n_labels × { u64 label | u32 id }
//! "HCRC" | u32 CRC32 of everything above
//! ```
//!
//! Decoding checks every length against the bytes that remain before allocating or
//! reading, so a damaged snapshot yields `CorruptFormat` instead of a panic or an
//! oversized allocation. Adjacency lists are restored verbatim.

use crate::config;
use crate::error::{HnswError, Result};
use crate::hnsw::arena::Node;
use crate::hnsw::distance::DistanceKind;
use crate::hnsw::graph::{EntryPoint, HnswGraph, HnswParams};

/// Entry point marker for an empty graph.
const NO_ENTRY_POINT: u32 = u32::MAX;

/// Size of the CRC footer: magic + u32.
const FOOTER_LEN: usize = 8;

/// Serialize `graph` into a self-contained byte buffer.
///
/// Allocation is blocked for the duration, so every id below the recorded count is
/// present. Lists still being wired by in-flight insertions are captured as they
/// stand at the moment each one is read.
pub fn encode(graph: &HnswGraph) -> Vec<u8> {
    let frozen = graph.labels.freeze();
    let params = graph.params();
    let dim = graph.dimension();
    let count = graph.arena.len();
    // The first insert stores its node before publishing it as the entry point
    let entry = graph.entry_point().or_else(|| highest_node(graph));

    let mut buf = Vec::with_capacity(64 + count * (dim * 4 + 4 + graph.max_links(0) * 4 + 16));
    buf.extend_from_slice(config::SNAPSHOT_MAGIC);
    put_u32(&mut buf, config::SNAPSHOT_VERSION);
    put_u32(&mut buf, dim as u32);
    buf.push(graph.kind().tag());
    put_u64(&mut buf, params.max_elements as u64);
    put_u32(&mut buf, params.m as u32);
    put_u32(&mut buf, params.ef_construction as u32);
    put_u64(&mut buf, params.seed);
    put_u64(&mut buf, count as u64);
    put_u32(&mut buf, entry.map_or(NO_ENTRY_POINT, |e| e.id));
    put_u32(&mut buf, entry.map_or(0, |e| e.level as u32));

    let mut list = Vec::new();
    for (id, node) in graph.arena.iter() {
        for &x in node.vector.iter() {
            buf.extend_from_slice(&x.to_le_bytes());
        }
        put_u32(&mut buf, node.level() as u32);
        for layer in 0..=node.level() {
            graph.arena.neighbors_into(id, layer, &mut list);
            put_u32(&mut buf, list.len() as u32);
            for &n in &list {
                put_u32(&mut buf, n);
            }
        }
    }

    let mut table: Vec<(u64, u32)> = frozen.iter().map(|(&l, &id)| (l, id)).collect();
    table.sort_unstable_by_key(|&(_, id)| id);
    put_u64(&mut buf, table.len() as u64);
    for (label, id) in table {
        put_u64(&mut buf, label);
        put_u32(&mut buf, id);
    }
    drop(frozen);

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(config::SNAPSHOT_CRC_MAGIC);
    put_u32(&mut buf, crc);
    buf
}

/// The node on the highest layer, lowest id first.
fn highest_node(graph: &HnswGraph) -> Option<EntryPoint> {
    graph
        .arena
        .iter()
        .map(|(id, node)| EntryPoint {
            id,
            level: node.level(),
        })
        .fold(None, |best: Option<EntryPoint>, e| match best {
            Some(b) if b.level >= e.level => Some(b),
            _ => Some(e),
        })
}

/// Rebuild a graph from `bytes`, checking it against the caller's metric and dimension.
pub fn decode(bytes: &[u8], kind: DistanceKind, dimension: usize) -> Result<HnswGraph> {
    let payload = verify_footer(bytes)?;
    let mut r = ByteReader::new(payload);

    let magic = r.take(4)?;
    if magic != config::SNAPSHOT_MAGIC {
        return Err(HnswError::corrupt("bad magic bytes"));
    }
    let version = r.u32()?;
    if version != config::SNAPSHOT_VERSION {
        return Err(HnswError::corrupt(format!(
            "unsupported version {version}, expected {}",
            config::SNAPSHOT_VERSION
        )));
    }
    let stored_dim = r.u32()? as usize;
    if stored_dim != dimension {
        return Err(HnswError::corrupt(format!(
            "snapshot dimension {stored_dim} != index dimension {dimension}"
        )));
    }
    let tag = r.u8()?;
    if tag != kind.tag() {
        return Err(HnswError::corrupt(format!(
            "snapshot distance tag {tag} != index distance {} ({})",
            kind.name(),
            kind.tag()
        )));
    }

    let params = HnswParams {
        max_elements: r.len_field("max_elements")?,
        m: r.u32()? as usize,
        ef_construction: r.u32()? as usize,
        seed: r.u64()?,
    };
    params
        .validate()
        .map_err(|e| HnswError::corrupt(format!("bad parameters: {e}")))?;

    let count = r.len_field("count")?;
    if count > params.max_elements {
        return Err(HnswError::corrupt(format!(
            "count {count} exceeds max_elements {}",
            params.max_elements
        )));
    }
    // Smallest possible node record: vector + level + one empty layer
    let min_node = dimension * 4 + 8;
    if count.saturating_mul(min_node) > r.remaining() {
        return Err(HnswError::corrupt(format!(
            "count {count} does not fit in {} remaining bytes",
            r.remaining()
        )));
    }
    let entry_id = r.u32()?;
    let top_layer = r.u32()? as usize;

    let graph = HnswGraph::new(kind, dimension, params)
        .map_err(|e| HnswError::corrupt(format!("cannot rebuild graph: {e}")))?;

    let mut records: Vec<(Vec<f32>, Vec<Vec<u32>>)> = Vec::with_capacity(count);
    for id in 0..count {
        let vector = r.f32s(dimension)?;
        let level = r.u32()? as usize;
        if level >= config::HNSW_MAX_LEVEL {
            return Err(HnswError::corrupt(format!(
                "node {id} level {level} exceeds cap {}",
                config::HNSW_MAX_LEVEL - 1
            )));
        }
        let mut layers = Vec::with_capacity(level + 1);
        for layer in 0..=level {
            let n = r.u32()? as usize;
            if n > graph.max_links(layer) {
                return Err(HnswError::corrupt(format!(
                    "node {id} layer {layer} has {n} links, bound is {}",
                    graph.max_links(layer)
                )));
            }
            let list = r.u32s(n)?;
            if let Some(&bad) = list.iter().find(|&&x| x as usize >= count || x as usize == id) {
                return Err(HnswError::corrupt(format!(
                    "node {id} layer {layer} links to invalid id {bad}"
                )));
            }
            let mut sorted = list.clone();
            sorted.sort_unstable();
            if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
                return Err(HnswError::corrupt(format!(
                    "node {id} layer {layer} links to {} twice",
                    pair[0]
                )));
            }
            layers.push(list);
        }
        records.push((vector, layers));
    }

    // Neighbors must exist on the layer they are linked at
    for (id, (_, layers)) in records.iter().enumerate() {
        for (layer, list) in layers.iter().enumerate() {
            for &n in list {
                if records[n as usize].1.len() <= layer {
                    return Err(HnswError::corrupt(format!(
                        "node {id} links to {n} on layer {layer}, which {n} does not reach"
                    )));
                }
            }
        }
    }

    let n_labels = r.len_field("label count")?;
    if n_labels != count {
        return Err(HnswError::corrupt(format!(
            "label table has {n_labels} entries for {count} nodes"
        )));
    }
    let mut label_of: Vec<Option<u64>> = vec![None; count];
    for _ in 0..n_labels {
        let label = r.u64()?;
        let id = r.u32()? as usize;
        let slot = label_of
            .get_mut(id)
            .ok_or_else(|| HnswError::corrupt(format!("label table id {id} out of range")))?;
        if slot.is_some() {
            return Err(HnswError::corrupt(format!("internal id {id} labeled twice")));
        }
        *slot = Some(label);
    }

    if r.remaining() != 0 {
        return Err(HnswError::corrupt(format!(
            "{} trailing bytes after label table",
            r.remaining()
        )));
    }

    let entry = if count == 0 {
        if entry_id != NO_ENTRY_POINT {
            return Err(HnswError::corrupt("empty snapshot names an entry point"));
        }
        None
    } else {
        let ep_level = records
            .get(entry_id as usize)
            .map(|(_, layers)| layers.len() - 1)
            .ok_or_else(|| HnswError::corrupt(format!("entry point {entry_id} out of range")))?;
        if ep_level != top_layer {
            return Err(HnswError::corrupt(format!(
                "entry point level {ep_level} != top layer {top_layer}"
            )));
        }
        Some(EntryPoint {
            id: entry_id,
            level: top_layer,
        })
    };

    for (id, ((vector, layers), label)) in records.into_iter().zip(label_of).enumerate() {
        let label = label.ok_or_else(|| HnswError::corrupt(format!("node {id} has no label")))?;
        graph
            .labels
            .bind(label, id as u32)
            .map_err(|_| HnswError::corrupt(format!("label {label} appears twice")))?;
        graph.arena.allocate(Node::with_links(label, &vector, layers))?;
    }
    *graph.entry.write() = entry;

    Ok(graph)
}

/// Check the CRC footer and return the payload it covers.
fn verify_footer(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < FOOTER_LEN {
        return Err(HnswError::corrupt(format!(
            "snapshot too short ({} bytes)",
            bytes.len()
        )));
    }
    let (payload, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
    if &footer[..4] != config::SNAPSHOT_CRC_MAGIC {
        return Err(HnswError::corrupt("missing CRC footer"));
    }
    let stored = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(HnswError::corrupt(format!(
            "CRC32 mismatch: expected {stored:#010x}, got {computed:#010x}"
        )));
    }
    tracing::debug!("Snapshot CRC32 verified: {:#010x}", stored);
    Ok(payload)
}

#[inline]
fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Bounds-checked little-endian reader over a byte slice.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(HnswError::corrupt(format!(
                "unexpected end of snapshot at byte {}: need {n}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    /// A u64 size field that must fit the platform and the id space.
    fn len_field(&mut self, what: &str) -> Result<usize> {
        let v = self.u64()?;
        usize::try_from(v)
            .ok()
            .filter(|&n| n <= config::MAX_ELEMENTS)
            .ok_or_else(|| HnswError::corrupt(format!("{what} {v} out of range")))
    }

    fn u32s(&mut self, n: usize) -> Result<Vec<u32>> {
        let bytes = self.take(n.checked_mul(4).ok_or_else(|| HnswError::corrupt("length overflow"))?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn f32s(&mut self, n: usize) -> Result<Vec<f32>> {
        let bytes = self.take(n.checked_mul(4).ok_or_else(|| HnswError::corrupt("length overflow"))?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}
