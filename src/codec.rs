//! Binary persistence: whole-index save/load and the raw bulk loader.
//!
//! The on-disk layout is a fixed little-endian format:
//!
//! ```text
//! offset  size  field
//! 0       8     magic          b"VECTRIDX"
//! 8       2     version        = 1
//! 10      2     scalar_kind    (0 = f32, 1 = i8)
//! 12      2     metric_kind    (0 = cos, 1 = l2sq, 2 = ip, 3 = hamming, 4 = jaccard)
//! 14      2     reserved       = 0
//! 16      4     dimensions
//! 20      8     size           (live count; tombstones are compacted out)
//! 28      8     capacity
//! 36      4     M
//! 40      4     ef_construction
//! 44      4     ef_search
//! 48      4     entry_key_lo   (low 32 bits of the entry key)
//! 52      4     entry_top_layer
//! 56      4     scale_f32      (i8 scale; 0 for an f32 index)
//! 60      4     crc32_header   (over bytes 0..60)
//! 64      ...   key_table      size × { i64 key, u8 top_layer, u8 deleted, 2B pad }
//! ...     ...   vector_arena   size × D × elem_size, table order
//! ...     ...   graph_edges    per key, per layer 0..=top: u16 count, count × i64 keys
//! ...     4     crc32_body     (over bytes 64..here)
//! ```
//!
//! Writes go through a temp file and an atomic rename. Loads parse and
//! validate the entire file before any state is handed back, so a failed
//! load leaves nothing half-built.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::hnsw::{GraphConfig, HnswGraph};
use crate::metric::MetricKind;
use crate::storage::{ScalarKind, StoredRef, VectorStore};

const MAGIC: &[u8; 8] = b"VECTRIDX";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 64;
const KEY_TABLE_ENTRY_LEN: usize = 12;

/// Normalize and vet a caller-supplied path.
///
/// Strips a leading `file://`, rejects empty paths, and rejects any path
/// containing a `..` segment.
pub fn normalize_path(path: &str) -> Result<PathBuf> {
    let path = path.strip_prefix("file://").unwrap_or(path);
    if path.is_empty() {
        return Err(IndexError::Path("path is empty".into()));
    }
    let buf = PathBuf::from(path);
    if buf
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(IndexError::Path(format!(
            "path contains a '..' segment: {path}"
        )));
    }
    Ok(buf)
}

/// A fully decoded index image, ready to swap into the facade.
pub struct DecodedIndex {
    pub scalar: ScalarKind,
    pub metric: MetricKind,
    pub dimensions: u32,
    pub store: VectorStore,
    pub graph: HnswGraph,
}

/// Serialize the index to `path`, compacting tombstones.
pub fn save(
    path: &Path,
    store: &VectorStore,
    graph: &HnswGraph,
    metric: MetricKind,
) -> Result<()> {
    let dim = store.dim();
    let scalar = store.scalar_kind();
    let live: Vec<u32> = store.live_slots().collect();
    let size = live.len();
    let config = graph.config();

    let (entry_key_lo, entry_top_layer) = match graph.entry() {
        Some(slot) => (
            (store.key_of(slot) as u64 & 0xffff_ffff) as u32,
            graph.layer_of(slot) as u32,
        ),
        None => (0, 0),
    };

    let mut out =
        Vec::with_capacity(HEADER_LEN + size * (KEY_TABLE_ENTRY_LEN + dim * scalar.element_size()));

    // Header.
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&scalar.code().to_le_bytes());
    out.extend_from_slice(&metric.code().to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(dim as u32).to_le_bytes());
    out.extend_from_slice(&(size as u64).to_le_bytes());
    out.extend_from_slice(&(store.capacity() as u64).to_le_bytes());
    out.extend_from_slice(&(config.m as u32).to_le_bytes());
    out.extend_from_slice(&(config.ef_construction as u32).to_le_bytes());
    out.extend_from_slice(&(config.ef_search as u32).to_le_bytes());
    out.extend_from_slice(&entry_key_lo.to_le_bytes());
    out.extend_from_slice(&entry_top_layer.to_le_bytes());
    out.extend_from_slice(&store.scale().to_le_bytes());
    let header_crc = crc32fast::hash(&out[..60]);
    out.extend_from_slice(&header_crc.to_le_bytes());
    debug_assert_eq!(out.len(), HEADER_LEN);

    // Key table.
    for &slot in &live {
        out.extend_from_slice(&store.key_of(slot).to_le_bytes());
        out.push(graph.layer_of(slot) as u8);
        out.push(0); // deleted flag; tombstones were compacted out
        out.extend_from_slice(&[0u8; 2]);
    }

    // Vector arena, table order.
    for &slot in &live {
        match store.read(slot) {
            StoredRef::F32(v) => {
                for &x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            StoredRef::I8 { data, .. } => {
                out.extend(data.iter().map(|&b| b as u8));
            }
        }
    }

    // Edge lists: neighbor keys per layer, tombstones dropped.
    for &slot in &live {
        let lists = &graph.neighbors[slot as usize];
        for layer in 0..=graph.layer_of(slot) {
            let keys: Vec<i64> = lists
                .get(layer)
                .map(|list| {
                    list.iter()
                        .filter(|&&nb| !store.is_deleted(nb))
                        .map(|&nb| store.key_of(nb))
                        .collect()
                })
                .unwrap_or_default();
            out.extend_from_slice(&(keys.len() as u16).to_le_bytes());
            for key in keys {
                out.extend_from_slice(&key.to_le_bytes());
            }
        }
    }

    let body_crc = crc32fast::hash(&out[HEADER_LEN..]);
    out.extend_from_slice(&body_crc.to_le_bytes());

    // Atomic write: temp file, then rename.
    let tmp = tmp_path(path);
    fs::write(&tmp, &out)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    tracing::info!(
        "saved index to {:?} ({} live vectors, {} bytes, CRC32={:#010x})",
        path,
        size,
        out.len(),
        body_crc
    );
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Cursor over the decoded file body with bounds-checked reads.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(IndexError::Format(format!(
                "file truncated at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
}

/// Parse and validate an index file. Returns a complete in-memory image;
/// nothing is shared with the file afterwards.
pub fn load(path: &Path) -> Result<DecodedIndex> {
    let data = fs::read(path)?;
    if data.len() < HEADER_LEN + 4 {
        return Err(IndexError::Format(format!(
            "file too short ({} bytes)",
            data.len()
        )));
    }

    let mut r = Reader::new(&data);
    let magic = r.take(8)?;
    if magic != MAGIC {
        return Err(IndexError::Format("bad magic".into()));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(IndexError::Format(format!(
            "unsupported version {version}"
        )));
    }
    let scalar = ScalarKind::from_code(r.u16()?)
        .ok_or_else(|| IndexError::Format("unknown scalar kind".into()))?;
    let metric = MetricKind::from_code(r.u16()?)
        .ok_or_else(|| IndexError::Format("unknown metric kind".into()))?;
    let _reserved = r.u16()?;
    let dimensions = r.u32()?;
    if dimensions == 0 {
        return Err(IndexError::Format("zero dimensions".into()));
    }
    let size = r.u64()? as usize;
    let _capacity = r.u64()?;
    let m = r.u32()? as usize;
    let ef_construction = r.u32()? as usize;
    let ef_search = r.u32()? as usize;
    let entry_key_lo = r.u32()?;
    let entry_top_layer = r.u32()? as usize;
    let scale = r.f32()?;

    let stored_header_crc = r.u32()?;
    let header_crc = crc32fast::hash(&data[..60]);
    if header_crc != stored_header_crc {
        return Err(IndexError::Corrupted(format!(
            "header CRC mismatch: stored {stored_header_crc:#010x}, computed {header_crc:#010x}"
        )));
    }

    // Body CRC covers everything between the header and the trailer.
    let body = &data[HEADER_LEN..data.len() - 4];
    let stored_body_crc = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
    let body_crc = crc32fast::hash(body);
    if body_crc != stored_body_crc {
        tracing::warn!("body CRC mismatch in {:?}, rejecting file", path);
        return Err(IndexError::Corrupted(format!(
            "body CRC mismatch: stored {stored_body_crc:#010x}, computed {body_crc:#010x}"
        )));
    }

    let dim = dimensions as usize;
    let config = GraphConfig::new(m, ef_construction, ef_search)
        .map_err(|e| IndexError::Format(format!("bad graph parameters: {e}")))?;

    // Key table.
    let mut keys = Vec::with_capacity(size);
    let mut top_layers = Vec::with_capacity(size);
    for _ in 0..size {
        let key = r.i64()?;
        let header = r.take(4)?;
        let top_layer = header[0] as usize;
        if header[1] != 0 {
            return Err(IndexError::Format(
                "key table contains a deleted entry".into(),
            ));
        }
        keys.push(key);
        top_layers.push(top_layer);
    }

    // Vector arena.
    let mut store = VectorStore::new(dim, scalar);
    store.reserve(size.max(crate::config::INITIAL_CAPACITY))?;
    if scalar == ScalarKind::I8 {
        store.set_scale(scale);
    }
    let mut graph = HnswGraph::new(config);
    let mut f32_buf = vec![0.0f32; dim];
    for i in 0..size {
        let slot = match scalar {
            ScalarKind::F32 => {
                let bytes = r.take(dim * 4)?;
                for (x, chunk) in f32_buf.iter_mut().zip(bytes.chunks_exact(4)) {
                    *x = f32::from_le_bytes(chunk.try_into().unwrap());
                }
                store.put(keys[i], &f32_buf)
            }
            ScalarKind::I8 => {
                let bytes = r.take(dim)?;
                let signed: Vec<i8> = bytes.iter().map(|&b| b as i8).collect();
                store.put_i8(keys[i], &signed)
            }
        };
        let slot = slot.map_err(|e| match e {
            IndexError::Duplicate(key) => {
                IndexError::Format(format!("duplicate key {key} in key table"))
            }
            other => other,
        })?;
        graph.push_node(slot, top_layers[i]);
    }

    // Edge lists.
    for (slot, &top) in top_layers.iter().enumerate() {
        for layer in 0..=top {
            let count = r.u16()? as usize;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                let key = r.i64()?;
                let nb = store.slot_of(key).ok_or_else(|| {
                    IndexError::Format(format!("edge references unknown key {key}"))
                })?;
                list.push(nb);
            }
            graph.neighbors[slot][layer] = list;
        }
    }

    if r.pos != body.len() + HEADER_LEN {
        return Err(IndexError::Format(format!(
            "edge lists end at offset {} but the body ends at {}",
            r.pos,
            body.len() + HEADER_LEN
        )));
    }

    // Entry point: match the stored low key bits and layer, falling back
    // to a max-layer scan.
    if size > 0 {
        let mut entry = None;
        for slot in store.live_slots() {
            let key = store.key_of(slot);
            if (key as u64 & 0xffff_ffff) as u32 == entry_key_lo
                && graph.layer_of(slot) == entry_top_layer
            {
                entry = Some(slot);
                break;
            }
        }
        if entry.is_none() {
            entry = store
                .live_slots()
                .max_by_key(|&s| (graph.layer_of(s), std::cmp::Reverse(store.key_of(s))));
        }
        graph.entry = entry;
    }

    validate(&store, &graph)?;

    tracing::info!(
        "loaded index from {:?} ({} vectors, {} dims, {}/{})",
        path,
        size,
        dimensions,
        scalar.name(),
        metric.name()
    );

    Ok(DecodedIndex {
        scalar,
        metric,
        dimensions,
        store,
        graph,
    })
}

/// Structural validation of a decoded image.
fn validate(store: &VectorStore, graph: &HnswGraph) -> Result<()> {
    let slots = store.slot_count();
    if graph.neighbors.len() != slots || graph.layers.len() != slots {
        return Err(IndexError::Format(format!(
            "graph arrays ({}, {}) do not match slot count {slots}",
            graph.neighbors.len(),
            graph.layers.len()
        )));
    }
    if let Some(entry) = graph.entry() {
        if entry as usize >= slots || store.is_deleted(entry) {
            return Err(IndexError::Format("entry point is not a live slot".into()));
        }
    } else if store.len() > 0 {
        return Err(IndexError::Format(
            "non-empty index without an entry point".into(),
        ));
    }
    for (slot, lists) in graph.neighbors.iter().enumerate() {
        if lists.len() != graph.layers[slot] as usize + 1 {
            return Err(IndexError::Format(format!(
                "slot {slot} has {} layer lists but top layer {}",
                lists.len(),
                graph.layers[slot]
            )));
        }
        for list in lists {
            for &nb in list {
                if nb as usize >= slots {
                    return Err(IndexError::Format(format!(
                        "slot {slot} references out-of-range neighbor {nb}"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Read a headerless raw-vector file: `N × D` little-endian f32 values.
///
/// The file size must be a whole number of vectors; anything else fails
/// with [`IndexError::Format`]. An empty file yields an empty buffer.
pub fn read_raw_vectors(path: &Path, dim: usize) -> Result<Vec<f32>> {
    let data = fs::read(path)?;
    let stride = dim * 4;
    if data.len() % stride != 0 {
        return Err(IndexError::Format(format!(
            "raw vector file is {} bytes, not a multiple of {stride} (D={dim} f32 vectors)",
            data.len()
        )));
    }
    let mut out = vec![0.0f32; data.len() / 4];
    for (x, chunk) in out.iter_mut().zip(data.chunks_exact(4)) {
        *x = f32::from_le_bytes(chunk.try_into().unwrap());
    }
    Ok(out)
}
