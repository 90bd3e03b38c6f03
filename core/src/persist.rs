use crate::document::DocumentStore;
use crate::engine::{EngineConfig, Snapshot};
use crate::index::InvertedIndex;
use crate::tokenizer::TokenizerConfig;
use crate::SearchError;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bumped whenever the serialized store or index layout changes.
pub const FORMAT_VERSION: u32 = 2;

lazy_static! {
    // saves into one process never interleave their renames
    static ref SAVE_LOCK: Mutex<()> = Mutex::new(());
}

static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
    /// Stamp shared by the store and index files written in the same save.
    pub snapshot: String,
    /// The index only makes sense when queried with the tokenizer that built it.
    pub tokenizer: TokenizerConfig,
}

/// A store or index body tagged with the save it came from.
#[derive(Serialize, Deserialize)]
struct Stamped<T> {
    snapshot: String,
    body: T,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn store(&self) -> PathBuf { self.root.join("store.bin") }
    fn index(&self) -> PathBuf { self.root.join("index.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Write to a sibling temp file and rename it over `path`, so readers see the old file or the new
/// one and never a torn write.
fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("tmp{}", SAVE_SEQ.fetch_add(1, Ordering::Relaxed)));
    let mut f = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

fn save_stamped<T: Serialize>(path: &Path, snapshot: &str, body: &T) -> Result<()> {
    let stamped = Stamped { snapshot: snapshot.to_string(), body };
    write_bytes(path, &bincode::serialize(&stamped)?)
}

/// Decode a stamped file and check that it was written by the save `meta` describes.
fn load_stamped<T: DeserializeOwned>(path: &Path, file: &str, meta: &MetaFile) -> Result<T> {
    let stamped: Stamped<T> =
        bincode::deserialize(&read_bytes(path)?).with_context(|| format!("decoding {file}"))?;
    if stamped.snapshot != meta.snapshot {
        return Err(SearchError::StaleSnapshotFile {
            file: file.to_string(),
            expected: meta.snapshot.clone(),
            found: stamped.snapshot,
        }
        .into());
    }
    Ok(stamped.body)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    write_bytes(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = read_bytes(&paths.meta())?;
    let meta: MetaFile = serde_json::from_slice(&buf).context("decoding meta.json")?;
    Ok(meta)
}

/// Persist everything needed to serve queries without rebuilding. `meta.json` is written last, so
/// an interrupted save leaves files whose stamps disagree with it and the load fails loudly.
pub fn save_snapshot(paths: &IndexPaths, snapshot: &Snapshot) -> Result<()> {
    let _guard = SAVE_LOCK.lock();
    create_dir_all(&paths.root)?;
    let now = time::OffsetDateTime::now_utc();
    let stamp = format!(
        "{:x}-{:x}-{}",
        now.unix_timestamp_nanos(),
        std::process::id(),
        SAVE_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    save_stamped(&paths.store(), &stamp, snapshot.store())?;
    save_stamped(&paths.index(), &stamp, snapshot.index())?;
    let meta = MetaFile {
        num_docs: snapshot.index().num_docs(),
        num_terms: snapshot.index().num_terms(),
        created_at: now.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
        version: FORMAT_VERSION,
        snapshot: stamp,
        tokenizer: snapshot.config().tokenizer.clone(),
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, snapshot = %meta.snapshot, "saved snapshot");
    Ok(())
}

/// Load a saved snapshot. The tokenizer recorded at build time wins over `config.tokenizer`;
/// scorer and snippet settings come from `config`. Files from different saves are rejected.
pub fn load_snapshot(paths: &IndexPaths, mut config: EngineConfig) -> Result<Snapshot> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(SearchError::IndexVersion { found: meta.version, expected: FORMAT_VERSION }.into());
    }
    let store: DocumentStore = load_stamped(&paths.store(), "store.bin", &meta)?;
    let index: InvertedIndex = load_stamped(&paths.index(), "index.bin", &meta)?;
    check_consistent(&store, &index, &meta)?;

    if config.tokenizer != meta.tokenizer {
        tracing::warn!(saved = ?meta.tokenizer, requested = ?config.tokenizer, "using tokenizer the index was built with");
        config.tokenizer = meta.tokenizer;
    }
    tracing::info!(root = %paths.root.display(), num_docs = index.num_docs(), created_at = %meta.created_at, "loaded snapshot");
    Ok(Snapshot::from_parts(store, index, config))
}

/// The index must cover exactly the store's documents, in the counts `meta.json` recorded.
fn check_consistent(store: &DocumentStore, index: &InvertedIndex, meta: &MetaFile) -> Result<(), SearchError> {
    let mut store_ids = store.documents().iter().map(|d| d.id);
    for &indexed in index.doc_ids() {
        match store_ids.next() {
            Some(id) if id == indexed => {}
            _ => return Err(SearchError::SnapshotMismatch(indexed)),
        }
    }
    if let Some(extra) = store_ids.next() {
        return Err(SearchError::SnapshotMismatch(extra));
    }
    if index.num_docs() != meta.num_docs || index.num_terms() != meta.num_terms {
        return Err(SearchError::StaleSnapshotFile {
            file: "meta.json".to_string(),
            expected: format!("{} docs, {} terms", index.num_docs(), index.num_terms()),
            found: format!("{} docs, {} terms", meta.num_docs, meta.num_terms),
        });
    }
    Ok(())
}
