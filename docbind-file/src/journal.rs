//! Append-only collection journals.
//!
//! Each collection is persisted as a sequence of entries framed as
//! `[u32 length BE][u32 CRC32 BE][BSON payload]`. A `Put` carries the full current
//! content of one document, a `Delete` its identifier. Replaying the entries in order
//! rebuilds the collection, insertion order included.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use docbind_core::model::ID_FIELD;

const HEADER_LEN: usize = 8;

/// A single mutation recorded in a collection journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// The document as it is after an insert or update.
    Put { document: Document },
    /// Removal of the document with this identifier.
    Delete { id: Bson },
}

impl JournalEntry {
    pub fn delete(document: &Document) -> Self {
        JournalEntry::Delete {
            id: document.get(ID_FIELD).cloned().unwrap_or(Bson::Null),
        }
    }
}

/// Diagnostics from a journal replay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Entries read and decoded.
    pub applied: usize,
    /// Entries with a valid checksum whose payload failed to decode.
    pub skipped: usize,
    /// Replay stopped at a checksum mismatch.
    pub corrupted: bool,
    /// Replay stopped at an incomplete trailing entry.
    pub truncated: bool,
    /// Length in bytes of the intact entries at the head of the file.
    pub valid_len: u64,
}

impl ReplayStats {
    /// Whether bytes past [`valid_len`](Self::valid_len) were left unread.
    pub fn has_torn_tail(&self) -> bool {
        self.truncated || self.corrupted
    }
}

/// Writer over one collection's journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_writes: bool,
    len: u64,
}

impl Journal {
    /// Opens or creates the journal at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>, sync_writes: bool) -> io::Result<Self> {
        let path = path.into();
        let file = append_handle(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            sync_writes,
            len,
        })
    }

    /// Opens the journal at `path`, cutting it back to its first `valid_len` bytes.
    ///
    /// Appends after a torn tail would otherwise land behind bytes replay never reads past.
    pub fn open_at(path: impl Into<PathBuf>, valid_len: u64, sync_writes: bool) -> io::Result<Self> {
        let path = path.into();
        let file = append_handle(&path)?;
        let len = file.metadata()?.len();

        if len > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
            tracing::warn!(path = %path.display(), discarded = len - valid_len, "cut torn journal tail");
        }

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            sync_writes,
            len: len.min(valid_len),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entries` and flushes them, fsyncing when `sync_writes` is set.
    ///
    /// On failure the file is cut back to its length before the call.
    pub fn append(&mut self, entries: &[JournalEntry]) -> io::Result<()> {
        let mut framed = Vec::new();
        for entry in entries {
            framed.extend_from_slice(&frame(entry)?);
        }

        if let Err(err) = self.write_framed(&framed) {
            if let Err(reset_err) = self.reset() {
                tracing::warn!(path = %self.path.display(), error = %reset_err, "failed to reset journal after write error");
            }
            return Err(err);
        }

        self.len += framed.len() as u64;
        Ok(())
    }

    fn write_framed(&mut self, framed: &[u8]) -> io::Result<()> {
        self.writer.write_all(framed)?;
        self.writer.flush()?;
        if self.sync_writes {
            self.writer.get_ref().sync_all()?;
        }

        Ok(())
    }

    /// Discards buffered bytes and cuts the file back to the last complete append.
    fn reset(&mut self) -> io::Result<()> {
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(append_handle(&self.path)?));
        drop(stale.into_parts());

        self.writer.get_ref().set_len(self.len)
    }

    /// Rewrites the journal as one `Put` per document.
    ///
    /// The new content is written to a temporary file which then replaces the journal.
    pub fn compact(&mut self, documents: &[Document]) -> io::Result<()> {
        self.writer.flush()?;

        let tmp_path = self.path.with_extension("journal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);

            for document in documents {
                tmp.write_all(&frame(&JournalEntry::Put { document: document.clone() })?)?;
            }

            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        *self = Journal::open(self.path.clone(), self.sync_writes)?;

        Ok(())
    }

    /// Closes and deletes the journal file.
    pub fn remove(self) -> io::Result<()> {
        let path = self.path;
        drop(self.writer);

        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

/// Reads every intact entry of the journal at `path`.
///
/// A truncated trailing entry or a checksum mismatch ends the replay; the entries before
/// it are kept.
pub fn replay(path: &Path) -> io::Result<(Vec<JournalEntry>, ReplayStats)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut stats = ReplayStats::default();
    let mut header = [0u8; HEADER_LEN];

    loop {
        match read_full(&mut reader, &mut header)? {
            0 => break,
            HEADER_LEN => {}
            _ => {
                tracing::warn!(path = %path.display(), "journal truncated mid-header, stopping replay");
                stats.truncated = true;
                break;
            }
        }

        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let stored_crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        let mut payload = vec![0u8; len];
        if read_full(&mut reader, &mut payload)? != len {
            tracing::warn!(path = %path.display(), "journal truncated mid-entry, stopping replay");
            stats.truncated = true;
            break;
        }

        if crc32fast::hash(&payload) != stored_crc {
            tracing::warn!(path = %path.display(), "journal entry CRC mismatch, stopping replay");
            stats.corrupted = true;
            break;
        }

        stats.valid_len += (HEADER_LEN + len) as u64;

        match bson::de::deserialize_from_slice::<JournalEntry>(&payload) {
            Ok(entry) => {
                entries.push(entry);
                stats.applied += 1;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "undecodable journal entry, skipping");
                stats.skipped += 1;
            }
        }
    }

    Ok((entries, stats))
}

/// Folds replayed entries into the live documents, in insertion order.
///
/// A `Put` for a known identifier replaces the document in place.
pub fn fold(entries: Vec<JournalEntry>) -> Vec<Document> {
    let mut slots: Vec<Option<Document>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        match entry {
            JournalEntry::Put { document } => {
                let key = identity_key(document.get(ID_FIELD));

                match positions.get(&key) {
                    Some(&slot) => slots[slot] = Some(document),
                    None => {
                        positions.insert(key, slots.len());
                        slots.push(Some(document));
                    }
                }
            }
            JournalEntry::Delete { id } => {
                if let Some(slot) = positions.remove(&identity_key(Some(&id))) {
                    slots[slot] = None;
                }
            }
        }
    }

    slots.into_iter().flatten().collect()
}

fn append_handle(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn identity_key(id: Option<&Bson>) -> String {
    id.map(|id| format!("{id:?}")).unwrap_or_default()
}

fn frame(entry: &JournalEntry) -> io::Result<Vec<u8>> {
    let payload = bson::ser::serialize_to_vec(entry).map_err(|e| io::Error::other(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| io::Error::other("journal entry too large"))?;
    let crc = crc32fast::hash(&payload);

    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&crc.to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Reads until `buf` is full or the reader is exhausted, returning the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(filled)
}
