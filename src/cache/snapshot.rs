//! Whole-cache snapshots.
//!
//! A dump freezes the cache, writes every segment to `<dump_file>.<unix secs>`
//! and renames it over the previous snapshot. Restore rebuilds the segments
//! (with fresh locks) from that file.

use super::engine::Cache;
use super::entry::{Entry, unix_now};
use super::options::CacheOptions;
use super::segment::{Segment, SegmentData};
use super::status::Status;
use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    segment_count: usize,
    options: CacheOptions,
    segments: Vec<SegmentSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentSnapshot {
    status: Status,
    entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntrySnapshot {
    key: Vec<u8>,
    data: Vec<u8>,
    ttl: i64,
    last_touch: i64,
}

impl Cache {
    /// Restores from `options.dump_file`, or builds an empty cache when no
    /// usable snapshot exists.
    pub fn open(options: CacheOptions) -> Result<Self> {
        match Self::restore(&options.dump_file) {
            Ok(cache) => {
                tracing::info!(
                    "Restored {} entries from {}",
                    cache.status().count,
                    options.dump_file.display()
                );
                Ok(cache)
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, starting empty", options.dump_file.display());
                Self::new(options)
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable snapshot {}: {}",
                    options.dump_file.display(),
                    e
                );
                Self::new(options)
            }
        }
    }

    /// Decodes a snapshot file. The options stored in the snapshot win over
    /// any configured ones.
    pub fn restore(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))?;

        let options = snapshot.options;
        options.validate()?;
        if snapshot.segment_count != options.segment_count
            || snapshot.segments.len() != options.segment_count
        {
            return Err(Error::Snapshot(format!(
                "segment count mismatch: header {}, options {}, stored {}",
                snapshot.segment_count,
                options.segment_count,
                snapshot.segments.len()
            )));
        }

        let segments = snapshot
            .segments
            .into_iter()
            .map(|segment| {
                let mut entries = HashMap::with_capacity(
                    segment.entries.len().max(options.map_size_of_segment),
                );
                for e in segment.entries {
                    entries.insert(e.key, Entry::restored(e.data, e.ttl, e.last_touch));
                }
                Segment::with_data(
                    SegmentData {
                        entries,
                        status: segment.status,
                    },
                    &options,
                )
            })
            .collect();

        Ok(Cache::from_parts(segments, options))
    }

    /// Writes a snapshot to the configured dump file while the cache is frozen.
    pub fn dump(&self) -> Result<()> {
        self.dump_to(&self.options.dump_file)
    }

    pub fn dump_to(&self, path: &Path) -> Result<()> {
        let _frozen = self.freeze();
        let snapshot = self.capture();
        write_snapshot(path, &snapshot)
    }

    fn capture(&self) -> Snapshot {
        let segments = self
            .segments
            .iter()
            .map(|segment| {
                segment.with_data_read(|data| SegmentSnapshot {
                    status: data.status,
                    entries: data
                        .entries
                        .iter()
                        .map(|(key, entry)| EntrySnapshot {
                            key: key.clone(),
                            data: entry.data().to_vec(),
                            ttl: entry.ttl(),
                            last_touch: entry.last_touch(),
                        })
                        .collect(),
                })
            })
            .collect();

        Snapshot {
            segment_count: self.segments.len(),
            options: self.options.clone(),
            segments,
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}", unix_now()));
    PathBuf::from(name)
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let temp = temp_path(path);

    let written = File::create(&temp).map_err(Error::from).and_then(|file| {
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, snapshot)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
    }
    fs::rename(&temp, path)?;
    Ok(())
}
