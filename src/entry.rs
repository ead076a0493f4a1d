//! Unified result record
//!
//! Both backends produce the same [`Entry`] shape. Index rows already carry
//! size and attributes, but their timestamps arrive as text and are only parsed
//! when first asked for. Scan results know their path and kind from the
//! directory listing; everything else comes from a single `stat` performed on
//! first access. Either way the metadata block is computed at most once and
//! shared safely between threads.

use crate::backend::Row;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Whether an entry is a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Windows-style file attribute bits, as reported by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes(pub u32);

impl Attributes {
    pub const NONE: u32 = 0;
    pub const READONLY: u32 = 0x01;
    pub const DIRECTORY: u32 = 0x10;

    pub fn new(kind: EntryKind, readonly: bool) -> Self {
        let mut bits = Self::NONE;
        if kind == EntryKind::Directory {
            bits |= Self::DIRECTORY;
        }
        if readonly {
            bits |= Self::READONLY;
        }
        Self(bits)
    }

    pub fn is_readonly(&self) -> bool {
        self.0 & Self::READONLY != 0
    }

    pub fn is_directory(&self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    /// Unix-like mode bits derived from the attributes.
    ///
    /// Directories get `S_IFDIR | 0o111`, everything else `S_IFREG`. Read
    /// permission is always granted, write permission unless readonly.
    pub fn mode(&self) -> u32 {
        const S_IFDIR: u32 = 0o040000;
        const S_IFREG: u32 = 0o100000;

        let mut mode = if self.is_directory() {
            S_IFDIR | 0o111
        } else {
            S_IFREG
        };
        mode |= if self.is_readonly() { 0o444 } else { 0o666 };
        mode
    }
}

/// Image dimensions reported by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width divided by height; `None` for a zero height.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.height == 0 {
            None
        } else {
            Some(self.width as f64 / self.height as f64)
        }
    }
}

/// The lazily computed part of an entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStat {
    pub size: u64,
    pub attributes: Attributes,
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

/// Where an entry came from, and what is needed to finish its metadata
#[derive(Debug)]
enum Origin {
    Indexed {
        size: u64,
        attributes: Attributes,
        accessed: Option<String>,
        modified: Option<String>,
        created: Option<String>,
    },
    Scanned,
}

/// One file or directory, regardless of which backend found it
#[derive(Debug)]
pub struct Entry {
    path: PathBuf,
    kind: EntryKind,
    image: Option<ImageSize>,
    origin: Origin,
    stat: OnceLock<EntryStat>,
}

impl Entry {
    /// Build an entry from an index row.
    pub fn from_row(row: Row) -> Self {
        let kind = row.kind();
        let image = row.image_size();
        Self {
            path: PathBuf::from(row.path),
            kind,
            image,
            origin: Origin::Indexed {
                size: row.size,
                attributes: Attributes(row.attributes),
                accessed: row.accessed,
                modified: row.modified,
                created: row.created,
            },
            stat: OnceLock::new(),
        }
    }

    /// Build an entry for something found by listing a directory.
    pub fn scanned(path: PathBuf, kind: EntryKind) -> Self {
        Self {
            path,
            kind,
            image: None,
            origin: Origin::Scanned,
            stat: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, or the whole path for a filesystem root.
    /// Final path component, lossily decoded. The whole path for a root.
    pub fn name(&self) -> Cow<'_, str> {
        match self.path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => self.path.to_string_lossy(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Whether this entry came from the index rather than a live scan.
    pub fn is_indexed(&self) -> bool {
        matches!(self.origin, Origin::Indexed { .. })
    }

    /// Image dimensions, when the index knew them.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image
    }

    pub fn size(&self) -> u64 {
        match &self.origin {
            Origin::Indexed { size, .. } => *size,
            Origin::Scanned => self.stat().size,
        }
    }

    pub fn attributes(&self) -> Attributes {
        match &self.origin {
            Origin::Indexed { attributes, .. } => *attributes,
            Origin::Scanned => self.stat().attributes,
        }
    }

    pub fn accessed(&self) -> Option<DateTime<Utc>> {
        self.stat().accessed
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.stat().modified
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.stat().created
    }

    /// The full metadata block, computed on first call.
    pub fn stat(&self) -> &EntryStat {
        self.stat.get_or_init(|| self.compute_stat())
    }

    fn compute_stat(&self) -> EntryStat {
        match &self.origin {
            Origin::Indexed {
                size,
                attributes,
                accessed,
                modified,
                created,
            } => EntryStat {
                size: *size,
                attributes: *attributes,
                accessed: accessed.as_deref().and_then(parse_timestamp),
                modified: modified.as_deref().and_then(parse_timestamp),
                created: created.as_deref().and_then(parse_timestamp),
            },
            Origin::Scanned => match fs::metadata(&self.path) {
                Ok(meta) => EntryStat {
                    size: if self.is_dir() { 0 } else { meta.len() },
                    attributes: Attributes::new(self.kind, meta.permissions().readonly()),
                    accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    created: meta.created().ok().map(DateTime::<Utc>::from),
                },
                // Vanished since it was listed
                Err(_) => EntryStat {
                    size: 0,
                    attributes: Attributes::new(self.kind, false),
                    accessed: None,
                    modified: None,
                    created: None,
                },
            },
        }
    }
}

/// Parse an index timestamp.
///
/// RFC 3339 values carry their own offset. Values without one are in local
/// time, which is how the index reports them.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn row(path: &str) -> Row {
        Row {
            path: path.to_string(),
            item_type: "JPEG image".to_string(),
            size: 2048,
            attributes: Attributes::READONLY,
            accessed: Some("2024-03-01T10:00:00Z".to_string()),
            modified: Some("2024-02-01T08:30:00+02:00".to_string()),
            created: None,
            width: Some(640),
            height: Some(480),
            ..Row::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_lossy() {
        use crate::query::{ListingFilter, QueryBuilder};
        use crate::utils::app_data::SearchConfig;
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new("/photos").join(OsStr::from_bytes(b"caf\xe9.jpg"));
        let entry = Entry::scanned(path, EntryKind::File);
        assert_eq!(entry.name(), "caf\u{FFFD}.jpg");

        // Agrees with what the scanner filters on
        let query = QueryBuilder::new()
            .root("/photos")
            .substring("caf")
            .build()
            .unwrap();
        let filter = ListingFilter::from_query(&query, &SearchConfig::default()).unwrap();
        assert!(filter.matches(&entry.name(), entry.kind()));
    }

    #[test]
    fn test_entry_from_row() {
        let entry = Entry::from_row(row("/photos/cat.jpg"));
        assert_eq!(entry.name(), "cat.jpg");
        assert!(entry.is_file());
        assert!(entry.is_indexed());
        assert_eq!(entry.size(), 2048);
        assert!(entry.attributes().is_readonly());
        assert_eq!(
            entry.image_size(),
            Some(ImageSize {
                width: 640,
                height: 480
            })
        );

        let modified = entry.modified().unwrap();
        assert_eq!(modified.to_rfc3339(), "2024-02-01T06:30:00+00:00");
        assert!(entry.created().is_none());
    }

    #[test]
    fn test_directory_row() {
        let mut r = row("/photos/albums");
        r.item_type = "Directory".to_string();
        r.attributes = Attributes::DIRECTORY;
        let entry = Entry::from_row(r);
        assert!(entry.is_dir());
        assert!(entry.attributes().is_directory());
    }

    #[test]
    fn test_mode_bits() {
        assert_eq!(Attributes::new(EntryKind::Directory, false).mode(), 0o040777);
        assert_eq!(Attributes::new(EntryKind::File, true).mode(), 0o100444);
        assert_eq!(Attributes::new(EntryKind::File, false).mode(), 0o100666);
    }

    #[test]
    fn test_stat_is_shared_across_threads() {
        let entry = Arc::new(Entry::from_row(row("/photos/cat.jpg")));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let entry = Arc::clone(&entry);
                thread::spawn(move || entry.stat() as *const EntryStat as usize)
            })
            .collect();

        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_scanned_entry_stats_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        fs::write(&file, b"12345").unwrap();

        let entry = Entry::scanned(file.clone(), EntryKind::File);
        assert!(!entry.is_indexed());
        assert_eq!(entry.size(), 5);
        assert!(entry.modified().is_some());

        // The block is memoized: removing the file does not change it
        fs::remove_file(&file).unwrap();
        assert_eq!(entry.size(), 5);
    }

    #[test]
    fn test_scanned_entry_vanished() {
        let entry = Entry::scanned(PathBuf::from("/nonexistent/definitely/not/here"), EntryKind::File);
        assert_eq!(entry.size(), 0);
        assert!(entry.modified().is_none());
    }

    #[test]
    fn test_parse_naive_timestamp() {
        assert!(parse_timestamp("2023-07-04 12:00:00").is_some());
        assert!(parse_timestamp("2023-07-04T12:00:00.250").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_aspect_ratio() {
        let tall = ImageSize { width: 100, height: 200 };
        assert_eq!(tall.aspect_ratio(), Some(0.5));
        assert_eq!(tall.total_pixels(), 20_000);
        assert_eq!(ImageSize { width: 10, height: 0 }.aspect_ratio(), None);
    }
}
