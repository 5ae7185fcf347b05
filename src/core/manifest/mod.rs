//! # Manifest Codec
//!
//! Reads and writes the per-archive fingerprint manifest.
//!
//! ## Format
//! UTF-8 text, LF terminated:
//!
//! ```text
//! # kagami_imgsum_ver: 1
//! # file: /comics/vol1.cbz
//! CCCCCCCC SSSSSSSSS WWWW HHHH PPPPPPPPPPPPPPPP NAME
//! ```
//!
//! One fixed-column line per page: CRC32 (8 hex), size (9 decimal,
//! space-padded), width and height (4 decimal, zero-padded), phash (16 hex),
//! then the page name from column 46 to end of line. The writer sorts pages
//! by name; the reader is lenient and skips anything it cannot parse.
//!
//! Manifests are stored as `<inode>.txt`; the filename is the archive's
//! primary key.

use crate::core::archive::{Archive, ImageRecord};
use crate::error::ManifestError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

/// First line of every manifest.
pub const HEADER: &str = "# kagami_imgsum_ver: 1";

/// Comment prefix that carries the archive path.
const FILE_PREFIX: &str = "# file: ";

/// A content line needs the 46 fixed columns plus at least one name byte.
const MIN_LINE_LEN: usize = 47;

/// Column where the page name starts.
const NAME_COLUMN: usize = 46;

/// Manifests at or below this size are treated as empty husks and rescanned.
pub const FRESH_MIN_BYTES: u64 = 100;

/// Manifests older than this are rescanned.
pub const FRESH_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Manifest path for an archive inode inside the store directory.
pub fn store_path(store_dir: &Path, inode: i64) -> PathBuf {
    store_dir.join(format!("{inode}.txt"))
}

/// Recover the archive inode from a manifest filename.
pub fn inode_from_path(path: &Path) -> Option<i64> {
    path.file_name()?
        .to_str()?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

/// Freshness rule for the scan cache: a manifest is fresh when it is larger
/// than [`FRESH_MIN_BYTES`] and was written strictly within the last
/// [`FRESH_WINDOW`]. A manifest exactly one window old is stale.
pub fn is_fresh(path: &Path, now: SystemTime) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() || meta.len() <= FRESH_MIN_BYTES {
        return false;
    }
    match meta.modified() {
        Ok(mtime) => mtime + FRESH_WINDOW > now,
        Err(_) => false,
    }
}

/// Format one page as its fixed-column manifest line.
pub fn format_line(record: &ImageRecord) -> String {
    format!(
        "{:08X} {:>9} {:04} {:04} {:016X} {}",
        record.crc32, record.data_size, record.width, record.height, record.phash, record.name
    )
}

/// Parse one fixed-column content line. The caller has already filtered
/// comments and lines shorter than the fixed columns.
pub fn parse_line(line: &str) -> Result<ImageRecord, ManifestError> {
    let bad = || ManifestError::BadLine {
        line: line.to_string(),
    };

    let crc32 = line
        .get(0..8)
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(bad)?;
    let data_size = line
        .get(9..18)
        .and_then(|s| s.trim_start().parse::<u64>().ok())
        .ok_or_else(bad)?;
    let width = line
        .get(19..23)
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(bad)?;
    let height = line
        .get(24..28)
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(bad)?;
    let phash = line
        .get(29..45)
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .ok_or_else(bad)?;
    let name = line.get(NAME_COLUMN..).ok_or_else(bad)?;

    Ok(ImageRecord {
        name: name.to_string(),
        crc32,
        data_size,
        width,
        height,
        phash,
        parsed: true,
        ..ImageRecord::default()
    })
}

/// Render a whole manifest. Pages are emitted sorted by name.
pub fn render(archive: &Archive) -> String {
    let mut images: Vec<&ImageRecord> = archive.images.iter().collect();
    images.sort_by(|a, b| a.name.cmp(&b.name));

    let mut text = String::new();
    text.push_str(HEADER);
    text.push('\n');
    text.push_str(FILE_PREFIX);
    text.push_str(&archive.name.to_string_lossy());
    text.push('\n');
    for image in images {
        text.push_str(&format_line(image));
        text.push('\n');
    }
    text
}

/// Write the archive's manifest into the store, replacing any existing
/// file. Returns the manifest path.
pub fn write(store_dir: &Path, archive: &Archive) -> Result<PathBuf, ManifestError> {
    let path = store_path(store_dir, archive.inode);
    fs::write(&path, render(archive)).map_err(|source| ManifestError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Load one manifest.
///
/// The inode comes from the filename. Comment lines are skipped except for
/// `# file:`, which restores the archive path. Malformed content lines are
/// logged and dropped; they never fail the load.
pub fn load(path: &Path) -> Result<Archive, ManifestError> {
    let inode = inode_from_path(path).ok_or_else(|| ManifestError::BadInode {
        path: path.to_path_buf(),
    })?;

    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut archive = Archive {
        inode,
        ..Archive::default()
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix(FILE_PREFIX) {
            archive.name = PathBuf::from(name);
            continue;
        }
        if trimmed.starts_with('#') || line.len() < MIN_LINE_LEN {
            continue;
        }
        match parse_line(line) {
            Ok(mut record) => {
                record.inode = inode;
                record.nth = archive.images.len();
                archive.images.push(record);
            }
            Err(err) => {
                warn!(manifest = %path.display(), %err, "skipping manifest line");
            }
        }
    }

    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(nth: usize, name: &str) -> ImageRecord {
        ImageRecord {
            inode: 42,
            nth,
            name: name.to_string(),
            crc32: 0xDEAD_BEEF,
            data_size: 12345,
            parsed: true,
            phash: 0x0123_4567_89AB_CDEF,
            width: 800,
            height: 1200,
            ..ImageRecord::default()
        }
    }

    #[test]
    fn line_has_fixed_columns() {
        let line = format_line(&sample_record(0, "page01.jpg"));
        assert_eq!(
            line,
            "DEADBEEF     12345 0800 1200 0123456789ABCDEF page01.jpg"
        );
        // name starts at the fixed column
        assert_eq!(&line[NAME_COLUMN..], "page01.jpg");
    }

    #[test]
    fn parse_line_recovers_every_field() {
        let line = "DEADBEEF     12345 0800 1200 0123456789ABCDEF page01.jpg";
        let record = parse_line(line).unwrap();

        assert_eq!(record.crc32, 0xDEAD_BEEF);
        assert_eq!(record.data_size, 12345);
        assert_eq!(record.width, 800);
        assert_eq!(record.height, 1200);
        assert_eq!(record.phash, 0x0123_4567_89AB_CDEF);
        assert_eq!(record.name, "page01.jpg");
        assert!(record.parsed);
    }

    #[test]
    fn parse_line_rejects_garbage() {
        assert!(parse_line("ZZZZZZZZ     12345 0800 1200 0123456789ABCDEF x").is_err());
    }

    #[test]
    fn render_sorts_pages_by_name() {
        let archive = Archive {
            name: PathBuf::from("/comics/vol1.cbz"),
            inode: 42,
            images: vec![
                sample_record(0, "b.jpg"),
                sample_record(1, "a.jpg"),
                sample_record(2, "c.jpg"),
            ],
            ..Archive::default()
        };

        let text = render(&archive);
        let names: Vec<&str> = text
            .lines()
            .skip(2)
            .map(|l| &l[NAME_COLUMN..])
            .collect();

        assert_eq!(names, ["a.jpg", "b.jpg", "c.jpg"]);
        assert!(text.starts_with(HEADER));
        assert!(text.contains("# file: /comics/vol1.cbz"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let archive = Archive {
            name: PathBuf::from("/comics/vol1.cbz"),
            inode: 42,
            images: vec![sample_record(0, "a.jpg"), sample_record(1, "b.jpg")],
            ..Archive::default()
        };

        let path = write(dir.path(), &archive).unwrap();
        assert_eq!(path, dir.path().join("42.txt"));

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.inode, 42);
        assert_eq!(loaded.name, PathBuf::from("/comics/vol1.cbz"));
        assert_eq!(loaded.images.len(), 2);
        assert_eq!(loaded.images[0].name, "a.jpg");
        assert_eq!(loaded.images[0].crc32, 0xDEAD_BEEF);
        assert_eq!(loaded.images[0].phash, 0x0123_4567_89AB_CDEF);
        // nth is dense and reflects stored order
        assert_eq!(loaded.images[0].nth, 0);
        assert_eq!(loaded.images[1].nth, 1);
    }

    #[test]
    fn load_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("7.txt");
        let good = format_line(&sample_record(0, "a.jpg"));
        fs::write(
            &path,
            format!("{HEADER}\n# file: /x.cbz\nshort line\n{good}\nGGGGGGGG     12345 0800 1200 0123456789ABCDEF b.jpg\n"),
        )
        .unwrap();

        let loaded = load(&path).unwrap();

        assert_eq!(loaded.images.len(), 1);
        assert_eq!(loaded.images[0].name, "a.jpg");
    }

    #[test]
    fn inode_comes_from_filename() {
        assert_eq!(inode_from_path(Path::new("/store/1234.txt")), Some(1234));
        assert_eq!(inode_from_path(Path::new("/store/junk.txt")), None);
        assert_eq!(inode_from_path(Path::new("/store/1234.csv")), None);
    }

    #[test]
    fn freshness_requires_size_and_recency() {
        let dir = TempDir::new().unwrap();

        let small = dir.path().join("1.txt");
        fs::write(&small, "tiny").unwrap();

        let big = dir.path().join("2.txt");
        fs::write(&big, "x".repeat(200)).unwrap();

        let now = SystemTime::now();
        assert!(!is_fresh(&small, now));
        assert!(is_fresh(&big, now));

        // A manifest a full window old rolls over to stale.
        assert!(!is_fresh(&big, now + FRESH_WINDOW));
    }

    #[test]
    fn missing_manifest_is_not_fresh() {
        assert!(!is_fresh(Path::new("/no/such/manifest.txt"), SystemTime::now()));
    }
}
