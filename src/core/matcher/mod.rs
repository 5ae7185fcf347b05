//! # Duplicate Matcher
//!
//! Loads every stored manifest and groups archives that duplicate each
//! other, by perceptual similarity (default) or by exact page metadata.
//!
//! ## How It Works
//! 1. Load all `<inode>.txt` manifests in lexical order
//! 2. Walk the archives; the first unclaimed archive becomes a group head
//! 3. Score every other unclaimed archive against the head
//! 4. Archives that pass become the head's duplicates and are claimed,
//!    so they never start a group of their own
//!
//! The similarity pass is deliberately bounded: up to 5 non-blank head
//! hashes against the first 11 candidate pages, at most 55 Hamming
//! comparisons per pair.

use crate::core::archive::Archive;
use crate::core::hasher::hamming;
use crate::core::manifest;
use crate::error::{KagamiError, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Score an archive pair must reach before it counts as a duplicate.
pub const MIN_SCORE: usize = 4;

/// Number of non-blank head fingerprints used for scoring.
const HEAD_HASHES: usize = 5;

/// Number of leading candidate pages scanned for matches.
const CANDIDATE_SCAN: usize = 11;

/// Archives need strictly more pages than this to be considered.
const MIN_PAGES: usize = 5;

/// Matcher tunables, threaded through instead of living in globals.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum Hamming distance for two pages to count as a match (0..=64).
    pub max_image_dist: u32,
    /// Maximum difference in page count between two archives.
    pub max_archive_length_diff: usize,
    /// Match on exact page metadata instead of perceptual similarity.
    pub exact_match: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_image_dist: 3,
            max_archive_length_diff: 10,
            exact_match: false,
        }
    }
}

/// One duplicate group: a head archive and the archives judged to
/// duplicate it.
#[derive(Debug, Clone)]
pub struct DupGroup {
    pub head: Archive,
    pub dups: Vec<Archive>,
}

/// Result of one matcher run.
#[derive(Debug, Default)]
pub struct MatchReport {
    pub groups: Vec<DupGroup>,
    /// Manifests successfully loaded.
    pub loaded: usize,
}

/// Groups similar archives from a directory of manifests.
pub struct DuplicateMatcher {
    config: MatcherConfig,
}

impl DuplicateMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self> {
        if config.max_image_dist > 64 {
            return Err(KagamiError::Config(format!(
                "max image distance {} out of range 0..=64",
                config.max_image_dist
            )));
        }
        Ok(Self { config })
    }

    /// Load every manifest under `dir`, in lexical path order.
    ///
    /// Files whose name is not an inode and manifests that fail to read
    /// are logged and skipped; archives with inode 0 are discarded.
    pub fn load_archives(&self, dir: &Path) -> Result<Vec<Archive>> {
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                !name.starts_with('.') && name.ends_with(".txt")
            })
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();

        let loaded: Vec<Option<Archive>> = paths
            .par_iter()
            .map(|path| match manifest::load(path) {
                Ok(archive) if archive.inode != 0 => Some(archive),
                Ok(_) => {
                    warn!(path = %path.display(), "manifest has inode 0, discarding");
                    None
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot load manifest");
                    None
                }
            })
            .collect();

        Ok(loaded.into_iter().flatten().collect())
    }

    /// Group duplicates over a loaded archive set.
    ///
    /// Heads are chosen in iteration order; claimed archives are never
    /// revisited, so the grouping is not symmetric under reordering.
    pub fn run(&self, archives: &[Archive]) -> MatchReport {
        let mut claimed: HashSet<i64> = HashSet::new();
        let mut groups = Vec::new();

        for head in archives {
            if head.inode == 0 || claimed.contains(&head.inode) {
                continue;
            }

            let dups = if self.config.exact_match {
                self.find_exact_matches(head, archives, &claimed)
            } else {
                self.find_similar_matches(head, archives, &claimed)
            };
            if dups.is_empty() {
                continue;
            }

            // Claim the whole group at once so later heads skip it.
            claimed.insert(head.inode);
            for dup in &dups {
                claimed.insert(dup.inode);
            }
            debug!(head = head.inode, dups = dups.len(), "group found");
            groups.push(DupGroup {
                head: head.clone(),
                dups,
            });
        }

        MatchReport {
            groups,
            loaded: archives.len(),
        }
    }

    /// Perceptual similarity pass: score the first candidate pages against
    /// the head's leading non-blank fingerprints.
    fn find_similar_matches(
        &self,
        head: &Archive,
        archives: &[Archive],
        claimed: &HashSet<i64>,
    ) -> Vec<Archive> {
        let mut dups = Vec::new();

        if head.images.len() <= MIN_PAGES {
            return dups;
        }

        // Blank pages hash to all zeroes and carry no signal.
        let head_hashes: Vec<u64> = head
            .images
            .iter()
            .map(|image| image.phash)
            .filter(|&phash| phash != 0)
            .take(HEAD_HASHES)
            .collect();

        for candidate in archives {
            if candidate.inode == 0
                || candidate.inode == head.inode
                || claimed.contains(&candidate.inode)
            {
                continue;
            }
            if candidate.images.len() <= MIN_PAGES {
                continue;
            }
            if head.images.len().abs_diff(candidate.images.len())
                > self.config.max_archive_length_diff
            {
                continue;
            }

            let mut score = 0;
            for image in candidate.images.iter().take(CANDIDATE_SCAN) {
                for &head_hash in &head_hashes {
                    if hamming(head_hash, image.phash) <= self.config.max_image_dist {
                        score += 1;
                    }
                }
            }

            if score >= MIN_SCORE {
                dups.push(candidate.clone());
            }
        }

        dups
    }

    /// Exact pass: count head pages with an identical
    /// (crc32, size, width, height) tuple in the candidate.
    fn find_exact_matches(
        &self,
        head: &Archive,
        archives: &[Archive],
        claimed: &HashSet<i64>,
    ) -> Vec<Archive> {
        let mut dups = Vec::new();

        for candidate in archives {
            if candidate.inode == 0
                || candidate.inode == head.inode
                || claimed.contains(&candidate.inode)
            {
                continue;
            }
            if head.images.len().abs_diff(candidate.images.len())
                > self.config.max_archive_length_diff
            {
                continue;
            }

            let found = head
                .images
                .iter()
                .filter(|page| {
                    candidate.images.iter().any(|other| {
                        other.crc32 == page.crc32
                            && other.data_size == page.data_size
                            && other.width == page.width
                            && other.height == page.height
                    })
                })
                .count();

            if head.images.len() - found <= self.config.max_archive_length_diff {
                dups.push(candidate.clone());
            }
        }

        dups
    }
}
