//! Hash-based duplicate and exclusion matching.
//!
//! Both matchers are pure: they decide which files to discard and leave the
//! trash moves to the orchestrator.

use slides_media::hamming;
use slides_models::{ExclusionEntry, SlideHash};

/// A file that repeats an earlier kept file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub filename: String,
    pub duplicate_of: String,
    pub distance: u32,
}

/// A file that matches an exclusion list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionMatch {
    pub filename: String,
    pub entry_name: String,
    pub distance: u32,
}

/// Walk hashes in order and flag every file within `threshold` of an earlier kept one.
///
/// Files without a hash are neither kept nor flagged.
pub fn find_duplicates(hashes: &[SlideHash], threshold: u32) -> Vec<DuplicateMatch> {
    let mut kept: Vec<(&str, _)> = Vec::new();
    let mut duplicates = Vec::new();

    for slide in hashes {
        let Some(hash) = slide.p_hash.as_ref() else {
            continue;
        };

        let hit = kept
            .iter()
            .map(|(name, seen)| (*name, hamming(hash, seen)))
            .find(|(_, distance)| *distance <= threshold);

        match hit {
            Some((name, distance)) => duplicates.push(DuplicateMatch {
                filename: slide.filename.clone(),
                duplicate_of: name.to_string(),
                distance,
            }),
            None => kept.push((slide.filename.as_str(), *hash)),
        }
    }

    duplicates
}

/// Flag every hashed file within `threshold` of an active exclusion entry.
///
/// The first matching entry in list order wins.
pub fn find_exclusions<'a, I>(hashes: I, entries: &[&ExclusionEntry], threshold: u32) -> Vec<ExclusionMatch>
where
    I: IntoIterator<Item = &'a SlideHash>,
{
    hashes
        .into_iter()
        .filter_map(|slide| {
            let hash = slide.p_hash.as_ref()?;
            entries
                .iter()
                .filter(|entry| entry.is_active())
                .map(|entry| (entry, hamming(hash, &entry.p_hash)))
                .find(|(_, distance)| *distance <= threshold)
                .map(|(entry, distance)| ExclusionMatch {
                    filename: slide.filename.clone(),
                    entry_name: entry.name.clone(),
                    distance,
                })
        })
        .collect()
}
