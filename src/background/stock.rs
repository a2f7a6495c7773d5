//! Stock-footage selection
//!
//! Candidates are scored on duration fit, orientation and tag overlap with
//! the search keywords; the best one is downloaded.

use std::path::Path;

use tracing::{debug, instrument};

use crate::media::Orientation;
use crate::providers::{ProviderError, StockCandidate, StockFile, StockMediaSearch};

const DURATION_POINTS: u32 = 3;
const ORIENTATION_POINTS: u32 = 2;
const KEYWORD_POINTS: u32 = 2;

/// Acceptable clip length around a target duration
#[must_use]
pub fn duration_window(target_secs: f64) -> (f64, f64) {
    (target_secs.min(15.0), (target_secs * 1.5).max(60.0))
}

/// Score one candidate; higher is better
#[must_use]
pub fn score(
    candidate: &StockCandidate,
    keywords: &[String],
    orientation: Orientation,
    target_secs: f64,
) -> u32 {
    let mut score = 0;

    let (low, high) = duration_window(target_secs);
    if (low..=high).contains(&candidate.duration_secs) {
        score += DURATION_POINTS;
    }
    if candidate
        .files
        .iter()
        .any(|f| f.orientation() == Some(orientation))
    {
        score += ORIENTATION_POINTS;
    }
    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if candidate.tags.iter().any(|tag| tag.contains(&keyword)) {
            score += KEYWORD_POINTS;
        }
    }
    score
}

/// Highest-scoring candidate with at least one file; ties keep the earlier
#[must_use]
pub fn pick<'a>(
    candidates: &'a [StockCandidate],
    keywords: &[String],
    orientation: Orientation,
    target_secs: f64,
) -> Option<&'a StockCandidate> {
    let mut best: Option<(&StockCandidate, u32)> = None;
    for candidate in candidates.iter().filter(|c| !c.files.is_empty()) {
        let points = score(candidate, keywords, orientation, target_secs);
        if best.is_none_or(|(_, top)| points > top) {
            best = Some((candidate, points));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Rendition to download: HD in the right orientation, then any file in
/// the right orientation, then the first file
#[must_use]
pub fn pick_file(candidate: &StockCandidate, orientation: Orientation) -> Option<&StockFile> {
    let oriented = |f: &&StockFile| f.orientation() == Some(orientation);
    candidate
        .files
        .iter()
        .filter(oriented)
        .find(|f| f.is_hd())
        .or_else(|| candidate.files.iter().find(oriented))
        .or_else(|| candidate.files.first())
}

/// A downloaded clip
#[derive(Debug, Clone, PartialEq)]
pub struct StockClip {
    pub id: String,
    pub page_url: String,
    pub size: u64,
}

/// Search, pick and download the best clip into `dest`.
///
/// `Ok(None)` when the search has nothing usable.
#[instrument(skip(search, keywords, dest), fields(provider = search.name()))]
pub async fn fetch_best(
    search: &dyn StockMediaSearch,
    keywords: &[String],
    orientation: Orientation,
    target_secs: f64,
    dest: &Path,
) -> Result<Option<StockClip>, ProviderError> {
    let candidates = search.search(keywords, orientation).await?;
    debug!(candidates = candidates.len(), "Stock search returned");

    let Some(candidate) = pick(&candidates, keywords, orientation, target_secs) else {
        return Ok(None);
    };
    let Some(file) = pick_file(candidate, orientation) else {
        return Ok(None);
    };

    let size = search.fetch(&file.link, dest).await?;
    if size == 0 {
        return Err(ProviderError::Decode(format!(
            "stock clip {} downloaded empty",
            candidate.id
        )));
    }
    debug!(id = %candidate.id, size, "Downloaded stock clip");
    Ok(Some(StockClip {
        id: candidate.id.clone(),
        page_url: candidate.page_url.clone(),
        size,
    }))
}
