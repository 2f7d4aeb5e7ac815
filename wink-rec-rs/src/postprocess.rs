//! Result post-processing: drop already-recommended and blocklisted tracks,
//! widen the search once when too few candidates survive.

use std::collections::HashSet;

use tracing::info;

use crate::corpus::{ScoredCandidate, Track};
use crate::error::Result;

/// Case-insensitive album-name blocklist.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    album_substrings: Vec<String>,
}

impl ExclusionFilter {
    pub fn new<I, S>(album_substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            album_substrings: album_substrings
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn excludes<T: Track>(&self, track: &T) -> bool {
        if self.album_substrings.is_empty() {
            return false;
        }
        let album = track.album().to_lowercase();
        self.album_substrings.iter().any(|s| album.contains(s.as_str()))
    }
}

/// Which ranking pass is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Primary,
    /// Larger oversampling after the primary pass came up short
    Widened,
}

/// Drop seen, blocklisted and repeated identifiers, preserving order.
pub fn filter_candidates<T: Track>(
    candidates: Vec<ScoredCandidate<T>>,
    seen: &HashSet<String>,
    exclusion: &ExclusionFilter,
) -> Vec<ScoredCandidate<T>> {
    let mut emitted: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            !seen.contains(c.id()) && !exclusion.excludes(c) && emitted.insert(c.id().to_string())
        })
        .collect()
}

/// Run `rank` for the primary pass and filter the result; if fewer than
/// `want` candidates remain, run the widened pass once and filter again.
/// Returns at most `want` candidates and never fails on under-supply.
pub fn select_with_fallback<T, F>(
    want: usize,
    seen: &HashSet<String>,
    exclusion: &ExclusionFilter,
    mut rank: F,
) -> Result<Vec<ScoredCandidate<T>>>
where
    T: Track,
    F: FnMut(Pass) -> Result<Vec<ScoredCandidate<T>>>,
{
    let mut picked = filter_candidates(rank(Pass::Primary)?, seen, exclusion);
    if picked.len() < want {
        info!(
            have = picked.len(),
            want, "too few candidates after filtering, widening search"
        );
        let widened = filter_candidates(rank(Pass::Widened)?, seen, exclusion);
        if widened.len() >= picked.len() {
            picked = widened;
        }
    }
    picked.truncate(want);
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::TaggedSong;

    fn cand(id: &str, album: &str, score: f32) -> ScoredCandidate<TaggedSong> {
        ScoredCandidate::new(
            TaggedSong {
                track_id: id.into(),
                track_name: id.into(),
                artist_name: String::new(),
                album_name: album.into(),
                genre_tags: None,
                mood_tags: None,
                duration: None,
                url: None,
            },
            score,
        )
    }

    fn ids(v: &[ScoredCandidate<TaggedSong>]) -> Vec<&str> {
        v.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn takes_top_three_of_five() {
        let pool: Vec<_> = (0..5)
            .map(|i| cand(&format!("t{i}"), &format!("A{i}"), 1.0 - i as f32 * 0.1))
            .collect();
        let out = select_with_fallback(3, &HashSet::new(), &ExclusionFilter::default(), |_| {
            Ok(pool.clone())
        })
        .unwrap();
        assert_eq!(ids(&out), ["t0", "t1", "t2"]);
    }

    #[test]
    fn blocklist_is_case_insensitive() {
        let f = ExclusionFilter::new(["Fly"]);
        assert!(f.excludes(&cand("a", "Fly Me Away", 0.0)));
        assert!(f.excludes(&cand("b", "butterfly", 0.0)));
        assert!(!f.excludes(&cand("c", "Ground", 0.0)));
    }

    #[test]
    fn seen_tracks_never_return_even_after_widening() {
        let seen: HashSet<String> = ["t0", "t1", "t5"].iter().map(|s| s.to_string()).collect();
        let mut passes = Vec::new();
        let out = select_with_fallback(3, &seen, &ExclusionFilter::default(), |pass| {
            passes.push(pass);
            Ok(match pass {
                Pass::Primary => vec![cand("t0", "A", 0.9), cand("t1", "B", 0.8), cand("t2", "C", 0.7)],
                Pass::Widened => (0..8)
                    .map(|i| cand(&format!("t{i}"), &format!("A{i}"), 1.0 - i as f32 * 0.1))
                    .collect(),
            })
        })
        .unwrap();
        assert_eq!(passes, [Pass::Primary, Pass::Widened]);
        assert_eq!(ids(&out), ["t2", "t3", "t4"]);
        assert!(out.iter().all(|c| !seen.contains(c.id())));
    }

    #[test]
    fn under_supply_returns_short_list() {
        let seen: HashSet<String> = ["t0".to_string()].into_iter().collect();
        let out = select_with_fallback(3, &seen, &ExclusionFilter::new(["bad"]), |_| {
            Ok(vec![cand("t0", "A", 0.9), cand("t1", "bad album", 0.8), cand("t2", "C", 0.7)])
        })
        .unwrap();
        assert_eq!(ids(&out), ["t2"]);
    }

    #[test]
    fn repeated_ids_are_collapsed() {
        let out = filter_candidates(
            vec![cand("t1", "A", 0.9), cand("t1", "A", 0.8), cand("t2", "B", 0.7)],
            &HashSet::new(),
            &ExclusionFilter::default(),
        );
        assert_eq!(ids(&out), ["t1", "t2"]);
    }
}
