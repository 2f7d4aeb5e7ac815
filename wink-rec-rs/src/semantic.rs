//! Tag-based semantic search over the tagged corpus.
//!
//! Retrieval pulls an oversampled pool of candidates nearest to the joined
//! keyword query; each candidate is then re-scored by blending per-keyword
//! similarity, separate genre/mood similarity and a literal tag-match bonus,
//! and only the best song of each album survives.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::backend::EmbeddingBackend;
use crate::config::SemanticConfig;
use crate::corpus::{sort_by_score, ScoredCandidate, TaggedSong, Track};
use crate::error::{RecError, Result};
use crate::keywords::KeywordSet;
use crate::vector::EmbeddingVector;

/// Vector-similarity access to the tagged corpus.
pub trait SongIndex {
    /// Up to `k` `(song, distance)` pairs, nearest first; distance is `1 - cosine`.
    fn search_by_vector(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<(TaggedSong, f32)>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Brute-force index over the tag-text embeddings of every song.
pub struct InMemorySongIndex {
    songs: Vec<TaggedSong>,
    vectors: Vec<EmbeddingVector>,
}

impl InMemorySongIndex {
    pub fn build<B: EmbeddingBackend>(backend: &B, songs: Vec<TaggedSong>) -> Result<Self> {
        let texts: Vec<String> = songs.iter().map(TaggedSong::tag_text).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors: Vec<EmbeddingVector> = backend
            .embed_text(&refs)?
            .into_iter()
            .map(EmbeddingVector::normalized)
            .collect();
        if vectors.len() != songs.len() {
            return Err(RecError::Backend(format!(
                "expected {} embeddings, got {}",
                songs.len(),
                vectors.len()
            )));
        }
        debug!(songs = songs.len(), "indexed tagged corpus");
        Ok(Self { songs, vectors })
    }

    pub fn songs(&self) -> &[TaggedSong] {
        &self.songs
    }
}

impl SongIndex for InMemorySongIndex {
    fn search_by_vector(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<(TaggedSong, f32)>> {
        let mut hits: Vec<(usize, f32)> = Vec::with_capacity(self.vectors.len());
        for (i, v) in self.vectors.iter().enumerate() {
            hits.push((i, 1.0 - query.dot(v)?));
        }
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(hits
            .into_iter()
            .take(k)
            .map(|(i, d)| (self.songs[i].clone(), d))
            .collect())
    }

    fn len(&self) -> usize {
        self.songs.len()
    }
}

pub struct SemanticRanker<'a, B: EmbeddingBackend, I: SongIndex> {
    backend: &'a B,
    index: &'a I,
    cfg: &'a SemanticConfig,
}

impl<'a, B: EmbeddingBackend, I: SongIndex> SemanticRanker<'a, B, I> {
    pub fn new(backend: &'a B, index: &'a I, cfg: &'a SemanticConfig) -> Self {
        Self {
            backend,
            index,
            cfg,
        }
    }

    fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        Ok(EmbeddingVector::normalized(self.backend.embed_query(text)?))
    }

    /// Rank up to `top_k` songs for `keywords`, drawing on a retrieval pool of
    /// `pool` candidates. At most one song per album is returned.
    pub fn rank(
        &self,
        keywords: &KeywordSet,
        top_k: usize,
        pool: usize,
    ) -> Result<Vec<ScoredCandidate<TaggedSong>>> {
        if keywords.is_empty() {
            return Err(RecError::EmptyQuery);
        }
        let kw_refs: Vec<&str> = keywords.tokens().iter().map(String::as_str).collect();
        let keyword_vecs: Vec<EmbeddingVector> = self
            .backend
            .embed_text(&kw_refs)?
            .into_iter()
            .map(EmbeddingVector::normalized)
            .collect();
        let query_text = keywords.joined();
        let query_vec = self.embed(&query_text)?;

        let pool_hits = self.index.search_by_vector(&query_vec, pool)?;
        debug!(pool = pool_hits.len(), query = %query_text, "semantic candidate pool");
        if pool_hits.is_empty() {
            return Ok(Vec::new());
        }

        // tag text, genre, mood for every candidate in a single batch
        let texts: Vec<String> = pool_hits
            .iter()
            .flat_map(|(s, _)| [s.tag_text(), s.genre().to_string(), s.mood().to_string()])
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vecs: Vec<EmbeddingVector> = self
            .backend
            .embed_text(&refs)?
            .into_iter()
            .map(EmbeddingVector::normalized)
            .collect();
        if vecs.len() != texts.len() {
            return Err(RecError::Backend(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vecs.len()
            )));
        }

        let lowered: Vec<String> = keywords.tokens().iter().map(|k| k.to_lowercase()).collect();
        let mut scored = Vec::with_capacity(pool_hits.len());
        for ((song, _), v) in pool_hits.into_iter().zip(vecs.chunks(3)) {
            let (tag_vec, genre_vec, mood_vec) = (&v[0], &v[1], &v[2]);

            let mut kw_sum = 0.0;
            for kv in &keyword_vecs {
                kw_sum += tag_vec.dot(kv)?;
            }
            let kw_mean = kw_sum / keyword_vecs.len() as f32;

            let genre_mood = self.cfg.genre_weight * genre_vec.dot(&query_vec)?
                + self.cfg.mood_weight * mood_vec.dot(&query_vec)?;

            let tag_text = song.tag_text().to_lowercase();
            let matches = lowered.iter().filter(|k| tag_text.contains(k.as_str())).count();
            let bonus = self.cfg.tag_bonus * matches as f32;

            let score =
                self.cfg.keyword_weight * kw_mean + self.cfg.genre_mood_weight * genre_mood + bonus;
            scored.push(ScoredCandidate::new(song, score));
        }

        let mut best = dedup_by_album(scored);
        sort_by_score(&mut best);
        best.truncate(top_k);
        Ok(best)
    }
}

/// Albums with a blank name share this key.
pub const UNKNOWN_ALBUM: &str = "Unknown";

/// Keep the highest-scoring candidate per album, in first-seen order.
/// Songs without an album name all fall into the [`UNKNOWN_ALBUM`] group.
pub fn dedup_by_album<T: Track>(candidates: Vec<ScoredCandidate<T>>) -> Vec<ScoredCandidate<T>> {
    let mut slot: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ScoredCandidate<T>> = Vec::new();
    for c in candidates {
        let album = match c.album().trim() {
            "" => UNKNOWN_ALBUM,
            a => a,
        };
        match slot.get(album) {
            Some(&i) => {
                if c.score > out[i].score {
                    out[i] = c;
                }
            }
            None => {
                slot.insert(album.to_string(), out.len());
                out.push(c);
            }
        }
    }
    out
}

/// Random sample of up to `n` songs that carry mood tags, standing in for
/// what nearby listeners are playing.
pub fn sample_with_mood<'a, R: Rng + ?Sized>(
    songs: &'a [TaggedSong],
    n: usize,
    rng: &mut R,
) -> Result<Vec<&'a TaggedSong>> {
    let with_mood: Vec<&TaggedSong> = songs.iter().filter(|s| s.has_mood()).collect();
    if with_mood.is_empty() {
        return Err(RecError::Invalid("no songs with mood tags".into()));
    }
    Ok(with_mood.choose_multiple(rng, n).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HashingBackend;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn song(id: &str, album: &str, genre: &str, mood: &str) -> TaggedSong {
        TaggedSong {
            track_id: id.into(),
            track_name: format!("Song {id}"),
            artist_name: "Artist".into(),
            album_name: album.into(),
            genre_tags: Some(genre.into()).filter(|g: &String| !g.is_empty()),
            mood_tags: Some(mood.into()).filter(|m: &String| !m.is_empty()),
            duration: None,
            url: None,
        }
    }

    fn ranker_fixture(songs: Vec<TaggedSong>) -> (HashingBackend, InMemorySongIndex, SemanticConfig) {
        let backend = HashingBackend::default();
        let index = InMemorySongIndex::build(&backend, songs).unwrap();
        (backend, index, SemanticConfig::default())
    }

    #[test]
    fn empty_query_fails_fast() {
        let (b, i, c) = ranker_fixture(vec![song("t1", "A", "jazz", "calm")]);
        let r = SemanticRanker::new(&b, &i, &c);
        assert!(matches!(
            r.rank(&KeywordSet::default(), 5, 80),
            Err(RecError::EmptyQuery)
        ));
    }

    #[test]
    fn matching_tags_rank_first() {
        let (b, i, c) = ranker_fixture(vec![
            song("t1", "A", "metal", "angry"),
            song("t2", "B", "jazz", "calm rain"),
            song("t3", "C", "pop", "happy"),
        ]);
        let r = SemanticRanker::new(&b, &i, &c);
        let out = r.rank(&KeywordSet::parse("calm rain"), 3, 80).unwrap();
        assert_eq!(out[0].record.track_id, "t2");
        // both keywords appear literally in the tags
        assert!(out[0].score > 2.0 * c.tag_bonus);
        for w in out.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn one_song_per_album() {
        let songs: Vec<TaggedSong> = (0..10)
            .map(|n| song(&format!("t{n}"), "Same Album", "jazz", "calm"))
            .collect();
        let (b, i, c) = ranker_fixture(songs);
        let r = SemanticRanker::new(&b, &i, &c);
        let out = r.rank(&KeywordSet::parse("calm jazz"), 5, 80).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn missing_tags_score_without_bonus() {
        let (b, i, c) = ranker_fixture(vec![song("t1", "A", "", "")]);
        let r = SemanticRanker::new(&b, &i, &c);
        let out = r.rank(&KeywordSet::parse("calm"), 5, 80).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.0);
    }

    #[test]
    fn dedup_keeps_best_and_groups_albumless_songs() {
        let cands = vec![
            ScoredCandidate::new(song("a", "X", "", ""), 0.2),
            ScoredCandidate::new(song("b", "X", "", ""), 0.9),
            ScoredCandidate::new(song("c", "", "", ""), 0.1),
            ScoredCandidate::new(song("d", "  ", "", ""), 0.3),
        ];
        let out = dedup_by_album(cands);
        let ids: Vec<&str> = out.iter().map(|c| c.id()).collect();
        assert_eq!(ids, ["b", "d"]);
    }

    #[test]
    fn albumless_corpus_yields_one_song() {
        let songs: Vec<TaggedSong> = (0..10)
            .map(|n| song(&format!("t{n}"), "", "jazz", "calm"))
            .collect();
        let (b, i, c) = ranker_fixture(songs);
        let r = SemanticRanker::new(&b, &i, &c);
        let out = r.rank(&KeywordSet::parse("calm jazz"), 5, 80).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn index_returns_nearest_first() {
        let (b, i, _) = ranker_fixture(vec![
            song("t1", "A", "metal", "angry"),
            song("t2", "B", "jazz", "calm"),
        ]);
        let query = EmbeddingVector::normalized(b.embed_query("calm jazz").unwrap());
        let hits = i.search_by_vector(&query, 1).unwrap();
        assert_eq!(i.len(), 2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.track_id, "t2");
        assert!(hits[0].1.abs() < 1e-5);
    }

    #[test]
    fn sample_only_picks_songs_with_mood() {
        let songs = vec![
            song("t1", "A", "jazz", "calm"),
            song("t2", "B", "rock", ""),
            song("t3", "C", "pop", "happy"),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        let picked = sample_with_mood(&songs, 5, &mut rng).unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|s| s.has_mood()));
        assert!(sample_with_mood(&songs[1..2], 1, &mut rng).is_err());
    }
}
