//! Pairwise matching of fingerprints.
//!
//! All-pairs mode compares every unordered pair once. Before the full
//! three-hash score is computed, the perceptual-hash distance alone is checked
//! against a ceiling derived from the threshold; pairs above the ceiling are
//! skipped.
//!
//! The ceiling uses the lower of two cuts:
//!
//! * `threshold - prefilter_slack`, the configurable heuristic, and
//! * `2 * threshold - 100`, the lowest perceptual similarity a pair can have
//!   and still reach `threshold` when the other two hashes match perfectly.
//!
//! The second cut guarantees that no pair scoring at or above the threshold
//! is ever skipped, whatever slack is configured.

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::cancel::CancelToken;
use crate::config::MatchParams;
use crate::processing::progress::StageProgress;
use crate::processing::types::ImageFingerprint;
use crate::similarity::{combined_similarity, PHASH_WEIGHT};

/// Absorbs float error so a distance sitting exactly on the bound passes
const BOUND_EPSILON: f64 = 1e-9;

/// Two images whose combined similarity reached the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub a: PathBuf,
    pub b: PathBuf,
    pub similarity: f64,
}

/// An image matched against a reference image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMatch {
    pub path: PathBuf,
    pub similarity: f64,
}

/// Result of an all-pairs comparison
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Qualifying pairs in row-major order
    pub edges: Vec<SimilarityEdge>,
    /// Pairs that were fully scored
    pub comparisons: usize,
    /// Pairs rejected by the perceptual-hash pre-filter
    pub skipped: usize,
    /// Whether some rows were left uncompared because of cancellation
    pub cancelled: bool,
}

/// The perceptual similarity cut the pre-filter applies
pub fn prefilter_cut(params: &MatchParams) -> f64 {
    let heuristic = params.threshold - params.prefilter_slack;
    let exact = (params.threshold - (1.0 - PHASH_WEIGHT) * 100.0) / PHASH_WEIGHT;
    heuristic.min(exact)
}

/// Largest perceptual-hash distance a pair may have and still be fully scored
pub fn prefilter_max_distance(params: &MatchParams) -> f64 {
    let cut = prefilter_cut(params).max(0.0);
    params.bit_length() as f64 * (1.0 - cut / 100.0) + BOUND_EPSILON
}

/// Whether a pair at perceptual distance `distance` survives the pre-filter
pub fn passes_prefilter(distance: u32, max_distance: f64) -> bool {
    distance as f64 <= max_distance
}

/// Compare every unordered pair of `fingerprints` on the current rayon pool.
///
/// Rows of the outer index run in parallel and each row checks `cancel`
/// before it starts. Edges come back in row-major order regardless of
/// scheduling.
pub(crate) fn find_similar_pairs(
    fingerprints: &[ImageFingerprint],
    params: &MatchParams,
    progress: &StageProgress<'_>,
    cancel: &CancelToken,
) -> MatchOutcome {
    let n = fingerprints.len();
    let max_distance = prefilter_max_distance(params);
    let comparisons = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let skipped_row = AtomicBool::new(false);

    debug!(
        "Pre-filter admits perceptual distance up to {:.2} of {} bits",
        max_distance,
        params.bit_length()
    );

    let rows: Vec<Vec<SimilarityEdge>> = (0..n)
        .into_par_iter()
        .map(|i| {
            if cancel.is_cancelled() {
                // The last row has no pairs, so skipping it loses nothing
                if i + 1 < n {
                    skipped_row.store(true, Ordering::Relaxed);
                }
                return Vec::new();
            }

            let left = &fingerprints[i];
            let mut edges = Vec::new();
            let mut row_skipped = 0;
            for right in &fingerprints[i + 1..] {
                if left.path == right.path {
                    continue;
                }
                if !passes_prefilter(left.phash.distance(&right.phash), max_distance) {
                    row_skipped += 1;
                    continue;
                }
                let similarity = combined_similarity(left, right);
                if similarity >= params.threshold {
                    edges.push(SimilarityEdge {
                        a: left.path.clone(),
                        b: right.path.clone(),
                        similarity,
                    });
                }
            }

            let row_len = n - i - 1;
            skipped.fetch_add(row_skipped, Ordering::Relaxed);
            comparisons.fetch_add(row_len - row_skipped, Ordering::Relaxed);
            progress.advance(row_len, || {
                format!("Compared {}", left.path.display())
            });
            edges
        })
        .collect();

    let outcome = MatchOutcome {
        edges: rows.into_iter().flatten().collect(),
        comparisons: comparisons.into_inner(),
        skipped: skipped.into_inner(),
        cancelled: skipped_row.into_inner(),
    };

    info!(
        "Compared {} pairs ({} pre-filtered), found {} similar{}",
        outcome.comparisons,
        outcome.skipped,
        outcome.edges.len(),
        if outcome.cancelled { " (cancelled)" } else { "" }
    );
    outcome
}

/// Score every candidate against `reference`, strongest match first.
///
/// No pre-filter is applied. Candidates with the reference's own path are
/// ignored. Returns the matches and whether cancellation left any candidate
/// unscored.
pub(crate) fn rank_against_reference(
    reference: &ImageFingerprint,
    candidates: &[ImageFingerprint],
    params: &MatchParams,
    progress: &StageProgress<'_>,
    cancel: &CancelToken,
) -> (Vec<ReferenceMatch>, bool) {
    let skipped_candidate = AtomicBool::new(false);
    let scored: Vec<Option<ReferenceMatch>> = candidates
        .par_iter()
        .map(|candidate| {
            if candidate.path == reference.path {
                return None;
            }
            if cancel.is_cancelled() {
                skipped_candidate.store(true, Ordering::Relaxed);
                return None;
            }
            let similarity = combined_similarity(reference, candidate);
            progress.advance(1, || format!("Compared {}", candidate.path.display()));
            (similarity >= params.threshold).then(|| ReferenceMatch {
                path: candidate.path.clone(),
                similarity,
            })
        })
        .collect();

    let mut matches: Vec<ReferenceMatch> = scored.into_iter().flatten().collect();
    // Stable: equal scores keep candidate order
    matches.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));

    debug!(
        "Reference {} matched {} of {} candidates",
        reference.path.display(),
        matches.len(),
        candidates.len()
    );
    (matches, skipped_candidate.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deduplication::build_groups;
    use crate::processing::progress::{NoProgress, ProgressEvent, ProgressSink, Stage};
    use crate::processing::types::{HashBits, ImageHashes};
    use proptest::prelude::*;

    fn bits_with_distance(distance: u32) -> HashBits {
        let mut bits = HashBits::zeros(64);
        for i in 0..distance as usize {
            bits.set(i, true);
        }
        bits
    }

    fn fp(name: &str, phash: HashBits, ahash: HashBits, dhash: HashBits) -> ImageFingerprint {
        ImageFingerprint::new(format!("/photos/{}", name), ImageHashes { phash, ahash, dhash })
    }

    /// Fingerprint whose three hashes all equal `bits`
    fn uniform(name: &str, bits: HashBits) -> ImageFingerprint {
        fp(name, bits.clone(), bits.clone(), bits)
    }

    fn run_pairs(fingerprints: &[ImageFingerprint], params: &MatchParams) -> MatchOutcome {
        let total = fingerprints.len() * fingerprints.len().saturating_sub(1) / 2;
        let progress = StageProgress::new(&NoProgress, Stage::Compare, total, 50);
        find_similar_pairs(fingerprints, params, &progress, &CancelToken::new())
    }

    #[test]
    fn test_prefilter_bound_defaults() {
        // threshold 80, slack 10: heuristic cut 70, exact cut 60
        let params = MatchParams::new(80.0, 8);
        assert!((prefilter_cut(&params) - 60.0).abs() < 1e-9);
        assert!((prefilter_max_distance(&params) - 25.6).abs() < 1e-6);

        // threshold 95: heuristic 85 is the lower cut
        let params = MatchParams::new(95.0, 8);
        assert!((prefilter_cut(&params) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_threshold_disables_prefilter() {
        let params = MatchParams::new(40.0, 8);
        assert!(prefilter_max_distance(&params) >= 64.0);
        assert!(passes_prefilter(64, prefilter_max_distance(&params)));
    }

    #[test]
    fn test_transitive_scenario_edges() {
        // A at distance 4 from B, B at distance 4 from C, A at distance 8 from C
        let a = uniform("a.png", bits_with_distance(0));
        let mut b_bits = bits_with_distance(4);
        let b = uniform("b.png", b_bits.clone());
        for i in 4..8 {
            b_bits.set(i, true);
        }
        let c = uniform("c.png", b_bits);

        assert!(combined_similarity(&a, &b) > 90.0);
        assert!(combined_similarity(&b, &c) > 90.0);
        assert!(combined_similarity(&a, &c) < 90.0);

        let fingerprints = vec![a, b, c];
        let outcome = run_pairs(&fingerprints, &MatchParams::new(90.0, 8));
        let pairs: Vec<(String, String)> = outcome
            .edges
            .iter()
            .map(|e| (e.a.display().to_string(), e.b.display().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("/photos/a.png".to_string(), "/photos/b.png".to_string()),
                ("/photos/b.png".to_string(), "/photos/c.png".to_string()),
            ]
        );
        assert_eq!(outcome.comparisons + outcome.skipped, 3);
        assert!(!outcome.cancelled);

        // A and C end up together through B
        let groups = build_groups(&outcome.edges, &fingerprints);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].members,
            vec![
                PathBuf::from("/photos/a.png"),
                PathBuf::from("/photos/b.png"),
                PathBuf::from("/photos/c.png"),
            ]
        );
    }

    #[test]
    fn test_far_pairs_are_prefiltered() {
        let a = uniform("a.png", HashBits::from_u64(0, 64));
        let b = uniform("b.png", HashBits::from_u64(u64::MAX, 64));
        let outcome = run_pairs(&[a, b], &MatchParams::new(80.0, 8));
        assert!(outcome.edges.is_empty());
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.comparisons, 0);
    }

    #[test]
    fn test_same_path_never_pairs_with_itself() {
        let a = uniform("a.png", HashBits::from_u64(7, 64));
        let outcome = run_pairs(&[a.clone(), a], &MatchParams::new(50.0, 8));
        assert!(outcome.edges.is_empty());
    }

    #[test]
    fn test_reference_mode_sorted_descending() {
        let reference = uniform("ref.png", bits_with_distance(0));
        let candidates = vec![
            uniform("far1.png", bits_with_distance(40)),
            uniform("close.png", bits_with_distance(6)),
            uniform("far2.png", bits_with_distance(30)),
            uniform("closest.png", bits_with_distance(1)),
            uniform("far3.png", bits_with_distance(50)),
        ];

        let progress = StageProgress::new(&NoProgress, Stage::Compare, candidates.len(), 50);
        let (matches, cancelled) = rank_against_reference(
            &reference,
            &candidates,
            &MatchParams::new(85.0, 8),
            &progress,
            &CancelToken::new(),
        );

        assert!(!cancelled);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path, PathBuf::from("/photos/closest.png"));
        assert_eq!(matches[1].path, PathBuf::from("/photos/close.png"));
        assert!(matches[0].similarity > matches[1].similarity);
    }

    #[test]
    fn test_reference_skips_itself() {
        let reference = uniform("ref.png", bits_with_distance(0));
        let progress = StageProgress::new(&NoProgress, Stage::Compare, 1, 50);
        let (matches, _) = rank_against_reference(
            &reference,
            &[reference.clone()],
            &MatchParams::new(50.0, 8),
            &progress,
            &CancelToken::new(),
        );
        assert!(matches.is_empty());
    }

    /// Cancels the run once a given number of comparisons has been reported
    struct CancelAfter {
        token: CancelToken,
        after: usize,
    }

    impl ProgressSink for CancelAfter {
        fn report(&self, event: ProgressEvent) {
            if event.processed >= self.after {
                self.token.cancel();
            }
        }
    }

    #[test]
    fn test_cancellation_mid_run_returns_partial_edges() {
        let n = 1000;
        let bits = HashBits::from_u64(0xDEAD_BEEF, 64);
        let fingerprints: Vec<ImageFingerprint> = (0..n)
            .map(|i| uniform(&format!("img{:04}.png", i), bits.clone()))
            .collect();
        let total = n * (n - 1) / 2;

        let token = CancelToken::new();
        let sink = CancelAfter {
            token: token.clone(),
            after: total / 10,
        };
        let progress = StageProgress::new(&sink, Stage::Compare, total, 50);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();

        let outcome = pool.install(|| {
            find_similar_pairs(&fingerprints, &MatchParams::new(90.0, 8), &progress, &token)
        });

        assert!(outcome.cancelled);
        assert!(!outcome.edges.is_empty());
        assert!(outcome.edges.len() < total);
    }

    /// Cancels the token once the stage reports its last unit
    struct CancelAtEnd(CancelToken);

    impl ProgressSink for CancelAtEnd {
        fn report(&self, event: ProgressEvent) {
            if event.processed == event.total {
                self.0.cancel();
            }
        }
    }

    #[test]
    fn test_cancel_after_last_row_keeps_result_complete() {
        let bits = HashBits::from_u64(0xF0F0, 64);
        let fingerprints: Vec<ImageFingerprint> = (0..40)
            .map(|i| uniform(&format!("img{:02}.png", i), bits.clone()))
            .collect();
        let total = 40 * 39 / 2;

        let token = CancelToken::new();
        let sink = CancelAtEnd(token.clone());
        let progress = StageProgress::new(&sink, Stage::Compare, total, 50);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();

        let outcome = pool.install(|| {
            find_similar_pairs(&fingerprints, &MatchParams::new(90.0, 8), &progress, &token)
        });

        assert!(token.is_cancelled());
        assert!(!outcome.cancelled);
        assert_eq!(outcome.edges.len(), total);
    }

    #[test]
    fn test_reference_cancel_after_last_candidate_keeps_result_complete() {
        let reference = uniform("ref.png", bits_with_distance(0));
        let candidates: Vec<ImageFingerprint> = (0..6)
            .map(|i| uniform(&format!("c{}.png", i), bits_with_distance(i)))
            .collect();

        let token = CancelToken::new();
        let sink = CancelAtEnd(token.clone());
        let progress = StageProgress::new(&sink, Stage::Compare, candidates.len(), 50);
        let (matches, cancelled) = rank_against_reference(
            &reference,
            &candidates,
            &MatchParams::new(50.0, 8),
            &progress,
            &token,
        );

        assert!(token.is_cancelled());
        assert!(!cancelled);
        assert_eq!(matches.len(), 6);
    }

    #[test]
    fn test_reference_cancelled_up_front_is_flagged() {
        let reference = uniform("ref.png", bits_with_distance(0));
        let candidates = vec![uniform("c.png", bits_with_distance(1))];
        let token = CancelToken::new();
        token.cancel();

        let progress = StageProgress::new(&NoProgress, Stage::Compare, 1, 50);
        let (matches, cancelled) = rank_against_reference(
            &reference,
            &candidates,
            &MatchParams::new(50.0, 8),
            &progress,
            &token,
        );
        assert!(cancelled);
        assert!(matches.is_empty());
    }

    proptest! {
        /// Any pair at or above the threshold must survive the pre-filter
        #[test]
        fn prop_prefilter_has_no_false_negatives(
            p_dist in 0u32..=64,
            a_dist in 0u32..=64,
            d_dist in 0u32..=64,
            threshold in 0.0f64..=100.0,
            slack in 0.0f64..=30.0,
        ) {
            let zero = bits_with_distance(0);
            let x = fp("x.png", zero.clone(), zero.clone(), zero);
            let y = fp(
                "y.png",
                bits_with_distance(p_dist),
                bits_with_distance(a_dist),
                bits_with_distance(d_dist),
            );
            let params = MatchParams { threshold, hash_size: 8, prefilter_slack: slack };

            if combined_similarity(&x, &y) >= threshold {
                prop_assert!(passes_prefilter(p_dist, prefilter_max_distance(&params)));
            }
        }

        /// At the exact boundary distance the best possible pair still passes
        #[test]
        fn prop_boundary_distance_passes(p_dist in 0u32..=64) {
            let zero = bits_with_distance(0);
            let x = fp("x.png", zero.clone(), zero.clone(), zero.clone());
            let y = fp("y.png", bits_with_distance(p_dist), zero.clone(), zero);
            let threshold = combined_similarity(&x, &y);
            let params = MatchParams { threshold, hash_size: 8, prefilter_slack: 0.0 };
            prop_assert!(passes_prefilter(p_dist, prefilter_max_distance(&params)));
        }
    }
}
