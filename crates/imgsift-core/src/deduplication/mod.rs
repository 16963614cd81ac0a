//! Grouping of similar images.
//!
//! Similarity edges are treated as an undirected graph and every connected
//! component with at least two images becomes one [`SimilarityGroup`]. Groups
//! are transitive: A and C share a group when A~B and B~C qualify, even if
//! A~C alone would not.

pub mod best_pick;

pub use best_pick::{best_of, discard_candidates, score_image};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::matching::{ReferenceMatch, SimilarityEdge};
use crate::processing::types::ImageFingerprint;
use crate::similarity::{combined_similarity, round2};
use crate::types::HashFailure;

/// A set of images connected by similarity edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGroup {
    pub members: Vec<PathBuf>,

    /// Mean combined similarity over every member pair, at grouping time
    pub average_similarity: f64,
}

impl SimilarityGroup {
    pub fn new(members: Vec<PathBuf>) -> Self {
        Self {
            members,
            average_similarity: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.members.iter().any(|member| member == path)
    }

    /// Remove `path`, returning whether it was a member
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != path);
        self.members.len() != before
    }

    /// A group with one or no members left no longer groups anything
    pub fn is_dissolved(&self) -> bool {
        self.members.len() <= 1
    }
}

/// Connected components of the similarity graph.
///
/// Members appear in the order their paths are first seen in `edges`; groups
/// are sorted by descending size, ties keeping first-seen order.
pub fn group_edges(edges: &[SimilarityEdge]) -> Vec<SimilarityGroup> {
    let mut index: HashMap<&Path, usize> = HashMap::new();
    let mut nodes: Vec<&Path> = Vec::new();
    let mut adjacency: Vec<Vec<usize>> = Vec::new();

    for edge in edges {
        let mut ids = [0usize; 2];
        for (slot, path) in ids.iter_mut().zip([&edge.a, &edge.b]) {
            *slot = *index.entry(path.as_path()).or_insert_with(|| {
                nodes.push(path.as_path());
                adjacency.push(Vec::new());
                nodes.len() - 1
            });
        }
        let [a, b] = ids;
        if a == b {
            continue;
        }
        adjacency[a].push(b);
        adjacency[b].push(a);
    }

    let mut visited = vec![false; nodes.len()];
    let mut groups = Vec::new();

    for start in 0..nodes.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let mut component = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    component.push(next);
                    queue.push_back(next);
                }
            }
        }

        if component.len() >= 2 {
            component.sort_unstable();
            let members = component
                .into_iter()
                .map(|id| nodes[id].to_path_buf())
                .collect();
            groups.push(SimilarityGroup::new(members));
        }
    }

    groups.sort_by(|x, y| y.len().cmp(&x.len()));
    debug!("Formed {} groups from {} edges", groups.len(), edges.len());
    groups
}

/// Group `edges`, then order members by their position in `fingerprints` and
/// fill in each group's average similarity
pub(crate) fn build_groups(
    edges: &[SimilarityEdge],
    fingerprints: &[ImageFingerprint],
) -> Vec<SimilarityGroup> {
    let by_path: HashMap<&Path, (usize, &ImageFingerprint)> = fingerprints
        .iter()
        .enumerate()
        .map(|(i, fp)| (fp.path.as_path(), (i, fp)))
        .collect();

    let mut groups = group_edges(edges);
    for group in &mut groups {
        group
            .members
            .sort_by_key(|path| by_path.get(path.as_path()).map_or(usize::MAX, |(i, _)| *i));

        let members: Vec<&ImageFingerprint> = group
            .members
            .iter()
            .filter_map(|path| by_path.get(path.as_path()).map(|(_, fp)| *fp))
            .collect();
        group.average_similarity = average_similarity(&members);
    }
    groups
}

/// Mean combined similarity over every pair, rounded to two decimals
pub fn average_similarity(members: &[&ImageFingerprint]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in members.iter().enumerate() {
        for b in &members[i + 1..] {
            total += combined_similarity(a, b);
            pairs += 1;
        }
    }
    if pairs == 0 {
        return 0.0;
    }
    round2(total / pairs as f64)
}

/// Everything an all-pairs run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupReport {
    /// Groups, largest first
    pub groups: Vec<SimilarityGroup>,

    /// Images that could not be fingerprinted
    pub failures: Vec<HashFailure>,

    pub images_hashed: usize,

    /// Pairs that were fully scored
    pub comparisons: usize,

    /// Pairs rejected by the pre-filter
    pub comparisons_skipped: usize,

    /// The run stopped early; groups reflect only the work done
    pub cancelled: bool,
}

impl DedupReport {
    /// Drop a deleted image from its group, dissolving the group if it is left
    /// with one member. Returns whether the image was grouped.
    pub fn remove_path(&mut self, path: &Path) -> bool {
        let Some(group) = self.groups.iter_mut().find(|group| group.contains(path)) else {
            return false;
        };
        group.remove(path);
        self.groups.retain(|group| !group.is_dissolved());
        true
    }

    /// Number of images across all groups
    pub fn grouped_images(&self) -> usize {
        self.groups.iter().map(SimilarityGroup::len).sum()
    }
}

/// Everything a reference-mode run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceReport {
    pub reference: PathBuf,

    /// Matches, strongest first
    pub matches: Vec<ReferenceMatch>,

    pub failures: Vec<HashFailure>,

    pub cancelled: bool,
}

impl ReferenceReport {
    /// Drop a deleted image from the match list
    pub fn remove_path(&mut self, path: &Path) -> bool {
        let before = self.matches.len();
        self.matches.retain(|m| m.path != path);
        self.matches.len() != before
    }
}
