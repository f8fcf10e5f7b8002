//! Weighted Reciprocal Rank Fusion and score blending.
//!
//! Every retrieval list entering fusion carries a weight; a document
//! accumulates `weight / (k + rank + 1)` for each list it appears in and a
//! small positional bonus when it tops any list. After reranking, blended
//! final scores mix the fusion position with the reranker's judgment using
//! rank-dependent weights.

use std::collections::HashMap;

use serde::Serialize;

/// One retrieval hit entering fusion.
#[derive(Debug, Clone)]
pub struct FusionEntry {
    pub collection: String,
    pub path: String,
    pub title: String,
    pub excerpt: String,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
}

/// A ranked retrieval list with its fusion weight.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub weight: f32,
    pub entries: Vec<FusionEntry>,
}

/// A candidate threaded through fusion, reranking and blending.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub collection: String,
    pub path: String,
    pub title: String,
    pub excerpt: String,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub fusion_score: f32,
    /// 1-indexed rank after fusion.
    pub fusion_rank: usize,
    pub rerank_score: Option<f32>,
    pub final_score: f32,
}

/// Fusion tunables. The defaults are the empirically settled values; they
/// are configuration, not law, but changing them changes ranking behavior.
#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    /// The rank-smoothing constant in `weight / (k + rank + 1)`.
    pub k: f32,
    /// Bonus for a best rank of 0 across all lists.
    pub top_rank_bonus: f32,
    /// Bonus for a best rank of 1 or 2 across all lists.
    pub near_top_bonus: f32,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            k: 60.0,
            top_rank_bonus: 0.05,
            near_top_bonus: 0.02,
        }
    }
}

/// Blending tunables: how much the fusion position outweighs the reranker
/// score at each depth.
#[derive(Debug, Clone, Copy)]
pub struct BlendParams {
    /// Position weight for fusion ranks 1-3.
    pub head: f32,
    /// Position weight for fusion ranks 4-10.
    pub mid: f32,
    /// Position weight beyond rank 10.
    pub tail: f32,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            head: 0.75,
            mid: 0.60,
            tail: 0.40,
        }
    }
}

struct Accumulated {
    entry: FusionEntry,
    score: f32,
    best_rank: usize,
}

/// Fuse weighted ranked lists into a single candidate ranking.
///
/// Candidates are keyed by `(collection, path)`; metadata from later lists
/// fills gaps (a hit seen lexically and semantically ends up with both
/// scores populated). Ties in fused score break on the key so the output
/// is deterministic.
pub fn fuse(lists: &[RankedList], params: &FusionParams) -> Vec<Candidate> {
    let mut accumulated: HashMap<(String, String), Accumulated> =
        HashMap::new();

    for list in lists {
        for (rank, entry) in list.entries.iter().enumerate() {
            let contribution = list.weight / (params.k + rank as f32 + 1.0);
            let key = (entry.collection.clone(), entry.path.clone());

            match accumulated.get_mut(&key) {
                Some(acc) => {
                    acc.score += contribution;
                    acc.best_rank = acc.best_rank.min(rank);
                    merge_entry(&mut acc.entry, entry);
                }
                None => {
                    accumulated.insert(
                        key,
                        Accumulated {
                            entry: entry.clone(),
                            score: contribution,
                            best_rank: rank,
                        },
                    );
                }
            }
        }
    }

    let mut candidates: Vec<Candidate> = accumulated
        .into_values()
        .map(|acc| {
            let bonus = match acc.best_rank {
                0 => params.top_rank_bonus,
                1 | 2 => params.near_top_bonus,
                _ => 0.0,
            };
            let fusion_score = acc.score + bonus;
            Candidate {
                collection: acc.entry.collection,
                path: acc.entry.path,
                title: acc.entry.title,
                excerpt: acc.entry.excerpt,
                lexical_score: acc.entry.lexical_score,
                vector_score: acc.entry.vector_score,
                fusion_score,
                fusion_rank: 0,
                rerank_score: None,
                final_score: fusion_score,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.fusion_score
            .partial_cmp(&a.fusion_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                (&a.collection, &a.path).cmp(&(&b.collection, &b.path))
            })
    });

    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.fusion_rank = i + 1;
    }

    candidates
}

fn merge_entry(into: &mut FusionEntry, from: &FusionEntry) {
    if into.lexical_score.is_none() {
        into.lexical_score = from.lexical_score;
    }
    if into.vector_score.is_none() {
        into.vector_score = from.vector_score;
    }
    if into.title.is_empty() {
        into.title = from.title.clone();
    }
    if into.excerpt.is_empty() {
        into.excerpt = from.excerpt.clone();
    }
}

/// Blend reranker scores with fusion position.
///
/// A candidate with a rerank score gets
/// `w * (1 / fusion_rank) + (1 - w) * rerank_score`, with `w` chosen by
/// fusion rank: retrieval position dominates at the very top, reranker
/// judgment further down. Candidates without a rerank score keep their
/// fusion score as the final score.
pub fn blend(candidates: &mut [Candidate], params: &BlendParams) {
    for candidate in candidates {
        let Some(rerank_score) = candidate.rerank_score else {
            candidate.final_score = candidate.fusion_score;
            continue;
        };

        let position_score = 1.0 / candidate.fusion_rank as f32;
        let w = match candidate.fusion_rank {
            1..=3 => params.head,
            4..=10 => params.mid,
            _ => params.tail,
        };
        candidate.final_score =
            w * position_score + (1.0 - w) * rerank_score;
    }
}

/// Collapse candidates sharing a `(collection, path)` key, keeping the
/// first occurrence.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.collection.clone(), c.path.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> FusionEntry {
        FusionEntry {
            collection: "notes".to_string(),
            path: path.to_string(),
            title: path.to_string(),
            excerpt: String::new(),
            lexical_score: None,
            vector_score: None,
        }
    }

    fn list(weight: f32, paths: &[&str]) -> RankedList {
        RankedList {
            weight,
            entries: paths.iter().map(|p| entry(p)).collect(),
        }
    }

    #[test]
    fn doc_in_every_list_beats_doc_in_one() {
        let lists = vec![
            list(1.0, &["everywhere", "b"]),
            list(1.0, &["everywhere", "c"]),
            list(1.0, &["lonely", "everywhere"]),
        ];
        let fused = fuse(&lists, &FusionParams::default());

        let everywhere =
            fused.iter().find(|c| c.path == "everywhere").unwrap();
        let lonely = fused.iter().find(|c| c.path == "lonely").unwrap();
        assert!(everywhere.fusion_score > lonely.fusion_score);
        assert_eq!(fused[0].path, "everywhere");
    }

    #[test]
    fn single_list_order_is_preserved() {
        let lists = vec![list(2.0, &["first", "second", "third", "fourth"])];
        let fused = fuse(&lists, &FusionParams::default());

        let order: Vec<&str> =
            fused.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third", "fourth"]);
        for (i, c) in fused.iter().enumerate() {
            assert_eq!(c.fusion_rank, i + 1);
        }
    }

    #[test]
    fn rrf_contribution_formula() {
        let lists = vec![list(2.0, &["only"])];
        let params = FusionParams::default();
        let fused = fuse(&lists, &params);

        // weight / (k + rank + 1) + top-rank bonus
        let expected = 2.0 / (params.k + 1.0) + params.top_rank_bonus;
        assert!((fused[0].fusion_score - expected).abs() < 1e-6);
    }

    #[test]
    fn heavier_list_contributes_more() {
        let lists = vec![
            list(2.0, &["from-original"]),
            list(1.0, &["from-variant"]),
        ];
        let fused = fuse(&lists, &FusionParams::default());
        assert_eq!(fused[0].path, "from-original");
        assert!(fused[0].fusion_score > fused[1].fusion_score);
    }

    #[test]
    fn positional_bonus_tiers() {
        let params = FusionParams::default();
        let lists =
            vec![list(1.0, &["top", "near1", "near2", "plain", "plain2"])];
        let fused = fuse(&lists, &params);

        let base = |rank: usize| 1.0 / (params.k + rank as f32 + 1.0);
        let by_path = |p: &str| {
            fused.iter().find(|c| c.path == p).unwrap().fusion_score
        };

        assert!(
            (by_path("top") - (base(0) + params.top_rank_bonus)).abs() < 1e-6
        );
        assert!(
            (by_path("near1") - (base(1) + params.near_top_bonus)).abs()
                < 1e-6
        );
        assert!(
            (by_path("near2") - (base(2) + params.near_top_bonus)).abs()
                < 1e-6
        );
        assert!((by_path("plain") - base(3)).abs() < 1e-6);
    }

    #[test]
    fn best_rank_tracks_across_lists() {
        // "doc" sits deep in the first list but tops the second: the
        // top-rank bonus must apply.
        let lists = vec![
            list(1.0, &["a", "b", "c", "doc"]),
            list(1.0, &["doc"]),
        ];
        let params = FusionParams::default();
        let fused = fuse(&lists, &params);

        let doc = fused.iter().find(|c| c.path == "doc").unwrap();
        let expected = 1.0 / (params.k + 4.0)
            + 1.0 / (params.k + 1.0)
            + params.top_rank_bonus;
        assert!((doc.fusion_score - expected).abs() < 1e-6);
    }

    #[test]
    fn metadata_merges_across_lists() {
        let mut lexical_hit = entry("doc");
        lexical_hit.lexical_score = Some(0.8);
        let mut vector_hit = entry("doc");
        vector_hit.vector_score = Some(0.6);
        vector_hit.excerpt = "semantic excerpt".to_string();

        let lists = vec![
            RankedList {
                weight: 1.0,
                entries: vec![lexical_hit],
            },
            RankedList {
                weight: 1.0,
                entries: vec![vector_hit],
            },
        ];
        let fused = fuse(&lists, &FusionParams::default());

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].lexical_score, Some(0.8));
        assert_eq!(fused[0].vector_score, Some(0.6));
        assert_eq!(fused[0].excerpt, "semantic excerpt");
    }

    #[test]
    fn ties_break_deterministically() {
        let lists = vec![
            list(1.0, &["zeta"]),
            list(1.0, &["alpha"]),
        ];
        let fused = fuse(&lists, &FusionParams::default());
        // Same score, same bonus: key order decides.
        assert_eq!(fused[0].path, "alpha");
        assert_eq!(fused[1].path, "zeta");
    }

    #[test]
    fn blend_uses_rank_dependent_weights() {
        let params = BlendParams::default();
        let mut candidates = Vec::new();
        for rank in [1usize, 5, 12] {
            candidates.push(Candidate {
                collection: "c".to_string(),
                path: format!("p{rank}"),
                title: String::new(),
                excerpt: String::new(),
                lexical_score: None,
                vector_score: None,
                fusion_score: 0.5,
                fusion_rank: rank,
                rerank_score: Some(0.9),
                final_score: 0.0,
            });
        }

        blend(&mut candidates, &params);

        let expect = |rank: usize, w: f32| {
            w * (1.0 / rank as f32) + (1.0 - w) * 0.9
        };
        assert!((candidates[0].final_score - expect(1, 0.75)).abs() < 1e-6);
        assert!((candidates[1].final_score - expect(5, 0.60)).abs() < 1e-6);
        assert!((candidates[2].final_score - expect(12, 0.40)).abs() < 1e-6);
    }

    #[test]
    fn blend_leaves_unreranked_candidates_alone() {
        let mut candidates = vec![Candidate {
            collection: "c".to_string(),
            path: "p".to_string(),
            title: String::new(),
            excerpt: String::new(),
            lexical_score: None,
            vector_score: None,
            fusion_score: 0.031,
            fusion_rank: 15,
            rerank_score: None,
            final_score: 0.0,
        }];
        blend(&mut candidates, &BlendParams::default());
        assert!((candidates[0].final_score - 0.031).abs() < 1e-6);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let make = |path: &str, score: f32| Candidate {
            collection: "c".to_string(),
            path: path.to_string(),
            title: String::new(),
            excerpt: String::new(),
            lexical_score: None,
            vector_score: None,
            fusion_score: score,
            fusion_rank: 0,
            rerank_score: None,
            final_score: score,
        };
        let deduped = dedup_candidates(vec![
            make("a", 0.9),
            make("b", 0.8),
            make("a", 0.7),
        ]);
        assert_eq!(deduped.len(), 2);
        assert!((deduped[0].final_score - 0.9).abs() < 1e-6);
    }
}
