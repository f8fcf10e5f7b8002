//! Cross-encoder reranking of fused candidates.
//!
//! Each candidate gets one classification-style prompt embedding the query
//! and a truncated excerpt; the whole batch runs through the graph in a
//! single padded forward pass that yields one relevance score per
//! candidate. Reranking is best-effort: if the model is unavailable or the
//! pass fails, the input order is returned truncated to `top_k`.

use std::{collections::HashMap, sync::Arc};

use candle_core::Tensor;

use crate::{
    error::{Error, Result},
    fuse::Candidate,
    runtime::GraphModel,
    text_util::truncate_chars,
};

/// Maximum candidate characters embedded in a relevance prompt.
pub const DEFAULT_PROMPT_EXCERPT_CHARS: usize = 512;

pub struct Reranker {
    model: Arc<dyn GraphModel>,
}

impl Reranker {
    pub fn new(model: Arc<dyn GraphModel>) -> Self {
        Self { model }
    }

    /// Score candidates against the query and return them sorted by
    /// relevance descending, truncated to `top_k`.
    ///
    /// On any failure the input order is returned truncated to `top_k`
    /// with no rerank scores attached.
    pub fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Vec<Candidate> {
        if candidates.is_empty() {
            return candidates;
        }

        match self.score_batch(query, &candidates) {
            Ok(scores) => {
                let mut scored: Vec<Candidate> = candidates
                    .into_iter()
                    .zip(scores)
                    .map(|(mut candidate, score)| {
                        candidate.rerank_score = Some(score);
                        candidate
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.rerank_score
                        .partial_cmp(&a.rerank_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                scored.truncate(top_k);
                scored
            }
            Err(e) => {
                tracing::warn!(
                    "reranker unavailable, keeping retrieval order: {e}"
                );
                let mut fallback = candidates;
                fallback.truncate(top_k);
                fallback
            }
        }
    }

    /// One batched forward pass over all candidates.
    fn score_batch(
        &self,
        query: &str,
        candidates: &[Candidate],
    ) -> Result<Vec<f32>> {
        let prompts: Vec<String> = candidates
            .iter()
            .map(|c| relevance_prompt(query, c))
            .collect();

        let (input_ids, attention_mask) =
            self.model.encode_batch_padded(&prompts)?;

        let mut inputs = HashMap::new();
        inputs.insert("input_ids".to_string(), input_ids);
        inputs.insert("attention_mask".to_string(), attention_mask);

        let outputs = self.model.run(&inputs)?;
        let logits = outputs
            .get("logits")
            .ok_or_else(|| Error::Inference("model returned no logits".into()))?;

        scores_from_logits(logits, candidates.len())
    }
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker").finish_non_exhaustive()
    }
}

fn relevance_prompt(query: &str, candidate: &Candidate) -> String {
    let excerpt =
        truncate_chars(&candidate.excerpt, DEFAULT_PROMPT_EXCERPT_CHARS);
    format!(
        "query: {query}\npassage: {title}\n{excerpt}",
        title = candidate.title
    )
}

/// Extract one score per candidate from `[batch]` or `[batch, 1]` logits.
fn scores_from_logits(logits: &Tensor, batch: usize) -> Result<Vec<f32>> {
    let scores = match logits.dims() {
        [_] => logits.to_vec1::<f32>()?,
        [_, 1] => logits.squeeze(1)?.to_vec1::<f32>()?,
        dims => {
            return Err(Error::Inference(format!(
                "unexpected relevance logits shape {dims:?}"
            )));
        }
    };

    if scores.len() != batch {
        return Err(Error::Inference(format!(
            "expected {batch} relevance scores, got {}",
            scores.len()
        )));
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use candle_core::Device;

    use super::*;

    /// Mock backend scoring each prompt by a fixed table, recording how
    /// many forward passes it served.
    struct ScoringModel {
        scores: Vec<f32>,
        /// Emit logits as `[batch, 1]` instead of `[batch]`.
        column_shape: bool,
        fail_run: bool,
        run_calls: Mutex<usize>,
        seen_prompts: Mutex<Vec<String>>,
    }

    impl ScoringModel {
        fn new(scores: Vec<f32>) -> Self {
            Self {
                scores,
                column_shape: false,
                fail_run: false,
                run_calls: Mutex::new(0),
                seen_prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl GraphModel for ScoringModel {
        fn run(
            &self,
            inputs: &HashMap<String, Tensor>,
        ) -> Result<HashMap<String, Tensor>> {
            if self.fail_run {
                return Err(Error::Inference("gpu fell off the bus".into()));
            }
            *self.run_calls.lock().unwrap() += 1;

            let batch = inputs.get("input_ids").unwrap().dims()[0];
            let scores = self.scores[..batch].to_vec();
            let logits = if self.column_shape {
                Tensor::from_vec(scores, (batch, 1), &Device::Cpu)?
            } else {
                Tensor::from_vec(scores, batch, &Device::Cpu)?
            };

            let mut outputs = HashMap::new();
            outputs.insert("logits".to_string(), logits);
            Ok(outputs)
        }

        fn encode(&self, _text: &str) -> Result<Vec<u32>> {
            unimplemented!("not used by the reranker")
        }

        fn encode_batch_padded(
            &self,
            texts: &[String],
        ) -> Result<(Tensor, Tensor)> {
            self.seen_prompts.lock().unwrap().extend(texts.iter().cloned());
            let batch = texts.len();
            let len = 4;
            let ids = Tensor::zeros(
                (batch, len),
                candle_core::DType::U32,
                &Device::Cpu,
            )?;
            let mask = Tensor::ones(
                (batch, len),
                candle_core::DType::U32,
                &Device::Cpu,
            )?;
            Ok((ids, mask))
        }

        fn decode(&self, _ids: &[u32]) -> Result<String> {
            unimplemented!("not used by the reranker")
        }

        fn eos_token(&self) -> u32 {
            0
        }
    }

    fn candidate(path: &str, excerpt: &str) -> Candidate {
        Candidate {
            collection: "notes".to_string(),
            path: path.to_string(),
            title: path.to_string(),
            excerpt: excerpt.to_string(),
            lexical_score: None,
            vector_score: None,
            fusion_score: 0.1,
            fusion_rank: 1,
            rerank_score: None,
            final_score: 0.1,
        }
    }

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| candidate(&format!("doc{i}.md"), "some excerpt text"))
            .collect()
    }

    #[test]
    fn sorts_by_model_score_descending() {
        let model = Arc::new(ScoringModel::new(vec![0.1, 0.9, 0.5]));
        let reranker = Reranker::new(model);

        let ranked = reranker.rerank("query", candidates(3), 3);
        let order: Vec<&str> =
            ranked.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(order, vec!["doc1.md", "doc2.md", "doc0.md"]);
        assert_eq!(ranked[0].rerank_score, Some(0.9));
    }

    #[test]
    fn truncates_to_top_k() {
        let model =
            Arc::new(ScoringModel::new(vec![0.1, 0.2, 0.3, 0.4, 0.5]));
        let reranker = Reranker::new(model);

        let ranked = reranker.rerank("query", candidates(5), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].path, "doc4.md");
    }

    #[test]
    fn single_forward_pass_for_the_whole_batch() {
        let model = Arc::new(ScoringModel::new(vec![0.5; 8]));
        let reranker = Reranker::new(model.clone());

        reranker.rerank("query", candidates(8), 8);
        assert_eq!(*model.run_calls.lock().unwrap(), 1);
        assert_eq!(model.seen_prompts.lock().unwrap().len(), 8);
    }

    #[test]
    fn accepts_column_shaped_logits() {
        let mut inner = ScoringModel::new(vec![0.2, 0.8]);
        inner.column_shape = true;
        let reranker = Reranker::new(Arc::new(inner));

        let ranked = reranker.rerank("query", candidates(2), 2);
        assert_eq!(ranked[0].path, "doc1.md");
    }

    #[test]
    fn failure_returns_input_order_truncated() {
        let mut inner = ScoringModel::new(vec![0.9; 10]);
        inner.fail_run = true;
        let reranker = Reranker::new(Arc::new(inner));

        let input = candidates(10);
        let expected: Vec<String> =
            input.iter().take(5).map(|c| c.path.clone()).collect();

        let ranked = reranker.rerank("query", input, 5);
        let got: Vec<String> =
            ranked.iter().map(|c| c.path.clone()).collect();
        assert_eq!(got, expected);
        assert!(ranked.iter().all(|c| c.rerank_score.is_none()));
    }

    #[test]
    fn empty_candidates_stay_empty() {
        let model = Arc::new(ScoringModel::new(vec![]));
        let reranker = Reranker::new(model);
        assert!(reranker.rerank("query", Vec::new(), 5).is_empty());
    }

    #[test]
    fn prompt_embeds_query_and_truncated_excerpt() {
        let model = Arc::new(ScoringModel::new(vec![0.5]));
        let reranker = Reranker::new(model.clone());

        let long_excerpt = "x".repeat(2000);
        reranker.rerank(
            "grape jelly",
            vec![candidate("doc.md", &long_excerpt)],
            1,
        );

        let prompts = model.seen_prompts.lock().unwrap();
        assert!(prompts[0].contains("query: grape jelly"));
        assert!(prompts[0].len() < 700, "excerpt must be truncated");
    }
}
