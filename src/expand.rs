//! Query expansion through a small causal language model.
//!
//! The expander builds an instruction prompt, runs it through the raw
//! graph-execution primitive as a prefill-then-decode loop, and parses the
//! generated text into typed query variants. The key/value cache lives
//! outside the model: every decode step feeds only the most recent token,
//! the extended attention mask and the cache tensors returned by the
//! previous call, so the loop works against any backend that names its
//! cache outputs with the `present` prefix and accepts them back as
//! `past`.
//!
//! Expansion is strictly best-effort. Any failure — tokenizer, graph
//! execution, unparseable output — yields an empty expansion, never an
//! error.

use std::{collections::HashMap, sync::Arc};

use candle_core::{Device, Tensor};

use crate::{
    error::{Error, Result},
    runtime::GraphModel,
};

/// Maximum number of decode steps per expansion.
pub const DEFAULT_DECODE_BUDGET: usize = 96;

/// Output-name prefix for cache tensors produced by a forward pass.
const CACHE_OUTPUT_PREFIX: &str = "present";
/// Input-name prefix the next step feeds cache tensors back under.
const CACHE_INPUT_PREFIX: &str = "past";

/// Typed query variants produced by the expander.
///
/// Lexical variants feed lexical search only; semantic and hypothetical-
/// document variants feed both searchers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub lexical: Vec<String>,
    pub semantic: Vec<String>,
    pub hypothetical: Vec<String>,
}

impl Expansion {
    pub fn is_empty(&self) -> bool {
        self.lexical.is_empty()
            && self.semantic.is_empty()
            && self.hypothetical.is_empty()
    }
}

/// Autoregressive decode state, owned by the loop and passed by value
/// through [`QueryExpander::step`].
pub struct DecodeState {
    /// Cache tensors from the previous pass, keyed by their output names.
    pub cache: Vec<(String, Tensor)>,
    /// Number of positions the model has consumed so far.
    pub position: usize,
    /// Tokens generated so far, end-of-sequence excluded.
    pub generated: Vec<u32>,
}

pub struct QueryExpander {
    model: Arc<dyn GraphModel>,
    budget: usize,
}

impl QueryExpander {
    pub fn new(model: Arc<dyn GraphModel>) -> Self {
        Self {
            model,
            budget: DEFAULT_DECODE_BUDGET,
        }
    }

    pub fn with_budget(model: Arc<dyn GraphModel>, budget: usize) -> Self {
        Self { model, budget }
    }

    /// Expand a query into typed variants.
    ///
    /// Returns empty categories when generation fails or nothing survives
    /// the relevance filter; callers treat that as "no expansion".
    pub fn expand(&self, query: &str) -> Expansion {
        match self.generate(&expansion_prompt(query)) {
            Ok(text) => parse_variants(&text, query),
            Err(e) => {
                tracing::warn!("query expansion unavailable: {e}");
                Expansion::default()
            }
        }
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let prompt_ids = self.model.encode(prompt)?;
        if prompt_ids.is_empty() {
            return Err(Error::Inference(
                "prompt tokenized to nothing".to_string(),
            ));
        }

        let eos = self.model.eos_token();
        let (mut state, mut next) = self.prefill(&prompt_ids)?;

        while next != eos && state.generated.len() < self.budget {
            state.generated.push(next);
            if state.generated.len() >= self.budget {
                break;
            }
            (state, next) = self.step(state, next)?;
        }

        self.model.decode(&state.generated)
    }

    /// Feed the full prompt, producing the initial cache and the first
    /// greedily selected token.
    fn prefill(&self, prompt_ids: &[u32]) -> Result<(DecodeState, u32)> {
        let len = prompt_ids.len();
        let mut inputs = HashMap::new();
        inputs.insert(
            "input_ids".to_string(),
            Tensor::from_vec(prompt_ids.to_vec(), (1, len), &Device::Cpu)?,
        );
        inputs.insert("attention_mask".to_string(), ones_mask(len)?);

        let mut outputs = self.model.run(&inputs)?;
        let logits = take_logits(&mut outputs)?;
        let next = argmax_last(&logits)?;

        let state = DecodeState {
            cache: take_cache(outputs),
            position: len,
            generated: Vec::new(),
        };
        Ok((state, next))
    }

    /// Feed one generated token plus the previous cache, producing the
    /// next token and the successor state.
    fn step(&self, state: DecodeState, token: u32) -> Result<(DecodeState, u32)> {
        let mut inputs = HashMap::new();
        inputs.insert(
            "input_ids".to_string(),
            Tensor::from_vec(vec![token], (1, 1), &Device::Cpu)?,
        );
        inputs.insert(
            "attention_mask".to_string(),
            ones_mask(state.position + 1)?,
        );
        for (name, tensor) in &state.cache {
            let fed =
                name.replacen(CACHE_OUTPUT_PREFIX, CACHE_INPUT_PREFIX, 1);
            inputs.insert(fed, tensor.clone());
        }

        let mut outputs = self.model.run(&inputs)?;
        let logits = take_logits(&mut outputs)?;
        let next = argmax_last(&logits)?;

        let state = DecodeState {
            cache: take_cache(outputs),
            position: state.position + 1,
            generated: state.generated,
        };
        Ok((state, next))
    }
}

impl std::fmt::Debug for QueryExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExpander")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

fn ones_mask(len: usize) -> Result<Tensor> {
    Ok(Tensor::from_vec(vec![1u32; len], (1, len), &Device::Cpu)?)
}

fn take_logits(outputs: &mut HashMap<String, Tensor>) -> Result<Tensor> {
    outputs
        .remove("logits")
        .ok_or_else(|| Error::Inference("model returned no logits".into()))
}

fn take_cache(outputs: HashMap<String, Tensor>) -> Vec<(String, Tensor)> {
    let mut cache: Vec<(String, Tensor)> = outputs
        .into_iter()
        .filter(|(name, _)| name.starts_with(CACHE_OUTPUT_PREFIX))
        .collect();
    // Deterministic feed order across steps.
    cache.sort_by(|a, b| a.0.cmp(&b.0));
    cache
}

/// Greedy selection: arg-max over the vocabulary at the final position.
fn argmax_last(logits: &Tensor) -> Result<u32> {
    let logits = match logits.dims().len() {
        3 => logits.squeeze(0)?,
        2 => logits.clone(),
        n => {
            return Err(Error::Inference(format!(
                "unexpected logits rank {n}"
            )));
        }
    };
    let (positions, _vocab) = logits.dims2()?;
    let last = logits.get(positions - 1)?;
    Ok(last.argmax(0)?.to_scalar::<u32>()?)
}

fn expansion_prompt(query: &str) -> String {
    format!(
        "You rewrite search queries for a document retrieval engine.\n\
         Produce alternative queries for the query below, one per line,\n\
         each prefixed with its type:\n\
         lexical: synonyms or spelling variants of the query terms\n\
         semantic: a paraphrase of the query\n\
         document: a short passage that would answer the query\n\
         \n\
         Query: {query}\n\
         Alternatives:\n"
    )
}

/// Parse generated text into typed variants, keeping only lines with a
/// recognized `type: content` prefix whose content shares at least one
/// lowercase term with the original query.
pub fn parse_variants(text: &str, query: &str) -> Expansion {
    let query_terms = term_set(query);
    let mut expansion = Expansion::default();

    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((kind, content)) = line.split_once(':') else {
            continue;
        };
        let content = content.trim();
        if content.is_empty() || !shares_term(content, &query_terms) {
            continue;
        }

        match kind.trim().to_lowercase().as_str() {
            "lexical" => expansion.lexical.push(content.to_string()),
            "semantic" => expansion.semantic.push(content.to_string()),
            "document" => expansion.hypothetical.push(content.to_string()),
            _ => {}
        }
    }

    expansion
}

fn term_set(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn shares_term(candidate: &str, query_terms: &[String]) -> bool {
    term_set(candidate)
        .iter()
        .any(|t| query_terms.contains(t))
}
