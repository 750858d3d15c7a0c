//! Hybrid retrieval: embed → SQL candidate fetch → rerank → normalize →
//! confidence → filter → truncate → hierarchical enrich → audit, as a
//! single sequential `async fn` with explicit suspension points that hold
//! the stage ordering fixed. Model calls are offloaded to `spawn_blocking`
//! since the underlying ONNX inference is synchronous and CPU-bound.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::embeddings::EmbeddingModel;
use crate::reranking::Reranker;
use crate::store::{CandidateFilter, CandidateRow, Store};
use crate::types::{HierarchyLevel, SearchQueryRecord};

/// Recognized request options. The filter set is closed — adding a new one
/// is a deliberate change to `CandidateFilter` and `fetch_candidates`, not
/// an open-ended bag of extra parameters.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub corpus_id: Option<String>,
    pub hierarchy_level: Option<HierarchyLevel>,
    pub hierarchical: bool,
    pub filter_by_relevance: bool,
    pub normalize_scores: bool,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParentContext {
    pub level_0: Option<String>,
    pub level_1: Option<String>,
    pub level_2: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResultItem {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub score: f32,
    pub hierarchy_level: HierarchyLevel,
    pub context: Option<ParentContext>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceStats {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
    pub median: f32,
}

#[derive(Debug, Clone)]
pub struct Confidence {
    pub level: f32,
    pub message: &'static str,
    pub stats: ConfidenceStats,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub query: String,
    pub top_k: usize,
    pub total_results: usize,
    pub results: Vec<SearchResultItem>,
    pub confidence: Confidence,
    pub normalized: bool,
    pub message: Option<String>,
}

fn confidence_message(level: f32) -> &'static str {
    if level <= 0.1 {
        "Requête probablement hors du domaine de connaissances"
    } else if level <= 0.4 {
        "Pertinence moyenne: résultats disponibles mais peu spécifiques"
    } else if level <= 0.7 {
        "Bonne pertinence: résultats généralement pertinents"
    } else {
        "Haute pertinence: résultats fiables trouvés"
    }
}

fn empty_confidence(level: f32) -> Confidence {
    Confidence {
        level,
        message: confidence_message(level),
        stats: ConfidenceStats::default(),
    }
}

pub struct SearchEngine {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingModel>,
    reranker: Arc<dyn Reranker>,
    config: SearchConfig,
    log_search_queries: bool,
}

impl SearchEngine {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingModel>,
        reranker: Arc<dyn Reranker>,
        config: SearchConfig,
        log_search_queries: bool,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            config,
            log_search_queries,
        }
    }

    pub async fn hybrid_search(&self, mut request: SearchRequest) -> SearchResponse {
        let top_k = request.top_k.clamp(1, self.config.max_top_k.max(1));
        request.top_k = top_k;

        let embedder = self.embedder.clone();
        let query_text = request.query.clone();
        let embedding = tokio::task::spawn_blocking(move || embedder.embed_query(&query_text)).await;

        let query_embedding = match embedding {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "query embedding failed, returning degraded response");
                return self.finish_degraded(request, 0.1, None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding task panicked, returning degraded response");
                return self.finish_degraded(request, 0.1, None);
            }
        };

        let expanded = (top_k * self.config.candidate_multiplier.max(1)) as i64;
        let filter = CandidateFilter {
            query_embedding,
            theme: request.theme.clone(),
            document_type: request.document_type.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            corpus_id: request.corpus_id.clone(),
            hierarchy_level: request.hierarchy_level,
            expanded,
        };

        let candidates = match self.store.fetch_candidates(&filter).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "candidate fetch failed, returning degraded response");
                return self.finish_degraded(request, 0.1, None);
            }
        };

        if candidates.is_empty() {
            return self.finish_degraded(request, 0.1, None);
        }

        let (scores, degraded_message) = self.score_candidates(&request.query, &candidates).await;

        let normalized = request.normalize_scores;
        let scores = if normalized {
            normalize_scores(scores)
        } else {
            scores
        };

        let mut scored: Vec<(CandidateRow, f32)> = candidates
            .into_iter()
            .map(|row| {
                let score = *scores.get(&row.chunk_id).unwrap_or(&0.0);
                (row, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
        });

        // Confidence is a function of the top-k score vector (§8), not the
        // wider expanded*reranked pool `scored` holds at this point.
        let top_scores: Vec<f32> = scored.iter().take(top_k).map(|(_, s)| *s).collect();
        let confidence = classify_confidence(&top_scores, self.config.min_relevance, self.config.high_confidence);

        if request.filter_by_relevance {
            scored.retain(|(_, s)| *s >= self.config.min_relevance);
        }
        scored.truncate(top_k);

        let total_results = scored.len();
        let mut results = Vec::with_capacity(total_results);
        for (row, score) in scored {
            let context = if request.hierarchical {
                Some(self.fetch_context(row.chunk_id).await)
            } else {
                None
            };
            results.push(SearchResultItem {
                chunk_id: row.chunk_id,
                document_id: row.document_id,
                title: row.title,
                content: row.content,
                theme: row.theme,
                document_type: row.document_type,
                publish_date: row.publish_date,
                score,
                hierarchy_level: row.hierarchy_level,
                context,
            });
        }

        if self.log_search_queries {
            self.store
                .log_search(&SearchQueryRecord {
                    query_text: request.query.clone(),
                    theme: request.theme.clone(),
                    document_type: request.document_type.clone(),
                    corpus_id: request.corpus_id.clone(),
                    results_count: total_results as i32,
                    confidence_level: confidence.level,
                    user_id: request.user_id.clone(),
                })
                .await;
        }

        SearchResponse {
            query: request.query,
            top_k,
            total_results,
            results,
            confidence,
            normalized,
            message: degraded_message,
        }
    }

    /// Reranks the candidate pool against the original query. On reranker
    /// failure, falls back to distance-derived ordering (negated distance,
    /// so lower distance still sorts first) and surfaces a degraded-mode
    /// note instead of emptying the response.
    async fn score_candidates(
        &self,
        query: &str,
        candidates: &[CandidateRow],
    ) -> (HashMap<Uuid, f32>, Option<String>) {
        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|c| (c.chunk_id.to_string(), c.content.clone()))
            .collect();
        let top_k = pairs.len();

        let reranker = self.reranker.clone();
        let query_owned = query.to_string();
        let result = tokio::task::spawn_blocking(move || reranker.rerank(&query_owned, &pairs, top_k)).await;

        match result {
            Ok(Ok(ranked)) => {
                let scores = ranked
                    .into_iter()
                    .filter_map(|(id, score)| Uuid::parse_str(&id).ok().map(|u| (u, score)))
                    .collect();
                (scores, None)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "reranker unavailable, falling back to distance ordering");
                (distance_fallback_scores(candidates), Some(
                    "Reclassement indisponible: résultats ordonnés par distance vectorielle".to_string(),
                ))
            }
            Err(e) => {
                tracing::warn!(error = %e, "reranker task panicked, falling back to distance ordering");
                (distance_fallback_scores(candidates), Some(
                    "Reclassement indisponible: résultats ordonnés par distance vectorielle".to_string(),
                ))
            }
        }
    }

    async fn fetch_context(&self, chunk_id: Uuid) -> ParentContext {
        match self.store.fetch_parent_chain(chunk_id).await {
            Ok([l0, l1, l2]) => ParentContext {
                level_0: l0.map(|p| p.content),
                level_1: l1.map(|p| p.content),
                level_2: l2.map(|p| p.content),
            },
            Err(e) => {
                tracing::warn!(error = %e, "parent chain fetch failed");
                ParentContext::default()
            }
        }
    }

    fn finish_degraded(&self, request: SearchRequest, level: f32, message: Option<String>) -> SearchResponse {
        SearchResponse {
            query: request.query,
            top_k: request.top_k,
            total_results: 0,
            results: Vec::new(),
            confidence: empty_confidence(level),
            normalized: request.normalize_scores,
            message,
        }
    }
}

fn distance_fallback_scores(candidates: &[CandidateRow]) -> HashMap<Uuid, f32> {
    candidates
        .iter()
        .map(|c| (c.chunk_id, -(c.distance as f32)))
        .collect()
}

/// `(s - min) / (max - min)`, with a `0.5` fallback when `max == min`
/// (a uniform score pool carries no relative ranking signal to normalize).
fn normalize_scores(scores: HashMap<Uuid, f32>) -> HashMap<Uuid, f32> {
    if scores.is_empty() {
        return scores;
    }
    let min = scores.values().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.values().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    scores
        .into_iter()
        .map(|(id, s)| {
            let normalized = if range.abs() < f32::EPSILON { 0.5 } else { (s - min) / range };
            (id, normalized)
        })
        .collect()
}

/// Strictly-ordered confidence decision tree: off-domain, then low, then
/// medium, then high, each band checked in order against the normalized
/// score distribution.
fn classify_confidence(scores: &[f32], min_relevance: f32, high_confidence: f32) -> Confidence {
    if scores.is_empty() {
        return empty_confidence(0.1);
    }
    let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let avg = scores.iter().sum::<f32>() / scores.len() as f32;
    let median = median_of(scores);
    let stats = ConfidenceStats { min, max, avg, median };

    let level = if max < min_relevance {
        0.1
    } else if avg < min_relevance {
        0.4
    } else if avg < high_confidence {
        0.7
    } else {
        0.9
    };

    Confidence {
        level,
        message: confidence_message(level),
        stats,
    }
}

fn median_of(scores: &[f32]) -> f32 {
    let mut sorted: Vec<f32> = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_all_equal_yields_half() {
        let mut scores = HashMap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        scores.insert(a, 3.0);
        scores.insert(b, 3.0);
        let normalized = normalize_scores(scores);
        assert!((normalized[&a] - 0.5).abs() < 1e-6);
        assert!((normalized[&b] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normalize_spreads_into_unit_range() {
        let mut scores = HashMap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        scores.insert(a, 0.0);
        scores.insert(b, 5.0);
        scores.insert(c, 10.0);
        let normalized = normalize_scores(scores);
        assert!((normalized[&a] - 0.0).abs() < 1e-6);
        assert!((normalized[&b] - 0.5).abs() < 1e-6);
        assert!((normalized[&c] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_off_domain_below_min_relevance() {
        let c = classify_confidence(&[0.1, 0.05, 0.2], 0.3, 0.7);
        assert_eq!(c.level, 0.1);
        assert_eq!(c.message, "Requête probablement hors du domaine de connaissances");
    }

    #[test]
    fn confidence_high_when_average_above_threshold() {
        let c = classify_confidence(&[0.9, 0.85, 0.95], 0.3, 0.7);
        assert_eq!(c.level, 0.9);
    }

    #[test]
    fn confidence_medium_band() {
        let c = classify_confidence(&[0.5, 0.2, 0.1], 0.3, 0.7);
        assert_eq!(c.level, 0.4);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median_of(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median_of(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }
}
