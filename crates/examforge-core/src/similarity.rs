use crate::embeddings::{cosine_similarity, embed_cache_key};
use crate::errors::{Error, Result};
use crate::model::{Question, UserContext};
use crate::providers::embedder::Embedder;
use crate::storage::Store;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_REDUNDANCY_THRESHOLD: f64 = 0.85;
pub const LOW_COHERENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Lexical,
    Embedding,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Lexical => "lexical",
            Algorithm::Embedding => "embedding",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimilarMatch {
    pub question_id: String,
    pub score: f64,
    pub algorithm: &'static str,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub question_ids: Vec<String>,
    /// Mean pairwise similarity within the cluster; 1.0 for singletons.
    pub coherence: f64,
}

impl Cluster {
    pub fn low_coherence(&self) -> bool {
        self.coherence < LOW_COHERENCE_THRESHOLD
    }
}

#[derive(Debug, Clone)]
pub struct RedundancyReport {
    pub redundant: bool,
    pub matches: Vec<SimilarMatch>,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct BankAnalysis {
    pub pairs_compared: usize,
    pub flagged: usize,
    pub clusters: Vec<Cluster>,
}

/// Pairwise similarity over question texts. Uses embedding cosine when an
/// embedder is configured, else a lexical blend. Symmetric either way.
pub struct SimilarityAnalyzer {
    store: Store,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SimilarityAnalyzer {
    pub fn new(store: Store, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn algorithm(&self) -> Algorithm {
        if self.embedder.is_some() {
            Algorithm::Embedding
        } else {
            Algorithm::Lexical
        }
    }

    pub async fn score(&self, a: &str, b: &str) -> Result<f64> {
        match &self.embedder {
            Some(embedder) => {
                let va = self.embed_cached(embedder.as_ref(), a).await?;
                let vb = self.embed_cached(embedder.as_ref(), b).await?;
                let cos = cosine_similarity(&va, &vb)
                    .map_err(|e| Error::External(format!("similarity failed: {}", e)))?;
                Ok(cos.clamp(0.0, 1.0))
            }
            None => Ok(lexical_score(a, b)),
        }
    }

    async fn embed_cached(&self, embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
        let model_id = embedder.model_id();
        let key = embed_cache_key(&model_id, text);
        if let Some((_model, vec)) = self.store.get_embedding(&key)? {
            return Ok(vec);
        }
        let vec = embedder
            .embed(text)
            .await
            .map_err(|e| Error::External(format!("embedding failed: {}", e)))?;
        self.store.put_embedding(&key, &model_id, &vec)?;
        Ok(vec)
    }

    /// Other questions in the bank with similarity >= threshold, sorted
    /// descending by score.
    pub async fn find_similar(&self, text: &str, threshold: f64) -> Result<Vec<SimilarMatch>> {
        let algorithm = self.algorithm().as_str();
        let mut out = Vec::new();
        for q in self.store.list_questions(false)? {
            let s = self.score(text, &q.text).await?;
            if s >= threshold {
                out.push(SimilarMatch {
                    question_id: q.id,
                    score: s,
                    algorithm,
                });
            }
        }
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(out)
    }

    /// Greedy single-link partition: a question joins the first cluster that
    /// contains any member within the threshold, else starts its own.
    pub async fn cluster(&self, questions: &[Question], threshold: f64) -> Result<Vec<Cluster>> {
        let n = questions.len();
        let mut sims = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let s = self.score(&questions[i].text, &questions[j].text).await?;
                sims[i][j] = s;
                sims[j][i] = s;
            }
        }

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let found = clusters
                .iter()
                .position(|c| c.iter().any(|&j| sims[i][j] >= threshold));
            match found {
                Some(ci) => clusters[ci].push(i),
                None => clusters.push(vec![i]),
            }
        }

        let mut out = Vec::with_capacity(clusters.len());
        for members in clusters {
            let coherence = if members.len() < 2 {
                1.0
            } else {
                let mut sum = 0.0;
                let mut count = 0usize;
                for (a, &i) in members.iter().enumerate() {
                    for &j in members.iter().skip(a + 1) {
                        sum += sims[i][j];
                        count += 1;
                    }
                }
                sum / count as f64
            };
            out.push(Cluster {
                question_ids: members.iter().map(|&i| questions[i].id.clone()).collect(),
                coherence,
            });
        }
        Ok(out)
    }

    /// Classifies a candidate text as redundant when any existing text
    /// reaches the threshold.
    pub async fn detect_redundancy(
        &self,
        new_text: &str,
        existing: &[(String, String)],
        threshold: f64,
    ) -> Result<RedundancyReport> {
        let algorithm = self.algorithm().as_str();
        let mut matches = Vec::new();
        for (id, text) in existing {
            let s = self.score(new_text, text).await?;
            if s >= threshold {
                matches.push(SimilarMatch {
                    question_id: id.clone(),
                    score: s,
                    algorithm,
                });
            }
        }
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let redundant = !matches.is_empty();
        let recommendation = if redundant {
            format!(
                "question duplicates {} existing item(s); closest is '{}' at {:.2}; consider rewording or reusing it",
                matches.len(),
                matches[0].question_id,
                matches[0].score
            )
        } else {
            "no overlap with the existing bank at this threshold".to_string()
        };

        Ok(RedundancyReport {
            redundant,
            matches,
            recommendation,
        })
    }

    /// Whole-bank O(n^2) pairwise sweep. Fine for small-to-moderate banks;
    /// there is no batching or early termination.
    pub async fn analyze_bank(&self, ctx: &UserContext, threshold: f64) -> Result<BankAnalysis> {
        ctx.authorize_write()?;
        let questions = self.store.list_questions(false)?;
        let algorithm = self.algorithm().as_str();

        let mut pairs_compared = 0usize;
        let mut flagged = 0usize;
        for i in 0..questions.len() {
            for j in (i + 1)..questions.len() {
                let s = self.score(&questions[i].text, &questions[j].text).await?;
                pairs_compared += 1;
                if s >= threshold {
                    flagged += 1;
                    debug!(
                        a = questions[i].id.as_str(),
                        b = questions[j].id.as_str(),
                        score = s,
                        "similar pair"
                    );
                    self.store
                        .upsert_similarity(&questions[i].id, &questions[j].id, s, algorithm)?;
                }
            }
        }

        let clusters = self.cluster(&questions, threshold).await?;
        info!(
            pairs = pairs_compared,
            flagged,
            clusters = clusters.len(),
            "bank similarity sweep done"
        );
        Ok(BankAnalysis {
            pairs_compared,
            flagged,
            clusters,
        })
    }
}

/// Lexical blend: normalized Levenshtein plus token-set Jaccard, both on
/// lowercased text. Symmetric because both parts are.
pub fn lexical_score(a: &str, b: &str) -> f64 {
    let la = a.to_lowercase();
    let lb = b.to_lowercase();
    let lev = strsim::normalized_levenshtein(&la, &lb);
    let jac = token_jaccard(&la, &lb);
    0.5 * lev + 0.5 * jac
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let ta: HashSet<&str> = a.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    let tb: HashSet<&str> = b.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_is_symmetric() {
        let pairs = [
            ("What is osmosis?", "Define osmosis."),
            ("Explain photosynthesis", "Explain cellular respiration"),
            ("", "nonempty"),
        ];
        for (a, b) in pairs {
            assert!((lexical_score(a, b) - lexical_score(b, a)).abs() < 1e-12);
        }
    }

    #[test]
    fn identical_texts_score_one() {
        let s = lexical_score("Name the powerhouse of the cell.", "Name the powerhouse of the cell.");
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_texts_score_low() {
        let s = lexical_score(
            "Compute the area of a triangle with base 4 and height 6.",
            "Who wrote the national anthem?",
        );
        assert!(s < 0.5, "score was {}", s);
    }
}
