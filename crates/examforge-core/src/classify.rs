use crate::errors::{Error, Result};
use crate::model::{BloomLevel, Classification, KnowledgeDimension, UserContext};
use crate::providers::llm::{extract_json_object, LlmClient};
use crate::storage::Store;
use regex::Regex;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

const LLM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Below this confidence the question is flagged for review.
    pub confidence_threshold: f64,
    /// Below this quality score the question is flagged for review.
    pub quality_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            quality_threshold: 0.6,
        }
    }
}

pub struct Classifier {
    store: Store,
    client: Option<Arc<dyn LlmClient>>,
    cfg: ClassifierConfig,
    word_re: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct BankClassifySummary {
    pub classified: usize,
    pub flagged: usize,
    pub failed: Vec<(String, String)>,
}

impl Classifier {
    pub fn new(store: Store, client: Option<Arc<dyn LlmClient>>, cfg: ClassifierConfig) -> Self {
        Self {
            store,
            client,
            cfg,
            word_re: Regex::new(r"[A-Za-z']+").unwrap(),
        }
    }

    /// Classify a question text. Uses the LLM backend when configured; any
    /// transport or parse failure there surfaces as `Error::External` and
    /// nothing is persisted. Without a backend the keyword heuristic applies.
    pub async fn classify(&self, text: &str) -> Result<Classification> {
        let (bloom, knowledge, confidence) = match &self.client {
            Some(client) => self.classify_llm(client.as_ref(), text).await?,
            None => heuristic_classify(text),
        };

        let quality = quality_score(text);
        let readability = flesch_reading_ease(&self.word_re, text);
        let needs_review =
            confidence < self.cfg.confidence_threshold || quality < self.cfg.quality_threshold;

        Ok(Classification {
            bloom,
            knowledge,
            difficulty: bloom.difficulty(),
            quality,
            readability,
            confidence,
            needs_review,
        })
    }

    async fn classify_llm(
        &self,
        client: &dyn LlmClient,
        text: &str,
    ) -> Result<(BloomLevel, KnowledgeDimension, f64)> {
        let prompt = format!(
            "Classify this exam question by Bloom's taxonomy.\n\
             Reply with JSON only: {{\"bloom\": \"remember|understand|apply|analyze|evaluate|create\", \
             \"knowledge\": \"factual|conceptual|procedural|metacognitive\", \"confidence\": 0.0}}\n\n\
             Question: {}",
            text
        );

        let fut = client.complete(&prompt);
        let resp = timeout(Duration::from_secs(LLM_TIMEOUT_SECS), fut)
            .await
            .map_err(|_| Error::External("classification failed: backend timed out".into()))?
            .map_err(|e| Error::External(format!("classification failed: {}", e)))?;

        let json = extract_json_object(&resp.text).ok_or_else(|| {
            Error::External("classification failed: backend reply had no JSON object".into())
        })?;

        let bloom = json
            .get("bloom")
            .and_then(|v| v.as_str())
            .and_then(BloomLevel::parse)
            .ok_or_else(|| {
                Error::External("classification failed: missing or invalid bloom level".into())
            })?;
        let knowledge = json
            .get("knowledge")
            .and_then(|v| v.as_str())
            .and_then(KnowledgeDimension::parse)
            .unwrap_or(KnowledgeDimension::Conceptual);
        let confidence = json
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        Ok((bloom, knowledge, confidence))
    }

    /// Classify one stored question and persist the result plus a
    /// quality-metric row. On any failure the question's prior
    /// classification is left untouched.
    pub async fn classify_and_store(
        &self,
        ctx: &UserContext,
        question_id: &str,
    ) -> Result<Classification> {
        ctx.authorize_write()?;
        let q = self.store.get_question(question_id)?;
        let c = self.classify(&q.text).await?;
        self.store.update_classification(question_id, &c)?;
        self.store.insert_quality_metric(question_id, &c)?;
        info!(
            question = question_id,
            bloom = c.bloom.as_str(),
            confidence = c.confidence,
            needs_review = c.needs_review,
            "question classified"
        );
        Ok(c)
    }

    /// Bulk pass over the non-deleted bank. Per-question failures are
    /// collected, not fatal. Not cancellable mid-flight.
    pub async fn classify_bank(&self, ctx: &UserContext) -> Result<BankClassifySummary> {
        ctx.authorize_write()?;
        let questions = self.store.list_questions(false)?;
        let mut summary = BankClassifySummary::default();
        for q in questions {
            match self.classify_and_store(ctx, &q.id).await {
                Ok(c) => {
                    summary.classified += 1;
                    if c.needs_review {
                        summary.flagged += 1;
                    }
                }
                Err(e) => {
                    warn!(question = q.id.as_str(), error = %e, "classification failed");
                    summary.failed.push((q.id, e.to_string()));
                }
            }
        }
        Ok(summary)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

const REMEMBER_VERBS: &[&str] = &[
    "define", "list", "name", "identify", "state", "recall", "label", "when", "where", "who",
];
const UNDERSTAND_VERBS: &[&str] = &[
    "explain", "describe", "summarize", "classify", "discuss", "interpret", "paraphrase", "why",
];
const APPLY_VERBS: &[&str] = &[
    "apply", "use", "solve", "demonstrate", "compute", "calculate", "illustrate", "implement",
];
const ANALYZE_VERBS: &[&str] = &[
    "analyze", "compare", "contrast", "differentiate", "distinguish", "examine", "categorize",
];
const EVALUATE_VERBS: &[&str] = &[
    "evaluate", "judge", "justify", "critique", "assess", "defend", "argue", "recommend",
];
const CREATE_VERBS: &[&str] = &[
    "create", "design", "develop", "compose", "construct", "formulate", "propose", "invent",
];

fn verb_tables() -> [(&'static [&'static str], BloomLevel); 6] {
    [
        (CREATE_VERBS, BloomLevel::Create),
        (EVALUATE_VERBS, BloomLevel::Evaluate),
        (ANALYZE_VERBS, BloomLevel::Analyze),
        (APPLY_VERBS, BloomLevel::Apply),
        (UNDERSTAND_VERBS, BloomLevel::Understand),
        (REMEMBER_VERBS, BloomLevel::Remember),
    ]
}

/// Keyword-verb fallback. Confidence reflects match strength: a leading verb
/// is a strong signal, a verb anywhere in the text a weaker one.
fn heuristic_classify(text: &str) -> (BloomLevel, KnowledgeDimension, f64) {
    let lowered = text.to_lowercase();
    let first_word = lowered
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or("");

    // Higher-order tables checked first so "design and explain" lands on create.
    for (verbs, level) in verb_tables() {
        if verbs.contains(&first_word) {
            return (level, knowledge_for(level, &lowered), 0.85);
        }
    }
    for (verbs, level) in verb_tables() {
        if verbs.iter().any(|v| contains_word(&lowered, v)) {
            return (level, knowledge_for(level, &lowered), 0.65);
        }
    }
    if lowered.starts_with("what") || lowered.starts_with("which") {
        return (
            BloomLevel::Remember,
            KnowledgeDimension::Factual,
            0.55,
        );
    }
    (
        BloomLevel::Understand,
        KnowledgeDimension::Conceptual,
        0.4,
    )
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphabetic())
        .any(|w| w == word)
}

fn knowledge_for(level: BloomLevel, lowered: &str) -> KnowledgeDimension {
    if lowered.contains("your own") || lowered.contains("strategy") || lowered.contains("approach")
    {
        return KnowledgeDimension::Metacognitive;
    }
    match level {
        BloomLevel::Remember => KnowledgeDimension::Factual,
        BloomLevel::Apply => KnowledgeDimension::Procedural,
        _ => KnowledgeDimension::Conceptual,
    }
}

/// Heuristic quality score in [0,1]: penalizes very short or very long stems.
fn quality_score(text: &str) -> f64 {
    let mut score: f64 = 1.0;
    let len = text.trim().chars().count();
    if len < 20 {
        score -= 0.3;
    }
    if len > 400 {
        score -= 0.2;
    }
    if !text.trim_end().ends_with(['?', '.', ':']) && !text.contains("___") {
        score -= 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Flesch reading-ease approximation, clamped to [0,100].
fn flesch_reading_ease(word_re: &Regex, text: &str) -> f64 {
    let words: Vec<&str> = word_re.find_iter(text).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = text
        .split(['.', '?', '!'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    let wps = words.len() as f64 / sentences as f64;
    let spw = syllables as f64 / words.len() as f64;
    (206.835 - 1.015 * wps - 84.6 * spw).clamp(0.0, 100.0)
}

fn count_syllables(word: &str) -> usize {
    let lowered = word.to_lowercase();
    let mut count = 0;
    let mut prev_vowel = false;
    for c in lowered.chars() {
        let is_vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = is_vowel;
    }
    // silent trailing e
    if lowered.ends_with('e') && count > 1 {
        count -= 1;
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_verb_has_high_confidence() {
        let (bloom, _, conf) = heuristic_classify("Define osmosis in one sentence.");
        assert_eq!(bloom, BloomLevel::Remember);
        assert!(conf >= 0.8);
    }

    #[test]
    fn higher_order_wins_on_mixed_verbs() {
        let (bloom, _, _) = heuristic_classify("Design an experiment and explain your setup.");
        assert_eq!(bloom, BloomLevel::Create);
    }

    #[test]
    fn fallback_is_low_confidence() {
        let (bloom, _, conf) = heuristic_classify("The mitochondria and its role");
        assert_eq!(bloom, BloomLevel::Understand);
        assert!(conf < 0.5);
    }

    #[test]
    fn short_stem_loses_quality() {
        assert!(quality_score("Too short?") < quality_score("Explain how photosynthesis converts light energy into chemical energy in plants."));
    }

    struct DownClient;

    #[async_trait::async_trait]
    impl LlmClient for DownClient {
        async fn complete(
            &self,
            _prompt: &str,
        ) -> anyhow::Result<crate::providers::llm::LlmResponse> {
            anyhow::bail!("connection refused")
        }

        fn provider_name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn backend_failure_leaves_prior_classification_alone() -> anyhow::Result<()> {
        use crate::model::{Creator, Question, QuestionBody, QuestionStatus};
        use std::sync::Arc;

        let store = Store::open_in_memory()?;
        store.init_schema()?;
        let prior = Classification {
            bloom: BloomLevel::Apply,
            knowledge: KnowledgeDimension::Procedural,
            difficulty: BloomLevel::Apply.difficulty(),
            quality: 0.8,
            readability: 60.0,
            confidence: 0.9,
            needs_review: false,
        };
        store.insert_question(&Question {
            id: "q1".into(),
            topic: "Cells".into(),
            text: "Use the fluid mosaic model to explain membrane transport.".into(),
            body: QuestionBody::Essay {
                guideline: "Mention both passive and active routes.".into(),
            },
            classification: Some(prior.clone()),
            status: QuestionStatus::Approved,
            needs_review: false,
            deleted: false,
            usage_count: 0,
            creator: Creator::Human,
            created_at: "2026-08-01T00:00:00+00:00".into(),
        })?;

        let clf = Classifier::new(
            store.clone(),
            Some(Arc::new(DownClient)),
            ClassifierConfig::default(),
        );
        let ctx = crate::model::UserContext::new("t-1", crate::model::Role::Teacher);
        let err = clf.classify_and_store(&ctx, "q1").await.unwrap_err();
        assert!(matches!(err, Error::External(_)), "got {err}");

        let q = store.get_question("q1")?;
        assert_eq!(q.classification, Some(prior));
        assert!(!q.needs_review);
        Ok(())
    }

    #[tokio::test]
    async fn needs_review_thresholds() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        store.init_schema()?;
        let clf = Classifier::new(store, None, ClassifierConfig::default());

        // strong leading verb, sensible length: no review needed
        let c = clf
            .classify("Define the term ecosystem and give one example.")
            .await?;
        assert!(!c.needs_review, "confidence {} quality {}", c.confidence, c.quality);

        // no verb signal: low confidence flags review
        let c = clf.classify("The water cycle in tropical regions.").await?;
        assert!(c.needs_review);
        Ok(())
    }
}
