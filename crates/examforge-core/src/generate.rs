use crate::errors::{Error, Result};
use crate::model::{
    BloomLevel, Creator, GeneratedTest, Question, QuestionBody, QuestionKind, QuestionStatus,
    TestItem, UserContext,
};
use crate::providers::llm::{extract_json_object, LlmClient};
use crate::similarity::{SimilarityAnalyzer, DEFAULT_REDUNDANCY_THRESHOLD};
use crate::storage::store::now_rfc3339;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when the approved pool cannot cover a blueprint cell and no
/// author backend is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPolicy {
    /// Fail the whole generation. Nothing is persisted.
    #[default]
    Strict,
    /// Emit the test with the covered items and a warning per short cell.
    Partial,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub redundancy_threshold: f64,
    pub fill_policy: FillPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            redundancy_threshold: DEFAULT_REDUNDANCY_THRESHOLD,
            fill_policy: FillPolicy::Strict,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthoredQuestion {
    pub text: String,
    pub body: QuestionBody,
}

/// Backend that drafts new questions for an uncovered (topic, level) slot.
#[async_trait]
pub trait QuestionAuthor: Send + Sync {
    async fn author(
        &self,
        topic: &str,
        bloom: BloomLevel,
        count: usize,
    ) -> anyhow::Result<Vec<AuthoredQuestion>>;
}

/// Deterministic template author. Produces serviceable placeholder stems so a
/// draft test can go out while the real items are written; everything it makes
/// still lands in the bank as pending review.
pub struct TemplateAuthor;

#[async_trait]
impl QuestionAuthor for TemplateAuthor {
    async fn author(
        &self,
        topic: &str,
        bloom: BloomLevel,
        count: usize,
    ) -> anyhow::Result<Vec<AuthoredQuestion>> {
        let stem = match bloom {
            BloomLevel::Remember => format!("Define one key term from {}.", topic),
            BloomLevel::Understand => format!("Explain a central idea of {} in your own words.", topic),
            BloomLevel::Apply => format!("Solve a short problem that applies {}.", topic),
            BloomLevel::Analyze => format!("Compare two concepts from {} and note one difference.", topic),
            BloomLevel::Evaluate => format!("Justify a claim about {} with one piece of evidence.", topic),
            BloomLevel::Create => format!("Propose a short investigation related to {}.", topic),
        };
        Ok((0..count)
            .map(|i| AuthoredQuestion {
                text: if i == 0 { stem.clone() } else { format!("{} (variant {})", stem, i + 1) },
                body: QuestionBody::Essay {
                    guideline: "Draft item. Replace before final print.".into(),
                },
            })
            .collect())
    }
}

/// LLM-backed author. Asks for a JSON array of stems and falls back to the
/// template author when the backend is unreachable or the reply cannot be
/// parsed; drafting never fails on a degraded backend.
pub struct LlmAuthor {
    client: Arc<dyn LlmClient>,
}

impl LlmAuthor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuestionAuthor for LlmAuthor {
    async fn author(
        &self,
        topic: &str,
        bloom: BloomLevel,
        count: usize,
    ) -> anyhow::Result<Vec<AuthoredQuestion>> {
        let prompt = format!(
            "Write {} exam questions on the topic '{}' at Bloom level '{}'.\n\
             Reply with JSON only: {{\"questions\": [\"...\"]}}",
            count,
            topic,
            bloom.as_str()
        );
        let resp = match self.client.complete(&prompt).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    topic,
                    bloom = bloom.as_str(),
                    error = %e,
                    "author backend unreachable, using templates"
                );
                return TemplateAuthor.author(topic, bloom, count).await;
            }
        };
        let stems: Vec<String> = extract_json_object(&resp.text)
            .and_then(|v| {
                v.get("questions").and_then(|q| {
                    q.as_array().map(|arr| {
                        arr.iter()
                            .filter_map(|s| s.as_str().map(str::to_string))
                            .collect()
                    })
                })
            })
            .unwrap_or_default();
        if stems.len() < count {
            warn!(
                topic,
                bloom = bloom.as_str(),
                got = stems.len(),
                "author reply short, padding with templates"
            );
            let mut out: Vec<AuthoredQuestion> = stems
                .into_iter()
                .map(|text| AuthoredQuestion {
                    text,
                    body: QuestionBody::Essay {
                        guideline: "Draft item. Replace before final print.".into(),
                    },
                })
                .collect();
            let pad = TemplateAuthor.author(topic, bloom, count - out.len()).await?;
            out.extend(pad);
            return Ok(out);
        }
        Ok(stems
            .into_iter()
            .take(count)
            .map(|text| AuthoredQuestion {
                text,
                body: QuestionBody::Essay {
                    guideline: "Draft item. Replace before final print.".into(),
                },
            })
            .collect())
    }
}

pub fn default_points(kind: QuestionKind) -> f64 {
    match kind {
        QuestionKind::MultipleChoice | QuestionKind::TrueFalse => 1.0,
        QuestionKind::FillBlank | QuestionKind::Matching => 2.0,
        QuestionKind::Essay => 5.0,
    }
}

pub struct TestGenerator {
    similarity: SimilarityAnalyzer,
    author: Option<Arc<dyn QuestionAuthor>>,
    cfg: GeneratorConfig,
}

impl TestGenerator {
    pub fn new(
        similarity: SimilarityAnalyzer,
        author: Option<Arc<dyn QuestionAuthor>>,
        cfg: GeneratorConfig,
    ) -> Self {
        Self {
            similarity,
            author,
            cfg,
        }
    }

    /// Assemble a test from the blueprint's distribution matrix. Selection per
    /// cell is least-used-first from the approved pool, skipping candidates
    /// too similar to anything already placed. Usage counts are bumped only
    /// after the test row is saved.
    pub async fn generate(
        &self,
        ctx: &UserContext,
        blueprint_id: &str,
        test_id: &str,
        title: &str,
    ) -> Result<GeneratedTest> {
        ctx.authorize_write()?;
        let store = self.similarity.store().clone();
        let bp = store
            .get_blueprint(blueprint_id)?
            .ok_or_else(|| Error::not_found("blueprint", blueprint_id))?;

        let mut items: Vec<TestItem> = Vec::with_capacity(bp.total_items as usize);
        let mut warnings: Vec<String> = Vec::new();
        let mut used_ids: Vec<String> = Vec::new();
        let mut placed_texts: Vec<String> = Vec::new();

        for row in &bp.matrix {
            let pool = store.approved_pool(&row.topic)?;
            for cell in &row.cells {
                let needed = cell.items.len();
                if needed == 0 {
                    continue;
                }
                let mut picked: Vec<&Question> = Vec::with_capacity(needed);
                for q in &pool {
                    if picked.len() == needed {
                        break;
                    }
                    let bloom = match &q.classification {
                        Some(c) => c.bloom,
                        None => continue,
                    };
                    if bloom != cell.bloom || used_ids.contains(&q.id) {
                        continue;
                    }
                    if self.too_similar(&q.text, &placed_texts).await? {
                        warn!(
                            question = q.id.as_str(),
                            topic = row.topic.as_str(),
                            "skipped near-duplicate candidate"
                        );
                        continue;
                    }
                    picked.push(q);
                }

                let mut numbers = cell.items.iter();
                for q in &picked {
                    let number = match numbers.next() {
                        Some(n) => *n,
                        None => break,
                    };
                    used_ids.push(q.id.clone());
                    placed_texts.push(q.text.clone());
                    items.push(TestItem {
                        number,
                        question_id: q.id.clone(),
                        topic: row.topic.clone(),
                        bloom: cell.bloom,
                        text: q.text.clone(),
                        body: q.body.clone(),
                        points: default_points(q.body.kind()),
                    });
                }

                let shortfall = needed - picked.len();
                if shortfall == 0 {
                    continue;
                }
                match &self.author {
                    Some(author) => {
                        let drafted = author
                            .author(&row.topic, cell.bloom, shortfall)
                            .await
                            .map_err(|e| Error::External(format!("authoring failed: {}", e)))?;
                        if drafted.len() < shortfall {
                            return Err(Error::InsufficientInventory {
                                topic: row.topic.clone(),
                                bloom: cell.bloom.as_str(),
                                needed,
                                available: picked.len() + drafted.len(),
                            });
                        }
                        for (i, d) in drafted.into_iter().take(shortfall).enumerate() {
                            let number = match numbers.next() {
                                Some(n) => *n,
                                None => break,
                            };
                            let q = self.insert_drafted(&store, &row.topic, cell.bloom, d, test_id, i)?;
                            warnings.push(format!(
                                "item {} ({} / {}) is a drafted question '{}' pending review",
                                number,
                                row.topic,
                                cell.bloom.as_str(),
                                q.id
                            ));
                            used_ids.push(q.id.clone());
                            placed_texts.push(q.text.clone());
                            items.push(TestItem {
                                number,
                                question_id: q.id.clone(),
                                topic: row.topic.clone(),
                                bloom: cell.bloom,
                                text: q.text.clone(),
                                body: q.body.clone(),
                                points: default_points(q.body.kind()),
                            });
                        }
                    }
                    None => match self.cfg.fill_policy {
                        FillPolicy::Strict => {
                            return Err(Error::InsufficientInventory {
                                topic: row.topic.clone(),
                                bloom: cell.bloom.as_str(),
                                needed,
                                available: picked.len(),
                            });
                        }
                        FillPolicy::Partial => {
                            warnings.push(format!(
                                "{} / {}: only {} of {} approved questions available",
                                row.topic,
                                cell.bloom.as_str(),
                                picked.len(),
                                needed
                            ));
                        }
                    },
                }
            }
        }

        items.sort_by_key(|i| i.number);
        let test = GeneratedTest {
            id: test_id.to_string(),
            blueprint_id: blueprint_id.to_string(),
            title: title.to_string(),
            course: bp.course.clone(),
            period: bp.period.clone(),
            school_year: bp.school_year.clone(),
            items,
            warnings,
        };

        store.save_test(&test, &ctx.user_id)?;
        for id in &used_ids {
            store.bump_usage(id)?;
        }
        info!(
            test = test_id,
            blueprint = blueprint_id,
            items = test.items.len(),
            warnings = test.warnings.len(),
            "test generated"
        );
        Ok(test)
    }

    async fn too_similar(&self, text: &str, placed: &[String]) -> Result<bool> {
        for p in placed {
            if self.similarity.score(text, p).await? >= self.cfg.redundancy_threshold {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drafted questions join the bank as pending so they flow through the
    /// normal review queue before any future reuse.
    fn insert_drafted(
        &self,
        store: &crate::storage::Store,
        topic: &str,
        bloom: BloomLevel,
        d: AuthoredQuestion,
        test_id: &str,
        idx: usize,
    ) -> Result<Question> {
        let q = Question {
            id: format!("{}-draft-{}-{}-{}", test_id, slug(topic), bloom.as_str(), idx + 1),
            topic: topic.to_string(),
            text: d.text,
            body: d.body,
            classification: None,
            status: QuestionStatus::Pending,
            needs_review: true,
            deleted: false,
            usage_count: 0,
            creator: Creator::Ai,
            created_at: now_rfc3339(),
        };
        store.insert_question(&q)?;
        Ok(q)
    }
}

fn slug(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_by_kind() {
        assert_eq!(default_points(QuestionKind::MultipleChoice), 1.0);
        assert_eq!(default_points(QuestionKind::Essay), 5.0);
        assert_eq!(default_points(QuestionKind::Matching), 2.0);
    }

    #[tokio::test]
    async fn template_author_counts_and_varies() -> anyhow::Result<()> {
        let drafted = TemplateAuthor
            .author("Photosynthesis", BloomLevel::Apply, 3)
            .await?;
        assert_eq!(drafted.len(), 3);
        assert_ne!(drafted[0].text, drafted[1].text);
        Ok(())
    }

    #[test]
    fn slug_is_filename_safe() {
        assert_eq!(slug("Cell Structure!"), "cell-structure-");
    }

    struct CannedClient(String);

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<crate::providers::llm::LlmResponse> {
            Ok(crate::providers::llm::LlmResponse {
                text: self.0.clone(),
                provider: "canned".into(),
                model: "canned".into(),
            })
        }

        fn provider_name(&self) -> &'static str {
            "canned"
        }
    }

    #[tokio::test]
    async fn llm_author_parses_question_array() -> anyhow::Result<()> {
        let client = Arc::new(CannedClient(
            r#"Here: {"questions": ["Define osmosis.", "Define diffusion."]}"#.into(),
        ));
        let drafted = LlmAuthor::new(client)
            .author("Transport", BloomLevel::Remember, 2)
            .await?;
        assert_eq!(drafted.len(), 2);
        assert_eq!(drafted[0].text, "Define osmosis.");
        Ok(())
    }

    #[tokio::test]
    async fn llm_author_pads_short_replies_with_templates() -> anyhow::Result<()> {
        let client = Arc::new(CannedClient("no json at all".into()));
        let drafted = LlmAuthor::new(client)
            .author("Transport", BloomLevel::Remember, 2)
            .await?;
        assert_eq!(drafted.len(), 2);
        Ok(())
    }

    struct DownClient;

    #[async_trait]
    impl LlmClient for DownClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<crate::providers::llm::LlmResponse> {
            anyhow::bail!("connection refused")
        }

        fn provider_name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn llm_author_survives_an_unreachable_backend() -> anyhow::Result<()> {
        let drafted = LlmAuthor::new(Arc::new(DownClient))
            .author("Transport", BloomLevel::Remember, 2)
            .await?;
        assert_eq!(drafted.len(), 2);
        assert_ne!(drafted[0].text, drafted[1].text);
        Ok(())
    }
}
