use clap::{Parser, Subcommand};
use examforge_core::classify::{Classifier, ClassifierConfig};
use examforge_core::errors::Error;
use examforge_core::generate::{
    FillPolicy, GeneratorConfig, LlmAuthor, QuestionAuthor, TemplateAuthor, TestGenerator,
};
use examforge_core::metrics::{MetricsCollector, RunOutcome};
use examforge_core::model::{
    BloomLevel, Classification, Creator, KnowledgeDimension, Question, QuestionBody,
    QuestionStatus, ReviewType, Role, UserContext,
};
use examforge_core::providers::embedder::{Embedder, FakeEmbedder, OpenAiEmbedder};
use examforge_core::providers::llm::{LlmClient, OpenAiClient};
use examforge_core::similarity::{SimilarityAnalyzer, DEFAULT_REDUNDANCY_THRESHOLD};
use examforge_core::storage::Store;
use examforge_core::tos::TosBuilder;
use examforge_core::validation::ValidationService;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "examforge",
    version,
    about = "Table-of-Specifications exam blueprints and test generation"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Parser, Clone)]
struct CommonArgs {
    #[arg(long, default_value = ".examforge/bank.db")]
    db: PathBuf,
    /// acting user id
    #[arg(long, default_value = "teacher")]
    user: String,
    /// acting role: teacher|reviewer|student
    #[arg(long, default_value = "teacher")]
    role: String,
}

#[derive(Subcommand)]
enum Command {
    /// Create a sample TOS config and an empty question bank
    Init(InitArgs),
    /// Import questions from a YAML file into the bank
    Import(ImportArgs),
    /// Classify one question or the whole bank by Bloom level
    Classify(ClassifyArgs),
    /// Pairwise similarity sweep over the bank
    Analyze(AnalyzeArgs),
    /// Review-queue operations
    Validate(ValidateArgs),
    /// Build and save a distribution-matrix blueprint from a TOS config
    Tos(TosArgs),
    /// Assemble a test from a saved blueprint
    Generate(GenerateArgs),
    /// Export a generated test as Markdown or HTML
    Export(ExportArgs),
    /// Bank statistics and quality aggregates
    Stats(StatsArgs),
    Version,
}

#[derive(Parser, Clone)]
struct InitArgs {
    #[arg(long, default_value = "tos.yaml")]
    config: PathBuf,
    #[arg(long, default_value = ".examforge/bank.db")]
    db: PathBuf,
}

#[derive(Parser, Clone)]
struct ImportArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// YAML file with a list of questions
    file: PathBuf,
    /// mark imported questions approved instead of draft
    #[arg(long)]
    approve: bool,
}

#[derive(Parser, Clone)]
struct ClassifyArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// classify a single question instead of the whole bank
    #[arg(long)]
    id: Option<String>,
    /// OpenAI model for LLM classification; heuristic when no key is set
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Parser, Clone)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value_t = DEFAULT_REDUNDANCY_THRESHOLD)]
    threshold: f64,
    /// embedder provider (none|openai|fake)
    #[arg(long, default_value = "none")]
    embedder: String,
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Parser, Clone)]
struct ValidateArgs {
    #[command(subcommand)]
    cmd: ValidateSub,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Clone)]
enum ValidateSub {
    /// Queue a question for review
    Request {
        question_id: String,
        /// peer|expert
        #[arg(long, default_value = "peer")]
        review_type: String,
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Record a reviewed classification and approve the question
    Submit {
        question_id: String,
        /// corrected Bloom level
        #[arg(long)]
        bloom: String,
        /// corrected knowledge dimension
        #[arg(long, default_value = "conceptual")]
        knowledge: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Reject a question and flag it for rework
    Reject {
        question_id: String,
        #[arg(long)]
        reason: String,
    },
    /// List open review requests
    List {
        #[arg(long)]
        assignee: Option<String>,
    },
}

#[derive(Parser, Clone)]
struct TosArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value = "tos.yaml")]
    config: PathBuf,
    /// blueprint id
    #[arg(long)]
    id: String,
    /// also write the matrix as Markdown
    #[arg(long)]
    markdown: Option<PathBuf>,
}

#[derive(Parser, Clone)]
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    blueprint: String,
    #[arg(long)]
    id: String,
    #[arg(long)]
    title: String,
    /// emit a partial test instead of failing on inventory shortfall
    #[arg(long)]
    allow_partial: bool,
    /// draft questions for uncovered slots (LLM when a key is set, templates otherwise)
    #[arg(long)]
    draft_missing: bool,
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, default_value_t = DEFAULT_REDUNDANCY_THRESHOLD)]
    redundancy_threshold: f64,
}

#[derive(Parser, Clone)]
struct ExportArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// test id
    #[arg(long)]
    test: String,
    #[arg(long)]
    out: PathBuf,
    /// md|html
    #[arg(long, default_value = "md")]
    format: String,
    /// include the answer key
    #[arg(long)]
    with_key: bool,
}

#[derive(Parser, Clone)]
struct StatsArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// minimum seconds between collection runs
    #[arg(long, default_value_t = 0)]
    min_interval: i64,
}

mod exit_codes {
    pub const OK: i32 = 0;
    pub const OPERATION_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            match e.downcast_ref::<Error>() {
                Some(Error::Config(_)) => exit_codes::CONFIG_ERROR,
                _ => exit_codes::OPERATION_FAILED,
            }
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Import(args) => cmd_import(args),
        Command::Classify(args) => cmd_classify(args).await,
        Command::Analyze(args) => cmd_analyze(args).await,
        Command::Validate(args) => cmd_validate(args),
        Command::Tos(args) => cmd_tos(args),
        Command::Generate(args) => cmd_generate(args).await,
        Command::Export(args) => cmd_export(args),
        Command::Stats(args) => cmd_stats(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists (skipped)", args.config.display());
    } else {
        if let Some(parent) = args.config.parent() {
            std::fs::create_dir_all(parent)?;
        }
        examforge_core::config::write_sample_config(&args.config)?;
        eprintln!("created {}", args.config.display());
    }
    let store = open_store(&args.db)?;
    store.init_schema()?;
    eprintln!("initialized bank at {}", args.db.display());
    Ok(exit_codes::OK)
}

/// Import format: a YAML list of questions. `id` defaults to a slug of the
/// text when omitted.
#[derive(Debug, Deserialize)]
struct ImportQuestion {
    id: Option<String>,
    topic: String,
    text: String,
    body: QuestionBody,
}

fn cmd_import(args: ImportArgs) -> anyhow::Result<i32> {
    let ctx = user_ctx(&args.common)?;
    ctx.authorize_write()?;
    let store = open_store(&args.common.db)?;
    store.init_schema()?;

    let raw = std::fs::read_to_string(&args.file)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", args.file.display(), e)))?;
    let imports: Vec<ImportQuestion> = serde_yaml::from_str(&raw)
        .map_err(|e| Error::Config(format!("failed to parse {}: {}", args.file.display(), e)))?;

    let status = if args.approve {
        QuestionStatus::Approved
    } else {
        QuestionStatus::Draft
    };
    let mut imported = 0usize;
    for (i, item) in imports.into_iter().enumerate() {
        let id = item.id.unwrap_or_else(|| format!("q-{}-{}", slug(&item.topic), i + 1));
        store.insert_question(&Question {
            id,
            topic: item.topic,
            text: item.text,
            body: item.body,
            classification: None,
            status,
            needs_review: false,
            deleted: false,
            usage_count: 0,
            creator: Creator::Human,
            created_at: examforge_core::storage::store::now_rfc3339(),
        })?;
        imported += 1;
    }
    eprintln!("imported {} questions ({})", imported, status.as_str());
    Ok(exit_codes::OK)
}

async fn cmd_classify(args: ClassifyArgs) -> anyhow::Result<i32> {
    let ctx = user_ctx(&args.common)?;
    let store = open_store(&args.common.db)?;
    store.init_schema()?;

    let client: Option<Arc<dyn LlmClient>> = args
        .api_key
        .filter(|k| !k.is_empty())
        .map(|key| {
            Arc::new(OpenAiClient::new(args.model.clone(), key, 0.0, 256)) as Arc<dyn LlmClient>
        });
    if client.is_none() {
        eprintln!("note: no API key; using the keyword heuristic");
    }
    let classifier = Classifier::new(store, client, ClassifierConfig::default());

    match args.id {
        Some(id) => {
            let c = classifier.classify_and_store(&ctx, &id).await?;
            eprintln!(
                "{}: {} / {} (confidence {:.2}{})",
                id,
                c.bloom.as_str(),
                c.knowledge.as_str(),
                c.confidence,
                if c.needs_review { ", needs review" } else { "" }
            );
        }
        None => {
            let summary = classifier.classify_bank(&ctx).await?;
            eprintln!(
                "classified {} questions, {} flagged for review, {} failed",
                summary.classified,
                summary.flagged,
                summary.failed.len()
            );
            for (id, err) in &summary.failed {
                eprintln!("  failed {}: {}", id, err);
            }
            if !summary.failed.is_empty() {
                return Ok(exit_codes::OPERATION_FAILED);
            }
        }
    }
    Ok(exit_codes::OK)
}

async fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let ctx = user_ctx(&args.common)?;
    let store = open_store(&args.common.db)?;
    store.init_schema()?;

    let embedder = build_embedder(&args.embedder, &args.embedding_model, args.api_key.as_deref())?;
    let analyzer = SimilarityAnalyzer::new(store, embedder);
    let report = analyzer.analyze_bank(&ctx, args.threshold).await?;

    eprintln!(
        "compared {} pairs, {} above threshold {:.2}",
        report.pairs_compared, report.flagged, args.threshold
    );
    for cluster in report.clusters.iter().filter(|c| c.question_ids.len() > 1) {
        eprintln!(
            "  cluster ({} items, coherence {:.2}{}): {}",
            cluster.question_ids.len(),
            cluster.coherence,
            if cluster.low_coherence() { ", low" } else { "" },
            cluster.question_ids.join(", ")
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<i32> {
    let ctx = user_ctx(&args.common)?;
    let store = open_store(&args.common.db)?;
    store.init_schema()?;
    let svc = ValidationService::new(store.clone());

    match args.cmd {
        ValidateSub::Request {
            question_id,
            review_type,
            assignee,
        } => {
            let review_type = ReviewType::parse(&review_type)
                .ok_or_else(|| Error::Config(format!("unknown review type '{review_type}'")))?;
            let id = svc.request_validation(&ctx, &question_id, review_type, assignee.as_deref())?;
            eprintln!("request #{} queued for {}", id, question_id);
        }
        ValidateSub::Submit {
            question_id,
            bloom,
            knowledge,
            notes,
        } => {
            let bloom = BloomLevel::parse(&bloom)
                .ok_or_else(|| Error::Config(format!("unknown bloom level '{bloom}'")))?;
            let knowledge = KnowledgeDimension::parse(&knowledge)
                .ok_or_else(|| Error::Config(format!("unknown knowledge dimension '{knowledge}'")))?;
            let validated = reviewed_classification(&store, &question_id, bloom, knowledge)?;
            let outcome = svc.submit_validation(&ctx, &question_id, validated, &notes)?;
            eprintln!(
                "{} approved as {} ({} open requests remain, {} approved total)",
                question_id,
                bloom.as_str(),
                outcome.stats.pending_requests,
                outcome.stats.approved
            );
        }
        ValidateSub::Reject { question_id, reason } => {
            svc.reject_validation(&ctx, &question_id, &reason)?;
            eprintln!("{} rejected: {}", question_id, reason);
        }
        ValidateSub::List { assignee } => {
            let pending = svc.pending_requests(assignee.as_deref())?;
            if pending.is_empty() {
                eprintln!("no open review requests");
            }
            for r in pending {
                eprintln!(
                    "  #{} {} ({}, {}{})",
                    r.id,
                    r.question_id,
                    r.review_type.as_str(),
                    r.status.as_str(),
                    r.assignee
                        .as_deref()
                        .map(|a| format!(", assignee {a}"))
                        .unwrap_or_default()
                );
            }
        }
    }
    Ok(exit_codes::OK)
}

/// Reviewer verdicts get full confidence; quality and readability carry over
/// from the machine classification when one exists.
fn reviewed_classification(
    store: &Store,
    question_id: &str,
    bloom: BloomLevel,
    knowledge: KnowledgeDimension,
) -> anyhow::Result<Classification> {
    let q = store.get_question(question_id)?;
    let (quality, readability) = q
        .classification
        .as_ref()
        .map(|c| (c.quality, c.readability))
        .unwrap_or((1.0, 50.0));
    Ok(Classification {
        bloom,
        knowledge,
        difficulty: bloom.difficulty(),
        quality,
        readability,
        confidence: 1.0,
        needs_review: false,
    })
}

fn cmd_tos(args: TosArgs) -> anyhow::Result<i32> {
    let ctx = user_ctx(&args.common)?;
    let store = open_store(&args.common.db)?;
    store.init_schema()?;

    let cfg = examforge_core::config::load_tos_config(&args.config)?;
    let bp = TosBuilder::new(store).save(&ctx, &args.id, &cfg)?;
    examforge_core::render::console::print_blueprint(&bp);

    if let Some(out) = args.markdown {
        let md = examforge_core::render::markdown::blueprint_markdown(&bp);
        examforge_core::render::markdown::write_markdown(&md, &out)?;
        eprintln!("wrote {}", out.display());
    }
    Ok(exit_codes::OK)
}

async fn cmd_generate(args: GenerateArgs) -> anyhow::Result<i32> {
    let ctx = user_ctx(&args.common)?;
    let store = open_store(&args.common.db)?;
    store.init_schema()?;

    let cfg = GeneratorConfig {
        redundancy_threshold: args.redundancy_threshold,
        fill_policy: if args.allow_partial {
            FillPolicy::Partial
        } else {
            FillPolicy::Strict
        },
    };
    let author: Option<Arc<dyn QuestionAuthor>> = if args.draft_missing {
        match args.api_key.filter(|k| !k.is_empty()) {
            Some(key) => Some(Arc::new(LlmAuthor::new(Arc::new(OpenAiClient::new(
                args.model.clone(),
                key,
                0.7,
                512,
            ))))),
            None => Some(Arc::new(TemplateAuthor)),
        }
    } else {
        None
    };
    let gen = TestGenerator::new(SimilarityAnalyzer::new(store, None), author, cfg);

    let test = gen
        .generate(&ctx, &args.blueprint, &args.id, &args.title)
        .await?;
    examforge_core::render::console::print_test_summary(&test);
    Ok(exit_codes::OK)
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.common.db)?;
    store.init_schema()?;
    let test = store
        .get_test(&args.test)?
        .ok_or_else(|| Error::not_found("test", args.test.as_str()))?;

    match args.format.as_str() {
        "md" => {
            let mut md = examforge_core::render::markdown::test_markdown(&test);
            if args.with_key {
                md.push('\n');
                md.push_str(&examforge_core::render::markdown::answer_key_markdown(&test));
            }
            examforge_core::render::markdown::write_markdown(&md, &args.out)?;
        }
        "html" => {
            let html = examforge_core::render::html::test_html(&test, args.with_key);
            examforge_core::render::html::write_html(&html, &args.out)?;
        }
        other => return Err(Error::Config(format!("unknown export format '{other}'")).into()),
    }
    eprintln!("wrote {}", args.out.display());
    Ok(exit_codes::OK)
}

fn cmd_stats(args: StatsArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.common.db)?;
    store.init_schema()?;
    let collector = MetricsCollector::new(store);

    match collector.run(args.min_interval)? {
        RunOutcome::Collected(snap) => {
            eprintln!(
                "bank: {} questions ({} approved, {} pending, {} rejected, {} need review)",
                snap.questions, snap.approved, snap.pending, snap.rejected, snap.needs_review
            );
            examforge_core::render::console::print_quality(&snap.quality);
        }
        RunOutcome::RateLimited { last_run_unix } => {
            eprintln!(
                "stats skipped: last run at unix {} is within the interval",
                last_run_unix
            );
        }
    }
    Ok(exit_codes::OK)
}

fn user_ctx(common: &CommonArgs) -> anyhow::Result<UserContext> {
    let role = Role::parse(&common.role)
        .ok_or_else(|| Error::Config(format!("unknown role '{}'", common.role)))?;
    Ok(UserContext::new(common.user.clone(), role))
}

fn open_store(db: &Path) -> anyhow::Result<Store> {
    if let Some(parent) = db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Store::open(db)?)
}

fn build_embedder(
    kind: &str,
    model: &str,
    api_key: Option<&str>,
) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    match kind {
        "none" => Ok(None),
        "fake" => Ok(Some(Arc::new(FakeEmbedder::default()))),
        "openai" => {
            let key = api_key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| Error::Config("openai embedder needs OPENAI_API_KEY".into()))?;
            Ok(Some(Arc::new(OpenAiEmbedder::new(
                model.to_string(),
                key.to_string(),
            ))))
        }
        other => Err(Error::Config(format!("unknown embedder '{other}'")).into()),
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
