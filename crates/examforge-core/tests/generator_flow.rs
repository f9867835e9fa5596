use examforge_core::config::{LevelSplit, TopicWeight, TosConfig};
use examforge_core::errors::Error;
use examforge_core::generate::{
    FillPolicy, GeneratorConfig, TemplateAuthor, TestGenerator,
};
use examforge_core::model::{
    BloomLevel, Classification, Creator, KnowledgeDimension, Question, QuestionBody,
    QuestionStatus, Role, UserContext,
};
use examforge_core::similarity::SimilarityAnalyzer;
use examforge_core::storage::Store;
use examforge_core::tos::TosBuilder;
use std::sync::Arc;

fn teacher() -> UserContext {
    UserContext::new("t-1", Role::Teacher)
}

fn approved(id: &str, topic: &str, text: &str, bloom: BloomLevel, usage: u32) -> Question {
    Question {
        id: id.into(),
        topic: topic.into(),
        text: text.into(),
        body: QuestionBody::TrueFalse { answer: true },
        classification: Some(Classification {
            bloom,
            knowledge: KnowledgeDimension::Conceptual,
            difficulty: bloom.difficulty(),
            quality: 0.9,
            readability: 70.0,
            confidence: 0.9,
            needs_review: false,
        }),
        status: QuestionStatus::Approved,
        needs_review: false,
        deleted: false,
        usage_count: usage,
        creator: Creator::Human,
        created_at: "2026-08-01T00:00:00+00:00".into(),
    }
}

fn single_topic_cfg(total: u32) -> TosConfig {
    TosConfig {
        version: 1,
        course: "Biology".into(),
        period: "1st".into(),
        school_year: "2026-2027".into(),
        total_items: total,
        topics: vec![TopicWeight { name: "Cells".into(), weight: 100 }],
        level_split: LevelSplit::default(),
        difficulty_split: [30, 40, 30],
    }
}

/// Default 15/15/20/20/15/15 split over 10 items apportions to 2/2/2/2/1/1.
/// Texts are deliberately dissimilar so the redundancy filter stays quiet.
fn seed_full_bank(store: &Store) -> anyhow::Result<()> {
    let bank = [
        (BloomLevel::Remember, "Name the organelle that contains the genetic material."),
        (BloomLevel::Remember, "List three structures found only in plant cells."),
        (BloomLevel::Understand, "Explain why red blood cells burst in distilled water."),
        (BloomLevel::Understand, "Describe the role of ribosomes during protein synthesis."),
        (BloomLevel::Apply, "Calculate the magnification of a drawing measuring 50 mm for a 5 micrometre specimen."),
        (BloomLevel::Apply, "Use the fluid mosaic model to predict how cholesterol affects membrane flexibility."),
        (BloomLevel::Analyze, "Compare active transport with facilitated diffusion across a membrane."),
        (BloomLevel::Analyze, "Differentiate prokaryotic from eukaryotic cells using two criteria."),
        (BloomLevel::Evaluate, "Justify whether viruses should be classified as living organisms."),
        (BloomLevel::Create, "Design a simple experiment to measure osmosis in potato tissue."),
    ];
    for (i, (bloom, text)) in bank.iter().enumerate() {
        let id = format!("{}-{}", bloom.as_str(), i);
        store.insert_question(&approved(&id, "Cells", text, *bloom, 0))?;
    }
    Ok(())
}

fn generator(store: &Store, cfg: GeneratorConfig) -> TestGenerator {
    TestGenerator::new(SimilarityAnalyzer::new(store.clone(), None), None, cfg)
}

#[test]
fn missing_blueprint_persists_nothing() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;
    let gen = generator(&store, GeneratorConfig::default());

    let err = rt
        .block_on(gen.generate(&teacher(), "nope", "t-1", "Unit Test"))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(store.count_tests()?, 0);
    Ok(())
}

#[test]
fn full_bank_fills_every_slot_and_bumps_usage() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;
    seed_full_bank(&store)?;

    let cfg = single_topic_cfg(10);
    let bp = TosBuilder::new(store.clone()).save(&teacher(), "bp-1", &cfg)?;
    assert_eq!(bp.total_items, 10);

    let gen = generator(&store, GeneratorConfig::default());
    let test = rt.block_on(gen.generate(&teacher(), "bp-1", "test-1", "Unit Test"))?;

    assert_eq!(test.items.len(), 10);
    assert!(test.warnings.is_empty());
    let numbers: Vec<u32> = test.items.iter().map(|i| i.number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<u32>>());

    // every selected question's usage counter moved
    for item in &test.items {
        assert_eq!(store.get_question(&item.question_id)?.usage_count, 1);
    }
    assert_eq!(store.count_tests()?, 1);
    assert_eq!(store.get_test("test-1")?.unwrap().items.len(), 10);
    Ok(())
}

#[test]
fn least_used_question_wins_the_slot() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;

    store.insert_question(&approved(
        "worn",
        "Cells",
        "Name the organelle that stores water in plant cells.",
        BloomLevel::Remember,
        7,
    ))?;
    store.insert_question(&approved(
        "fresh",
        "Cells",
        "List the phases of mitosis in order of occurrence.",
        BloomLevel::Remember,
        0,
    ))?;

    let mut cfg = single_topic_cfg(1);
    cfg.level_split = LevelSplit { remember: 100, understand: 0, apply: 0, analyze: 0, evaluate: 0, create: 0 };
    cfg.difficulty_split = [100, 0, 0];
    TosBuilder::new(store.clone()).save(&teacher(), "bp-1", &cfg)?;

    let gen = generator(&store, GeneratorConfig::default());
    let test = rt.block_on(gen.generate(&teacher(), "bp-1", "test-1", "Quiz"))?;
    assert_eq!(test.items.len(), 1);
    assert_eq!(test.items[0].question_id, "fresh");
    Ok(())
}

#[test]
fn strict_shortfall_fails_and_persists_nothing() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;
    // only one remember question; the 10-item blueprint needs two
    store.insert_question(&approved(
        "only",
        "Cells",
        "Identify the cell membrane's main component.",
        BloomLevel::Remember,
        0,
    ))?;

    let cfg = single_topic_cfg(10);
    TosBuilder::new(store.clone()).save(&teacher(), "bp-1", &cfg)?;

    let gen = generator(&store, GeneratorConfig::default());
    let err = rt
        .block_on(gen.generate(&teacher(), "bp-1", "test-1", "Unit Test"))
        .unwrap_err();
    match err {
        Error::InsufficientInventory { topic, needed, available, .. } => {
            assert_eq!(topic, "Cells");
            assert!(available < needed);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.count_tests()?, 0);
    assert_eq!(store.get_question("only")?.usage_count, 0);
    Ok(())
}

#[test]
fn partial_policy_emits_short_test_with_warnings() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;
    store.insert_question(&approved(
        "only",
        "Cells",
        "Identify the cell membrane's main component.",
        BloomLevel::Remember,
        0,
    ))?;

    let cfg = single_topic_cfg(10);
    TosBuilder::new(store.clone()).save(&teacher(), "bp-1", &cfg)?;

    let gen = generator(
        &store,
        GeneratorConfig {
            fill_policy: FillPolicy::Partial,
            ..GeneratorConfig::default()
        },
    );
    let test = rt.block_on(gen.generate(&teacher(), "bp-1", "test-1", "Unit Test"))?;
    assert_eq!(test.items.len(), 1);
    assert!(!test.warnings.is_empty());
    assert_eq!(store.count_tests()?, 1);
    Ok(())
}

#[test]
fn author_backfills_and_drafts_enter_as_pending() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;

    let mut cfg = single_topic_cfg(2);
    cfg.level_split = LevelSplit { remember: 50, understand: 50, apply: 0, analyze: 0, evaluate: 0, create: 0 };
    cfg.difficulty_split = [100, 0, 0];
    TosBuilder::new(store.clone()).save(&teacher(), "bp-1", &cfg)?;

    let gen = TestGenerator::new(
        SimilarityAnalyzer::new(store.clone(), None),
        Some(Arc::new(TemplateAuthor)),
        GeneratorConfig::default(),
    );
    let test = rt.block_on(gen.generate(&teacher(), "bp-1", "test-1", "Quiz"))?;
    assert_eq!(test.items.len(), 2);
    assert_eq!(test.warnings.len(), 2);

    for item in &test.items {
        let q = store.get_question(&item.question_id)?;
        assert_eq!(q.status, QuestionStatus::Pending);
        assert_eq!(q.creator, Creator::Ai);
        assert!(q.needs_review);
    }
    Ok(())
}

#[test]
fn near_duplicates_are_not_placed_together() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;

    store.insert_question(&approved(
        "a",
        "Cells",
        "Name the organelle known as the powerhouse of the cell.",
        BloomLevel::Remember,
        0,
    ))?;
    // near-verbatim copy of "a"
    store.insert_question(&approved(
        "a-copy",
        "Cells",
        "Name the organelle known as the powerhouse of the cell!",
        BloomLevel::Remember,
        1,
    ))?;
    store.insert_question(&approved(
        "b",
        "Cells",
        "State the number of chromosomes in a human somatic cell.",
        BloomLevel::Remember,
        2,
    ))?;

    let mut cfg = single_topic_cfg(2);
    cfg.level_split = LevelSplit { remember: 100, understand: 0, apply: 0, analyze: 0, evaluate: 0, create: 0 };
    cfg.difficulty_split = [100, 0, 0];
    TosBuilder::new(store.clone()).save(&teacher(), "bp-1", &cfg)?;

    let gen = generator(&store, GeneratorConfig::default());
    let test = rt.block_on(gen.generate(&teacher(), "bp-1", "test-1", "Quiz"))?;
    let ids: Vec<&str> = test.items.iter().map(|i| i.question_id.as_str()).collect();
    assert!(ids.contains(&"a"));
    assert!(ids.contains(&"b"), "duplicate should be skipped, got {ids:?}");
    Ok(())
}

#[test]
fn students_cannot_generate() -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let store = Store::open_in_memory()?;
    store.init_schema()?;
    let gen = generator(&store, GeneratorConfig::default());
    let student = UserContext::new("s-1", Role::Student);
    assert!(rt
        .block_on(gen.generate(&student, "bp-1", "t", "T"))
        .is_err());
    Ok(())
}
