use serde::{Deserialize, Serialize};

/// Bloom's taxonomy cognitive levels, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    pub const ALL: [BloomLevel; 6] = [
        BloomLevel::Remember,
        BloomLevel::Understand,
        BloomLevel::Apply,
        BloomLevel::Analyze,
        BloomLevel::Evaluate,
        BloomLevel::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloomLevel::Remember => "remember",
            BloomLevel::Understand => "understand",
            BloomLevel::Apply => "apply",
            BloomLevel::Analyze => "analyze",
            BloomLevel::Evaluate => "evaluate",
            BloomLevel::Create => "create",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "remember" => Some(BloomLevel::Remember),
            "understand" => Some(BloomLevel::Understand),
            "apply" => Some(BloomLevel::Apply),
            "analyze" => Some(BloomLevel::Analyze),
            "evaluate" => Some(BloomLevel::Evaluate),
            "create" => Some(BloomLevel::Create),
            _ => None,
        }
    }

    /// Collapse the six levels into the three difficulty bands
    /// (remember/understand = easy, apply/analyze = average, rest = difficult).
    pub fn difficulty(&self) -> Difficulty {
        match self {
            BloomLevel::Remember | BloomLevel::Understand => Difficulty::Easy,
            BloomLevel::Apply | BloomLevel::Analyze => Difficulty::Average,
            BloomLevel::Evaluate | BloomLevel::Create => Difficulty::Difficult,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Average,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Average => "average",
            Difficulty::Difficult => "difficult",
        }
    }
}

/// Classification axis orthogonal to the Bloom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeDimension {
    Factual,
    Conceptual,
    Procedural,
    Metacognitive,
}

impl KnowledgeDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeDimension::Factual => "factual",
            KnowledgeDimension::Conceptual => "conceptual",
            KnowledgeDimension::Procedural => "procedural",
            KnowledgeDimension::Metacognitive => "metacognitive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "factual" => Some(KnowledgeDimension::Factual),
            "conceptual" => Some(KnowledgeDimension::Conceptual),
            "procedural" => Some(KnowledgeDimension::Procedural),
            "metacognitive" => Some(KnowledgeDimension::Metacognitive),
            _ => None,
        }
    }
}

/// Single enumerated approval status. The old `approved` boolean from earlier
/// schemas is derived via [`Question::is_approved`], never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Draft => "draft",
            QuestionStatus::Pending => "pending",
            QuestionStatus::Approved => "approved",
            QuestionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(QuestionStatus::Draft),
            "pending" => Some(QuestionStatus::Pending),
            "approved" => Some(QuestionStatus::Approved),
            "rejected" => Some(QuestionStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Creator {
    Human,
    Ai,
}

impl Creator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Creator::Human => "human",
            Creator::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Creator::Human),
            "ai" => Some(Creator::Ai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

/// Canonical tagged body per question type. Normalized at the store boundary;
/// no ad hoc optional `choices`/`options` fields elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum QuestionBody {
    MultipleChoice { choices: Vec<String>, correct: usize },
    TrueFalse { answer: bool },
    Essay { guideline: String },
    FillBlank { answer: String },
    Matching { pairs: Vec<MatchPair> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    FillBlank,
    Matching,
    Essay,
}

impl QuestionKind {
    pub fn label(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "Multiple Choice",
            QuestionKind::TrueFalse => "True or False",
            QuestionKind::FillBlank => "Fill in the Blank",
            QuestionKind::Matching => "Matching",
            QuestionKind::Essay => "Essay",
        }
    }
}

impl QuestionBody {
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionBody::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            QuestionBody::TrueFalse { .. } => QuestionKind::TrueFalse,
            QuestionBody::Essay { .. } => QuestionKind::Essay,
            QuestionBody::FillBlank { .. } => QuestionKind::FillBlank,
            QuestionBody::Matching { .. } => QuestionKind::Matching,
        }
    }

    /// Answer-key rendering of the correct answer.
    pub fn answer_text(&self) -> String {
        match self {
            QuestionBody::MultipleChoice { choices, correct } => {
                let letter = (b'A' + (*correct as u8).min(25)) as char;
                match choices.get(*correct) {
                    Some(c) => format!("{}. {}", letter, c),
                    None => letter.to_string(),
                }
            }
            QuestionBody::TrueFalse { answer } => {
                if *answer { "True" } else { "False" }.to_string()
            }
            QuestionBody::Essay { guideline } => format!("(rubric) {}", guideline),
            QuestionBody::FillBlank { answer } => answer.clone(),
            QuestionBody::Matching { pairs } => pairs
                .iter()
                .map(|p| format!("{} -> {}", p.left, p.right))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Output of the classifier for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub bloom: BloomLevel,
    pub knowledge: KnowledgeDimension,
    pub difficulty: Difficulty,
    /// Heuristic quality score in [0,1].
    pub quality: f64,
    /// Flesch reading-ease estimate, clamped to [0,100].
    pub readability: f64,
    /// Confidence in [0,1].
    pub confidence: f64,
    pub needs_review: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub topic: String,
    pub text: String,
    pub body: QuestionBody,
    pub classification: Option<Classification>,
    pub status: QuestionStatus,
    pub needs_review: bool,
    pub deleted: bool,
    pub usage_count: u32,
    pub creator: Creator,
    pub created_at: String,
}

impl Question {
    /// Derived view of the old `approved` boolean.
    pub fn is_approved(&self) -> bool {
        self.status == QuestionStatus::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Peer,
    Expert,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Peer => "peer",
            ReviewType::Expert => "expert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "peer" => Some(ReviewType::Peer),
            "expert" => Some(ReviewType::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: i64,
    pub question_id: String,
    pub review_type: ReviewType,
    pub assignee: Option<String>,
    pub status: RequestStatus,
    pub created_at: String,
}

/// Immutable before/after record of one review action. A rejection carries
/// empty classification payloads and the reason in `notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: i64,
    pub question_id: String,
    pub original: Option<Classification>,
    pub validated: Option<Classification>,
    pub validator: String,
    pub notes: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub question_a: String,
    pub question_b: String,
    pub score: f64,
    pub algorithm: String,
}

/// One cell of the distribution matrix: ordered item numbers for a
/// (topic, bloom level) slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixCell {
    pub bloom: BloomLevel,
    pub items: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRow {
    pub topic: String,
    pub cells: Vec<MatrixCell>,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TosBlueprint {
    pub id: String,
    pub course: String,
    pub period: String,
    pub school_year: String,
    pub total_items: u32,
    pub matrix: Vec<TopicRow>,
    /// Item count per Bloom level summed across topics, canonical order.
    pub level_totals: [u32; 6],
}

/// Point-in-time snapshot of a question placed on a test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestItem {
    pub number: u32,
    pub question_id: String,
    pub topic: String,
    pub bloom: BloomLevel,
    pub text: String,
    pub body: QuestionBody,
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTest {
    pub id: String,
    pub blueprint_id: String,
    pub title: String,
    pub course: String,
    pub period: String,
    pub school_year: String,
    pub items: Vec<TestItem>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl GeneratedTest {
    pub fn total_points(&self) -> f64 {
        self.items.iter().map(|i| i.points).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Reviewer,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "teacher" => Some(Role::Teacher),
            "reviewer" => Some(Role::Reviewer),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Explicit caller identity passed into every mutating operation; there is no
/// ambient current-user lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub role: Role,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn authorize_write(&self) -> Result<(), crate::errors::Error> {
        if self.role == Role::Student {
            return Err(crate::errors::Error::Denied(format!(
                "user '{}' (student) may not modify the bank",
                self.user_id
            )));
        }
        Ok(())
    }
}
