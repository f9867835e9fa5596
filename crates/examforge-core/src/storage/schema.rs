pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
  id TEXT PRIMARY KEY,
  topic TEXT NOT NULL,
  text TEXT NOT NULL,
  body_json TEXT NOT NULL,
  classification_json TEXT,
  status TEXT NOT NULL,
  needs_review INTEGER NOT NULL DEFAULT 0,
  deleted INTEGER NOT NULL DEFAULT 0,
  usage_count INTEGER NOT NULL DEFAULT 0,
  creator TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_slot
  ON questions(topic, status, deleted);

CREATE TABLE IF NOT EXISTS blueprints (
  id TEXT PRIMARY KEY,
  payload_json TEXT NOT NULL,
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tests (
  id TEXT PRIMARY KEY,
  blueprint_id TEXT NOT NULL REFERENCES blueprints(id),
  title TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  total_points REAL NOT NULL,
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS validation_requests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  question_id TEXT NOT NULL,
  review_type TEXT NOT NULL,
  assignee TEXT,
  status TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS validation_records (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  question_id TEXT NOT NULL,
  original_json TEXT,
  validated_json TEXT,
  validator TEXT NOT NULL,
  notes TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS similarity_records (
  question_a TEXT NOT NULL,
  question_b TEXT NOT NULL,
  score REAL NOT NULL,
  algorithm TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (question_a, question_b, algorithm)
);

CREATE TABLE IF NOT EXISTS quality_metrics (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  question_id TEXT NOT NULL,
  bloom TEXT NOT NULL,
  confidence REAL NOT NULL,
  quality REAL NOT NULL,
  readability REAL NOT NULL,
  needs_review INTEGER NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS embeddings (
  key TEXT PRIMARY KEY,
  model TEXT NOT NULL,
  dims INTEGER NOT NULL,
  vec BLOB NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metrics_runs (
  name TEXT PRIMARY KEY,
  last_run_unix INTEGER NOT NULL
);
"#;
