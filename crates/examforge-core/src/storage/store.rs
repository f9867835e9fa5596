use crate::errors::{Error, Result};
use crate::model::{
    Classification, Creator, GeneratedTest, Question, QuestionStatus, RequestStatus, ReviewType,
    TosBlueprint, ValidationRecord, ValidationRequest,
};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // questions

    pub fn insert_question(&self, q: &Question) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO questions(id, topic, text, body_json, classification_json, status,
                                   needs_review, deleted, usage_count, creator, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                q.id,
                q.topic,
                q.text,
                serde_json::to_string(&q.body)?,
                q.classification
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                q.status.as_str(),
                q.needs_review as i64,
                q.deleted as i64,
                q.usage_count as i64,
                q.creator.as_str(),
                q.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn try_get_question(&self, id: &str) -> Result<Option<Question>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, topic, text, body_json, classification_json, status, needs_review,
                    deleted, usage_count, creator, created_at
             FROM questions WHERE id=?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(question_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_question(&self, id: &str) -> Result<Question> {
        self.try_get_question(id)?
            .ok_or_else(|| Error::not_found("question", id))
    }

    pub fn list_questions(&self, include_deleted: bool) -> Result<Vec<Question>> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_deleted {
            "SELECT id, topic, text, body_json, classification_json, status, needs_review,
                    deleted, usage_count, creator, created_at
             FROM questions ORDER BY created_at, id"
        } else {
            "SELECT id, topic, text, body_json, classification_json, status, needs_review,
                    deleted, usage_count, creator, created_at
             FROM questions WHERE deleted=0 ORDER BY created_at, id"
        };
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(question_from_row(row)?);
        }
        Ok(out)
    }

    /// Approved, not-deleted questions for one topic, least-used first.
    /// Bloom filtering happens on the deserialized classification; the bank is
    /// small enough that the extra rows are cheap.
    pub fn approved_pool(&self, topic: &str) -> Result<Vec<Question>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, topic, text, body_json, classification_json, status, needs_review,
                    deleted, usage_count, creator, created_at
             FROM questions
             WHERE topic=?1 AND status='approved' AND deleted=0
             ORDER BY usage_count ASC, created_at ASC, id ASC",
        )?;
        let mut rows = stmt.query(params![topic])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(question_from_row(row)?);
        }
        Ok(out)
    }

    pub fn update_classification(&self, id: &str, c: &Classification) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE questions SET classification_json=?1, needs_review=?2 WHERE id=?3",
            params![serde_json::to_string(c)?, c.needs_review as i64, id],
        )?;
        if n == 0 {
            return Err(Error::not_found("question", id));
        }
        Ok(())
    }

    pub fn set_question_status(&self, id: &str, status: QuestionStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE questions SET status=?1 WHERE id=?2",
            params![status.as_str(), id],
        )?;
        if n == 0 {
            return Err(Error::not_found("question", id));
        }
        Ok(())
    }

    pub fn set_needs_review(&self, id: &str, flag: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE questions SET needs_review=?1 WHERE id=?2",
            params![flag as i64, id],
        )?;
        if n == 0 {
            return Err(Error::not_found("question", id));
        }
        Ok(())
    }

    pub fn soft_delete_question(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("UPDATE questions SET deleted=1 WHERE id=?1", params![id])?;
        if n == 0 {
            return Err(Error::not_found("question", id));
        }
        Ok(())
    }

    pub fn bump_usage(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE questions SET usage_count = usage_count + 1 WHERE id=?1",
            params![id],
        )?;
        Ok(())
    }

    // blueprints

    pub fn save_blueprint(&self, bp: &TosBlueprint, created_by: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO blueprints(id, payload_json, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                bp.id,
                serde_json::to_string(bp)?,
                created_by,
                now_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_blueprint(&self, id: &str) -> Result<Option<TosBlueprint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload_json FROM blueprints WHERE id=?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let s: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&s)?))
        } else {
            Ok(None)
        }
    }

    // tests

    pub fn save_test(&self, t: &GeneratedTest, created_by: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tests(id, blueprint_id, title, payload_json, total_points, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                t.id,
                t.blueprint_id,
                t.title,
                serde_json::to_string(t)?,
                t.total_points(),
                created_by,
                now_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_test(&self, id: &str) -> Result<Option<GeneratedTest>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload_json FROM tests WHERE id=?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let s: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&s)?))
        } else {
            Ok(None)
        }
    }

    pub fn count_tests(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM tests", [], |r| r.get(0))?;
        Ok(count)
    }

    // validation requests

    pub fn insert_validation_request(
        &self,
        question_id: &str,
        review_type: ReviewType,
        assignee: Option<&str>,
    ) -> Result<i64> {
        let now = now_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO validation_requests(question_id, review_type, assignee, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
            params![question_id, review_type.as_str(), assignee, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_request_status(&self, request_id: i64, status: RequestStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE validation_requests SET status=?1, updated_at=?2 WHERE id=?3",
            params![status.as_str(), now_rfc3339(), request_id],
        )?;
        if n == 0 {
            return Err(Error::not_found("validation request", request_id.to_string()));
        }
        Ok(())
    }

    /// Marks every open request for the question completed. Returns how many
    /// rows changed.
    pub fn complete_open_requests(&self, question_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE validation_requests SET status='completed', updated_at=?1
             WHERE question_id=?2 AND status IN ('pending', 'in_progress')",
            params![now_rfc3339(), question_id],
        )?;
        Ok(n)
    }

    pub fn pending_requests(&self, assignee: Option<&str>) -> Result<Vec<ValidationRequest>> {
        let conn = self.conn.lock().unwrap();
        let sql = "SELECT id, question_id, review_type, assignee, status, created_at
                   FROM validation_requests
                   WHERE status IN ('pending', 'in_progress')
                     AND (?1 IS NULL OR assignee=?1)
                   ORDER BY created_at, id";
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![assignee])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(request_from_row(row)?);
        }
        Ok(out)
    }

    // validation records

    pub fn insert_validation_record(
        &self,
        question_id: &str,
        original: Option<&Classification>,
        validated: Option<&Classification>,
        validator: &str,
        notes: &str,
    ) -> Result<ValidationRecord> {
        let created_at = now_rfc3339();
        let original_json = original.map(serde_json::to_string).transpose()?;
        let validated_json = validated.map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO validation_records(question_id, original_json, validated_json, validator, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![question_id, original_json, validated_json, validator, notes, created_at],
        )?;
        Ok(ValidationRecord {
            id: conn.last_insert_rowid(),
            question_id: question_id.to_string(),
            original: original.cloned(),
            validated: validated.cloned(),
            validator: validator.to_string(),
            notes: notes.to_string(),
            created_at,
        })
    }

    pub fn validation_history(&self, question_id: &str) -> Result<Vec<ValidationRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, question_id, original_json, validated_json, validator, notes, created_at
             FROM validation_records WHERE question_id=?1 ORDER BY id",
        )?;
        let mut rows = stmt.query(params![question_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let original: Option<String> = row.get(2)?;
            let validated: Option<String> = row.get(3)?;
            out.push(ValidationRecord {
                id: row.get(0)?,
                question_id: row.get(1)?,
                original: original.as_deref().map(serde_json::from_str).transpose()?,
                validated: validated.as_deref().map(serde_json::from_str).transpose()?,
                validator: row.get(4)?,
                notes: row.get(5)?,
                created_at: row.get(6)?,
            });
        }
        Ok(out)
    }

    // similarity

    /// Pair order is normalized so the symmetric relation is stored once.
    pub fn upsert_similarity(
        &self,
        question_a: &str,
        question_b: &str,
        score: f64,
        algorithm: &str,
    ) -> Result<()> {
        let (a, b) = if question_a <= question_b {
            (question_a, question_b)
        } else {
            (question_b, question_a)
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO similarity_records(question_a, question_b, score, algorithm, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(question_a, question_b, algorithm)
             DO UPDATE SET score=excluded.score, created_at=excluded.created_at",
            params![a, b, score, algorithm, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn similarity_records(&self, min_score: f64) -> Result<Vec<crate::model::SimilarityRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT question_a, question_b, score, algorithm FROM similarity_records
             WHERE score >= ?1 ORDER BY score DESC",
        )?;
        let mut rows = stmt.query(params![min_score])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(crate::model::SimilarityRecord {
                question_a: row.get(0)?,
                question_b: row.get(1)?,
                score: row.get(2)?,
                algorithm: row.get(3)?,
            });
        }
        Ok(out)
    }

    // quality metrics

    pub fn insert_quality_metric(&self, question_id: &str, c: &Classification) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO quality_metrics(question_id, bloom, confidence, quality, readability, needs_review, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                question_id,
                c.bloom.as_str(),
                c.confidence,
                c.quality,
                c.readability,
                c.needs_review as i64,
                now_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn quality_aggregates(&self) -> Result<QualityAggregates> {
        let conn = self.conn.lock().unwrap();
        let (total, flagged, mean_confidence, mean_quality): (i64, i64, Option<f64>, Option<f64>) =
            conn.query_row(
                "SELECT count(*), coalesce(sum(needs_review), 0), avg(confidence), avg(quality)
                 FROM quality_metrics",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )?;

        let mut per_bloom = Vec::new();
        let mut stmt =
            conn.prepare("SELECT bloom, count(*) FROM quality_metrics GROUP BY bloom")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            per_bloom.push((row.get::<_, String>(0)?, row.get::<_, i64>(1)?));
        }

        Ok(QualityAggregates {
            total,
            flagged,
            mean_confidence: mean_confidence.unwrap_or(0.0),
            mean_quality: mean_quality.unwrap_or(0.0),
            per_bloom,
        })
    }

    // embeddings cache

    pub fn get_embedding(&self, key: &str) -> Result<Option<(String, Vec<f32>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT model, vec FROM embeddings WHERE key=?1 LIMIT 1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let model: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let vec = crate::embeddings::decode_vec_f32(&blob)
                .map_err(|e| Error::Validation(e.to_string()))?;
            Ok(Some((model, vec)))
        } else {
            Ok(None)
        }
    }

    pub fn put_embedding(&self, key: &str, model: &str, vec: &[f32]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let blob = crate::embeddings::encode_vec_f32(vec);
        conn.execute(
            "INSERT OR REPLACE INTO embeddings(key, model, dims, vec, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, model, vec.len() as i64, blob, now_rfc3339()],
        )?;
        Ok(())
    }

    // metrics run stamps

    pub fn metrics_last_run(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT last_run_unix FROM metrics_runs WHERE name=?1")?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn metrics_stamp(&self, name: &str, unix: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metrics_runs(name, last_run_unix) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET last_run_unix=excluded.last_run_unix",
            params![name, unix],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QualityAggregates {
    pub total: i64,
    pub flagged: i64,
    pub mean_confidence: f64,
    pub mean_quality: f64,
    pub per_bloom: Vec<(String, i64)>,
}

fn question_from_row(row: &Row<'_>) -> Result<Question> {
    let body_json: String = row.get(3)?;
    let classification_json: Option<String> = row.get(4)?;
    let status_str: String = row.get(5)?;
    let creator_str: String = row.get(9)?;
    Ok(Question {
        id: row.get(0)?,
        topic: row.get(1)?,
        text: row.get(2)?,
        body: serde_json::from_str(&body_json)?,
        classification: classification_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        status: QuestionStatus::parse(&status_str)
            .ok_or_else(|| Error::Validation(format!("unknown question status '{status_str}'")))?,
        needs_review: row.get::<_, i64>(6)? != 0,
        deleted: row.get::<_, i64>(7)? != 0,
        usage_count: row.get::<_, i64>(8)? as u32,
        creator: Creator::parse(&creator_str)
            .ok_or_else(|| Error::Validation(format!("unknown creator '{creator_str}'")))?,
        created_at: row.get(10)?,
    })
}

fn request_from_row(row: &Row<'_>) -> Result<ValidationRequest> {
    let review_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    Ok(ValidationRequest {
        id: row.get(0)?,
        question_id: row.get(1)?,
        review_type: ReviewType::parse(&review_str)
            .ok_or_else(|| Error::Validation(format!("unknown review type '{review_str}'")))?,
        assignee: row.get(3)?,
        status: RequestStatus::parse(&status_str)
            .ok_or_else(|| Error::Validation(format!("unknown request status '{status_str}'")))?,
        created_at: row.get(5)?,
    })
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
