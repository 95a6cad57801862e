use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, Result, Row};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::analysis::progress::percent;
use crate::models::{
    Concept, ConceptGraph, ContentType, Difficulty, PracticeSession, Question, Resource,
    ResourceKind, ReviewRecord, ReviewState, Topic, TopicSummary,
};
use crate::scheduler::{schedule_review, Confidence};

const QUESTION_COLUMNS: &str = "q.id, q.topic_id, q.concept_id, q.level, q.title, q.difficulty, \
     q.content_type, q.prompt, q.answer, q.parent_id";

const STATE_COLUMNS: &str = "s.last_answered, s.review_count, s.streak, s.interval_days, s.ease, \
     s.last_confidence, s.next_review";

const ACTIVITY_DAYS: i64 = 30;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedTopic {
    pub id: i64,
    pub name: String,
    pub created: bool,
    /// Questions removed before re-import.
    pub replaced: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub topics: Vec<ImportedTopic>,
    pub concepts: usize,
    pub questions: usize,
    pub resources: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DueQuestion {
    pub question: Question,
    pub state: ReviewState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    pub id: i64,
    pub name: String,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_topics: i64,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub progress_percent: f64,
    pub total_reviews: i64,
    pub total_sessions: i64,
    pub due_today: i64,
    pub topics: Vec<TopicStats>,
    pub daily_activity: Vec<DailyActivity>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS concepts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                estimated_minutes INTEGER,
                FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS concept_tags (
                concept_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (concept_id, tag_id),
                FOREIGN KEY (concept_id) REFERENCES concepts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            -- parent_id is a soft reference, resolved at read time
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_id INTEGER NOT NULL,
                concept_id INTEGER,
                level INTEGER NOT NULL DEFAULT 1,
                title TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'Medium' CHECK(difficulty IN ('Easy', 'Medium', 'Hard')),
                content_type TEXT NOT NULL DEFAULT 'Text' CHECK(content_type IN ('Text', 'Code')),
                prompt TEXT NOT NULL,
                answer TEXT NOT NULL,
                parent_id INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE,
                FOREIGN KEY (concept_id) REFERENCES concepts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                concept_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('video', 'article', 'code', 'tool', 'docs')),
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                FOREIGN KEY (concept_id) REFERENCES concepts(id) ON DELETE CASCADE
            );

            -- Related concepts by name, may dangle
            CREATE TABLE IF NOT EXISTS concept_links (
                concept_id INTEGER NOT NULL,
                target_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (concept_id, target_name),
                FOREIGN KEY (concept_id) REFERENCES concepts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                questions_count INTEGER NOT NULL DEFAULT 0,
                duration_minutes REAL,
                summary TEXT
            );

            CREATE TABLE IF NOT EXISTS review_states (
                question_id INTEGER PRIMARY KEY,
                last_answered TEXT NOT NULL,
                review_count INTEGER NOT NULL,
                streak INTEGER NOT NULL,
                interval_days INTEGER NOT NULL CHECK(interval_days >= 1),
                ease REAL NOT NULL CHECK(ease > 0),
                last_confidence INTEGER NOT NULL CHECK(last_confidence BETWEEN 1 AND 5),
                next_review TEXT NOT NULL,
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS review_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL,
                session_id INTEGER,
                confidence INTEGER NOT NULL CHECK(confidence BETWEEN 1 AND 5),
                answered_at TEXT NOT NULL,
                interval_days INTEGER NOT NULL,
                ease REAL NOT NULL,
                user_answer TEXT,
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_concepts_topic ON concepts(topic_id);
            CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic_id);
            CREATE INDEX IF NOT EXISTS idx_questions_concept ON questions(concept_id);
            CREATE INDEX IF NOT EXISTS idx_resources_concept ON resources(concept_id);
            CREATE INDEX IF NOT EXISTS idx_states_next_review ON review_states(next_review, ease);
            CREATE INDEX IF NOT EXISTS idx_history_question ON review_history(question_id);
            CREATE INDEX IF NOT EXISTS idx_history_session ON review_history(session_id);
            "#,
        )?;

        Ok(())
    }

    // Import

    /// Store a parsed graph in one transaction. With `replace`, the existing
    /// concepts and questions of every imported topic are removed first.
    pub fn import_graph(&self, graph: &ConceptGraph, replace: bool) -> Result<ImportReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = ImportReport::default();
        let mut topic_ids: HashMap<i64, i64> = HashMap::new();
        let mut concept_ids: HashMap<i64, i64> = HashMap::new();
        let mut question_ids: HashMap<i64, i64> = HashMap::new();

        for topic in &graph.topics {
            let (id, created) = get_or_create_topic(&tx, &topic.name, topic.description.as_deref())?;
            let replaced = if replace && !created {
                clear_topic(&tx, id)?
            } else {
                0
            };
            topic_ids.insert(topic.id, id);
            report.topics.push(ImportedTopic {
                id,
                name: topic.name.clone(),
                created,
                replaced,
            });
        }

        for concept in &graph.concepts {
            let Some(&topic_id) = topic_ids.get(&concept.topic_id) else {
                continue;
            };
            tx.execute(
                "INSERT INTO concepts (topic_id, name, estimated_minutes) VALUES (?1, ?2, ?3)",
                params![topic_id, concept.name, concept.estimated_minutes],
            )?;
            let id = tx.last_insert_rowid();
            concept_ids.insert(concept.id, id);

            for tag in &concept.tags {
                let tag_id = get_or_create_tag(&tx, tag)?;
                tx.execute(
                    "INSERT OR IGNORE INTO concept_tags (concept_id, tag_id) VALUES (?1, ?2)",
                    params![id, tag_id],
                )?;
            }
            for resource in &concept.resources {
                tx.execute(
                    "INSERT INTO resources (concept_id, kind, url, title) VALUES (?1, ?2, ?3, ?4)",
                    params![id, resource.kind.as_str(), resource.url, resource.title],
                )?;
                report.resources += 1;
            }
            for (position, target) in concept.related.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO concept_links (concept_id, target_name, position) VALUES (?1, ?2, ?3)",
                    params![id, target, position as i64],
                )?;
            }
            report.concepts += 1;
        }

        // Parents always precede their children in a parsed graph.
        for question in &graph.questions {
            let Some(&topic_id) = topic_ids.get(&question.topic_id) else {
                continue;
            };
            let concept_id = question.concept_id.and_then(|c| concept_ids.get(&c).copied());
            let parent_id = question.parent_id.and_then(|p| question_ids.get(&p).copied());
            tx.execute(
                r#"
                INSERT INTO questions
                    (topic_id, concept_id, level, title, difficulty, content_type, prompt, answer, parent_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    topic_id,
                    concept_id,
                    question.level,
                    question.title,
                    question.difficulty.as_str(),
                    question.content_type.as_str(),
                    question.prompt,
                    question.answer,
                    parent_id
                ],
            )?;
            question_ids.insert(question.id, tx.last_insert_rowid());
            report.questions += 1;
        }

        tx.commit()?;
        info!(
            "imported {} questions and {} concepts into {} topic(s)",
            report.questions,
            report.concepts,
            report.topics.len()
        );
        Ok(report)
    }

    // Topic operations
    pub fn get_or_create_topic(&self, name: &str, description: Option<&str>) -> Result<(i64, bool)> {
        get_or_create_topic(&self.conn, name, description)
    }

    pub fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
        let topic = self.conn.query_row(
            "SELECT id, name, description FROM topics WHERE id = ?1",
            params![id],
            topic_from_row,
        );

        match topic {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_topics(&self) -> Result<Vec<TopicSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.name, t.description,
                   (SELECT COUNT(*) FROM questions q WHERE q.topic_id = t.id),
                   (SELECT COUNT(*) FROM concepts c WHERE c.topic_id = t.id)
            FROM topics t
            ORDER BY t.name
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(TopicSummary {
                topic: topic_from_row(row)?,
                question_count: row.get(3)?,
                concept_count: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    pub fn delete_topic(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM topics WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Question operations
    pub fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let question = self.conn.query_row(
            &format!("SELECT {} FROM questions q WHERE q.id = ?1", QUESTION_COLUMNS),
            params![id],
            question_from_row,
        );

        match question {
            Ok(q) => Ok(Some(q)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stochastic pick of a practice question. Unanswered and overdue
    /// questions are favoured; ids in `exclude` are never returned.
    pub fn random_question(
        &self,
        topic_id: Option<i64>,
        difficulty: Option<Difficulty>,
        exclude: &[i64],
        today: NaiveDate,
    ) -> Result<Option<Question>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, s.next_review, s.last_confidence
            FROM questions q
            LEFT JOIN review_states s ON s.question_id = q.id
            WHERE (?1 IS NULL OR q.topic_id = ?1)
              AND (?2 IS NULL OR q.difficulty = ?2)
            ORDER BY q.id
            "#,
            QUESTION_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![topic_id, difficulty.map(|d| d.as_str())],
            |row| {
                let next_review: Option<NaiveDate> = row.get(10)?;
                let confidence: Option<u8> = row.get(11)?;
                Ok((question_from_row(row)?, next_review.zip(confidence)))
            },
        )?;
        let candidates: Vec<(Question, Option<(NaiveDate, u8)>)> = rows
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|(q, _)| !exclude.contains(&q.id))
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        use rand::Rng;
        let mut rng = rand::thread_rng();

        let weights: Vec<f64> = candidates
            .iter()
            .map(|(_, seen)| pick_weight(*seen, today))
            .collect();
        let total_weight: f64 = weights.iter().sum();
        let mut random_point = rng.gen::<f64>() * total_weight;

        for (i, weight) in weights.iter().enumerate() {
            random_point -= weight;
            if random_point <= 0.0 {
                return Ok(candidates.into_iter().nth(i).map(|(q, _)| q));
            }
        }

        Ok(candidates.into_iter().next().map(|(q, _)| q))
    }

    /// Rebuild the graph, optionally for a single topic.
    pub fn load_graph(&self, topic_id: Option<i64>) -> Result<ConceptGraph> {
        let topics = {
            let mut stmt = self.conn.prepare(
                "SELECT id, name, description FROM topics WHERE (?1 IS NULL OR id = ?1) ORDER BY name",
            )?;
            let rows = stmt.query_map(params![topic_id], topic_from_row)?;
            rows.collect::<Result<Vec<_>>>()?
        };

        let mut concepts = {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT id, topic_id, name, estimated_minutes FROM concepts
                WHERE (?1 IS NULL OR topic_id = ?1)
                ORDER BY id
                "#,
            )?;
            let rows = stmt.query_map(params![topic_id], |row| {
                Ok(Concept {
                    id: row.get(0)?,
                    topic_id: row.get(1)?,
                    name: row.get(2)?,
                    tags: Default::default(),
                    estimated_minutes: row.get(3)?,
                    related: vec![],
                    resources: vec![],
                })
            })?;
            rows.collect::<Result<Vec<_>>>()?
        };

        for concept in &mut concepts {
            concept.tags = self.get_concept_tags(concept.id)?.into_iter().collect();
            concept.resources = self.get_concept_resources(concept.id)?;
            concept.related = self.get_concept_links(concept.id)?;
        }

        let questions = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {} FROM questions q WHERE (?1 IS NULL OR q.topic_id = ?1) ORDER BY q.id",
                QUESTION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![topic_id], question_from_row)?;
            rows.collect::<Result<Vec<_>>>()?
        };

        Ok(ConceptGraph {
            topics,
            concepts,
            questions,
        })
    }

    fn get_concept_tags(&self, concept_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tg.name
            FROM tags tg
            JOIN concept_tags ct ON tg.id = ct.tag_id
            WHERE ct.concept_id = ?1
            ORDER BY tg.name
            "#,
        )?;

        let rows = stmt.query_map(params![concept_id], |row| row.get(0))?;
        rows.collect()
    }

    fn get_concept_resources(&self, concept_id: i64) -> Result<Vec<Resource>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, url, title FROM resources WHERE concept_id = ?1 ORDER BY id")?;

        let rows = stmt.query_map(params![concept_id], |row| {
            let kind: String = row.get(0)?;
            Ok(Resource {
                kind: ResourceKind::from_str(&kind).unwrap_or(ResourceKind::Article),
                url: row.get(1)?,
                title: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    fn get_concept_links(&self, concept_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_name FROM concept_links WHERE concept_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![concept_id], |row| row.get(0))?;
        rows.collect()
    }

    // Review operations
    pub fn load_review_states(&self) -> Result<HashMap<i64, ReviewState>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT s.question_id, {} FROM review_states s",
            STATE_COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, state_from_row(row, 1)?)))?;
        rows.collect()
    }

    pub fn get_review_state(&self, question_id: i64) -> Result<Option<ReviewState>> {
        get_review_state(&self.conn, question_id)
    }

    /// Schedule and persist one answer: the new state plus a history row.
    pub fn record_answer(
        &self,
        question_id: i64,
        confidence: Confidence,
        now: DateTime<Utc>,
        session_id: Option<i64>,
        user_answer: Option<&str>,
    ) -> Result<ReviewState> {
        let tx = self.conn.unchecked_transaction()?;

        let prior = get_review_state(&tx, question_id)?;
        let state = schedule_review(prior.as_ref(), confidence, now);

        tx.execute(
            r#"
            INSERT INTO review_states
                (question_id, last_answered, review_count, streak, interval_days, ease, last_confidence, next_review)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(question_id) DO UPDATE SET
                last_answered = excluded.last_answered,
                review_count = excluded.review_count,
                streak = excluded.streak,
                interval_days = excluded.interval_days,
                ease = excluded.ease,
                last_confidence = excluded.last_confidence,
                next_review = excluded.next_review
            "#,
            params![
                question_id,
                state.last_answered,
                state.review_count,
                state.streak,
                state.interval_days,
                state.ease,
                state.last_confidence,
                state.next_review
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO review_history
                (question_id, session_id, confidence, answered_at, interval_days, ease, user_answer)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                question_id,
                session_id,
                confidence.value(),
                now,
                state.interval_days,
                state.ease,
                user_answer
            ],
        )?;

        tx.commit()?;
        info!(
            "question {} answered with confidence {}, next review {}",
            question_id,
            confidence.value(),
            state.next_review
        );
        Ok(state)
    }

    /// Answered questions due on `today`, oldest next review first, then
    /// lowest ease.
    pub fn due_questions(
        &self,
        today: NaiveDate,
        topic_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<DueQuestion>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, {}
            FROM questions q
            JOIN review_states s ON s.question_id = q.id
            WHERE s.next_review <= ?1
              AND (?2 IS NULL OR q.topic_id = ?2)
            ORDER BY s.next_review ASC, s.ease ASC, q.id ASC
            LIMIT ?3
            "#,
            QUESTION_COLUMNS, STATE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![today, topic_id, limit as i64], |row| {
            Ok(DueQuestion {
                question: question_from_row(row)?,
                state: state_from_row(row, 10)?,
            })
        })?;
        rows.collect()
    }

    pub fn review_history(&self, question_id: i64, limit: usize) -> Result<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, question_id, session_id, confidence, answered_at, interval_days, ease, user_answer
            FROM review_history
            WHERE question_id = ?1
            ORDER BY answered_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![question_id, limit as i64], |row| {
            Ok(ReviewRecord {
                id: row.get(0)?,
                question_id: row.get(1)?,
                session_id: row.get(2)?,
                confidence: row.get(3)?,
                answered_at: row.get(4)?,
                interval_days: row.get(5)?,
                ease: row.get(6)?,
                user_answer: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    // Practice session operations
    pub fn start_session(&self, now: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sessions (started_at) VALUES (?1)",
            params![now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("started session {}", id);
        Ok(id)
    }

    /// Close a session, counting its answers and writing a summary.
    pub fn end_session(&self, session_id: i64, now: DateTime<Utc>) -> Result<Option<PracticeSession>> {
        let Some(session) = self.get_session(session_id)? else {
            return Ok(None);
        };

        let answered: Vec<(String, Difficulty)> = {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT t.name, q.difficulty
                FROM review_history h
                JOIN questions q ON q.id = h.question_id
                JOIN topics t ON t.id = q.topic_id
                WHERE h.session_id = ?1
                ORDER BY h.id
                "#,
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                let difficulty: String = row.get(1)?;
                Ok((
                    row.get(0)?,
                    Difficulty::from_str(&difficulty).unwrap_or(Difficulty::Medium),
                ))
            })?;
            rows.collect::<Result<Vec<_>>>()?
        };

        let duration = (now - session.started_at).num_seconds().max(0) as f64 / 60.0;
        let duration = (duration * 100.0).round() / 100.0;
        let summary = build_session_summary(session_id, session.started_at, &answered);

        self.conn.execute(
            r#"
            UPDATE sessions
            SET ended_at = ?1, questions_count = ?2, duration_minutes = ?3, summary = ?4
            WHERE id = ?5
            "#,
            params![now, answered.len() as i64, duration, summary, session_id],
        )?;
        info!("ended session {} after {} answers", session_id, answered.len());

        self.get_session(session_id)
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<PracticeSession>> {
        let session = self.conn.query_row(
            r#"
            SELECT id, started_at, ended_at, questions_count, duration_minutes, summary
            FROM sessions WHERE id = ?1
            "#,
            params![session_id],
            session_from_row,
        );

        match session {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Distinct questions answered in a session, in first-answer order.
    pub fn answered_in_session(&self, session_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT question_id FROM review_history
            WHERE session_id = ?1
            GROUP BY question_id
            ORDER BY MIN(id)
            "#,
        )?;
        let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
        rows.collect()
    }

    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<PracticeSession>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, started_at, ended_at, questions_count, duration_minutes, summary
            FROM sessions
            ORDER BY started_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], session_from_row)?;
        rows.collect()
    }

    // Statistics
    pub fn get_stats(&self, now: DateTime<Utc>) -> Result<Stats> {
        let total_topics: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))?;

        let total_questions: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?;

        let answered_questions: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT question_id) FROM review_history",
            [],
            |row| row.get(0),
        )?;

        let total_reviews: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM review_history", [], |row| row.get(0))?;

        let total_sessions: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let due_today: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM review_states WHERE next_review <= ?1",
            params![now.date_naive()],
            |row| row.get(0),
        )?;

        let topics = {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT t.id, t.name,
                       (SELECT COUNT(*) FROM questions q WHERE q.topic_id = t.id),
                       (SELECT COUNT(DISTINCT h.question_id)
                          FROM review_history h
                          JOIN questions q ON q.id = h.question_id
                         WHERE q.topic_id = t.id)
                FROM topics t
                ORDER BY t.name
                "#,
            )?;
            let rows = stmt.query_map([], |row| {
                let total: i64 = row.get(2)?;
                let answered: i64 = row.get(3)?;
                Ok(TopicStats {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    total_questions: total,
                    answered_questions: answered,
                    progress_percent: percent(answered as usize, total as usize),
                })
            })?;
            rows.collect::<Result<Vec<_>>>()?
        };

        let daily_activity = {
            let cutoff = now - Duration::days(ACTIVITY_DAYS);
            let mut stmt = self
                .conn
                .prepare("SELECT answered_at FROM review_history WHERE answered_at >= ?1")?;
            let rows = stmt.query_map(params![cutoff], |row| row.get::<_, DateTime<Utc>>(0))?;

            let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
            for answered_at in rows {
                *per_day.entry(answered_at?.date_naive()).or_insert(0) += 1;
            }
            per_day
                .into_iter()
                .map(|(date, count)| DailyActivity { date, count })
                .collect()
        };

        Ok(Stats {
            total_topics,
            total_questions,
            answered_questions,
            progress_percent: percent(answered_questions as usize, total_questions as usize),
            total_reviews,
            total_sessions,
            due_today,
            topics,
            daily_activity,
        })
    }
}

fn get_or_create_topic(conn: &Connection, name: &str, description: Option<&str>) -> Result<(i64, bool)> {
    let existing: Result<i64> =
        conn.query_row("SELECT id FROM topics WHERE name = ?1", params![name], |row| {
            row.get(0)
        });

    match existing {
        Ok(id) => {
            conn.execute(
                "UPDATE topics SET description = COALESCE(description, ?1) WHERE id = ?2",
                params![description, id],
            )?;
            Ok((id, false))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            conn.execute(
                "INSERT INTO topics (name, description) VALUES (?1, ?2)",
                params![name, description],
            )?;
            Ok((conn.last_insert_rowid(), true))
        }
        Err(e) => Err(e),
    }
}

// Remove a topic's concepts and questions; review data cascades with them.
fn clear_topic(conn: &Connection, topic_id: i64) -> Result<usize> {
    let questions = conn.execute("DELETE FROM questions WHERE topic_id = ?1", params![topic_id])?;
    conn.execute("DELETE FROM concepts WHERE topic_id = ?1", params![topic_id])?;
    debug!("cleared {} questions from topic {}", questions, topic_id);
    Ok(questions)
}

fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64> {
    let existing: Result<i64> =
        conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        });

    match existing {
        Ok(id) => Ok(id),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
            Ok(conn.last_insert_rowid())
        }
        Err(e) => Err(e),
    }
}

fn get_review_state(conn: &Connection, question_id: i64) -> Result<Option<ReviewState>> {
    let state = conn.query_row(
        &format!(
            "SELECT {} FROM review_states s WHERE s.question_id = ?1",
            STATE_COLUMNS
        ),
        params![question_id],
        |row| state_from_row(row, 0),
    );

    match state {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn topic_from_row(row: &Row) -> Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn question_from_row(row: &Row) -> Result<Question> {
    let difficulty: String = row.get(5)?;
    let content_type: String = row.get(6)?;
    Ok(Question {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        concept_id: row.get(2)?,
        level: row.get(3)?,
        title: row.get(4)?,
        difficulty: Difficulty::from_str(&difficulty).unwrap_or(Difficulty::Medium),
        content_type: ContentType::from_str(&content_type).unwrap_or(ContentType::Text),
        prompt: row.get(7)?,
        answer: row.get(8)?,
        parent_id: row.get(9)?,
    })
}

// Reads the STATE_COLUMNS starting at `offset`.
fn state_from_row(row: &Row, offset: usize) -> Result<ReviewState> {
    Ok(ReviewState {
        last_answered: row.get(offset)?,
        review_count: row.get(offset + 1)?,
        streak: row.get(offset + 2)?,
        interval_days: row.get(offset + 3)?,
        ease: row.get(offset + 4)?,
        last_confidence: row.get(offset + 5)?,
        next_review: row.get(offset + 6)?,
    })
}

fn session_from_row(row: &Row) -> Result<PracticeSession> {
    Ok(PracticeSession {
        id: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        questions_count: row.get(3)?,
        duration_minutes: row.get(4)?,
        summary: row.get(5)?,
    })
}

// Selection weight for the stochastic pick: unseen questions first, then
// overdue ones scaled by how shaky the last answer was.
fn pick_weight(seen: Option<(NaiveDate, u8)>, today: NaiveDate) -> f64 {
    match seen {
        None => 3.0,
        Some((next_review, confidence)) if next_review <= today => {
            let overdue_days = (today - next_review).num_days() as f64 + 1.0;
            let shakiness = 6.0 - f64::from(confidence.clamp(1, 5));
            overdue_days.min(30.0) * shakiness / 2.0 + 1.0
        }
        Some(_) => 0.25,
    }
}

/// Plain-text recap of a session, grouped by topic and difficulty.
pub fn build_session_summary(
    session_id: i64,
    started_at: DateTime<Utc>,
    answered: &[(String, Difficulty)],
) -> String {
    let mut by_topic: BTreeMap<&str, BTreeMap<Difficulty, usize>> = BTreeMap::new();
    for (topic, difficulty) in answered {
        *by_topic
            .entry(topic.as_str())
            .or_default()
            .entry(*difficulty)
            .or_insert(0) += 1;
    }

    let mut lines = vec![
        format!("Practice session #{}", session_id),
        format!("Started: {}", started_at.format("%Y-%m-%d %H:%M")),
        format!("Questions answered: {}", answered.len()),
    ];
    for (topic, counts) in by_topic {
        lines.push(String::new());
        lines.push(format!("{}: {}", topic, counts.values().sum::<usize>()));
        for (difficulty, count) in counts {
            lines.push(format!("  {}: {}", difficulty.as_str(), count));
        }
    }
    lines.join("\n")
}
