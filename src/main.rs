use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

use ladder::analysis::{aggregate_progress, rank_weak_spots, weak_spots::Group};
use ladder::config::{self, Config};
use ladder::db::Database;
use ladder::error::{AppError, AppResult};
use ladder::import::parse;
use ladder::models::{Difficulty, JsonOutput};
use ladder::scheduler::Confidence;

#[derive(Parser)]
#[command(name = "ladder")]
#[command(about = "Practice progressive concept banks with confidence-driven spaced repetition")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Import a question bank (flat or progressive markdown)
    Import {
        /// Path to the bank
        file: PathBuf,

        /// Replace the existing questions of the imported topics
        #[arg(long)]
        replace: bool,

        /// Parse and report without storing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage topics
    #[command(subcommand)]
    Topic(TopicCommands),

    /// Show a question
    Question {
        /// Question ID
        id: i64,

        /// Reveal the canonical answer
        #[arg(long, short)]
        answer: bool,
    },

    /// Pick a question to practise (stochastic selection)
    Next {
        /// Restrict to a topic ID
        #[arg(long, short)]
        topic: Option<i64>,

        /// Restrict to a difficulty: easy/medium/hard
        #[arg(long, short)]
        difficulty: Option<String>,

        /// Skip questions already answered in this session
        #[arg(long, short)]
        session: Option<i64>,
    },

    /// Record how confidently you answered a question
    Answer {
        /// Question ID
        id: i64,

        /// Confidence from 1 (forgot) to 5 (perfect)
        #[arg(long, short)]
        confidence: i64,

        /// Practice session the answer belongs to
        #[arg(long, short)]
        session: Option<i64>,

        /// Your own answer, kept in the history
        #[arg(long, short)]
        text: Option<String>,
    },

    /// List questions due for review
    Due {
        /// Restrict to a topic ID
        #[arg(long, short)]
        topic: Option<i64>,

        /// Maximum number of questions
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Rank topics and concepts that need attention
    Weak {
        /// Maximum number of entries
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// Show completion per topic and level
    Progress {
        /// Restrict to a topic ID
        #[arg(long, short)]
        topic: Option<i64>,
    },

    /// Show practice statistics
    Stats,

    /// Manage practice sessions
    #[command(subcommand)]
    Session(SessionCommands),
}

#[derive(Subcommand)]
enum TopicCommands {
    /// List all topics
    List,

    /// Show topic details
    Show {
        /// Topic ID
        id: i64,
    },

    /// Delete a topic with its questions and review data
    Delete {
        /// Topic ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a practice session
    Start,

    /// End a session and print its summary
    End {
        /// Session ID
        id: i64,
    },

    /// List recent sessions
    List {
        /// Maximum number of sessions
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(config::LOG_ENV, config::DEFAULT_LOG_FILTER),
    )
    .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli, Config::from_env()) {
        if json {
            match serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                Ok(out) => println!("{}", out),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: Config) -> AppResult<()> {
    config.prepare_db_dir()?;
    let db = Database::open(&config.db_path)?;
    db.init()?;

    let now = Utc::now();
    let today = now.date_naive();

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", config.db_path.display());
            }
        }

        Commands::Import {
            file,
            replace,
            dry_run,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let outcome = parse(&text)?;
            for warning in &outcome.warnings {
                warn!("{}: {}", file.display(), warning);
            }

            let report = if dry_run {
                None
            } else {
                Some(db.import_graph(&outcome.graph, replace)?)
            };
            info!("parsed {} as {} format", file.display(), outcome.format.as_str());

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "format": outcome.format.as_str(),
                        "dry_run": dry_run,
                        "topics": outcome.graph.topics.len(),
                        "concepts": outcome.graph.concepts.len(),
                        "questions": outcome.graph.questions.len(),
                        "warnings": outcome.warnings,
                        "report": report
                    })))?
                );
            } else {
                println!(
                    "Parsed {} ({} format): {} topic(s), {} concept(s), {} question(s)",
                    file.display(),
                    outcome.format.as_str(),
                    outcome.graph.topics.len(),
                    outcome.graph.concepts.len(),
                    outcome.graph.questions.len()
                );
                for warning in &outcome.warnings {
                    println!("  warning: {}", warning);
                }
                match report {
                    Some(report) => {
                        for topic in &report.topics {
                            let action = if topic.created {
                                "created".to_string()
                            } else if topic.replaced > 0 {
                                format!("replaced {} question(s)", topic.replaced)
                            } else {
                                "appended".to_string()
                            };
                            println!("Topic '{}' (ID: {}): {}", topic.name, topic.id, action);
                        }
                        println!(
                            "Imported {} question(s), {} resource(s).",
                            report.questions, report.resources
                        );
                    }
                    None => println!("Dry run, nothing stored."),
                }
            }
        }

        Commands::Topic(topic_cmd) => match topic_cmd {
            TopicCommands::List => {
                let topics = db.list_topics()?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&topics))?);
                } else if topics.is_empty() {
                    println!("No topics found. Import a bank first!");
                } else {
                    println!("{:<5} {:<40} {:>9} {:>9}", "ID", "NAME", "CONCEPTS", "QUESTIONS");
                    println!("{}", "-".repeat(66));
                    for t in topics {
                        println!(
                            "{:<5} {:<40} {:>9} {:>9}",
                            t.topic.id,
                            truncate(&t.topic.name, 38),
                            t.concept_count,
                            t.question_count
                        );
                    }
                }
            }

            TopicCommands::Show { id } => {
                let topic = db
                    .get_topic(id)?
                    .ok_or_else(|| AppError::NotFound(format!("topic {}", id)))?;
                let graph = db.load_graph(Some(id))?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&graph))?);
                } else {
                    println!("Topic: {}", topic.name);
                    println!("ID: {}", topic.id);
                    if let Some(desc) = &topic.description {
                        println!("Description: {}", desc);
                    }
                    for concept in graph.concepts_in_topic(topic.id) {
                        println!();
                        println!("[{}] {}", concept.id, concept.name);
                        if !concept.tags.is_empty() {
                            let tags: Vec<&str> = concept.tags.iter().map(String::as_str).collect();
                            println!("  Tags: {}", tags.join(", "));
                        }
                        if let Some(minutes) = concept.estimated_minutes {
                            println!("  Estimated time: {} min", minutes);
                        }
                        for level in graph.levels(concept.id) {
                            println!(
                                "  L{} #{:<5} {:<7} {}",
                                level.level,
                                level.id,
                                level.difficulty.as_str(),
                                truncate(&level.title, 50)
                            );
                        }
                    }
                    let flat: Vec<_> = graph
                        .questions_in_topic(topic.id)
                        .filter(|q| q.concept_id.is_none())
                        .collect();
                    if !flat.is_empty() {
                        println!();
                        println!("Questions:");
                        for q in flat {
                            println!(
                                "  #{:<5} {:<7} {}",
                                q.id,
                                q.difficulty.as_str(),
                                truncate(&q.title, 55)
                            );
                        }
                    }
                }
            }

            TopicCommands::Delete { id } => {
                if !db.delete_topic(id)? {
                    return Err(AppError::NotFound(format!("topic {}", id)));
                }
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Topic {} deleted.", id);
                }
            }
        },

        Commands::Question { id, answer } => {
            let question = db
                .get_question(id)?
                .ok_or_else(|| AppError::NotFound(format!("question {}", id)))?;
            let graph = db.load_graph(Some(question.topic_id))?;
            let state = db.get_review_state(id)?;
            let history = db.review_history(id, 5)?;
            let concept = question.concept_id.and_then(|c| graph.concept(c));
            let (related, lookups) = match concept {
                Some(c) => graph.related_concepts(c),
                None => (vec![], vec![]),
            };
            for lookup in &lookups {
                warn!("{}", lookup);
            }

            if cli.json {
                let related: Vec<&str> = related.iter().map(|c| c.name.as_str()).collect();
                let mut question = question.clone();
                if !answer {
                    question.answer.clear();
                }
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "question": question,
                        "concept": concept,
                        "related": related,
                        "lookup_warnings": lookups,
                        "state": state,
                        "history": history
                    })))?
                );
            } else {
                println!("=== {} ===", question.title);
                println!(
                    "ID: {}  Level: {}  Difficulty: {}  Type: {}",
                    question.id,
                    question.level,
                    question.difficulty.as_str(),
                    question.content_type.as_str()
                );
                if let Some(parent) = graph.parent(&question) {
                    println!("Builds on: #{} {}", parent.id, parent.title);
                }
                for child in graph.children(&question) {
                    println!("Leads to: #{} {}", child.id, child.title);
                }
                println!();
                println!("{}", question.prompt);
                if answer {
                    println!();
                    println!("--- Answer ---");
                    println!("{}", question.answer);
                }

                if let Some(c) = concept {
                    if !c.resources.is_empty() {
                        println!();
                        println!("Resources:");
                        for r in &c.resources {
                            println!("  [{}] {} - {}", r.kind.as_str(), r.url, r.title);
                        }
                    }
                    if !related.is_empty() {
                        let names: Vec<&str> = related.iter().map(|c| c.name.as_str()).collect();
                        println!("Related: {}", names.join(", "));
                    }
                }

                println!();
                match &state {
                    Some(s) => {
                        println!(
                            "Reviews: {} (streak {}), last confidence {}",
                            s.review_count, s.streak, s.last_confidence
                        );
                        println!(
                            "Next review: {} (interval {}d, ease {:.2})",
                            s.next_review, s.interval_days, s.ease
                        );
                    }
                    None => println!("Not answered yet."),
                }
                for record in &history {
                    println!(
                        "  {}  confidence {}",
                        record.answered_at.format("%Y-%m-%d %H:%M"),
                        record.confidence
                    );
                }
            }
        }

        Commands::Next {
            topic,
            difficulty,
            session,
        } => {
            let difficulty = difficulty
                .map(|d| {
                    Difficulty::from_str(&d).ok_or_else(|| {
                        AppError::InvalidInput(format!(
                            "Invalid difficulty '{}'. Use: easy, medium, or hard",
                            d
                        ))
                    })
                })
                .transpose()?;
            let exclude = match session {
                Some(id) => db.answered_in_session(id)?,
                None => vec![],
            };

            match db.random_question(topic, difficulty, &exclude, today)? {
                Some(q) => {
                    if cli.json {
                        println!(
                            "{}",
                            serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                                "id": q.id,
                                "title": q.title,
                                "level": q.level,
                                "difficulty": q.difficulty,
                                "content_type": q.content_type,
                                "prompt": q.prompt
                            })))?
                        );
                    } else {
                        println!("=== Next Question ===");
                        println!();
                        println!("{} (ID: {})", q.title, q.id);
                        println!("Difficulty: {}", q.difficulty.as_str());
                        println!();
                        println!("{}", q.prompt);
                        println!();
                        println!("After answering, record your confidence with:");
                        println!("  ladder answer {} --confidence <1-5>", q.id);
                    }
                }
                None => {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("No questions left to practise.");
                    }
                }
            }
        }

        Commands::Answer {
            id,
            confidence,
            session,
            text,
        } => {
            let confidence = Confidence::new(confidence)?;
            let question = db
                .get_question(id)?
                .ok_or_else(|| AppError::NotFound(format!("question {}", id)))?;
            if let Some(session_id) = session {
                db.get_session(session_id)?
                    .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;
            }

            let state = db.record_answer(id, confidence, now, session, text.as_deref())?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "question_id": id,
                        "answer": question.answer,
                        "state": state
                    })))?
                );
            } else {
                println!(
                    "Recorded confidence {} ({}) for question {}.",
                    confidence.value(),
                    confidence.label(),
                    id
                );
                println!();
                println!("--- Answer ---");
                println!("{}", question.answer);
                println!();
                println!(
                    "Next review: {} (in {} day(s), ease {:.2})",
                    state.next_review, state.interval_days, state.ease
                );
            }
        }

        Commands::Due { topic, limit } => {
            let due = db.due_questions(today, topic, limit.unwrap_or(config.due_limit))?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&due))?);
            } else if due.is_empty() {
                println!("Nothing due. Come back later!");
            } else {
                println!("{:<6} {:<45} {:<11} {:>5}", "ID", "TITLE", "DUE", "EASE");
                println!("{}", "-".repeat(70));
                for d in due {
                    println!(
                        "{:<6} {:<45} {:<11} {:>5.2}",
                        d.question.id,
                        truncate(&d.question.title, 43),
                        d.state.next_review.to_string(),
                        d.state.ease
                    );
                }
            }
        }

        Commands::Weak { limit } => {
            let graph = db.load_graph(None)?;
            let states = db.load_review_states()?;
            let spots: Vec<_> = rank_weak_spots(&graph, &states)
                .into_iter()
                .take(limit)
                .collect();

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&spots))?);
            } else if spots.is_empty() {
                println!("Nothing to rank yet. Import a bank first!");
            } else {
                println!("{:<7} {:<8} {:<35} {:>9} {:>6}", "SCORE", "KIND", "NAME", "ANSWERED", "LEVEL");
                println!("{}", "-".repeat(70));
                for spot in spots {
                    let kind = match spot.group {
                        Group::Topic(_) => "topic",
                        Group::Concept(_) => "concept",
                    };
                    let level = spot
                        .weakest_level
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<7.3} {:<8} {:<35} {:>9} {:>6}",
                        spot.score,
                        kind,
                        truncate(&spot.name, 33),
                        format!("{}/{}", spot.answered, spot.total),
                        level
                    );
                }
            }
        }

        Commands::Progress { topic } => {
            if let Some(id) = topic {
                db.get_topic(id)?
                    .ok_or_else(|| AppError::NotFound(format!("topic {}", id)))?;
            }
            let graph = db.load_graph(topic)?;
            let states = db.load_review_states()?;
            let report = aggregate_progress(&graph, &states, today);

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&report))?);
            } else {
                println!("=== Progress ({}) ===", report.today);
                for t in &report.topics {
                    println!();
                    println!(
                        "{}: {}/{} answered ({:.1}%), {} due",
                        t.name, t.counts.answered, t.counts.total, t.counts.percent, t.counts.due
                    );
                    for l in &t.levels {
                        println!(
                            "  Level {}: {}/{} ({:.1}%), {} due",
                            l.level, l.counts.answered, l.counts.total, l.counts.percent, l.counts.due
                        );
                    }
                }
                println!();
                println!(
                    "Overall: {}/{} answered ({:.1}%), {} due",
                    report.overall.answered,
                    report.overall.total,
                    report.overall.percent,
                    report.overall.due
                );
            }
        }

        Commands::Stats => {
            let stats = db.get_stats(now)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                println!("=== Practice Statistics ===");
                println!("Topics: {}", stats.total_topics);
                println!(
                    "Questions answered: {}/{} ({:.1}%)",
                    stats.answered_questions, stats.total_questions, stats.progress_percent
                );
                println!("Total answers: {}", stats.total_reviews);
                println!("Sessions: {}", stats.total_sessions);
                println!("Due today: {}", stats.due_today);
                if !stats.topics.is_empty() {
                    println!();
                    for t in &stats.topics {
                        println!(
                            "  {:<30} {:>4}/{:<4} {:>5.1}%",
                            truncate(&t.name, 30),
                            t.answered_questions,
                            t.total_questions,
                            t.progress_percent
                        );
                    }
                }
                if !stats.daily_activity.is_empty() {
                    println!();
                    println!("Last 30 days:");
                    for day in &stats.daily_activity {
                        println!("  {}  {}", day.date, "#".repeat(day.count.clamp(0, 60) as usize));
                    }
                }
            }
        }

        Commands::Session(session_cmd) => match session_cmd {
            SessionCommands::Start => {
                let id = db.start_session(now)?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({ "id": id })))?
                    );
                } else {
                    println!("Started session {}.", id);
                    println!("Practise with: ladder next --session {}", id);
                }
            }

            SessionCommands::End { id } => {
                let session = db
                    .end_session(id, now)?
                    .ok_or_else(|| AppError::NotFound(format!("session {}", id)))?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&session))?);
                } else {
                    if let Some(summary) = &session.summary {
                        println!("{}", summary);
                    }
                    if let Some(minutes) = session.duration_minutes {
                        println!();
                        println!("Duration: {:.1} min", minutes);
                    }
                }
            }

            SessionCommands::List { limit } => {
                let sessions = db.recent_sessions(limit)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&sessions))?);
                } else if sessions.is_empty() {
                    println!("No sessions yet.");
                } else {
                    println!("{:<5} {:<17} {:<17} {:>9}", "ID", "STARTED", "ENDED", "ANSWERS");
                    println!("{}", "-".repeat(51));
                    for s in sessions {
                        let ended = s
                            .ended_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "open".to_string());
                        println!(
                            "{:<5} {:<17} {:<17} {:>9}",
                            s.id,
                            s.started_at.format("%Y-%m-%d %H:%M").to_string(),
                            ended,
                            s.questions_count
                        );
                    }
                }
            }
        },
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
