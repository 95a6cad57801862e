use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::{ConceptGraph, ReviewState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Counts {
    pub total: usize,
    pub answered: usize,
    pub due: usize,
    pub percent: f64,
}

impl Counts {
    fn add(&mut self, state: Option<&ReviewState>, today: NaiveDate) {
        self.total += 1;
        if let Some(state) = state {
            self.answered += 1;
            if state.is_due(today) {
                self.due += 1;
            }
        }
        self.percent = percent(self.answered, self.total);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    #[serde(flatten)]
    pub counts: Counts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicProgress {
    pub topic_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub counts: Counts,
    pub levels: Vec<LevelProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub today: NaiveDate,
    pub overall: Counts,
    pub topics: Vec<TopicProgress>,
}

/// Roll review states up into per-topic and per-level counters.
pub fn aggregate_progress(
    graph: &ConceptGraph,
    states: &HashMap<i64, ReviewState>,
    today: NaiveDate,
) -> ProgressReport {
    let mut overall = Counts::default();
    let mut topics = Vec::with_capacity(graph.topics.len());

    for topic in &graph.topics {
        let mut counts = Counts::default();
        let mut levels: BTreeMap<u32, Counts> = BTreeMap::new();

        for question in graph.questions_in_topic(topic.id) {
            let state = states.get(&question.id);
            counts.add(state, today);
            overall.add(state, today);
            levels.entry(question.level).or_default().add(state, today);
        }

        topics.push(TopicProgress {
            topic_id: topic.id,
            name: topic.name.clone(),
            counts,
            levels: levels
                .into_iter()
                .map(|(level, counts)| LevelProgress { level, counts })
                .collect(),
        });
    }

    ProgressReport {
        today,
        overall,
        topics,
    }
}

/// Share answered, as a percentage with one decimal.
pub fn percent(answered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (answered as f64 / total as f64 * 1000.0).round() / 10.0
}
