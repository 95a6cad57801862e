use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::{ConceptGraph, Question, ReviewState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Group {
    Topic(i64),
    Concept(i64),
}

#[derive(Debug, Clone, Serialize)]
pub struct WeakSpot {
    pub group: Group,
    pub name: String,
    pub topic: String,
    pub score: f64,
    pub total: usize,
    pub answered: usize,
    pub fragile: usize,
    pub weighted_confidence: f64,
    /// Lowest level that is unanswered or shaky. Concepts only.
    pub weakest_level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakSpotWeights {
    pub fragile: f64,
    pub unanswered: f64,
    pub confidence: f64,
    pub ease_threshold: f64,
    pub half_life_days: f64,
    pub low_confidence_boost: f64,
}

impl Default for WeakSpotWeights {
    fn default() -> Self {
        Self {
            fragile: 0.4,
            unanswered: 0.3,
            confidence: 0.3,
            ease_threshold: 1.8,
            half_life_days: 14.0,
            low_confidence_boost: 2.0,
        }
    }
}

pub fn rank_weak_spots(
    graph: &ConceptGraph,
    states: &HashMap<i64, ReviewState>,
) -> Vec<WeakSpot> {
    rank_weak_spots_with(graph, states, &WeakSpotWeights::default())
}

/// Score every topic and concept that has questions, weakest first.
pub fn rank_weak_spots_with(
    graph: &ConceptGraph,
    states: &HashMap<i64, ReviewState>,
    weights: &WeakSpotWeights,
) -> Vec<WeakSpot> {
    // Recency is measured against the latest answer so the ranking stays pure.
    let reference = states.values().map(|s| s.last_answered).max();
    let mut spots = Vec::new();

    for topic in &graph.topics {
        let questions: Vec<&Question> = graph.questions_in_topic(topic.id).collect();
        if questions.is_empty() {
            continue;
        }
        let mut spot = score_group(&questions, states, reference, weights);
        spot.group = Group::Topic(topic.id);
        spot.name = topic.name.clone();
        spot.topic = topic.name.clone();
        spots.push(spot);
    }

    for concept in &graph.concepts {
        let levels = graph.levels(concept.id);
        if levels.is_empty() {
            continue;
        }
        let mut spot = score_group(&levels, states, reference, weights);
        spot.group = Group::Concept(concept.id);
        spot.name = concept.name.clone();
        spot.topic = graph
            .topic(concept.topic_id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        spot.weakest_level = levels
            .iter()
            .find(|q| match states.get(&q.id) {
                None => true,
                Some(s) => {
                    s.ease < weights.ease_threshold
                        || s.last_confidence <= crate::scheduler::LOW_CONFIDENCE_CUTOFF
                }
            })
            .map(|q| q.level);
        spots.push(spot);
    }

    spots.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.total.cmp(&a.total))
            .then_with(|| a.name.cmp(&b.name))
            .then(a.group.cmp(&b.group))
    });
    spots
}

fn score_group(
    questions: &[&Question],
    states: &HashMap<i64, ReviewState>,
    reference: Option<DateTime<Utc>>,
    weights: &WeakSpotWeights,
) -> WeakSpot {
    let total = questions.len();
    let answered: Vec<&ReviewState> = questions.iter().filter_map(|q| states.get(&q.id)).collect();
    let fragile = answered
        .iter()
        .filter(|s| s.ease < weights.ease_threshold)
        .count();

    let weighted_confidence = match reference {
        Some(reference) if !answered.is_empty() => {
            let (sum, norm) = answered.iter().fold((0.0, 0.0), |(sum, norm), s| {
                let w = recency_weight(s, reference, weights);
                let c = f64::from(s.last_confidence.clamp(1, 5) - 1) / 4.0;
                (sum + w * c, norm + w)
            });
            if norm > 0.0 {
                sum / norm
            } else {
                0.0
            }
        }
        _ => 0.0,
    };

    let fragile_frac = fragile as f64 / total as f64;
    let unanswered_frac = (total - answered.len()) as f64 / total as f64;
    let score = weights.fragile * fragile_frac
        + weights.unanswered * unanswered_frac
        + weights.confidence * (1.0 - weighted_confidence);

    WeakSpot {
        group: Group::Topic(0),
        name: String::new(),
        topic: String::new(),
        score: round4(score),
        total,
        answered: answered.len(),
        fragile,
        weighted_confidence: round4(weighted_confidence),
        weakest_level: None,
    }
}

fn recency_weight(state: &ReviewState, reference: DateTime<Utc>, weights: &WeakSpotWeights) -> f64 {
    let age_days = (reference - state.last_answered).num_seconds().max(0) as f64 / 86_400.0;
    let decay = 0.5_f64.powf(age_days / weights.half_life_days);
    if state.last_confidence <= crate::scheduler::LOW_CONFIDENCE_CUTOFF {
        decay * weights.low_confidence_boost
    } else {
        decay
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Concept, ContentType, Difficulty, Topic};
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeSet;

    fn graph() -> ConceptGraph {
        let concept = |id: i64, name: &str| Concept {
            id,
            topic_id: 1,
            name: name.to_string(),
            tags: BTreeSet::new(),
            estimated_minutes: None,
            related: vec![],
            resources: vec![],
        };
        let mut questions = Vec::new();
        for concept_id in [1, 2] {
            for level in 1..=5 {
                let id = concept_id * 10 + level as i64;
                questions.push(Question {
                    id,
                    topic_id: 1,
                    concept_id: Some(concept_id),
                    level,
                    title: format!("q{}", id),
                    difficulty: Difficulty::for_level(level),
                    content_type: ContentType::Text,
                    prompt: "p".to_string(),
                    answer: "a".to_string(),
                    parent_id: None,
                });
            }
        }
        ConceptGraph {
            topics: vec![Topic {
                id: 1,
                name: "Rust".to_string(),
                description: None,
            }],
            concepts: vec![concept(1, "Lifetimes"), concept(2, "Traits")],
            questions,
        }
    }

    fn answered(day: u32, ease: f64, confidence: u8) -> ReviewState {
        ReviewState {
            last_answered: Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap(),
            review_count: 1,
            streak: 1,
            interval_days: 1,
            ease,
            last_confidence: confidence,
            next_review: NaiveDate::from_ymd_opt(2024, 6, day + 1).unwrap(),
        }
    }

    fn spot<'a>(spots: &'a [WeakSpot], group: Group) -> &'a WeakSpot {
        spots.iter().find(|s| s.group == group).unwrap()
    }

    mod ranking_tests {
        use super::*;

        #[test]
        fn unanswered_concept_outranks_mastered_one() {
            let graph = graph();
            let states: HashMap<i64, ReviewState> =
                (21..=25).map(|id| (id, answered(10, 2.5, 5))).collect();

            let spots = rank_weak_spots(&graph, &states);
            let lifetimes = spot(&spots, Group::Concept(1));
            let traits = spot(&spots, Group::Concept(2));

            assert!(lifetimes.score >= traits.score);
            assert_eq!(lifetimes.score, 0.6);
            assert_eq!(traits.score, 0.0);
            assert_eq!(lifetimes.answered, 0);
            assert_eq!(traits.answered, 5);
        }

        #[test]
        fn topics_and_concepts_are_both_ranked() {
            let spots = rank_weak_spots(&graph(), &HashMap::new());
            assert_eq!(spots.len(), 3);
            assert!(spots.iter().all(|s| s.score == 0.6));
            // equal scores: the topic has the most questions
            assert_eq!(spots[0].group, Group::Topic(1));
            assert_eq!(spots[1].name, "Lifetimes");
            assert_eq!(spots[2].name, "Traits");
        }

        #[test]
        fn fragile_answers_raise_the_score() {
            let graph = graph();
            let mut states: HashMap<i64, ReviewState> =
                (11..=15).map(|id| (id, answered(10, 2.5, 4))).collect();
            states.extend((21..=25).map(|id| (id, answered(10, 1.5, 4))));

            let spots = rank_weak_spots(&graph, &states);
            assert_eq!(spots[0].group, Group::Concept(2));
            assert_eq!(spots[0].fragile, 5);
        }

        #[test]
        fn groups_without_questions_are_skipped() {
            let mut graph = graph();
            graph.questions.retain(|q| q.concept_id == Some(1));
            let spots = rank_weak_spots(&graph, &HashMap::new());
            assert!(spots.iter().all(|s| s.group != Group::Concept(2)));
        }

        #[test]
        fn custom_weights_apply() {
            let weights = WeakSpotWeights {
                unanswered: 1.0,
                confidence: 0.0,
                ..WeakSpotWeights::default()
            };
            let spots = rank_weak_spots_with(&graph(), &HashMap::new(), &weights);
            assert!(spots.iter().all(|s| s.score == 1.0));
        }
    }

    mod confidence_tests {
        use super::*;

        #[test]
        fn recent_low_confidence_dominates() {
            let graph = graph();
            let mut states = HashMap::new();
            // an old perfect answer and a fresh failure
            states.insert(11, answered(1, 2.5, 5));
            states.insert(12, answered(29, 2.5, 1));

            let spots = rank_weak_spots(&graph, &states);
            let lifetimes = spot(&spots, Group::Concept(1));
            assert!(lifetimes.weighted_confidence < 0.25);
        }

        #[test]
        fn equal_age_answers_average_evenly() {
            let graph = graph();
            let mut states = HashMap::new();
            states.insert(11, answered(10, 2.5, 5));
            states.insert(12, answered(10, 2.5, 3));

            let spots = rank_weak_spots(&graph, &states);
            assert_eq!(spot(&spots, Group::Concept(1)).weighted_confidence, 0.75);
        }
    }

    mod weakest_level_tests {
        use super::*;

        #[test]
        fn points_at_first_unanswered_level() {
            let graph = graph();
            let mut states = HashMap::new();
            states.insert(11, answered(10, 2.5, 5));
            states.insert(12, answered(10, 2.5, 4));

            let spots = rank_weak_spots(&graph, &states);
            assert_eq!(spot(&spots, Group::Concept(1)).weakest_level, Some(3));
            assert_eq!(spot(&spots, Group::Topic(1)).weakest_level, None);
        }

        #[test]
        fn shaky_level_counts_as_weak() {
            let graph = graph();
            let mut states: HashMap<i64, ReviewState> =
                (11..=15).map(|id| (id, answered(10, 2.5, 5))).collect();
            states.insert(14, answered(10, 2.5, 2));

            let spots = rank_weak_spots(&graph, &states);
            assert_eq!(spot(&spots, Group::Concept(1)).weakest_level, Some(4));
        }
    }
}
