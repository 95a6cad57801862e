//! Confidence-driven spaced repetition, a simplified SM-2.
//!
//! Ease is carried in hundredths internally and every division rounds half up,
//! so a given `(prior, confidence, now)` always yields the same state.

use chrono::{DateTime, Days, NaiveDate, Utc};
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::SchedulingError;
use crate::models::ReviewState;

const DEFAULT_EASE_CENTI: u32 = 250;
const MIN_EASE_CENTI: u32 = 130;
const MAX_EASE_CENTI: u32 = 250;
const LAPSE_PENALTY_CENTI: u32 = 20;
const EASE_STEP_CENTI: u32 = 10;

pub const DEFAULT_EASE: f64 = DEFAULT_EASE_CENTI as f64 / 100.0;
pub const MIN_EASE: f64 = MIN_EASE_CENTI as f64 / 100.0;
pub const MAX_EASE: f64 = MAX_EASE_CENTI as f64 / 100.0;
pub const LAPSE_PENALTY: f64 = LAPSE_PENALTY_CENTI as f64 / 100.0;
pub const EASE_STEP: f64 = EASE_STEP_CENTI as f64 / 100.0;
/// Ratings at or below this reset the interval.
pub const LOW_CONFIDENCE_CUTOFF: u8 = 2;
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Self-reported recall confidence, 1 (forgot) to 5 (perfect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Confidence(u8);

impl Confidence {
    pub fn new(value: i64) -> Result<Self, SchedulingError> {
        if (1..=5).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SchedulingError::InvalidConfidence(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_low(self) -> bool {
        self.0 <= LOW_CONFIDENCE_CUTOFF
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Forgot",
            2 => "Shaky",
            3 => "Okay",
            4 => "Good",
            _ => "Perfect",
        }
    }
}

impl TryFrom<i64> for Confidence {
    type Error = SchedulingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Compute the state that follows an answer. Pure: the only clock is `now`.
pub fn schedule_review(
    prior: Option<&ReviewState>,
    confidence: Confidence,
    now: DateTime<Utc>,
) -> ReviewState {
    let (interval_days, ease, review_count, streak) = match prior {
        None => (
            1,
            DEFAULT_EASE_CENTI,
            1,
            u32::from(!confidence.is_low()),
        ),
        Some(prev) => {
            let prev_ease = to_centi(prev.ease);
            let prev_interval = prev.interval_days.max(1);
            let review_count = prev.review_count.saturating_add(1);

            if confidence.is_low() {
                let ease = prev_ease
                    .saturating_sub(LAPSE_PENALTY_CENTI)
                    .max(MIN_EASE_CENTI);
                (1, ease, review_count, 0)
            } else {
                let grown = div_half_up(u64::from(prev_interval) * u64::from(prev_ease), 100);
                let interval = u32::try_from(grown)
                    .unwrap_or(u32::MAX)
                    .min(MAX_INTERVAL_DAYS)
                    .max(prev_interval);
                let bonus = EASE_STEP_CENTI * u32::from(confidence.value() - 3);
                let ease = (prev_ease + bonus).min(MAX_EASE_CENTI);
                (interval, ease, review_count, prev.streak.saturating_add(1))
            }
        }
    };

    let next_review = now
        .date_naive()
        .checked_add_days(Days::new(u64::from(interval_days)))
        .unwrap_or(NaiveDate::MAX);

    debug!(
        "confidence {} -> interval {}d, ease {:.2}, next review {}",
        confidence.value(),
        interval_days,
        from_centi(ease),
        next_review
    );

    ReviewState {
        last_answered: now,
        review_count,
        streak,
        interval_days,
        ease: from_centi(ease),
        last_confidence: confidence.value(),
        next_review,
    }
}

/// Review queue order: oldest next-review date first, then the most fragile
/// (lowest ease) card.
pub fn queue_order(a: &ReviewState, b: &ReviewState) -> Ordering {
    a.next_review
        .cmp(&b.next_review)
        .then_with(|| a.ease.total_cmp(&b.ease))
}

/// Question ids due on `today`, in queue order.
pub fn due_queue<'a, I>(states: I, today: NaiveDate) -> Vec<i64>
where
    I: IntoIterator<Item = (i64, &'a ReviewState)>,
{
    let mut due: Vec<(i64, &ReviewState)> = states
        .into_iter()
        .filter(|(_, state)| state.is_due(today))
        .collect();
    due.sort_by(|(a_id, a), (b_id, b)| queue_order(a, b).then(a_id.cmp(b_id)));
    due.into_iter().map(|(id, _)| id).collect()
}

fn to_centi(ease: f64) -> u32 {
    let centi = (ease * 100.0).round();
    if centi.is_nan() {
        return DEFAULT_EASE_CENTI;
    }
    (centi.max(0.0) as u32).clamp(MIN_EASE_CENTI, MAX_EASE_CENTI)
}

fn from_centi(centi: u32) -> f64 {
    f64::from(centi) / 100.0
}

fn div_half_up(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 30, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn conf(v: i64) -> Confidence {
        Confidence::new(v).unwrap()
    }

    fn state(interval_days: u32, ease: f64) -> ReviewState {
        ReviewState {
            last_answered: at(1, 9),
            review_count: 3,
            streak: 2,
            interval_days,
            ease,
            last_confidence: 4,
            next_review: date(1),
        }
    }

    mod confidence_tests {
        use super::*;

        #[test]
        fn accepts_one_to_five() {
            for v in 1..=5 {
                assert_eq!(Confidence::new(v).unwrap().value() as i64, v);
            }
        }

        #[test]
        fn rejects_out_of_range() {
            assert_eq!(
                Confidence::new(0),
                Err(SchedulingError::InvalidConfidence(0))
            );
            assert_eq!(
                Confidence::try_from(6),
                Err(SchedulingError::InvalidConfidence(6))
            );
            assert!(Confidence::new(-3).is_err());
        }

        #[test]
        fn low_cutoff_is_two() {
            assert!(conf(1).is_low());
            assert!(conf(2).is_low());
            assert!(!conf(3).is_low());
        }

        #[test]
        fn labels() {
            assert_eq!(conf(1).label(), "Forgot");
            assert_eq!(conf(5).label(), "Perfect");
        }
    }

    mod first_review_tests {
        use super::*;

        #[test]
        fn starts_at_one_day_and_default_ease() {
            let s = schedule_review(None, conf(5), at(10, 23));
            assert_eq!(s.interval_days, 1);
            assert_eq!(s.ease, DEFAULT_EASE);
            assert_eq!(s.review_count, 1);
            assert_eq!(s.streak, 1);
            assert_eq!(s.next_review, date(11));
            assert_eq!(s.last_answered, at(10, 23));
        }

        #[test]
        fn low_confidence_first_review_has_no_streak() {
            let s = schedule_review(None, conf(1), at(10, 8));
            assert_eq!(s.interval_days, 1);
            assert_eq!(s.ease, DEFAULT_EASE);
            assert_eq!(s.streak, 0);
            assert_eq!(s.last_confidence, 1);
        }
    }

    mod lapse_tests {
        use super::*;

        #[test]
        fn resets_interval_regardless_of_prior() {
            for interval in [1, 2, 9, 60, 400] {
                let s = schedule_review(Some(&state(interval, 2.2)), conf(2), at(3, 9));
                assert_eq!(s.interval_days, 1);
                assert_eq!(s.next_review, date(4));
            }
        }

        #[test]
        fn penalises_ease_and_breaks_streak() {
            let s = schedule_review(Some(&state(6, 2.2)), conf(1), at(3, 9));
            assert!((s.ease - 2.0).abs() < 1e-9);
            assert_eq!(s.streak, 0);
            assert_eq!(s.review_count, 4);
        }

        #[test]
        fn ease_never_drops_below_floor() {
            let mut s = schedule_review(None, conf(1), at(1, 9));
            for _ in 0..20 {
                s = schedule_review(Some(&s), conf(1), at(1, 9));
                assert!(s.ease >= MIN_EASE);
            }
            assert_eq!(s.ease, MIN_EASE);
            assert_eq!(s.review_count, 21);
        }
    }

    mod success_tests {
        use super::*;

        #[test]
        fn interval_grows_by_ease() {
            let s = schedule_review(Some(&state(4, 2.5)), conf(3), at(5, 9));
            assert_eq!(s.interval_days, 10);
            assert_eq!(s.next_review, date(15));
            assert_eq!(s.streak, 3);
        }

        #[test]
        fn rounds_half_up() {
            // 5 * 2.3 = 11.5
            let s = schedule_review(Some(&state(5, 2.3)), conf(3), at(5, 9));
            assert_eq!(s.interval_days, 12);
            // 1 * 2.5 = 2.5
            let s = schedule_review(Some(&state(1, 2.5)), conf(3), at(5, 9));
            assert_eq!(s.interval_days, 3);
        }

        #[test]
        fn high_confidence_raises_ease_up_to_cap() {
            let s = schedule_review(Some(&state(2, 2.0)), conf(4), at(5, 9));
            assert!((s.ease - 2.1).abs() < 1e-9);
            let s = schedule_review(Some(&state(2, 2.0)), conf(5), at(5, 9));
            assert!((s.ease - 2.2).abs() < 1e-9);
            let s = schedule_review(Some(&state(2, 2.45)), conf(5), at(5, 9));
            assert_eq!(s.ease, MAX_EASE);
        }

        #[test]
        fn confidence_three_keeps_ease() {
            let s = schedule_review(Some(&state(2, 1.7)), conf(3), at(5, 9));
            assert!((s.ease - 1.7).abs() < 1e-9);
        }

        #[test]
        fn interval_is_never_shorter_on_success() {
            for interval in [1, 2, 3, 7, 30, 365, MAX_INTERVAL_DAYS] {
                for ease in [1.3, 1.55, 1.8, 2.1, 2.5] {
                    for c in 3..=5 {
                        let s = schedule_review(Some(&state(interval, ease)), conf(c), at(5, 9));
                        assert!(
                            s.interval_days >= interval,
                            "interval {} ease {} confidence {} gave {}",
                            interval,
                            ease,
                            c,
                            s.interval_days
                        );
                    }
                }
            }
        }

        #[test]
        fn interval_is_capped() {
            let s = schedule_review(Some(&state(30_000, 2.5)), conf(5), at(5, 9));
            assert_eq!(s.interval_days, MAX_INTERVAL_DAYS);
        }
    }

    mod determinism_tests {
        use super::*;

        #[test]
        fn identical_inputs_identical_output() {
            let prior = state(7, 1.9);
            let a = schedule_review(Some(&prior), conf(4), at(20, 17));
            let b = schedule_review(Some(&prior), conf(4), at(20, 17));
            assert_eq!(a, b);
            assert_eq!(a.ease.to_bits(), b.ease.to_bits());
        }

        #[test]
        fn next_review_uses_calendar_days() {
            let late = schedule_review(None, conf(4), at(10, 23));
            let early = schedule_review(None, conf(4), at(10, 0));
            assert_eq!(late.next_review, early.next_review);
            assert!(late.next_review >= late.last_answered.date_naive());
        }
    }

    mod scenario_tests {
        use super::*;
        use crate::import::parse;

        #[test]
        fn two_level_concept_answered_twice() {
            let text = "# Topic: Rust\n## Concept: Ownership\n### Level 1: Moves\nWhat is a move?\n**Answer**:\nTransfer of ownership.\n### Level 2: Borrows\nWhat is a borrow?\n**Answer**:\nA reference.\n";
            let outcome = parse(text).unwrap();
            let level_one = outcome
                .graph
                .questions
                .iter()
                .find(|q| q.level == 1)
                .unwrap();
            assert_eq!(outcome.graph.levels(level_one.concept_id.unwrap()).len(), 2);

            let first = schedule_review(None, conf(5), at(10, 9));
            assert_eq!(first.interval_days, 1);
            assert!(first.ease >= 2.5);
            assert_eq!(first.next_review, date(11));

            let second = schedule_review(Some(&first), conf(2), at(11, 9));
            assert_eq!(second.interval_days, 1);
            assert!((second.ease - (first.ease - 0.2)).abs() < 1e-9);
            assert_eq!(second.next_review, date(12));
            assert_eq!(second.review_count, 2);
        }
    }

    mod queue_tests {
        use super::*;

        fn due_on(day: u32, ease: f64) -> ReviewState {
            ReviewState {
                next_review: date(day),
                ..state(1, ease)
            }
        }

        #[test]
        fn oldest_first_then_lowest_ease() {
            let a = due_on(3, 2.5);
            let b = due_on(2, 2.5);
            let c = due_on(3, 1.4);
            let d = due_on(9, 1.3);
            let queue = due_queue([(1, &a), (2, &b), (3, &c), (4, &d)], date(5));
            assert_eq!(queue, vec![2, 3, 1]);
        }

        #[test]
        fn full_tie_falls_back_to_id() {
            let a = due_on(3, 2.0);
            let b = due_on(3, 2.0);
            assert_eq!(due_queue([(8, &a), (5, &b)], date(3)), vec![5, 8]);
        }

        #[test]
        fn nothing_due() {
            let a = due_on(9, 2.0);
            assert!(due_queue([(1, &a)], date(3)).is_empty());
        }
    }
}
