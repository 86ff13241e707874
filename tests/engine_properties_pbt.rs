//! Property-based tests for the scheduling, difficulty and scoring rules.
//!
//! Invariants covered:
//! - Ease floor: ease never leaves [1.3, 5.0] under any grade sequence
//! - Interval monotonicity: passing grades never shrink the interval
//! - Reset law: Fail always yields repetitions 0 and a one day interval
//! - Level determinism: thresholds bracket the level for every XP total
//! - XP: incorrect attempts earn nothing, correct ones at least the base
//! - Streaks: a gap restarts at 1 and longest never trails current
//! - Difficulty: tiers move at most one step per attempt

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use learning_engine::services::badge::BadgeCatalog;
use learning_engine::services::difficulty::next_tier;
use learning_engine::services::review::{Quality, ReviewCard, ReviewScheduler, MAX_EASE, MIN_EASE};
use learning_engine::services::scoring::{
    update_streak, LevelCurve, ScoringConfig, ScoringEngine, XpTable,
};
use learning_engine::types::{AttemptRecord, DifficultyTier, LearnerProgressState};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

fn arb_quality() -> impl Strategy<Value = Quality> {
    prop_oneof![
        Just(Quality::Fail),
        Just(Quality::Hard),
        Just(Quality::Good),
        Just(Quality::Easy),
    ]
}

fn arb_passing_quality() -> impl Strategy<Value = Quality> {
    prop_oneof![Just(Quality::Hard), Just(Quality::Good), Just(Quality::Easy)]
}

fn arb_tier() -> impl Strategy<Value = DifficultyTier> {
    prop_oneof![
        Just(DifficultyTier::Easy),
        Just(DifficultyTier::Medium),
        Just(DifficultyTier::Hard),
    ]
}

fn arb_card() -> impl Strategy<Value = ReviewCard> {
    (1300u32..=5000u32, 0u32..20, 0u32..400, 0u32..5).prop_map(
        |(ease_milli, repetitions, interval_days, lapses)| ReviewCard {
            ease_factor: ease_milli as f64 / 1000.0,
            repetitions,
            interval_days,
            lapses,
            ..ReviewScheduler::default().new_card("u1", "q1", "t1", t0())
        },
    )
}

fn arb_attempt() -> impl Strategy<Value = AttemptRecord> {
    (any::<bool>(), 0u64..60_000, arb_tier(), 0i64..30).prop_map(
        |(correct, response_time_ms, difficulty_tier, day)| AttemptRecord {
            question_id: "q1".to_string(),
            topic_id: "t1".to_string(),
            correct,
            response_time_ms,
            difficulty_tier,
            timestamp: t0() + Duration::days(day),
        },
    )
}

fn arb_curve() -> impl Strategy<Value = LevelCurve> {
    prop_oneof![
        (1u64..1000).prop_map(|step| LevelCurve::Triangular { step }),
        prop::collection::vec(1u64..500, 1..12).prop_map(|steps| {
            let mut thresholds = vec![0u64];
            for step in steps {
                let last = *thresholds.last().unwrap();
                thresholds.push(last + step);
            }
            LevelCurve::Table { thresholds }
        }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// PBT-1: ease stays within bounds for any grade sequence
    #[test]
    fn ease_stays_in_bounds(
        card in arb_card(),
        grades in prop::collection::vec(arb_quality(), 1..40),
    ) {
        let scheduler = ReviewScheduler::default();
        let mut card = card;
        for (day, quality) in grades.into_iter().enumerate() {
            card = scheduler.grade(&card, quality, t0() + Duration::days(day as i64));
            prop_assert!(card.ease_factor >= MIN_EASE - 1e-12);
            prop_assert!(card.ease_factor <= MAX_EASE + 1e-12);
        }
    }

    /// PBT-2: passing grades never shrink the interval
    #[test]
    fn passing_grades_never_shrink_interval(
        card in arb_card(),
        grades in prop::collection::vec(arb_passing_quality(), 1..20),
    ) {
        let scheduler = ReviewScheduler::default();
        let mut card = card;
        for quality in grades {
            let before = card.interval_days;
            card = scheduler.grade(&card, quality, t0());
            prop_assert!(card.interval_days >= before);
            prop_assert_eq!(card.due_at, t0() + Duration::days(card.interval_days as i64));
        }
    }

    /// PBT-3: Fail resets repetitions and interval whatever the card
    #[test]
    fn fail_resets(card in arb_card()) {
        let scheduler = ReviewScheduler::default();
        let graded = scheduler.grade(&card, Quality::Fail, t0());
        prop_assert_eq!(graded.repetitions, 0);
        prop_assert_eq!(graded.interval_days, 1);
        let expected = (card.ease_factor - 0.2).max(MIN_EASE);
        prop_assert!((graded.ease_factor - expected).abs() < 1e-9);
        let expected_lapses = if card.repetitions > 0 { card.lapses + 1 } else { card.lapses };
        prop_assert_eq!(graded.lapses, expected_lapses);
    }

    /// PBT-4: the level is bracketed by its thresholds and deterministic
    #[test]
    fn level_is_bracketed(curve in arb_curve(), total_xp in 0u64..500_000) {
        prop_assert!(curve.validate().is_ok());
        let level = curve.level_for(total_xp);
        prop_assert!(level >= 1);
        prop_assert!(curve.threshold(level) <= total_xp);
        prop_assert!(total_xp < curve.threshold(level + 1));
        prop_assert_eq!(level, curve.level_for(total_xp));
    }

    /// PBT-5: levels never go down as XP grows
    #[test]
    fn level_is_monotonic(curve in arb_curve(), a in 0u64..1_000_000, b in 0u64..1_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(curve.level_for(lo) <= curve.level_for(hi));
    }

    /// PBT-6: incorrect attempts earn nothing; correct ones earn at least the base
    #[test]
    fn xp_is_never_negative(attempt in arb_attempt(), streak in 0u32..15) {
        let table = XpTable::default();
        let xp = table.for_attempt(&attempt, streak);
        if attempt.correct {
            prop_assert!(xp.total >= table.base_for(attempt.difficulty_tier));
            prop_assert_eq!(xp.total, xp.base + xp.speed + xp.streak);
        } else {
            prop_assert_eq!(xp.total, 0);
        }
    }

    /// PBT-7: a gap of two days or more restarts the streak at 1
    #[test]
    fn gap_restarts_streak(current in 1u32..400, gap in 2i64..1000) {
        let last = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut state = LearnerProgressState::new("u1");
        state.current_streak_days = current;
        state.longest_streak_days = current;
        state.last_activity_date = Some(last);

        update_streak(&mut state, last + Duration::days(gap));
        prop_assert_eq!(state.current_streak_days, 1);
        prop_assert_eq!(state.longest_streak_days, current);
    }

    /// PBT-8: longest never trails current over any sequence of active days
    #[test]
    fn longest_tracks_current(offsets in prop::collection::vec(-3i64..5, 1..60)) {
        let mut state = LearnerProgressState::new("u1");
        let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for offset in offsets {
            day += Duration::days(offset);
            update_streak(&mut state, day);
            prop_assert!(state.longest_streak_days >= state.current_streak_days);
            prop_assert!(state.current_streak_days >= 1);
        }
    }

    /// PBT-9: the difficulty tier moves at most one step per attempt
    #[test]
    fn difficulty_moves_one_step(
        start in arb_tier(),
        answers in prop::collection::vec(any::<bool>(), 1..50),
    ) {
        let mut tier = start;
        let mut streak = 0u32;
        for correct in answers {
            streak = if correct { streak + 1 } else { 0 };
            let next = next_tier(tier, correct, streak, 2);
            prop_assert!(tier.distance(next) <= 1);
            if correct {
                prop_assert!(next >= tier);
            } else {
                prop_assert_eq!(next, tier.easier());
            }
            tier = next;
        }
    }

    /// PBT-10: scoring keeps level in step with XP after badge rewards
    #[test]
    fn scoring_keeps_level_consistent(
        attempts in prop::collection::vec(arb_attempt(), 1..30),
        start_xp in 0u64..3000,
    ) {
        let engine = ScoringEngine::new(ScoringConfig::default(), Arc::new(BadgeCatalog::standard()));
        let mut state = LearnerProgressState::new("u1");
        state.total_xp = start_xp;
        state.level = engine.level_for(start_xp);
        let mut streak = 0u32;
        for attempt in attempts {
            streak = if attempt.correct { streak + 1 } else { 0 };
            let score = engine.apply_attempt(&state, &attempt, streak);
            prop_assert_eq!(score.state.total_xp, state.total_xp + score.xp_delta + score.badge_xp);
            prop_assert_eq!(score.state.level, engine.level_for(score.state.total_xp));
            prop_assert_eq!(score.leveled_up, score.level_after > score.level_before);
            prop_assert!(score.state.longest_streak_days >= score.state.current_streak_days);
            for badge in &score.newly_unlocked {
                prop_assert!(!state.has_badge(&badge.id));
            }
            state = score.state;
        }
    }
}

#[test]
fn triangular_curve_matches_published_thresholds() {
    let curve = LevelCurve::default();
    let thresholds: Vec<u64> = (1..=5).map(|level| curve.threshold(level)).collect();
    assert_eq!(thresholds, vec![0, 100, 300, 600, 1000]);
}
