//! Expert ranking.
//!
//! [`rank_candidates`] is a pure function over a snapshot of eligible experts. It never reads or writes storage;
//! the snapshot query lives in the database layer and the result is only as fresh as that read.

use serde::{Deserialize, Serialize};

use crate::db_types::ExpertCandidate;

/// Hard cap on concurrent work. Experts at or above this many active orders (in progress or under revision) are
/// excluded from matching and refused new claims.
pub const MAX_ACTIVE_ORDERS: i64 = 5;

/// Number of candidates returned when the caller does not ask for a specific limit.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

/// A candidate together with its computed relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: ExpertCandidate,
    pub relevance_score: f64,
}

/// The weighted relevance of a candidate for an order in their subject.
///
/// `success_rate` is a percentage in `[0, 100]`; the workload term discounts busy experts linearly.
pub fn relevance_score(candidate: &ExpertCandidate) -> f64 {
    0.4 * candidate.avg_rating
        + 0.003 * candidate.success_rate
        + 0.2 * candidate.experience_years as f64
        + 0.1 * (1.0 - candidate.workload as f64 * 0.02)
}

/// Filters out overloaded experts, scores the rest and returns the top `limit` candidates.
///
/// Ordering is descending by relevance score with ties broken by ascending expert id, so a given snapshot always
/// ranks the same way.
pub fn rank_candidates(candidates: Vec<ExpertCandidate>, limit: usize) -> Vec<RankedCandidate> {
    let mut ranked = candidates
        .into_iter()
        .filter(|c| c.workload < MAX_ACTIVE_ORDERS)
        .map(|candidate| {
            let relevance_score = relevance_score(&candidate);
            RankedCandidate { candidate, relevance_score }
        })
        .collect::<Vec<RankedCandidate>>();
    ranked.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.candidate.expert_id.cmp(&b.candidate.expert_id))
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod test {
    use super::*;

    fn candidate(expert_id: i64, avg_rating: f64, success_rate: f64, experience_years: i64, workload: i64) -> ExpertCandidate {
        ExpertCandidate { expert_id, avg_rating, success_rate, experience_years, workload }
    }

    #[test]
    fn score_formula() {
        let c = candidate(1, 4.0, 50.0, 3, 2);
        let expected = 0.4 * 4.0 + 0.003 * 50.0 + 0.2 * 3.0 + 0.1 * (1.0 - 0.04);
        assert!((relevance_score(&c) - expected).abs() < 1e-12);
    }

    #[test]
    fn higher_rating_wins_over_lower_workload() {
        // Rating dominates the workload discount: A (4.8, one active order) outranks B (4.2, idle).
        let a = candidate(1, 4.8, 90.0, 2, 1);
        let b = candidate(2, 4.2, 90.0, 2, 0);
        let ranked = rank_candidates(vec![b, a], 5);
        assert_eq!(ranked[0].candidate.expert_id, 1);
        assert_eq!(ranked[1].candidate.expert_id, 2);
    }

    #[test]
    fn overloaded_experts_are_dropped() {
        let busy = candidate(1, 5.0, 100.0, 10, MAX_ACTIVE_ORDERS);
        let free = candidate(2, 1.0, 0.0, 0, 0);
        let ranked = rank_candidates(vec![busy, free], 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.expert_id, 2);
    }

    #[test]
    fn ties_break_on_expert_id() {
        let twin_a = candidate(12, 4.5, 80.0, 5, 2);
        let twin_b = candidate(3, 4.5, 80.0, 5, 2);
        let ranked = rank_candidates(vec![twin_a, twin_b], 5);
        assert_eq!(ranked[0].candidate.expert_id, 3);
        assert_eq!(ranked[1].candidate.expert_id, 12);
    }

    #[test]
    fn limit_truncates() {
        let pool = (1..=10).map(|id| candidate(id, 4.0, 50.0, 1, 0)).collect::<Vec<_>>();
        let ranked = rank_candidates(pool, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked.iter().map(|r| r.candidate.expert_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_snapshot() {
        assert!(rank_candidates(Vec::new(), 5).is_empty());
    }
}
