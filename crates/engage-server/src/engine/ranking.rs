//! Question ordering and contribution scoring
//!
//! Pure functions over already-fetched rows. The repository returns unordered
//! data; everything order-related happens here so both backends rank
//! identically.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::models::{ContributionTally, LeaderboardEntry, QuestionView, RankAndPoints, Sort};

const POINTS_PER_ANSWERED: u64 = 10;

/// Sort questions in place for display.
///
/// Popular order keeps open questions ahead of answered ones, then most
/// votes first, then oldest first so equally-voted questions keep a stable
/// submission order. Newest is a plain reverse-chronological feed.
pub fn sort_questions(questions: &mut [QuestionView], sort: Sort) {
    match sort {
        Sort::Popular => questions.sort_by(compare_popular),
        Sort::Newest => {
            questions.sort_by(|a, b| b.question.created_at.cmp(&a.question.created_at))
        }
    }
}

fn compare_popular(a: &QuestionView, b: &QuestionView) -> Ordering {
    // Unanswered first; among answered, the most recently answered leads
    match (a.question.answered_at, b.question.answered_at) {
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(at_a), Some(at_b)) if at_a != at_b => return at_b.cmp(&at_a),
        _ => {}
    }
    b.votes
        .cmp(&a.votes)
        .then_with(|| a.question.created_at.cmp(&b.question.created_at))
}

pub fn points(tally: &ContributionTally) -> u64 {
    tally.answered_questions * POINTS_PER_ANSWERED + tally.received_votes
}

/// Top `limit` contributors with dense ranks: ties share a rank and the next
/// distinct score takes rank + 1, so a three-way tie for first is followed by
/// rank 2, not rank 4.
pub fn leaderboard(mut tallies: Vec<ContributionTally>, limit: usize) -> Vec<LeaderboardEntry> {
    tallies.sort_by(|a, b| points(b).cmp(&points(a)).then_with(|| a.name.cmp(&b.name)));

    let mut entries = Vec::with_capacity(limit.min(tallies.len()));
    let mut rank = 0u64;
    let mut previous_points = None;
    for tally in tallies {
        if entries.len() >= limit {
            break;
        }
        let score = points(&tally);
        if previous_points != Some(score) {
            rank += 1;
            previous_points = Some(score);
        }
        entries.push(LeaderboardEntry {
            name: tally.name,
            rank,
            points: score,
        });
    }
    entries
}

/// Rank and score for one user. Users with no scored contributions (or not
/// present at all) come back as rank 0 with 0 points.
pub fn rank_for(tallies: &[ContributionTally], user_uid: Uuid) -> RankAndPoints {
    let Some(target) = tallies.iter().find(|t| t.user_uid == user_uid) else {
        return RankAndPoints { rank: 0, points: 0 };
    };
    let score = points(target);
    if score == 0 {
        return RankAndPoints { rank: 0, points: 0 };
    }
    let mut distinct_above: Vec<u64> = tallies
        .iter()
        .map(points)
        .filter(|&p| p > score)
        .collect();
    distinct_above.sort_unstable();
    distinct_above.dedup();
    RankAndPoints {
        rank: distinct_above.len() as u64 + 1,
        points: score,
    }
}
