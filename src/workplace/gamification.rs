//! XP, levels and the five workplace scores.
//!
//! All functions here run against a borrowed `WorkplaceDb`, so callers wrap
//! them in a single `DbHandle::call` and get one consistent view of the user.

use anyhow::{Context, Result};

use super::db::WorkplaceDb;
use super::models::{Activity, ActivityType, Standup, Ticket, TicketStatus, User};

pub const XP_PER_LEVEL: i64 = 500;
pub const STANDUP_XP: i64 = 50;
pub const CODE_REVIEW_XP: i64 = 25;
pub const XP_PER_STORY_POINT: i64 = 20;

pub const TRUTHFULNESS_STEP: i64 = 5;
pub const TRUTHFULNESS_MAX_GAIN: i64 = 15;

pub fn level_for_xp(xp: i64) -> i64 {
    1 + xp.max(0) / XP_PER_LEVEL
}

#[derive(Debug, Clone)]
pub struct XpAward {
    pub user: User,
    pub leveled_up: bool,
    /// The `ACHIEVEMENT_EARNED` activity recorded on a level-up.
    pub achievement: Option<Activity>,
}

/// Add `amount` XP and recompute the level.
pub fn award_xp(db: &WorkplaceDb, user_id: i64, amount: i64) -> Result<XpAward> {
    let user = db
        .get_user(user_id)?
        .with_context(|| format!("User {} not found", user_id))?;
    let xp = user.xp + amount;
    let level = level_for_xp(xp);
    let user = db.update_progress(user_id, xp, level)?;

    let leveled_up = level > level_for_xp(xp - amount);
    let achievement = if leveled_up {
        tracing::info!(user_id, level, "level up");
        Some(db.record_activity(
            user_id,
            ActivityType::AchievementEarned,
            &format!("Reached level {}", level),
            Some(&serde_json::json!({ "level": level })),
        )?)
    } else {
        None
    };

    Ok(XpAward {
        user,
        leveled_up,
        achievement,
    })
}

fn keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(str::to_lowercase)
        .collect()
}

/// Whether a standup transcript talks about a ticket.
///
/// A ticket counts as referenced when its whole title appears, or when at
/// least two of its longer words do (one, for single-keyword titles).
pub fn mentions_ticket(transcript: &str, title: &str) -> bool {
    let transcript = transcript.to_lowercase();
    if transcript.contains(&title.to_lowercase()) {
        return true;
    }
    let spoken = keywords(&transcript);
    let title_words = keywords(title);
    if title_words.is_empty() {
        return false;
    }
    let hits = title_words.iter().filter(|w| spoken.contains(w)).count();
    hits >= title_words.len().min(2)
}

/// Truthfulness change for a standup against the caller's open ticket titles.
pub fn truthfulness_delta<S: AsRef<str>>(transcript: &str, open_titles: &[S]) -> i64 {
    let matched = open_titles
        .iter()
        .filter(|t| mentions_ticket(transcript, t.as_ref()))
        .count() as i64;
    if matched == 0 {
        -TRUTHFULNESS_STEP
    } else {
        (matched * TRUTHFULNESS_STEP).min(TRUTHFULNESS_MAX_GAIN)
    }
}

#[derive(Debug, Clone)]
pub struct TicketMove {
    pub ticket: Ticket,
    /// Set only when this call moved the ticket into DONE.
    pub completion: Option<(Activity, XpAward)>,
}

/// Move a ticket owned by `user_id` to `status`.
///
/// Returns `None` when the ticket does not exist or belongs to someone else.
/// Run it inside a single `DbHandle::call`: the DONE check and the award must
/// see the same row.
pub fn move_ticket(
    db: &WorkplaceDb,
    user_id: i64,
    ticket_id: i64,
    status: TicketStatus,
) -> Result<Option<TicketMove>> {
    let Some(existing) = db
        .get_ticket(ticket_id)?
        .filter(|t| t.assignee_id == Some(user_id))
    else {
        return Ok(None);
    };
    let completing = status == TicketStatus::Done && existing.status != TicketStatus::Done;

    let ticket = db.update_ticket_status(ticket_id, status)?;
    if !completing {
        return Ok(Some(TicketMove {
            ticket,
            completion: None,
        }));
    }

    let activity = db.record_activity(
        user_id,
        ActivityType::TicketCompleted,
        &format!("Completed \"{}\"", ticket.title),
        Some(&serde_json::json!({ "ticket_id": ticket.id })),
    )?;
    let award = award_xp(db, user_id, ticket.story_points * XP_PER_STORY_POINT)?;
    tracing::info!(user_id, ticket_id, xp = award.user.xp, "ticket completed");
    Ok(Some(TicketMove {
        ticket,
        completion: Some((activity, award)),
    }))
}

#[derive(Debug, Clone)]
pub struct StandupRecord {
    pub standup: Standup,
    pub award: XpAward,
    pub activity: Activity,
}

/// Store a completed standup and score it.
pub fn complete_standup(
    db: &WorkplaceDb,
    user_id: i64,
    audio_url: &str,
    transcript: &str,
) -> Result<StandupRecord> {
    let user = db
        .get_user(user_id)?
        .with_context(|| format!("User {} not found", user_id))?;
    let standup = db.create_standup(user_id, audio_url, Some(transcript))?;

    let open_titles: Vec<String> = db
        .list_tickets_for_user(user_id)?
        .into_iter()
        .filter(|t| t.status != TicketStatus::Done)
        .map(|t| t.title)
        .collect();
    let delta = truthfulness_delta(transcript, &open_titles);
    let mut stats = user.stats;
    stats.truthfulness = (stats.truthfulness + delta).clamp(0, 100);
    db.update_stats(user_id, &stats)?;
    tracing::debug!(user_id, delta, truthfulness = stats.truthfulness, "scored standup");

    let award = award_xp(db, user_id, STANDUP_XP)?;
    let activity = db.record_activity(
        user_id,
        ActivityType::StandupCompleted,
        "Completed daily standup",
        Some(&serde_json::json!({ "standup_id": standup.id, "truthfulness_delta": delta })),
    )?;

    Ok(StandupRecord {
        standup,
        award,
        activity,
    })
}
