use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub github_id: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub access_token: Option<String>,
    pub xp: i64,
    pub level: i64,
    pub stats: UserStats,
}

/// The five workplace scores shown on the overview page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStats {
    pub truthfulness: i64,
    pub effort: i64,
    pub reliability: i64,
    pub collaboration: i64,
    pub quality: i64,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            truthfulness: 50,
            effort: 50,
            reliability: 50,
            collaboration: 50,
            quality: 50,
        }
    }
}

/// Profile subset returned with a freshly issued session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub level: i64,
    pub xp: i64,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            level: user.level,
            xp: user.xp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsView {
    pub level: i64,
    pub xp: i64,
    pub truthfulness: i64,
    pub effort: i64,
    pub reliability: i64,
    pub collaboration: i64,
    pub quality: i64,
}

impl From<&User> for StatsView {
    fn from(user: &User) -> Self {
        Self {
            level: user.level,
            xp: user.xp,
            truthfulness: user.stats.truthfulness,
            effort: user.stats.effort,
            reliability: user.stats.reliability,
            collaboration: user.stats.collaboration,
            quality: user.stats.quality,
        }
    }
}

// ── Tickets ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl FromStr for TicketPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(format!("Invalid ticket priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Backlog,
    Todo,
    InProgress,
    CodeReview,
    Done,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "BACKLOG",
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::CodeReview => "CODE_REVIEW",
            Self::Done => "DONE",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BACKLOG" => Ok(Self::Backlog),
            "TODO" => Ok(Self::Todo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "CODE_REVIEW" => Ok(Self::CodeReview),
            "DONE" => Ok(Self::Done),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Bug,
    Story,
    Task,
}

impl TicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Story => "story",
            Self::Task => "task",
        }
    }
}

impl FromStr for TicketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bug" => Ok(Self::Bug),
            "story" => Ok(Self::Story),
            "task" => Ok(Self::Task),
            _ => Err(format!("Invalid ticket type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub priority: TicketPriority,
    pub story_points: i64,
    pub status: TicketStatus,
    pub assignee_id: Option<i64>,
    pub created_at: String,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
}

/// Insert payload for a ticket; ids and timestamps are assigned by the database.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub ticket_type: TicketType,
    pub priority: TicketPriority,
    pub story_points: i64,
    pub status: TicketStatus,
    pub assignee_id: i64,
    pub due_date: String,
}

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Channel {
    #[serde(rename = "general")]
    General,
    #[serde(rename = "dev")]
    Dev,
    #[serde(rename = "code-review")]
    CodeReview,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Dev => "dev",
            Self::CodeReview => "code-review",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "dev" => Ok(Self::Dev),
            "code-review" => Ok(Self::CodeReview),
            _ => Err("Invalid channel".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub channel: String,
    pub content: String,
    pub sender_id: Option<i64>,
    pub is_bot: bool,
    pub timestamp: String,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
}

// ── Standups, retrospectives ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standup {
    pub id: i64,
    pub user_id: i64,
    pub audio_url: String,
    pub transcript: Option<String>,
    pub date: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retrospective {
    pub id: i64,
    pub user_id: i64,
    pub video_url: String,
    pub consent_given: bool,
    pub created_at: String,
}

// ── Activities ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    TicketAssigned,
    TicketCompleted,
    MessageSent,
    MessageReceived,
    RepoCreated,
    StandupCompleted,
    CodeReviewSubmitted,
    AchievementEarned,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketAssigned => "TICKET_ASSIGNED",
            Self::TicketCompleted => "TICKET_COMPLETED",
            Self::MessageSent => "MESSAGE_SENT",
            Self::MessageReceived => "MESSAGE_RECEIVED",
            Self::RepoCreated => "REPO_CREATED",
            Self::StandupCompleted => "STANDUP_COMPLETED",
            Self::CodeReviewSubmitted => "CODE_REVIEW_SUBMITTED",
            Self::AchievementEarned => "ACHIEVEMENT_EARNED",
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TICKET_ASSIGNED" => Ok(Self::TicketAssigned),
            "TICKET_COMPLETED" => Ok(Self::TicketCompleted),
            "MESSAGE_SENT" => Ok(Self::MessageSent),
            "MESSAGE_RECEIVED" => Ok(Self::MessageReceived),
            "REPO_CREATED" => Ok(Self::RepoCreated),
            "STANDUP_COMPLETED" => Ok(Self::StandupCompleted),
            "CODE_REVIEW_SUBMITTED" => Ok(Self::CodeReviewSubmitted),
            "ACHIEVEMENT_EARNED" => Ok(Self::AchievementEarned),
            _ => Err(format!("Invalid activity type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub user_id: i64,
    pub activity_type: ActivityType,
    pub description: String,
    /// Free-form JSON attached by the recorder (ticket ids, repo url, ...).
    pub extra_data: Option<serde_json::Value>,
    pub created_at: String,
}

// API view types

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistItem {
    pub id: i64,
    pub task: String,
    pub completed: bool,
    pub xp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoworkerUpdate {
    pub name: String,
    pub role: String,
    pub text: String,
    pub audio_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewComment {
    pub file: String,
    pub line: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReviewFeedback {
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
}
