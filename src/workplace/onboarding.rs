//! Day-one onboarding: the TaskMaster simulation repository, the seeded
//! sprint and the static checklist.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rust_embed::RustEmbed;

use super::db::DbHandle;
use super::github::{CreateRepoOutcome, CreateRepoRequest, GitHubApi};
use super::models::{
    Activity, ActivityType, ChecklistItem, NewTicket, Ticket, TicketPriority, TicketStatus,
    TicketType, User,
};
use crate::errors::WorkplaceError;

pub const DEFAULT_REPO_NAME: &str = "the-new-hire-simulation";
pub const REPO_DESCRIPTION: &str = "TaskMaster Todo App - Simulation Repository for The New Hire";

#[derive(RustEmbed)]
#[folder = "templates/taskmaster/"]
struct TaskmasterTemplate;

/// One file pushed into the simulation repository.
pub struct TemplateFile {
    /// Name inside the embedded template folder.
    pub source: &'static str,
    /// Path in the target repository.
    pub path: &'static str,
    pub message: &'static str,
}

/// Files pushed after the repository is created, in push order.
pub const TEMPLATE_FILES: &[TemplateFile] = &[
    TemplateFile {
        source: "index.html",
        path: "index.html",
        message: "Add main HTML file",
    },
    TemplateFile {
        source: "styles.css",
        path: "styles.css",
        message: "Add CSS styles",
    },
    TemplateFile {
        source: "app.js",
        path: "app.js",
        message: "Add main application logic",
    },
    TemplateFile {
        source: "utils.js",
        path: "utils.js",
        message: "Add utility functions",
    },
    TemplateFile {
        source: "api.js",
        path: "api.js",
        message: "Add API helper functions",
    },
    TemplateFile {
        source: "README.md",
        path: "README.md",
        message: "Update README",
    },
    TemplateFile {
        source: "ci.yml",
        path: ".github/workflows/ci.yml",
        message: "Add CI/CD workflow",
    },
];

pub fn template_content(source: &str) -> anyhow::Result<String> {
    let file = TaskmasterTemplate::get(source)
        .ok_or_else(|| anyhow::anyhow!("Template file '{}' is not embedded", source))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

pub fn checklist() -> Vec<ChecklistItem> {
    [
        ("Clone the repository", 50),
        ("Open the project in your editor", 25),
        ("Open index.html in browser", 25),
        ("Find and fix your first bug", 100),
        ("Commit your fix", 50),
        ("Complete your first Standup", 50),
        ("Submit a Pull Request", 100),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (task, xp))| ChecklistItem {
        id: i as i64 + 1,
        task: task.to_string(),
        completed: false,
        xp,
    })
    .collect()
}

struct SprintTicket {
    title: &'static str,
    description: &'static str,
    ticket_type: TicketType,
    priority: TicketPriority,
    story_points: i64,
    status: TicketStatus,
    due_in_days: i64,
}

const SPRINT: &[SprintTicket] = &[
    SprintTicket {
        title: "Fix Login Error Handling",
        description: "The login form crashes with a 500 error when username is empty. Add proper validation and error display in app.js handleLogin function.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::Critical,
        story_points: 3,
        status: TicketStatus::Todo,
        due_in_days: 1,
    },
    SprintTicket {
        title: "Implement Dark Mode",
        description: "Add dark mode toggle and styles. The CSS file has placeholder comments for dark mode that need to be implemented.",
        ticket_type: TicketType::Story,
        priority: TicketPriority::Medium,
        story_points: 5,
        status: TicketStatus::Backlog,
        due_in_days: 5,
    },
    SprintTicket {
        title: "Add Task Form Validation",
        description: "The add task form accepts empty tasks. Add validation to prevent empty task submission in handleAddTask function.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::High,
        story_points: 2,
        status: TicketStatus::Todo,
        due_in_days: 2,
    },
    SprintTicket {
        title: "Fix Form Not Clearing After Submit",
        description: "After adding a task, the form inputs don't reset. Uncomment and fix the form clearing code in handleAddTask.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::Medium,
        story_points: 1,
        status: TicketStatus::Todo,
        due_in_days: 2,
    },
    SprintTicket {
        title: "Fix Delete Task Logic",
        description: "Delete task uses wrong comparison operator. Change from != to !== for strict equality in deleteTask function.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::High,
        story_points: 1,
        status: TicketStatus::Todo,
        due_in_days: 3,
    },
    SprintTicket {
        title: "Implement Logout Functionality",
        description: "Logout button is broken - handler logs to console but doesn't actually log out. Implement handleLogout function properly.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::High,
        story_points: 2,
        status: TicketStatus::Todo,
        due_in_days: 3,
    },
    SprintTicket {
        title: "Fix Task Filter Not Working",
        description: "Filter buttons update visual state but don't re-render the task list. Add renderTasks() call in handleFilter function.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::Medium,
        story_points: 2,
        status: TicketStatus::Backlog,
        due_in_days: 4,
    },
    SprintTicket {
        title: "Fix Task Count Grammar",
        description: "Task count shows '1 tasks' instead of '1 task'. Fix pluralization in updateTaskCount function.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::Low,
        story_points: 1,
        status: TicketStatus::Backlog,
        due_in_days: 4,
    },
    SprintTicket {
        title: "Style Delete Button",
        description: "Delete button has no styles - looks ugly. Add proper styles for .delete-btn in styles.css.",
        ticket_type: TicketType::Task,
        priority: TicketPriority::Low,
        story_points: 1,
        status: TicketStatus::Backlog,
        due_in_days: 5,
    },
    SprintTicket {
        title: "Add Task Item Hover States",
        description: "Task items need hover states for better UX. Add :hover styles for .task-item in CSS.",
        ticket_type: TicketType::Task,
        priority: TicketPriority::Low,
        story_points: 1,
        status: TicketStatus::Backlog,
        due_in_days: 5,
    },
    SprintTicket {
        title: "Fix Clear Completed Logic",
        description: "Clear completed button has inverted logic - it removes active tasks and keeps completed ones. Fix the filter in clearCompletedTasks.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::High,
        story_points: 1,
        status: TicketStatus::Backlog,
        due_in_days: 6,
    },
    SprintTicket {
        title: "Fix LocalStorage Key Mismatch",
        description: "Tasks don't persist across refreshes because saveTasks and loadTasks use different localStorage keys. Make them consistent.",
        ticket_type: TicketType::Bug,
        priority: TicketPriority::Critical,
        story_points: 2,
        status: TicketStatus::Backlog,
        due_in_days: 7,
    },
];

/// The 7-day sprint assigned to a new hire, due dates counted from `now`.
pub fn sprint_tickets(assignee_id: i64, now: DateTime<Utc>) -> Vec<NewTicket> {
    SPRINT
        .iter()
        .map(|t| NewTicket {
            title: t.title.to_string(),
            description: t.description.to_string(),
            ticket_type: t.ticket_type,
            priority: t.priority,
            story_points: t.story_points,
            status: t.status,
            assignee_id,
            due_date: (now + Duration::days(t.due_in_days))
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        })
        .collect()
}

/// Result of a successful `generate_repository` call.
#[derive(Debug)]
pub enum RepoGeneration {
    Created {
        repo_url: String,
        tickets: Vec<Ticket>,
        activities: Vec<Activity>,
    },
    AlreadyExists {
        repo_url: String,
    },
}

/// Create the simulation repository under the user's account, push the
/// TaskMaster files and seed the sprint.
pub async fn generate_repository(
    github: &dyn GitHubApi,
    db: &DbHandle,
    user: &User,
    repo_name: &str,
) -> Result<RepoGeneration, WorkplaceError> {
    let (Some(token), Some(username)) = (user.access_token.as_deref(), user.username.as_deref())
    else {
        return Err(WorkplaceError::GitHubNotLinked);
    };

    let request = CreateRepoRequest {
        name: repo_name.to_string(),
        private: false,
        description: REPO_DESCRIPTION.to_string(),
        auto_init: true,
    };

    let repo = match github.create_repo(token, &request).await? {
        CreateRepoOutcome::Created(repo) => repo,
        CreateRepoOutcome::AlreadyExists => {
            tracing::info!(user_id = user.id, repo = repo_name, "repository already exists");
            return Ok(RepoGeneration::AlreadyExists {
                repo_url: format!("https://github.com/{}/{}", username, repo_name),
            });
        }
        CreateRepoOutcome::Failed { status, body } => {
            tracing::error!(status, body = %body, "GitHub repository creation failed");
            return Err(WorkplaceError::GitHub {
                status,
                message: "Failed to create repository".to_string(),
            });
        }
    };
    tracing::info!(user_id = user.id, repo = %repo.full_name, "created simulation repository");

    for file in TEMPLATE_FILES {
        let content = template_content(file.source)?;
        if let Err(e) = github
            .put_file(token, username, repo_name, file.path, &content, file.message)
            .await
        {
            tracing::warn!(error = %e, path = file.path, "failed to push template file");
        }
    }

    let user_id = user.id;
    let repo_url = repo.html_url.clone();
    let new_tickets = sprint_tickets(user_id, Utc::now());
    let (tickets, activities) = db
        .call(move |db| {
            let tickets = db.create_tickets(&new_tickets)?;
            let repo_activity = db.record_activity(
                user_id,
                ActivityType::RepoCreated,
                &format!("Created repository {}", repo.full_name),
                Some(&serde_json::json!({ "repo_url": repo.html_url })),
            )?;
            let ticket_ids: Vec<i64> = tickets.iter().map(|t| t.id).collect();
            let assigned = db.record_activity(
                user_id,
                ActivityType::TicketAssigned,
                &format!("Assigned {} sprint tickets", tickets.len()),
                Some(&serde_json::json!({ "ticket_ids": ticket_ids })),
            )?;
            Ok((tickets, vec![repo_activity, assigned]))
        })
        .await
        .map_err(WorkplaceError::Database)?;

    Ok(RepoGeneration::Created {
        repo_url,
        tickets,
        activities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workplace::db::WorkplaceDb;
    use crate::workplace::github::testing::FakeGitHub;
    use chrono::TimeZone;

    async fn seed_user(db: &DbHandle) -> User {
        db.call(|db| db.upsert_github_user("42", "octocat", None, "gho_token"))
            .await
            .unwrap()
    }

    #[test]
    fn test_every_template_file_is_embedded() {
        for file in TEMPLATE_FILES {
            let content = template_content(file.source).unwrap();
            assert!(!content.is_empty(), "{} is empty", file.source);
        }
        assert!(template_content("missing.txt").is_err());
    }

    #[test]
    fn test_template_push_order() {
        let paths: Vec<_> = TEMPLATE_FILES.iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            vec![
                "index.html",
                "styles.css",
                "app.js",
                "utils.js",
                "api.js",
                "README.md",
                ".github/workflows/ci.yml"
            ]
        );
    }

    #[test]
    fn test_checklist_items() {
        let items = checklist();
        assert_eq!(items.len(), 7);
        assert_eq!(items[0].task, "Clone the repository");
        assert_eq!(items[6].xp, 100);
        assert!(items.iter().all(|i| !i.completed));
        assert_eq!(items.iter().map(|i| i.xp).sum::<i64>(), 400);
    }

    #[test]
    fn test_sprint_has_twelve_tickets_within_a_week() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let tickets = sprint_tickets(5, now);
        assert_eq!(tickets.len(), 12);
        assert!(tickets.iter().all(|t| t.assignee_id == 5));
        assert_eq!(tickets[0].title, "Fix Login Error Handling");
        assert_eq!(tickets[0].due_date, "2024-03-05T09:00:00.000Z");
        assert_eq!(tickets[11].due_date, "2024-03-11T09:00:00.000Z");
        let todo = tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Todo)
            .count();
        assert_eq!(todo, 5);
    }

    #[tokio::test]
    async fn test_generate_repository_pushes_files_and_seeds_sprint() {
        let db = DbHandle::new(WorkplaceDb::new_in_memory().unwrap());
        let user = seed_user(&db).await;
        let github = FakeGitHub::default();

        let outcome = generate_repository(&github, &db, &user, DEFAULT_REPO_NAME)
            .await
            .unwrap();
        let RepoGeneration::Created {
            repo_url,
            tickets,
            activities,
        } = outcome
        else {
            panic!("expected a created repository");
        };
        assert_eq!(repo_url, "https://github.com/octocat/the-new-hire-simulation");
        assert_eq!(tickets.len(), 12);
        assert_eq!(activities[0].activity_type, ActivityType::RepoCreated);
        assert_eq!(activities[1].activity_type, ActivityType::TicketAssigned);

        let pushed = github.pushed_paths();
        assert_eq!(pushed.len(), TEMPLATE_FILES.len());
        assert_eq!(pushed.last().unwrap(), ".github/workflows/ci.yml");
    }

    #[tokio::test]
    async fn test_existing_repository_is_reported_without_seeding() {
        let db = DbHandle::new(WorkplaceDb::new_in_memory().unwrap());
        let user = seed_user(&db).await;
        let github = FakeGitHub::with_create_status(422);

        let outcome = generate_repository(&github, &db, &user, "sim").await.unwrap();
        assert!(matches!(
            outcome,
            RepoGeneration::AlreadyExists { ref repo_url } if repo_url == "https://github.com/octocat/sim"
        ));
        let user_id = user.id;
        let tickets = db
            .call(move |db| db.list_tickets_for_user(user_id))
            .await
            .unwrap();
        assert!(tickets.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_status() {
        let db = DbHandle::new(WorkplaceDb::new_in_memory().unwrap());
        let user = seed_user(&db).await;
        let github = FakeGitHub::with_create_status(403);

        let err = generate_repository(&github, &db, &user, "sim")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkplaceError::GitHub { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_user_without_token_is_rejected() {
        let db = DbHandle::new(WorkplaceDb::new_in_memory().unwrap());
        let mut user = seed_user(&db).await;
        user.access_token = None;
        let err = generate_repository(&FakeGitHub::default(), &db, &user, "sim")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkplaceError::GitHubNotLinked));
    }
}
