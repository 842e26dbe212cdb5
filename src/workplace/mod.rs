//! The New Hire workplace back-end.
//!
//! ## Overview
//!
//! A simulated first week at a software company. A new hire signs in with
//! GitHub, receives a seeded TaskMaster repository and a sprint of tickets,
//! chats with scripted coworkers, records standups and retrospectives, and
//! earns XP and workplace scores along the way. Everything is persisted in
//! SQLite and pushed to the browser over a WebSocket.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (Router, CORS, /static, /ws)         │
//! │  (React) │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         ├─ auth.rs        JWT + CurrentUser      │
//!                       │         ├─ onboarding.rs  repo + sprint seeding  │
//!                       │         │     └─ github.rs  (GitHubApi trait)    │
//!                       │         ├─ gamification.rs XP, levels, scores    │
//!                       │         ├─ ai.rs          (AiProvider trait)     │
//!                       │         └─ storage.rs     upload directory       │
//!                       │                                                  │
//!                       │  db.rs  (WorkplaceDb, migrations, DbHandle)      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module   | Responsibility                                             |
//! |----------|------------------------------------------------------------|
//! | `models` | Shared types: `User`, `Ticket`, `Message`, `Activity`      |
//! | `ws`     | `WsMessage` events + `broadcast_message()` helper          |
//!
//! ## Typical Request Flow (ticket moved to Done)
//!
//! 1. `PATCH /api/tickets/{id}/status` → `api::update_ticket_status()`
//! 2. `CurrentUser` resolves the caller from the bearer token.
//! 3. `gamification::move_ticket()` runs inside one `DbHandle::call`: it
//!    checks ownership and the previous status, updates the ticket, and on
//!    entry into DONE records `TICKET_COMPLETED` and awards
//!    `story_points × 20` XP.
//! 4. `stats_update` (and `level_up` on a boundary) go out over `ws`.

pub mod ai;
pub mod api;
pub mod auth;
pub mod db;
pub mod gamification;
pub mod github;
pub mod models;
pub mod onboarding;
pub mod server;
pub mod storage;
pub mod ws;
