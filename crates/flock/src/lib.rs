//! Flock integration - webhook bot interface
//!
//! This crate provides the Flock side of scrapbook:
//! - **Events** (`events`) - `app.install` and `client.slashCommand` parsing and dispatch
//! - **Event tokens** (`token`) - verification of the signed token on every inbound request
//! - **API client** (`client`) - outbound `chat.sendMessage` calls
//! - **Messages** (`message`) - FlockML confirmation message rendering
//!
//! # Getting Started
//!
//! 1. Create an app at https://dev.flock.com/apps
//! 2. Point the event listener URL at `<endpoint>/events`
//! 3. Add a slash command and a sidebar widget with URL `<endpoint>/scraps`
//! 4. Set env vars: `SCRAPBOOK_FLOCK_APP_ID`, `SCRAPBOOK_FLOCK_APP_SECRET`
//!
//! # Architecture
//!
//! ```text
//! POST /events → EventTokenVerifier → EventDispatcher → Handlers → ScrapStore
//!                                                          ↓
//!                                 chat.sendMessage ← MessageRenderer
//! ```

pub mod client;
pub mod events;
pub mod message;
pub mod token;
