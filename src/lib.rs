//! Capture the story open in your browser and file it into a Notion database.
//!
//! The pieces: `browser` scrapes the active tab over the DevTools protocol,
//! `notion` talks to the Notion REST API, `submit` runs the find-or-update
//! state machine between them, and `settings`/`storage` keep credentials and
//! preferences in `~/.taskbridge/` with change subscription.

pub mod browser;
pub mod notion;
pub mod settings;
pub mod storage;
pub mod submit;
pub mod types;
pub mod util;
