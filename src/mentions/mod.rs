//! Scheduled checks of whether a language model recommends configured brands

pub mod checker;
pub mod scheduler;
pub mod views;

pub use checker::{build_prompt, parse_verdict, MentionChecker, MentionError, Verdict};
pub use scheduler::spawn_mention_scheduler;
pub use views::MentionStats;
