mod mention;
mod visit;

pub use mention::{MentionRecord, NewMention};
pub use visit::{BotCategory, NewUserVisit, NewVisit, UserVisit, VisitRecord};
