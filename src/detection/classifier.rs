use serde::Serialize;
use std::sync::Arc;

use super::registry::Registry;

/// Outcome of matching a User-Agent against the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub matched: bool,
    pub bot_name: Option<String>,
}

impl Classification {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            bot_name: None,
        }
    }

    pub fn bot(name: impl Into<String>) -> Self {
        Self {
            matched: true,
            bot_name: Some(name.into()),
        }
    }
}

/// Decides whether a raw User-Agent identifies a known bot
///
/// Matching is a case-sensitive substring test with no trimming or word
/// boundaries, so "Java" also matches "JavaScriptCore" under the extended
/// registry.
#[derive(Debug, Clone)]
pub struct Classifier {
    registry: Arc<Registry>,
}

impl Classifier {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Classify a User-Agent; `None` (header absent) never matches
    pub fn classify(&self, user_agent: Option<&str>) -> Classification {
        let Some(user_agent) = user_agent.filter(|ua| !ua.is_empty()) else {
            return Classification::no_match();
        };

        match self.registry.find_in(user_agent) {
            Some(signature) => Classification::bot(signature.name.as_ref()),
            None => Classification::no_match(),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Arc::new(Registry::core()))
    }
}
