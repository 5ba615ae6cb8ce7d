//! Known bot signatures
//!
//! Registry order is observable: the classifier tests entries front to back
//! and the first contained substring wins, so "ChatGPT-User" must precede
//! "ChatGPT" and so on.

use serde::Serialize;
use std::borrow::Cow;

use crate::config::{RegistryChoice, TrackingConfig};

/// How the dashboard renders a bot next to its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Glyph {
    Text(Cow<'static, str>),
    Image(Cow<'static, str>),
}

impl Glyph {
    const fn text(value: &'static str) -> Self {
        Glyph::Text(Cow::Borrowed(value))
    }

    const fn image(url: &'static str) -> Self {
        Glyph::Image(Cow::Borrowed(url))
    }
}

/// Glyph shown for names that have no entry of their own
pub static DEFAULT_GLYPH: Glyph = Glyph::text("🌐");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotSignature {
    /// Substring searched for in the User-Agent; also the logged bot name
    pub name: Cow<'static, str>,
    pub glyph: Glyph,
}

impl BotSignature {
    const fn of(name: &'static str, glyph: Glyph) -> Self {
        Self {
            name: Cow::Borrowed(name),
            glyph,
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            glyph: DEFAULT_GLYPH.clone(),
        }
    }
}

/// Signatures the tracking middleware logs by default
const CORE: [&str; 6] = ["Googlebot", "GPTBot", "ChatGPT", "AhrefsBot", "Bingbot", "Yandex"];

/// Display set: search engines, AI crawlers, social previews and scripting clients
static EXTENDED: &[BotSignature] = &[
    // Search engines
    BotSignature::of("Googlebot", Glyph::image("https://placehold.co/20x20/4285F4/FFFFFF?text=G")),
    BotSignature::of("Bingbot", Glyph::image("https://placehold.co/20x20/0078D7/FFFFFF?text=B")),
    BotSignature::of("Slurp", Glyph::text("Y!")),
    BotSignature::of("DuckDuckBot", Glyph::text("🦆")),
    BotSignature::of("Baiduspider", Glyph::text("百度")),
    BotSignature::of("YandexBot", Glyph::text("Я")),
    BotSignature::of("Sogou", Glyph::text("搜狗")),
    BotSignature::of("Exabot", Glyph::text("E")),
    BotSignature::of("AhrefsBot", Glyph::text("A")),
    BotSignature::of("SemrushBot", Glyph::text("S")),
    BotSignature::of("MJ12bot", Glyph::text("M")),
    BotSignature::of("DotBot", Glyph::text("•")),
    BotSignature::of("rogerbot", Glyph::text("🦊")),
    BotSignature::of("PetalBot", Glyph::text("🌸")),
    // AI crawlers
    BotSignature::of("ChatGPT-User", Glyph::image("https://placehold.co/20x20/10A37F/FFFFFF?text=AI")),
    BotSignature::of("ChatGPT", Glyph::image("https://placehold.co/20x20/10A37F/FFFFFF?text=AI")),
    BotSignature::of("OpenAI", Glyph::image("https://placehold.co/20x20/46B994/FFFFFF?text=OAI")),
    BotSignature::of("GPTBot", Glyph::image("https://placehold.co/20x20/000000/FFFFFF?text=GPT")),
    BotSignature::of("Anthropic", Glyph::text("📜")),
    BotSignature::of("ClaudeBot", Glyph::text("📖")),
    BotSignature::of("PerplexityBot", Glyph::text("❓")),
    BotSignature::of("Bytespider", Glyph::text("🎵")),
    BotSignature::of("Amazonbot", Glyph::text("📦")),
    BotSignature::of("NeevaBot", Glyph::text("✨")),
    BotSignature::of("CohereBot", Glyph::text("🤝")),
    BotSignature::of("YouBot", Glyph::text("💡")),
    BotSignature::of("ai-crawler", Glyph::text("🤖")),
    BotSignature::of("AIDataBot", Glyph::text("💾")),
    BotSignature::of("QuoraBot", Glyph::text("❓")),
    BotSignature::of("PresearchBot", Glyph::text("🔑")),
    // Social previews
    BotSignature::of("facebookexternalhit", Glyph::image("https://placehold.co/20x20/1877F2/FFFFFF?text=f")),
    BotSignature::of("Facebot", Glyph::text("👥")),
    BotSignature::of("Twitterbot", Glyph::image("https://placehold.co/20x20/1DA1F2/FFFFFF?text=X")),
    BotSignature::of("LinkedInBot", Glyph::image("https://placehold.co/20x20/0A66C2/FFFFFF?text=in")),
    BotSignature::of("Pinterestbot", Glyph::image("https://placehold.co/20x20/E60023/FFFFFF?text=P")),
    BotSignature::of("Redditbot", Glyph::image("https://placehold.co/20x20/FF4500/FFFFFF?text=r")),
    BotSignature::of("WhatsApp", Glyph::text("WA")),
    BotSignature::of("TelegramBot", Glyph::text("✈️")),
    BotSignature::of("Discordbot", Glyph::text("🎮")),
    BotSignature::of("Viber", Glyph::text("V")),
    BotSignature::of("SkypeUriPreview", Glyph::text("S")),
    // Headless browsers and scripting clients
    BotSignature::of("HeadlessChrome", Glyph::text("👻")),
    BotSignature::of("PhantomJS", Glyph::text("🎭")),
    BotSignature::of("curl", Glyph::text("〰️")),
    BotSignature::of("Wget", Glyph::text("⬇️")),
    BotSignature::of("Python-urllib", Glyph::text("🐍")),
    BotSignature::of("Go-http-client", Glyph::text("🐹")),
    BotSignature::of("Java", Glyph::text("☕")),
    BotSignature::of("Ruby", Glyph::text("💎")),
    BotSignature::of("PostmanRuntime", Glyph::text("📬")),
    BotSignature::of("axios", Glyph::text("📡")),
];

/// Ordered, in-memory table of bot signatures
#[derive(Debug, Clone)]
pub struct Registry {
    signatures: Vec<BotSignature>,
}

impl Registry {
    /// Build a registry from signatures in match priority order.
    /// Empty names and duplicates of an earlier entry are dropped.
    pub fn new(signatures: impl IntoIterator<Item = BotSignature>) -> Self {
        let mut registry = Self {
            signatures: Vec::new(),
        };
        for signature in signatures {
            registry.push(signature);
        }
        registry
    }

    /// The short list the tracking middleware matches against
    pub fn core() -> Self {
        Self::new(CORE.iter().map(|name| BotSignature {
            name: Cow::Borrowed(*name),
            glyph: display_glyph(name).clone(),
        }))
    }

    /// The full display list
    pub fn extended() -> Self {
        Self::new(EXTENDED.iter().cloned())
    }

    /// Append custom signatures after the built-in ones
    pub fn with_extra<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push(BotSignature::custom(name));
        }
        self
    }

    fn push(&mut self, signature: BotSignature) {
        if signature.name.is_empty() || self.lookup(&signature.name).is_some() {
            return;
        }
        self.signatures.push(signature);
    }

    /// Exact lookup of a registry key
    pub fn lookup(&self, name: &str) -> Option<&BotSignature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    /// First signature, in registry order, contained in `user_agent`.
    /// Case-sensitive, no trimming.
    pub fn find_in(&self, user_agent: &str) -> Option<&BotSignature> {
        self.signatures
            .iter()
            .find(|s| user_agent.contains(s.name.as_ref()))
    }

    pub fn signatures(&self) -> &[BotSignature] {
        &self.signatures
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::core()
    }
}

/// Registry selected by the tracking configuration, extras appended
pub fn from_config(config: &TrackingConfig) -> Registry {
    let base = match config.registry {
        RegistryChoice::Core => Registry::core(),
        RegistryChoice::Extended => Registry::extended(),
    };
    base.with_extra(config.extra_signatures.iter().cloned())
}

/// Glyph for any bot name, falling back to [`DEFAULT_GLYPH`]
pub fn display_glyph(name: &str) -> &'static Glyph {
    EXTENDED
        .iter()
        .find(|s| s.name == name)
        .map(|s| &s.glyph)
        .unwrap_or(&DEFAULT_GLYPH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_order() {
        let names: Vec<_> = Registry::core()
            .signatures()
            .iter()
            .map(|s| s.name.to_string())
            .collect();
        assert_eq!(
            names,
            vec!["Googlebot", "GPTBot", "ChatGPT", "AhrefsBot", "Bingbot", "Yandex"]
        );
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = Registry::core();
        assert_eq!(registry.lookup("GPTBot").unwrap().name, "GPTBot");
        assert!(registry.lookup("gptbot").is_none());
        assert!(registry.lookup("GPT").is_none());
    }

    #[test]
    fn test_glyphs() {
        assert_eq!(display_glyph("DuckDuckBot"), &Glyph::text("🦆"));
        assert_eq!(display_glyph("NoSuchBot"), &DEFAULT_GLYPH);
        // "Yandex" is only in the core list
        assert_eq!(Registry::core().lookup("Yandex").unwrap().glyph, DEFAULT_GLYPH);
    }

    #[test]
    fn test_with_extra_appends_and_skips_duplicates() {
        let registry = Registry::core().with_extra(["MyCrawler", "Googlebot", ""]);
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.signatures().last().unwrap().name, "MyCrawler");
    }

    #[test]
    fn test_extended_prefers_specific_chatgpt_entry() {
        let registry = Registry::extended();
        let found = registry.find_in("Mozilla/5.0 ChatGPT-User/1.0").unwrap();
        assert_eq!(found.name, "ChatGPT-User");
    }

    #[test]
    fn test_glyph_serialization() {
        let json = serde_json::to_value(Glyph::text("A")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "value": "A"}));
    }

    #[test]
    fn test_from_config() {
        let config = TrackingConfig {
            registry: RegistryChoice::Extended,
            extra_signatures: vec!["MyCrawler".to_string()],
            ..TrackingConfig::default()
        };
        let registry = from_config(&config);
        assert_eq!(registry.len(), Registry::extended().len() + 1);
        assert!(registry.lookup("MyCrawler").is_some());

        assert_eq!(from_config(&TrackingConfig::default()).len(), 6);
    }
}
