use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedMessage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl LocalizedMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Replaces `{name}` placeholders in title and body.
    pub fn render(&self, vars: &MessageVars) -> LocalizedMessage {
        LocalizedMessage {
            title: vars.interpolate(&self.title),
            body: vars.interpolate(&self.body),
        }
    }
}

/// Values computed during eligibility that a message body may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageVars(Vec<(&'static str, String)>);

impl MessageVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.0.push((name, value.to_string()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    fn interpolate(&self, template: &str) -> String {
        self.0.iter().fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
    }
}

/// Per-kind language table. Entry order matters for the last-resort fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTable {
    entries: Vec<(String, LocalizedMessage)>,
}

impl MessageTable {
    pub fn from_static(entries: &[(&str, &str, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(lang, title, body)| (lang.to_string(), LocalizedMessage::new(*title, *body)))
                .collect(),
        }
    }

    pub fn from_map(map: BTreeMap<String, LocalizedMessage>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }

    fn get(&self, language: &str) -> Option<&LocalizedMessage> {
        self.entries
            .iter()
            .find(|(lang, _)| lang == language)
            .map(|(_, message)| message)
    }

    /// Exact language, then English, then whatever comes first.
    pub fn resolve(&self, language: &str) -> LocalizedMessage {
        let language = language.trim().to_ascii_lowercase();
        self.get(&language)
            .or_else(|| self.get(FALLBACK_LANGUAGE))
            .or_else(|| self.entries.first().map(|(_, message)| message))
            .cloned()
            .unwrap_or_default()
    }

    pub fn resolve_with(&self, language: &str, vars: &MessageVars) -> LocalizedMessage {
        self.resolve(language).render(vars)
    }
}

pub fn missions_reminder_messages() -> MessageTable {
    MessageTable::from_static(&[
        (
            "es",
            "⏳ ¡Última llamada!",
            "Aún te esperan {pending} misiones diarias. Tenés {hours} horas para completarlas.",
        ),
        (
            "en",
            "⏳ Last call!",
            "You still have {pending} daily missions waiting. You have {hours} hours to complete them.",
        ),
        (
            "pt",
            "⏳ Última chamada!",
            "Ainda há {pending} missões diárias esperando por você. Restam {hours} horas para completá-las.",
        ),
    ])
}

pub fn free_packs_messages() -> MessageTable {
    MessageTable::from_static(&[
        (
            "es",
            "🎁 ¡Pack gratis disponible!",
            "Tenés un pack gratis esperándote. ¡Reclamalo ahora!",
        ),
        (
            "en",
            "🎁 Free pack available!",
            "You have a free pack waiting for you. Claim it now!",
        ),
        (
            "pt",
            "🎁 Pack grátis disponível!",
            "Você tem um pack grátis esperando. Resgate agora!",
        ),
    ])
}
