//! Channel markup dialects.
//!
//! Templates describe content once and ask the dialect for bold labels, code
//! spans and links. Caller-supplied text goes through [`Markup::text`] so it can
//! never open a span the template did not close.

use herald_common::types::ChannelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    /// Telegram legacy Markdown.
    Markdown,
    /// WhatsApp formatting: `*bold*`, ```` ```mono``` ````, bare urls.
    WhatsApp,
    /// Plain text for email bodies.
    Plain,
}

const RULE_WIDTH: usize = 40;

impl Markup {
    pub fn for_channel(channel: ChannelKind) -> Self {
        match channel {
            ChannelKind::Telegram => Markup::Markdown,
            ChannelKind::Whatsapp => Markup::WhatsApp,
            ChannelKind::Email => Markup::Plain,
        }
    }

    /// Escape caller-supplied text.
    pub fn text(&self, raw: &str) -> String {
        match self {
            Markup::Markdown => {
                let mut out = String::with_capacity(raw.len());
                for c in raw.chars() {
                    if matches!(c, '_' | '*' | '`' | '[') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out
            }
            // WhatsApp has no escape syntax; markers inside words are not
            // interpreted, so only a leading/trailing marker can misfire.
            Markup::WhatsApp => raw.trim_matches(|c| matches!(c, '*' | '_' | '~')).to_string(),
            Markup::Plain => raw.to_string(),
        }
    }

    /// Section heading with a leading icon.
    pub fn heading(&self, icon: &str, title: &str) -> String {
        match self {
            Markup::Markdown | Markup::WhatsApp => format!("{} *{}*", icon, title),
            Markup::Plain => title.to_uppercase(),
        }
    }

    /// `label: value` line. `value` must already be escaped.
    pub fn field(&self, icon: &str, label: &str, value: &str) -> String {
        match self {
            Markup::Markdown | Markup::WhatsApp => format!("{} *{}:* {}", icon, label, value),
            Markup::Plain => format!("- {}: {}", label, value),
        }
    }

    /// Monospace span for identifiers.
    pub fn code(&self, raw: &str) -> String {
        match self {
            Markup::Markdown => format!("`{}`", raw.replace('`', "'")),
            Markup::WhatsApp => format!("```{}```", raw.replace('`', "'")),
            Markup::Plain => raw.to_string(),
        }
    }

    pub fn bold(&self, raw: &str) -> String {
        match self {
            Markup::Markdown => format!("*{}*", self.text(raw)),
            Markup::WhatsApp => format!("*{}*", self.text(raw)),
            Markup::Plain => raw.to_string(),
        }
    }

    pub fn link(&self, label: &str, url: &str) -> String {
        match self {
            Markup::Markdown => format!("[{}]({})", label.replace(['[', ']'], ""), url),
            Markup::WhatsApp | Markup::Plain => format!("{}: {}", label, url),
        }
    }

    pub fn bullet(&self, item: &str) -> String {
        match self {
            Markup::Markdown | Markup::WhatsApp => format!("  • {}", item),
            Markup::Plain => format!("  - {}", item),
        }
    }

    pub fn rule(&self) -> String {
        match self {
            Markup::Markdown | Markup::WhatsApp => "━".repeat(RULE_WIDTH),
            Markup::Plain => "-".repeat(RULE_WIDTH),
        }
    }

    /// Byte offsets of spaces in `line` that sit outside any markup span.
    ///
    /// Splitting a line at one of these never separates an opening marker from
    /// its closing one.
    pub fn safe_breaks(&self, line: &str) -> Vec<usize> {
        let mut breaks = Vec::new();
        let mut bold = false;
        let mut code = false;
        let mut link = LinkState::Outside;
        let mut escaped = false;

        for (i, c) in line.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match (self, c) {
                (Markup::Plain, ' ') => breaks.push(i),
                (Markup::Plain, _) => {}
                (Markup::Markdown, '\\') if !code => escaped = true,
                (_, '`') => code = !code,
                (_, '*') if !code => bold = !bold,
                (Markup::Markdown, '[') if !code && link == LinkState::Outside => {
                    link = LinkState::Label
                }
                (Markup::Markdown, ']') if link == LinkState::Label => link = LinkState::Between,
                (Markup::Markdown, '(') if link == LinkState::Between => link = LinkState::Target,
                (Markup::Markdown, ')') if link == LinkState::Target => link = LinkState::Outside,
                (_, ' ') => {
                    if link == LinkState::Between {
                        link = LinkState::Outside;
                    }
                    if !bold && !code && link == LinkState::Outside {
                        breaks.push(i);
                    }
                }
                _ => {
                    if link == LinkState::Between {
                        link = LinkState::Outside;
                    }
                }
            }
        }
        breaks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Outside,
    Label,
    Between,
    Target,
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}
