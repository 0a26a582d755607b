//! Renders business-event payloads into channel-specific messages.
//!
//! [`Formatter::render`] is deterministic and side-effect free: the same
//! payload and channel always produce the same [`RenderedMessage`].

pub mod error;
pub mod markup;
pub mod message;
pub mod split;
mod templates;

use std::collections::BTreeMap;

use herald_common::config::BrandingConfig;
use herald_common::payload::EventPayload;
use herald_common::types::ChannelKind;

pub use error::FormatError;
pub use message::{ActionLink, Boundary, RenderedMessage, Section, SectionKind, Segment};

use crate::markup::Markup;
use crate::message::SECTION_SEPARATOR;
use crate::split::{split_sections, text_len};
use crate::templates::RenderContext;

/// Telegram `sendMessage` text limit.
pub const TELEGRAM_LIMIT: usize = 4096;
/// WhatsApp Cloud API text body limit.
pub const WHATSAPP_LIMIT: usize = 4096;
/// Email bodies are only split past this size.
pub const EMAIL_LIMIT: usize = 100_000;

/// Smallest accepted per-channel limit.
pub const MIN_LIMIT: usize = 64;

#[derive(Debug, Clone)]
pub struct Formatter {
    branding: BrandingConfig,
    limits: BTreeMap<ChannelKind, usize>,
}

impl Formatter {
    pub fn new(branding: BrandingConfig) -> Self {
        let limits = BTreeMap::from([
            (ChannelKind::Telegram, TELEGRAM_LIMIT),
            (ChannelKind::Email, EMAIL_LIMIT),
            (ChannelKind::Whatsapp, WHATSAPP_LIMIT),
        ]);
        Self { branding, limits }
    }

    /// Override the size limit of one channel.
    pub fn with_limit(mut self, channel: ChannelKind, limit: usize) -> Self {
        self.limits.insert(channel, limit);
        self
    }

    pub fn limit(&self, channel: ChannelKind) -> usize {
        self.limits.get(&channel).copied().unwrap_or(TELEGRAM_LIMIT)
    }

    /// Render `payload` for `channel`.
    ///
    /// Optional sections are dropped, last first, until the message fits in one
    /// segment. If it still does not fit, the complete rendering is split
    /// instead so nothing is lost.
    pub fn render(
        &self,
        payload: &EventPayload,
        channel: ChannelKind,
    ) -> Result<RenderedMessage, FormatError> {
        let limit = self.limit(channel);
        if limit < MIN_LIMIT {
            return Err(FormatError::LimitTooSmall { channel, limit });
        }

        let markup = Markup::for_channel(channel);
        let ctx = RenderContext {
            markup,
            branding: &self.branding,
            buttons: channel.supports_actions(),
        };
        let draft = templates::build(payload, &ctx)?;

        let contents: Vec<&str> = draft.sections.iter().map(|s| s.content.as_str()).collect();
        let full_len = joined_len(&contents);

        let (kept, omitted) = if full_len <= limit {
            (contents, Vec::new())
        } else {
            fit_by_omission(&draft.sections, limit)
                .unwrap_or_else(|| (contents, Vec::new()))
        };

        let owned: Vec<String> = kept.into_iter().map(str::to_string).collect();
        let segments = split_sections(&owned, limit, markup);

        if segments.len() > 1 {
            tracing::debug!(
                kind = %payload.kind,
                channel = %channel,
                segments = segments.len(),
                "Message split into segments"
            );
        }

        Ok(RenderedMessage {
            channel,
            subject: draft.subject,
            segments,
            actions: draft.actions,
            omitted,
        })
    }
}

fn joined_len(contents: &[&str]) -> usize {
    let separators = contents.len().saturating_sub(1) * text_len(SECTION_SEPARATOR);
    contents.iter().map(|c| text_len(c)).sum::<usize>() + separators
}

/// Drop optional sections in reverse reading order until the rest fits.
fn fit_by_omission(sections: &[Section], limit: usize) -> Option<(Vec<&str>, Vec<SectionKind>)> {
    let mut keep = vec![true; sections.len()];
    let mut omitted = Vec::new();

    for (i, section) in sections.iter().enumerate().rev() {
        if !section.optional {
            continue;
        }
        keep[i] = false;
        omitted.push(section.kind);

        let contents: Vec<&str> = sections
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(s, _)| s.content.as_str())
            .collect();
        if joined_len(&contents) <= limit {
            return Some((contents, omitted));
        }
    }
    None
}
