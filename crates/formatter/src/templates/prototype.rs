use herald_common::payload::{EventKind, EventPayload};

use super::{Draft, RenderContext, customer, dashboard_row, footer, require};
use crate::error::FormatError;
use crate::message::{ActionLink, Section, SectionKind};

const KIND: EventKind = EventKind::PrototypeReady;

pub(super) fn build(payload: &EventPayload, ctx: &RenderContext<'_>) -> Result<Draft, FormatError> {
    let prototype = payload.prototype.as_ref().ok_or(FormatError::MissingField {
        kind: KIND,
        field: "prototype",
    })?;
    let prototype_id = require(Some(&prototype.prototype_id), KIND, "prototype.prototype_id")?;
    let url = require(Some(&prototype.results_url), KIND, "prototype.results_url")?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(FormatError::InvalidField {
            kind: KIND,
            field: "prototype.results_url",
            reason: "must be an http(s) url".to_string(),
        });
    }

    let m = ctx.markup;
    let name = customer(payload);

    let mut header = vec![
        m.heading("🎉", "Your Prototype Is Ready"),
        String::new(),
        format!("Hello {}!", m.text(name)),
        String::new(),
        m.field("🆔", "Prototype ID", &m.code(prototype_id)),
    ];
    if let Some(submission_id) = payload.submission_id.as_deref() {
        header.push(m.field("📋", "Submission ID", &m.code(submission_id)));
    }

    let mut sections = vec![
        Section::required(SectionKind::Header, header.join("\n")),
        Section::required(
            SectionKind::Details,
            format!("🔗 {}", m.link("View Prototype Results", url)),
        ),
    ];
    if let Some(message) = payload.message.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(Section::optional(SectionKind::Message, m.text(message)));
    }
    sections.push(footer(ctx));

    Ok(Draft {
        subject: format!("{}: your prototype {} is ready", ctx.branding.brand_name, prototype_id),
        sections,
        actions: vec![
            vec![ActionLink::new("🖥️ Open Prototype", url)],
            dashboard_row(ctx),
        ],
    })
}

#[cfg(test)]
mod tests {
    use herald_common::config::BrandingConfig;
    use herald_common::payload::PrototypeDetails;

    use super::*;
    use crate::markup::Markup;

    fn payload(url: &str) -> EventPayload {
        EventPayload {
            prototype: Some(PrototypeDetails {
                prototype_id: "proto-1".to_string(),
                results_url: url.to_string(),
            }),
            ..EventPayload::new(EventKind::PrototypeReady)
        }
    }

    #[test]
    fn test_requires_prototype() {
        let branding = BrandingConfig::default();
        let ctx = RenderContext {
            markup: Markup::Markdown,
            branding: &branding,
            buttons: true,
        };
        let result = build(&EventPayload::new(EventKind::PrototypeReady), &ctx);
        assert!(matches!(
            result,
            Err(FormatError::MissingField {
                field: "prototype",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let branding = BrandingConfig::default();
        let ctx = RenderContext {
            markup: Markup::Markdown,
            branding: &branding,
            buttons: true,
        };
        assert!(matches!(
            build(&payload("javascript:alert(1)"), &ctx),
            Err(FormatError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_link_and_action() {
        let branding = BrandingConfig::default();
        let ctx = RenderContext {
            markup: Markup::Markdown,
            branding: &branding,
            buttons: true,
        };
        let draft = build(&payload("https://proto.test/1"), &ctx).unwrap();
        assert_eq!(
            draft.sections[1].content,
            "🔗 [View Prototype Results](https://proto.test/1)"
        );
        assert_eq!(draft.actions[0][0].url, "https://proto.test/1");
        assert!(draft.subject.contains("proto-1"));
    }
}
