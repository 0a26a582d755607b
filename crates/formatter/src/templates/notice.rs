//! Short free-text notices: submission confirmations and follow-ups.

use herald_common::payload::{EventKind, EventPayload};

use super::{Draft, RenderContext, contact_row, customer, dashboard_row, footer, require};
use crate::error::FormatError;
use crate::message::{Section, SectionKind};

pub(super) fn confirmation(
    payload: &EventPayload,
    ctx: &RenderContext<'_>,
) -> Result<Draft, FormatError> {
    let message = require(payload.message.as_ref(), EventKind::Confirmation, "message")?;
    let m = ctx.markup;
    let title = payload
        .title
        .as_deref()
        .unwrap_or("We received your submission");

    let mut header = vec![
        m.heading("✅", &m.text(title)),
        String::new(),
        format!("Hello {}!", m.text(customer(payload))),
    ];
    if let Some(submission_id) = payload.submission_id.as_deref() {
        header.push(m.field("📋", "Submission ID", &m.code(submission_id)));
    }

    let mut sections = vec![
        Section::required(SectionKind::Header, header.join("\n")),
        Section::required(SectionKind::Message, m.text(message)),
        Section::optional(
            SectionKind::NextSteps,
            [
                m.heading("⏭️", "What happens next"),
                m.bullet("Our agents analyse your request"),
                m.bullet("You receive a tailored offer as soon as it is ready"),
            ]
            .join("\n"),
        ),
    ];
    sections.push(footer(ctx));

    Ok(Draft {
        subject: format!("{}: {}", ctx.branding.brand_name, title),
        sections,
        actions: vec![dashboard_row(ctx)],
    })
}

pub(super) fn follow_up(
    payload: &EventPayload,
    ctx: &RenderContext<'_>,
) -> Result<Draft, FormatError> {
    let message = require(payload.message.as_ref(), EventKind::FollowUp, "message")?;
    let m = ctx.markup;
    let default_title = format!("An update from {}", ctx.branding.brand_name);
    let title = payload.title.as_deref().unwrap_or(&default_title);

    let sections = vec![
        Section::required(
            SectionKind::Header,
            format!(
                "{}\n\nHello {}!",
                m.heading("💬", &m.text(title)),
                m.text(customer(payload))
            ),
        ),
        Section::required(SectionKind::Message, m.text(message)),
        footer(ctx),
    ];

    Ok(Draft {
        subject: title.to_string(),
        sections,
        actions: vec![contact_row(ctx)],
    })
}
