//! Per-event templates.
//!
//! Each template turns a payload into ordered [`Section`]s written in the
//! target channel's markup, plus the subject line and action rows.

mod business_offer;
mod notice;
mod prototype;

use herald_common::config::BrandingConfig;
use herald_common::payload::{EventKind, EventPayload};

use crate::error::FormatError;
use crate::markup::Markup;
use crate::message::{ActionLink, Section, SectionKind};

/// Everything a template needs besides the payload.
pub(crate) struct RenderContext<'a> {
    pub markup: Markup,
    pub branding: &'a BrandingConfig,
    /// Whether the channel renders action rows as buttons. When it does not,
    /// templates inline the links into the text instead.
    pub buttons: bool,
}

/// Template output before any length handling.
pub(crate) struct Draft {
    pub subject: String,
    pub sections: Vec<Section>,
    pub actions: Vec<Vec<ActionLink>>,
}

pub(crate) fn build(payload: &EventPayload, ctx: &RenderContext<'_>) -> Result<Draft, FormatError> {
    let mut draft = match payload.kind {
        EventKind::BusinessOffer => business_offer::build(payload, ctx)?,
        EventKind::PrototypeReady => prototype::build(payload, ctx)?,
        EventKind::Confirmation => notice::confirmation(payload, ctx)?,
        EventKind::FollowUp => notice::follow_up(payload, ctx)?,
    };

    if !ctx.buttons && !draft.actions.is_empty() {
        let links = std::mem::take(&mut draft.actions)
            .into_iter()
            .flatten()
            .map(|action| ctx.markup.link(&action.label, &action.url))
            .collect::<Vec<_>>()
            .join("\n");
        // Links go right before the footer so they survive omission.
        let at = draft
            .sections
            .iter()
            .position(|s| s.kind == SectionKind::Footer)
            .unwrap_or(draft.sections.len());
        draft
            .sections
            .insert(at, Section::required(SectionKind::NextSteps, links));
    }

    Ok(draft)
}

/// Non-blank string field or a `MissingField` error.
pub(crate) fn require<'a>(
    value: Option<&'a String>,
    kind: EventKind,
    field: &'static str,
) -> Result<&'a str, FormatError> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FormatError::MissingField { kind, field }),
    }
}

/// Name used in greetings.
pub(crate) fn customer(payload: &EventPayload) -> &str {
    payload
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("there")
}

pub(crate) fn footer(ctx: &RenderContext<'_>) -> Section {
    let m = ctx.markup;
    let b = ctx.branding;
    let content = match m {
        Markup::Plain => format!(
            "{}\nBest regards,\nThe {} Team\n{}\n{}",
            m.rule(),
            b.brand_name,
            b.website_url,
            b.contact_email
        ),
        Markup::Markdown | Markup::WhatsApp => format!(
            "{}\n\n🏢 {}\n🌐 {}\n📧 {}\n\n{}",
            m.rule(),
            m.bold(&b.brand_name),
            if m == Markup::Markdown {
                m.link(&b.website_url, &b.website_url)
            } else {
                b.website_url.clone()
            },
            m.text(&b.contact_email),
            m.bold("Ready to bring your project to life?")
        ),
    };
    Section::required(SectionKind::Footer, content)
}

pub(crate) fn dashboard_row(ctx: &RenderContext<'_>) -> Vec<ActionLink> {
    vec![ActionLink::new("📊 View Dashboard", &ctx.branding.dashboard_url)]
}

pub(crate) fn contact_row(ctx: &RenderContext<'_>) -> Vec<ActionLink> {
    vec![
        ActionLink::new("🚀 Request New Analysis", &ctx.branding.contact_url),
        ActionLink::new("💬 Contact Sales", &ctx.branding.support_url),
    ]
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use herald_common::payload::*;

    pub fn business_offer() -> EventPayload {
        EventPayload {
            submission_id: Some("sub-42".to_string()),
            customer_name: Some("Ada Lovelace".to_string()),
            occurred_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()),
            business_analysis: Some(BusinessAnalysis {
                project_scope: "A booking platform for small clinics".to_string(),
                technology_stack: vec!["Rust".to_string(), "Postgres".to_string()],
                timeline_estimate: "8 weeks".to_string(),
                budget_range: "$20k-$30k".to_string(),
                risk_factors: vec!["Regulatory review".to_string()],
                market_insights: "Growing demand in the region".to_string(),
                recommendations: vec!["Start with an MVP".to_string()],
                confidence_score: Some(0.87),
            }),
            offer: Some(OfferDetails {
                project_id: "proj-7".to_string(),
                plan_url: "https://plans.test/proj-7".to_string(),
                offer_url: "https://offers.test/proj-7".to_string(),
                pricing_tiers: vec![serde_json::json!({"name": "basic"})],
                implementation_phases: vec![],
                deliverables: vec!["Web app".to_string(), "Admin panel".to_string()],
                next_steps: vec!["Book a call".to_string()],
            }),
            agent_results: vec![
                AgentResult {
                    agent_name: "Planner".to_string(),
                    status: AgentStatus::Completed,
                    processing_time_secs: 2.5,
                    confidence_score: 0.9,
                    error_message: None,
                },
                AgentResult {
                    agent_name: "Pricer".to_string(),
                    status: AgentStatus::Failed,
                    processing_time_secs: 1.0,
                    confidence_score: 0.0,
                    error_message: Some("upstream timeout".to_string()),
                },
            ],
            processing_summary: Some(ProcessingSummary {
                total_processing_time_secs: 42.0,
                completed_steps: 4,
                total_steps: 5,
            }),
            ..EventPayload::new(EventKind::BusinessOffer)
        }
    }
}
