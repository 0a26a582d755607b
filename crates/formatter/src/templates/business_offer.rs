use herald_common::payload::{
    AgentStatus, BusinessAnalysis, EventKind, EventPayload, FileAnalysisSummary, OfferDetails,
    ProcessingSummary, VoiceTranscription,
};

use super::{Draft, RenderContext, contact_row, customer, dashboard_row, footer, require};
use crate::error::FormatError;
use crate::markup::{Markup, truncate};
use crate::message::{ActionLink, Section, SectionKind};

const KIND: EventKind = EventKind::BusinessOffer;

pub(super) fn build(payload: &EventPayload, ctx: &RenderContext<'_>) -> Result<Draft, FormatError> {
    let submission_id = require(payload.submission_id.as_ref(), KIND, "submission_id")?;
    let analysis = payload
        .business_analysis
        .as_ref()
        .ok_or(FormatError::MissingField {
            kind: KIND,
            field: "business_analysis",
        })?;
    if analysis.project_scope.trim().is_empty() {
        return Err(FormatError::MissingField {
            kind: KIND,
            field: "business_analysis.project_scope",
        });
    }
    if let Some(score) = analysis.confidence_score
        && !(0.0..=1.0).contains(&score)
    {
        return Err(FormatError::InvalidField {
            kind: KIND,
            field: "business_analysis.confidence_score",
            reason: format!("{} is outside 0.0..=1.0", score),
        });
    }

    let m = ctx.markup;
    let name = customer(payload);
    let title = format!("{} Business Analysis Complete", ctx.branding.brand_name);

    let mut sections = vec![
        Section::required(SectionKind::Header, header(m, &title, submission_id, name, payload)),
        Section::required(SectionKind::Details, details(m, name, submission_id)),
        Section::required(SectionKind::Analysis, analysis_section(m, analysis)),
    ];
    if !payload.agent_results.is_empty() {
        sections.push(Section::optional(
            SectionKind::AgentResults,
            agents_section(m, payload),
        ));
    }
    if !payload.file_summaries.is_empty() {
        sections.push(Section::optional(
            SectionKind::FileAnalysis,
            files_section(m, &payload.file_summaries),
        ));
    }
    if let Some(voice) = &payload.voice_transcription {
        sections.push(Section::optional(SectionKind::Voice, voice_section(m, voice)));
    }
    if let Some(offer) = &payload.offer {
        sections.push(Section::optional(SectionKind::Offer, offer_section(m, offer)));
    }
    if let Some(summary) = &payload.processing_summary {
        sections.push(Section::optional(
            SectionKind::Processing,
            processing_section(m, summary),
        ));
    }
    sections.push(footer(ctx));

    let mut actions = Vec::new();
    if let Some(offer) = &payload.offer {
        actions.push(vec![
            ActionLink::new("📋 View Project Plan", &offer.plan_url),
            ActionLink::new("💰 View Offer Details", &offer.offer_url),
        ]);
    }
    actions.push(dashboard_row(ctx));
    actions.push(contact_row(ctx));

    Ok(Draft {
        subject: format!("{} - Your Custom Offer", title),
        sections,
        actions,
    })
}

fn header(m: Markup, title: &str, submission_id: &str, name: &str, payload: &EventPayload) -> String {
    let mut lines = vec![
        m.heading("🚀", title),
        String::new(),
        m.field("📋", "Submission ID", &m.code(submission_id)),
        m.field("👤", "Customer", &m.text(name)),
    ];
    if let Some(at) = payload.occurred_at {
        lines.push(m.field(
            "📅",
            "Processed",
            &at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ));
    }
    lines.push(m.field("🎯", "Analysis Type", "Multi-Agent Business Intelligence"));
    lines.push(String::new());
    lines.push(m.rule());
    lines.join("\n")
}

fn details(m: Markup, name: &str, submission_id: &str) -> String {
    match m {
        Markup::Plain => format!(
            "Dear {},\n\nYour business analysis is complete. Our agents have processed \
             submission {} and prepared a tailored offer.",
            name, submission_id
        ),
        _ => format!(
            "Hello {}!\n\nYour AI-powered business analysis is ready.",
            m.text(name)
        ),
    }
}

fn list_or(m: Markup, items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return m.bullet(empty);
    }
    items
        .iter()
        .map(|item| m.bullet(&m.text(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn analysis_section(m: Markup, a: &BusinessAnalysis) -> String {
    let stack = if a.technology_stack.is_empty() {
        "Not specified".to_string()
    } else {
        m.text(&a.technology_stack.join(", "))
    };
    let confidence = a
        .confidence_score
        .map(|c| format!("{:.1}%", c * 100.0))
        .unwrap_or_else(|| "N/A".to_string());

    let mut lines = vec![
        m.heading("🧠", "AI Business Analysis"),
        String::new(),
        m.field("🎯", "Project Scope", &m.text(&truncate(&a.project_scope, 200))),
        m.field("💻", "Technology Stack", &stack),
        m.field("⏱️", "Timeline Estimate", &m.text(&a.timeline_estimate)),
        m.field("💰", "Budget Range", &m.text(&a.budget_range)),
        String::new(),
        m.field("⚠️", "Risk Factors", ""),
        list_or(m, &a.risk_factors, "No significant risks identified"),
    ];
    if !a.market_insights.trim().is_empty() {
        lines.push(m.field(
            "📈",
            "Market Insights",
            &m.text(&truncate(&a.market_insights, 200)),
        ));
    }
    lines.push(m.field("💡", "Recommendations", ""));
    lines.push(list_or(
        m,
        &a.recommendations,
        "Standard implementation approach recommended",
    ));
    lines.push(m.field("🎯", "Confidence Score", &confidence));
    lines.into_iter().map(|l| l.trim_end().to_string()).collect::<Vec<_>>().join("\n")
}

fn agents_section(m: Markup, payload: &EventPayload) -> String {
    let agents = &payload.agent_results;
    let completed = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Completed)
        .count();
    let failed = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Failed)
        .count();
    let total_time: f64 = agents.iter().map(|a| a.processing_time_secs).sum();

    let mut lines = vec![
        m.heading("🤖", "AI Agent Processing Results"),
        String::new(),
        m.field("✅", "Successful Agents", &format!("{}/{}", completed, agents.len())),
        m.field("❌", "Failed Agents", &failed.to_string()),
        m.field("⏱️", "Total Processing Time", &format!("{:.1}s", total_time)),
    ];
    for agent in agents {
        let icon = if agent.status == AgentStatus::Completed {
            "✅"
        } else {
            "❌"
        };
        let confidence = if agent.confidence_score > 0.0 {
            format!(" ({:.1}%)", agent.confidence_score * 100.0)
        } else {
            String::new()
        };
        lines.push(m.field(
            icon,
            &m.text(&agent.agent_name),
            &format!("{:.1}s{}", agent.processing_time_secs, confidence),
        ));
        if agent.status == AgentStatus::Failed
            && let Some(error) = &agent.error_message
        {
            lines.push(format!("   ⚠️ Error: {}", m.text(&truncate(error, 100))));
        }
    }
    lines.join("\n")
}

fn files_section(m: Markup, files: &[FileAnalysisSummary]) -> String {
    let mut lines = vec![
        m.heading("📁", "File Analysis Summary"),
        String::new(),
        m.field("📊", "Files Processed", &files.len().to_string()),
    ];
    for file in files {
        let icon = if file.processing_status == "completed" {
            "✅"
        } else {
            "❌"
        };
        let size_mb = file.file_size as f64 / (1024.0 * 1024.0);
        lines.push(format!("{} {}", icon, m.bold(&file.file_name)));
        lines.push(format!(
            "   📄 Type: {} | Size: {:.1}MB",
            m.text(&file.file_type),
            size_mb
        ));
        lines.push(format!(
            "   📝 Extracted: {} characters",
            file.extracted_text_length
        ));
        if !file.key_insights.is_empty() {
            let insights = file
                .key_insights
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "   💡 Key Insights: {}",
                m.text(&truncate(&insights, 100))
            ));
        }
    }
    lines.join("\n")
}

fn voice_section(m: Markup, voice: &VoiceTranscription) -> String {
    let topics = if voice.key_topics.is_empty() {
        "No specific topics identified".to_string()
    } else {
        m.text(&truncate(&voice.key_topics.join(", "), 200))
    };
    [
        m.heading("🎤", "Voice Analysis Results"),
        String::new(),
        m.field("⏱️", "Duration", &format!("{:.1} seconds", voice.duration_seconds)),
        m.field(
            "🎯",
            "Confidence",
            &format!("{:.1}%", voice.confidence_score * 100.0),
        ),
        m.field("📝", "Status", &m.text(&voice.processing_status)),
        String::new(),
        format!("\"{}\"", m.text(&truncate(&voice.transcript, 300))),
        String::new(),
        m.field("🔑", "Key Topics", &topics),
    ]
    .join("\n")
}

fn offer_section(m: Markup, offer: &OfferDetails) -> String {
    let mut lines = vec![
        m.heading("💼", "Business Offer Details"),
        String::new(),
        m.field("🆔", "Project ID", &m.code(&offer.project_id)),
        format!("📋 {}", m.link("View Project Plan", &offer.plan_url)),
        format!("💰 {}", m.link("View Detailed Offer", &offer.offer_url)),
    ];
    if !offer.pricing_tiers.is_empty() {
        lines.push(m.field(
            "💰",
            "Pricing Tiers",
            &format!("{} options available", offer.pricing_tiers.len()),
        ));
    }
    if !offer.implementation_phases.is_empty() {
        lines.push(m.field(
            "📅",
            "Implementation Phases",
            &format!("{} phases planned", offer.implementation_phases.len()),
        ));
    }
    if !offer.deliverables.is_empty() {
        lines.push(m.field("📦", "Key Deliverables", ""));
        for item in offer.deliverables.iter().take(5) {
            lines.push(m.bullet(&m.text(item)));
        }
        if offer.deliverables.len() > 5 {
            lines.push(m.bullet(&format!(
                "... and {} more",
                offer.deliverables.len() - 5
            )));
        }
    }
    if !offer.next_steps.is_empty() {
        lines.push(m.field("🚀", "Next Steps", ""));
        for step in offer.next_steps.iter().take(3) {
            lines.push(m.bullet(&m.text(step)));
        }
    }
    lines.into_iter().map(|l| l.trim_end().to_string()).collect::<Vec<_>>().join("\n")
}

fn processing_section(m: Markup, summary: &ProcessingSummary) -> String {
    let success_rate = if summary.total_steps > 0 {
        format!(
            "{:.1}%",
            summary.completed_steps as f64 / summary.total_steps as f64 * 100.0
        )
    } else {
        "N/A".to_string()
    };
    [
        m.heading("📊", "Processing Summary"),
        String::new(),
        m.field(
            "⏱️",
            "Total Processing Time",
            &format!("{:.1} seconds", summary.total_processing_time_secs),
        ),
        m.field(
            "✅",
            "Completed Steps",
            &format!("{}/{}", summary.completed_steps, summary.total_steps),
        ),
        m.field("📈", "Success Rate", &success_rate),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use herald_common::config::BrandingConfig;

    use super::*;
    use crate::templates::fixtures;

    fn ctx(branding: &BrandingConfig, markup: Markup) -> RenderContext<'_> {
        RenderContext {
            markup,
            branding,
            buttons: true,
        }
    }

    #[test]
    fn test_missing_analysis_is_rejected() {
        let branding = BrandingConfig::default();
        let mut payload = fixtures::business_offer();
        payload.business_analysis = None;

        let err = build(&payload, &ctx(&branding, Markup::Markdown))
            .err()
            .unwrap();
        assert_eq!(
            err,
            FormatError::MissingField {
                kind: EventKind::BusinessOffer,
                field: "business_analysis"
            }
        );
    }

    #[test]
    fn test_blank_submission_id_is_missing() {
        let branding = BrandingConfig::default();
        let mut payload = fixtures::business_offer();
        payload.submission_id = Some("  ".to_string());
        assert!(matches!(
            build(&payload, &ctx(&branding, Markup::Plain)),
            Err(FormatError::MissingField {
                field: "submission_id",
                ..
            })
        ));
    }

    #[test]
    fn test_confidence_out_of_range_is_invalid() {
        let branding = BrandingConfig::default();
        let mut payload = fixtures::business_offer();
        if let Some(a) = payload.business_analysis.as_mut() {
            a.confidence_score = Some(87.0);
        }
        assert!(matches!(
            build(&payload, &ctx(&branding, Markup::Markdown)),
            Err(FormatError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_section_order_and_optionality() {
        let branding = BrandingConfig::default();
        let draft = build(&fixtures::business_offer(), &ctx(&branding, Markup::Markdown)).unwrap();
        let kinds: Vec<(SectionKind, bool)> =
            draft.sections.iter().map(|s| (s.kind, s.optional)).collect();
        assert_eq!(
            kinds,
            vec![
                (SectionKind::Header, false),
                (SectionKind::Details, false),
                (SectionKind::Analysis, false),
                (SectionKind::AgentResults, true),
                (SectionKind::Offer, true),
                (SectionKind::Processing, true),
                (SectionKind::Footer, false),
            ]
        );
        assert_eq!(draft.actions.len(), 3);
        assert_eq!(draft.actions[0][0].url, "https://plans.test/proj-7");
    }

    #[test]
    fn test_markdown_header_content() {
        let branding = BrandingConfig::default();
        let draft = build(&fixtures::business_offer(), &ctx(&branding, Markup::Markdown)).unwrap();
        let header = &draft.sections[0].content;
        assert!(header.starts_with("🚀 *Herald Business Analysis Complete*"));
        assert!(header.contains("📋 *Submission ID:* `sub-42`"));
        assert!(header.contains("2025-03-01 12:30:00 UTC"));
    }

    #[test]
    fn test_failed_agent_error_is_listed() {
        let branding = BrandingConfig::default();
        let draft = build(&fixtures::business_offer(), &ctx(&branding, Markup::Plain)).unwrap();
        let agents = draft
            .sections
            .iter()
            .find(|s| s.kind == SectionKind::AgentResults)
            .unwrap();
        assert!(agents.content.contains("Successful Agents: 1/2"));
        assert!(agents.content.contains("Error: upstream timeout"));
    }

    #[test]
    fn test_long_scope_is_truncated() {
        let branding = BrandingConfig::default();
        let mut payload = fixtures::business_offer();
        if let Some(a) = payload.business_analysis.as_mut() {
            a.project_scope = "scope ".repeat(100);
        }
        let draft = build(&payload, &ctx(&branding, Markup::Plain)).unwrap();
        let analysis = &draft.sections[2].content;
        let scope_line = analysis
            .lines()
            .find(|l| l.contains("Project Scope"))
            .unwrap();
        assert!(scope_line.ends_with("..."));
        assert!(scope_line.chars().count() < 230);
    }
}
