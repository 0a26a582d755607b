//! Structured business-event payloads handed to the formatter.
//!
//! Everything except `kind` is optional at the type level; each template
//! decides which fields it requires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business event that triggered the notification. Selects the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Analysis finished and an offer is ready.
    BusinessOffer,
    /// A working prototype has been deployed.
    PrototypeReady,
    /// Submission received.
    Confirmation,
    /// Free-form follow-up message.
    FollowUp,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::BusinessOffer => write!(f, "business_offer"),
            EventKind::PrototypeReady => write!(f, "prototype_ready"),
            EventKind::Confirmation => write!(f, "confirmation"),
            EventKind::FollowUp => write!(f, "follow_up"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub kind: EventKind,
    #[serde(default)]
    pub submission_id: Option<String>,
    /// Name used in greetings and headers. Filled from the recipient when absent.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// When the upstream processing finished.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub business_analysis: Option<BusinessAnalysis>,
    #[serde(default)]
    pub offer: Option<OfferDetails>,
    #[serde(default)]
    pub agent_results: Vec<AgentResult>,
    #[serde(default)]
    pub file_summaries: Vec<FileAnalysisSummary>,
    #[serde(default)]
    pub voice_transcription: Option<VoiceTranscription>,
    #[serde(default)]
    pub processing_summary: Option<ProcessingSummary>,
    #[serde(default)]
    pub prototype: Option<PrototypeDetails>,
}

impl EventPayload {
    /// Empty payload of the given kind.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            submission_id: None,
            customer_name: None,
            occurred_at: None,
            title: None,
            message: None,
            business_analysis: None,
            offer: None,
            agent_results: Vec::new(),
            file_summaries: Vec::new(),
            voice_transcription: None,
            processing_summary: None,
            prototype: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessAnalysis {
    pub project_scope: String,
    #[serde(default)]
    pub technology_stack: Vec<String>,
    pub timeline_estimate: String,
    pub budget_range: String,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub market_insights: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// 0.0 – 1.0
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDetails {
    pub project_id: String,
    pub plan_url: String,
    pub offer_url: String,
    #[serde(default)]
    pub pricing_tiers: Vec<serde_json::Value>,
    #[serde(default)]
    pub implementation_phases: Vec<serde_json::Value>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    Failed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub processing_time_secs: f64,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysisSummary {
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub extracted_text_length: u64,
    #[serde(default)]
    pub key_insights: Vec<String>,
    pub processing_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceTranscription {
    pub duration_seconds: f64,
    pub transcript: String,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub key_topics: Vec<String>,
    pub processing_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    #[serde(default)]
    pub total_processing_time_secs: f64,
    #[serde(default)]
    pub completed_steps: u32,
    #[serde(default)]
    pub total_steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrototypeDetails {
    pub prototype_id: String,
    pub results_url: String,
}
