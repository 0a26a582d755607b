use herald_common::types::ChannelKind;
use serde::{Deserialize, Serialize};

/// Logical block of a template, in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Header,
    Details,
    Message,
    Analysis,
    AgentResults,
    FileAnalysis,
    Voice,
    Offer,
    Processing,
    NextSteps,
    Footer,
}

/// A rendered block of text. Optional sections may be dropped to fit a
/// single message.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub optional: bool,
    pub content: String,
}

impl Section {
    pub fn required(kind: SectionKind, content: String) -> Self {
        Self {
            kind,
            optional: false,
            content,
        }
    }

    pub fn optional(kind: SectionKind, content: String) -> Self {
        Self {
            kind,
            optional: true,
            content,
        }
    }
}

/// Separator that precedes a segment in the full rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// First segment.
    Start,
    /// Blank line between two sections.
    Section,
    /// Line break inside a section.
    Line,
    /// Space between two words of one line.
    Word,
    /// Nothing; only used for a single word longer than the channel limit.
    Glue,
}

impl Boundary {
    pub fn separator(&self) -> &'static str {
        match self {
            Boundary::Start | Boundary::Glue => "",
            Boundary::Section => SECTION_SEPARATOR,
            Boundary::Line => "\n",
            Boundary::Word => " ",
        }
    }
}

/// Text placed between two sections.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// One independently deliverable piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub boundary: Boundary,
}

/// A clickable action (inline keyboard button, email button).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLink {
    pub label: String,
    pub url: String,
}

impl ActionLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Channel-specific output of the formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub channel: ChannelKind,
    /// Subject line (used by email; informational elsewhere).
    pub subject: String,
    /// Ordered segments; every one fits the channel limit.
    pub segments: Vec<Segment>,
    /// Button rows, delivered with the final segment only.
    pub actions: Vec<Vec<ActionLink>>,
    /// Optional sections dropped to fit a single message.
    pub omitted: Vec<SectionKind>,
}

impl RenderedMessage {
    /// Rebuild the full text from the segments, in order.
    pub fn reassemble(&self) -> String {
        let mut text = String::new();
        for segment in &self.segments {
            text.push_str(segment.boundary.separator());
            text.push_str(&segment.text);
        }
        text
    }

    pub fn is_split(&self) -> bool {
        self.segments.len() > 1
    }

    /// Segments paired with the action rows that accompany them.
    pub fn deliverables(&self) -> impl Iterator<Item = (&Segment, Option<&[Vec<ActionLink>]>)> {
        let last = self.segments.len().saturating_sub(1);
        self.segments.iter().enumerate().map(move |(i, segment)| {
            let actions = (i == last && !self.actions.is_empty()).then_some(self.actions.as_slice());
            (segment, actions)
        })
    }
}
