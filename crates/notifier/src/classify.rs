//! Provider error taxonomies.
//!
//! Each provider gets a static table mapping its error codes and error names to
//! an [`AttemptOutcome`]. Anything the table does not know falls back to the
//! HTTP status class.

use herald_common::types::AttemptOutcome;
use herald_common::types::AttemptOutcome::{
    PermanentFailure as Permanent, TransientFailure as Transient,
};

/// Static error table for one provider.
#[derive(Debug)]
pub struct Taxonomy {
    pub provider: &'static str,
    /// Provider-specific numeric codes.
    codes: &'static [(i64, AttemptOutcome)],
    /// Case-insensitive fragments of the provider's error name or description.
    names: &'static [(&'static str, AttemptOutcome)],
}

impl Taxonomy {
    /// Classify a failed response. Names are the most specific signal, then
    /// codes, then the HTTP status.
    pub fn classify(&self, status: u16, code: Option<i64>, name: Option<&str>) -> AttemptOutcome {
        if let Some(name) = name {
            let name = name.to_ascii_lowercase();
            if let Some((_, outcome)) = self.names.iter().find(|(n, _)| name.contains(n)) {
                return *outcome;
            }
        }
        if let Some(code) = code
            && let Some((_, outcome)) = self.codes.iter().find(|(c, _)| *c == code)
        {
            return *outcome;
        }
        classify_status(status)
    }
}

/// Generic HTTP status classification.
pub fn classify_status(status: u16) -> AttemptOutcome {
    match status {
        408 | 425 | 429 => Transient,
        400..=499 => Permanent,
        _ => Transient,
    }
}

/// Classify a transport error. Only a malformed request is permanent; the
/// rest (connect, timeout, reset, body) may succeed on the next attempt.
pub fn classify_transport(err: &reqwest::Error) -> AttemptOutcome {
    if err.is_builder() {
        Permanent
    } else if let Some(status) = err.status() {
        classify_status(status.as_u16())
    } else {
        Transient
    }
}

/// Telegram Bot API, keyed by `error_code` and `description`.
pub static TELEGRAM: Taxonomy = Taxonomy {
    provider: "telegram",
    codes: &[
        (400, Permanent),
        (401, Permanent),
        (403, Permanent),
        (404, Permanent),
        (409, Transient),
        (420, Transient),
        (429, Transient),
        (500, Transient),
        (502, Transient),
        (503, Transient),
        (504, Transient),
    ],
    names: &[
        ("too many requests", Transient),
        ("retry after", Transient),
        ("flood", Transient),
        ("chat not found", Permanent),
        ("bot was blocked", Permanent),
        ("user is deactivated", Permanent),
        ("message is too long", Permanent),
        ("can't parse entities", Permanent),
    ],
};

/// Resend HTTP API, keyed by the `name` field of error bodies.
pub static RESEND: Taxonomy = Taxonomy {
    provider: "resend",
    codes: &[],
    names: &[
        ("rate_limit_exceeded", Transient),
        ("daily_quota_exceeded", Transient),
        ("monthly_quota_exceeded", Transient),
        ("concurrent_idempotent_requests", Transient),
        ("application_error", Transient),
        ("internal_server_error", Transient),
        ("missing_api_key", Permanent),
        ("invalid_api_key", Permanent),
        ("restricted_api_key", Permanent),
        ("invalid_from_address", Permanent),
        ("invalid_to_address", Permanent),
        ("validation_error", Permanent),
        ("missing_required_field", Permanent),
        ("invalid_attachment", Permanent),
        ("not_found", Permanent),
        ("method_not_allowed", Permanent),
    ],
};

/// WhatsApp Cloud API, keyed by Graph API `error.code`.
pub static WHATSAPP: Taxonomy = Taxonomy {
    provider: "whatsapp",
    codes: &[
        // Throttling
        (4, Transient),
        (80007, Transient),
        (130429, Transient),
        (131048, Transient),
        (131056, Transient),
        // Provider side
        (1, Transient),
        (2, Transient),
        (131000, Transient),
        (131016, Transient),
        // Auth and permissions
        (0, Permanent),
        (3, Permanent),
        (10, Permanent),
        (190, Permanent),
        // Recipient or content
        (100, Permanent),
        (131008, Permanent),
        (131009, Permanent),
        (131021, Permanent),
        (131026, Permanent),
        (131047, Permanent),
        (131051, Permanent),
        (133010, Permanent),
        (368, Permanent),
    ],
    names: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_fallback() {
        assert_eq!(classify_status(500), Transient);
        assert_eq!(classify_status(503), Transient);
        assert_eq!(classify_status(429), Transient);
        assert_eq!(classify_status(408), Transient);
        assert_eq!(classify_status(400), Permanent);
        assert_eq!(classify_status(401), Permanent);
        assert_eq!(classify_status(422), Permanent);
    }

    #[test]
    fn test_telegram_description_beats_code() {
        // 400 is permanent by code, but a flood-control description is not.
        assert_eq!(
            TELEGRAM.classify(400, Some(400), Some("Bad Request: FLOOD_WAIT_X")),
            Transient
        );
        assert_eq!(
            TELEGRAM.classify(400, Some(400), Some("Bad Request: chat not found")),
            Permanent
        );
        assert_eq!(
            TELEGRAM.classify(429, Some(429), Some("Too Many Requests: retry after 5")),
            Transient
        );
    }

    #[test]
    fn test_resend_names() {
        assert_eq!(
            RESEND.classify(429, None, Some("rate_limit_exceeded")),
            Transient
        );
        assert_eq!(
            RESEND.classify(422, None, Some("invalid_from_address")),
            Permanent
        );
        assert_eq!(RESEND.classify(403, None, Some("invalid_api_key")), Permanent);
        assert_eq!(RESEND.classify(502, None, None), Transient);
    }

    #[test]
    fn test_whatsapp_codes() {
        assert_eq!(WHATSAPP.classify(400, Some(131026), None), Permanent);
        assert_eq!(WHATSAPP.classify(400, Some(130429), None), Transient);
        assert_eq!(WHATSAPP.classify(401, Some(190), None), Permanent);
        assert_eq!(WHATSAPP.classify(500, Some(131000), None), Transient);
    }

    #[test]
    fn test_unknown_code_uses_status() {
        assert_eq!(WHATSAPP.classify(400, Some(999_999), None), Permanent);
        assert_eq!(WHATSAPP.classify(503, Some(999_999), None), Transient);
    }
}
