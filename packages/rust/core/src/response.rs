//! Lenient parsing of the three-line formatting reply.
//!
//! The format collaborator is instructed to answer with exactly three
//! lines: enriched description, primary source URL, secondary source
//! URL. Real replies drift from that shape, so parsing degrades field
//! by field to sentinel values instead of failing the row.

use url::Url;

use bomenrich_shared::{NO_SECOND_SOURCE, NO_SOURCE, NO_SUGGESTION};

/// The three fields recovered from a formatting reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedReply {
    /// Suggested description, or [`NO_SUGGESTION`] when line one was empty.
    pub description: String,
    /// Validated `https://` URL or [`NO_SOURCE`].
    pub primary_source: String,
    /// Validated `https://` URL or [`NO_SECOND_SOURCE`].
    pub secondary_source: String,
}

/// Parse a formatting reply.
///
/// Line one is the description; empty or missing means no suggestion.
/// Lines two and three must be well-formed `https://` URLs; anything
/// else degrades to the matching sentinel. Lines past the third are
/// ignored. Fields degrade independently: a bad URL on line two does
/// not invalidate line three.
pub fn parse_reply(raw: &str) -> FormattedReply {
    let mut lines = raw.lines().map(str::trim);

    let description = match lines.next() {
        Some(line) if !line.is_empty() => line.to_string(),
        _ => NO_SUGGESTION.to_string(),
    };
    let primary_source = source_or(lines.next(), NO_SOURCE);
    let secondary_source = source_or(lines.next(), NO_SECOND_SOURCE);

    FormattedReply {
        description,
        primary_source,
        secondary_source,
    }
}

/// Keep a line only when it parses as an `https://` URL.
fn source_or(line: Option<&str>, sentinel: &str) -> String {
    let Some(candidate) = line else {
        return sentinel.to_string();
    };
    if candidate.starts_with("https://") && Url::parse(candidate).is_ok() {
        candidate.to_string()
    } else {
        sentinel.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reply_parses() {
        let reply = parse_reply(
            "CAP CRM 39PF 50V 2% COG 0402 SMT\nhttps://example.com/cap\nhttps://example.org/cap",
        );
        assert_eq!(reply.description, "CAP CRM 39PF 50V 2% COG 0402 SMT");
        assert_eq!(reply.primary_source, "https://example.com/cap");
        assert_eq!(reply.secondary_source, "https://example.org/cap");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let reply = parse_reply("  RES 1.8K 5% 0402 SMT  \n  https://example.com/res  \n");
        assert_eq!(reply.description, "RES 1.8K 5% 0402 SMT");
        assert_eq!(reply.primary_source, "https://example.com/res");
        assert_eq!(reply.secondary_source, NO_SECOND_SOURCE);
    }

    #[test]
    fn missing_lines_degrade_to_sentinels() {
        let reply = parse_reply("ATTEN DC-18GHz 3DB");
        assert_eq!(reply.description, "ATTEN DC-18GHz 3DB");
        assert_eq!(reply.primary_source, NO_SOURCE);
        assert_eq!(reply.secondary_source, NO_SECOND_SOURCE);
    }

    #[test]
    fn non_https_lines_degrade_to_sentinels() {
        let reply = parse_reply("IC TIMER 555\nhttp://example.com/insecure\nftp://example.com/x");
        assert_eq!(reply.primary_source, NO_SOURCE);
        assert_eq!(reply.secondary_source, NO_SECOND_SOURCE);
    }

    #[test]
    fn bad_primary_does_not_invalidate_secondary() {
        let reply = parse_reply("IC TIMER 555\nsee distributor site\nhttps://example.com/555");
        assert_eq!(reply.primary_source, NO_SOURCE);
        assert_eq!(reply.secondary_source, "https://example.com/555");
    }

    #[test]
    fn empty_description_line_means_no_suggestion() {
        let reply = parse_reply("\nhttps://example.com/found\n");
        assert_eq!(reply.description, NO_SUGGESTION);
        assert_eq!(reply.primary_source, "https://example.com/found");
    }

    #[test]
    fn empty_reply_yields_all_sentinels() {
        let reply = parse_reply("");
        assert_eq!(reply.description, NO_SUGGESTION);
        assert_eq!(reply.primary_source, NO_SOURCE);
        assert_eq!(reply.secondary_source, NO_SECOND_SOURCE);
    }

    #[test]
    fn sentinel_echoes_stay_sentinels() {
        let reply = parse_reply("CAP 10PF 50V SMT\nNO_SOURCE\nNO_SECOND_SOURCE");
        assert_eq!(reply.primary_source, NO_SOURCE);
        assert_eq!(reply.secondary_source, NO_SECOND_SOURCE);
    }

    #[test]
    fn lines_past_the_third_are_ignored() {
        let reply = parse_reply(
            "CAP 10PF 50V SMT\nhttps://example.com/a\nhttps://example.com/b\nNote: verified stock",
        );
        assert_eq!(reply.description, "CAP 10PF 50V SMT");
        assert_eq!(reply.primary_source, "https://example.com/a");
        assert_eq!(reply.secondary_source, "https://example.com/b");
    }

    #[test]
    fn https_prefix_alone_is_not_a_source() {
        let reply = parse_reply("CAP 10PF\nhttps://\nhttps://example.com/ok");
        assert_eq!(reply.primary_source, NO_SOURCE);
        assert_eq!(reply.secondary_source, "https://example.com/ok");
    }
}
