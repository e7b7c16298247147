//! Output selection over an agent run's ordered payloads.

use ct_domain::payload::Payload;

/// Marker an agent replies with when a heartbeat-style job has nothing to say.
pub const HEARTBEAT_TOKEN: &str = "HEARTBEAT_OK";
/// Default for how much text may accompany the marker and still count as
/// an acknowledgement.
pub const DEFAULT_HEARTBEAT_ACK_MAX_CHARS: usize = 300;
pub const SUMMARY_MAX_CHARS: usize = 2_000;

fn is_user_facing(payload: &Payload) -> bool {
    !payload.internal && !payload.is_error
}

fn is_deliverable(payload: &Payload) -> bool {
    is_user_facing(payload)
        && (payload.trimmed_text().is_some() || payload.has_media() || payload.has_channel_data())
}

/// The last payload worth sending: user-facing and carrying text, media or
/// channel data.
pub fn pick_last_deliverable_payload(payloads: &[Payload]) -> Option<&Payload> {
    payloads.iter().rev().find(|p| is_deliverable(p))
}

/// Trimmed text of the last user-facing payload that has any.
pub fn pick_last_non_empty_text_from_payloads(payloads: &[Payload]) -> Option<&str> {
    payloads
        .iter()
        .rev()
        .filter(|p| is_user_facing(p))
        .find_map(Payload::trimmed_text)
}

pub fn pick_summary_from_output(text: Option<&str>) -> Option<String> {
    let text = text.map(str::trim).filter(|t| !t.is_empty())?;
    Some(truncate_chars(text, SUMMARY_MAX_CHARS))
}

pub fn pick_summary_from_payloads(payloads: &[Payload]) -> Option<String> {
    pick_summary_from_output(pick_last_non_empty_text_from_payloads(payloads))
}

/// True when the run produced nothing but heartbeat acknowledgements.
///
/// Internal and error payloads are ignored; a run with no user-facing
/// payload counts.  Every other payload must carry no media or channel
/// data and be either blank or a [`HEARTBEAT_TOKEN`] reply whose remaining
/// text is at most `ack_max_chars` characters.
pub fn is_heartbeat_only_response(payloads: &[Payload], ack_max_chars: usize) -> bool {
    payloads.iter().filter(|p| is_user_facing(p)).all(|p| {
        if p.has_media() || p.has_channel_data() {
            return false;
        }
        let Some(text) = p.trimmed_text() else {
            return true;
        };
        match strip_heartbeat_token(text) {
            Some(rest) => rest.chars().count() <= ack_max_chars,
            None => false,
        }
    })
}

/// Remove the heartbeat marker (and markup wrapped around it).  `None` when
/// the marker is absent.
fn strip_heartbeat_token(text: &str) -> Option<String> {
    if !text.contains(HEARTBEAT_TOKEN) {
        return None;
    }
    let rest = text.replace(HEARTBEAT_TOKEN, "");
    Some(
        rest.trim()
            .trim_matches(|c: char| matches!(c, '*' | '_' | '`') || c.is_whitespace())
            .to_owned(),
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(text: &str) -> Payload {
        Payload {
            internal: true,
            ..Payload::text(text)
        }
    }

    #[test]
    fn last_deliverable_skips_internal_errors_and_blanks() {
        let payloads = vec![
            Payload::text("first"),
            Payload {
                media_urls: vec!["https://img/1.png".into()],
                ..Default::default()
            },
            internal("thinking..."),
            Payload {
                is_error: true,
                ..Payload::text("tool failed")
            },
            Payload::text("   "),
        ];
        let picked = pick_last_deliverable_payload(&payloads).unwrap();
        assert_eq!(picked.media_urls, vec!["https://img/1.png".to_string()]);

        assert_eq!(pick_last_non_empty_text_from_payloads(&payloads), Some("first"));
        assert!(pick_last_deliverable_payload(&[internal("x")]).is_none());
    }

    #[test]
    fn channel_data_is_deliverable() {
        let payloads = vec![Payload {
            channel_data: Some(serde_json::json!({"embed": {"title": "t"}})),
            ..Default::default()
        }];
        assert!(pick_last_deliverable_payload(&payloads).is_some());

        let empty = vec![Payload {
            channel_data: Some(serde_json::json!({})),
            ..Default::default()
        }];
        assert!(pick_last_deliverable_payload(&empty).is_none());
    }

    #[test]
    fn summary_truncates_on_char_boundary() {
        assert_eq!(pick_summary_from_output(None), None);
        assert_eq!(pick_summary_from_output(Some("  ")), None);
        assert_eq!(pick_summary_from_output(Some(" done ")).as_deref(), Some("done"));

        let long = "é".repeat(SUMMARY_MAX_CHARS + 5);
        let summary = pick_summary_from_output(Some(&long)).unwrap();
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS + 1);
        assert!(summary.ends_with('…'));

        let payloads = vec![Payload::text("a"), Payload::text("b")];
        assert_eq!(pick_summary_from_payloads(&payloads).as_deref(), Some("b"));
    }

    #[test]
    fn heartbeat_detection() {
        let max = DEFAULT_HEARTBEAT_ACK_MAX_CHARS;
        assert!(is_heartbeat_only_response(&[], max));
        assert!(is_heartbeat_only_response(&[Payload::text("HEARTBEAT_OK")], max));
        assert!(is_heartbeat_only_response(&[Payload::text("**HEARTBEAT_OK**")], max));
        assert!(is_heartbeat_only_response(
            &[Payload::text("HEARTBEAT_OK all quiet"), Payload::text("")],
            max
        ));

        assert!(!is_heartbeat_only_response(&[Payload::text("Deploy finished")], max));
        let chatty = format!("HEARTBEAT_OK {}", "x".repeat(max + 1));
        assert!(!is_heartbeat_only_response(&[Payload::text(chatty)], max));
        let with_media = Payload {
            media_urls: vec!["https://img/chart.png".into()],
            ..Payload::text("HEARTBEAT_OK")
        };
        assert!(!is_heartbeat_only_response(&[with_media], max));
    }

    #[test]
    fn heartbeat_ignores_internal_chatter() {
        let max = DEFAULT_HEARTBEAT_ACK_MAX_CHARS;
        let payloads = vec![
            internal("checking alerts..."),
            Payload {
                is_error: true,
                ..Payload::text("tool timed out")
            },
            Payload::text("HEARTBEAT_OK"),
        ];
        assert!(is_heartbeat_only_response(&payloads, max));
        assert!(is_heartbeat_only_response(&[internal("nothing to report")], max));
    }

    #[test]
    fn channel_data_is_not_a_heartbeat() {
        let card = Payload {
            channel_data: Some(serde_json::json!({"embed": {"title": "Deploy report"}})),
            ..Default::default()
        };
        assert!(!is_heartbeat_only_response(&[card], DEFAULT_HEARTBEAT_ACK_MAX_CHARS));

        let empty_data = Payload {
            channel_data: Some(serde_json::json!({})),
            ..Payload::text("HEARTBEAT_OK")
        };
        assert!(is_heartbeat_only_response(&[empty_data], DEFAULT_HEARTBEAT_ACK_MAX_CHARS));
    }
}
