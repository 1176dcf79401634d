// SPDX-License-Identifier: MIT

//! Deterministic repairs, applied in order: strip banned characters,
//! ensure the greeting, ensure the sign-off.

use super::{ContentContract, EmailDraft, Violation};
use crate::outreach::research::CompanyFacts;

/// Double quotation marks in their ASCII and typographic forms
pub const QUOTE_CHARS: &[char] = &['"', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}'];

/// Closing phrases recognized as the start of a sign-off, compared
/// case-insensitively with the trailing comma removed
const CLOSINGS: &[&str] = &[
    "best regards",
    "kind regards",
    "warm regards",
    "warmest regards",
    "regards",
    "sincerely",
    "best",
    "best wishes",
    "all the best",
    "thanks",
    "thank you",
    "many thanks",
    "cheers",
];

/// How many non-empty lines may follow a closing phrase (name, title)
const MAX_TRAILER_LINES: usize = 2;

pub fn is_quote(c: char) -> bool {
    QUOTE_CHARS.contains(&c)
}

/// Remove every quotation mark
pub fn strip_quotes(text: &str) -> String {
    text.chars().filter(|c| !is_quote(*c)).collect()
}

/// Remove quotation marks, turn exclamations into full stops and normalize
/// line endings. A run of `!` becomes one `.`, or nothing when it already
/// follows sentence punctuation.
pub fn strip_banned(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());

    for c in normalized.chars() {
        if is_quote(c) {
            continue;
        }
        if c == '!' {
            match out.chars().last() {
                Some(prev) if !matches!(prev, '.' | '?' | ',' | ';' | ':') && !prev.is_whitespace() => {
                    out.push('.')
                }
                _ => {}
            }
            continue;
        }
        out.push(c);
    }

    out
}

/// Prepend the canonical greeting line unless the body already opens with it
pub fn ensure_greeting(body: &str, contract: &ContentContract) -> String {
    let greeting = contract.greeting();
    let body = body.trim_start();

    if body.starts_with(&greeting) {
        body.to_string()
    } else if body.is_empty() {
        greeting
    } else {
        format!("{}\n\n{}", greeting, body)
    }
}

/// Make the body end with the canonical sign-off.
///
/// A trailing closing phrase with no name, or with the configured sender
/// in the wrong layout, is removed before the canonical block is appended.
/// A closing followed by somebody else's name is reported as
/// [`Violation::ForeignSender`] rather than rewritten.
pub fn ensure_sign_off(body: &str, contract: &ContentContract) -> Result<String, Violation> {
    let sign_off = contract.sign_off();
    let body = body.trim_end();

    if body.ends_with(&sign_off) {
        return Ok(body.to_string());
    }

    let lines: Vec<&str> = body.lines().collect();
    let content: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i)
        .collect();

    let mut cut = lines.len();
    let last = content.last().copied();

    // Look for a closing among the final lines, nearest the end wins
    let window_start = content.len().saturating_sub(MAX_TRAILER_LINES + 1);
    let closing_at = content[window_start..]
        .iter()
        .rev()
        .copied()
        .find(|&i| is_closing(lines[i], contract));

    if let Some(last) = last.filter(|&i| is_inline_sign_off(lines[i], contract)) {
        cut = last;
    } else if let Some(closing_idx) = closing_at {
        let trailer: Vec<&str> = content
            .iter()
            .filter(|&&i| i > closing_idx)
            .map(|&i| lines[i].trim())
            .collect();

        match trailer.first() {
            None => cut = closing_idx,
            Some(name) if is_sender(name, contract) => cut = closing_idx,
            Some(name) if trailer.iter().all(|l| is_name_like(l)) => {
                return Err(Violation::ForeignSender {
                    found: name.to_string(),
                });
            }
            Some(_) => {}
        }
    } else if let Some(last) = last {
        if is_sender(lines[last], contract) {
            cut = last;
        }
    }

    let base = lines[..cut].join("\n");
    let base = base.trim_end();

    if base.is_empty() {
        Ok(sign_off)
    } else {
        Ok(format!("{}\n\n{}", base, sign_off))
    }
}

fn normalize_closing(text: &str) -> String {
    text.trim().trim_end_matches(',').trim_end().to_lowercase()
}

/// A known closing phrase or the configured one
fn is_closing(line: &str, contract: &ContentContract) -> bool {
    let normalized = normalize_closing(line);
    !normalized.is_empty()
        && (CLOSINGS.contains(&normalized.as_str())
            || normalized == normalize_closing(&contract.closing))
}

fn is_sender(line: &str, contract: &ContentContract) -> bool {
    line.trim().eq_ignore_ascii_case(&contract.sender_name)
}

/// Closing and configured sender on one line, e.g. `Best regards, Jordan Lee`
fn is_inline_sign_off(line: &str, contract: &ContentContract) -> bool {
    let line = line.trim();
    let sender = contract.sender_name.as_str();
    if sender.is_empty() || line.len() <= sender.len() {
        return false;
    }

    let split = line.len() - sender.len();
    if !line.is_char_boundary(split) || !line[split..].eq_ignore_ascii_case(sender) {
        return false;
    }
    let head = &line[..split];
    head.ends_with([',', ' ', '\t']) && is_closing(head, contract)
}

/// Short line without sentence punctuation at the end
fn is_name_like(line: &str) -> bool {
    let words = line.split_whitespace().count();
    (1..=5).contains(&words) && !line.ends_with(['.', '?', ':', ';'])
}

/// Deterministic draft built only from research facts
pub fn canned_draft(facts: &CompanyFacts, contract: &ContentContract) -> EmailDraft {
    let name = &contract.company_name;
    let industry = strip_banned(facts.industry.trim());
    let industry = if industry.trim().is_empty() {
        "technology".to_string()
    } else {
        industry.trim().replace('\n', " ")
    };

    let body = format!(
        "{greeting}\n\n\
         I have been following the progress {name} has made in the {industry} sector and wanted \
         to reach out about a possible collaboration.\n\n\
         We help companies put AI and automation to work on the operational side of the \
         business, with measurable gains in efficiency and the ability to scale without adding \
         overhead. Given where {name} stands in its market today, there may be real strategic \
         value in looking at how these capabilities could support your growth plans.\n\n\
         Would you be open to a short conversation to explore this further?\n\n\
         {sign_off}",
        greeting = contract.greeting(),
        name = name,
        industry = industry,
        sign_off = contract.sign_off(),
    );

    EmailDraft {
        subject: format!("Strategic Partnership Discussion - {}", name),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> ContentContract {
        ContentContract::new("Acme", "Jordan Lee", "Best regards,")
    }

    #[test]
    fn test_strip_quotes_removes_all_forms() {
        assert_eq!(
            strip_quotes("\"Scale\" \u{201C}faster\u{201D} \u{00AB}now\u{00BB}"),
            "Scale faster now"
        );
        assert_eq!(strip_quotes("Acme's team"), "Acme's team");
    }

    #[test]
    fn test_strip_banned_exclamations() {
        assert_eq!(strip_banned("Great news! We grew"), "Great news. We grew");
        assert_eq!(strip_banned("Wow!!!"), "Wow.");
        assert_eq!(strip_banned("Really?!"), "Really?");
        assert_eq!(strip_banned("!Start"), "Start");
        assert_eq!(strip_banned("line\r\nnext"), "line\nnext");
    }

    #[test]
    fn test_ensure_greeting_prepends_when_missing() {
        let out = ensure_greeting("Hello there,\n\nText", &contract());
        assert_eq!(out, "Hi Acme,\n\nHello there,\n\nText");
    }

    #[test]
    fn test_ensure_greeting_keeps_existing() {
        let body = "Hi Acme,\n\nText";
        assert_eq!(ensure_greeting(body, &contract()), body);
    }

    #[test]
    fn test_ensure_greeting_is_exact() {
        let out = ensure_greeting("Hi Acme Corp,\n\nText", &contract());
        assert!(out.starts_with("Hi Acme,\n\nHi Acme Corp,"));
    }

    #[test]
    fn test_ensure_sign_off_appends() {
        let out = ensure_sign_off("Hi Acme,\n\nText.", &contract()).unwrap();
        assert_eq!(out, "Hi Acme,\n\nText.\n\nBest regards,\n\nJordan Lee");
    }

    #[test]
    fn test_ensure_sign_off_keeps_canonical() {
        let body = "Hi Acme,\n\nText.\n\nBest regards,\n\nJordan Lee\n";
        let out = ensure_sign_off(body, &contract()).unwrap();
        assert_eq!(out, body.trim_end());
    }

    #[test]
    fn test_ensure_sign_off_replaces_bare_closing() {
        for closing in ["Regards,", "Kind regards,", "best regards", "Thanks,"] {
            let body = format!("Hi Acme,\n\nText.\n\n{}", closing);
            let out = ensure_sign_off(&body, &contract()).unwrap();
            assert_eq!(out, "Hi Acme,\n\nText.\n\nBest regards,\n\nJordan Lee");
        }
    }

    #[test]
    fn test_ensure_sign_off_fixes_layout_for_configured_sender() {
        let body = "Hi Acme,\n\nText.\n\nKind regards,\njordan lee";
        let out = ensure_sign_off(body, &contract()).unwrap();
        assert_eq!(out, "Hi Acme,\n\nText.\n\nBest regards,\n\nJordan Lee");

        let body = "Hi Acme,\n\nText.\n\nJordan Lee";
        let out = ensure_sign_off(body, &contract()).unwrap();
        assert_eq!(out, "Hi Acme,\n\nText.\n\nBest regards,\n\nJordan Lee");
    }

    #[test]
    fn test_ensure_sign_off_rejects_foreign_sender() {
        let body = "Hi Acme,\n\nText.\n\nBest regards,\n\nSam Smith\nHead of Sales";
        let err = ensure_sign_off(body, &contract()).unwrap_err();
        assert_eq!(
            err,
            Violation::ForeignSender {
                found: "Sam Smith".to_string()
            }
        );
    }

    #[test]
    fn test_closing_word_inside_paragraph_is_not_a_sign_off() {
        let body = "Hi Acme,\n\nThanks,\nfor reading this long note about what we can do together.";
        let out = ensure_sign_off(body, &contract()).unwrap();
        assert!(out.starts_with(body));
        assert!(out.ends_with(&contract().sign_off()));
    }

    #[test]
    fn test_canned_draft_shape() {
        let facts = CompanyFacts::synthesized("acme.io");
        let draft = canned_draft(&facts, &contract());
        assert!(draft.body.starts_with("Hi Acme,\n\n"));
        assert!(draft.body.ends_with("Best regards,\n\nJordan Lee"));
        assert!(draft.body.contains("Technology sector"));
        assert_eq!(draft.subject, "Strategic Partnership Discussion - Acme");
    }

    #[test]
    fn test_canned_draft_defaults_and_sanitizes_industry() {
        let mut facts = CompanyFacts::synthesized("acme.io");
        facts.industry = String::new();
        let draft = canned_draft(&facts, &contract());
        assert!(draft.body.contains("technology sector"));

        facts.industry = "\"Rockets\"!".to_string();
        let draft = canned_draft(&facts, &contract());
        assert!(draft.body.contains("Rockets. sector"));
        assert!(!draft.body.contains('"'));
        assert!(!draft.body.contains('!'));
    }

    #[test]
    fn test_ensure_sign_off_replaces_closing_and_sender_on_one_line() {
        for last in ["Best regards, Jordan Lee", "Thanks, jordan lee", "Cheers Jordan Lee"] {
            let body = format!("Hi Acme,\n\nText.\n\n{}", last);
            let out = ensure_sign_off(&body, &contract()).unwrap();
            assert_eq!(out, "Hi Acme,\n\nText.\n\nBest regards,\n\nJordan Lee");
            assert_eq!(out.matches("Jordan Lee").count(), 1);
        }
    }

    #[test]
    fn test_ensure_sign_off_recognizes_configured_closing() {
        let warm = ContentContract::new("Acme", "Jordan Lee", "Warmly,");

        let out = ensure_sign_off("Hi Acme,\n\nText.\n\nWarmly,", &warm).unwrap();
        assert_eq!(out, "Hi Acme,\n\nText.\n\nWarmly,\n\nJordan Lee");

        let out = ensure_sign_off("Hi Acme,\n\nText.\n\nWarmly, Jordan Lee", &warm).unwrap();
        assert_eq!(out, "Hi Acme,\n\nText.\n\nWarmly,\n\nJordan Lee");

        let out = ensure_sign_off("Hi Acme,\n\nText.\n\nWarmly,\nJordan Lee", &warm).unwrap();
        assert_eq!(out.matches("Warmly,").count(), 1);
    }

    #[test]
    fn test_sender_name_inside_a_sentence_is_kept() {
        let body = "Hi Acme,\n\nI am writing on behalf of Jordan Lee";
        let out = ensure_sign_off(body, &contract()).unwrap();
        assert!(out.starts_with(body));
        assert!(out.ends_with("\n\nBest regards,\n\nJordan Lee"));
    }
}
