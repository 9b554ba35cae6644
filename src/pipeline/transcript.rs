//! Conversation history builder.
//!
//! Turns raw thread messages into a bounded, role-labelled transcript.
//! Body cleaning is a fixed, ordered rule list. Every rule is anchored at
//! the start of a trimmed, lower-cased line; nothing matches mid-line, so
//! legitimate content that merely mentions a phrase survives.

use crate::pipeline::address::OwnedAddresses;
use crate::transport::MailMessage;

/// Role label for messages sent by the operator.
pub const OPERATOR_ROLE: &str = "operator";

/// Role label for everyone else.
pub const COUNTERPARTY_ROLE: &str = "counterparty";

/// How a cleaning rule tests a line. Patterns are lower-case.
#[derive(Debug, Clone, Copy)]
enum LineMatch {
    /// Line starts with the pattern.
    Prefix(&'static str),
    /// Line equals the pattern, ignoring trailing `,` `.` `!`.
    Exact(&'static str),
    /// Line starts with the first pattern and ends with the second.
    PrefixAndSuffix(&'static str, &'static str),
}

impl LineMatch {
    fn matches(&self, line: &str) -> bool {
        match *self {
            LineMatch::Prefix(p) => line.starts_with(p),
            LineMatch::Exact(p) => line.trim_end_matches([',', '.', '!']).trim_end() == p,
            LineMatch::PrefixAndSuffix(p, s) => {
                line.len() >= p.len() + s.len() && line.starts_with(p) && line.ends_with(s)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanAction {
    /// Drop this line only.
    DropLine,
    /// Drop this line and everything after it.
    Truncate,
}

#[derive(Debug, Clone, Copy)]
struct CleanRule {
    matcher: LineMatch,
    action: CleanAction,
}

const fn rule(matcher: LineMatch, action: CleanAction) -> CleanRule {
    CleanRule { matcher, action }
}

use CleanAction::{DropLine, Truncate};
use LineMatch::{Exact, Prefix, PrefixAndSuffix};

/// Ordered cleaning rules. First match wins. Append new footer patterns here.
static CLEAN_RULES: &[CleanRule] = &[
    // Quoted reply lines.
    rule(Prefix(">"), DropLine),
    // "On Mon, Jan 1, 2026 at 10:00 AM Jane <jane@x.com> wrote:"
    rule(PrefixAndSuffix("on ", "wrote:"), Truncate),
    // Forwarded / original message headers.
    rule(Prefix("---------- forwarded message"), Truncate),
    rule(Prefix("-----original message-----"), Truncate),
    rule(Prefix("--- original message ---"), Truncate),
    rule(Prefix("begin forwarded message"), Truncate),
    // Signature delimiter ("-- ").
    rule(Exact("--"), Truncate),
    // Mobile footers.
    rule(Prefix("sent from my "), Truncate),
    rule(Prefix("get outlook for "), Truncate),
    // Sign-offs. Exact only: "Thanks, that works" must survive.
    rule(Exact("best"), Truncate),
    rule(Exact("cheers"), Truncate),
    rule(Exact("best regards"), Truncate),
    rule(Exact("kind regards"), Truncate),
    rule(Exact("warm regards"), Truncate),
    rule(Exact("warmest regards"), Truncate),
    rule(Exact("regards"), Truncate),
    rule(Exact("best wishes"), Truncate),
    rule(Exact("sincerely"), Truncate),
    rule(Exact("yours sincerely"), Truncate),
    rule(Exact("yours truly"), Truncate),
    // Legal disclaimers.
    rule(Prefix("confidentiality notice"), Truncate),
    rule(Prefix("this email and any attachments"), Truncate),
    rule(Prefix("this e-mail and any attachments"), Truncate),
    rule(Prefix("this message contains confidential"), Truncate),
    rule(Prefix("disclaimer:"), Truncate),
    // Unsubscribe links.
    rule(Prefix("unsubscribe"), DropLine),
    rule(Prefix("to unsubscribe"), DropLine),
    rule(Prefix("click here to unsubscribe"), DropLine),
    rule(Prefix("if you no longer wish to receive"), DropLine),
];

/// Strip quoted replies, forwarded blocks, signatures and footers.
pub fn clean_body(body: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    'lines: for line in body.lines() {
        let normalized = line.trim().to_lowercase();
        for rule in CLEAN_RULES {
            if rule.matcher.matches(&normalized) {
                match rule.action {
                    DropLine => continue 'lines,
                    Truncate => break 'lines,
                }
            }
        }
        kept.push(line);
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    while kept.first().is_some_and(|l| l.trim().is_empty()) {
        kept.remove(0);
    }

    kept.join("\n")
}

/// Collapse whitespace and cap at `max_chars` characters.
fn condense(text: &str, max_chars: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    joined.chars().take(max_chars).collect()
}

/// Role for a message sender.
pub fn role_for(sender: &str, owned: &OwnedAddresses) -> &'static str {
    if owned.contains(sender) {
        OPERATOR_ROLE
    } else {
        COUNTERPARTY_ROLE
    }
}

/// Build a transcript of the last `max_messages` messages, oldest first, one
/// `role: body` line per message with each body capped at
/// `body_char_budget` characters.
pub fn build_transcript(
    messages: &[MailMessage],
    owned: &OwnedAddresses,
    max_messages: usize,
    body_char_budget: usize,
) -> String {
    let start = messages.len().saturating_sub(max_messages);
    messages[start..]
        .iter()
        .map(|m| {
            let body = condense(&clean_body(&m.body), body_char_budget);
            let body = if body.is_empty() { "(no text)".to_string() } else { body };
            format!("{}: {}", role_for(&m.from, owned), body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
