//! Sender address parsing and the operator's owned-address set.

use std::collections::HashSet;

use mail_parser::MessageParser;

use crate::store::normalize_email;

/// Extract the bare, normalized email from a `From`-style header value.
///
/// The value is run through the RFC 5322 address parser, so display names,
/// quoted names, trailing comments and encoded words all resolve:
/// `"Jane Doe <Jane@X.com>"` and `"jane@x.com (Jane Doe)"` both give
/// `"jane@x.com"`. Returns `None` when nothing address-like is present.
pub fn parse_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let header = format!("From: {}\r\n\r\n", raw.replace(['\r', '\n'], " "));
    let parsed = MessageParser::default().parse(header.as_bytes())?;
    let address = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())?;

    let email = normalize_email(address);
    if !email.contains('@') || email.contains(char::is_whitespace) {
        return None;
    }
    Some(email)
}

/// Addresses the operator sends from. Membership is exact equality on the
/// normalized email, never a substring test.
#[derive(Debug, Clone, Default)]
pub struct OwnedAddresses {
    primary: Option<String>,
    all: HashSet<String>,
}

impl OwnedAddresses {
    /// Build from raw addresses. The first valid one becomes the primary
    /// (the `From` used for outbound mail).
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut primary = None;
        let mut all = HashSet::new();
        for addr in addresses {
            if let Some(email) = parse_address(addr.as_ref()) {
                if primary.is_none() {
                    primary = Some(email.clone());
                }
                all.insert(email);
            }
        }
        Self { primary, all }
    }

    /// Whether a raw sender header belongs to the operator.
    pub fn contains(&self, raw_sender: &str) -> bool {
        parse_address(raw_sender).is_some_and(|email| self.all.contains(&email))
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}
