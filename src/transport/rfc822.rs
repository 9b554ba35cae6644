//! Outbound RFC 822 document construction.

use lettre::{Address, Message};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;

use crate::error::TransportError;
use crate::transport::{MailMessage, RawEmail};

/// Everything needed to render one outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail<'a> {
    pub from_name: Option<&'a str>,
    pub from_address: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub in_reply_to: Option<&'a str>,
    pub references: Option<&'a str>,
}

impl<'a> OutboundEmail<'a> {
    /// A reply to `trigger`, threaded via In-Reply-To/References.
    ///
    /// `references` must outlive the email; build it with [`reply_references`].
    pub fn reply(
        trigger: &'a MailMessage,
        from_name: Option<&'a str>,
        from_address: &'a str,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
        references: Option<&'a str>,
    ) -> Self {
        Self {
            from_name,
            from_address,
            to,
            subject,
            body,
            in_reply_to: trigger.rfc822_message_id.as_deref(),
            references,
        }
    }
}

/// Render an outbound message with lettre.
pub fn build_raw_email(email: &OutboundEmail<'_>) -> Result<RawEmail, TransportError> {
    let from_addr: Address = email
        .from_address
        .parse()
        .map_err(|e| TransportError::InvalidMessage(format!("Invalid from address: {e}")))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| TransportError::InvalidMessage(format!("Invalid to address: {e}")))?;

    let mut builder = Message::builder()
        .from(Mailbox::new(email.from_name.map(str::to_string), from_addr))
        .to(to)
        .subject(email.subject)
        .header(ContentType::TEXT_PLAIN);

    if let Some(irt) = email.in_reply_to {
        builder = builder.in_reply_to(irt.to_string());
    }
    if let Some(refs) = email.references {
        builder = builder.references(refs.to_string());
    }

    let message = builder
        .body(email.body.to_string())
        .map_err(|e| TransportError::InvalidMessage(format!("Failed to build email: {e}")))?;

    Ok(RawEmail::new(message.formatted()))
}

/// Strip any stack of `Re:`/`Fwd:`/`Fw:` prefixes.
pub fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_ascii_lowercase();
        let stripped = ["re:", "fwd:", "fw:"]
            .iter()
            .find(|p| lower.starts_with(*p))
            .map(|p| s[p.len()..].trim_start());
        match stripped {
            Some(rest) => s = rest,
            None => return s.trim().to_string(),
        }
    }
}

/// Subject line for a reply: exactly one `Re:` prefix.
pub fn reply_subject(subject: &str) -> String {
    let normalized = normalize_subject(subject);
    if normalized.is_empty() {
        "Re:".to_string()
    } else {
        format!("Re: {normalized}")
    }
}

/// `References` value for a reply: the parent's chain plus its Message-ID.
pub fn reply_references(trigger: &MailMessage) -> Option<String> {
    let id = trigger.rfc822_message_id.as_deref()?;
    match trigger.references.as_deref().map(str::trim) {
        Some(chain) if !chain.is_empty() => Some(format!("{chain} {id}")),
        _ => Some(id.to_string()),
    }
}
