//! Prompt construction for negotiation replies, cold outreach and deal
//! extraction.

use serde_json::{Value, json};

/// Literal the negotiation model emits when the thread should be dropped.
pub const IGNORE_SENTINEL: &str = "IGNORE";

/// Fixed negotiation policy: who we are and how replies must read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationPolicy {
    pub persona_name: String,
    pub company: String,
    /// ISO currency code the flat rate should be quoted in.
    pub currency: String,
    /// The only two closings a message may end with.
    pub sign_offs: [String; 2],
    pub sentinel: String,
}

impl NegotiationPolicy {
    pub fn new(
        persona_name: impl Into<String>,
        company: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            persona_name: persona_name.into(),
            company: company.into(),
            currency: currency.into(),
            sign_offs: ["Best,".to_string(), "Cheers,".to_string()],
            sentinel: IGNORE_SENTINEL.to_string(),
        }
    }

    pub fn with_sign_offs(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.sign_offs = [first.into(), second.into()];
        self
    }

    fn sign_off_rule(&self) -> String {
        format!(
            "End every message with exactly one of these two closings, followed by a new line and \"{name}\":\n\
             - {a}\n\
             - {b}\n\
             Never use any other closing.",
            name = self.persona_name,
            a = self.sign_offs[0],
            b = self.sign_offs[1],
        )
    }
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self::new("Alex", "our brand", "USD")
    }
}

// ── Negotiation reply ───────────────────────────────────────────────

/// System prompt for negotiation replies.
pub fn negotiation_system_prompt(policy: &NegotiationPolicy) -> String {
    format!(
        "You are {name}, a partnerships manager at {company}, negotiating a paid collaboration \
         with a content creator over email. Write like a busy, friendly human: short sentences, \
         warm but direct, no marketing fluff, no emojis.\n\n\
         You have exactly two goals:\n\
         1. Get a single flat-rate price for the collaboration, in {currency}.\n\
         2. Get a contact phone number including the international dialing code (e.g. +1 ...).\n\n\
         Pick the branch that matches the latest creator message:\n\
         - They gave only one of the two (rate or phone): thank them and ask for the missing one.\n\
         - They gave a price range or several options: ask for one flat number in {currency}.\n\
         - They gave both a flat rate and a phone number: thank them warmly and say the team \
         will follow up shortly. Ask nothing further.\n\
         - They asked a question: answer briefly, then steer back to whatever is still missing.\n\
         - They have declined, ignored, or deflected our asks at least twice, or said they are \
         not interested: reply with exactly {sentinel} and nothing else.\n\n\
         Hard rules:\n\
         - Never propose or agree to a call, meeting, or video chat. Keep everything on email.\n\
         - Never invent numbers, budgets, or deliverables that are not in the conversation.\n\
         - Keep the reply under 120 words.\n\
         - Output only the email body. No subject line, no commentary.\n\
         {sign_off}",
        name = policy.persona_name,
        company = policy.company,
        currency = policy.currency,
        sentinel = policy.sentinel,
        sign_off = policy.sign_off_rule(),
    )
}

/// User turn for negotiation replies.
pub fn negotiation_user_prompt(transcript: &str) -> String {
    format!(
        "Conversation so far (oldest first; \"operator\" is you, \"counterparty\" is the creator):\n\n\
         {transcript}\n\n\
         Draft a brief reply to the counterparty's latest message."
    )
}

// ── Cold outreach ───────────────────────────────────────────────────

/// System prompt for first-contact messages.
pub fn outreach_system_prompt(policy: &NegotiationPolicy) -> String {
    format!(
        "You are {name}, a partnerships manager at {company}, writing a first-contact email to a \
         content creator you would like to work with on a paid collaboration.\n\n\
         Template to adapt:\n\
         - A greeting that fits the recipient (use their name if the address suggests one, \
         otherwise a neutral \"Hi there\").\n\
         - One sentence on why their content caught our eye.\n\
         - One sentence proposing a paid collaboration with {company}.\n\
         - Ask for their flat rate in {currency} and the best phone number to reach them.\n\n\
         Rules:\n\
         - Under 100 words. Plain text only.\n\
         - Never propose a call or meeting.\n\
         - First line must be \"Subject: <short subject>\", then a blank line, then the body.\n\
         {sign_off}",
        name = policy.persona_name,
        company = policy.company,
        currency = policy.currency,
        sign_off = policy.sign_off_rule(),
    )
}

/// User turn for first-contact messages.
pub fn outreach_user_prompt(recipient: &str) -> String {
    format!("Write the first outreach email to {recipient}.")
}

// ── Deal extraction ─────────────────────────────────────────────────

/// System prompt for structured deal extraction.
pub fn extraction_system_prompt() -> String {
    "You extract deal details from a single email written by a content creator.\n\n\
     Fields:\n\
     - \"phoneNumber\": a phone number the creator gave for themselves, exactly as written \
     (keep the dialing code). null if none.\n\
     - \"rate\": the price the creator quoted for the collaboration, as written including \
     currency (e.g. \"$500\", \"450 EUR\", \"$300-$500\"). null if none.\n\n\
     Only extract what the email states. Never guess."
        .to_string()
}

/// User turn for structured deal extraction.
pub fn extraction_user_prompt(body: &str) -> String {
    format!("Email:\n{body}")
}

/// JSON schema for the extraction response.
pub fn deal_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "phoneNumber": { "type": ["string", "null"] },
            "rate": { "type": ["string", "null"] }
        },
        "required": ["phoneNumber", "rate"],
        "additionalProperties": false
    })
}
