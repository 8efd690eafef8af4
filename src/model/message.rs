//! Protocol message types and the fulfillment rules between them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Constraint, When};

/// Label of the synthetic capability announcing willingness to be called back.
pub const CALLBACK_LABEL: &str = "callback";

/// Hex characters kept from the content digest.
const TOKEN_LEN: usize = 32;

/// Derive a stable token from the schema-relevant content of a message.
fn derive_token<'a>(
    kind: &str,
    label: &str,
    when: &When,
    parameters: impl Iterator<Item = (&'a String, String)>,
    results: &[String],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0]);
    hasher.update(label.as_bytes());
    hasher.update([0]);
    hasher.update(when.to_string().as_bytes());
    for (name, value) in parameters {
        hasher.update([1]);
        hasher.update(name.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
    }
    for column in results {
        hasher.update([2]);
        hasher.update(column.as_bytes());
    }
    let mut token = hex::encode(hasher.finalize());
    token.truncate(TOKEN_LEN);
    token
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// An advertised, parameterizable measurement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Unique label within one scheduler.
    pub label: String,
    /// Explicit token; derived from content when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Temporal-window template.
    #[serde(default)]
    pub when: When,
    /// Parameter schema: element name to accepted values.
    #[serde(default)]
    pub parameters: BTreeMap<String, Constraint>,
    /// Result column element names.
    #[serde(default)]
    pub results: Vec<String>,
    /// Where specifications for this capability should be sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Free-form descriptive metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Capability {
    /// New capability with an open `now ... future` window and empty schema.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: None,
            when: When::now_to_future(),
            parameters: BTreeMap::new(),
            results: Vec::new(),
            link: None,
            metadata: BTreeMap::new(),
        }
    }

    /// The synthetic capability announcing that this component accepts
    /// future specifications by callback.
    #[must_use]
    pub fn callback(when: When) -> Self {
        Self::new(CALLBACK_LABEL).with_when(when)
    }

    /// Replace the window template.
    #[must_use]
    pub fn with_when(mut self, when: When) -> Self {
        self.when = when;
        self
    }

    /// Declare a parameter and its constraint.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.parameters.insert(name.into(), constraint);
        self
    }

    /// Declare a result column.
    #[must_use]
    pub fn with_result(mut self, column: impl Into<String>) -> Self {
        self.results.push(column.into());
        self
    }

    /// Set the advertisement link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Token of this capability.
    #[must_use]
    pub fn token(&self) -> String {
        self.token.clone().unwrap_or_else(|| {
            derive_token(
                "capability",
                &self.label,
                &self.when,
                self.parameters.iter().map(|(k, v)| (k, v.to_string())),
                &self.results,
            )
        })
    }
}

/// A concrete request instantiating a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    /// Label of the capability being instantiated.
    pub label: String,
    /// Explicit token; derived from content when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Requested temporal window.
    pub when: When,
    /// Concrete parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Requested result columns.
    #[serde(default)]
    pub results: Vec<String>,
    /// Delivery URL for receipts and results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Specification {
    /// Start a specification from a capability template with the given
    /// window; parameters are filled in with [`Self::with_parameter`].
    #[must_use]
    pub fn from_capability(capability: &Capability, when: When) -> Self {
        Self {
            label: capability.label.clone(),
            token: None,
            when,
            parameters: BTreeMap::new(),
            results: capability.results.clone(),
            link: None,
        }
    }

    /// Set one parameter value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Set an explicit token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the delivery link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Token correlating this specification with its receipt and result.
    #[must_use]
    pub fn token(&self) -> String {
        self.token.clone().unwrap_or_else(|| {
            derive_token(
                "specification",
                &self.label,
                &self.when,
                self.parameters.iter().map(|(k, v)| (k, v.clone())),
                &self.results,
            )
        })
    }

    /// Whether this specification fulfills `capability` right now.
    #[must_use]
    pub fn fulfills(&self, capability: &Capability) -> bool {
        self.fulfills_at(capability, Utc::now())
    }

    /// Whether this specification fulfills `capability`, with relative
    /// window terms evaluated at `now`.
    ///
    /// Labels must match, parameter names and result columns must equal the
    /// capability's schema, every value must satisfy its constraint and the
    /// window must lie inside the capability's template.
    #[must_use]
    pub fn fulfills_at(&self, capability: &Capability, now: DateTime<Utc>) -> bool {
        self.label == capability.label
            && self.parameters.len() == capability.parameters.len()
            && self.parameters.iter().all(|(name, value)| {
                capability
                    .parameters
                    .get(name)
                    .is_some_and(|constraint| constraint.accepts(value))
            })
            && same_columns(&self.results, &capability.results)
            && self.when.contained_in_at(&capability.when, now)
    }
}

/// Immediate acknowledgment of an accepted specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Label of the specification.
    pub label: String,
    /// Token to redeem.
    pub token: String,
    /// Window of the specification.
    pub when: When,
}

impl Receipt {
    /// Receipt acknowledging `specification`.
    #[must_use]
    pub fn for_specification(specification: &Specification) -> Self {
        Self {
            label: specification.label.clone(),
            token: specification.token(),
            when: specification.when.clone(),
        }
    }
}

/// Terminal successful output of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Label of the specification.
    pub label: String,
    /// Token of the specification.
    pub token: String,
    /// Window actually measured.
    pub when: When,
    /// Parameter values the measurement ran with.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Result column names.
    #[serde(default)]
    pub results: Vec<String>,
    /// Result rows, one value per column.
    #[serde(default)]
    pub resultvalues: Vec<Vec<serde_json::Value>>,
}

impl MeasurementResult {
    /// Empty result for `specification`, carrying its columns.
    #[must_use]
    pub fn for_specification(specification: &Specification) -> Self {
        Self {
            label: specification.label.clone(),
            token: specification.token(),
            when: specification.when.clone(),
            parameters: specification.parameters.clone(),
            results: specification.results.clone(),
            resultvalues: Vec::new(),
        }
    }

    /// Append one result row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<serde_json::Value>) -> Self {
        self.resultvalues.push(row);
        self
    }
}

/// Terminal failure output with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    /// Token the failure refers to.
    pub token: String,
    /// Label the failure refers to, when known.
    #[serde(default)]
    pub label: String,
    /// Human-readable reason.
    pub message: String,
}

impl Exception {
    /// Exception for `token` with a reason.
    #[must_use]
    pub fn new(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            label: String::new(),
            message: message.into(),
        }
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Retraction of a previously advertised capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Withdrawal {
    capability: Capability,
}

impl Withdrawal {
    /// Withdraw `capability`.
    #[must_use]
    pub const fn of(capability: Capability) -> Self {
        Self { capability }
    }

    /// The withdrawn capability.
    #[must_use]
    pub const fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Whether `specification` would have fulfilled the withdrawn capability.
    #[must_use]
    pub fn matches(&self, specification: &Specification) -> bool {
        specification.fulfills(&self.capability)
    }
}

/// Request to cancel the job identified by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Token of the job to interrupt.
    pub token: String,
    /// Label of the job, when known.
    #[serde(default)]
    pub label: String,
}

impl Interrupt {
    /// Interrupt the job for `token`.
    #[must_use]
    pub fn for_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            label: String::new(),
        }
    }
}

/// Ordered batch of messages exchanged at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Token of the envelope itself.
    #[serde(default)]
    pub token: String,
    /// Contained messages in order.
    #[serde(default)]
    pub contents: Vec<Message>,
}

impl Envelope {
    /// Empty envelope with a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: uuid::Uuid::new_v4().simple().to_string(),
            contents: Vec::new(),
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.contents.push(message);
    }

    /// Directly contained messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.contents
    }

    /// All contained messages in order, nested envelopes expanded in place.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Message> {
        let mut out = Vec::with_capacity(self.contents.len());
        for message in &self.contents {
            match message {
                Message::Envelope(inner) => out.extend(inner.flatten()),
                other => out.push(other),
            }
        }
        out
    }

    /// Number of directly contained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether the envelope is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Message> for Envelope {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        let mut envelope = Self::new();
        envelope.contents.extend(iter);
        envelope
    }
}

/// Discriminator of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`Capability`].
    Capability,
    /// [`Specification`].
    Specification,
    /// [`Receipt`].
    Receipt,
    /// [`MeasurementResult`].
    Result,
    /// [`Exception`].
    Exception,
    /// [`Withdrawal`].
    Withdrawal,
    /// [`Interrupt`].
    Interrupt,
    /// [`Envelope`].
    Envelope,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Capability => "capability",
            Self::Specification => "specification",
            Self::Receipt => "receipt",
            Self::Result => "result",
            Self::Exception => "exception",
            Self::Withdrawal => "withdrawal",
            Self::Interrupt => "interrupt",
            Self::Envelope => "envelope",
        })
    }
}

/// Any protocol message. On the wire the variant name is the single key of
/// the outer object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    /// Advertised service.
    Capability(Capability),
    /// Concrete request.
    Specification(Specification),
    /// Acknowledgment pending completion.
    Receipt(Receipt),
    /// Successful output.
    Result(MeasurementResult),
    /// Failure output.
    Exception(Exception),
    /// Retracted service.
    Withdrawal(Withdrawal),
    /// Cancellation request.
    Interrupt(Interrupt),
    /// Batch of messages.
    Envelope(Envelope),
}

impl Message {
    /// Which variant this is.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Capability(_) => MessageKind::Capability,
            Self::Specification(_) => MessageKind::Specification,
            Self::Receipt(_) => MessageKind::Receipt,
            Self::Result(_) => MessageKind::Result,
            Self::Exception(_) => MessageKind::Exception,
            Self::Withdrawal(_) => MessageKind::Withdrawal,
            Self::Interrupt(_) => MessageKind::Interrupt,
            Self::Envelope(_) => MessageKind::Envelope,
        }
    }

    /// Label of the message. Envelopes report their first message's label.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Capability(m) => &m.label,
            Self::Specification(m) => &m.label,
            Self::Receipt(m) => &m.label,
            Self::Result(m) => &m.label,
            Self::Exception(m) => &m.label,
            Self::Withdrawal(m) => &m.capability.label,
            Self::Interrupt(m) => &m.label,
            Self::Envelope(m) => m.contents.first().map_or("", Self::label),
        }
    }

    /// Correlation token.
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::Capability(m) => m.token(),
            Self::Specification(m) => m.token(),
            Self::Receipt(m) => m.token.clone(),
            Self::Result(m) => m.token.clone(),
            Self::Exception(m) => m.token.clone(),
            Self::Withdrawal(m) => m.capability.token(),
            Self::Interrupt(m) => m.token.clone(),
            Self::Envelope(m) => m.token.clone(),
        }
    }

    /// Temporal window, for kinds that carry one.
    #[must_use]
    pub const fn when(&self) -> Option<&When> {
        match self {
            Self::Capability(m) => Some(&m.when),
            Self::Specification(m) => Some(&m.when),
            Self::Receipt(m) => Some(&m.when),
            Self::Result(m) => Some(&m.when),
            Self::Withdrawal(m) => Some(&m.capability.when),
            Self::Exception(_) | Self::Interrupt(_) | Self::Envelope(_) => None,
        }
    }

    /// Whether this is a terminal job output.
    #[must_use]
    pub const fn is_terminal_reply(&self) -> bool {
        matches!(self, Self::Result(_) | Self::Exception(_) | Self::Envelope(_))
    }
}

impl From<Capability> for Message {
    fn from(m: Capability) -> Self {
        Self::Capability(m)
    }
}

impl From<Specification> for Message {
    fn from(m: Specification) -> Self {
        Self::Specification(m)
    }
}

impl From<Receipt> for Message {
    fn from(m: Receipt) -> Self {
        Self::Receipt(m)
    }
}

impl From<MeasurementResult> for Message {
    fn from(m: MeasurementResult) -> Self {
        Self::Result(m)
    }
}

impl From<Exception> for Message {
    fn from(m: Exception) -> Self {
        Self::Exception(m)
    }
}

impl From<Withdrawal> for Message {
    fn from(m: Withdrawal) -> Self {
        Self::Withdrawal(m)
    }
}

impl From<Interrupt> for Message {
    fn from(m: Interrupt) -> Self {
        Self::Interrupt(m)
    }
}

impl From<Envelope> for Message {
    fn from(m: Envelope) -> Self {
        Self::Envelope(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> Capability {
        Capability::new("ping-test")
            .with_parameter("destination.ip4", "10.0.0.0 ... 10.0.0.255".parse().unwrap())
            .with_parameter("count", "1 ... 100".parse().unwrap())
            .with_result("delay.twoway.icmp.us")
    }

    fn ping_spec(when: &str) -> Specification {
        Specification::from_capability(&ping(), when.parse().unwrap())
            .with_parameter("destination.ip4", "10.0.0.1")
            .with_parameter("count", "5")
    }

    #[test]
    fn test_fulfills_instantiated_capability() {
        let spec = ping_spec("now + 0s ... now + 5s");
        assert!(spec.fulfills(&ping()));
    }

    #[test]
    fn test_label_change_breaks_fulfillment() {
        let mut spec = ping_spec("now ... now + 5s");
        spec.label = "ping-other".into();
        assert!(!spec.fulfills(&ping()));
    }

    #[test]
    fn test_schema_mismatch_breaks_fulfillment() {
        let missing = Specification::from_capability(&ping(), "now ... now + 5s".parse().unwrap())
            .with_parameter("destination.ip4", "10.0.0.1");
        assert!(!missing.fulfills(&ping()));

        let out_of_range = ping_spec("now ... now + 5s").with_parameter("count", "1000");
        assert!(!out_of_range.fulfills(&ping()));

        let mut extra_column = ping_spec("now ... now + 5s");
        extra_column.results.push("packets.lost".into());
        assert!(!extra_column.fulfills(&ping()));
    }

    #[test]
    fn test_window_outside_template() {
        let cap = ping().with_when("now ... now + 1m".parse().unwrap());
        assert!(ping_spec("now ... now + 30s").fulfills(&cap));
        assert!(!ping_spec("now ... now + 2m").fulfills(&cap));
        assert!(!ping_spec("now ... future").fulfills(&cap));
    }

    #[test]
    fn test_token_is_content_derived() {
        let a = ping_spec("now ... now + 5s");
        let b = ping_spec("now ... now + 5s");
        let c = ping_spec("now ... now + 6s");
        assert_eq!(a.token(), b.token());
        assert_ne!(a.token(), c.token());
        assert_eq!(a.token().len(), TOKEN_LEN);
        assert_eq!(a.clone().with_token("K").token(), "K");
    }

    #[test]
    fn test_receipt_and_result_share_token() {
        let spec = ping_spec("now ... now + 5s").with_token("K");
        assert_eq!(Receipt::for_specification(&spec).token, "K");
        let result = MeasurementResult::for_specification(&spec).with_row(vec![1200.into()]);
        assert_eq!(result.token, "K");
        assert_eq!(result.results, vec!["delay.twoway.icmp.us".to_string()]);
    }

    #[test]
    fn test_withdrawal_matches_like_capability() {
        let withdrawal = Withdrawal::of(ping());
        assert!(withdrawal.matches(&ping_spec("now ... now + 5s")));
        assert_eq!(Message::from(withdrawal).label(), "ping-test");
    }

    #[test]
    fn test_envelope_flatten_keeps_order() {
        let inner: Envelope = vec![
            Message::from(Interrupt::for_token("b")),
            Message::from(Interrupt::for_token("c")),
        ]
        .into_iter()
        .collect();
        let outer: Envelope = vec![
            Message::from(Interrupt::for_token("a")),
            Message::from(inner),
            Message::from(Interrupt::for_token("d")),
        ]
        .into_iter()
        .collect();

        let tokens: Vec<String> = outer.flatten().iter().map(|m| m.token()).collect();
        assert_eq!(tokens, vec!["a", "b", "c", "d"]);
        assert_eq!(outer.len(), 3);
    }

    #[test]
    fn test_message_accessors() {
        let spec = ping_spec("now ... now + 5s");
        let msg = Message::from(spec.clone());
        assert_eq!(msg.kind(), MessageKind::Specification);
        assert_eq!(msg.label(), "ping-test");
        assert_eq!(msg.token(), spec.token());
        assert!(msg.when().is_some());
        assert!(!msg.is_terminal_reply());
        assert!(Message::from(Exception::new("t", "boom")).when().is_none());
    }
}
