//! Element registry: the schema of parameter and result column names.
//!
//! A registry is built once at startup (core elements plus any preloaded
//! documents) and shared by `Arc` with every component that validates
//! messages. Nothing in the crate keeps a process-wide registry.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::when::parse_timestamp;
use super::{Capability, ParseError, Specification};

/// Primitive value type of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    /// Free text.
    String,
    /// Non-negative integer.
    Natural,
    /// Floating point number.
    Real,
    /// `true` or `false`.
    Boolean,
    /// Timestamp or relative time term.
    Time,
    /// IPv4 address.
    Ip4,
    /// IPv6 address.
    Ip6,
    /// Absolute URL.
    Url,
    /// IP address or host name.
    Address,
}

impl Primitive {
    /// Whether `value` is a valid literal of this type.
    #[must_use]
    pub fn accepts(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::String => true,
            Self::Natural => value.parse::<u64>().is_ok(),
            Self::Real => value.parse::<f64>().is_ok(),
            Self::Boolean => matches!(value, "true" | "false"),
            Self::Time => {
                matches!(value, "now" | "past" | "future") || parse_timestamp(value).is_ok()
            }
            Self::Ip4 => value.parse::<Ipv4Addr>().is_ok(),
            Self::Ip6 => value.parse::<Ipv6Addr>().is_ok(),
            Self::Url => value
                .split_once("://")
                .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty()),
            Self::Address => {
                value.parse::<IpAddr>().is_ok()
                    || (!value.is_empty()
                        && value
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-')))
            }
        }
    }
}

/// Built-in elements available to every registry.
const CORE_ELEMENTS: &[(&str, Primitive)] = &[
    ("start", Primitive::Time),
    ("end", Primitive::Time),
    ("time", Primitive::Time),
    ("duration.s", Primitive::Natural),
    ("period.s", Primitive::Natural),
    ("count", Primitive::Natural),
    ("source.ip4", Primitive::Ip4),
    ("source.ip6", Primitive::Ip6),
    ("source.port", Primitive::Natural),
    ("destination.ip4", Primitive::Ip4),
    ("destination.ip6", Primitive::Ip6),
    ("destination.port", Primitive::Natural),
    ("destination.address", Primitive::Address),
    ("destination.url", Primitive::Url),
    ("delay.twoway.icmp.us", Primitive::Natural),
    ("delay.twoway.icmp.us.min", Primitive::Natural),
    ("delay.twoway.icmp.us.mean", Primitive::Natural),
    ("delay.twoway.icmp.us.max", Primitive::Natural),
    ("delay.twoway.icmp.count", Primitive::Natural),
    ("packets.sent", Primitive::Natural),
    ("packets.lost", Primitive::Natural),
    ("octets.transferred", Primitive::Natural),
    ("hops.ip", Primitive::Natural),
    ("intermediate.ip4", Primitive::Ip4),
    ("bandwidth.nominal.bps", Primitive::Natural),
    ("protocol", Primitive::String),
    ("success", Primitive::Boolean),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RegistryDocument {
    #[serde(default)]
    registry_uri: Option<String>,
    elements: Vec<ElementDocument>,
}

#[derive(Debug, Deserialize)]
struct ElementDocument {
    name: String,
    prim: Primitive,
}

/// Named element definitions used to validate capability schemas and
/// specification values.
#[derive(Debug, Clone, Default)]
pub struct ElementRegistry {
    uri: Option<String>,
    elements: BTreeMap<String, Primitive>,
}

impl ElementRegistry {
    /// Registry with no elements at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in core elements.
    #[must_use]
    pub fn core() -> Self {
        let mut registry = Self::empty();
        for (name, prim) in CORE_ELEMENTS {
            registry.define(*name, *prim);
        }
        registry
    }

    /// Add or redefine one element.
    pub fn define(&mut self, name: impl Into<String>, prim: Primitive) {
        self.elements.insert(name.into(), prim);
    }

    /// Merge a registry document and return how many elements it defined.
    ///
    /// Documents look like
    /// `{"registry-uri": "...", "elements": [{"name": "x.y", "prim": "natural"}]}`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the document is not valid JSON of that shape.
    pub fn preload_json(&mut self, document: &str) -> Result<usize, ParseError> {
        let doc: RegistryDocument = serde_json::from_str(document)
            .map_err(|e| ParseError::Registry(format!("{e}")))?;
        if doc.registry_uri.is_some() {
            self.uri = doc.registry_uri;
        }
        let count = doc.elements.len();
        for element in doc.elements {
            self.define(element.name, element.prim);
        }
        Ok(count)
    }

    /// URI of the most recently preloaded document, if any declared one.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Primitive type of an element.
    #[must_use]
    pub fn primitive(&self, name: &str) -> Option<Primitive> {
        self.elements.get(name).copied()
    }

    /// Number of known elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the registry knows no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check that every parameter and result column of a capability is a
    /// known element.
    ///
    /// # Errors
    ///
    /// Returns the first unknown element name.
    pub fn check_schema(&self, capability: &Capability) -> Result<(), String> {
        capability
            .parameters
            .keys()
            .chain(capability.results.iter())
            .find(|name| !self.elements.contains_key(name.as_str()))
            .map_or(Ok(()), |name| {
                Err(format!(
                    "capability `{}` uses unknown element `{name}`",
                    capability.label
                ))
            })
    }

    /// Check that every parameter value of a specification is a literal of
    /// its element's primitive type.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending parameter.
    pub fn check_values(&self, specification: &Specification) -> Result<(), String> {
        for (name, value) in &specification.parameters {
            match self.primitive(name) {
                None => return Err(format!("unknown element `{name}`")),
                Some(prim) if !prim.accepts(value) => {
                    return Err(format!("value `{value}` is not a valid {prim:?} for `{name}`"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl FromStr for ElementRegistry {
    type Err = ParseError;

    fn from_str(document: &str) -> Result<Self, Self::Err> {
        let mut registry = Self::core();
        registry.preload_json(document)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_registry() {
        let registry = ElementRegistry::core();
        assert_eq!(registry.primitive("destination.ip4"), Some(Primitive::Ip4));
        assert_eq!(registry.primitive("nope"), None);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_preload_document() {
        let mut registry = ElementRegistry::core();
        let before = registry.len();
        let added = registry
            .preload_json(
                r#"{"registry-uri": "http://example.org/reg.json",
                    "elements": [{"name": "jitter.us", "prim": "natural"}]}"#,
            )
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.uri(), Some("http://example.org/reg.json"));
        assert_eq!(registry.primitive("jitter.us"), Some(Primitive::Natural));
    }

    #[test]
    fn test_preload_rejects_bad_document() {
        let mut registry = ElementRegistry::empty();
        assert!(registry.preload_json(r#"{"elements": [{"name": "x"}]}"#).is_err());
        assert!(registry.preload_json("not json").is_err());
    }

    #[test]
    fn test_primitive_literals() {
        assert!(Primitive::Natural.accepts("17"));
        assert!(!Primitive::Natural.accepts("-1"));
        assert!(Primitive::Ip4.accepts("192.0.2.1"));
        assert!(!Primitive::Ip4.accepts("::1"));
        assert!(Primitive::Time.accepts("now"));
        assert!(Primitive::Time.accepts("2024-01-01 10:00:00"));
        assert!(Primitive::Url.accepts("https://example.org/x"));
        assert!(!Primitive::Url.accepts("example.org"));
        assert!(Primitive::Address.accepts("probe-1.example.org"));
        assert!(!Primitive::Address.accepts("bad host"));
    }
}
