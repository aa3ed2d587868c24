use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::iter::FromIterator;
use std::ops::Deref;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
}

impl Default for RecordType {
    fn default() -> Self {
        Self::A
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Record targets, kept in the order they were discovered.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Targets(Vec<String>);

impl Targets {
    pub fn new(targets: Vec<String>) -> Self {
        Self(targets)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Deref for Targets {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Targets {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for Targets {
    fn from(targets: Vec<String>) -> Self {
        Self(targets)
    }
}

impl Display for Targets {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(";"))
    }
}

/// Record TTL in seconds. An unconfigured TTL reports a value of 0 and lets the
/// provider pick its default.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ttl(Option<i64>);

impl Ttl {
    pub fn new(seconds: i64) -> Self {
        Self(Some(seconds))
    }

    pub fn unconfigured() -> Self {
        Self(None)
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    pub fn value(&self) -> i64 {
        self.0.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: RecordType,
    pub targets: Targets,
    pub record_ttl: Ttl,
    pub labels: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(dns_name: impl Into<String>, record_type: RecordType, targets: Targets) -> Self {
        Self {
            dns_name: dns_name.into(),
            record_type,
            targets,
            record_ttl: Ttl::unconfigured(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.record_ttl = ttl;

        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;

        self
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN {} {}",
            self.dns_name,
            self.record_ttl.value(),
            self.record_type,
            self.targets
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_ttl() {
        let ttl = Ttl::unconfigured();

        assert!(!ttl.is_configured());
        assert_eq!(ttl.value(), 0);
        assert_eq!(ttl, Ttl::default());
    }

    #[test]
    fn configured_zero_ttl() {
        let ttl = Ttl::new(0);

        assert!(ttl.is_configured());
        assert_eq!(ttl.value(), 0);
    }

    #[test]
    fn display_endpoint() {
        let endpoint = Endpoint::new(
            "node1.example.org",
            RecordType::A,
            Targets::from_iter(["1.2.3.4", "5.6.7.8"]),
        )
        .with_ttl(Ttl::new(10));

        assert_eq!(
            endpoint.to_string(),
            "node1.example.org 10 IN A 1.2.3.4;5.6.7.8"
        );
    }

    #[test]
    fn serialize_endpoint() {
        let endpoint = Endpoint::new("node1", RecordType::A, Targets::from_iter(["1.2.3.4"]));

        let json = serde_json::to_value(&endpoint).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "dnsName": "node1",
                "recordType": "A",
                "targets": ["1.2.3.4"],
                "recordTtl": null,
                "labels": {}
            })
        );
    }
}
