//! Protocol (data schema) definitions.

use crate::{ProtocolError, to_canonical_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Absolute URI naming a protocol, e.g. `https://x/invoice`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolUri(String);

impl ProtocolUri {
    /// The URI as written by the requester.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProtocolUri {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        url::Url::parse(s).map_err(|_| ProtocolError::InvalidProtocolUri(s.to_string()))?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ProtocolUri {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolUri> for String {
    fn from(uri: ProtocolUri) -> Self {
        uri.0
    }
}

impl Display for ProtocolUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record type declared by a protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolType {
    /// Optional JSON schema URI the record data must conform to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Allowed data formats (MIME types). Treated as a set.
    #[serde(
        default,
        rename = "dataFormats",
        alias = "data_formats",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub data_formats: BTreeSet<String>,
}

/// One level of a protocol's nesting tree.
///
/// Keys starting with `$` are directives for this level (`$actions`,
/// `$size`, ...). Every other key names a record type that may be nested
/// here and maps to its own rule set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolRuleSet(pub Map<String, Value>);

impl ProtocolRuleSet {
    /// Record types allowed directly beneath this level.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .filter(|key| !key.starts_with('$'))
            .map(String::as_str)
    }

    /// Directive value attached to this level, if any.
    pub fn directive(&self, name: &str) -> Option<&Value> {
        self.0.get(&format!("${}", name.trim_start_matches('$')))
    }
}

/// A named data schema configured on a decentralized data store.
///
/// Equality is canonical: two definitions are equal iff their canonical
/// serializations match byte for byte, independent of key order or the
/// order data formats were listed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    /// URI identifying the protocol.
    pub protocol: ProtocolUri,

    /// Whether the protocol definition is publicly queryable.
    #[serde(default)]
    pub published: bool,

    /// Record types keyed by type name.
    #[serde(default)]
    pub types: BTreeMap<String, ProtocolType>,

    /// Tree of allowed nesting, keyed by top level type name.
    #[serde(default)]
    pub structure: BTreeMap<String, ProtocolRuleSet>,
}

impl ProtocolDefinition {
    /// Create an empty definition for the given protocol.
    pub fn new(protocol: ProtocolUri) -> Self {
        Self {
            protocol,
            published: false,
            types: BTreeMap::new(),
            structure: BTreeMap::new(),
        }
    }

    /// Mark the definition as published.
    pub fn published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Declare a record type.
    pub fn with_type(mut self, name: impl Into<String>, record: ProtocolType) -> Self {
        self.types.insert(name.into(), record);
        self
    }

    /// Attach a top level rule set to the structure tree.
    pub fn with_structure(mut self, name: impl Into<String>, rules: ProtocolRuleSet) -> Self {
        self.structure.insert(name.into(), rules);
        self
    }

    /// Canonical serialization used for equality.
    pub fn canonical(&self) -> Result<String, ProtocolError> {
        to_canonical_string(self).map_err(|error| ProtocolError::Canonicalization(error.to_string()))
    }
}

/// Definitions without a canonical form never compare equal.
impl PartialEq for ProtocolDefinition {
    fn eq(&self, other: &Self) -> bool {
        match (self.canonical(), other.canonical()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for ProtocolDefinition {}
