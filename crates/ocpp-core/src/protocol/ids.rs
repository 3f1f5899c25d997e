//! Identifiers carried by every frame: request ids, node ids, network paths.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OcppError, Result};

/// OCPP limits message ids to 36 characters.
pub const MAX_REQUEST_ID_LEN: usize = 36;
pub const MAX_NODE_ID_LEN: usize = 255;

/// Correlation token chosen by the sender of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(OcppError::decode("request id must not be empty"));
        }
        if s.len() > MAX_REQUEST_ID_LEN {
            return Err(OcppError::decode(format!(
                "request id exceeds {MAX_REQUEST_ID_LEN} characters"
            )));
        }
        Ok(Self(Arc::from(s)))
    }

    /// Placeholder id for replies to frames whose id could not be read.
    pub fn unknown() -> Self {
        Self(Arc::from("-1"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical endpoint (charging station, CSMS or intermediary node).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkingNodeId(Arc<str>);

impl NetworkingNodeId {
    /// Ids are kept verbatim; surrounding whitespace is refused rather than
    /// trimmed so a relayed frame carries the id it arrived with.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(OcppError::decode("networking node id must not be empty"));
        }
        if s.trim() != s {
            return Err(OcppError::decode("networking node id has surrounding whitespace"));
        }
        if s.len() > MAX_NODE_ID_LEN {
            return Err(OcppError::decode(format!(
                "networking node id exceeds {MAX_NODE_ID_LEN} characters"
            )));
        }
        Ok(Self(Arc::from(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkingNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NetworkingNodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NetworkingNodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NetworkingNodeId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Hops a relayed message has traversed, oldest first. Empty for direct traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NetworkPath(Vec<NetworkingNodeId>);

impl NetworkPath {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_hops(hops: Vec<NetworkingNodeId>) -> Self {
        Self(hops)
    }

    /// New path with `hop` appended; `self` is left untouched.
    pub fn append(&self, hop: NetworkingNodeId) -> Self {
        let mut hops = Vec::with_capacity(self.0.len() + 1);
        hops.extend(self.0.iter().cloned());
        hops.push(hop);
        Self(hops)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First hop, i.e. the node that originated the message.
    pub fn origin(&self) -> Option<&NetworkingNodeId> {
        self.0.first()
    }

    /// Most recent hop.
    pub fn last_hop(&self) -> Option<&NetworkingNodeId> {
        self.0.last()
    }

    pub fn contains(&self, id: &NetworkingNodeId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkingNodeId> {
        self.0.iter()
    }
}
