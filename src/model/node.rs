//! Dataset nodes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::property::{PropertyMap, PropertyValue};
use crate::error::BenchError;

/// Kind of a dataset node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Site,
    Building,
    Floor,
    Space,
    Equipment,
    Point,
    Meter,
    Tenant,
    Zone,
}

impl NodeKind {
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Site,
        NodeKind::Building,
        NodeKind::Floor,
        NodeKind::Space,
        NodeKind::Equipment,
        NodeKind::Point,
        NodeKind::Meter,
        NodeKind::Tenant,
        NodeKind::Zone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Site => "Site",
            NodeKind::Building => "Building",
            NodeKind::Floor => "Floor",
            NodeKind::Space => "Space",
            NodeKind::Equipment => "Equipment",
            NodeKind::Point => "Point",
            NodeKind::Meter => "Meter",
            NodeKind::Tenant => "Tenant",
            NodeKind::Zone => "Zone",
        }
    }

    /// Prefix of generated ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::Site => "site",
            NodeKind::Building => "building",
            NodeKind::Floor => "floor",
            NodeKind::Space => "space",
            NodeKind::Equipment => "equip",
            NodeKind::Point => "point",
            NodeKind::Meter => "meter",
            NodeKind::Tenant => "tenant",
            NodeKind::Zone => "zone",
        }
    }

    /// Digits of the zero-padded ordinal in generated ids
    pub fn id_width(&self) -> usize {
        match self {
            NodeKind::Site | NodeKind::Building => 4,
            NodeKind::Point => 7,
            _ => 6,
        }
    }

    /// Build the id of the `ordinal`-th node of this kind.
    ///
    /// Ids are zero-padded so that lexical order matches creation order.
    pub fn make_id(&self, ordinal: usize) -> String {
        format!("{}-{:0width$}", self.id_prefix(), ordinal, width = self.id_width())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BenchError::Config(format!("unknown node kind: {}", s)))
    }
}

/// A node of the structural graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Building the node is contained in; the site has none
    pub building_id: Option<String>,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            kind,
            name: name.into(),
            building_id: None,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_building(mut self, building_id: impl Into<String>) -> Self {
        self.building_id = Some(building_id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// String property, if present and a string
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.get_property(key).and_then(|v| v.as_string())
    }
}
