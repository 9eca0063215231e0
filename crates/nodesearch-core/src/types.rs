//! Domain types shared by the indexer, the query builder and the backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Typed node property value. Properties are JSON-shaped so they can be
/// copied into documents without a lossy conversion.
pub type PropertyValue = Value;

/// A raw search hit as returned by a backend.
pub type Hit = Map<String, Value>;

/// Identifier of one document in the index: `<aggregate>_<dimension hash>`.
pub type DocumentId = String;

/// Names of the system fields every document carries.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const URI: &str = "uri";
    pub const FULLTEXT: &str = "__fulltext";
    pub const GEO: &str = "_geo";
    pub const IDENTIFIER: &str = "__identifier";
    pub const DIMENSIONS_HASH: &str = "__dimensionshash";
    pub const DIMENSIONS: &str = "__dimensions";
    pub const WORKSPACE: &str = "__workspace";
    pub const NODE_TYPE: &str = "__nodeType";
    pub const TYPE_AND_SUPERTYPES: &str = "__typeAndSupertypes";
    pub const PATH: &str = "__path";
    pub const PARENT_PATH: &str = "__parentPath";
    pub const FORMATTED: &str = "_formatted";
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self { Self(value.to_string()) }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self { Self(value) }
        }
    };
}

string_newtype!(
    /// Stable identity shared by all dimension variants of one content item.
    NodeAggregateId
);
string_newtype!(
    /// Fully qualified node type name, e.g. `Neos.Neos:Document`.
    NodeTypeName
);
string_newtype!(
    /// Named view of the content tree, e.g. `live`.
    WorkspaceName
);

impl WorkspaceName {
    pub fn live() -> Self { Self::new("live") }
}

/// A combination of dimension values, e.g. `{language: en, region: US}`.
///
/// The mapping is kept sorted by dimension name, so equality, ordering and
/// the canonical JSON form never depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionSpacePoint(BTreeMap<String, String>);

impl DimensionSpacePoint {
    /// The point used when a repository has no dimensions configured.
    pub fn without_dimensions() -> Self { Self::default() }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(dimension.into(), value.into());
        self
    }

    pub fn get(&self, dimension: &str) -> Option<&str> { self.0.get(dimension).map(String::as_str) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical JSON with keys in sorted order, byte for byte as PHP's
    /// `json_encode` writes it: `/` and non-ASCII characters are escaped and
    /// the empty point is `[]`.
    pub fn to_json(&self) -> String {
        if self.0.is_empty() {
            return "[]".to_string();
        }
        let members: Vec<String> =
            self.0.iter().map(|(k, v)| format!("{}:{}", php_json_string(k), php_json_string(v))).collect();
        format!("{{{}}}", members.join(","))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
    }

    /// Lowercase hex MD5 of the canonical JSON form. Used in document ids
    /// and in the `__dimensionshash` filter field.
    pub fn hash(&self) -> String { format!("{:x}", md5::compute(self.to_json())) }
}

fn php_json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            ' '..='\u{7f}' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units).iter() {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
    out
}

impl fmt::Display for DimensionSpacePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("{}");
        }
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Deterministic document identifier for one (aggregate, dimension point) pair.
pub fn document_id(aggregate_id: &NodeAggregateId, point: &DimensionSpacePoint) -> DocumentId {
    format!("{}_{}", aggregate_id, point.hash())
}

/// One dimension-variant instance of a content element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub aggregate_id: NodeAggregateId,
    pub node_type: NodeTypeName,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "dimensions")]
    pub dimension_space_point: DimensionSpacePoint,
    #[serde(default = "WorkspaceName::live")]
    pub workspace: WorkspaceName,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Node {
    pub fn new(
        aggregate_id: impl Into<NodeAggregateId>,
        node_type: impl Into<NodeTypeName>,
        dimension_space_point: DimensionSpacePoint,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            node_type: node_type.into(),
            name: None,
            dimension_space_point,
            workspace: WorkspaceName::live(),
            properties: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_workspace(mut self, workspace: WorkspaceName) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> { self.properties.get(name) }

    /// Path segment used when building `__path`; unnamed nodes fall back to
    /// their aggregate id.
    pub fn path_segment(&self) -> &str { self.name.as_deref().unwrap_or(self.aggregate_id.as_str()) }

    pub fn document_id(&self) -> DocumentId { document_id(&self.aggregate_id, &self.dimension_space_point) }
}

/// Extracted text for one document, keyed by extraction bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FulltextBag(BTreeMap<String, Vec<String>>);

impl FulltextBag {
    pub fn new() -> Self { Self::default() }

    /// Append `text` under `key`; blank text is ignored.
    pub fn append(&mut self, key: &str, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.0.entry(key.to_string()).or_default().push(text);
    }

    pub fn get(&self, key: &str) -> Option<&[String]> { self.0.get(key).map(Vec::as_slice) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Accepts `{lat, lng}` or `{latitude, longitude}` with numeric or
    /// numeric-string coordinates.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let coord = |short: &str, long: &str| -> Option<f64> {
            let v = obj.get(short).or_else(|| obj.get(long))?;
            match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        };
        Some(Self { lat: coord("lat", "latitude")?, lng: coord("lng", "longitude")? })
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_008.8;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// The record written to the index for one (aggregate, dimension point).
///
/// Serializes to `{id, title, uri?, __fulltext?, _geo?, ...fields}`. Extra
/// fields never shadow the named ones; see [`Document::insert_field`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "__fulltext", default, skip_serializing_if = "FulltextBag::is_empty")]
    pub fulltext: FulltextBag,
    #[serde(rename = "_geo", default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    const RESERVED: [&'static str; 5] = [fields::ID, fields::TITLE, fields::URI, fields::FULLTEXT, fields::GEO];

    pub fn new(id: impl Into<DocumentId>) -> Self { Self { id: id.into(), ..Self::default() } }

    /// Insert an extra field. Returns `false` (and leaves the document
    /// untouched) when `name` is one of the named document fields.
    pub fn insert_field(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if Self::RESERVED.contains(&name.as_str()) {
            return false;
        }
        self.fields.insert(name, value);
        true
    }

    pub fn field(&self, name: &str) -> Option<&Value> { self.fields.get(name) }

    pub fn to_hit(&self) -> crate::error::Result<Hit> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Hit::new()),
        }
    }
}

/// Whether a document attribute counts as empty for validation purposes.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

/// Plain text of a property value, when it has one.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            if parts.is_empty() { None } else { Some(parts.join(" ")) }
        }
        Value::Null | Value::Object(_) => None,
    }
}
