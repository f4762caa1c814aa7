//! Definition-graph data model for asc.
//!
//! This crate defines the tagged definition nodes that programs are encoded
//! as, the identifiers that name them, and the layers that stack them into
//! scopes. It also provides the JSON wire codec: a serde shape that is
//! bit-compatible with the host format, plus a validating decoder that
//! reports malformed input with the identifier path it occurred at.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Global counter for opaque identifiers.
///
/// Opaque identifiers are minted from a process-wide counter so that no two
/// contexts ever produce the same symbol.
static OPAQUE_IDS: AtomicU64 = AtomicU64::new(0);

/// A definition identifier: either a textual name or an opaque symbol.
///
/// Only names cross the JSON boundary; opaque symbols are host-minted keys
/// for hidden/internal entries. Names with a leading `@` are reserved for
/// form values and may never appear as definition keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ident {
    Name(String),
    Opaque(u64),
}

impl Ident {
    pub fn name(s: impl Into<String>) -> Self {
        Ident::Name(s.into())
    }

    /// Mint a fresh opaque symbol.
    pub fn fresh_opaque() -> Self {
        Ident::Opaque(OPAQUE_IDS.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Ident::Name(s) => Some(s),
            Ident::Opaque(_) => None,
        }
    }

    /// Does this identifier reference a host-supplied form value (`@name`)?
    pub fn is_form_value(&self) -> bool {
        matches!(self, Ident::Name(s) if s.starts_with('@'))
    }

    /// Is this a private definition (`_`-prefixed name)?
    pub fn is_private(&self) -> bool {
        matches!(self, Ident::Name(s) if s.starts_with('_'))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident::Name(s) => write!(f, "{s}"),
            Ident::Opaque(n) => write!(f, "#{n}"),
        }
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::Name(s.to_string())
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdentVisitor;
        impl Visitor<'_> for IdentVisitor {
            type Value = Ident;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an identifier string")
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<Ident, E> {
                Ok(Ident::Name(v.to_string()))
            }
        }
        deserializer.deserialize_str(IdentVisitor)
    }
}

// ---------------------------------------------------------------------------
// Definition nodes
// ---------------------------------------------------------------------------

/// One definition in the program graph.
///
/// Each variant corresponds to one wire tag; the serde shape is the exact
/// JSON object format of the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Def {
    /// The null value (`u`).
    #[serde(rename = "u")]
    Null,
    /// A boolean literal (`b`).
    #[serde(rename = "b")]
    Bool {
        #[serde(rename = "v")]
        value: bool,
    },
    /// A numeric literal (`n`). NaN and infinities are invalid.
    #[serde(rename = "n")]
    Number {
        #[serde(rename = "v")]
        value: f64,
    },
    /// A string literal (`s`).
    #[serde(rename = "s")]
    Str {
        #[serde(rename = "v")]
        value: String,
    },
    /// An inline array of JSON literals (`m`). May nest arrays.
    #[serde(rename = "m")]
    Literal {
        #[serde(rename = "v")]
        value: Vec<serde_json::Value>,
    },
    /// A list built by reference to other definitions (`l`).
    #[serde(rename = "l")]
    List {
        #[serde(rename = "v")]
        items: Vec<Ident>,
    },
    /// A call: apply the callable bound to `f` to the referenced values (`c`).
    #[serde(rename = "c")]
    Call {
        f: Ident,
        #[serde(rename = "a", default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Ident>,
    },
    /// A function with named parameters and a body layer (`f`).
    ///
    /// The body's entry point is the identifier `=`.
    #[serde(rename = "f")]
    Fn {
        #[serde(rename = "p")]
        params: Vec<String>,
        #[serde(rename = "b")]
        body: Layer,
    },
    /// A switch: the first case whose condition evaluates to `true` selects
    /// its value; an absent condition is the default (`w`).
    #[serde(rename = "w")]
    Switch {
        #[serde(rename = "m")]
        cases: Vec<SwitchCase>,
    },
}

/// One arm of a switch definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<Ident>,
    #[serde(rename = "v")]
    pub value: Ident,
}

/// The wire tag of a definition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Null,
    Bool,
    Number,
    Str,
    Literal,
    List,
    Call,
    Fn,
    Switch,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Null => "u",
            Tag::Bool => "b",
            Tag::Number => "n",
            Tag::Str => "s",
            Tag::Literal => "m",
            Tag::List => "l",
            Tag::Call => "c",
            Tag::Fn => "f",
            Tag::Switch => "w",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Def {
    pub fn tag(&self) -> Tag {
        match self {
            Def::Null => Tag::Null,
            Def::Bool { .. } => Tag::Bool,
            Def::Number { .. } => Tag::Number,
            Def::Str { .. } => Tag::Str,
            Def::Literal { .. } => Tag::Literal,
            Def::List { .. } => Tag::List,
            Def::Call { .. } => Tag::Call,
            Def::Fn { .. } => Tag::Fn,
            Def::Switch { .. } => Tag::Switch,
        }
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// One scope layer: a mapping from identifier to definition node.
///
/// Nodes are held behind `Arc` so that the pointer doubles as the node's
/// identity (the cache key used by both evaluator and analyzer).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layer(pub HashMap<Ident, Arc<Def>>);

impl Layer {
    pub fn new() -> Self {
        Layer(HashMap::new())
    }

    pub fn insert(&mut self, id: impl Into<Ident>, def: Def) {
        self.0.insert(id.into(), Arc::new(def));
    }

    pub fn get(&self, id: &Ident) -> Option<&Arc<Def>> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &Ident) -> bool {
        self.0.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ident, &Arc<Def>)> {
        self.0.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Ident> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Ident, Def)> for Layer {
    fn from_iter<I: IntoIterator<Item = (Ident, Def)>>(iter: I) -> Self {
        Layer(
            iter.into_iter()
                .map(|(id, def)| (id, Arc::new(def)))
                .collect(),
        )
    }
}

/// Identity of a definition node, derived from its `Arc` allocation.
///
/// Stable for as long as some layer keeps the node alive; both subsystems
/// key their caches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(def: &Arc<Def>) -> Self {
        NodeId(Arc::as_ptr(def) as usize)
    }
}

// ---------------------------------------------------------------------------
// Validating JSON decoder
// ---------------------------------------------------------------------------

/// Why a JSON value failed to decode as a definition layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The `t` tag is not one of the known tags.
    UnknownDefType(String),
    /// The node is structurally malformed.
    InvalidFormat(String),
}

/// A decode failure, with the identifier path it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub path: Vec<String>,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.path.is_empty() {
            String::new()
        } else {
            format!(" at `{}`", self.path.join("."))
        };
        match &self.kind {
            DecodeErrorKind::UnknownDefType(t) => {
                write!(f, "unknown definition tag `{t}`{at}")
            }
            DecodeErrorKind::InvalidFormat(msg) => write!(f, "invalid definition: {msg}{at}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a JSON object into a definition layer, validating tags and shapes.
///
/// Unlike the derived serde impl, this reports `UnknownDefType` /
/// `InvalidFormat` with the identifier path of the offending node.
pub fn decode_layer(value: &serde_json::Value) -> Result<Layer, DecodeError> {
    let mut path = Vec::new();
    decode_layer_at(value, &mut path)
}

fn decode_layer_at(
    value: &serde_json::Value,
    path: &mut Vec<String>,
) -> Result<Layer, DecodeError> {
    let obj = value.as_object().ok_or_else(|| DecodeError {
        kind: DecodeErrorKind::InvalidFormat("layer must be a JSON object".to_string()),
        path: path.clone(),
    })?;

    let mut layer = Layer::new();
    for (key, node) in obj {
        path.push(key.clone());
        let def = decode_def(node, path)?;
        path.pop();
        layer.insert(Ident::name(key.clone()), def);
    }
    Ok(layer)
}

fn decode_def(value: &serde_json::Value, path: &mut Vec<String>) -> Result<Def, DecodeError> {
    let invalid = |msg: &str, path: &[String]| DecodeError {
        kind: DecodeErrorKind::InvalidFormat(msg.to_string()),
        path: path.to_vec(),
    };

    let obj = value
        .as_object()
        .ok_or_else(|| invalid("node must be a JSON object", path))?;
    let tag = obj
        .get("t")
        .and_then(|t| t.as_str())
        .ok_or_else(|| invalid("node is missing its `t` tag", path))?;

    let field = |name: &str| obj.get(name);

    match tag {
        "u" => Ok(Def::Null),
        "b" => {
            let v = field("v")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| invalid("`b` node requires a boolean `v`", path))?;
            Ok(Def::Bool { value: v })
        }
        "n" => {
            let v = field("v")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| invalid("`n` node requires a numeric `v`", path))?;
            if !v.is_finite() {
                return Err(invalid("`n` node value must be finite", path));
            }
            Ok(Def::Number { value: v })
        }
        "s" => {
            let v = field("v")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid("`s` node requires a string `v`", path))?;
            Ok(Def::Str {
                value: v.to_string(),
            })
        }
        "m" => {
            let v = field("v")
                .and_then(|v| v.as_array())
                .ok_or_else(|| invalid("`m` node requires an array `v`", path))?;
            Ok(Def::Literal { value: v.clone() })
        }
        "l" => {
            let v = field("v")
                .and_then(|v| v.as_array())
                .ok_or_else(|| invalid("`l` node requires an array `v`", path))?;
            let items = decode_ident_list(v, path)?;
            Ok(Def::List { items })
        }
        "c" => {
            let f = field("f")
                .and_then(|f| f.as_str())
                .ok_or_else(|| invalid("`c` node requires an identifier `f`", path))?;
            let args = match field("a") {
                None => Vec::new(),
                Some(a) => {
                    let list = a
                        .as_array()
                        .ok_or_else(|| invalid("`c` node `a` must be an array", path))?;
                    decode_ident_list(list, path)?
                }
            };
            Ok(Def::Call {
                f: Ident::name(f),
                args,
            })
        }
        "f" => {
            let params = field("p")
                .and_then(|p| p.as_array())
                .ok_or_else(|| invalid("`f` node requires a parameter array `p`", path))?
                .iter()
                .map(|p| {
                    p.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid("function parameters must be strings", path))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let body = field("b").ok_or_else(|| invalid("`f` node requires a body `b`", path))?;
            let body = decode_layer_at(body, path)?;
            Ok(Def::Fn { params, body })
        }
        "w" => {
            let cases = field("m")
                .and_then(|m| m.as_array())
                .ok_or_else(|| invalid("`w` node requires a case array `m`", path))?;
            let mut out = Vec::with_capacity(cases.len());
            for case in cases {
                let obj = case
                    .as_object()
                    .ok_or_else(|| invalid("switch cases must be objects", path))?;
                let cond = match obj.get("c") {
                    None => None,
                    Some(c) => Some(Ident::name(c.as_str().ok_or_else(|| {
                        invalid("switch case condition must be an identifier", path)
                    })?)),
                };
                let value = obj
                    .get("v")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| invalid("switch cases require a value identifier", path))?;
                out.push(SwitchCase {
                    cond,
                    value: Ident::name(value),
                });
            }
            Ok(Def::Switch { cases: out })
        }
        other => Err(DecodeError {
            kind: DecodeErrorKind::UnknownDefType(other.to_string()),
            path: path.clone(),
        }),
    }
}

fn decode_ident_list(
    values: &[serde_json::Value],
    path: &mut Vec<String>,
) -> Result<Vec<Ident>, DecodeError> {
    values
        .iter()
        .map(|v| {
            v.as_str().map(Ident::name).ok_or_else(|| DecodeError {
                kind: DecodeErrorKind::InvalidFormat(
                    "references must be identifier strings".to_string(),
                ),
                path: path.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_form_value_and_privacy() {
        assert!(Ident::name("@age").is_form_value());
        assert!(!Ident::name("age").is_form_value());
        assert!(Ident::name("_hidden").is_private());
        assert!(!Ident::fresh_opaque().is_private());
    }

    #[test]
    fn opaque_idents_are_distinct() {
        assert_ne!(Ident::fresh_opaque(), Ident::fresh_opaque());
    }

    #[test]
    fn def_serde_round_trip() {
        let json = r#"{"add":{"t":"f","p":["a"],"b":{"=":{"t":"c","f":"+","a":["a","one"]},"one":{"t":"n","v":1.0}}},"x":{"t":"c","f":"add","a":["y"]},"y":{"t":"n","v":2.0}}"#;
        let layer: Layer = serde_json::from_str(json).expect("layer should deserialize");
        let back = serde_json::to_value(&layer).expect("layer should serialize");
        let reparsed: Layer = serde_json::from_value(back).expect("round trip");
        assert_eq!(layer, reparsed);
    }

    #[test]
    fn call_args_default_to_empty() {
        let def: Def = serde_json::from_str(r#"{"t":"c","f":"a"}"#).expect("call without args");
        assert_eq!(
            def,
            Def::Call {
                f: Ident::name("a"),
                args: vec![],
            }
        );
    }

    #[test]
    fn decoder_reports_unknown_tag_with_path() {
        let value: serde_json::Value =
            serde_json::from_str(r#"{"f":{"t":"f","p":[],"b":{"=":{"t":"q"}}}}"#).unwrap();
        let err = decode_layer(&value).expect_err("unknown tag should fail");
        assert_eq!(err.kind, DecodeErrorKind::UnknownDefType("q".to_string()));
        assert_eq!(err.path, vec!["f".to_string(), "=".to_string()]);
    }

    #[test]
    fn decoder_rejects_malformed_bool() {
        let value: serde_json::Value = serde_json::from_str(r#"{"b":{"t":"b","v":1}}"#).unwrap();
        let err = decode_layer(&value).expect_err("non-boolean v should fail");
        assert!(matches!(err.kind, DecodeErrorKind::InvalidFormat(_)));
    }

    #[test]
    fn node_id_tracks_arc_identity() {
        let mut layer = Layer::new();
        layer.insert("a", Def::Null);
        let a = layer.get(&Ident::name("a")).unwrap();
        let same = NodeId::of(a);
        assert_eq!(NodeId::of(a), same);

        let mut other = Layer::new();
        other.insert("a", Def::Null);
        let b = other.get(&Ident::name("a")).unwrap();
        assert_ne!(NodeId::of(a), NodeId::of(b));
    }
}
