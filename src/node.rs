//! The generic value tree every configuration passes through.
//!
//! A [`Node`] is a scalar, an ordered sequence, or an ordered collection of
//! named items. Sources decode into the tree in place, flags and environment
//! keys address it by dotted path, and the final typed value is read back out
//! of it. Map item names are unique by construction; help text rides on the
//! items so flag sets and templates can show it.

use std::fmt;
use std::time;

use chrono::DateTime;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_yaml_ng::Value as Yaml;

use crate::path;
use crate::special::format_duration;

/// A single primitive value. `Null` stands for an absent value.
#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Duration(time::Duration),
}

/// One named entry of a [`Node::Map`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapItem {
    pub name: String,
    pub help: Option<String>,
    pub value: Node,
}

impl MapItem {
    pub fn new(name: impl Into<String>, value: Node) -> Self {
        MapItem {
            name: name.into(),
            help: None,
            value,
        }
    }
}

/// A tree-shaped value: scalar leaf, ordered sequence, or named collection.
#[derive(Debug, Clone)]
pub enum Node {
    Scalar(Scalar),
    Array(Vec<Node>),
    Map(Vec<MapItem>),
}

impl Node {
    pub fn null() -> Node {
        Node::Scalar(Scalar::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar::Null))
    }

    /// The node under a dotted path, if every segment names a map item.
    pub fn get(&self, dotted: &str) -> Option<&Node> {
        let mut node = self;
        for segment in dotted.split('.') {
            let Node::Map(items) = node else { return None };
            node = &items.iter().find(|i| i.name == segment)?.value;
        }
        Some(node)
    }

    fn item_mut(&mut self, dotted: &str) -> Option<&mut MapItem> {
        let mut node = self;
        let mut segments = dotted.split('.').peekable();
        loop {
            let segment = segments.next()?;
            let Node::Map(items) = node else { return None };
            let idx = items.iter().position(|i| i.name == segment)?;
            if segments.peek().is_none() {
                return Some(&mut items[idx]);
            }
            node = &mut items[idx].value;
        }
    }

    /// Decode a structured value at a dotted path. Returns false when the
    /// path does not exist in the tree.
    pub fn set_path(&mut self, dotted: &str, value: &Yaml) -> bool {
        match self.item_mut(dotted) {
            Some(item) => {
                item.value.merge_yaml(value);
                true
            }
            None => false,
        }
    }

    /// Attach help text to items by dotted path. Unknown paths are ignored.
    pub fn annotate(&mut self, help: &[(String, String)]) {
        for (dotted, text) in help {
            if let Some(item) = self.item_mut(dotted) {
                item.help = Some(text.clone());
            }
        }
    }

    /// Decode a structured value into the tree in place.
    ///
    /// Maps merge per name, appending names the tree does not know yet;
    /// everything else replaces the target wholesale. A null-scalar target
    /// may be upgraded to any shape, which is how an unset optional record
    /// gets populated by a file.
    pub fn merge_yaml(&mut self, value: &Yaml) {
        if let Yaml::Tagged(tagged) = value {
            return self.merge_yaml(&tagged.value);
        }
        match (&mut *self, value) {
            (Node::Map(items), Yaml::Mapping(mapping)) => {
                for (key, entry) in mapping {
                    let Some(name) = yaml_key(key) else { continue };
                    match items.iter_mut().find(|i| i.name == name) {
                        Some(item) => item.value.merge_yaml(entry),
                        None => items.push(MapItem::new(name, Node::from_yaml(entry))),
                    }
                }
            }
            (node, value) => *node = Node::from_yaml(value),
        }
    }

    /// Build a tree from a decoded structured value.
    pub fn from_yaml(value: &Yaml) -> Node {
        match value {
            Yaml::Null => Node::null(),
            Yaml::Bool(b) => Node::Scalar(Scalar::Bool(*b)),
            Yaml::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Scalar(Scalar::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Node::Scalar(Scalar::UInt(u))
                } else {
                    Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Yaml::String(s) => Node::Scalar(Scalar::Str(s.clone())),
            Yaml::Sequence(seq) => Node::Array(seq.iter().map(Node::from_yaml).collect()),
            Yaml::Mapping(mapping) => {
                let mut items = Vec::with_capacity(mapping.len());
                for (key, entry) in mapping {
                    if let Some(name) = yaml_key(key) {
                        items.push(MapItem::new(name, Node::from_yaml(entry)));
                    }
                }
                Node::Map(items)
            }
            Yaml::Tagged(tagged) => Node::from_yaml(&tagged.value),
        }
    }

    /// Visit every map item depth-first in declaration order: the item
    /// itself first, then its children when it is itself a map. Arrays and
    /// scalars are leaves. The same walk backs flag names (`.` separator)
    /// and environment keys (`_` separator).
    pub fn scan<F>(&self, base: &str, sep: &str, visit: &mut F)
    where
        F: FnMut(&str, Option<&str>, &Node),
    {
        if let Node::Map(items) = self {
            for item in items {
                let dotted = path::join(base, sep, &item.name);
                visit(&dotted, item.help.as_deref(), &item.value);
                if matches!(item.value, Node::Map(_)) {
                    item.value.scan(&dotted, sep, visit);
                }
            }
        }
    }
}

/// Append an item, rejecting a name the collection already holds. The error
/// carries the duplicate name for the caller to contextualize with its path.
pub(crate) fn insert_item(items: &mut Vec<MapItem>, item: MapItem) -> Result<(), String> {
    if items.iter().any(|i| i.name == item.name) {
        return Err(item.name);
    }
    items.push(item);
    Ok(())
}

fn yaml_key(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Equality is structural and kind-strict, except that signed and unsigned
// integers compare numerically and RFC 3339 strings compare as instants,
// whatever offset they were rendered in.

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        use Scalar::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Int(a), UInt(b)) | (UInt(b), Int(a)) => u64::try_from(*a).is_ok_and(|a| a == *b),
            (Float(a), Float(b)) => a == b,
            (Duration(a), Duration(b)) => a == b,
            (Str(a), Str(b)) => {
                a == b
                    || match (
                        DateTime::parse_from_rfc3339(a),
                        DateTime::parse_from_rfc3339(b),
                    ) {
                        (Ok(x), Ok(y)) => x == y,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Scalar(a), Node::Scalar(b)) => a == b,
            (Node::Array(a), Node::Array(b)) => a == b,
            (Node::Map(a), Node::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|item| {
                        b.iter()
                            .any(|other| other.name == item.name && other.value == item.value)
                    })
            }
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::UInt(u) => write!(f, "{u}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Duration(d) => f.write_str(&format_duration(*d)),
            Scalar::Str(s) => {
                if DateTime::parse_from_rfc3339(s).is_ok() {
                    write!(f, "\"{s}\"")
                } else {
                    f.write_str(s)
                }
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Scalar(s) => s.fmt(f),
            Node::Array(items) => {
                if items.is_empty() {
                    return f.write_str("[ ]");
                }
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
            Node::Map(items) => {
                if items.is_empty() {
                    return f.write_str("{ }");
                }
                f.write_str("{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", item.name, item.value)?;
                    if let Some(help) = &item.help {
                        write!(f, " ({help})")?;
                    }
                }
                f.write_str(" }")
            }
        }
    }
}

// The structured projection: maps become objects, arrays sequences, scalars
// their underlying value or null.
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Scalar(scalar) => match scalar {
                Scalar::Null => serializer.serialize_unit(),
                Scalar::Bool(b) => serializer.serialize_bool(*b),
                Scalar::Int(i) => serializer.serialize_i64(*i),
                Scalar::UInt(u) => serializer.serialize_u64(*u),
                Scalar::Float(x) => serializer.serialize_f64(*x),
                Scalar::Str(s) => serializer.serialize_str(s),
                Scalar::Duration(d) => serializer.serialize_str(&format_duration(*d)),
            },
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Map(items) => {
                let mut map = serializer.serialize_map(Some(items.len()))?;
                for item in items {
                    map.serialize_entry(&item.name, &item.value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};

    fn scalar(s: Scalar) -> Node {
        Node::Scalar(s)
    }

    fn map(entries: &[(&str, Node)]) -> Node {
        Node::Map(
            entries
                .iter()
                .map(|(name, value)| MapItem::new(*name, value.clone()))
                .collect(),
        )
    }

    #[test]
    fn equality_table() {
        let now = Utc::now();
        let elsewhere = now.with_timezone(&FixedOffset::east_opt(5 * 3600).unwrap());

        let cases: &[(&str, Option<Node>, Option<Node>, bool)] = &[
            ("nil nodes", None, None, true),
            ("scalar and nil", Some(scalar(Scalar::Null)), None, false),
            (
                "two null scalars",
                Some(scalar(Scalar::Null)),
                Some(scalar(Scalar::Null)),
                true,
            ),
            (
                "42 and null scalar",
                Some(scalar(Scalar::Int(42))),
                Some(scalar(Scalar::Null)),
                false,
            ),
            (
                "42 and 42",
                Some(scalar(Scalar::Int(42))),
                Some(scalar(Scalar::Int(42))),
                true,
            ),
            (
                "42 and empty array",
                Some(scalar(Scalar::Int(42))),
                Some(Node::Array(vec![])),
                false,
            ),
            (
                "kind mismatch",
                Some(scalar(Scalar::Int(42))),
                Some(scalar(Scalar::Str("Hello World!".into()))),
                false,
            ),
            (
                "same instant, different offsets",
                Some(scalar(Scalar::Str(now.to_rfc3339()))),
                Some(scalar(Scalar::Str(elsewhere.to_rfc3339()))),
                true,
            ),
            (
                "two empty arrays",
                Some(Node::Array(vec![])),
                Some(Node::Array(vec![])),
                true,
            ),
            (
                "equal arrays",
                Some(Node::Array(vec![
                    scalar(Scalar::Int(1)),
                    scalar(Scalar::Int(2)),
                    scalar(Scalar::Int(3)),
                ])),
                Some(Node::Array(vec![
                    scalar(Scalar::Int(1)),
                    scalar(Scalar::Int(2)),
                    scalar(Scalar::Int(3)),
                ])),
                true,
            ),
            (
                "array value mismatch",
                Some(Node::Array(vec![scalar(Scalar::Int(1)), scalar(Scalar::Int(2))])),
                Some(Node::Array(vec![scalar(Scalar::Int(1)), scalar(Scalar::Int(1))])),
                false,
            ),
            (
                "array length mismatch",
                Some(Node::Array(vec![scalar(Scalar::Int(1)), scalar(Scalar::Int(2))])),
                Some(Node::Array(vec![scalar(Scalar::Int(1))])),
                false,
            ),
            (
                "two empty maps",
                Some(Node::Map(vec![])),
                Some(Node::Map(vec![])),
                true,
            ),
            (
                "equal maps, different order",
                Some(map(&[
                    ("A", scalar(Scalar::Int(1))),
                    ("B", scalar(Scalar::Int(2))),
                ])),
                Some(map(&[
                    ("B", scalar(Scalar::Int(2))),
                    ("A", scalar(Scalar::Int(1))),
                ])),
                true,
            ),
            (
                "map value mismatch",
                Some(map(&[("A", scalar(Scalar::Int(1)))])),
                Some(map(&[("A", scalar(Scalar::Int(2)))])),
                false,
            ),
            (
                "map name not found",
                Some(map(&[("A", scalar(Scalar::Int(1)))])),
                Some(map(&[("D", scalar(Scalar::Int(1)))])),
                false,
            ),
            (
                "map length mismatch",
                Some(map(&[
                    ("A", scalar(Scalar::Int(1))),
                    ("B", scalar(Scalar::Int(2))),
                ])),
                Some(map(&[("A", scalar(Scalar::Int(1)))])),
                false,
            ),
        ];

        for (name, a, b, want) in cases {
            assert_eq!(a == b, *want, "case {name:?}");
            assert_eq!(b == a, *want, "case {name:?} (symmetric)");
        }
    }

    #[test]
    fn int_and_uint_compare_numerically() {
        assert_eq!(scalar(Scalar::Int(7)), scalar(Scalar::UInt(7)));
        assert_ne!(scalar(Scalar::Int(-7)), scalar(Scalar::UInt(7)));
    }

    #[test]
    fn rendering_table() {
        let date = Utc.with_ymd_and_hms(2016, 12, 31, 23, 42, 59).unwrap();

        let cases: &[(Node, &str)] = &[
            (scalar(Scalar::Null), "null"),
            (scalar(Scalar::Int(42)), "42"),
            (scalar(Scalar::Str("Hello World!".into())), "Hello World!"),
            (
                scalar(Scalar::Str(date.to_rfc3339())),
                "\"2016-12-31T23:42:59+00:00\"",
            ),
            (
                scalar(Scalar::Duration(time::Duration::from_secs(10))),
                "10s",
            ),
            (Node::Array(vec![]), "[ ]"),
            (
                Node::Array(vec![
                    scalar(Scalar::Int(1)),
                    scalar(Scalar::Int(2)),
                    scalar(Scalar::Int(3)),
                ]),
                "[1, 2, 3]",
            ),
            (Node::Map(vec![]), "{ }"),
        ];

        for (node, want) in cases {
            assert_eq!(node.to_string(), *want);
        }
    }

    #[test]
    fn map_rendering_annotates_help() {
        let node = Node::Map(vec![
            MapItem {
                name: "A".into(),
                help: Some("first".into()),
                value: scalar(Scalar::Int(1)),
            },
            MapItem::new("B", scalar(Scalar::Int(2))),
            MapItem {
                name: "C".into(),
                help: Some("last".into()),
                value: scalar(Scalar::Int(3)),
            },
        ]);
        assert_eq!(node.to_string(), "{ A: 1 (first), B: 2, C: 3 (last) }");
    }

    #[test]
    fn json_projection() {
        let cases: &[(Node, &str)] = &[
            (scalar(Scalar::Null), "null"),
            (scalar(Scalar::Int(42)), "42"),
            (scalar(Scalar::Str("Hello World!".into())), "\"Hello World!\""),
            (Node::Array(vec![]), "[]"),
            (
                Node::Array(vec![scalar(Scalar::Int(1)), scalar(Scalar::Int(2))]),
                "[1,2]",
            ),
            (Node::Map(vec![]), "{}"),
            (
                map(&[
                    ("A", scalar(Scalar::Int(1))),
                    ("B", Node::Array(vec![scalar(Scalar::Int(2))])),
                ]),
                "{\"A\":1,\"B\":[2]}",
            ),
        ];

        for (node, want) in cases {
            assert_eq!(serde_json::to_string(node).unwrap(), *want);
        }
    }

    #[test]
    fn merge_recurses_into_maps_and_replaces_leaves() {
        let mut node = map(&[
            ("host", scalar(Scalar::Str("localhost".into()))),
            (
                "db",
                map(&[
                    ("url", scalar(Scalar::Null)),
                    ("pool", scalar(Scalar::Int(5))),
                ]),
            ),
        ]);

        let overlay: Yaml = serde_yaml_ng::from_str("db: { pool: 20 }").unwrap();
        node.merge_yaml(&overlay);

        assert_eq!(node.get("db.pool"), Some(&scalar(Scalar::Int(20))));
        assert_eq!(node.get("db.url"), Some(&scalar(Scalar::Null)));
        assert_eq!(
            node.get("host"),
            Some(&scalar(Scalar::Str("localhost".into())))
        );
    }

    #[test]
    fn merge_appends_unknown_names() {
        let mut node = map(&[("known", scalar(Scalar::Int(1)))]);
        let overlay: Yaml = serde_yaml_ng::from_str("extra: 2").unwrap();
        node.merge_yaml(&overlay);
        assert_eq!(node.get("extra"), Some(&scalar(Scalar::Int(2))));
    }

    #[test]
    fn merge_upgrades_null_scalar_to_structure() {
        let mut node = map(&[("extra", scalar(Scalar::Null))]);
        let overlay: Yaml = serde_yaml_ng::from_str("extra: { dummy: 1 }").unwrap();
        node.merge_yaml(&overlay);
        assert_eq!(node.get("extra.dummy"), Some(&scalar(Scalar::Int(1))));
    }

    #[test]
    fn merge_replaces_arrays_wholesale() {
        let mut node = map(&[(
            "list",
            Node::Array(vec![scalar(Scalar::Int(9)), scalar(Scalar::Int(9))]),
        )]);
        let overlay: Yaml = serde_yaml_ng::from_str("list: [1]").unwrap();
        node.merge_yaml(&overlay);
        assert_eq!(
            node.get("list"),
            Some(&Node::Array(vec![scalar(Scalar::Int(1))]))
        );
    }

    #[test]
    fn set_path_addresses_nested_items() {
        let mut node = map(&[(
            "P",
            map(&[
                ("x", scalar(Scalar::Int(0))),
                ("y", scalar(Scalar::Int(0))),
            ]),
        )]);

        let one: Yaml = serde_yaml_ng::from_str("1").unwrap();
        assert!(node.set_path("P.x", &one));
        assert!(!node.set_path("P.z", &one));
        assert_eq!(node.get("P.x"), Some(&scalar(Scalar::Int(1))));
    }

    #[test]
    fn scan_visits_in_declaration_order_then_recurses() {
        let node = map(&[
            ("b", scalar(Scalar::Int(1))),
            (
                "a",
                map(&[("inner", scalar(Scalar::Bool(true)))]),
            ),
            ("list", Node::Array(vec![scalar(Scalar::Int(1))])),
        ]);

        let mut seen = Vec::new();
        node.scan("", ".", &mut |path, _, _| seen.push(path.to_string()));
        assert_eq!(seen, vec!["b", "a", "a.inner", "list"]);

        let mut keys = Vec::new();
        node.scan("test", "_", &mut |path, _, _| keys.push(path.to_string()));
        assert_eq!(keys, vec!["test_b", "test_a", "test_a_inner", "test_list"]);
    }

    #[test]
    fn annotate_attaches_help_by_path() {
        let mut node = map(&[("msg", scalar(Scalar::Str("hi".into())))]);
        node.annotate(&[("msg".into(), "the message".into())]);
        let Node::Map(items) = &node else { unreachable!() };
        assert_eq!(items[0].help.as_deref(), Some("the message"));
    }

    #[test]
    fn insert_item_rejects_duplicates() {
        let mut items = Vec::new();
        insert_item(&mut items, MapItem::new("Stuff", Node::null())).unwrap();
        let err = insert_item(&mut items, MapItem::new("Stuff", Node::null())).unwrap_err();
        assert_eq!(err, "Stuff");
    }
}
