//! Deep transfer between typed configuration values and the [`Node`] tree.
//!
//! [`to_node`] projects any `Serialize` value into the tree: records keep
//! declaration order, associative maps are sorted by key, embedded
//! (`#[serde(flatten)]`) fields are spliced into their parent with duplicate
//! names rejected, and duration values are captured as typed scalars whether
//! they come from the [`Duration`](crate::Duration) wrapper or a bare
//! `std::time::Duration` field.
//!
//! [`from_node`] is the mirror copy, with the coercions a configuration
//! loader needs: numeric kinds unify, any scalar reads as a string through
//! its text form, strings parse into numbers and booleans on demand, and
//! duration fields accept text, integer nanoseconds, or the structural
//! `{secs, nanos}` form.

use std::fmt;
use std::time;

use serde::de::{self, Deserializer, IntoDeserializer, Visitor};
use serde::ser::{self, Impossible, Serialize};

use crate::error::ConflateError;
use crate::node::{insert_item, MapItem, Node, Scalar};
use crate::path;
use crate::special::{format_duration, parse_duration, DURATION_TOKEN, STD_DURATION_FIELDS};

/// Project a value into its [`Node`] tree.
///
/// Pure and side-effect free; the result depends only on the value and its
/// static shape. Fails on malformed schemas (embedded-name collisions,
/// non-string map keys), which are programmer errors.
pub fn to_node<T: Serialize>(value: &T) -> Result<Node, ConflateError> {
    value
        .serialize(NodeSer {
            path: String::new(),
        })
        .map_err(|e| ConflateError::Schema(e.0))
}

/// Rebuild a typed value from a [`Node`] tree.
pub fn from_node<T: de::DeserializeOwned>(node: &Node) -> Result<T, ConflateError> {
    T::deserialize(NodeDe { node }).map_err(|e| ConflateError::Decode {
        key: "<merged>".into(),
        reason: e.0,
    })
}

// ---------------------------------------------------------------------------
// Serialization: value -> Node

#[derive(Debug)]
pub(crate) struct SchemaError(String);

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SchemaError {}

impl ser::Error for SchemaError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SchemaError(msg.to_string())
    }
}

fn duplicate(name: &str, path: &str) -> SchemaError {
    if path.is_empty() {
        SchemaError(format!("duplicate field name '{name}'"))
    } else {
        SchemaError(format!("duplicate field name '{name}' at path {path}"))
    }
}

struct NodeSer {
    path: String,
}

impl NodeSer {
    fn child(&self, name: &str) -> NodeSer {
        NodeSer {
            path: path::join(&self.path, ".", name),
        }
    }
}

impl ser::Serializer for NodeSer {
    type Ok = Node;
    type Error = SchemaError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = StructBuilder;
    type SerializeStructVariant = VariantStructBuilder;

    fn serialize_bool(self, v: bool) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Node, SchemaError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Node, SchemaError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Node, SchemaError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::Int(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Node, SchemaError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u16(self, v: u16) -> Result<Node, SchemaError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u32(self, v: u32) -> Result<Node, SchemaError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u64(self, v: u64) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::UInt(v)))
    }

    fn serialize_f32(self, v: f32) -> Result<Node, SchemaError> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::Float(v)))
    }

    fn serialize_char(self, v: char) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::Str(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::Str(v.to_string())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node, SchemaError> {
        Ok(Node::Array(
            v.iter()
                .map(|b| Node::Scalar(Scalar::Int(*b as i64)))
                .collect(),
        ))
    }

    fn serialize_none(self) -> Result<Node, SchemaError> {
        Ok(Node::null())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Node, SchemaError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node, SchemaError> {
        Ok(Node::null())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node, SchemaError> {
        Ok(Node::null())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Node, SchemaError> {
        Ok(Node::Scalar(Scalar::Str(variant.to_string())))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Node, SchemaError> {
        let node = value.serialize(NodeSer {
            path: self.path.clone(),
        })?;
        if name == DURATION_TOKEN {
            let Node::Scalar(Scalar::Str(text)) = &node else {
                return Err(SchemaError(format!(
                    "malformed duration marker at path {}",
                    self.path
                )));
            };
            let d = parse_duration(text).map_err(SchemaError)?;
            return Ok(Node::Scalar(Scalar::Duration(d)));
        }
        Ok(node)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node, SchemaError> {
        let inner = value.serialize(self.child(variant))?;
        Ok(Node::Map(vec![MapItem::new(variant, inner)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, SchemaError> {
        Ok(SeqBuilder {
            path: self.path,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, SchemaError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, SchemaError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, SchemaError> {
        Ok(VariantSeqBuilder {
            variant,
            inner: SeqBuilder {
                path: self.path,
                items: Vec::with_capacity(len),
            },
        })
    }

    // A `len` of `None` means the entries come from an embedded-field splice
    // rather than an associative collection; splices keep declaration order,
    // collections are sorted for stable output.
    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder, SchemaError> {
        Ok(MapBuilder {
            path: self.path,
            items: Vec::with_capacity(len.unwrap_or(0)),
            key: None,
            sort: len.is_some(),
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<StructBuilder, SchemaError> {
        Ok(StructBuilder {
            path: self.path,
            name,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantStructBuilder, SchemaError> {
        Ok(VariantStructBuilder {
            variant,
            inner: StructBuilder {
                path: self.path,
                name,
                items: Vec::with_capacity(len),
            },
        })
    }
}

struct SeqBuilder {
    path: String,
    items: Vec<Node>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SchemaError> {
        self.items.push(value.serialize(NodeSer {
            path: self.path.clone(),
        })?);
        Ok(())
    }

    fn end(self) -> Result<Node, SchemaError> {
        Ok(Node::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SchemaError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, SchemaError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SchemaError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, SchemaError> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    inner: SeqBuilder,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SchemaError> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Node, SchemaError> {
        let array = ser::SerializeSeq::end(self.inner)?;
        Ok(Node::Map(vec![MapItem::new(self.variant, array)]))
    }
}

struct MapBuilder {
    path: String,
    items: Vec<MapItem>,
    key: Option<String>,
    sort: bool,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), SchemaError> {
        self.key = Some(key.serialize(KeySer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SchemaError> {
        let key = self
            .key
            .take()
            .expect("serialize_value called without serialize_key");
        let node = value.serialize(NodeSer {
            path: path::join(&self.path, ".", &key),
        })?;
        insert_item(&mut self.items, MapItem::new(key, node))
            .map_err(|name| duplicate(&name, &self.path))
    }

    fn end(mut self) -> Result<Node, SchemaError> {
        if self.sort {
            self.items.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(Node::Map(self.items))
    }
}

struct StructBuilder {
    path: String,
    name: &'static str,
    items: Vec<MapItem>,
}

impl StructBuilder {
    /// Bare `std::time::Duration` fields arrive as a struct literally named
    /// `Duration` holding exactly `secs` and `nanos`; everything else keeps
    /// its record shape.
    fn finish(self) -> Node {
        if self.name == "Duration"
            && self.items.len() == 2
            && self.items[0].name == STD_DURATION_FIELDS[0]
            && self.items[1].name == STD_DURATION_FIELDS[1]
        {
            let secs = scalar_u64(&self.items[0].value);
            let nanos = scalar_u64(&self.items[1].value);
            if let (Some(secs), Some(nanos)) = (secs, nanos) {
                return Node::Scalar(Scalar::Duration(time::Duration::new(secs, nanos as u32)));
            }
        }
        Node::Map(self.items)
    }
}

fn scalar_u64(node: &Node) -> Option<u64> {
    match node {
        Node::Scalar(Scalar::Int(i)) => u64::try_from(*i).ok(),
        Node::Scalar(Scalar::UInt(u)) => Some(*u),
        _ => None,
    }
}

impl ser::SerializeStruct for StructBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SchemaError> {
        let node = value.serialize(NodeSer {
            path: path::join(&self.path, ".", key),
        })?;
        insert_item(&mut self.items, MapItem::new(key, node))
            .map_err(|name| duplicate(&name, &self.path))
    }

    fn end(self) -> Result<Node, SchemaError> {
        Ok(self.finish())
    }
}

struct VariantStructBuilder {
    variant: &'static str,
    inner: StructBuilder,
}

impl ser::SerializeStructVariant for VariantStructBuilder {
    type Ok = Node;
    type Error = SchemaError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SchemaError> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Node, SchemaError> {
        let inner = self.inner.finish();
        Ok(Node::Map(vec![MapItem::new(self.variant, inner)]))
    }
}

/// Serializer that renders a map key as a string. Strings, chars, integers,
/// booleans, and unit variants qualify; anything else is a schema error.
struct KeySer;

macro_rules! key_to_string {
    ($method:ident, $ty:ty) => {
        fn $method(self, v: $ty) -> Result<String, SchemaError> {
            Ok(v.to_string())
        }
    };
}

impl ser::Serializer for KeySer {
    type Ok = String;
    type Error = SchemaError;
    type SerializeSeq = Impossible<String, SchemaError>;
    type SerializeTuple = Impossible<String, SchemaError>;
    type SerializeTupleStruct = Impossible<String, SchemaError>;
    type SerializeTupleVariant = Impossible<String, SchemaError>;
    type SerializeMap = Impossible<String, SchemaError>;
    type SerializeStruct = Impossible<String, SchemaError>;
    type SerializeStructVariant = Impossible<String, SchemaError>;

    key_to_string!(serialize_bool, bool);
    key_to_string!(serialize_i8, i8);
    key_to_string!(serialize_i16, i16);
    key_to_string!(serialize_i32, i32);
    key_to_string!(serialize_i64, i64);
    key_to_string!(serialize_u8, u8);
    key_to_string!(serialize_u16, u16);
    key_to_string!(serialize_u32, u32);
    key_to_string!(serialize_u64, u64);
    key_to_string!(serialize_char, char);

    fn serialize_str(self, v: &str) -> Result<String, SchemaError> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, SchemaError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, SchemaError> {
        value.serialize(self)
    }

    fn serialize_f32(self, _: f32) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_f64(self, _: f64) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_none(self) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_unit(self) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<String, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, SchemaError> {
        Err(SchemaError("map keys must be strings".into()))
    }
}

// ---------------------------------------------------------------------------
// Deserialization: Node -> value

#[derive(Debug)]
pub(crate) struct DecodeError(String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError(msg.to_string())
    }
}

struct NodeDe<'a> {
    node: &'a Node,
}

const NO_NODES: &[Node] = &[];
const NO_ITEMS: &[MapItem] = &[];

impl NodeDe<'_> {
    fn mismatch(&self, expected: &str) -> DecodeError {
        DecodeError(format!("expected {expected}, found {}", self.node))
    }

    /// The text form of a scalar, used for string targets and parse-on-demand.
    fn text(&self) -> Result<String, DecodeError> {
        match self.node {
            Node::Scalar(Scalar::Str(s)) => Ok(s.clone()),
            Node::Scalar(Scalar::Bool(b)) => Ok(b.to_string()),
            Node::Scalar(Scalar::Int(i)) => Ok(i.to_string()),
            Node::Scalar(Scalar::UInt(u)) => Ok(u.to_string()),
            Node::Scalar(Scalar::Float(x)) => Ok(x.to_string()),
            Node::Scalar(Scalar::Duration(d)) => Ok(format_duration(*d)),
            _ => Err(self.mismatch("a string")),
        }
    }
}

macro_rules! deserialize_number {
    ($method:ident) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
            match self.node {
                Node::Scalar(Scalar::Int(i)) => visitor.visit_i64(*i),
                Node::Scalar(Scalar::UInt(u)) => visitor.visit_u64(*u),
                Node::Scalar(Scalar::Float(x)) => visitor.visit_f64(*x),
                Node::Scalar(Scalar::Str(s)) => {
                    if let Ok(i) = s.parse::<i64>() {
                        visitor.visit_i64(i)
                    } else if let Ok(u) = s.parse::<u64>() {
                        visitor.visit_u64(u)
                    } else if let Ok(x) = s.parse::<f64>() {
                        visitor.visit_f64(x)
                    } else {
                        Err(self.mismatch("a number"))
                    }
                }
                _ => Err(self.mismatch("a number")),
            }
        }
    };
}

impl<'de> de::Deserializer<'de> for NodeDe<'_> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.node {
            Node::Scalar(Scalar::Null) => visitor.visit_unit(),
            Node::Scalar(Scalar::Bool(b)) => visitor.visit_bool(*b),
            Node::Scalar(Scalar::Int(i)) => visitor.visit_i64(*i),
            Node::Scalar(Scalar::UInt(u)) => visitor.visit_u64(*u),
            Node::Scalar(Scalar::Float(x)) => visitor.visit_f64(*x),
            Node::Scalar(Scalar::Str(s)) => visitor.visit_string(s.clone()),
            Node::Scalar(Scalar::Duration(d)) => visitor.visit_string(format_duration(*d)),
            Node::Array(items) => visitor.visit_seq(SeqAcc {
                iter: items.iter(),
            }),
            Node::Map(items) => visitor.visit_map(MapAcc {
                iter: items.iter(),
                value: None,
            }),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.node {
            Node::Scalar(Scalar::Bool(b)) => visitor.visit_bool(*b),
            Node::Scalar(Scalar::Str(s)) => match s.parse::<bool>() {
                Ok(b) => visitor.visit_bool(b),
                Err(_) => Err(self.mismatch("a boolean")),
            },
            _ => Err(self.mismatch("a boolean")),
        }
    }

    deserialize_number!(deserialize_i8);
    deserialize_number!(deserialize_i16);
    deserialize_number!(deserialize_i32);
    deserialize_number!(deserialize_i64);
    deserialize_number!(deserialize_u8);
    deserialize_number!(deserialize_u16);
    deserialize_number!(deserialize_u32);
    deserialize_number!(deserialize_u64);
    deserialize_number!(deserialize_f32);
    deserialize_number!(deserialize_f64);

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let s = self.text()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(self.mismatch("a single character")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let text = self.text()?;
        visitor.visit_string(text)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.node {
            Node::Array(items) => {
                let mut buf = Vec::with_capacity(items.len());
                for item in items {
                    match scalar_u64(item) {
                        Some(b) if b <= u8::MAX as u64 => buf.push(b as u8),
                        _ => return Err(self.mismatch("a byte sequence")),
                    }
                }
                visitor.visit_byte_buf(buf)
            }
            Node::Scalar(Scalar::Str(s)) => visitor.visit_byte_buf(s.clone().into_bytes()),
            _ => Err(self.mismatch("a byte sequence")),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        if self.node.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.node {
            Node::Array(items) => visitor.visit_seq(SeqAcc {
                iter: items.iter(),
            }),
            Node::Scalar(Scalar::Null) => visitor.visit_seq(SeqAcc {
                iter: NO_NODES.iter(),
            }),
            _ => Err(self.mismatch("a sequence")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.node {
            Node::Map(items) => visitor.visit_map(MapAcc {
                iter: items.iter(),
                value: None,
            }),
            Node::Scalar(Scalar::Null) => visitor.visit_map(MapAcc {
                iter: NO_ITEMS.iter(),
                value: None,
            }),
            _ => Err(self.mismatch("a map")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        if name == "Duration" && fields == STD_DURATION_FIELDS {
            let duration = match self.node {
                Node::Scalar(Scalar::Duration(d)) => Some(*d),
                Node::Scalar(Scalar::Str(s)) => Some(parse_duration(s).map_err(DecodeError)?),
                Node::Scalar(Scalar::Int(i)) if *i >= 0 => {
                    Some(time::Duration::from_nanos(*i as u64))
                }
                Node::Scalar(Scalar::UInt(u)) => Some(time::Duration::from_nanos(*u)),
                _ => None,
            };
            if let Some(d) = duration {
                return visitor.visit_map(DurationAcc {
                    duration: d,
                    state: 0,
                });
            }
        }
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self.node {
            Node::Scalar(Scalar::Str(s)) => {
                visitor.visit_enum(s.clone().into_deserializer())
            }
            Node::Map(items) if items.len() == 1 => visitor.visit_enum(EnumAcc {
                variant: &items[0].name,
                value: &items[0].value,
            }),
            _ => Err(self.mismatch("an enum variant")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
}

struct SeqAcc<'a> {
    iter: std::slice::Iter<'a, Node>,
}

impl<'de> de::SeqAccess<'de> for SeqAcc<'_> {
    type Error = DecodeError;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        match self.iter.next() {
            Some(node) => seed.deserialize(NodeDe { node }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapAcc<'a> {
    iter: std::slice::Iter<'a, MapItem>,
    value: Option<&'a Node>,
}

impl<'de> de::MapAccess<'de> for MapAcc<'_> {
    type Error = DecodeError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        match self.iter.next() {
            Some(item) => {
                self.value = Some(&item.value);
                seed.deserialize(item.name.clone().into_deserializer())
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, DecodeError> {
        let node = self
            .value
            .take()
            .expect("next_value_seed called without next_key_seed");
        seed.deserialize(NodeDe { node })
    }
}

/// Feeds a duration scalar to std's `{secs, nanos}` struct visitor.
struct DurationAcc {
    duration: time::Duration,
    state: u8,
}

impl<'de> de::MapAccess<'de> for DurationAcc {
    type Error = DecodeError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        let key = match self.state {
            0 => STD_DURATION_FIELDS[0],
            1 => STD_DURATION_FIELDS[1],
            _ => return Ok(None),
        };
        seed.deserialize(de::value::BorrowedStrDeserializer::new(key))
            .map(Some)
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, DecodeError> {
        self.state += 1;
        match self.state {
            1 => seed.deserialize(self.duration.as_secs().into_deserializer()),
            _ => seed.deserialize(self.duration.subsec_nanos().into_deserializer()),
        }
    }
}

struct EnumAcc<'a> {
    variant: &'a str,
    value: &'a Node,
}

impl<'de, 'a> de::EnumAccess<'de> for EnumAcc<'a> {
    type Error = DecodeError;
    type Variant = VariantAcc<'a>;

    fn variant_seed<V: de::DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, VariantAcc<'a>), DecodeError> {
        let variant = seed.deserialize(self.variant.to_string().into_deserializer())?;
        Ok((variant, VariantAcc { value: self.value }))
    }
}

struct VariantAcc<'a> {
    value: &'a Node,
}

impl<'de> de::VariantAccess<'de> for VariantAcc<'_> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, DecodeError> {
        seed.deserialize(NodeDe { node: self.value })
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        NodeDe { node: self.value }.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        NodeDe { node: self.value }.deserialize_map(visitor)
    }
}
