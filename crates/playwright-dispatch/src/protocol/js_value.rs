//! Values that cross the evaluate boundary
//!
//! [`JsValue`] models everything the evaluate envelope can carry, including
//! the numbers JSON cannot (NaN, ±Infinity, −0), dates and references to
//! remote handles. Ordinary Rust data moves in and out of it through serde:
//! [`to_js_value`] for arguments and [`from_js_value`] for results.

use crate::error::{Error, Result};
use crate::protocol::JsHandle;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};
use serde::ser::{self, Serialize};
use std::collections::BTreeMap;

/// A JavaScript value as exchanged with `evaluate` and friends
#[derive(Clone, Debug)]
pub enum JsValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<JsValue>),
    Object(BTreeMap<String, JsValue>),
    /// A live remote object, sent by reference
    Handle(JsHandle),
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Bool(a), JsValue::Bool(b)) => a == b,
            // NaN equals NaN and the sign of zero matters
            (JsValue::Number(a), JsValue::Number(b)) => {
                (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Date(a), JsValue::Date(b)) => a == b,
            (JsValue::Array(a), JsValue::Array(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => a == b,
            (JsValue::Handle(a), JsValue::Handle(b)) => a.guid() == b.guid(),
            _ => false,
        }
    }
}

impl JsValue {
    pub fn is_null(&self) -> bool {
        matches!(self, JsValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsValue]> {
        match self {
            JsValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, JsValue>> {
        match self {
            JsValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&JsHandle> {
        match self {
            JsValue::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// Looks up a key of an object value.
    pub fn get(&self, key: &str) -> Option<&JsValue> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl From<bool> for JsValue {
    fn from(value: bool) -> Self {
        JsValue::Bool(value)
    }
}

impl From<f64> for JsValue {
    fn from(value: f64) -> Self {
        JsValue::Number(value)
    }
}

impl From<i32> for JsValue {
    fn from(value: i32) -> Self {
        JsValue::Number(value as f64)
    }
}

impl From<i64> for JsValue {
    fn from(value: i64) -> Self {
        JsValue::Number(value as f64)
    }
}

impl From<&str> for JsValue {
    fn from(value: &str) -> Self {
        JsValue::String(value.to_string())
    }
}

impl From<String> for JsValue {
    fn from(value: String) -> Self {
        JsValue::String(value)
    }
}

impl From<DateTime<Utc>> for JsValue {
    fn from(value: DateTime<Utc>) -> Self {
        JsValue::Date(value)
    }
}

impl From<JsHandle> for JsValue {
    fn from(value: JsHandle) -> Self {
        JsValue::Handle(value)
    }
}

impl From<&JsHandle> for JsValue {
    fn from(value: &JsHandle) -> Self {
        JsValue::Handle(value.clone())
    }
}

impl<T: Into<JsValue>> From<Option<T>> for JsValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(JsValue::Null, Into::into)
    }
}

impl<T: Into<JsValue>> From<Vec<T>> for JsValue {
    fn from(value: Vec<T>) -> Self {
        JsValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<JsValue>> FromIterator<(String, T)> for JsValue {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        JsValue::Object(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Converts any serializable value into a [`JsValue`].
///
/// Floats keep NaN, infinities and the sign of zero. `Option::None` and unit
/// become `Null`, structs and maps become objects, sequences become arrays.
/// Remote handles cannot pass through serde; build those with
/// [`JsValue::Handle`].
pub fn to_js_value<T: Serialize + ?Sized>(value: &T) -> Result<JsValue> {
    value.serialize(JsValueSerializer)
}

/// Converts a [`JsValue`] into any deserializable type.
///
/// Dates deserialize as ISO 8601 strings. Handles are rejected; read them
/// from the `JsValue` directly.
pub fn from_js_value<T: DeserializeOwned>(value: JsValue) -> Result<T> {
    T::deserialize(value)
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

struct JsValueSerializer;

impl ser::Serializer for JsValueSerializer {
    type Ok = JsValue;
    type Error = Error;

    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeVec;
    type SerializeTupleStruct = SerializeVec;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<JsValue> {
        Ok(JsValue::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_i16(self, v: i16) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_i32(self, v: i32) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_i64(self, v: i64) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_u8(self, v: u8) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_u16(self, v: u16) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_u32(self, v: u32) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_u64(self, v: u64) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_f32(self, v: f32) -> Result<JsValue> {
        Ok(JsValue::Number(v as f64))
    }

    fn serialize_f64(self, v: f64) -> Result<JsValue> {
        Ok(JsValue::Number(v))
    }

    fn serialize_char(self, v: char) -> Result<JsValue> {
        Ok(JsValue::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<JsValue> {
        Ok(JsValue::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<JsValue> {
        Ok(JsValue::Array(
            v.iter().map(|b| JsValue::Number(*b as f64)).collect(),
        ))
    }

    fn serialize_none(self) -> Result<JsValue> {
        Ok(JsValue::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<JsValue> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<JsValue> {
        Ok(JsValue::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<JsValue> {
        Ok(JsValue::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<JsValue> {
        Ok(JsValue::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<JsValue> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<JsValue> {
        let mut map = BTreeMap::new();
        map.insert(variant.to_string(), value.serialize(JsValueSerializer)?);
        Ok(JsValue::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeVec> {
        Ok(SerializeVec {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant> {
        Ok(SerializeTupleVariant {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeMap> {
        Ok(SerializeMap {
            map: BTreeMap::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<SerializeMap> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<SerializeStructVariant> {
        Ok(SerializeStructVariant {
            variant,
            map: BTreeMap::new(),
        })
    }
}

struct SerializeVec {
    items: Vec<JsValue>,
}

impl ser::SerializeSeq for SerializeVec {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(JsValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<JsValue> {
        Ok(JsValue::Array(self.items))
    }
}

impl ser::SerializeTuple for SerializeVec {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<JsValue> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeVec {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<JsValue> {
        ser::SerializeSeq::end(self)
    }
}

struct SerializeTupleVariant {
    variant: &'static str,
    items: Vec<JsValue>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(JsValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<JsValue> {
        let mut map = BTreeMap::new();
        map.insert(self.variant.to_string(), JsValue::Array(self.items));
        Ok(JsValue::Object(map))
    }
}

struct SerializeMap {
    map: BTreeMap<String, JsValue>,
    next_key: Option<String>,
}

fn key_to_string(key: JsValue) -> Result<String> {
    match key {
        JsValue::String(s) => Ok(s),
        JsValue::Bool(b) => Ok(b.to_string()),
        JsValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(format!("{}", n as i64)),
        JsValue::Number(n) => Ok(n.to_string()),
        other => Err(Error::Encode(format!(
            "object keys must be strings, got {:?}",
            other
        ))),
    }
}

impl ser::SerializeMap for SerializeMap {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.next_key = Some(key_to_string(key.serialize(JsValueSerializer)?)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| Error::Encode("map value without a key".to_string()))?;
        self.map.insert(key, value.serialize(JsValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<JsValue> {
        Ok(JsValue::Object(self.map))
    }
}

impl ser::SerializeStruct for SerializeMap {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.map
            .insert(key.to_string(), value.serialize(JsValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<JsValue> {
        Ok(JsValue::Object(self.map))
    }
}

struct SerializeStructVariant {
    variant: &'static str,
    map: BTreeMap<String, JsValue>,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = JsValue;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.map
            .insert(key.to_string(), value.serialize(JsValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<JsValue> {
        let mut outer = BTreeMap::new();
        outer.insert(self.variant.to_string(), JsValue::Object(self.map));
        Ok(JsValue::Object(outer))
    }
}

impl<'de> IntoDeserializer<'de, Error> for JsValue {
    type Deserializer = JsValue;

    fn into_deserializer(self) -> JsValue {
        self
    }
}

/// Largest integer an f64 holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl<'de> de::Deserializer<'de> for JsValue {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            JsValue::Null => visitor.visit_unit(),
            JsValue::Bool(b) => visitor.visit_bool(b),
            JsValue::Number(n) => {
                let integral = n.is_finite()
                    && n.fract() == 0.0
                    && n.abs() <= MAX_SAFE_INTEGER
                    && !(n == 0.0 && n.is_sign_negative());
                if integral && n >= 0.0 {
                    visitor.visit_u64(n as u64)
                } else if integral {
                    visitor.visit_i64(n as i64)
                } else {
                    visitor.visit_f64(n)
                }
            }
            JsValue::String(s) => visitor.visit_string(s),
            JsValue::Date(d) => visitor.visit_string(format_date(&d)),
            JsValue::Array(items) => {
                let mut seq: SeqDeserializer<_, Error> = SeqDeserializer::new(items.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            JsValue::Object(map) => {
                let mut access: MapDeserializer<'de, _, Error> = MapDeserializer::new(map.into_iter());
                let value = visitor.visit_map(&mut access)?;
                access.end()?;
                Ok(value)
            }
            JsValue::Handle(handle) => Err(Error::Decode(format!(
                "cannot deserialize remote handle {} into a plain value",
                handle.guid()
            ))),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            JsValue::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self {
            JsValue::String(variant) => {
                visitor.visit_enum(StringDeserializer::<Error>::new(variant))
            }
            other => Err(Error::Decode(format!(
                "expected a string for an enum, got {:?}",
                other
            ))),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}
