//! Cache Value Module
//!
//! The value model every store persists, and a reference-preserving wire
//! encoding that terminates on cyclic object graphs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CacheError, Result};

type Fields = BTreeMap<String, CacheValue>;

// == Cache Value ==
/// A value that can be stored in any cache.
///
/// Scalars and lists are plain data. Objects are shared handles, so a graph
/// may alias the same object in several places or point back at itself.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<CacheValue>),
    Object(ObjectRef),
}

// == Object Handle ==
/// Shared, mutable object with named fields.
///
/// Cloning an `ObjectRef` clones the handle, not the object. Use
/// [`ObjectRef::ptr_eq`] to ask whether two handles are the same instance.
#[derive(Clone, Default)]
pub struct ObjectRef {
    inner: Arc<Mutex<Fields>>,
}

impl ObjectRef {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an object from `(name, value)` pairs.
    pub fn with_fields<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<CacheValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = Self::new();
        for (name, value) in fields {
            object.set(name, value);
        }
        object
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<CacheValue>) {
        self.lock().insert(name.into(), value.into());
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<CacheValue> {
        self.lock().get(name).cloned()
    }

    /// Removes a field, returning its value.
    pub fn remove(&self, name: &str) -> Option<CacheValue> {
        self.lock().remove(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the fields. Nested objects are shared, not copied.
    pub fn fields(&self) -> BTreeMap<String, CacheValue> {
        self.lock().clone()
    }

    /// True when both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    fn lock(&self) -> MutexGuard<'_, Fields> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ObjectRef {
    // Field values are omitted so self-referencing graphs still print.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        write!(f, "Object@{:#x}{:?}", self.identity(), names)
    }
}

// == Equality ==
impl PartialEq for CacheValue {
    /// Structural equality. Cycles are compared coinductively: a pair of
    /// objects already under comparison is assumed equal.
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other, &mut HashSet::new())
    }
}

fn values_equal(a: &CacheValue, b: &CacheValue, visiting: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (CacheValue::Null, CacheValue::Null) => true,
        (CacheValue::Bool(x), CacheValue::Bool(y)) => x == y,
        (CacheValue::Int(x), CacheValue::Int(y)) => x == y,
        (CacheValue::Float(x), CacheValue::Float(y)) => x == y,
        (CacheValue::Str(x), CacheValue::Str(y)) => x == y,
        (CacheValue::List(x), CacheValue::List(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|(l, r)| values_equal(l, r, visiting))
        }
        (CacheValue::Object(x), CacheValue::Object(y)) => {
            if x.ptr_eq(y) || !visiting.insert((x.identity(), y.identity())) {
                return true;
            }
            // Snapshots keep no lock held while recursing into aliased objects.
            let (left, right) = (x.fields(), y.fields());
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb, visiting))
        }
        _ => false,
    }
}

// == Accessors ==
impl CacheValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CacheValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            CacheValue::Object(o) => Some(o),
            _ => None,
        }
    }

    // == Encoding ==
    /// Encodes the value into its reference-preserving wire form.
    pub fn encode(&self) -> EncodedValue {
        Encoder::default().encode(self)
    }

    /// Encodes the value, refusing floats that JSON cannot carry.
    ///
    /// Every store persists or transmits values as JSON, where NaN and the
    /// infinities have no representation.
    pub fn encode_portable(&self) -> Result<EncodedValue> {
        let encoded = self.encode();
        match encoded.non_finite_float() {
            Some(f) => Err(CacheError::InvalidRequest(format!("{f} cannot be stored"))),
            None => Ok(encoded),
        }
    }

    /// Encodes the value as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.encode())?)
    }

    /// Decodes a value previously produced by [`CacheValue::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let encoded: EncodedValue = serde_json::from_slice(bytes)?;
        encoded.decode()
    }

    // == serde Interop ==
    /// Builds a value from any serializable type.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Converts the value into a typed structure.
    ///
    /// Fails for cyclic graphs, which have no plain-data form.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }

    /// Converts the value into plain JSON. Fails on cycles.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        to_json(self, &mut Vec::new())
    }
}

fn to_json(value: &CacheValue, path: &mut Vec<usize>) -> Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match value {
        CacheValue::Null => Value::Null,
        CacheValue::Bool(b) => Value::Bool(*b),
        CacheValue::Int(i) => Value::from(*i),
        CacheValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| CacheError::InvalidRequest(format!("{f} has no JSON form")))?,
        CacheValue::Str(s) => Value::String(s.clone()),
        CacheValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item, path))
                .collect::<Result<_>>()?,
        ),
        CacheValue::Object(object) => {
            let id = object.identity();
            if path.contains(&id) {
                return Err(CacheError::InvalidRequest(
                    "cyclic value has no JSON form".to_string(),
                ));
            }
            path.push(id);
            let mut map = serde_json::Map::new();
            for (name, field) in object.fields() {
                map.insert(name, to_json(&field, path)?);
            }
            path.pop();
            Value::Object(map)
        }
    })
}

// == Conversions ==
impl From<bool> for CacheValue {
    fn from(v: bool) -> Self {
        CacheValue::Bool(v)
    }
}

impl From<i64> for CacheValue {
    fn from(v: i64) -> Self {
        CacheValue::Int(v)
    }
}

impl From<i32> for CacheValue {
    fn from(v: i32) -> Self {
        CacheValue::Int(v.into())
    }
}

impl From<f64> for CacheValue {
    fn from(v: f64) -> Self {
        CacheValue::Float(v)
    }
}

impl From<&str> for CacheValue {
    fn from(v: &str) -> Self {
        CacheValue::Str(v.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(v: String) -> Self {
        CacheValue::Str(v)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(v: Vec<CacheValue>) -> Self {
        CacheValue::List(v)
    }
}

impl From<ObjectRef> for CacheValue {
    fn from(v: ObjectRef) -> Self {
        CacheValue::Object(v)
    }
}

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CacheValue::Null, Into::into)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;

        match v {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CacheValue::Int(i),
                None => CacheValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => CacheValue::Str(s),
            Value::Array(items) => CacheValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => CacheValue::Object(ObjectRef::with_fields(map)),
        }
    }
}

// == Wire Form ==
/// Serializable form of a [`CacheValue`].
///
/// Every object is emitted once with a numeric id; later occurrences of the
/// same object become `Ref(id)`. Decoding rebuilds fresh objects, so the
/// result shares no state with the original graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum EncodedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<EncodedValue>),
    Object {
        id: u32,
        fields: Vec<(String, EncodedValue)>,
    },
    Ref(u32),
}

impl EncodedValue {
    /// Rebuilds an independent value graph.
    pub fn decode(&self) -> Result<CacheValue> {
        Decoder::default().decode(self)
    }

    /// First NaN or infinite float anywhere in the tree.
    pub fn non_finite_float(&self) -> Option<f64> {
        match self {
            EncodedValue::Float(f) if !f.is_finite() => Some(*f),
            EncodedValue::List(items) => items.iter().find_map(Self::non_finite_float),
            EncodedValue::Object { fields, .. } => {
                fields.iter().find_map(|(_, field)| field.non_finite_float())
            }
            _ => None,
        }
    }
}

#[derive(Default)]
struct Encoder {
    seen: HashMap<usize, u32>,
}

impl Encoder {
    fn encode(&mut self, value: &CacheValue) -> EncodedValue {
        match value {
            CacheValue::Null => EncodedValue::Null,
            CacheValue::Bool(b) => EncodedValue::Bool(*b),
            CacheValue::Int(i) => EncodedValue::Int(*i),
            CacheValue::Float(f) => EncodedValue::Float(*f),
            CacheValue::Str(s) => EncodedValue::Str(s.clone()),
            CacheValue::List(items) => {
                EncodedValue::List(items.iter().map(|item| self.encode(item)).collect())
            }
            CacheValue::Object(object) => {
                if let Some(id) = self.seen.get(&object.identity()) {
                    return EncodedValue::Ref(*id);
                }
                let id = self.seen.len() as u32;
                self.seen.insert(object.identity(), id);
                let fields = object
                    .fields()
                    .into_iter()
                    .map(|(name, field)| (name, self.encode(&field)))
                    .collect();
                EncodedValue::Object { id, fields }
            }
        }
    }
}

#[derive(Default)]
struct Decoder {
    objects: HashMap<u32, ObjectRef>,
}

impl Decoder {
    fn decode(&mut self, encoded: &EncodedValue) -> Result<CacheValue> {
        Ok(match encoded {
            EncodedValue::Null => CacheValue::Null,
            EncodedValue::Bool(b) => CacheValue::Bool(*b),
            EncodedValue::Int(i) => CacheValue::Int(*i),
            EncodedValue::Float(f) => CacheValue::Float(*f),
            EncodedValue::Str(s) => CacheValue::Str(s.clone()),
            EncodedValue::List(items) => CacheValue::List(
                items
                    .iter()
                    .map(|item| self.decode(item))
                    .collect::<Result<_>>()?,
            ),
            EncodedValue::Object { id, fields } => {
                // Registered before the fields so back-references resolve.
                let object = ObjectRef::new();
                self.objects.insert(*id, object.clone());
                for (name, field) in fields {
                    let value = self.decode(field)?;
                    object.set(name.clone(), value);
                }
                CacheValue::Object(object)
            }
            EncodedValue::Ref(id) => self
                .objects
                .get(id)
                .cloned()
                .map(CacheValue::Object)
                .ok_or_else(|| CacheError::Backend(format!("dangling object reference {id}")))?,
        })
    }
}
