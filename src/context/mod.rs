//! Per-request context: request identity, route parameters, the attribute
//! bag handlers and middleware share, and type-erased extensions.
//!
//! The attribute bag is what cache directive expressions are evaluated
//! against: the router seeds it with the matched path parameters, and any
//! middleware running before the cache layer may add richer values
//! (e.g. a loaded `post` object) with [`Context::attributes_mut`].

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde_json::{Map, Value};

use crate::Request;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one in-flight request.
///
/// Keys per-request state that must survive the [`Context`] being moved
/// down the middleware chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates a fresh id. Ids are never reused within a process.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Type-erased request extensions map: used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Remove a value from the extensions map
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Named request attributes, as JSON values.
///
/// # Examples
///
/// ```
/// use revalidate::context::Attributes;
/// use serde_json::json;
///
/// let mut attrs = Attributes::new();
/// attrs.insert("post", json!({ "id": 7, "updated_at": "2024-03-01T12:00:00Z" }));
/// assert_eq!(attrs.get("post").and_then(|p| p.get("id")), Some(&json!(7)));
/// ```
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Attributes {
    map: Map<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The whole bag as one JSON object, the input shape expression
    /// evaluators work on.
    pub fn to_value(&self) -> Value {
        Value::Object(self.map.clone())
    }
}

impl From<&Parameters> for Attributes {
    fn from(params: &Parameters) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in params.iter() {
            attributes.insert(key, value);
        }
        attributes
    }
}

/// Per-request context handed down the middleware chain to the handler.
pub struct Context {
    id: RequestId,
    request: Request,
    params: Parameters,
    attributes: Attributes,
    extensions: Extensions,
}

impl Context {
    /// Create a new context from a request, allocating a fresh [`RequestId`]
    pub fn new(request: Request) -> Self {
        Self::with_params(request, Parameters::new())
    }

    /// Create a context for a matched route. Path parameters are also
    /// copied into the attribute bag as strings.
    pub fn with_params(request: Request, params: Parameters) -> Self {
        Self {
            id: RequestId::next(),
            request,
            attributes: Attributes::from(&params),
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
