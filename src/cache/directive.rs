//! Declarative per-route cache configuration.

use serde::{Deserialize, Serialize};

/// A freshness lifetime: whole seconds, or a time expression such as
/// `"+1 day"` resolved relative to the moment the response is decorated.
///
/// Deserializes from either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Age {
    Seconds(u64),
    Expression(String),
}

impl From<u64> for Age {
    fn from(seconds: u64) -> Self {
        Age::Seconds(seconds)
    }
}

impl From<&str> for Age {
    fn from(expression: &str) -> Self {
        Age::Expression(expression.to_owned())
    }
}

impl From<String> for Age {
    fn from(expression: String) -> Self {
        Age::Expression(expression)
    }
}

/// Who may store the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    #[default]
    Unset,
}

/// The cache and validation behavior declared for a route.
///
/// `etag` and `last_modified` are expressions evaluated against the request
/// attributes; everything else is applied to the handler's response as-is.
///
/// # Examples
///
/// ```
/// use revalidate::cache::{Age, CacheDirective, Visibility};
///
/// let directive = CacheDirective::new()
///     .etag(".post.revision")
///     .max_age("+10 minutes")
///     .shared_max_age(Age::Seconds(3600))
///     .vary(["Accept", "Accept-Encoding"])
///     .public();
///
/// assert_eq!(directive.visibility, Visibility::Public);
/// assert!(directive.has_expressions());
///
/// let parsed: CacheDirective = serde_json::from_str(
///     r#"{"etag": ".post.revision", "max_age": "+10 minutes",
///         "shared_max_age": 3600, "vary": ["Accept", "Accept-Encoding"],
///         "visibility": "public"}"#,
/// ).unwrap();
/// assert_eq!(parsed, directive);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheDirective {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub max_age: Option<Age>,
    #[serde(alias = "s_maxage")]
    pub shared_max_age: Option<Age>,
    pub expires: Option<String>,
    pub vary: Option<Vec<String>>,
    pub visibility: Visibility,
}

impl CacheDirective {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_modified(mut self, expression: impl Into<String>) -> Self {
        self.last_modified = Some(expression.into());
        self
    }

    #[must_use]
    pub fn etag(mut self, expression: impl Into<String>) -> Self {
        self.etag = Some(expression.into());
        self
    }

    #[must_use]
    pub fn max_age(mut self, age: impl Into<Age>) -> Self {
        self.max_age = Some(age.into());
        self
    }

    #[must_use]
    pub fn shared_max_age(mut self, age: impl Into<Age>) -> Self {
        self.shared_max_age = Some(age.into());
        self
    }

    #[must_use]
    pub fn expires(mut self, expression: impl Into<String>) -> Self {
        self.expires = Some(expression.into());
        self
    }

    #[must_use]
    pub fn vary<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vary = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn public(mut self) -> Self {
        self.visibility = Visibility::Public;
        self
    }

    #[must_use]
    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    /// `true` if computing validators for this directive needs an
    /// expression evaluator.
    pub fn has_expressions(&self) -> bool {
        self.expressions().next().is_some()
    }

    /// The validator expressions in evaluation order: last-modified, then etag.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.last_modified
            .as_deref()
            .into_iter()
            .chain(self.etag.as_deref())
    }
}
