//! `Cache-Control` response directives.
//!
//! The conditional cache manages four directives (`max-age`, `s-maxage`,
//! `public`, `private`). Anything else a handler put in the header
//! (`no-store`, `must-revalidate`, `immutable`, …) is carried through
//! untouched.

use std::fmt;

/// Response `Cache-Control` directives.
///
/// Rendered with directives in alphabetical order, so two responses carrying
/// the same directives always produce the same header value.
///
/// # Examples
///
/// ```
/// use revalidate::http::CacheControl;
///
/// let mut cc = CacheControl::parse("no-store, max-age=5");
/// cc.set_max_age(60);
/// cc.set_public();
/// assert_eq!(cc.to_string(), "max-age=60, no-store, public");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
    public: bool,
    private: bool,
    // Unmanaged directives, verbatim.
    other: Vec<String>,
}

impl CacheControl {
    /// Parses a header value. Directive names are matched case-insensitively;
    /// unknown directives, and managed ones with an unusable argument, are
    /// kept verbatim.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::default();
        for directive in value.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim())),
                None => (directive, None),
            };
            let seconds = argument.and_then(|a| a.trim_matches('"').parse::<u64>().ok());
            match (name.to_ascii_lowercase().as_str(), argument) {
                ("max-age", Some(_)) if seconds.is_some() => cc.max_age = seconds,
                ("s-maxage", Some(_)) if seconds.is_some() => cc.s_maxage = seconds,
                ("public", None) => cc.public = true,
                ("private", None) => cc.private = true,
                _ => cc.other.push(directive.to_owned()),
            }
        }
        cc
    }

    /// Sets `max-age`, replacing any unparseable `max-age` carried verbatim.
    pub fn set_max_age(&mut self, seconds: u64) {
        self.forget_other("max-age");
        self.max_age = Some(seconds);
    }

    /// Sets `s-maxage`, replacing any unparseable `s-maxage` carried verbatim.
    pub fn set_s_maxage(&mut self, seconds: u64) {
        self.forget_other("s-maxage");
        self.s_maxage = Some(seconds);
    }

    /// Marks the response as storable by shared caches. Clears `private`.
    pub fn set_public(&mut self) {
        self.public = true;
        self.private = false;
    }

    /// Restricts the response to private caches. Clears `public`.
    pub fn set_private(&mut self) {
        self.private = true;
        self.public = false;
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// `true` if `name` appears among the directives, managed or not.
    pub fn contains(&self, name: &str) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "max-age" if self.max_age.is_some() => true,
            "s-maxage" if self.s_maxage.is_some() => true,
            "public" if self.public => true,
            "private" if self.private => true,
            _ => self.other.iter().any(|directive| directive_name(directive).eq_ignore_ascii_case(name)),
        }
    }

    fn forget_other(&mut self, name: &str) {
        self.other
            .retain(|directive| !directive_name(directive).eq_ignore_ascii_case(name));
    }

    /// `true` when no directive is set and the header should be omitted.
    pub fn is_empty(&self) -> bool {
        self.max_age.is_none()
            && self.s_maxage.is_none()
            && !self.public
            && !self.private
            && self.other.is_empty()
    }
}

fn directive_name(directive: &str) -> &str {
    directive
        .split_once('=')
        .map_or(directive, |(name, _)| name)
        .trim()
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut directives: Vec<String> = self.other.clone();
        if let Some(age) = self.max_age {
            directives.push(format!("max-age={age}"));
        }
        if self.private {
            directives.push("private".to_owned());
        }
        if self.public {
            directives.push("public".to_owned());
        }
        if let Some(age) = self.s_maxage {
            directives.push(format!("s-maxage={age}"));
        }
        directives.sort_by_key(|directive| directive.to_ascii_lowercase());
        f.write_str(&directives.join(", "))
    }
}
