//! # Filter specification
//!
//! A filter is assembled from `-F kind:value` clauses. Each clause is parsed
//! into a [`FilterClause`] and applied to a [`FilterSpec`], which is then
//! read-only for the rest of the run.
//!
//! Patterns within one kind (`host`, `path`, `ctype`) are alternatives; the
//! different kinds must all match.

use std::fmt::{self, Display};

use chrono::{DateTime, Local, TimeZone};

use crate::age::{parse_age, resolve_age};
use crate::error::{GrabError, Result};
use crate::index::CacheObject;
use crate::location::{extract_host, extract_path};
use crate::size::parse_size;

/// Inclusive range with optional ends. A missing end is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> Default for Bounds<T> {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
        }
    }
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub fn new(modifier: Modifier, value: T) -> Self {
        match modifier {
            Modifier::AtLeast => Self {
                min: Some(value),
                max: None,
            },
            Modifier::AtMost => Self {
                min: None,
                max: Some(value),
            },
            Modifier::Exactly => Self {
                min: Some(value),
                max: Some(value),
            },
        }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl<T: Display + PartialEq> Display for Bounds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "any"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (Some(min), Some(max)) if min == max => write!(f, "= {min}"),
            (Some(min), Some(max)) => write!(f, "{min} - {max}"),
        }
    }
}

/// Comparison prefix of `size:` and `mtime:` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `+`: the value or more.
    AtLeast,
    /// `-`: the value or less.
    AtMost,
    /// `=` or no prefix.
    Exactly,
}

impl Modifier {
    fn split(value: &str) -> (Self, &str) {
        match value.as_bytes().first() {
            Some(b'+') => (Modifier::AtLeast, &value[1..]),
            Some(b'-') => (Modifier::AtMost, &value[1..]),
            Some(b'=') => (Modifier::Exactly, &value[1..]),
            _ => (Modifier::Exactly, value),
        }
    }
}

/// One parsed `kind:value` filter clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterClause {
    Size(Modifier, u32),
    Host(String),
    Path(String),
    ContentType(String),
    /// Absolute modification time in seconds since the epoch.
    Mtime(Modifier, i64),
    /// Relative age expression, resolved when the clause is applied.
    Age(String),
}

impl FilterClause {
    /// Parse a clause such as `size:+10k`, `host:example.com` or `age:7d`.
    pub fn parse(clause: &str) -> Result<Self> {
        let Some((kind, value)) = clause.split_once(':') else {
            return Err(GrabError::config(format!("Unknown filter type: {clause}")));
        };

        match kind {
            "size" => {
                let (modifier, size) = Modifier::split(value);
                Ok(FilterClause::Size(modifier, parse_size(size)?))
            }
            "host" => Ok(FilterClause::Host(value.to_string())),
            "path" => Ok(FilterClause::Path(value.to_string())),
            "ctype" => Ok(FilterClause::ContentType(value.to_string())),
            "mtime" => {
                let (modifier, time) = Modifier::split(value);
                Ok(FilterClause::Mtime(modifier, parse_unix_time(time)?))
            }
            "age" => {
                // Validate eagerly so a typo fails before anything else happens.
                parse_age(value)?;
                Ok(FilterClause::Age(value.to_string()))
            }
            _ => Err(GrabError::config(format!("Unknown filter type: {clause}"))),
        }
    }
}

/// Parse an `@<epoch-seconds>` literal.
fn parse_unix_time(value: &str) -> Result<i64> {
    value
        .strip_prefix('@')
        .and_then(|secs| secs.parse::<i64>().ok())
        .ok_or_else(|| GrabError::config(format!("Unrecognized date format: {value}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeSource {
    Mtime,
    Age,
}

/// The complete set of predicates objects are matched against.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    size: Bounds<u64>,
    mtime: Bounds<i64>,
    hosts: Vec<String>,
    paths: Vec<String>,
    content_types: Vec<String>,
    time_source: Option<TimeSource>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a specification from raw clause strings, in order.
    pub fn from_clauses<I, S>(clauses: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Local::now();
        let mut spec = Self::new();
        for clause in clauses {
            spec.apply_at(FilterClause::parse(clause.as_ref())?, &now)?;
        }
        Ok(spec)
    }

    /// Apply one clause, resolving relative ages against the current time.
    pub fn apply(&mut self, clause: FilterClause) -> Result<()> {
        self.apply_at(clause, &Local::now())
    }

    /// Apply one clause, resolving relative ages against `now`.
    pub fn apply_at<Tz: TimeZone>(&mut self, clause: FilterClause, now: &DateTime<Tz>) -> Result<()> {
        match clause {
            FilterClause::Size(modifier, size) => {
                self.size = Bounds::new(modifier, u64::from(size));
            }
            FilterClause::Host(pattern) => self.hosts.push(pattern),
            FilterClause::Path(pattern) => self.paths.push(pattern),
            FilterClause::ContentType(pattern) => self.content_types.push(pattern),
            FilterClause::Mtime(modifier, time) => {
                self.claim_time_source(TimeSource::Mtime)?;
                self.mtime = Bounds::new(modifier, time);
            }
            FilterClause::Age(expr) => {
                self.claim_time_source(TimeSource::Age)?;
                let cutoff = resolve_age(&expr, now)?;
                self.mtime = Bounds {
                    min: Some(cutoff.timestamp()),
                    max: Some(now.timestamp()),
                };
            }
        }
        Ok(())
    }

    fn claim_time_source(&mut self, source: TimeSource) -> Result<()> {
        match self.time_source {
            Some(existing) if existing != source => Err(GrabError::config(
                "'age' and 'mtime' filters are mutually exclusive",
            )),
            _ => {
                self.time_source = Some(source);
                Ok(())
            }
        }
    }

    pub fn size(&self) -> Bounds<u64> {
        self.size
    }

    pub fn mtime(&self) -> Bounds<i64> {
        self.mtime
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    pub fn matches_host(&self, location: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = extract_host(location);
        self.hosts.iter().any(|pattern| host.contains(pattern.as_str()))
    }

    pub fn matches_path(&self, location: &str) -> bool {
        if self.paths.is_empty() {
            return true;
        }
        let Some(path) = extract_path(location) else {
            return false;
        };
        self.paths.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    pub fn matches_content_type(&self, content_type: Option<&str>) -> bool {
        if self.content_types.is_empty() {
            return true;
        }
        let Some(content_type) = content_type else {
            return false;
        };
        self.content_types
            .iter()
            .any(|pattern| content_type.contains(pattern.as_str()))
    }

    pub fn matches_size(&self, size: u64) -> bool {
        self.size.contains(size)
    }

    pub fn matches_mtime(&self, mtime: i64) -> bool {
        self.mtime.contains(mtime)
    }

    /// Cheap size check against the storage file length.
    ///
    /// A storage file always holds at least as many bytes as the body it
    /// contains, so only the lower bound can be tested before parsing.
    pub fn admits_storage_size(&self, storage_len: u64) -> bool {
        self.size.min.is_none_or(|min| storage_len >= min)
    }

    /// Predicates that need the parsed object: exact size, path and content type.
    pub fn matches_object(&self, object: &CacheObject) -> bool {
        self.matches_size(object.size)
            && self.matches_path(&object.location)
            && self.matches_content_type(object.content_type.as_deref())
    }
}

impl Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterSpec {{ size: {}, mtime: {}", self.size, self.mtime)?;
        for (name, patterns) in [
            ("hosts", &self.hosts),
            ("paths", &self.paths),
            ("ctypes", &self.content_types),
        ] {
            if !patterns.is_empty() {
                write!(f, ", {name}: [{}]", patterns.join(", "))?;
            }
        }
        write!(f, " }}")
    }
}
