//! Field paths inside an object document
//!
//! Paths are rendered in a compact dotted form that survives round-trips
//! through persisted state:
//!
//! - `spec.replicas` - plain object fields
//! - `metadata.annotations["example.com/owner"]` - keys that are not plain identifiers
//! - `spec.containers[name=nginx].image` - list items selected by merge key
//! - `spec.finalizers[=kubernetes]` - set items selected by value
//! - `spec.args[2]` - list items selected by position
//!
//! Inside selectors, `\`, `"`, `,`, `=` and `]` are escaped with a backslash.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Object member
    Field(String),
    /// List item identified by its merge keys (sorted by key name)
    Key(Vec<(String, String)>),
    /// Set item identified by its value
    Value(String),
    /// List item identified by position
    Index(usize),
}

impl Segment {
    /// Build a key selector, normalizing key order
    pub fn key<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        pairs.sort();
        Segment::Key(pairs)
    }

    /// Characters escaped inside `[...]` selectors
    const SELECTOR_SPECIAL: &'static [char] = &['\\', '"', ',', '=', ']'];

    fn is_plain_identifier(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

/// A path to a field inside an object document
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The empty path (the document root)
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from plain field names
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: names.into_iter().map(|n| Segment::Field(n.into())).collect(),
        }
    }

    /// Path segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Return a new path with `segment` appended
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Self { segments }
    }

    /// Return a new path with a plain field appended
    pub fn field(&self, name: impl Into<String>) -> Self {
        self.child(Segment::Field(name.into()))
    }

    /// Check if this path equals `other` or is one of its ancestors
    pub fn covers(&self, other: &FieldPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    /// Check if either path covers the other
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.covers(other) || other.covers(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if Segment::is_plain_identifier(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Segment::Field(name) => {
                    f.write_str("[\"")?;
                    for c in name.chars() {
                        if c == '"' || c == '\\' {
                            f.write_str("\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                    f.write_str("\"]")?;
                }
                Segment::Key(pairs) => {
                    f.write_str("[")?;
                    for (j, (k, v)) in pairs.iter().enumerate() {
                        if j > 0 {
                            f.write_str(",")?;
                        }
                        write_selector(f, k)?;
                        f.write_str("=")?;
                        write_selector(f, v)?;
                    }
                    f.write_str("]")?;
                }
                Segment::Value(value) => {
                    f.write_str("[=")?;
                    write_selector(f, value)?;
                    f.write_str("]")?;
                }
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

fn write_selector(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        if Segment::SELECTOR_SPECIAL.contains(&c) {
            f.write_str("\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl FromStr for FieldPath {
    type Err = CoreError;

    fn from_str(input: &str) -> Result<Self> {
        Parser::new(input).parse()
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::InvalidPath {
            path: self.input.to_string(),
            message: message.into(),
        }
    }

    fn parse(mut self) -> Result<FieldPath> {
        let mut segments = Vec::new();

        if self.input.trim().is_empty() {
            return Err(self.error("path is empty"));
        }

        loop {
            match self.chars.peek().map(|(_, c)| *c) {
                None => break,
                Some('[') => {
                    self.chars.next();
                    segments.push(self.parse_bracket()?);
                }
                Some('.') if !segments.is_empty() => {
                    self.chars.next();
                    segments.push(Segment::Field(self.parse_identifier()?));
                }
                Some('.') => return Err(self.error("path cannot start with '.'")),
                Some(_) if segments.is_empty() => {
                    segments.push(Segment::Field(self.parse_identifier()?));
                }
                Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
            }
        }

        Ok(FieldPath { segments })
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let mut name = String::new();
        while let Some((_, c)) = self.chars.peek() {
            if *c == '.' || *c == '[' {
                break;
            }
            name.push(*c);
            self.chars.next();
        }
        if name.is_empty() {
            return Err(self.error("empty field name"));
        }
        Ok(name)
    }

    fn parse_bracket(&mut self) -> Result<Segment> {
        if let Some((_, '"')) = self.chars.peek() {
            self.chars.next();
            let mut name = String::new();
            loop {
                match self.chars.next() {
                    Some((_, '\\')) => match self.chars.next() {
                        Some((_, c)) => name.push(c),
                        None => return Err(self.error("unterminated escape")),
                    },
                    Some((_, '"')) => break,
                    Some((_, c)) => name.push(c),
                    None => return Err(self.error("unterminated quoted key")),
                }
            }
            self.expect(']')?;
            return Ok(Segment::Field(name));
        }

        // Each item is a key and, once an unescaped '=' is seen, a value
        let mut items: Vec<(String, Option<String>)> = vec![(String::new(), None)];
        loop {
            let c = match self.chars.next() {
                Some((_, ']')) => break,
                Some((_, ',')) => {
                    items.push((String::new(), None));
                    continue;
                }
                Some((_, '=')) if items.last().is_some_and(|(_, v)| v.is_none()) => {
                    if let Some(last) = items.last_mut() {
                        last.1 = Some(String::new());
                    }
                    continue;
                }
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => c,
                    None => return Err(self.error("unterminated escape")),
                },
                Some((_, c)) => c,
                None => return Err(self.error("missing ']'")),
            };
            if let Some((key, value)) = items.last_mut() {
                match value {
                    Some(value) => value.push(c),
                    None => key.push(c),
                }
            }
        }

        if let [(key, value)] = items.as_slice() {
            match value {
                Some(value) if key.is_empty() => return Ok(Segment::Value(value.clone())),
                None if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) => {
                    let index = key
                        .parse()
                        .map_err(|_| self.error(format!("invalid index '{}'", key)))?;
                    return Ok(Segment::Index(index));
                }
                _ => {}
            }
        }

        let mut pairs = Vec::with_capacity(items.len());
        for (key, value) in items {
            let Some(value) = value else {
                return Err(self.error(format!("invalid selector '{}'", key)));
            };
            if key.is_empty() {
                return Err(self.error(format!("selector '={}' has no key", value)));
            }
            pairs.push((key, value));
        }
        Ok(Segment::key(pairs))
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            _ => Err(self.error(format!("expected '{}'", expected))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> FieldPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_plain_fields() {
        let path = parse("spec.replicas");
        assert_eq!(path, FieldPath::fields(["spec", "replicas"]));
        assert_eq!(path.to_string(), "spec.replicas");
    }

    #[test]
    fn test_quoted_key() {
        let path = parse("metadata.annotations[\"example.com/owner\"]");
        assert_eq!(
            path,
            FieldPath::fields(["metadata", "annotations", "example.com/owner"])
        );
        assert_eq!(
            path.to_string(),
            "metadata.annotations[\"example.com/owner\"]"
        );
    }

    #[test]
    fn test_key_selector_is_normalized() {
        let path = parse("spec.ports[protocol=TCP,port=80].name");
        assert_eq!(path.to_string(), "spec.ports[port=80,protocol=TCP].name");
        assert_eq!(
            path.segments()[1],
            Segment::key([("port", "80"), ("protocol", "TCP")])
        );
    }

    #[test]
    fn test_value_and_index() {
        let path = parse("metadata.finalizers[=kubernetes]");
        assert_eq!(
            path.segments()[2],
            Segment::Value("kubernetes".to_string())
        );

        let path = parse("spec.args[2]");
        assert_eq!(path.segments()[2], Segment::Index(2));
    }

    #[test]
    fn test_selector_special_characters_survive() {
        let path = FieldPath::fields(["spec", "rules"])
            .child(Segment::key([("host", "a,b=c]"), ("path", "/x\\y")]))
            .field("backend");
        let rendered = path.to_string();
        assert_eq!(rendered, "spec.rules[host=a\\,b\\=c\\],path=/x\\\\y].backend");
        assert_eq!(parse(&rendered), path);

        let value = FieldPath::fields(["metadata", "finalizers"])
            .child(Segment::Value("example.com/a]b".to_string()));
        assert_eq!(parse(&value.to_string()), value);

        // A digit value selector is not a position
        let quoted = FieldPath::fields(["spec", "args"]).child(Segment::Value("7".to_string()));
        assert_eq!(parse(&quoted.to_string()), quoted);
    }

    #[test]
    fn test_invalid_paths() {
        assert!("".parse::<FieldPath>().is_err());
        assert!(".spec".parse::<FieldPath>().is_err());
        assert!("spec..replicas".parse::<FieldPath>().is_err());
        assert!("spec[".parse::<FieldPath>().is_err());
        assert!("spec[\"open".parse::<FieldPath>().is_err());
        assert!("spec.ports[nokey]".parse::<FieldPath>().is_err());
    }

    #[test]
    fn test_covers() {
        let spec = parse("spec");
        let replicas = parse("spec.replicas");
        let other = parse("specs");

        assert!(spec.covers(&replicas));
        assert!(spec.covers(&spec));
        assert!(!replicas.covers(&spec));
        assert!(!other.covers(&replicas));
        assert!(replicas.overlaps(&spec));
    }

    #[test]
    fn test_serde_as_string() {
        let path = parse("data[\"app.conf\"]");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"data[\\\"app.conf\\\"]\"");

        let back: FieldPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
