//! Typed property records
//!
//! The text format shared by `database.properties` and every `map.meta`.
//!
//! ## Record Format
//! ```text
//! # comment
//! key = tag:value
//! ```
//!
//! Tags: `long` (i64), `int` (i32), `byte` (u8), `bool`, `string` and
//! `class` (a named type reference such as a map kind).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DenseError, Result};

/// A single typed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Long(i64),
    Int(i32),
    Byte(u8),
    Bool(bool),
    Str(String),
    Class(String),
}

impl PropertyValue {
    fn tag(&self) -> &'static str {
        match self {
            PropertyValue::Long(_) => "long",
            PropertyValue::Int(_) => "int",
            PropertyValue::Byte(_) => "byte",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Str(_) => "string",
            PropertyValue::Class(_) => "class",
        }
    }

    /// Parse a `tag:value` pair
    pub fn parse(text: &str) -> Result<Self> {
        let (tag, raw) = text
            .split_once(':')
            .ok_or_else(|| DenseError::Config(format!("missing type tag in '{}'", text)))?;
        let raw = raw.trim();

        match tag.trim() {
            "long" => parse_number(raw).map(PropertyValue::Long),
            "int" => parse_number(raw).map(PropertyValue::Int),
            "byte" => parse_number(raw).map(PropertyValue::Byte),
            "bool" => parse_number(raw).map(PropertyValue::Bool),
            "string" => Ok(PropertyValue::Str(raw.to_string())),
            "class" => {
                if raw.is_empty() {
                    return Err(DenseError::Config("empty class reference".to_string()));
                }
                Ok(PropertyValue::Class(raw.to_string()))
            }
            other => Err(DenseError::Config(format!("unknown type tag '{}'", other))),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.tag())?;
        match self {
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Byte(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Str(v) | PropertyValue::Class(v) => write!(f, "{}", v),
        }
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| DenseError::Config(format!("bad value '{}': {}", raw, e)))
}

/// An ordered set of typed records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text format
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                DenseError::Config(format!("line {}: expected 'key = tag:value'", line_no + 1))
            })?;
            let value = PropertyValue::parse(value.trim())
                .map_err(|e| DenseError::Config(format!("line {}: {}", line_no + 1, e)))?;
            entries.insert(key.trim().to_string(), value);
        }

        Ok(Self { entries })
    }

    /// Load a record file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Write all records, replacing the file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Integer read that accepts any of the integer tags
    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            PropertyValue::Long(v) => Some(*v),
            PropertyValue::Int(v) => Some(i64::from(*v)),
            PropertyValue::Byte(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            PropertyValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_class(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            PropertyValue::Class(v) => Some(v),
            _ => None,
        }
    }
}
