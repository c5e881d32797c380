//! Map metadata record
//!
//! Shape (kind, width, set kind, window span, index) is written when the map
//! is defined; the `state.*` records are refreshed on every commit.

use std::path::Path;

use crate::alloc::Cursor;
use crate::error::{DenseError, Result};
use crate::index::IndexKind;
use crate::props::{Properties, PropertyValue};

use super::{MapKind, MapOptions, SetKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapMeta {
    pub kind: MapKind,
    /// Values per key of a fixed map
    pub values: usize,
    pub set_kind: SetKind,
    pub window_keys: u64,
    pub index: Option<IndexKind>,
    /// Largest key ever activated
    pub largest: Option<u64>,
    /// Append position of the value allocator
    pub cursor: Option<Cursor>,
}

impl MapMeta {
    const KIND: &'static str = "map.kind";
    const VALUES: &'static str = "map.values";
    const SET: &'static str = "map.set";
    const WINDOW: &'static str = "map.window";
    const INDEX: &'static str = "map.index";
    const LARGEST: &'static str = "state.largest";
    const CURSOR_BUFFER: &'static str = "state.cursor.buffer";
    const CURSOR_OFFSET: &'static str = "state.cursor.offset";

    pub fn new(options: &MapOptions, window_keys: u64) -> Self {
        Self {
            kind: options.kind,
            values: options.values,
            set_kind: options.set_kind,
            window_keys: window_keys.max(1),
            index: None,
            largest: None,
            cursor: None,
        }
    }

    /// Whether `options` describe the same storage shape
    pub fn conflicts_with(&self, options: &MapOptions) -> Option<String> {
        if self.kind != options.kind {
            return Some(format!("kind is {}, not {}", self.kind, options.kind));
        }
        match self.kind {
            MapKind::Fixed if self.values != options.values => Some(format!(
                "holds {} values per key, not {}",
                self.values, options.values
            )),
            MapKind::Set if self.set_kind != options.set_kind => Some(format!(
                "is a {} set, not {}",
                self.set_kind.name(),
                options.set_kind.name()
            )),
            _ => None,
        }
    }

    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.set(Self::KIND, PropertyValue::Class(self.kind.name().to_string()));
        props.set(Self::WINDOW, PropertyValue::Long(self.window_keys as i64));
        match self.kind {
            MapKind::Fixed => props.set(Self::VALUES, PropertyValue::Int(self.values as i32)),
            MapKind::Set => props.set(
                Self::SET,
                PropertyValue::Class(self.set_kind.name().to_string()),
            ),
            MapKind::List => {}
        }
        if let Some(index) = self.index {
            props.set(Self::INDEX, PropertyValue::Class(index.name().to_string()));
        }
        if let Some(largest) = self.largest {
            props.set(Self::LARGEST, PropertyValue::Long(largest as i64));
        }
        if let Some(cursor) = self.cursor {
            props.set(Self::CURSOR_BUFFER, PropertyValue::Long(i64::from(cursor.buffer)));
            props.set(Self::CURSOR_OFFSET, PropertyValue::Long(cursor.offset as i64));
        }
        props
    }

    pub fn from_properties(props: &Properties) -> Result<Self> {
        let kind = props
            .get_class(Self::KIND)
            .ok_or_else(|| DenseError::Config(format!("missing '{}'", Self::KIND)))
            .and_then(MapKind::from_name)?;
        let window_keys = props
            .get_long(Self::WINDOW)
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| DenseError::Config(format!("missing '{}'", Self::WINDOW)))?;

        let values = match kind {
            MapKind::Fixed => props
                .get_long(Self::VALUES)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| DenseError::Config(format!("missing '{}'", Self::VALUES)))?,
            _ => 0,
        };
        let set_kind = match props.get_class(Self::SET) {
            Some(name) => SetKind::from_name(name)?,
            None => SetKind::Plain,
        };
        let index = props.get_class(Self::INDEX).map(IndexKind::from_name).transpose()?;

        let largest = props.get_long(Self::LARGEST).and_then(|v| u64::try_from(v).ok());
        let cursor = match (
            props.get_long(Self::CURSOR_BUFFER),
            props.get_long(Self::CURSOR_OFFSET),
        ) {
            (Some(buffer), Some(offset)) => Some(Cursor {
                buffer: u32::try_from(buffer).unwrap_or(0),
                offset: u64::try_from(offset).unwrap_or(0),
            }),
            _ => None,
        };

        Ok(Self {
            kind,
            values,
            set_kind,
            window_keys,
            index,
            largest,
            cursor,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_properties(&Properties::load(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_properties().save(path)
    }
}
