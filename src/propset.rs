// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Flat, typed, ordered property maps returned to callers.

use std::collections::BTreeMap;
use std::fmt;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Str(String),
    Int(i64),
    Map(BTreeMap<String, String>),
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Str(value) => f.write_str(value),
            Property::Int(value) => write!(f, "{value}"),
            Property::Map(map) => write!(f, "{map:?}"),
        }
    }
}

/// Ordered-by-key mapping from property name to typed value.
///
/// Rendering is stable: entries print in key order, map values as
/// aligned nested rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropSet(BTreeMap<String, Property>);

impl PropSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, prop: Property) -> Self {
        self.0.insert(name.into(), prop);
        self
    }

    pub fn add_string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, Property::Str(value.into()))
    }

    pub fn add_int(self, name: impl Into<String>, value: i64) -> Self {
        self.add(name, Property::Int(value))
    }

    pub fn add_map<I>(self, name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.add(name, Property::Map(entries.into_iter().collect()))
    }

    /// Merges `other` into `self`; later writes win per key.
    pub fn merge(&mut self, other: PropSet) {
        for (name, prop) in other.0 {
            self.0.insert(name, prop);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.0.iter()
    }
}

impl fmt::Display for PropSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.0.keys().map(String::len).max().unwrap_or(0);

        for (name, prop) in &self.0 {
            match prop {
                Property::Map(map) if map.is_empty() => {
                    writeln!(f, "{name:<width$}  {{}}")?;
                }
                Property::Map(map) => {
                    let key_width = map.keys().map(String::len).max().unwrap_or(0);
                    let mut first = true;
                    for (key, value) in map {
                        if first {
                            writeln!(f, "{name:<width$}  {key:<key_width$}  {value}")?;
                            first = false;
                        } else {
                            writeln!(f, "{:<width$}  {key:<key_width$}  {value}", "")?;
                        }
                    }
                }
                other => writeln!(f, "{name:<width$}  {other}")?,
            }
        }

        Ok(())
    }
}
