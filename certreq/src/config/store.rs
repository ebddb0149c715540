// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use super::ConfigError;
use log::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Line range `[start, end)` holding the assignments of one tag
///
/// The range starts on the line after the `[name]` header and ends before
/// the next header, or at the end of the file. The default section, made
/// of the lines before the first header, has an empty name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRange {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl TagRange {
    pub fn is_default_section(&self) -> bool {
        self.name.is_empty() && self.start == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    Ignored,
    Tag(&'a str),
    Assignment { key: &'a str, value: &'a str },
    // Closed bracket followed by more text, neither a tag nor a value
    Stray,
    Malformed,
    Other,
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Ignored;
    }

    if let Some(rest) = trimmed.strip_prefix('[') {
        return match rest.strip_suffix(']') {
            Some(name) => Line::Tag(name.trim()),
            None if rest.contains(']') => Line::Stray,
            None => Line::Malformed,
        };
    }

    match trimmed.split_once('=') {
        Some((key, value)) => Line::Assignment {
            key: key.trim(),
            value: value.trim(),
        },
        None => Line::Other,
    }
}

fn assigned_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    match classify(line) {
        Line::Assignment { key: k, value } if k == key => Some(value),
        _ => None,
    }
}

/// Configuration file kept as its raw lines
///
/// Nothing is stripped or rewritten when loading, so line numbers reported
/// in errors match the file on disk. Lookups borrow from the stored lines.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl ConfigFile {
    /// Reads and checks the file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| {
            ConfigError::NotFound {
                path: path.display().to_string(),
                source,
            }
        })?;
        Self::from_contents(path, &contents)
    }

    /// Builds the line store from already read contents
    ///
    /// Fails on the first line that opens a tag with `[` without closing
    /// it. The reported line number is 1-based. A line with text after the
    /// closing `]` is not a tag and is skipped with a warning.
    pub fn from_contents(
        path: impl Into<PathBuf>,
        contents: &str,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let lines: Vec<String> = contents.lines().map(String::from).collect();

        if let Some((index, line)) = lines
            .iter()
            .enumerate()
            .find(|(_, line)| classify(line) == Line::Malformed)
        {
            return Err(ConfigError::Parse {
                path: path.display().to_string(),
                line: index + 1,
                content: line.clone(),
            });
        }

        for (index, line) in lines.iter().enumerate() {
            if classify(line) == Line::Stray {
                warn!(
                    "Ignoring line {} of {}, text after ']': '{line}'",
                    index + 1,
                    path.display()
                );
            }
        }

        debug!("Loaded {} lines from {}", lines.len(), path.display());
        Ok(ConfigFile { path, lines })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the line with the given 1-based number
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
    }

    fn headers(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().enumerate().filter_map(|(index, line)| {
            match classify(line) {
                Line::Tag(name) => Some((index, name)),
                _ => None,
            }
        })
    }

    fn scope_lines(&self, range: &TagRange) -> &[String] {
        let end = range.end.min(self.lines.len());
        &self.lines[range.start.min(end)..end]
    }

    /// Range of the lines before the first tag header
    pub fn default_section(&self) -> TagRange {
        let end = self
            .headers()
            .next()
            .map_or(self.lines.len(), |(index, _)| index);
        TagRange {
            name: String::new(),
            start: 0,
            end,
        }
    }

    /// Finds the range of the first tag called `name`
    ///
    /// The comparison is case-sensitive. Padding inside the brackets is
    /// ignored, so `[ req ]` is found as `req`. Absence is not an error.
    pub fn locate_tag(&self, name: &str) -> Option<TagRange> {
        let mut headers = self.headers();
        let (header, _) = headers.by_ref().find(|(_, tag)| *tag == name)?;
        let end = headers
            .next()
            .map_or(self.lines.len(), |(index, _)| index);

        Some(TagRange {
            name: name.into(),
            start: header + 1,
            end,
        })
    }

    /// Finds the first `key = value` assignment for `key` in `range`
    ///
    /// With `continue_in_parent` set, a miss is retried once in the default
    /// section.
    pub fn locate_value(
        &self,
        range: &TagRange,
        key: &str,
        continue_in_parent: bool,
    ) -> Option<&str> {
        let found = self
            .scope_lines(range)
            .iter()
            .find_map(|line| assigned_value(line, key));

        match found {
            Some(value) => Some(value),
            None if continue_in_parent && !range.is_default_section() => {
                self.locate_value(&self.default_section(), key, false)
            }
            None => None,
        }
    }

    /// Returns every value assigned to `key` in `range`, in file order
    pub fn locate_values(&self, range: &TagRange, key: &str) -> Vec<&str> {
        self.scope_lines(range)
            .iter()
            .filter_map(|line| assigned_value(line, key))
            .collect()
    }

    /// Looks `key` up in each scope of `chain` in turn
    pub fn lookup(&self, chain: &ScopeChain, key: &str) -> Option<&str> {
        for scope in chain.iter() {
            let mut values = self.locate_values(scope, key).into_iter();
            if let Some(first) = values.next() {
                if values.next().is_some() {
                    warn!(
                        "Key '{key}' is assigned more than once in [{}] of {}, using '{first}'",
                        scope.name,
                        self.path.display()
                    );
                }
                return Some(first);
            }
        }
        None
    }
}

/// Ordered list of ranges searched one after another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeChain {
    scopes: Vec<TagRange>,
}

impl ScopeChain {
    /// Chain searching `tag` first and then the default section
    ///
    /// When the tag is absent only the default section is searched.
    pub fn for_tag(config: &ConfigFile, tag: Option<TagRange>) -> Self {
        let mut scopes: Vec<TagRange> = tag.into_iter().collect();
        scopes.push(config.default_section());
        ScopeChain { scopes }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TagRange> {
        self.scopes.iter()
    }
}
