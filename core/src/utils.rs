//! # Key/Value Section Sources
//!
//! This module provides the read interface used to consume device-description files: a
//! set of named sections, each holding `key = value` entries. Macrodyne description
//! files use the INI layout, so an `IniDocument` reader is included.
//!
//! ## Key Components
//!
//! - `SectionSource`: Read-only access to sections and their entries.
//! - `IniDocument`: An in-memory INI document. Section and key lookups are
//!   case-insensitive; `;` and `#` start comment lines and `;` ends a value.
//!
//! ## Usage
//!
//! `macrodyne::description` reads device descriptions through `SectionSource`, so tests
//! can build an `IniDocument` from a string while production code loads one from disk.

use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Read access to a sectioned key/value document.
pub trait SectionSource: Send + Sync {
    /// Section names in document order.
    fn section_names(&self) -> Vec<String>;

    /// Value of `key` in `section`, if present.
    fn value(&self, section: &str, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// An INI document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IniDocument {
    sections: Vec<Section>,
    index: HashMap<String, usize>,
    skipped: Vec<IniSyntaxError>,
}

/// A line the INI reader could not interpret.
#[derive(Debug, Clone, PartialEq)]
pub struct IniSyntaxError {
    pub line: usize,
    pub content: String,
}

impl fmt::Display for IniSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: cannot parse '{}'", self.line, self.content)
    }
}

impl std::error::Error for IniSyntaxError {}

impl IniDocument {
    /// Parses INI text.
    ///
    /// Lines that are neither headers, comments nor `key = value` pairs, and entries before
    /// the first section header, are logged and skipped; `skipped_lines` lists them.
    /// Text after a `;` in a value is a comment. Repeated sections are merged and a
    /// repeated key keeps its last value.
    pub fn parse(text: &str) -> Self {
        let mut document = IniDocument::default();
        let mut current: Option<usize> = None;

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            match document.parse_line(line, current) {
                Some(Line::Header(index)) => current = Some(index),
                Some(Line::Entry) => {}
                None => {
                    let error = IniSyntaxError {
                        line: number + 1,
                        content: line.to_string(),
                    };
                    warn!("Skipping description entry, {}", error);
                    document.skipped.push(error);
                }
            }
        }
        document
    }

    fn parse_line(&mut self, line: &str, current: Option<usize>) -> Option<Line> {
        if let Some(header) = line.strip_prefix('[') {
            let name = header.strip_suffix(']')?.trim();
            return Some(Line::Header(self.section_index(name)));
        }
        let (key, value) = line.split_once('=')?;
        let section = current?;
        let value = value.split(';').next().unwrap_or("");
        self.set_at(section, key.trim(), value.trim());
        Some(Line::Entry)
    }

    /// Reads and parses an INI file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Lines `parse` could not interpret.
    pub fn skipped_lines(&self) -> &[IniSyntaxError] {
        &self.skipped
    }

    /// Sets `key` in `section`, creating the section when needed.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let index = self.section_index(section);
        self.set_at(index, key, value);
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.index.contains_key(&section.to_ascii_lowercase())
    }

    fn section_index(&mut self, name: &str) -> usize {
        let key = name.to_ascii_lowercase();
        if let Some(index) = self.index.get(&key) {
            return *index;
        }
        self.sections.push(Section {
            name: name.to_string(),
            entries: Vec::new(),
        });
        let index = self.sections.len() - 1;
        self.index.insert(key, index);
        index
    }

    fn set_at(&mut self, section: usize, key: &str, value: &str) {
        let entries = &mut self.sections[section].entries;
        match entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }
}

enum Line {
    Header(usize),
    Entry,
}

impl SectionSource for IniDocument {
    fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    fn value(&self, section: &str, key: &str) -> Option<String> {
        let index = self.index.get(&section.to_ascii_lowercase())?;
        self.sections[*index]
            .entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }
}
