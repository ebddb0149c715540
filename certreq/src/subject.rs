// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use crate::config::RequestParameters;
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use std::fmt;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "subject.pest"]
pub struct SubjectParser;

#[derive(Error, Debug)]
pub enum SubjectError {
    #[error("failed to parse subject '{input}'")]
    ParseError {
        input: String,
        #[source]
        source: Box<pest::error::Error<Rule>>,
    },

    #[error("unknown attribute '{attribute}' in subject '{input}'")]
    UnknownAttribute { input: String, attribute: String },

    #[error("empty value for attribute '{attribute}' in subject '{input}'")]
    EmptyValue { input: String, attribute: String },
}

impl SubjectError {
    /// The subject string that failed to parse
    pub fn input(&self) -> &str {
        match self {
            SubjectError::ParseError { input, .. }
            | SubjectError::UnknownAttribute { input, .. }
            | SubjectError::EmptyValue { input, .. } => input,
        }
    }
}

// Short name understood by the X.509 name builder, then accepted aliases
const ATTRIBUTES: &[(&str, &[&str])] = &[
    ("CN", &["commonName"]),
    ("C", &["countryName"]),
    ("ST", &["stateOrProvinceName"]),
    ("L", &["localityName"]),
    ("O", &["organizationName"]),
    ("OU", &["organizationalUnitName"]),
    ("emailAddress", &[]),
    ("serialNumber", &[]),
    ("title", &[]),
    ("GN", &["givenName"]),
    ("SN", &["surname"]),
    ("initials", &[]),
    ("pseudonym", &[]),
    ("generationQualifier", &[]),
    ("DC", &["domainComponent"]),
    ("street", &["streetAddress"]),
    ("postalCode", &[]),
    ("UID", &["userId"]),
];

fn canonical_attribute(name: &str) -> Option<&'static str> {
    ATTRIBUTES.iter().find_map(|(short, aliases)| {
        let known = short.eq_ignore_ascii_case(name)
            || aliases.iter().any(|a| a.eq_ignore_ascii_case(name));
        known.then_some(*short)
    })
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Ordered list of `attribute=value` pairs naming a subject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    entries: Vec<(String, String)>,
}

impl DistinguishedName {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a subject string such as `CN=host,O=Example\, Inc.,C=NL`
    ///
    /// The `/CN=host/O=Example/C=NL` form is accepted too. Attribute names
    /// are matched case-insensitively and normalized to their short name.
    pub fn parse(input: &str) -> Result<Self, SubjectError> {
        let mut pairs =
            SubjectParser::parse(Rule::subject, input).map_err(|e| {
                SubjectError::ParseError {
                    input: input.into(),
                    source: Box::new(e),
                }
            })?;

        let mut dn = DistinguishedName::new();
        let Some(subject) = pairs.next() else {
            return Ok(dn);
        };

        for form in subject.into_inner() {
            match form.as_rule() {
                Rule::slashed | Rule::delimited => {
                    for rdn in form.into_inner() {
                        dn.push_rdn(input, rdn)?;
                    }
                }
                Rule::EOI => break,
                _ => unreachable!(),
            }
        }

        Ok(dn)
    }

    fn push_rdn(
        &mut self,
        input: &str,
        rdn: Pair<Rule>,
    ) -> Result<(), SubjectError> {
        let mut inner = rdn.into_inner();
        let attribute = inner.next().map(|p| p.as_str()).unwrap_or_default();
        let value = inner
            .next()
            .map(|p| unescape(p.as_str().trim_end()))
            .unwrap_or_default();

        let Some(short) = canonical_attribute(attribute) else {
            return Err(SubjectError::UnknownAttribute {
                input: input.into(),
                attribute: attribute.into(),
            });
        };

        if value.is_empty() {
            return Err(SubjectError::EmptyValue {
                input: input.into(),
                attribute: attribute.into(),
            });
        }

        self.entries.push((short.into(), value));
        Ok(())
    }

    /// Builds the subject from the distinguished name defaults
    ///
    /// The common name comes first and is required. The e-mail address,
    /// organization, unit, locality, state and country follow when set.
    pub fn from_parameters(params: &RequestParameters) -> Option<Self> {
        let commonname = params.default_commonname?;
        let mut dn = DistinguishedName::new();
        dn.entries.push(("CN".into(), commonname.into()));

        let optional = [
            ("emailAddress", params.default_email),
            ("O", params.default_org),
            ("OU", params.default_orgunit),
            ("L", params.default_locality),
            ("ST", params.default_state),
            ("C", params.default_country),
        ];
        for (attribute, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                dn.entries.push((attribute.into(), value.into()));
            }
        }

        Some(dn)
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Appends an entry whose attribute name is already in short form
    pub fn push(&mut self, attribute: &str, value: &str) {
        self.entries.push((attribute.into(), value.into()));
    }

    /// Returns the first value of the given attribute
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a == attribute)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, (attribute, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{attribute}=")?;
            for c in value.chars() {
                if matches!(c, ',' | '=' | '\\') {
                    write!(f, "\\")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}
