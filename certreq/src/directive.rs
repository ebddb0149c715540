// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

//! Extension directives
//!
//! A directive is the comma separated value of an extension key in the
//! configuration, such as `keyUsage = digitalSignature, keyCertSign`.
//! Tokens are compared case-insensitively and tokens that are not
//! recognized for the directive kind are skipped.

use std::fmt;
use thiserror::Error;

/// Largest path length accepted in a basic constraints directive
pub const MAX_PATH_LEN: u32 = 127;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("Invalid value '{value}' for {directive}: {reason}")]
    InvalidValue {
        directive: String,
        value: String,
        reason: String,
    },
}

/// Key usage bits, as set in the first byte of the X.509 bit string
pub mod key_usage {
    pub const DIGITAL_SIGNATURE: u8 = 0x80;
    pub const NON_REPUDIATION: u8 = 0x40;
    pub const KEY_ENCIPHERMENT: u8 = 0x20;
    pub const DATA_ENCIPHERMENT: u8 = 0x10;
    pub const KEY_AGREEMENT: u8 = 0x08;
    pub const KEY_CERT_SIGN: u8 = 0x04;
    pub const CRL_SIGN: u8 = 0x02;
}

/// Netscape certificate type bits
pub mod cert_type {
    pub const SSL_CLIENT: u8 = 0x80;
    pub const SSL_SERVER: u8 = 0x40;
    pub const EMAIL: u8 = 0x20;
    pub const OBJECT_SIGNING: u8 = 0x10;
    pub const SSL_CA: u8 = 0x04;
    pub const EMAIL_CA: u8 = 0x02;
    pub const OBJECT_SIGNING_CA: u8 = 0x01;
}

const KEY_USAGE_NAMES: [(u8, &str); 7] = [
    (key_usage::DIGITAL_SIGNATURE, "digitalSignature"),
    (key_usage::NON_REPUDIATION, "nonRepudiation"),
    (key_usage::KEY_ENCIPHERMENT, "keyEncipherment"),
    (key_usage::DATA_ENCIPHERMENT, "dataEncipherment"),
    (key_usage::KEY_AGREEMENT, "keyAgreement"),
    (key_usage::KEY_CERT_SIGN, "keyCertSign"),
    (key_usage::CRL_SIGN, "cRLSign"),
];

const CERT_TYPE_NAMES: [(u8, &str); 7] = [
    (cert_type::SSL_CLIENT, "client"),
    (cert_type::SSL_SERVER, "server"),
    (cert_type::EMAIL, "email"),
    (cert_type::OBJECT_SIGNING, "objsign"),
    (cert_type::SSL_CA, "sslCA"),
    (cert_type::EMAIL_CA, "emailCA"),
    (cert_type::OBJECT_SIGNING_CA, "objCA"),
];

fn key_usage_bit(token: &str) -> Option<u8> {
    match token {
        "digitalsignature" => Some(key_usage::DIGITAL_SIGNATURE),
        "nonrepudiation" => Some(key_usage::NON_REPUDIATION),
        "keyencipherment" => Some(key_usage::KEY_ENCIPHERMENT),
        "dataencipherment" => Some(key_usage::DATA_ENCIPHERMENT),
        "keyagreement" => Some(key_usage::KEY_AGREEMENT),
        "keycertsign" => Some(key_usage::KEY_CERT_SIGN),
        "crlsign" => Some(key_usage::CRL_SIGN),
        _ => None,
    }
}

fn cert_type_bit(token: &str) -> Option<u8> {
    match token {
        "client" => Some(cert_type::SSL_CLIENT),
        "server" => Some(cert_type::SSL_SERVER),
        "email" => Some(cert_type::EMAIL),
        "objsign" => Some(cert_type::OBJECT_SIGNING),
        "sslca" => Some(cert_type::SSL_CA),
        "emailca" => Some(cert_type::EMAIL_CA),
        "objca" => Some(cert_type::OBJECT_SIGNING_CA),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    BasicConstraints,
    KeyUsage,
    NsCertType,
    SubjectKeyIdentifier,
    AuthorityKeyIdentifier,
    ExtendedKeyUsage,
}

impl DirectiveKind {
    /// Name of the configuration key holding this directive
    pub fn config_key(&self) -> &'static str {
        match self {
            DirectiveKind::BasicConstraints => "basicConstraints",
            DirectiveKind::KeyUsage => "keyUsage",
            DirectiveKind::NsCertType => "nsCertType",
            DirectiveKind::SubjectKeyIdentifier => "subjectKeyIdentifier",
            DirectiveKind::AuthorityKeyIdentifier => "authorityKeyIdentifier",
            DirectiveKind::ExtendedKeyUsage => "extendedKeyUsage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIdentifierKind {
    Subject,
    Authority,
}

impl KeyIdentifierKind {
    /// Emit policy when the directive has no deciding token
    ///
    /// Certificates produced here are self-signed, so the authority key
    /// identifier is off unless asked for.
    pub fn default_emit(&self) -> bool {
        match self {
            KeyIdentifierKind::Subject => true,
            KeyIdentifierKind::Authority => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedKeyUsagePurpose {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl ExtendedKeyUsagePurpose {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "serverauth" => Some(ExtendedKeyUsagePurpose::ServerAuth),
            "clientauth" => Some(ExtendedKeyUsagePurpose::ClientAuth),
            "codesigning" => Some(ExtendedKeyUsagePurpose::CodeSigning),
            "emailprotection" => {
                Some(ExtendedKeyUsagePurpose::EmailProtection)
            }
            "timestamping" => Some(ExtendedKeyUsagePurpose::TimeStamping),
            "ocspsigning" => Some(ExtendedKeyUsagePurpose::OcspSigning),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtendedKeyUsagePurpose::ServerAuth => "serverAuth",
            ExtendedKeyUsagePurpose::ClientAuth => "clientAuth",
            ExtendedKeyUsagePurpose::CodeSigning => "codeSigning",
            ExtendedKeyUsagePurpose::EmailProtection => "emailProtection",
            ExtendedKeyUsagePurpose::TimeStamping => "timeStamping",
            ExtendedKeyUsagePurpose::OcspSigning => "OCSPSigning",
        }
    }
}

/// Typed form of one parsed directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionDirective {
    BasicConstraints {
        is_ca: bool,
        max_path_len: Option<u32>,
    },
    KeyUsageMask {
        bits: u8,
    },
    CertTypeMask {
        bits: u8,
    },
    KeyIdentifierPolicy {
        kind: KeyIdentifierKind,
        emit: bool,
    },
    ExtendedKeyUsage {
        purposes: Vec<ExtendedKeyUsagePurpose>,
    },
}

impl ExtensionDirective {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            ExtensionDirective::BasicConstraints { .. } => {
                DirectiveKind::BasicConstraints
            }
            ExtensionDirective::KeyUsageMask { .. } => DirectiveKind::KeyUsage,
            ExtensionDirective::CertTypeMask { .. } => {
                DirectiveKind::NsCertType
            }
            ExtensionDirective::KeyIdentifierPolicy {
                kind: KeyIdentifierKind::Subject,
                ..
            } => DirectiveKind::SubjectKeyIdentifier,
            ExtensionDirective::KeyIdentifierPolicy {
                kind: KeyIdentifierKind::Authority,
                ..
            } => DirectiveKind::AuthorityKeyIdentifier,
            ExtensionDirective::ExtendedKeyUsage { .. } => {
                DirectiveKind::ExtendedKeyUsage
            }
        }
    }
}

fn tokens(directive: &str) -> impl Iterator<Item = String> + '_ {
    directive
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
}

fn parse_basic_constraints(
    directive: &str,
) -> Result<ExtensionDirective, DirectiveError> {
    let mut is_ca = true;
    let mut max_path_len = None;

    for token in tokens(directive) {
        if let Some(flag) = token.strip_prefix("ca:") {
            is_ca = flag.trim() == "true";
        } else if let Some(len) = token.strip_prefix("pathlen:") {
            let len = len.trim();
            let parsed = len.parse::<u32>().map_err(|_| {
                DirectiveError::InvalidValue {
                    directive: DirectiveKind::BasicConstraints
                        .config_key()
                        .into(),
                    value: directive.into(),
                    reason: format!("path length '{len}' is not a number"),
                }
            })?;
            if parsed > MAX_PATH_LEN {
                return Err(DirectiveError::InvalidValue {
                    directive: DirectiveKind::BasicConstraints
                        .config_key()
                        .into(),
                    value: directive.into(),
                    reason: format!(
                        "path length {parsed} is larger than {MAX_PATH_LEN}"
                    ),
                });
            }
            max_path_len = Some(parsed);
        }
    }

    Ok(ExtensionDirective::BasicConstraints {
        is_ca,
        max_path_len,
    })
}

fn parse_mask(directive: &str, bit: fn(&str) -> Option<u8>) -> u8 {
    tokens(directive).fold(0, |mask, token| {
        if token == "none" {
            0
        } else {
            mask | bit(&token).unwrap_or(0)
        }
    })
}

fn parse_key_identifier(
    directive: &str,
    kind: KeyIdentifierKind,
) -> ExtensionDirective {
    let emit = tokens(directive).fold(kind.default_emit(), |emit, token| {
        match token.as_str() {
            "none" => false,
            "hash" => true,
            t if t.starts_with("keyid") || t.starts_with("issuer") => true,
            _ => emit,
        }
    });
    ExtensionDirective::KeyIdentifierPolicy { kind, emit }
}

fn parse_extended_key_usage(directive: &str) -> ExtensionDirective {
    let mut purposes = Vec::new();
    for token in tokens(directive) {
        if token == "none" {
            purposes.clear();
        } else if let Some(purpose) = ExtendedKeyUsagePurpose::from_token(&token)
        {
            if !purposes.contains(&purpose) {
                purposes.push(purpose);
            }
        }
    }
    ExtensionDirective::ExtendedKeyUsage { purposes }
}

/// Parses one directive string
///
/// Only a basic constraints path length that is not a number in
/// `0..=127` is rejected; any other unknown token is ignored.
///
/// # Examples
///
/// * `CA:TRUE,pathlen:3` as basic constraints => CA with path length 3
/// * `digitalSignature, keyCertSign` as key usage => `0x84`
/// * `none` as subject key identifier => not emitted
pub fn parse(
    directive: &str,
    kind: DirectiveKind,
) -> Result<ExtensionDirective, DirectiveError> {
    let parsed = match kind {
        DirectiveKind::BasicConstraints => {
            return parse_basic_constraints(directive)
        }
        DirectiveKind::KeyUsage => ExtensionDirective::KeyUsageMask {
            bits: parse_mask(directive, key_usage_bit),
        },
        DirectiveKind::NsCertType => ExtensionDirective::CertTypeMask {
            bits: parse_mask(directive, cert_type_bit),
        },
        DirectiveKind::SubjectKeyIdentifier => {
            parse_key_identifier(directive, KeyIdentifierKind::Subject)
        }
        DirectiveKind::AuthorityKeyIdentifier => {
            parse_key_identifier(directive, KeyIdentifierKind::Authority)
        }
        DirectiveKind::ExtendedKeyUsage => parse_extended_key_usage(directive),
    };
    Ok(parsed)
}

fn write_mask(
    f: &mut fmt::Formatter,
    bits: u8,
    names: &[(u8, &str)],
) -> fmt::Result {
    let set: Vec<&str> = names
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if set.is_empty() {
        write!(f, "none")
    } else {
        write!(f, "{}", set.join(","))
    }
}

impl fmt::Display for ExtensionDirective {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExtensionDirective::BasicConstraints {
                is_ca,
                max_path_len,
            } => {
                write!(f, "CA:{}", if *is_ca { "TRUE" } else { "FALSE" })?;
                if let Some(len) = max_path_len {
                    write!(f, ",pathlen:{len}")?;
                }
                Ok(())
            }
            ExtensionDirective::KeyUsageMask { bits } => {
                write_mask(f, *bits, &KEY_USAGE_NAMES)
            }
            ExtensionDirective::CertTypeMask { bits } => {
                write_mask(f, *bits, &CERT_TYPE_NAMES)
            }
            ExtensionDirective::KeyIdentifierPolicy { emit: false, .. } => {
                write!(f, "none")
            }
            ExtensionDirective::KeyIdentifierPolicy {
                kind: KeyIdentifierKind::Subject,
                ..
            } => write!(f, "hash"),
            ExtensionDirective::KeyIdentifierPolicy {
                kind: KeyIdentifierKind::Authority,
                ..
            } => write!(f, "keyid"),
            ExtensionDirective::ExtendedKeyUsage { purposes } => {
                if purposes.is_empty() {
                    return write!(f, "none");
                }
                let names: Vec<&str> =
                    purposes.iter().map(|p| p.name()).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}
