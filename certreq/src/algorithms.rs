// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use openssl::hash::MessageDigest;
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

/// Smallest accepted RSA modulus size, in bits
pub const RSA_MIN_BITS: u32 = 1024;
/// Largest accepted RSA modulus size, in bits
pub const RSA_MAX_BITS: u32 = 8192;

// This error needs to be public because we implement TryFrom for public types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AlgorithmError {
    #[error("Digest algorithm {0} not supported")]
    UnsupportedDigest(String),

    #[error("Key algorithm {0} not supported")]
    UnsupportedKeyAlgorithm(String),

    #[error("Key specifier {0} has no size, use <algorithm>:<bits>")]
    MissingKeySize(String),

    #[error("Key size {0} is not a number between {RSA_MIN_BITS} and {RSA_MAX_BITS}")]
    InvalidKeySize(String),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Ripemd160,
}

impl TryFrom<&str> for DigestAlgorithm {
    type Error = AlgorithmError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha224" => Ok(DigestAlgorithm::Sha224),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            "ripemd160" => Ok(DigestAlgorithm::Ripemd160),
            _ => Err(AlgorithmError::UnsupportedDigest(value.into())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha224 => "sha224",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Ripemd160 => "ripemd160",
        };
        write!(f, "{value}")
    }
}

impl From<DigestAlgorithm> for MessageDigest {
    fn from(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => MessageDigest::md5(),
            DigestAlgorithm::Sha1 => MessageDigest::sha1(),
            DigestAlgorithm::Sha224 => MessageDigest::sha224(),
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
            DigestAlgorithm::Ripemd160 => MessageDigest::ripemd160(),
        }
    }
}

/// Key generation request given as `-newkey <algorithm>:<bits>`
///
/// Only RSA keys can be generated, and the size is always explicit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NewKeySpec {
    Rsa { bits: u32 },
}

impl NewKeySpec {
    pub fn bits(&self) -> u32 {
        match self {
            NewKeySpec::Rsa { bits } => *bits,
        }
    }
}

/// Parses an RSA modulus size, enforcing the accepted range
pub fn parse_rsa_bits(value: &str) -> Result<u32, AlgorithmError> {
    match value.trim().parse::<u32>() {
        Ok(bits) if (RSA_MIN_BITS..=RSA_MAX_BITS).contains(&bits) => Ok(bits),
        _ => Err(AlgorithmError::InvalidKeySize(value.into())),
    }
}

impl TryFrom<&str> for NewKeySpec {
    type Error = AlgorithmError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let Some((algorithm, bits)) = value.split_once(':') else {
            return Err(AlgorithmError::MissingKeySize(value.into()));
        };

        if !algorithm.eq_ignore_ascii_case("rsa") {
            return Err(AlgorithmError::UnsupportedKeyAlgorithm(
                algorithm.into(),
            ));
        }

        Ok(NewKeySpec::Rsa {
            bits: parse_rsa_bits(bits)?,
        })
    }
}

impl fmt::Display for NewKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NewKeySpec::Rsa { bits } => write!(f, "rsa:{bits}"),
        }
    }
}
