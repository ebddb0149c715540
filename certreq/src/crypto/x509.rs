// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use super::CollaboratorError;
use crate::{
    algorithms::DigestAlgorithm,
    directive::{
        ExtendedKeyUsagePurpose, ExtensionDirective, KeyIdentifierKind,
    },
    subject::DistinguishedName,
};
use openssl::{
    asn1::{Asn1Object, Asn1OctetString, Asn1Time},
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    pkey::{PKey, PKeyRef, Private, Public},
    x509::{
        extension, X509Builder, X509Extension, X509Name, X509Req,
        X509ReqBuilder, X509,
    },
};

/// Object identifier of the key usage extension
pub const KEY_USAGE_OID: &str = "2.5.29.15";
/// Object identifier of the Netscape certificate type extension
pub const NS_CERT_TYPE_OID: &str = "2.16.840.1.113730.1.1";

// Random serial numbers stay below 2^159 so they fit in 20 octets
const RANDOM_SERIAL_BITS: i32 = 159;

fn builder_error(
    message: &str,
) -> impl FnOnce(openssl::error::ErrorStack) -> CollaboratorError + '_ {
    move |source| CollaboratorError::openssl(message, source)
}

/// Builds an X509 name from the entries of `dn`, in order
pub fn build_name(
    dn: &DistinguishedName,
) -> Result<X509Name, CollaboratorError> {
    let mut name_builder = X509Name::builder()
        .map_err(builder_error("failed to create X509 Name object"))?;

    for (attribute, value) in dn.entries() {
        name_builder
            .append_entry_by_text(attribute, value)
            .map_err(|source| {
                CollaboratorError::openssl(
                    &format!("failed to set {attribute} in Name builder"),
                    source,
                )
            })?;
    }

    Ok(name_builder.build())
}

/// DER encoding of a named bit string holding one byte of flags
///
/// Trailing zero bits are dropped and counted in the unused-bits octet; an
/// empty mask encodes as a bit string with no content.
pub fn named_bit_string(bits: u8) -> Vec<u8> {
    if bits == 0 {
        return vec![0x03, 0x01, 0x00];
    }
    vec![0x03, 0x02, bits.trailing_zeros() as u8, bits]
}

fn bit_string_extension(
    oid: &str,
    bits: u8,
) -> Result<X509Extension, CollaboratorError> {
    let object = Asn1Object::from_str(oid)
        .map_err(builder_error("failed to create extension object"))?;
    let contents = Asn1OctetString::new_from_bytes(&named_bit_string(bits))
        .map_err(builder_error("failed to encode extension contents"))?;
    X509Extension::new_from_der(&object, false, &contents)
        .map_err(builder_error("failed to create bit string extension"))
}

#[derive(Default)]
pub struct RequestBuilder<'a> {
    subject: Option<&'a DistinguishedName>,
    private_key: Option<&'a PKey<Private>>,
    digest: Option<DigestAlgorithm>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new() -> RequestBuilder<'a> {
        RequestBuilder::default()
    }

    pub fn subject(&mut self, subject: &'a DistinguishedName) -> &mut Self {
        self.subject = Some(subject);
        self
    }

    /// Set the key whose public half goes in the request and which signs it
    pub fn private_key(&mut self, key: &'a PKey<Private>) -> &mut Self {
        self.private_key = Some(key);
        self
    }

    pub fn digest(&mut self, digest: DigestAlgorithm) -> &mut Self {
        self.digest = Some(digest);
        self
    }

    pub fn build(&self) -> Result<X509Req, CollaboratorError> {
        let (Some(subject), Some(key)) = (self.subject, self.private_key)
        else {
            return Err(CollaboratorError::new(
                -1,
                "subject and private key must be set on RequestBuilder",
            ));
        };

        let mut builder = X509ReqBuilder::new()
            .map_err(builder_error("failed to create X509 request builder"))?;
        builder
            .set_version(0)
            .map_err(builder_error("failed to set X509 request version"))?;

        let name = build_name(subject)?;
        builder
            .set_subject_name(&name)
            .map_err(builder_error("failed to set X509 request subject"))?;
        builder
            .set_pubkey(key)
            .map_err(builder_error("failed to set X509 request public key"))?;

        let md: MessageDigest = self.digest.unwrap_or_default().into();
        builder
            .sign(key, md)
            .map_err(builder_error("failed to sign X509 request"))?;

        Ok(builder.build())
    }
}

#[derive(Default)]
pub struct CertificateBuilder<'a> {
    subject: Option<&'a DistinguishedName>,
    public_key: Option<&'a PKeyRef<Public>>,
    issuer_key: Option<&'a PKey<Private>>,
    serial: Option<&'a str>,
    days: Option<u32>,
    digest: Option<DigestAlgorithm>,
    extensions: &'a [ExtensionDirective],
}

impl<'a> CertificateBuilder<'a> {
    pub fn new() -> CertificateBuilder<'a> {
        CertificateBuilder::default()
    }

    /// Set the subject, which is also used as the issuer
    pub fn subject(&mut self, subject: &'a DistinguishedName) -> &mut Self {
        self.subject = Some(subject);
        self
    }

    pub fn public_key(&mut self, key: &'a PKeyRef<Public>) -> &mut Self {
        self.public_key = Some(key);
        self
    }

    pub fn issuer_key(&mut self, key: &'a PKey<Private>) -> &mut Self {
        self.issuer_key = Some(key);
        self
    }

    /// Set the serial number as a decimal string
    ///
    /// If not called, a random serial number is used
    pub fn serial(&mut self, serial: &'a str) -> &mut Self {
        self.serial = Some(serial);
        self
    }

    /// Set the validity period in days from now, 365 when not called
    pub fn days(&mut self, days: u32) -> &mut Self {
        self.days = Some(days);
        self
    }

    pub fn digest(&mut self, digest: DigestAlgorithm) -> &mut Self {
        self.digest = Some(digest);
        self
    }

    pub fn extensions(
        &mut self,
        extensions: &'a [ExtensionDirective],
    ) -> &mut Self {
        self.extensions = extensions;
        self
    }

    fn serial_number(&self) -> Result<BigNum, CollaboratorError> {
        match self.serial {
            Some(serial) => BigNum::from_dec_str(serial)
                .map_err(builder_error("failed to parse serial number")),
            None => {
                let mut serial = BigNum::new()
                    .map_err(builder_error("failed to create serial number"))?;
                serial
                    .rand(RANDOM_SERIAL_BITS, MsbOption::MAYBE_ZERO, false)
                    .map_err(builder_error(
                        "failed to generate random serial number",
                    ))?;
                Ok(serial)
            }
        }
    }

    fn append_extension(
        builder: &mut X509Builder,
        directive: &ExtensionDirective,
    ) -> Result<(), CollaboratorError> {
        let extension = match directive {
            ExtensionDirective::BasicConstraints {
                is_ca,
                max_path_len,
            } => {
                let mut bc = extension::BasicConstraints::new();
                if *is_ca {
                    bc.critical().ca();
                    if let Some(len) = max_path_len {
                        bc.pathlen(*len);
                    }
                }
                bc.build()
                    .map_err(builder_error("failed to build Basic Constraints"))?
            }
            ExtensionDirective::KeyIdentifierPolicy { emit: false, .. } => {
                return Ok(());
            }
            ExtensionDirective::KeyIdentifierPolicy {
                kind: KeyIdentifierKind::Subject,
                ..
            } => extension::SubjectKeyIdentifier::new()
                .build(&builder.x509v3_context(None, None))
                .map_err(builder_error(
                    "failed to build Subject Key Identifier",
                ))?,
            ExtensionDirective::KeyIdentifierPolicy {
                kind: KeyIdentifierKind::Authority,
                ..
            } => extension::AuthorityKeyIdentifier::new()
                .keyid(false)
                .build(&builder.x509v3_context(None, None))
                .map_err(builder_error(
                    "failed to build Authority Key Identifier",
                ))?,
            ExtensionDirective::KeyUsageMask { bits } => {
                bit_string_extension(KEY_USAGE_OID, *bits)?
            }
            ExtensionDirective::CertTypeMask { bits } => {
                bit_string_extension(NS_CERT_TYPE_OID, *bits)?
            }
            ExtensionDirective::ExtendedKeyUsage { purposes } => {
                if purposes.is_empty() {
                    return Ok(());
                }
                let mut eku = extension::ExtendedKeyUsage::new();
                for purpose in purposes {
                    match purpose {
                        ExtendedKeyUsagePurpose::ServerAuth => {
                            eku.server_auth();
                        }
                        ExtendedKeyUsagePurpose::ClientAuth => {
                            eku.client_auth();
                        }
                        ExtendedKeyUsagePurpose::CodeSigning => {
                            eku.code_signing();
                        }
                        ExtendedKeyUsagePurpose::EmailProtection => {
                            eku.email_protection();
                        }
                        ExtendedKeyUsagePurpose::TimeStamping => {
                            eku.time_stamping();
                        }
                        ExtendedKeyUsagePurpose::OcspSigning => {
                            eku.other(purpose.name());
                        }
                    }
                }
                eku.build().map_err(builder_error(
                    "failed to build Extended Key Usage",
                ))?
            }
        };

        builder.append_extension(extension).map_err(|source| {
            CollaboratorError::openssl(
                &format!(
                    "failed to append {} extension",
                    directive.kind().config_key()
                ),
                source,
            )
        })
    }

    /// Generate the certificate using the previously set options
    pub fn build(&self) -> Result<X509, CollaboratorError> {
        let (Some(subject), Some(public_key), Some(issuer_key)) =
            (self.subject, self.public_key, self.issuer_key)
        else {
            return Err(CollaboratorError::new(
                -1,
                "subject, public key and issuer key must be set on CertificateBuilder",
            ));
        };

        let mut builder = X509::builder().map_err(builder_error(
            "failed to create X509 certificate builder object",
        ))?;

        // Version 3
        builder.set_version(2).map_err(builder_error(
            "failed to set X509 certificate version",
        ))?;

        let serial = self.serial_number()?.to_asn1_integer().map_err(
            builder_error("failed to convert serial number"),
        )?;
        builder.set_serial_number(&serial).map_err(builder_error(
            "failed to set X509 certificate serial number",
        ))?;

        let name = build_name(subject)?;
        builder.set_subject_name(&name).map_err(builder_error(
            "failed to set X509 certificate subject name",
        ))?;
        builder.set_issuer_name(&name).map_err(builder_error(
            "failed to set X509 issuer name",
        ))?;

        let valid_from = Asn1Time::days_from_now(0)
            .map_err(builder_error("failed to get ASN.1 Time for now"))?;
        builder.set_not_before(&valid_from).map_err(builder_error(
            "failed to set X509 certificate Not Before date",
        ))?;

        let days = self.days.unwrap_or(365);
        let valid_to = Asn1Time::days_from_now(days).map_err(|source| {
            CollaboratorError::openssl(
                &format!("failed to get ASN.1 Time for {days} day(s) from now"),
                source,
            )
        })?;
        builder.set_not_after(&valid_to).map_err(builder_error(
            "failed to set X509 certificate Not After date",
        ))?;

        builder.set_pubkey(public_key).map_err(builder_error(
            "failed to set X509 certificate public key",
        ))?;

        for directive in self.extensions {
            Self::append_extension(&mut builder, directive)?;
        }

        let md: MessageDigest = self.digest.unwrap_or_default().into();
        builder.sign(issuer_key, md).map_err(builder_error(
            "failed to sign X509 certificate",
        ))?;

        Ok(builder.build())
    }
}
