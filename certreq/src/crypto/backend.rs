// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use super::{
    load_private_key, rsa_generate, write_file, write_private_key,
    x509::{CertificateBuilder, RequestBuilder},
    CertificateSpec, CollaboratorError, CryptoBackend, OutputFormat,
};
use crate::{algorithms::DigestAlgorithm, subject::DistinguishedName};
use log::*;
use openssl::{
    pkey::{PKey, Private},
    x509::{X509Req, X509},
};
use std::{fs, path::Path};

/// [`CryptoBackend`] built on the OpenSSL bindings
#[derive(Debug, Default)]
pub struct OpenSslBackend;

impl OpenSslBackend {
    pub fn new() -> Self {
        OpenSslBackend
    }
}

fn text(data: Vec<u8>) -> String {
    String::from_utf8_lossy(&data).into_owned()
}

impl CryptoBackend for OpenSslBackend {
    type PrivateKey = PKey<Private>;
    type Request = X509Req;
    type Certificate = X509;

    fn generate_key(
        &mut self,
        bits: u32,
        path: &Path,
    ) -> Result<(), CollaboratorError> {
        info!("Generating {bits} bits RSA key");
        let key = rsa_generate(bits)?;
        write_private_key(&key, path)
    }

    fn load_key(
        &mut self,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<Self::PrivateKey, CollaboratorError> {
        load_private_key(path, passphrase)
    }

    fn build_request(
        &mut self,
        subject: &DistinguishedName,
        key: &Self::PrivateKey,
        digest: DigestAlgorithm,
    ) -> Result<Self::Request, CollaboratorError> {
        RequestBuilder::new()
            .subject(subject)
            .private_key(key)
            .digest(digest)
            .build()
    }

    fn encode_request(
        &mut self,
        request: &Self::Request,
        format: OutputFormat,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let encoded = match format {
            OutputFormat::Pem => request.to_pem(),
            OutputFormat::Der => request.to_der(),
        };
        encoded.map_err(|e| {
            CollaboratorError::openssl(
                &format!("failed to encode request as {format}"),
                e,
            )
        })
    }

    fn decode_request(
        &mut self,
        data: &[u8],
        format: OutputFormat,
    ) -> Result<Self::Request, CollaboratorError> {
        let decoded = match format {
            OutputFormat::Pem => X509Req::from_pem(data),
            OutputFormat::Der => X509Req::from_der(data),
        };
        decoded.map_err(|e| {
            CollaboratorError::openssl(
                &format!("failed to parse {format} request"),
                e,
            )
        })
    }

    fn load_request(
        &mut self,
        path: &Path,
    ) -> Result<Self::Request, CollaboratorError> {
        let data = fs::read(path).map_err(|e| {
            CollaboratorError::io(
                &format!("failed to read request {}", path.display()),
                e,
            )
        })?;

        let request = match X509Req::from_pem(&data) {
            Ok(request) => request,
            Err(_) => X509Req::from_der(&data).map_err(|e| {
                CollaboratorError::openssl(
                    &format!("failed to parse request {}", path.display()),
                    e,
                )
            })?,
        };

        let public = request.public_key().map_err(|e| {
            CollaboratorError::openssl("failed to get request public key", e)
        })?;
        let valid = request.verify(&public).map_err(|e| {
            CollaboratorError::openssl("failed to verify request signature", e)
        })?;
        if !valid {
            return Err(CollaboratorError::new(
                -1,
                format!("signature of request {} is invalid", path.display()),
            ));
        }

        Ok(request)
    }

    fn request_subject(
        &mut self,
        request: &Self::Request,
    ) -> Result<DistinguishedName, CollaboratorError> {
        let mut dn = DistinguishedName::new();
        for entry in request.subject_name().entries() {
            let attribute = entry.object().nid().short_name().map_err(|e| {
                CollaboratorError::openssl("unknown subject attribute", e)
            })?;
            let value = entry.data().to_string().map_err(|e| {
                CollaboratorError::openssl(
                    "failed to read subject attribute value",
                    e,
                )
            })?;
            dn.push(attribute, &value);
        }
        Ok(dn)
    }

    fn describe_request(
        &mut self,
        request: &Self::Request,
    ) -> Result<String, CollaboratorError> {
        request.to_text().map(text).map_err(|e| {
            CollaboratorError::openssl("failed to print request", e)
        })
    }

    fn issue_certificate(
        &mut self,
        request: &Self::Request,
        subject: &DistinguishedName,
        issuer_key: &Self::PrivateKey,
        spec: &CertificateSpec,
    ) -> Result<Self::Certificate, CollaboratorError> {
        let public = request.public_key().map_err(|e| {
            CollaboratorError::openssl("failed to get request public key", e)
        })?;

        let mut builder = CertificateBuilder::new();
        builder
            .subject(subject)
            .public_key(&public)
            .issuer_key(issuer_key)
            .days(spec.days)
            .digest(spec.digest)
            .extensions(spec.extensions);
        if let Some(serial) = spec.serial {
            builder.serial(serial);
        }
        builder.build()
    }

    fn encode_certificate(
        &mut self,
        certificate: &Self::Certificate,
        format: OutputFormat,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let encoded = match format {
            OutputFormat::Pem => certificate.to_pem(),
            OutputFormat::Der => certificate.to_der(),
        };
        encoded.map_err(|e| {
            CollaboratorError::openssl(
                &format!("failed to encode certificate as {format}"),
                e,
            )
        })
    }

    fn describe_certificate(
        &mut self,
        certificate: &Self::Certificate,
    ) -> Result<String, CollaboratorError> {
        certificate.to_text().map(text).map_err(|e| {
            CollaboratorError::openssl("failed to print certificate", e)
        })
    }

    fn write_output(
        &mut self,
        path: &Path,
        data: &[u8],
    ) -> Result<(), CollaboratorError> {
        write_file(path, data)?;
        info!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}
