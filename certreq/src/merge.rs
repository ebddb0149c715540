// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

//! Combination of command line overrides, configuration values and
//! compiled-in defaults into the plan the workflow executes

use crate::{
    algorithms::DigestAlgorithm,
    args::ReqArgs,
    config::{ExtensionParameters, RequestParameters},
    crypto::OutputFormat,
    directive::{self, DirectiveKind, ExtensionDirective},
    error::{Error, Result},
    subject::DistinguishedName,
};
use log::*;
use std::{convert::TryFrom, fmt, path::PathBuf};

/// Validity period of certificates when `-days` is not given
pub const DEFAULT_DAYS: u32 = 365;

/// Where a merged field got its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    FromOverride,
    FromConfig,
    Default,
    MissingRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged<T> {
    pub value: Option<T>,
    pub outcome: Outcome,
}

impl<T> Merged<T> {
    /// Returns the value, failing when no source provided one
    pub fn required(self, name: &str) -> Result<T> {
        self.value.ok_or_else(|| Error::missing(name))
    }
}

/// Picks the override, else the configured value, else the default
pub fn merge<T>(
    override_value: Option<T>,
    config_value: Option<T>,
    default: Option<T>,
) -> Merged<T> {
    let (value, outcome) = match (override_value, config_value, default) {
        (Some(v), _, _) => (Some(v), Outcome::FromOverride),
        (None, Some(v), _) => (Some(v), Outcome::FromConfig),
        (None, None, Some(v)) => (Some(v), Outcome::Default),
        (None, None, None) => (None, Outcome::MissingRequired),
    };
    Merged { value, outcome }
}

fn traced<T: fmt::Debug>(name: &str, merged: Merged<T>) -> Merged<T> {
    debug!("{name}: {:?} ({:?})", merged.value, merged.outcome);
    merged
}

// The configured value is only parsed when there is no override, so a bad
// value shadowed by the command line is not an error
fn merge_parsed<T: fmt::Debug>(
    name: &str,
    override_value: Option<T>,
    config_value: Option<&str>,
    parse: impl FnOnce(&str) -> Result<T>,
    default: Option<T>,
) -> Result<Merged<T>> {
    let config_value = match override_value {
        Some(_) => None,
        None => config_value.map(parse).transpose()?,
    };
    Ok(traced(name, merge(override_value, config_value, default)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKeyPlan {
    pub bits: u32,
    pub keyout: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePlan {
    pub days: u32,
    pub serial: Option<String>,
    pub extensions: Vec<ExtensionDirective>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    pub new_key: Option<NewKeyPlan>,
    pub keyfile: PathBuf,
    pub passphrase: Option<String>,
    pub digest: DigestAlgorithm,
    pub subject: DistinguishedName,
    /// Unset with `-noout`
    pub out: Option<PathBuf>,
    pub outform: OutputFormat,
    pub text: bool,
    pub certificate: Option<CertificatePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectPlan {
    pub infile: PathBuf,
    pub text: bool,
    pub noout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Inspect(InspectPlan),
    Generate(RequestPlan),
}

/// Parses the configured extension directives, in the order they are
/// applied to a certificate
pub fn extension_directives(
    extensions: &ExtensionParameters,
) -> Result<Vec<ExtensionDirective>> {
    let configured = [
        (extensions.basic_constraints, DirectiveKind::BasicConstraints),
        (
            extensions.subject_key_identifier,
            DirectiveKind::SubjectKeyIdentifier,
        ),
        (
            extensions.authority_key_identifier,
            DirectiveKind::AuthorityKeyIdentifier,
        ),
        (extensions.key_usage, DirectiveKind::KeyUsage),
        (extensions.ns_cert_type, DirectiveKind::NsCertType),
        (extensions.extended_key_usage, DirectiveKind::ExtendedKeyUsage),
    ];

    configured
        .into_iter()
        .filter_map(|(value, kind)| {
            value.map(|v| directive::parse(v, kind).map_err(Error::from))
        })
        .collect()
}

// Neither the size nor the output path of a new key comes from the
// configuration
fn plan_new_key(args: &ReqArgs) -> Result<Option<NewKeyPlan>> {
    let Some(spec) = args.newkey_spec()? else {
        return Ok(None);
    };
    let Some(keyout) = args.keyout.clone() else {
        return Err(Error::usage("-newkey needs -keyout for the new key"));
    };

    debug!("new key: {spec} written to {}", keyout.display());
    Ok(Some(NewKeyPlan {
        bits: spec.bits(),
        keyout,
    }))
}

fn plan_certificate(
    args: &ReqArgs,
    params: &RequestParameters,
) -> Result<CertificatePlan> {
    let days = traced("days", merge(args.days()?, None, Some(DEFAULT_DAYS)))
        .required("days")?;

    // Certificates never take the serial number from the configuration
    if let Some(serial) = params.default_serial {
        debug!("Ignoring configured serial number {serial} for certificate");
    }

    Ok(CertificatePlan {
        days,
        serial: args.serial.clone(),
        extensions: extension_directives(&params.extensions)?,
    })
}

/// Resolves every field the run needs
///
/// Fails on the first required field that has no value and on invalid
/// configured values, before any key or file is touched.
pub fn plan(args: &ReqArgs, params: &RequestParameters) -> Result<Plan> {
    if let Some(infile) = &args.infile {
        return Ok(Plan::Inspect(InspectPlan {
            infile: infile.clone(),
            text: args.text,
            noout: args.noout,
        }));
    }

    let new_key = plan_new_key(args)?;

    let key_override = args
        .key
        .clone()
        .or_else(|| new_key.as_ref().map(|k| k.keyout.clone()));
    let keyfile = traced(
        "keyfile",
        merge(key_override, params.default_keyfile.map(PathBuf::from), None),
    )
    .required("keyfile")?;

    let digest = merge_parsed(
        "digest",
        args.digest,
        params.default_md,
        |v| {
            DigestAlgorithm::try_from(v).map_err(|e| {
                Error::invalid_value("default_md", v, e.to_string())
            })
        },
        Some(DigestAlgorithm::default()),
    )?
    .required("digest")?;

    let subject_override = args
        .subject
        .as_deref()
        .map(DistinguishedName::parse)
        .transpose()?;
    let subject = traced(
        "subject",
        merge(
            subject_override,
            DistinguishedName::from_parameters(params),
            None,
        ),
    )
    .required("subject")?;

    let certificate = if args.x509 {
        Some(plan_certificate(args, params)?)
    } else {
        None
    };

    Ok(Plan::Generate(RequestPlan {
        new_key,
        keyfile,
        passphrase: args.passphrase().map(String::from),
        digest,
        subject,
        out: args.out.clone().filter(|_| !args.noout),
        outform: args.outform,
        text: args.text,
        certificate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{args::parse_req_args, config::ConfigFile};

    fn args(list: &[&str]) -> ReqArgs {
        parse_req_args(list.iter()).unwrap() //#[allow_ci]
    }

    fn generate(plan: Plan) -> RequestPlan {
        match plan {
            Plan::Generate(p) => p,
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_merge_precedence() {
        let m = merge(Some(1), Some(2), Some(3));
        assert_eq!((m.value, m.outcome), (Some(1), Outcome::FromOverride));
        let m = merge(None, Some(2), Some(3));
        assert_eq!((m.value, m.outcome), (Some(2), Outcome::FromConfig));
        let m = merge(None, None, Some(3));
        assert_eq!((m.value, m.outcome), (Some(3), Outcome::Default));
        let m: Merged<u8> = merge(None, None, None);
        assert_eq!(m.outcome, Outcome::MissingRequired);
        assert!(matches!(
            m.required("field"),
            Err(Error::MissingRequiredField { name }) if name == "field"
        ));
    }

    #[test]
    fn test_digest_precedence() {
        let config =
            ConfigFile::from_contents("req.cnf", "[req]\ndefault_md = sha256\n")
                .unwrap(); //#[allow_ci]
        let params = RequestParameters::resolve(&config);

        let base = ["-new", "-key", "k.pem", "-subj", "CN=a", "-out", "r"];
        let p = generate(plan(&args(&base), &params).unwrap()); //#[allow_ci]
        assert_eq!(p.digest, DigestAlgorithm::Sha256);

        let mut with_flag = base.to_vec();
        with_flag.push("-sha384");
        let p = generate(plan(&args(&with_flag), &params).unwrap()); //#[allow_ci]
        assert_eq!(p.digest, DigestAlgorithm::Sha384);

        let p = generate(
            plan(&args(&base), &RequestParameters::default()).unwrap(), //#[allow_ci]
        );
        assert_eq!(p.digest, DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_invalid_configured_digest() {
        let params = RequestParameters {
            default_md: Some("sha3"),
            ..Default::default()
        };
        let base = ["-key", "k.pem", "-subj", "CN=a", "-out", "r"];
        assert!(matches!(
            plan(&args(&base), &params),
            Err(Error::InvalidDirectiveValue { directive, .. }) if directive == "default_md"
        ));

        let mut with_flag = base.to_vec();
        with_flag.push("-md5");
        assert!(plan(&args(&with_flag), &params).is_ok());
    }

    #[test]
    fn test_keyfile_resolution() {
        let params = RequestParameters {
            default_keyfile: Some("config.key"),
            default_commonname: Some("from.config"),
            ..Default::default()
        };

        let p = generate(plan(&args(&["-out", "r"]), &params).unwrap()); //#[allow_ci]
        assert_eq!(p.keyfile, PathBuf::from("config.key"));
        assert_eq!(p.subject.to_string(), "CN=from.config");
        assert!(p.new_key.is_none());

        let p = generate(
            plan(&args(&["-key", "cli.key", "-out", "r"]), &params).unwrap(), //#[allow_ci]
        );
        assert_eq!(p.keyfile, PathBuf::from("cli.key"));

        let err = plan(
            &args(&["-subj", "CN=a", "-out", "r"]),
            &RequestParameters::default(),
        )
        .unwrap_err(); //#[allow_ci]
        assert!(matches!(
            err,
            Error::MissingRequiredField { name } if name == "keyfile"
        ));
    }

    #[test]
    fn test_new_key_resolution() {
        let params = RequestParameters {
            default_bits: Some("3072"),
            default_keyfile: Some("config.key"),
            ..Default::default()
        };
        let list = [
            "-newkey", "rsa:1024", "-keyout", "new.key", "-subj", "CN=a",
            "-out", "r",
        ];
        let p = generate(plan(&args(&list), &params).unwrap()); //#[allow_ci]
        assert_eq!(
            p.new_key,
            Some(NewKeyPlan {
                bits: 1024,
                keyout: "new.key".into(),
            })
        );
        assert_eq!(p.keyfile, PathBuf::from("new.key"));
    }

    #[test]
    fn test_new_key_ignores_configuration() {
        let params = RequestParameters {
            default_bits: Some("huge"),
            default_keyfile: Some("cfg.key"),
            ..Default::default()
        };

        let list = ["-newkey", "rsa", "-keyout", "k", "-subj", "CN=a", "-out", "o"];
        assert!(matches!(plan(&args(&list), &params), Err(Error::Usage(_))));

        let list = ["-newkey", "rsa:2048", "-subj", "CN=a", "-out", "o"];
        assert!(matches!(plan(&args(&list), &params), Err(Error::Usage(_))));
    }

    #[test]
    fn test_missing_subject() {
        let err = plan(
            &args(&["-key", "k", "-out", "r"]),
            &RequestParameters::default(),
        )
        .unwrap_err(); //#[allow_ci]
        assert!(matches!(
            err,
            Error::MissingRequiredField { name } if name == "subject"
        ));

        let err = plan(
            &args(&["-key", "k", "-out", "r", "-subj", "nonsense"]),
            &RequestParameters::default(),
        )
        .unwrap_err(); //#[allow_ci]
        assert!(matches!(err, Error::InvalidDirectiveValue { .. }));
    }

    #[test]
    fn test_certificate_plan() {
        let params = RequestParameters {
            default_serial: Some("99"),
            extensions: ExtensionParameters {
                key_usage: Some("digitalSignature"),
                basic_constraints: Some("CA:FALSE"),
                ..Default::default()
            },
            ..Default::default()
        };
        let list = ["-x509", "-key", "k", "-subj", "CN=a", "-out", "c"];
        let p = generate(plan(&args(&list), &params).unwrap()); //#[allow_ci]
        let cert = p.certificate.unwrap(); //#[allow_ci]
        assert_eq!(cert.days, DEFAULT_DAYS);
        assert_eq!(cert.serial, None);
        assert_eq!(
            cert.extensions,
            vec![
                ExtensionDirective::BasicConstraints {
                    is_ca: false,
                    max_path_len: None,
                },
                ExtensionDirective::KeyUsageMask { bits: 0x80 },
            ]
        );

        let params = RequestParameters {
            extensions: ExtensionParameters {
                basic_constraints: Some("CA:TRUE,pathlen:500"),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            plan(&args(&list), &params),
            Err(Error::InvalidDirectiveValue { .. })
        ));
    }

    #[test]
    fn test_inspect_and_noout() {
        let p = plan(
            &args(&["-in", "r.pem", "-text"]),
            &RequestParameters::default(),
        )
        .unwrap(); //#[allow_ci]
        assert_eq!(
            p,
            Plan::Inspect(InspectPlan {
                infile: "r.pem".into(),
                text: true,
                noout: false,
            })
        );

        let p = generate(
            plan(
                &args(&["-key", "k", "-subj", "CN=a", "-out", "r", "-noout"]),
                &RequestParameters::default(),
            )
            .unwrap(), //#[allow_ci]
        );
        assert_eq!(p.out, None);
    }
}
