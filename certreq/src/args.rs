// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

//! Arguments of the `req` command
//!
//! Arguments use the single-dash `-flag value` form of the OpenSSL command
//! line tools, so they are scanned here instead of by clap.

use crate::{
    algorithms::{DigestAlgorithm, NewKeySpec},
    crypto::OutputFormat,
    error::{Error, Result},
};
use log::*;
use std::{convert::TryFrom, path::PathBuf};

pub const USAGE: &str = "\
usage: certreq req [options]

General options:
    -help                 Display this summary
    -config infile        Configuration file
                          CERTREQ_CONF in the environment takes precedence
    -in infile            Certificate request to inspect

Certificate options:
    -new                  New request
    -x509                 Output a self-signed certificate instead of a request
    -days +int            Number of days the certificate is valid for
    -set_serial val       Decimal serial number of the certificate
    -subj val             Subject, as CN=name,O=org,... or /CN=name/O=org

Key and signing options:
    -key val              Key for signing
    -passin val           Key password source, as pass:<password>
    -newkey val           Generate a new key, as rsa:<bits>
    -keyout outfile       File to write the new private key to, required
                          with -newkey

Output options:
    -out outfile          Output file
    -outform PEM|DER      Output format (default PEM)
    -noout                Do not write the request or certificate
    -text                 Print the request or certificate in text form
    -<digest>             Signature digest (default sha256), one of
                          md5, sha1, sha224, sha256, sha384, sha512, ripemd160
";

/// Arguments as given on the command line, before any configuration merge
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReqArgs {
    pub config: Option<PathBuf>,
    pub infile: Option<PathBuf>,
    pub new_request: bool,
    pub x509: bool,
    pub days: Option<String>,
    pub serial: Option<String>,
    pub subject: Option<String>,
    pub key: Option<PathBuf>,
    pub passin: Option<String>,
    pub newkey: Option<String>,
    pub keyout: Option<PathBuf>,
    pub text: bool,
    pub out: Option<PathBuf>,
    pub outform: OutputFormat,
    pub noout: bool,
    pub digest: Option<DigestAlgorithm>,
}

fn value<I, S>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    args.next()
        .map(|v| v.as_ref().to_string())
        .ok_or_else(|| Error::usage(format!("option {flag} needs a value")))
}

/// Scans the arguments following `req`
///
/// Only the shape of each argument is checked here; combinations are
/// checked by [`ReqArgs::validate`].
pub fn parse_req_args<I, S>(args: I) -> Result<ReqArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter().peekable();
    if args.peek().is_none() {
        return Err(Error::usage("no options given"));
    }

    let mut req = ReqArgs::default();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        match arg {
            "-help" => return Err(Error::usage("help requested")),
            "-config" => req.config = Some(value(&mut args, arg)?.into()),
            "-in" => req.infile = Some(value(&mut args, arg)?.into()),
            "-new" => req.new_request = true,
            "-x509" => req.x509 = true,
            "-days" => req.days = Some(value(&mut args, arg)?),
            "-set_serial" => req.serial = Some(value(&mut args, arg)?),
            "-subj" => req.subject = Some(value(&mut args, arg)?),
            "-key" => req.key = Some(value(&mut args, arg)?.into()),
            "-passin" => req.passin = Some(value(&mut args, arg)?),
            "-newkey" => req.newkey = Some(value(&mut args, arg)?),
            "-keyout" => req.keyout = Some(value(&mut args, arg)?.into()),
            "-out" => req.out = Some(value(&mut args, arg)?.into()),
            "-outform" => {
                req.outform = value(&mut args, arg)?
                    .parse::<OutputFormat>()
                    .map_err(Error::Usage)?;
            }
            "-text" => req.text = true,
            "-noout" => req.noout = true,
            "-batch" | "-utf8" | "-nodes" | "-noenc" => {
                debug!("Ignoring option {arg}");
            }
            other => {
                let digest = other
                    .strip_prefix('-')
                    .and_then(|name| DigestAlgorithm::try_from(name).ok())
                    .ok_or_else(|| {
                        Error::usage(format!("unknown option '{other}'"))
                    })?;
                if let Some(previous) = req.digest.replace(digest) {
                    return Err(Error::usage(format!(
                        "digest given twice, -{previous} and {other}"
                    )));
                }
            }
        }
    }

    Ok(req)
}

type Rule = fn(&ReqArgs) -> Result<()>;

// Order matters: the first failing rule is the one reported
const VALIDATION_PIPELINE: &[Rule] = &[
    new_conflicts_with_in,
    key_conflicts_with_newkey,
    output_required,
    newkey_conflicts_with_noout,
    newkey_requires_keyout,
    days_positive,
    serial_decimal,
    newkey_supported,
    passin_supported,
];

fn new_conflicts_with_in(args: &ReqArgs) -> Result<()> {
    if args.new_request && args.infile.is_some() {
        return Err(Error::usage("-new and -in cannot be used together"));
    }
    Ok(())
}

fn key_conflicts_with_newkey(args: &ReqArgs) -> Result<()> {
    if args.key.is_some() && args.newkey.is_some() {
        return Err(Error::usage("-key and -newkey cannot be used together"));
    }
    Ok(())
}

fn output_required(args: &ReqArgs) -> Result<()> {
    if args.infile.is_none() && args.out.is_none() {
        return Err(Error::usage("no output file given, use -out"));
    }
    Ok(())
}

fn newkey_conflicts_with_noout(args: &ReqArgs) -> Result<()> {
    if args.newkey.is_some() && args.noout {
        return Err(Error::usage(
            "-newkey cannot be used with -noout, the new key would be lost",
        ));
    }
    Ok(())
}

fn newkey_requires_keyout(args: &ReqArgs) -> Result<()> {
    if args.newkey.is_some() && args.keyout.is_none() {
        return Err(Error::usage("-newkey needs -keyout for the new key"));
    }
    Ok(())
}

fn days_positive(args: &ReqArgs) -> Result<()> {
    args.days().map(|_| ())
}

fn serial_decimal(args: &ReqArgs) -> Result<()> {
    match args.serial.as_deref() {
        Some(serial)
            if serial.is_empty()
                || !serial.bytes().all(|b| b.is_ascii_digit()) =>
        {
            Err(Error::invalid_value(
                "-set_serial",
                serial,
                "not a decimal number",
            ))
        }
        _ => Ok(()),
    }
}

fn newkey_supported(args: &ReqArgs) -> Result<()> {
    args.newkey_spec().map(|_| ())
}

fn passin_supported(args: &ReqArgs) -> Result<()> {
    match args.passin.as_deref() {
        Some(source) if !source.starts_with("pass:") => Err(Error::usage(
            format!("unsupported password source '{source}', use pass:<password>"),
        )),
        _ => Ok(()),
    }
}

impl ReqArgs {
    /// Checks argument combinations, stopping at the first failure
    ///
    /// Nothing is read from disk, so a failure here means no file was
    /// opened.
    pub fn validate(&self) -> Result<()> {
        VALIDATION_PIPELINE.iter().try_for_each(|rule| rule(self))
    }

    /// Validity period given with `-days`
    pub fn days(&self) -> Result<Option<u32>> {
        match self.days.as_deref() {
            None => Ok(None),
            Some(days) => match days.parse::<u32>() {
                Ok(d) if d > 0 => Ok(Some(d)),
                _ => Err(Error::usage(format!(
                    "-days needs a positive number, got '{days}'"
                ))),
            },
        }
    }

    /// Key generation request given with `-newkey`
    pub fn newkey_spec(&self) -> Result<Option<NewKeySpec>> {
        self.newkey
            .as_deref()
            .map(|spec| {
                NewKeySpec::try_from(spec).map_err(|e| {
                    Error::usage(format!("invalid -newkey '{spec}': {e}"))
                })
            })
            .transpose()
    }

    /// Password given with `-passin pass:<password>`
    pub fn passphrase(&self) -> Option<&str> {
        self.passin.as_deref().and_then(|s| s.strip_prefix("pass:"))
    }
}
