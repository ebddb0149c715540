// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use super::{ConfigFile, ScopeChain, TagRange};
use log::*;

/// Root tag of the request schema
pub const REQUEST_TAG: &str = "req";
/// Root tag of the certificate authority schema
pub const CA_TAG: &str = "ca";

/// Values of the request schema found in a configuration file
///
/// Every field is resolved on its own and stays unset when the key is
/// absent. The values borrow from the [`ConfigFile`] they were read from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestParameters<'a> {
    pub default_bits: Option<&'a str>,
    pub default_keyfile: Option<&'a str>,
    pub default_md: Option<&'a str>,
    pub distinguished_name: Option<&'a str>,
    pub x509_extensions: Option<&'a str>,
    pub default_country: Option<&'a str>,
    pub default_state: Option<&'a str>,
    pub default_locality: Option<&'a str>,
    pub default_org: Option<&'a str>,
    pub default_orgunit: Option<&'a str>,
    pub default_commonname: Option<&'a str>,
    pub default_email: Option<&'a str>,
    pub default_serial: Option<&'a str>,
    pub extensions: ExtensionParameters<'a>,
}

/// Extension directives read from an extensions tag
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtensionParameters<'a> {
    pub subject_key_identifier: Option<&'a str>,
    pub authority_key_identifier: Option<&'a str>,
    pub basic_constraints: Option<&'a str>,
    pub key_usage: Option<&'a str>,
    pub extended_key_usage: Option<&'a str>,
    pub ns_cert_type: Option<&'a str>,
}

/// Values of the certificate authority schema
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaParameters<'a> {
    pub default_ca: Option<&'a str>,
    pub dir: Option<&'a str>,
    pub certs: Option<&'a str>,
    pub crl_dir: Option<&'a str>,
    pub database: Option<&'a str>,
    pub new_certs_dir: Option<&'a str>,
    pub certificate: Option<&'a str>,
    pub serial: Option<&'a str>,
    pub crl: Option<&'a str>,
    pub private_key: Option<&'a str>,
    pub default_days: Option<&'a str>,
    pub default_crl_days: Option<&'a str>,
    pub default_md: Option<&'a str>,
    pub preserve: Option<&'a str>,
    pub unique_subject: Option<&'a str>,
    pub policy: Option<&'a str>,
    pub x509_extensions: Option<&'a str>,
    pub crl_extensions: Option<&'a str>,
    pub policy_match: PolicyParameters<'a>,
    pub extensions: ExtensionParameters<'a>,
    pub crl_authority_key_identifier: Option<&'a str>,
}

/// Match rules of a certificate authority policy tag
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PolicyParameters<'a> {
    pub country: Option<&'a str>,
    pub state: Option<&'a str>,
    pub locality: Option<&'a str>,
    pub org: Option<&'a str>,
    pub orgunit: Option<&'a str>,
    pub commonname: Option<&'a str>,
    pub email: Option<&'a str>,
}

/// Follows a pointer value to the tag it names
///
/// Only one hop is taken: the pointed-to tag is searched with its own
/// chain, and pointers found inside it are not followed.
fn follow(
    config: &ConfigFile,
    pointer: &str,
    target: Option<&str>,
) -> Option<TagRange> {
    let target = target?;
    let range = config.locate_tag(target);
    if range.is_none() {
        warn!(
            "Tag [{target}] referenced by '{pointer}' not found in {}",
            config.path().display()
        );
    }
    range
}

fn root_chain(config: &ConfigFile, tag: &str) -> ScopeChain {
    let root = config.locate_tag(tag);
    if root.is_none() {
        debug!(
            "No [{tag}] tag in {}, using the default section only",
            config.path().display()
        );
    }
    ScopeChain::for_tag(config, root)
}

impl<'a> ExtensionParameters<'a> {
    fn resolve(config: &'a ConfigFile, chain: &ScopeChain) -> Self {
        ExtensionParameters {
            subject_key_identifier: config
                .lookup(chain, "subjectKeyIdentifier"),
            authority_key_identifier: config
                .lookup(chain, "authorityKeyIdentifier"),
            basic_constraints: config.lookup(chain, "basicConstraints"),
            key_usage: config.lookup(chain, "keyUsage"),
            extended_key_usage: config.lookup(chain, "extendedKeyUsage"),
            ns_cert_type: config.lookup(chain, "nsCertType"),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ExtensionParameters::default()
    }
}

impl<'a> RequestParameters<'a> {
    /// Walks the request schema starting at the `[req]` tag
    pub fn resolve(config: &'a ConfigFile) -> Self {
        let root = root_chain(config, REQUEST_TAG);

        let mut params = RequestParameters {
            default_bits: config.lookup(&root, "default_bits"),
            default_keyfile: config.lookup(&root, "default_keyfile"),
            default_md: config.lookup(&root, "default_md"),
            distinguished_name: config.lookup(&root, "distinguished_name"),
            x509_extensions: config.lookup(&root, "x509_extensions"),
            ..Default::default()
        };

        if let Some(dn) =
            follow(config, "distinguished_name", params.distinguished_name)
        {
            let chain = ScopeChain::for_tag(config, Some(dn));
            params.default_country =
                config.lookup(&chain, "countryName_default");
            params.default_state =
                config.lookup(&chain, "stateOrProvinceName_default");
            params.default_locality =
                config.lookup(&chain, "localityName_default");
            params.default_org = config
                .lookup(&chain, "organizationName_default")
                .or_else(|| config.lookup(&chain, "0.organizationName_default"));
            params.default_orgunit =
                config.lookup(&chain, "organizationalUnitName_default");
            params.default_commonname =
                config.lookup(&chain, "commonName_default");
            params.default_email =
                config.lookup(&chain, "emailAddress_default");
            params.default_serial =
                config.lookup(&chain, "serialNumber_default");
        }

        if let Some(ext) =
            follow(config, "x509_extensions", params.x509_extensions)
        {
            let chain = ScopeChain::for_tag(config, Some(ext));
            params.extensions = ExtensionParameters::resolve(config, &chain);
        }

        debug!("Request parameters from {}: {params:?}", config.path().display());
        params
    }
}

impl<'a> CaParameters<'a> {
    /// Walks the certificate authority schema starting at `[ca]`
    ///
    /// `default_ca` names the tag holding the authority settings, which in
    /// turn points at the policy and extension tags.
    pub fn resolve(config: &'a ConfigFile) -> Self {
        let root = root_chain(config, CA_TAG);
        let mut params = CaParameters {
            default_ca: config.lookup(&root, "default_ca"),
            ..Default::default()
        };

        let Some(ca) = follow(config, "default_ca", params.default_ca) else {
            return params;
        };
        let chain = ScopeChain::for_tag(config, Some(ca));

        params.dir = config.lookup(&chain, "dir");
        params.certs = config.lookup(&chain, "certs");
        params.crl_dir = config.lookup(&chain, "crl_dir");
        params.database = config.lookup(&chain, "database");
        params.new_certs_dir = config.lookup(&chain, "new_certs_dir");
        params.certificate = config.lookup(&chain, "certificate");
        params.serial = config.lookup(&chain, "serial");
        params.crl = config.lookup(&chain, "crl");
        params.private_key = config.lookup(&chain, "private_key");
        params.default_days = config.lookup(&chain, "default_days");
        params.default_crl_days = config.lookup(&chain, "default_crl_days");
        params.default_md = config.lookup(&chain, "default_md");
        params.preserve = config.lookup(&chain, "preserve");
        params.unique_subject = config.lookup(&chain, "unique_subject");
        params.policy = config.lookup(&chain, "policy");
        params.x509_extensions = config.lookup(&chain, "x509_extensions");
        params.crl_extensions = config.lookup(&chain, "crl_extensions");

        if let Some(policy) = follow(config, "policy", params.policy) {
            let chain = ScopeChain::for_tag(config, Some(policy));
            params.policy_match = PolicyParameters {
                country: config.lookup(&chain, "countryName"),
                state: config.lookup(&chain, "stateOrProvinceName"),
                locality: config.lookup(&chain, "localityName"),
                org: config.lookup(&chain, "organizationName"),
                orgunit: config.lookup(&chain, "organizationalUnitName"),
                commonname: config.lookup(&chain, "commonName"),
                email: config.lookup(&chain, "emailAddress"),
            };
        }

        if let Some(ext) =
            follow(config, "x509_extensions", params.x509_extensions)
        {
            let chain = ScopeChain::for_tag(config, Some(ext));
            params.extensions = ExtensionParameters::resolve(config, &chain);
        }

        if let Some(crl_ext) =
            follow(config, "crl_extensions", params.crl_extensions)
        {
            let chain = ScopeChain::for_tag(config, Some(crl_ext));
            params.crl_authority_key_identifier =
                config.lookup(&chain, "authorityKeyIdentifier");
        }

        params
    }
}
