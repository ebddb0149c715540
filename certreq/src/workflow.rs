// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use crate::{
    args::ReqArgs,
    config::{select_config_path, ConfigFile, ConfigPath, RequestParameters},
    crypto::{CertificateSpec, CollaboratorError, CryptoBackend},
    error::Result,
    merge::{self, CertificatePlan, InspectPlan, Plan, RequestPlan},
};
use log::*;
use std::io::Write;

/// Stages of a `req` run
///
/// A run moves forward only. `KeyReady` is entered only when a key is
/// generated. Issuing a certificate goes through `SubjectReady`,
/// `ExtensionsApplied` and `Written` a second time, once for the request
/// and once for the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Init,
    ConfigResolved,
    Validated,
    KeyReady,
    SubjectReady,
    ExtensionsApplied,
    Written,
    Done,
    Failed(String),
}

pub struct Workflow<'a, B: CryptoBackend, W: Write> {
    backend: &'a mut B,
    output: W,
    state: State,
    history: Vec<State>,
}

impl<'a, B: CryptoBackend, W: Write> Workflow<'a, B, W> {
    /// Text forms requested with `-text` are written to `output`
    pub fn new(backend: &'a mut B, output: W) -> Self {
        Self {
            backend,
            output,
            state: State::Init,
            history: vec![State::Init],
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Every state entered so far, starting with `Init`
    pub fn history(&self) -> &[State] {
        &self.history
    }

    fn enter(&mut self, state: State) {
        debug!("{:?} -> {:?}", self.state, state);
        self.history.push(state.clone());
        self.state = state;
    }

    /// Runs with the configuration selected from the environment and
    /// `-config`
    pub fn run(&mut self, args: &ReqArgs) -> Result<()> {
        let config_path = select_config_path(args.config.as_deref());
        self.run_with_config(args, config_path)
    }

    pub fn run_with_config(
        &mut self,
        args: &ReqArgs,
        config_path: Option<ConfigPath>,
    ) -> Result<()> {
        let result = self.drive(args, config_path);
        match &result {
            Ok(()) => self.enter(State::Done),
            Err(e) => self.enter(State::Failed(e.to_string())),
        }
        result
    }

    fn drive(
        &mut self,
        args: &ReqArgs,
        config_path: Option<ConfigPath>,
    ) -> Result<()> {
        args.validate()?;

        let config = match config_path {
            Some(c) => {
                info!("Reading configuration from {}", c.path.display());
                Some(ConfigFile::load(&c.path)?)
            }
            None => None,
        };
        let params = config
            .as_ref()
            .map(RequestParameters::resolve)
            .unwrap_or_default();
        self.enter(State::ConfigResolved);

        let plan = merge::plan(args, &params)?;
        self.enter(State::Validated);

        match plan {
            Plan::Inspect(plan) => self.inspect(&plan),
            Plan::Generate(plan) => self.generate(&plan),
        }
    }

    fn print(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|e| CollaboratorError::io("failed to print", e))?;
        Ok(())
    }

    fn inspect(&mut self, plan: &InspectPlan) -> Result<()> {
        let request = self.backend.load_request(&plan.infile)?;
        info!("Request {} has a valid signature", plan.infile.display());
        if !plan.noout {
            let text = self.backend.describe_request(&request)?;
            self.print(&text)?;
        }
        Ok(())
    }

    fn generate(&mut self, plan: &RequestPlan) -> Result<()> {
        if let Some(new_key) = &plan.new_key {
            self.backend.generate_key(new_key.bits, &new_key.keyout)?;
            self.enter(State::KeyReady);
        }

        let key = self
            .backend
            .load_key(&plan.keyfile, plan.passphrase.as_deref())?;
        let request =
            self.backend
                .build_request(&plan.subject, &key, plan.digest)?;
        self.enter(State::SubjectReady);

        // Requests carry no extensions of their own
        self.enter(State::ExtensionsApplied);

        let encoded = self.backend.encode_request(&request, plan.outform)?;
        if plan.text {
            let text = self.backend.describe_request(&request)?;
            self.print(&text)?;
        }

        match &plan.certificate {
            None => {
                if let Some(out) = &plan.out {
                    self.backend.write_output(out, &encoded)?;
                }
                self.enter(State::Written);
            }
            Some(certificate) => {
                // Only the certificate is written on this path
                self.enter(State::Written);
                self.issue(plan, certificate, &key, &encoded)?;
            }
        }
        Ok(())
    }

    fn issue(
        &mut self,
        plan: &RequestPlan,
        certificate: &CertificatePlan,
        key: &B::PrivateKey,
        encoded_request: &[u8],
    ) -> Result<()> {
        let request =
            self.backend.decode_request(encoded_request, plan.outform)?;
        let subject = self.backend.request_subject(&request)?;
        self.enter(State::SubjectReady);

        let spec = CertificateSpec {
            digest: plan.digest,
            days: certificate.days,
            serial: certificate.serial.as_deref(),
            extensions: &certificate.extensions,
        };
        let issued =
            self.backend
                .issue_certificate(&request, &subject, key, &spec)?;
        self.enter(State::ExtensionsApplied);

        let encoded = self.backend.encode_certificate(&issued, plan.outform)?;
        if plan.text {
            let text = self.backend.describe_certificate(&issued)?;
            self.print(&text)?;
        }
        if let Some(out) = &plan.out {
            self.backend.write_output(out, &encoded)?;
        }
        self.enter(State::Written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::DigestAlgorithm, args::parse_req_args,
        config::ConfigSource, crypto::OutputFormat, error::Error,
        subject::DistinguishedName,
    };
    use std::path::Path;

    // Records every call and keeps artifacts as plain strings
    #[derive(Default)]
    struct MockBackend {
        calls: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl MockBackend {
        fn call(
            &mut self,
            name: &str,
        ) -> std::result::Result<(), CollaboratorError> {
            self.calls.push(name.to_string());
            if self.fail_on == Some(name) {
                return Err(CollaboratorError::new(
                    7,
                    format!("{name} failed"),
                ));
            }
            Ok(())
        }
    }

    impl CryptoBackend for MockBackend {
        type PrivateKey = String;
        type Request = String;
        type Certificate = String;

        fn generate_key(
            &mut self,
            bits: u32,
            path: &Path,
        ) -> std::result::Result<(), CollaboratorError> {
            self.call(&format!("generate_key {bits} {}", path.display()))
        }

        fn load_key(
            &mut self,
            path: &Path,
            passphrase: Option<&str>,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("load_key")?;
            Ok(format!("{}:{}", path.display(), passphrase.unwrap_or("")))
        }

        fn build_request(
            &mut self,
            subject: &DistinguishedName,
            key: &String,
            digest: DigestAlgorithm,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("build_request")?;
            Ok(format!("{subject}|{key}|{digest}"))
        }

        fn encode_request(
            &mut self,
            request: &String,
            format: OutputFormat,
        ) -> std::result::Result<Vec<u8>, CollaboratorError> {
            self.call(&format!("encode_request {format}"))?;
            Ok(request.clone().into_bytes())
        }

        fn decode_request(
            &mut self,
            data: &[u8],
            _format: OutputFormat,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("decode_request")?;
            Ok(String::from_utf8_lossy(data).into_owned())
        }

        fn load_request(
            &mut self,
            path: &Path,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("load_request")?;
            Ok(format!("CN=loaded|{}", path.display()))
        }

        fn request_subject(
            &mut self,
            request: &String,
        ) -> std::result::Result<DistinguishedName, CollaboratorError> {
            self.call("request_subject")?;
            let subject = request.split('|').next().unwrap_or_default();
            DistinguishedName::parse(subject)
                .map_err(|e| CollaboratorError::new(1, e.to_string()))
        }

        fn describe_request(
            &mut self,
            request: &String,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("describe_request")?;
            Ok(format!("request {request}\n"))
        }

        fn issue_certificate(
            &mut self,
            _request: &String,
            subject: &DistinguishedName,
            issuer_key: &String,
            spec: &CertificateSpec,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("issue_certificate")?;
            Ok(format!(
                "{subject}|{issuer_key}|{}|{}|{}",
                spec.days,
                spec.serial.unwrap_or("random"),
                spec.extensions.len()
            ))
        }

        fn encode_certificate(
            &mut self,
            certificate: &String,
            format: OutputFormat,
        ) -> std::result::Result<Vec<u8>, CollaboratorError> {
            self.call(&format!("encode_certificate {format}"))?;
            Ok(certificate.clone().into_bytes())
        }

        fn describe_certificate(
            &mut self,
            certificate: &String,
        ) -> std::result::Result<String, CollaboratorError> {
            self.call("describe_certificate")?;
            Ok(format!("certificate {certificate}\n"))
        }

        fn write_output(
            &mut self,
            path: &Path,
            data: &[u8],
        ) -> std::result::Result<(), CollaboratorError> {
            self.call(&format!(
                "write_output {} {}",
                path.display(),
                String::from_utf8_lossy(data)
            ))
        }
    }

    fn args(list: &[&str]) -> ReqArgs {
        parse_req_args(list.iter()).unwrap() //#[allow_ci]
    }

    fn config_file(contents: &str) -> (tempfile::NamedTempFile, ConfigPath) {
        let mut file = tempfile::NamedTempFile::new().unwrap(); //#[allow_ci]
        file.write_all(contents.as_bytes()).unwrap(); //#[allow_ci]
        let path = ConfigPath {
            path: file.path().to_path_buf(),
            source: ConfigSource::CommandLine,
        };
        (file, path)
    }

    #[test]
    fn test_request_with_existing_key() {
        let mut backend = MockBackend::default();
        let mut output = Vec::new();
        let mut workflow = Workflow::new(&mut backend, &mut output);
        workflow
            .run_with_config(
                &args(&["-new", "-key", "k.pem", "-subj", "CN=a", "-out", "r.pem"]),
                None,
            )
            .unwrap(); //#[allow_ci]

        assert_eq!(
            workflow.history(),
            &[
                State::Init,
                State::ConfigResolved,
                State::Validated,
                State::SubjectReady,
                State::ExtensionsApplied,
                State::Written,
                State::Done,
            ]
        );
        assert_eq!(
            backend.calls,
            vec![
                "load_key",
                "build_request",
                "encode_request PEM",
                "write_output r.pem CN=a|k.pem:|sha256",
            ]
        );
        assert!(output.is_empty());
    }

    #[test]
    fn test_request_with_new_key_and_config() {
        let (_file, path) = config_file(
            "[req]\ndefault_bits = 1024\ndefault_md = sha1\n\
             distinguished_name = dn\n[dn]\ncommonName_default = cfg\n",
        );
        let mut backend = MockBackend::default();
        let mut output = Vec::new();
        let mut workflow = Workflow::new(&mut backend, &mut output);
        workflow
            .run_with_config(
                &args(&[
                    "-newkey", "rsa:2048", "-keyout", "new.key", "-out", "r.der",
                    "-outform", "DER", "-text",
                ]),
                Some(path),
            )
            .unwrap(); //#[allow_ci]

        assert_eq!(
            workflow.history(),
            &[
                State::Init,
                State::ConfigResolved,
                State::Validated,
                State::KeyReady,
                State::SubjectReady,
                State::ExtensionsApplied,
                State::Written,
                State::Done,
            ]
        );
        assert_eq!(
            backend.calls,
            vec![
                "generate_key 2048 new.key",
                "load_key",
                "build_request",
                "encode_request DER",
                "describe_request",
                "write_output r.der CN=cfg|new.key:|sha1",
            ]
        );
        assert_eq!(
            String::from_utf8(output).unwrap(), //#[allow_ci]
            "request CN=cfg|new.key:|sha1\n"
        );
    }

    #[test]
    fn test_self_signed_certificate() {
        let (_file, path) = config_file(
            "[req]\nx509_extensions = v3\n[v3]\nbasicConstraints = CA:TRUE\n\
             keyUsage = keyCertSign\n",
        );
        let mut backend = MockBackend::default();
        let mut output = Vec::new();
        let mut workflow = Workflow::new(&mut backend, &mut output);
        workflow
            .run_with_config(
                &args(&[
                    "-x509", "-key", "ca.key", "-passin", "pass:pw", "-subj",
                    "CN=ca", "-days", "10", "-out", "ca.pem",
                ]),
                Some(path),
            )
            .unwrap(); //#[allow_ci]

        assert_eq!(
            workflow.history(),
            &[
                State::Init,
                State::ConfigResolved,
                State::Validated,
                State::SubjectReady,
                State::ExtensionsApplied,
                State::Written,
                State::SubjectReady,
                State::ExtensionsApplied,
                State::Written,
                State::Done,
            ]
        );
        assert_eq!(
            backend.calls,
            vec![
                "load_key",
                "build_request",
                "encode_request PEM",
                "decode_request",
                "request_subject",
                "issue_certificate",
                "encode_certificate PEM",
                "write_output ca.pem CN=ca|ca.key:pw|10|random|2",
            ]
        );
    }

    #[test]
    fn test_usage_error_before_any_collaborator() {
        let mut backend = MockBackend::default();
        let mut workflow = Workflow::new(&mut backend, Vec::new());
        let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
        let missing = ConfigPath {
            path: dir.path().join("missing.cnf"),
            source: ConfigSource::PrimaryEnv,
        };

        let result = workflow.run_with_config(
            &args(&["-key", "k.pem", "-newkey", "rsa:2048", "-out", "o"]),
            Some(missing),
        );
        assert!(matches!(result, Err(Error::Usage(_))));
        assert_eq!(workflow.history().len(), 2);
        assert!(matches!(workflow.state(), State::Failed(_)));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_config_errors() {
        let mut backend = MockBackend::default();
        let mut workflow = Workflow::new(&mut backend, Vec::new());
        let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
        let missing = ConfigPath {
            path: dir.path().join("missing.cnf"),
            source: ConfigSource::CommandLine,
        };
        let list = ["-key", "k.pem", "-subj", "CN=a", "-out", "o"];
        assert!(matches!(
            workflow.run_with_config(&args(&list), Some(missing)),
            Err(Error::ConfigNotFound { .. })
        ));

        let (_file, path) = config_file("[req]\n[broken\n");
        assert!(matches!(
            workflow.run_with_config(&args(&list), Some(path)),
            Err(Error::ConfigParse { line: 2, .. })
        ));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_missing_field_before_any_collaborator() {
        let mut backend = MockBackend::default();
        let mut workflow = Workflow::new(&mut backend, Vec::new());
        let result = workflow
            .run_with_config(&args(&["-key", "k.pem", "-out", "o"]), None);
        assert!(matches!(result, Err(Error::MissingRequiredField { .. })));
        assert_eq!(
            workflow.history(),
            &[
                State::Init,
                State::ConfigResolved,
                State::Failed(
                    "No value given for required field 'subject' on the command line or in the configuration"
                        .into()
                ),
            ]
        );
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_collaborator_failure_stops_run() {
        let mut backend = MockBackend {
            fail_on: Some("build_request"),
            ..Default::default()
        };
        let mut workflow = Workflow::new(&mut backend, Vec::new());
        let result = workflow.run_with_config(
            &args(&["-key", "k.pem", "-subj", "CN=a", "-out", "o"]),
            None,
        );
        assert!(matches!(
            result,
            Err(Error::Collaborator(CollaboratorError { code: 7, .. }))
        ));
        assert_eq!(backend.calls, vec!["load_key", "build_request"]);
    }

    #[test]
    fn test_inspect() {
        let mut backend = MockBackend::default();
        let mut output = Vec::new();
        let mut workflow = Workflow::new(&mut backend, &mut output);
        workflow
            .run_with_config(&args(&["-in", "r.pem"]), None)
            .unwrap(); //#[allow_ci]
        assert_eq!(workflow.state(), &State::Done);
        assert_eq!(backend.calls, vec!["load_request", "describe_request"]);
        assert_eq!(
            String::from_utf8(output).unwrap(), //#[allow_ci]
            "request CN=loaded|r.pem\n"
        );

        let mut backend = MockBackend::default();
        let mut workflow = Workflow::new(&mut backend, Vec::new());
        workflow
            .run_with_config(&args(&["-in", "r.pem", "-noout"]), None)
            .unwrap(); //#[allow_ci]
        assert_eq!(backend.calls, vec!["load_request"]);
    }
}
