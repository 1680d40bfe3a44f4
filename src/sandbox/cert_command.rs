use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Mkcert,
    Openssl,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Mkcert => f.write_str("mkcert"),
            Tool::Openssl => f.write_str("openssl"),
        }
    }
}

/// Every external invocation the console can make.
///
/// `render` produces the shell-shaped form that the command allowlist checks;
/// execution uses `tool` + `args` + `working_dir` directly and never goes
/// through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertCommand {
    CaRoot,
    Install,
    Uninstall,
    Generate {
        dir: PathBuf,
        cert_file: String,
        key_file: String,
        domains: Vec<String>,
    },
    OpensslVersion,
    X509 {
        input: PathBuf,
        flags: Vec<&'static str>,
    },
    Pkcs12 {
        out: PathBuf,
        key: PathBuf,
        cert: PathBuf,
        ca: Option<PathBuf>,
        /// File holding the export password; the password never enters argv.
        password_file: PathBuf,
        legacy: bool,
    },
}

impl CertCommand {
    pub fn tool(&self) -> Tool {
        match self {
            CertCommand::CaRoot
            | CertCommand::Install
            | CertCommand::Uninstall
            | CertCommand::Generate { .. } => Tool::Mkcert,
            CertCommand::OpensslVersion | CertCommand::X509 { .. } | CertCommand::Pkcs12 { .. } => {
                Tool::Openssl
            }
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            CertCommand::CaRoot => vec!["-CAROOT".into()],
            CertCommand::Install => vec!["-install".into()],
            CertCommand::Uninstall => vec!["-uninstall".into()],
            CertCommand::Generate {
                cert_file,
                key_file,
                domains,
                ..
            } => {
                let mut args = vec![
                    "-cert-file".to_string(),
                    cert_file.clone(),
                    "-key-file".to_string(),
                    key_file.clone(),
                ];
                args.extend(domains.iter().cloned());
                args
            }
            CertCommand::OpensslVersion => vec!["version".into()],
            CertCommand::X509 { input, flags } => {
                let mut args = vec![
                    "x509".to_string(),
                    "-in".to_string(),
                    path_arg(input),
                    "-noout".to_string(),
                ];
                args.extend(flags.iter().map(|f| f.to_string()));
                args
            }
            CertCommand::Pkcs12 {
                out,
                key,
                cert,
                ca,
                password_file,
                legacy,
            } => {
                let mut args = vec![
                    "pkcs12".to_string(),
                    "-export".to_string(),
                    "-out".to_string(),
                    path_arg(out),
                    "-inkey".to_string(),
                    path_arg(key),
                    "-in".to_string(),
                    path_arg(cert),
                ];
                if let Some(ca) = ca {
                    args.push("-certfile".into());
                    args.push(path_arg(ca));
                }
                args.push("-passout".into());
                args.push(format!("file:{}", path_arg(password_file)));
                if *legacy {
                    args.push("-legacy".into());
                }
                args
            }
        }
    }

    pub fn working_dir(&self) -> Option<&Path> {
        match self {
            CertCommand::Generate { dir, .. } => Some(dir),
            _ => None,
        }
    }

    /// Shell-shaped rendering used for allowlist checks and audit logs.
    pub fn render(&self) -> String {
        match self {
            CertCommand::Generate {
                dir,
                cert_file,
                key_file,
                domains,
            } => format!(
                r#"cd "{}" && mkcert -cert-file "{}" -key-file "{}" {}"#,
                dir.display(),
                cert_file,
                key_file,
                domains.join(" ")
            ),
            CertCommand::X509 { input, flags } => format!(
                r#"openssl x509 -in "{}" -noout {}"#,
                input.display(),
                flags.join(" ")
            ),
            CertCommand::Pkcs12 {
                out,
                key,
                cert,
                ca,
                password_file,
                legacy,
            } => {
                let mut rendered = format!(
                    r#"openssl pkcs12 -export -out "{}" -inkey "{}" -in "{}" "#,
                    out.display(),
                    key.display(),
                    cert.display()
                );
                if let Some(ca) = ca {
                    rendered.push_str(&format!(r#"-certfile "{}" "#, ca.display()));
                }
                rendered.push_str(&format!(r#"-passout file:"{}""#, password_file.display()));
                if *legacy {
                    rendered.push_str(" -legacy");
                }
                rendered
            }
            other => format!("{} {}", other.tool(), other.args().join(" ")),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
