//! Credential resolution for the Cloud Vision client.
//!
//! Exactly one authentication mode is chosen, in a fixed priority order:
//!
//! 1. an explicit API key,
//! 2. the `GOOGLE_API_KEY` environment variable,
//! 3. a service-account JSON file on disk (default `google-cloud-key.json`),
//! 4. a `GOOGLE_APPLICATION_CREDENTIALS` path picked up ambiently.
//!
//! Resolution is pure so it can be tested without touching the process
//! environment. The one side effect, exporting the credentials file path for
//! mode 3, is split out into the `unsafe` [`CredentialMode::export_env`] so
//! the binary can run it before any other thread exists.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::vision::VisionAuth;

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const DEFAULT_CREDENTIALS_FILE: &str = "google-cloud-key.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "No credentials found. Provide either:\n\
         1. api_key parameter\n\
         2. GOOGLE_API_KEY environment variable\n\
         3. google-cloud-key.json file\n\
         4. GOOGLE_APPLICATION_CREDENTIALS environment variable"
    )]
    NoCredentials,
    #[error("failed to load credentials file {}: {reason}", .path.display())]
    CredentialsFile { path: PathBuf, reason: String },
}

/// Credential-related environment values, captured once.
#[derive(Clone, Default)]
pub struct AmbientCredentials {
    pub api_key: Option<String>,
    pub credentials_path: Option<String>,
}

impl AmbientCredentials {
    /// Read `GOOGLE_API_KEY` and `GOOGLE_APPLICATION_CREDENTIALS`. Empty
    /// values are treated as unset.
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty(std::env::var(API_KEY_ENV).ok()),
            credentials_path: non_empty(std::env::var(CREDENTIALS_ENV).ok()),
        }
    }
}

impl fmt::Debug for AmbientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("credentials_path", &self.credentials_path)
            .finish()
    }
}

/// Everything the resolver looks at.
#[derive(Clone)]
pub struct CredentialInputs {
    pub api_key: Option<String>,
    pub credentials_path: PathBuf,
    pub ambient: AmbientCredentials,
}

impl CredentialInputs {
    /// Inputs with the ambient values taken from the process environment.
    pub fn from_env(api_key: Option<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            api_key,
            credentials_path: credentials_path.into(),
            ambient: AmbientCredentials::from_env(),
        }
    }
}

impl fmt::Debug for CredentialInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialInputs")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("credentials_path", &self.credentials_path)
            .field("ambient", &self.ambient)
            .finish()
    }
}

/// The authentication mode chosen by [`resolve`].
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialMode {
    /// API key passed in by the caller.
    ExplicitKey(String),
    /// API key from `GOOGLE_API_KEY`.
    EnvKey(String),
    /// Service-account file found on disk.
    File(PathBuf),
    /// `GOOGLE_APPLICATION_CREDENTIALS` is set; the client picks it up.
    AmbientEnv(PathBuf),
}

impl CredentialMode {
    /// Short label for logs and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialMode::ExplicitKey(_) => "api key (explicit)",
            CredentialMode::EnvKey(_) => "api key (GOOGLE_API_KEY)",
            CredentialMode::File(_) => "service account file",
            CredentialMode::AmbientEnv(_) => "GOOGLE_APPLICATION_CREDENTIALS",
        }
    }

    /// Turn the chosen mode into client authentication. Does not touch the
    /// process environment.
    pub fn prepare(self) -> VisionAuth {
        match self {
            CredentialMode::ExplicitKey(key) | CredentialMode::EnvKey(key) => {
                VisionAuth::ApiKey(key)
            }
            CredentialMode::File(path) => VisionAuth::CredentialsFile(path),
            CredentialMode::AmbientEnv(_) => VisionAuth::ApplicationDefault,
        }
    }

    /// For [`CredentialMode::File`], set `GOOGLE_APPLICATION_CREDENTIALS` to
    /// the key file for the rest of the process. A no-op for the other modes
    /// and when the variable already holds that path.
    ///
    /// Returns whether the environment was modified.
    ///
    /// # Safety
    ///
    /// Same contract as [`std::env::set_var`]: no other thread may read or
    /// write the process environment while this runs.
    pub unsafe fn export_env(&self) -> bool {
        let CredentialMode::File(path) = self else {
            return false;
        };
        if std::env::var_os(CREDENTIALS_ENV).as_deref() == Some(path.as_os_str()) {
            return false;
        }
        tracing::debug!(path = %path.display(), "exporting {}", CREDENTIALS_ENV);
        // SAFETY: forwarded to the caller.
        unsafe { std::env::set_var(CREDENTIALS_ENV, path) };
        true
    }
}

impl fmt::Debug for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMode::ExplicitKey(_) => f.write_str("ExplicitKey(***)"),
            CredentialMode::EnvKey(_) => f.write_str("EnvKey(***)"),
            CredentialMode::File(path) => f.debug_tuple("File").field(path).finish(),
            CredentialMode::AmbientEnv(path) => f.debug_tuple("AmbientEnv").field(path).finish(),
        }
    }
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type Rule = fn(&CredentialInputs) -> Option<CredentialMode>;

/// Evaluated in order; the first rule that matches decides the mode.
const RULES: [Rule; 4] = [explicit_key, env_key, credentials_file, ambient_env];

/// Pick the authentication mode for the given inputs.
pub fn resolve(inputs: &CredentialInputs) -> Result<CredentialMode, ConfigError> {
    RULES
        .iter()
        .find_map(|rule| rule(inputs))
        .ok_or(ConfigError::NoCredentials)
}

fn explicit_key(inputs: &CredentialInputs) -> Option<CredentialMode> {
    non_empty(inputs.api_key.clone()).map(CredentialMode::ExplicitKey)
}

fn env_key(inputs: &CredentialInputs) -> Option<CredentialMode> {
    non_empty(inputs.ambient.api_key.clone()).map(CredentialMode::EnvKey)
}

fn credentials_file(inputs: &CredentialInputs) -> Option<CredentialMode> {
    let path: &Path = &inputs.credentials_path;
    path.exists().then(|| CredentialMode::File(path.to_path_buf()))
}

fn ambient_env(inputs: &CredentialInputs) -> Option<CredentialMode> {
    non_empty(inputs.ambient.credentials_path.clone())
        .map(|path| CredentialMode::AmbientEnv(PathBuf::from(path)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
