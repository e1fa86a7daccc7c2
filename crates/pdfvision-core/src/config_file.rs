use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub credentials: Option<CredentialsConfig>,
    pub render: Option<RenderConfig>,
    pub output: Option<OutputConfig>,
    pub vision: Option<VisionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub api_key: Option<String>,
    pub credentials_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    pub dpi: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
    pub preview_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionConfig {
    pub endpoint: Option<String>,
}

impl ConfigFile {
    pub fn api_key(&self) -> Option<String> {
        self.credentials.as_ref().and_then(|c| c.api_key.clone())
    }

    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials
            .as_ref()
            .and_then(|c| c.credentials_path.as_ref())
            .map(PathBuf::from)
    }

    pub fn dpi(&self) -> Option<f32> {
        self.render.as_ref().and_then(|r| r.dpi)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output
            .as_ref()
            .and_then(|o| o.path.as_ref())
            .map(PathBuf::from)
    }

    pub fn preview_chars(&self) -> Option<usize> {
        self.output.as_ref().and_then(|o| o.preview_chars)
    }

    pub fn endpoint(&self) -> Option<String> {
        self.vision.as_ref().and_then(|v| v.endpoint.clone())
    }
}

/// Platform config directory path: `<config_dir>/pdfvision/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pdfvision").join("config.toml"))
}

/// Load config by cascading CWD `.pdfvision.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".pdfvision.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        credentials: Some(CredentialsConfig {
            api_key: overlay.api_key().or_else(|| base.api_key()),
            credentials_path: overlay
                .credentials
                .as_ref()
                .and_then(|c| c.credentials_path.clone())
                .or_else(|| {
                    base.credentials
                        .as_ref()
                        .and_then(|c| c.credentials_path.clone())
                }),
        }),
        render: Some(RenderConfig {
            dpi: overlay.dpi().or_else(|| base.dpi()),
        }),
        output: Some(OutputConfig {
            path: overlay
                .output
                .as_ref()
                .and_then(|o| o.path.clone())
                .or_else(|| base.output.as_ref().and_then(|o| o.path.clone())),
            preview_chars: overlay.preview_chars().or_else(|| base.preview_chars()),
        }),
        vision: Some(VisionConfig {
            endpoint: overlay.endpoint().or_else(|| base.endpoint()),
        }),
    }
}
