// Rendering options resolved from a layered key-value settings source

use crate::error::ConfigError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Settings file looked up when no explicit path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "dotrender.toml";

pub const KEY_EXECUTABLE: &str = "Executable";
pub const KEY_ADDITIONAL_OPTIONS: &str = "AdditionalOptions";
pub const KEY_IMAGE_EXTENSION: &str = "ImageExtension";
pub const KEY_CLEANUP: &str = "CleanUpTempFiles";
pub const KEY_DIALOG_WIDTH: &str = "DialogWidth";
pub const KEY_DIALOG_HEIGHT: &str = "DialogHeight";
pub const KEY_DEBUG: &str = "Debug";
pub const KEY_TEMP_DIRECTORY: &str = "TempDirectory";

const DEFAULT_EXECUTABLE: &str = "dot";
const DEFAULT_IMAGE_EXTENSION: &str = "png";
const DEFAULT_DIALOG_WIDTH: u32 = 800;
const DEFAULT_DIALOG_HEIGHT: u32 = 600;
/// Largest accepted dialog side; the placeholder frame is allocated at this size.
pub const MAX_DIALOG_SIDE: u32 = 8192;

/// Flat string-to-string settings, the raw form every accessor reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for tests and embedding.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse TOML text made of top-level `Key = value` pairs.
    ///
    /// Scalars are flattened to their string form so that `Debug = true` and
    /// `Debug = "true"` mean the same thing. Tables and arrays are skipped.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let table: BTreeMap<String, toml::Value> = toml::from_str(text)?;

        let mut values = BTreeMap::new();
        for (key, value) in table {
            let flat = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    warn!("Ignoring non-scalar setting '{}'", key);
                    continue;
                }
            };
            values.insert(key, flat);
        }

        Ok(Self { values })
    }

    /// Read a settings file from disk.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Rendering configuration.
///
/// The underlying settings are read at most once, on first access, even when
/// several threads ask for them at the same time. Once loaded, reads need no
/// locking. A failed read is logged and treated as an empty settings set, so
/// every accessor always yields a usable value.
#[derive(Debug, Default)]
pub struct RenderConfig {
    source: Option<PathBuf>,
    settings: OnceLock<Settings>,
}

impl RenderConfig {
    /// Configuration backed by a settings file, loaded lazily.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(path.into()),
            settings: OnceLock::new(),
        }
    }

    /// Configuration over settings that are already in memory.
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            source: None,
            settings: OnceLock::from(settings),
        }
    }

    /// Configuration that only ever yields the built-in defaults.
    pub fn defaults() -> Self {
        Self::from_settings(Settings::new())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Load the settings if this has not happened yet and return them.
    pub fn load(&self) -> &Settings {
        self.settings.get_or_init(|| match &self.source {
            Some(path) => match Settings::read(path) {
                Ok(settings) => {
                    debug!("Loaded {} setting(s) from {}", settings.len(), path.display());
                    settings
                }
                Err(err) => {
                    warn!("{}: {}", err, error_cause(&err));
                    Settings::new()
                }
            },
            None => Settings::new(),
        })
    }

    /// Drop the cached settings so the next access reads the source again.
    pub fn reload(&mut self) -> &Settings {
        self.settings = OnceLock::new();
        self.load()
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.load().get(key).unwrap_or(default).to_string()
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.load().get(key) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    fn number<T: FromStr + Copy>(&self, key: &str, default: T) -> T {
        let Some(value) = self.load().get(key) else {
            return default;
        };
        match value.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                let err = ConfigError::InvalidNumber {
                    key: key.to_string(),
                    value: value.to_string(),
                };
                warn!("{}", err);
                default
            }
        }
    }

    /// Renderer executable, `dot` unless configured.
    pub fn executable(&self) -> String {
        self.string(KEY_EXECUTABLE, DEFAULT_EXECUTABLE)
    }

    /// Raw additional renderer options, empty unless configured.
    pub fn additional_options(&self) -> String {
        self.string(KEY_ADDITIONAL_OPTIONS, "")
    }

    /// Additional renderer options split on whitespace.
    pub fn extra_args(&self) -> Vec<String> {
        self.additional_options()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Extension for generated images (without the dot).
    pub fn image_extension(&self) -> String {
        self.string(KEY_IMAGE_EXTENSION, DEFAULT_IMAGE_EXTENSION)
    }

    pub fn cleanup_enabled(&self) -> bool {
        self.flag(KEY_CLEANUP, true)
    }

    fn dialog_side(&self, key: &str, default: u32) -> u32 {
        let side = self.number(key, default);
        if side == 0 || side > MAX_DIALOG_SIDE {
            let err = ConfigError::OutOfRange {
                key: key.to_string(),
                value: side.to_string(),
                max: MAX_DIALOG_SIDE,
            };
            warn!("{}", err);
            return default;
        }
        side
    }

    /// Placeholder width, between 1 and [`MAX_DIALOG_SIDE`].
    pub fn dialog_width(&self) -> u32 {
        self.dialog_side(KEY_DIALOG_WIDTH, DEFAULT_DIALOG_WIDTH)
    }

    /// Placeholder height, between 1 and [`MAX_DIALOG_SIDE`].
    pub fn dialog_height(&self) -> u32 {
        self.dialog_side(KEY_DIALOG_HEIGHT, DEFAULT_DIALOG_HEIGHT)
    }

    pub fn debug(&self) -> bool {
        self.flag(KEY_DEBUG, false)
    }

    /// Directory for temporary DOT and image files.
    pub fn temp_dir(&self) -> PathBuf {
        match self.load().get(KEY_TEMP_DIRECTORY) {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
            _ => std::env::temp_dir(),
        }
    }

    /// Every effective value, for display.
    pub fn snapshot(&self) -> ResolvedConfig {
        ResolvedConfig {
            source: self.source().map(Path::to_path_buf),
            executable: self.executable(),
            extra_args: self.extra_args(),
            image_extension: self.image_extension(),
            cleanup_temp_files: self.cleanup_enabled(),
            dialog_width: self.dialog_width(),
            dialog_height: self.dialog_height(),
            debug: self.debug(),
            temp_dir: self.temp_dir(),
        }
    }
}

fn error_cause(err: &ConfigError) -> String {
    std::error::Error::source(err)
        .map(|cause| cause.to_string())
        .unwrap_or_default()
}

/// Effective configuration values after defaults have been applied.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub source: Option<PathBuf>,
    pub executable: String,
    pub extra_args: Vec<String>,
    pub image_extension: String,
    pub cleanup_temp_files: bool,
    pub dialog_width: u32,
    pub dialog_height: u32,
    pub debug: bool,
    pub temp_dir: PathBuf,
}
