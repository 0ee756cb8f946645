// Error types for the render pipeline and settings loading

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The DOT text could not be persisted
    #[error("Failed to write dotty string to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The renderer executable could not be launched at all
    #[error("Failed to launch renderer '{executable}': {command}")]
    Spawn {
        executable: String,
        command: String,
        #[source]
        source: io::Error,
    },

    /// The renderer ran but reported failure
    #[error("Failed to execute graphviz command ({}): {command}", describe_exit(*code))]
    Render { code: Option<i32>, command: String },

    /// The renderer output could not be turned into an image
    #[error("Failed to load graph image {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Write,
    Spawn,
    Render,
    Load,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Write { .. } => ErrorKind::Write,
            PipelineError::Spawn { .. } => ErrorKind::Spawn,
            PipelineError::Render { .. } => ErrorKind::Render,
            PipelineError::Load { .. } => ErrorKind::Load,
        }
    }

    /// Full message including the underlying cause, suitable for showing to a user.
    pub fn message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push('\n');
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Why a rendered file could not be decoded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("image file does not exist")]
    Missing,

    #[error("image file is empty")]
    Empty,

    #[error("cannot read image file")]
    Io(#[from] io::Error),

    #[error("cannot decode image")]
    Decode(#[from] image::ImageError),
}

/// Problems with the settings resource. These never escape the config accessors;
/// they are logged and the documented defaults are used instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load properties: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse properties: {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse {key}: {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key} out of range (1..={max}): {value}")]
    OutOfRange { key: String, value: String, max: u32 },
}
