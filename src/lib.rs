// Library exports for dotrender
//
// DOT text goes in, an image comes out. Layout is done by an external
// GraphViz-compatible executable; this crate manages the files and process.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod temp;
pub mod view;

pub use config::{RenderConfig, ResolvedConfig, Settings};
pub use error::{ConfigError, ErrorKind, LoadError, PipelineError};
pub use pipeline::{Pipeline, RenderedImage};
pub use temp::{cleanup, TempArtifact, TempPrefix};
pub use view::GraphView;
