// Render pipeline: DOT text -> external renderer -> image

use crate::config::RenderConfig;
use crate::error::{LoadError, PipelineError};
use crate::temp::{TempArtifact, TempPrefix};
use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Decoded renderer output, RGBA with 8 bits per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pixels: RgbaImage,
}

impl RenderedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl From<RgbaImage> for RenderedImage {
    fn from(pixels: RgbaImage) -> Self {
        Self { pixels }
    }
}

/// Converts DOT text into images by running an external layout engine.
///
/// Every invocation works on its own uniquely named temporary files, so one
/// `Pipeline` can be shared between threads.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    config: &'a RenderConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'a RenderConfig {
        self.config
    }

    /// Write `source` to `path` followed by a single newline.
    pub fn write_source(&self, source: &str, path: &Path) -> Result<(), PipelineError> {
        debug!("Saving dotty to: {}", path.display());

        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(path)?);
            writer.write_all(source.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()
        };

        write().map_err(|source| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Alias of [`Pipeline::write_source`].
    pub fn save_dotty(&self, source: &str, path: &Path) -> Result<(), PipelineError> {
        self.write_source(source, path)
    }

    /// Argument vector passed to the renderer, executable first.
    pub fn command_line(&self, input: &Path, output: &Path, format: Option<&str>) -> Vec<String> {
        let mut cmd = vec![
            self.config.executable(),
            "-o".to_string(),
            output.display().to_string(),
        ];
        if let Some(format) = format {
            cmd.push("-T".to_string());
            cmd.push(format.to_string());
        }
        cmd.extend(self.config.extra_args());
        cmd.push(input.display().to_string());
        cmd
    }

    /// Run the renderer on `input`, writing to `output`, and wait for it to exit.
    ///
    /// There is no timeout: a renderer that never exits blocks the caller.
    pub fn invoke_renderer(
        &self,
        input: &Path,
        output: &Path,
        format: Option<&str>,
    ) -> Result<(), PipelineError> {
        let cmd = self.command_line(input, output, format);
        let command = cmd.join(" ");
        debug!("Executing: {}", command);

        let status = Command::new(&cmd[0])
            .args(&cmd[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| PipelineError::Spawn {
                executable: cmd[0].clone(),
                command: command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(PipelineError::Render {
                code: status.code(),
                command,
            });
        }

        Ok(())
    }

    /// Alias of [`Pipeline::invoke_renderer`].
    pub fn generate_graph(
        &self,
        dot_path: &Path,
        format: Option<&str>,
        image_path: &Path,
    ) -> Result<(), PipelineError> {
        self.invoke_renderer(dot_path, image_path, format)
    }

    /// Decode the image at `path`.
    pub fn load_image(&self, path: &Path) -> Result<RenderedImage, PipelineError> {
        debug!("Loading graph image: {}", path.display());

        let decode = || -> Result<RgbaImage, LoadError> {
            let metadata = match fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(LoadError::Missing)
                }
                Err(err) => return Err(err.into()),
            };
            if metadata.len() == 0 {
                return Err(LoadError::Empty);
            }

            // Sniff the format; the extension is configurable and may not match
            let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
            Ok(image.to_rgba8())
        };

        let pixels = decode().map_err(|source| PipelineError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded {}x{} image", pixels.width(), pixels.height());

        Ok(RenderedImage { pixels })
    }

    /// Render `source` into an in-memory image, reporting which stage failed.
    pub fn render_image(&self, source: &str) -> Result<RenderedImage, PipelineError> {
        let cleanup = self.config.cleanup_enabled();
        let (prefix, dot_file) = self.create_dot_file(cleanup)?;

        // Both files live until the image below has been decoded
        let image_file = TempArtifact::new(
            prefix.with_extension(&self.config.image_extension()),
            cleanup,
        );

        self.write_source(source, dot_file.path())?;
        self.invoke_renderer(dot_file.path(), image_file.path(), None)?;
        self.load_image(image_file.path())
    }

    /// Render `source` into an in-memory image, or `None` if any stage failed.
    pub fn to_image(&self, source: &str) -> Option<RenderedImage> {
        match self.render_image(source) {
            Ok(image) => Some(image),
            Err(err) => {
                debug!("Rendering failed: {}", err.message());
                None
            }
        }
    }

    /// Render `source` in `format` to `dest`.
    pub fn export(&self, source: &str, format: &str, dest: &Path) -> Result<(), PipelineError> {
        self.render_to_file(source, Some(format), dest)
    }

    /// Render `source` to `dest` in the renderer's default format.
    pub fn save_image(&self, source: &str, dest: &Path) -> Result<(), PipelineError> {
        self.render_to_file(source, None, dest)
    }

    /// Claim a fresh `<prefix>.dot` in the temp directory; the image path shares the prefix.
    fn create_dot_file(&self, cleanup: bool) -> Result<(TempPrefix, TempArtifact), PipelineError> {
        let dir = self.config.temp_dir();
        TempArtifact::create_unique(&dir, "dot", cleanup).map_err(|source| PipelineError::Write {
            path: dir,
            source,
        })
    }

    fn render_to_file(
        &self,
        source: &str,
        format: Option<&str>,
        dest: &Path,
    ) -> Result<(), PipelineError> {
        let (_, dot_file) = self.create_dot_file(self.config.cleanup_enabled())?;

        self.write_source(source, dot_file.path())?;
        self.invoke_renderer(dot_file.path(), dest, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, KEY_ADDITIONAL_OPTIONS, KEY_EXECUTABLE, KEY_TEMP_DIRECTORY};
    use crate::error::ErrorKind;

    #[test]
    fn test_command_line_order() {
        let config = RenderConfig::from_settings(
            Settings::new()
                .with(KEY_EXECUTABLE, "neato")
                .with(KEY_ADDITIONAL_OPTIONS, "-Gdpi=72  -Nshape=box"),
        );
        let pipeline = Pipeline::new(&config);
        let cmd = pipeline.command_line(Path::new("in.dot"), Path::new("out.svg"), Some("svg"));
        assert_eq!(
            cmd,
            vec!["neato", "-o", "out.svg", "-T", "svg", "-Gdpi=72", "-Nshape=box", "in.dot"]
        );
    }

    #[test]
    fn test_command_line_without_format() {
        let config = RenderConfig::defaults();
        let pipeline = Pipeline::new(&config);
        let cmd = pipeline.command_line(Path::new("g.dot"), Path::new("g.png"), None);
        assert_eq!(cmd, vec!["dot", "-o", "g.png", "g.dot"]);
    }

    #[test]
    fn test_write_source_appends_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.dot");
        let config = RenderConfig::defaults();
        Pipeline::new(&config)
            .write_source("digraph G { A -> B; }", &path)
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "digraph G { A -> B; }\n");
    }

    #[test]
    fn test_write_source_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("graph.dot");
        let config = RenderConfig::defaults();
        let err = Pipeline::new(&config).write_source("graph {}", &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(err.to_string().contains("graph.dot"));
    }

    #[test]
    fn test_load_image_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::defaults();
        let pipeline = Pipeline::new(&config);

        let missing = pipeline.load_image(&dir.path().join("none.png")).unwrap_err();
        assert!(matches!(
            missing,
            PipelineError::Load { source: LoadError::Missing, .. }
        ));

        let empty_path = dir.path().join("empty.png");
        fs::write(&empty_path, b"").unwrap();
        let empty = pipeline.load_image(&empty_path).unwrap_err();
        assert!(matches!(empty, PipelineError::Load { source: LoadError::Empty, .. }));

        let junk_path = dir.path().join("junk.png");
        fs::write(&junk_path, b"not an image at all").unwrap();
        let junk = pipeline.load_image(&junk_path).unwrap_err();
        assert!(matches!(junk, PipelineError::Load { source: LoadError::Decode(_), .. }));
    }

    #[test]
    fn test_load_image_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actually-png.gif");
        let img = RgbaImage::from_pixel(3, 7, image::Rgba([0, 0, 0, 255]));
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();

        let config = RenderConfig::defaults();
        let loaded = Pipeline::new(&config).load_image(&path).unwrap();
        assert_eq!(loaded.dimensions(), (3, 7));
    }

    #[test]
    fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::from_settings(
            Settings::new()
                .with(KEY_EXECUTABLE, "dotrender-no-such-renderer")
                .with(KEY_TEMP_DIRECTORY, dir.path().display().to_string()),
        );
        let pipeline = Pipeline::new(&config);

        assert!(pipeline.to_image("digraph G { A -> B; }").is_none());

        let err = pipeline
            .export("digraph G { A -> B; }", "png", &dir.path().join("out.png"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Spawn);
        assert!(err.message().contains("dotrender-no-such-renderer"));

        // both temp files were cleaned up
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
