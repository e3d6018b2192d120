use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::config::{DisplayMode, DisplaySettings};

/// Presents an annotated frame.
///
/// `show` may block (waiting for the operator) and is the suspension point
/// between detect cycles.
pub trait DisplaySurface: Send {
    fn show(&mut self, image: &RgbImage) -> Result<()>;
}

/// Build the surface selected in config.
pub fn display_for(settings: &DisplaySettings) -> Box<dyn DisplaySurface> {
    match settings.mode {
        DisplayMode::Prompt => Box::new(PromptDisplay::stdin(&settings.output_dir)),
        DisplayMode::File => Box::new(FileDisplay::new(&settings.output_dir)),
        DisplayMode::None => Box::new(NullDisplay),
    }
}

/// Shows nothing and never blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDisplay;

impl DisplaySurface for NullDisplay {
    fn show(&mut self, _image: &RgbImage) -> Result<()> {
        Ok(())
    }
}

/// Writes `result_<n>.png` into a directory for every frame.
pub struct FileDisplay {
    output_dir: PathBuf,
    written: u64,
}

impl FileDisplay {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            written: 0,
        }
    }

    /// Path of the most recently written image.
    pub fn last_path(&self) -> Option<PathBuf> {
        self.written
            .checked_sub(1)
            .map(|n| self.output_dir.join(format!("result_{:06}.png", n)))
    }
}

impl DisplaySurface for FileDisplay {
    fn show(&mut self, image: &RgbImage) -> Result<()> {
        let path = self
            .output_dir
            .join(format!("result_{:06}.png", self.written));
        save_png(image, &path)?;
        self.written += 1;
        log::debug!("annotated frame written to {}", path.display());
        Ok(())
    }
}

/// Writes `result.png` and blocks until a line is read from the advance input.
pub struct PromptDisplay {
    output_dir: PathBuf,
    advance: Box<dyn BufRead + Send>,
}

impl PromptDisplay {
    /// Advance on Enter from stdin.
    pub fn stdin(output_dir: &Path) -> Self {
        Self::with_input(output_dir, Box::new(std::io::BufReader::new(std::io::stdin())))
    }

    /// Advance on lines read from `advance`. End of input is an error.
    pub fn with_input(output_dir: &Path, advance: Box<dyn BufRead + Send>) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            advance,
        }
    }
}

impl DisplaySurface for PromptDisplay {
    fn show(&mut self, image: &RgbImage) -> Result<()> {
        let path = self.output_dir.join("result.png");
        save_png(image, &path)?;
        println!("result: {}", path.display());
        println!("PRESS ENTER TO ADVANCE..");
        let mut line = String::new();
        let read = self
            .advance
            .read_line(&mut line)
            .context("failed to read advance input")?;
        if read == 0 {
            return Err(anyhow!("advance input closed; stopping"));
        }
        Ok(())
    }
}

fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_display_writes_numbered_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut display = FileDisplay::new(dir.path());
        assert!(display.last_path().is_none());

        let image = RgbImage::new(4, 4);
        display.show(&image).unwrap();
        display.show(&image).unwrap();

        let last = display.last_path().unwrap();
        assert!(last.ends_with("result_000001.png"));
        assert!(last.exists());
        assert!(dir.path().join("result_000000.png").exists());
    }

    #[test]
    fn prompt_display_consumes_one_line_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let input = std::io::Cursor::new(b"\n\n".to_vec());
        let mut display = PromptDisplay::with_input(dir.path(), Box::new(input));
        display.show(&RgbImage::new(2, 2)).unwrap();
        display.show(&RgbImage::new(2, 2)).unwrap();
        assert!(dir.path().join("result.png").exists());
    }

    #[test]
    fn prompt_display_fails_once_input_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let input = std::io::Cursor::new(b"\n".to_vec());
        let mut display = PromptDisplay::with_input(dir.path(), Box::new(input));
        display.show(&RgbImage::new(2, 2)).unwrap();
        let err = display.show(&RgbImage::new(2, 2)).unwrap_err();
        assert!(err.to_string().contains("advance input closed"));
    }

    #[test]
    fn display_for_none_is_noop() {
        let settings = DisplaySettings {
            mode: DisplayMode::None,
            output_dir: PathBuf::from("/nonexistent/never-written"),
            font: None,
        };
        let mut display = display_for(&settings);
        display.show(&RgbImage::new(1, 1)).unwrap();
    }
}
