use crate::error::{TracerError, TracerResult};
use image::ImageEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// A linear HDR frame waiting to be written.
pub struct ScreenshotTask {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

/// Reinhard then gamma 2.2, matching the blit shader.
pub fn tone_map(pixels: &[[f32; 4]]) -> Vec<u8> {
    let mut rgba = vec![0u8; pixels.len() * 4];
    rgba.par_chunks_mut(4)
        .zip(pixels.par_iter())
        .for_each(|(dest, src)| {
            for i in 0..3 {
                let c = src[i].max(0.0);
                let mapped = (c / (c + 1.0)).powf(1.0 / 2.2);
                dest[i] = (mapped * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
            }
            dest[3] = 255;
        });
    rgba
}

/// `output/screenshot_<local time>.png`
pub fn default_path() -> PathBuf {
    let now = chrono::Local::now();
    PathBuf::from(format!(
        "output/screenshot_{}.png",
        now.format("%Y-%m-%d_%H-%M-%S")
    ))
}

pub fn save_image(task: &ScreenshotTask, path: &Path) -> TracerResult<()> {
    let expected = task.width as usize * task.height as usize;
    if task.pixels.len() != expected {
        return Err(TracerError::configuration(format!(
            "screenshot has {} pixels, expected {}x{}",
            task.pixels.len(),
            task.width,
            task.height
        )));
    }

    let saving_start = chrono::Local::now();
    let rgba = tone_map(&task.pixels);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Fast, FilterType::NoFilter);
    encoder.write_image(
        &rgba,
        task.width,
        task.height,
        image::ColorType::Rgba8.into(),
    )?;

    log::info!(
        "Saved screenshot: {} ({}ms)",
        path.display(),
        chrono::Local::now().timestamp_millis() - saving_start.timestamp_millis()
    );
    Ok(())
}
