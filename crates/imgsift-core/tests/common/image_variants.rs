//! Synthetic scenes and controlled variants of them, written to disk.
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use std::path::{Path, PathBuf};

const LEVELS: [u8; 4] = [20, 60, 200, 240];

/// An 8x8 grid of flat cells; cell (cx, cy) has level
/// `LEVELS[(cx * x_step + cy * y_step + offset) % 4]`
#[derive(Debug, Clone, Copy)]
pub struct Scene {
    pub x_step: u32,
    pub y_step: u32,
    pub offset: u32,
}

pub const SCENE_HARBOUR: Scene = Scene {
    x_step: 3,
    y_step: 5,
    offset: 0,
};

pub const SCENE_FOREST: Scene = Scene {
    x_step: 1,
    y_step: 2,
    offset: 1,
};

pub const SCENE_CITY: Scene = Scene {
    x_step: 2,
    y_step: 1,
    offset: 3,
};

/// Render a scene at the given size
pub fn render(scene: &Scene, width: u32, height: u32) -> DynamicImage {
    let img = GrayImage::from_fn(width, height, |x, y| {
        let cx = x * 8 / width;
        let cy = y * 8 / height;
        let index = (cx * scene.x_step + cy * scene.y_step + scene.offset) % 4;
        Luma([LEVELS[index as usize]])
    });
    DynamicImage::ImageLuma8(img)
}

/// Writes variants of one base image into an output directory
pub struct ImageVariant {
    pub base_image: DynamicImage,
    pub output_dir: PathBuf,
}

impl ImageVariant {
    pub fn new<P: AsRef<Path>>(scene: &Scene, size: u32, output_dir: P) -> Self {
        Self {
            base_image: render(scene, size, size),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// The base image, unchanged
    pub fn identical(&self, name: &str) -> PathBuf {
        self.save(&self.base_image, name)
    }

    /// The base image scaled to `width` x `height`
    pub fn resized(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let img = self.base_image.resize_exact(width, height, FilterType::Lanczos3);
        self.save(&img, name)
    }

    /// A byte-for-byte copy of a file written earlier
    pub fn copy_of(&self, source: &Path, name: &str) -> PathBuf {
        let path = self.output_dir.join(name);
        std::fs::copy(source, &path).unwrap();
        path
    }

    fn save(&self, img: &DynamicImage, name: &str) -> PathBuf {
        let path = self.output_dir.join(name);
        img.save(&path).unwrap();
        path
    }
}
