#![allow(dead_code)]

pub mod image_variants;
pub use image_variants::*;

use imgsift_core::{Config, ProgressEvent, ProgressSink, Stage};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Config for tests: a small pool and no background cache
pub fn test_config() -> Config {
    Config {
        max_workers: 2,
        use_cache: false,
        ..Config::default()
    }
}

/// A directory holding one near-duplicate set and two unrelated images.
///
/// Returns the paths in file name order:
/// `[a_original, b_copy, c_downscaled, d_forest, e_city]`.
pub fn populate_duplicate_set(dir: &Path) -> Vec<PathBuf> {
    let harbour = ImageVariant::new(&SCENE_HARBOUR, 128, dir);
    let original = harbour.identical("a_original.png");
    let copy = harbour.copy_of(&original, "b_copy.png");
    let downscaled = harbour.resized("c_downscaled.png", 64, 64);

    let forest = ImageVariant::new(&SCENE_FOREST, 64, dir).identical("d_forest.png");
    let city = ImageVariant::new(&SCENE_CITY, 64, dir).identical("e_city.png");

    vec![original, copy, downscaled, forest, city]
}

/// Records every progress event it receives
#[derive(Default)]
pub struct Recorder(pub Mutex<Vec<ProgressEvent>>);

impl Recorder {
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = Vec::new();
        for event in self.0.lock().unwrap().iter() {
            if stages.last() != Some(&event.stage) {
                stages.push(event.stage);
            }
        }
        stages
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressSink for Recorder {
    fn report(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}
