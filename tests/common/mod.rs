#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use famphotos_identity::cluster::GroupingConfig;
use famphotos_identity::db::Stores;
use famphotos_identity::models::BoundingBox;
use famphotos_identity::pipeline::{EmbeddingProvider, FaceCrop};
use famphotos_identity::utils::path::AssetPaths;
use famphotos_identity::{FaceRecord, IdentityService, PhotoRecord};

pub const RED: [u8; 3] = [250, 10, 10];
pub const RED_2: [u8; 3] = [230, 20, 5];
pub const BLUE: [u8; 3] = [10, 10, 250];
pub const BLUE_2: [u8; 3] = [0, 25, 235];
pub const GREEN: [u8; 3] = [10, 250, 10];

/// Embeds a region as its mean colour, scaled to 0..1 per channel.
pub struct ColourEmbedder;

impl EmbeddingProvider for ColourEmbedder {
    fn embed(&self, region: &FaceCrop<'_>) -> anyhow::Result<Option<Vec<f32>>> {
        Ok(Some(mean_colour(region.image)))
    }
}

pub fn mean_colour(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let n = (rgb.width() * rgb.height()).max(1) as f32;
    let mut sum = [0f32; 3];
    for p in rgb.pixels() {
        for (s, v) in sum.iter_mut().zip(p.0) {
            *s += v as f32;
        }
    }
    sum.iter().map(|s| s / n / 255.0).collect()
}

/// A data directory plus photo/crop directories in a temp dir.
pub struct TestEnv {
    pub tmp: TempDir,
    pub data: PathBuf,
    pub paths: AssetPaths,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let paths = AssetPaths::new(tmp.path().join("photos"), tmp.path().join("faces"));
        std::fs::create_dir_all(&paths.photos_dir).unwrap();
        std::fs::create_dir_all(&paths.faces_dir).unwrap();
        Self { tmp, data, paths }
    }

    /// Opens a service over this environment's stores.
    pub fn service(&self) -> IdentityService {
        let stores = Stores::open(&self.data).unwrap();
        let grouping = GroupingConfig::default();
        IdentityService::new(stores, self.paths.clone(), grouping, Box::new(ColourEmbedder))
    }

    /// Writes a photo with one solid-colour face per entry, plus the crops,
    /// and returns the detector's records.
    pub fn photo(&self, file: &str, colours: &[[u8; 3]]) -> (PhotoRecord, Vec<FaceRecord>) {
        let width = 16 * colours.len().max(1) as u32;
        let mut photo = RgbImage::from_pixel(width, 16, Rgb([128, 128, 128]));
        let mut faces = Vec::new();
        for (index, &colour) in colours.iter().enumerate() {
            let left = 16 * index as u32;
            for x in left..left + 16 {
                for y in 0..16 {
                    photo.put_pixel(x, y, Rgb(colour));
                }
            }
            let bbox = BoundingBox { top: 0, right: left + 16, bottom: 16, left };
            let mut face = FaceRecord::new(file, index, bbox, None);
            face.thumbnail = format!("{}.png", face.face_id);
            write_png(&self.paths.faces_dir.join(&face.thumbnail), colour);
            faces.push(face);
        }
        photo.save(self.paths.photos_dir.join(file)).unwrap();
        (PhotoRecord::new(file, None), faces)
    }

    /// Writes several photos and ingests them.
    pub fn ingest(&self, svc: &IdentityService, photos: &[(&str, &[[u8; 3]])]) {
        let mut all_photos = Vec::new();
        let mut all_faces = Vec::new();
        for (file, colours) in photos {
            let (photo, faces) = self.photo(file, colours);
            all_photos.push(photo);
            all_faces.extend(faces);
        }
        svc.ingest(all_faces, all_photos, None).unwrap();
    }

    pub fn crop(&self, face_id: &str) -> PathBuf {
        self.paths.faces_dir.join(format!("{face_id}.png"))
    }
}

pub fn write_png(path: &Path, colour: [u8; 3]) {
    RgbImage::from_pixel(8, 8, Rgb(colour)).save(path).unwrap();
}
