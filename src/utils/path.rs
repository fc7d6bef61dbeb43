use std::path::{Path, PathBuf};

use crate::models::FaceRecord;

/// Filesystem existence checks for the assets backing ledger records.
pub trait AssetLookup {
    fn crop_exists(&self, face: &FaceRecord) -> bool;
    fn photo_exists(&self, file: &str) -> bool;
}

/// Where source photos and face crops live on disk.
#[derive(Clone, Debug)]
pub struct AssetPaths {
    pub photos_dir: PathBuf,
    pub faces_dir: PathBuf,
}

impl AssetPaths {
    pub fn new<P: Into<PathBuf>, F: Into<PathBuf>>(photos_dir: P, faces_dir: F) -> Self {
        Self { photos_dir: photos_dir.into(), faces_dir: faces_dir.into() }
    }

    pub fn crop_path(&self, face: &FaceRecord) -> PathBuf {
        resolve_asset_path(&face.thumbnail, &self.faces_dir)
    }

    pub fn photo_path(&self, file: &str) -> PathBuf {
        resolve_asset_path(file, &self.photos_dir)
    }
}

impl AssetLookup for AssetPaths {
    fn crop_exists(&self, face: &FaceRecord) -> bool {
        !face.thumbnail.is_empty() && self.crop_path(face).is_file()
    }

    fn photo_exists(&self, file: &str) -> bool {
        !file.is_empty() && self.photo_path(file).is_file()
    }
}

/// Resolve an asset reference stored in the ledger. Records normally hold a
/// bare file name relative to `base`; older ingests may hold an absolute path,
/// which is used as is.
pub fn resolve_asset_path(raw: &str, base: &Path) -> PathBuf {
    let raw_path = Path::new(raw);
    if raw_path.is_absolute() {
        return raw_path.to_path_buf();
    }
    base.join(raw_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use tempfile::TempDir;

    #[test]
    fn relative_names_resolve_under_base() {
        let base = Path::new("/srv/faces");
        assert_eq!(
            resolve_asset_path("a_face0.jpg", base),
            PathBuf::from("/srv/faces/a_face0.jpg")
        );
        assert_eq!(resolve_asset_path("/elsewhere/x.jpg", base), PathBuf::from("/elsewhere/x.jpg"));
    }

    #[test]
    fn lookup_checks_the_filesystem() {
        let tmp = TempDir::new().unwrap();
        let paths = AssetPaths::new(tmp.path().join("photos"), tmp.path().join("faces"));
        std::fs::create_dir_all(&paths.faces_dir).unwrap();
        std::fs::create_dir_all(&paths.photos_dir).unwrap();

        let bbox = BoundingBox { top: 0, right: 1, bottom: 1, left: 0 };
        let face = FaceRecord::new("a.jpg", 0, bbox, None);
        assert!(!paths.crop_exists(&face));
        assert!(!paths.photo_exists("a.jpg"));

        std::fs::write(paths.faces_dir.join("a_face0.jpg"), b"x").unwrap();
        std::fs::write(paths.photos_dir.join("a.jpg"), b"x").unwrap();
        assert!(paths.crop_exists(&face));
        assert!(paths.photo_exists("a.jpg"));
        assert!(!paths.photo_exists(""));
    }
}
