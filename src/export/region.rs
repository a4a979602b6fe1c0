use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::debug;

use super::RegionExportSink;
use crate::error::ExportError;

/// Saves regions as `<dir>/ant_<marker>_<frame>.png`.
pub struct PngRegionWriter {
    dir: PathBuf,
}

impl PngRegionWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, marker_id: u32, frame_id: u64) -> PathBuf {
        self.dir.join(format!("ant_{}_{}.png", marker_id, frame_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RegionExportSink for PngRegionWriter {
    fn export_region(
        &self,
        marker_id: u32,
        frame_id: u64,
        region: &GrayImage,
    ) -> Result<(), ExportError> {
        let path = self.path_for(marker_id, frame_id);
        region.save(&path)?;
        debug!(marker = marker_id, frame = frame_id, "Saved {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_keyed_by_marker_and_frame() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PngRegionWriter::new(dir.path().join("ants")).unwrap();

        let region = GrayImage::from_pixel(8, 8, image::Luma([200]));
        writer.export_region(17, 3042, &region).unwrap();

        let saved = image::open(dir.path().join("ants/ant_17_3042.png"))
            .unwrap()
            .into_luma8();
        assert_eq!(saved, region);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PngRegionWriter::new(dir.path()).unwrap();
        std::fs::remove_dir(dir.path()).unwrap();

        let region = GrayImage::new(4, 4);
        assert!(writer.export_region(1, 1, &region).is_err());
    }
}
