//! Evidence crops written for each violation frame.
//!
//! Files land flat in the detection directory as
//! `{video_id}_frame{N}_motorcycle.jpg` and `{video_id}_frame{N}_plate.jpg`,
//! where `N` is the zero-based decode index. Crops come from the clean frame,
//! never from the annotated copy.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::detect::BoundingBox;
use crate::frame::Frame;

const CROP_QUALITY: u8 = 95;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropKind {
    Vehicle,
    Plate,
}

impl CropKind {
    fn suffix(self) -> &'static str {
        match self {
            CropKind::Vehicle => "motorcycle",
            CropKind::Plate => "plate",
        }
    }
}

/// File names of one violation's crops, relative to the detection directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CropFiles {
    pub vehicle: String,
    pub plate: String,
}

/// Identifier shared by a violation's crops and its report.
pub fn detection_id(video_id: &str, frame_number: u64) -> String {
    format!("{}_frame{}", video_id, frame_number)
}

pub fn crop_file_name(video_id: &str, frame_number: u64, kind: CropKind) -> String {
    format!("{}_{}.jpg", detection_id(video_id, frame_number), kind.suffix())
}

/// Map a requested name onto a session id.
///
/// Crop and report identifiers (`{id}_frame{N}[_suffix][.jpg]`) resolve to the
/// session they came from; anything else is taken as the id itself.
pub fn resolve_video_id(name: &str) -> &str {
    let stem = name.strip_suffix(".jpg").unwrap_or(name);
    if let Some(pos) = stem.rfind("_frame") {
        let tail = &stem[pos + "_frame".len()..];
        let digits = tail.split('_').next().unwrap_or_default();
        if pos > 0 && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return &stem[..pos];
        }
    }
    name
}

/// Writes violation crops into one flat directory.
#[derive(Clone, Debug)]
pub struct CropStore {
    dir: PathBuf,
    quality: u8,
}

impl CropStore {
    /// Create the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create detection directory {}", dir.display()))?;
        Ok(Self {
            dir,
            quality: CROP_QUALITY,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Crop the vehicle and plate regions out of `frame` and write both files.
    ///
    /// Both regions are cropped before anything is written, so an empty region
    /// leaves no partial pair behind.
    pub fn save_violation(
        &self,
        video_id: &str,
        frame: &Frame,
        vehicle: &BoundingBox,
        plate: &BoundingBox,
    ) -> Result<CropFiles> {
        let vehicle_crop = frame.crop(vehicle).context("crop vehicle region")?;
        let plate_crop = frame.crop(plate).context("crop plate region")?;

        let files = CropFiles {
            vehicle: crop_file_name(video_id, frame.index, CropKind::Vehicle),
            plate: crop_file_name(video_id, frame.index, CropKind::Plate),
        };
        self.write_jpeg(&files.vehicle, &vehicle_crop)?;
        self.write_jpeg(&files.plate, &plate_crop)?;
        log::debug!(
            "saved crops {} and {} to {}",
            files.vehicle,
            files.plate,
            self.dir.display()
        );
        Ok(files)
    }

    fn write_jpeg(&self, file_name: &str, image: &RgbImage) -> Result<()> {
        let path = self.path_of(file_name);
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(image)
            .map_err(|e| anyhow!("encode {}: {}", path.display(), e))?;
        writer
            .flush()
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_frame_numbering() {
        assert_eq!(detection_id("clip", 42), "clip_frame42");
        assert_eq!(
            crop_file_name("clip", 42, CropKind::Vehicle),
            "clip_frame42_motorcycle.jpg"
        );
        assert_eq!(crop_file_name("clip", 0, CropKind::Plate), "clip_frame0_plate.jpg");
    }

    #[test]
    fn resolves_detection_names_to_session_ids() {
        assert_eq!(resolve_video_id("clip"), "clip");
        assert_eq!(resolve_video_id("clip_frame42"), "clip");
        assert_eq!(resolve_video_id("clip_frame42_plate.jpg"), "clip");
        assert_eq!(resolve_video_id("my_frame_clip"), "my_frame_clip");
        assert_eq!(resolve_video_id("_frame3"), "_frame3");
    }

    #[test]
    fn writes_both_crops() {
        let dir = tempfile::tempdir().unwrap();
        let store = CropStore::open(dir.path().join("detections")).unwrap();
        let frame = Frame::new(7, RgbImage::new(64, 48));
        let files = store
            .save_violation(
                "ride",
                &frame,
                &BoundingBox::new(0, 0, 40, 40),
                &BoundingBox::new(10, 30, 30, 40),
            )
            .unwrap();
        assert_eq!(files.vehicle, "ride_frame7_motorcycle.jpg");
        let plate = image::open(store.path_of(&files.plate)).unwrap();
        assert_eq!((plate.width(), plate.height()), (20, 10));
    }

    #[test]
    fn empty_region_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CropStore::open(dir.path()).unwrap();
        let frame = Frame::new(1, RgbImage::new(32, 32));
        let err = store.save_violation(
            "ride",
            &frame,
            &BoundingBox::new(0, 0, 16, 16),
            &BoundingBox::new(100, 100, 120, 120),
        );
        assert!(err.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
