//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::{
    cropped_file_name, normalize, Affine, BoundingBox, CropError, CroppedVolume, LoadError,
    MriVolume, NiftiHeaderAttr, PaddedVolume, ShapeNormalizer,
};

pub use crate::consts::{DEFAULT_THRESHOLD, INTENSITY_CEILING, TARGET_SHAPE};

pub use crate::dataset::{discover, VolumeLoader};
pub use crate::pipeline::{AssessOptions, AssessReport, Mode};
pub use crate::score::{BatchScorer, QualityModel, RecordLabel, ScoreRecord};
pub use crate::select::SelectionPolicy;
pub use crate::sink::LogSink;
