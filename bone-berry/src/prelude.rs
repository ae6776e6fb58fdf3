//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::slice::{
    ImgWriteRaw, ImgWriteVis, LabelSlice, LabelSliceMut, OwnedLabelSlice, OwnedScanSlice,
    ScanSlice,
};
pub use crate::data::{FrameStack, RawFrame, Study, StudyDate, StudyKey};

pub use crate::consts::gray::{HOTSPOT_ABNORMAL, HOTSPOT_BACKGROUND, HOTSPOT_NORMAL};
pub use crate::consts::segment::{SEGMENT_LEN, SEGMENT_NAMES};

pub use crate::error::{BsiError, BsiResult};

pub use crate::view::{Confidence, View, ViewAssignment, ViewMap, ViewResolver};

pub use crate::hotspot::{BoundingBox, ExtractorConfig, HoleFill, HotspotClass, HotspotExtractor};

pub use crate::bsi::{aggregate, BsiResults, SegmentStat, Summary};

pub use crate::pipeline::{
    import_study, Classifier, Detector, FsStageStore, MemStageStore, Pipeline, PipelineConfig,
    Segmenter, Stage, StageStore,
};

pub use crate::dataset::{self, study_loader};
