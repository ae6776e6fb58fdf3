//! 运行时错误.

use crate::pipeline::Stage;
use crate::{Idx2d, StudyKey};
use thiserror::Error;

/// 骨扫描处理流程的统一错误类型.
#[derive(Error, Debug)]
pub enum BsiError {
    /// 视图解析后缺少前位或后位, 或存在重复视图. 需要人工修正.
    #[error("视图分配不完整: 需要恰好一个 Anterior 和一个 Posterior, 实际为 {0}")]
    IncompleteViewAssignment(String),

    /// 存在未经确认的低置信度视图分配, 不能冻结.
    #[error("帧 {0} 的视图分配尚未确认")]
    UnconfirmedView(usize),

    /// 帧索引越界.
    #[error("帧索引 {index} 越界 (共 {len} 帧)")]
    FrameOutOfRange {
        /// 请求的帧索引.
        index: usize,
        /// 实际帧数.
        len: usize,
    },

    /// 零面积或完全越界的候选框. 提取器内部会跳过此类框, 不会向外传播.
    #[error("退化区域: {0}")]
    DegenerateRegion(String),

    /// 某阶段需要的前序产物不存在.
    #[error("阶段 {stage} 缺少输入产物 `{artifact}`")]
    StageInputMissing {
        /// 需要该产物的阶段.
        stage: Stage,
        /// 缺失的产物文件名.
        artifact: String,
    },

    /// 外部协作者 (分割/检测/分类) 调用失败.
    #[error("阶段 {stage} 的外部协作者失败: {message}")]
    ExternalCollaboratorFailure {
        /// 失败的阶段.
        stage: Stage,
        /// 失败描述.
        message: String,
    },

    /// 该研究正被其它进程处理.
    #[error("研究 {0} 已被锁定")]
    StudyLocked(StudyKey),

    /// 研究标识不合法.
    #[error("研究标识不合法: {0}")]
    InvalidStudy(String),

    /// 配置参数不合法.
    #[error("配置不合法: {0}")]
    InvalidConfig(String),

    /// 检测器给出了无法识别的热点标签.
    #[error("无法识别的热点标签 `{0}`")]
    UnknownHotspotLabel(String),

    /// 分割 `colored` 图像中出现了调色板以外的颜色.
    #[error("位置 {pos:?} 出现未知分割颜色 {rgb:?}")]
    UnknownSegmentColour {
        /// (高, 宽) 位置.
        pos: Idx2d,
        /// RGB 值.
        rgb: [u8; 3],
    },

    /// 栅格中出现了不允许的像素值.
    #[error("位置 {pos:?} 出现非法像素值 {value}")]
    InvalidPixel {
        /// (高, 宽) 位置.
        pos: Idx2d,
        /// 像素值.
        value: u8,
    },

    /// 栅格形状不一致.
    #[error("形状不一致: 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        /// 期望的 (高, 宽).
        expected: Idx2d,
        /// 实际的 (高, 宽).
        actual: Idx2d,
    },

    /// 底层 I/O 错误.
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 图像编解码错误.
    #[error("图像编解码错误: {0}")]
    Image(#[from] image::ImageError),

    /// 读取 npy 错误.
    #[error("读取 npy 错误: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    /// 写入 npy 错误.
    #[error("写入 npy 错误: {0}")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    /// JSON 序列化错误.
    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl BsiError {
    /// 将任意错误包装为 `stage` 阶段的外部协作者错误.
    pub fn collaborator(stage: Stage, err: impl std::fmt::Display) -> Self {
        Self::ExternalCollaboratorFailure {
            stage,
            message: err.to_string(),
        }
    }
}

/// 处理流程运行时结果.
pub type BsiResult<T> = Result<T, BsiError>;
