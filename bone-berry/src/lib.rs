#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供核医学全身骨扫描 (前位/后位) 的视图解析、热点提取、
//! 骨扫描指数 (BSI) 定量, 以及按研究推进的幂等处理流程.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 骨骼分割、热点检测与热点分类模型不在本 crate 内实现,
//!   处理流程通过 `pipeline::collab` 中的 trait 调用它们.
//! 2. 算法部分 (`view`, `hotspot`, `bsi`) 是纯计算, 不做任何 I/O.
//!   I/O 只发生在 `pipeline` 和 `dataset` 中.
//!
//! # 开发计划
//!
//! ### 前位/后位视图解析 ✅
//!
//! 按优先级排列的纯函数策略 (完整关键字 → 缩写 → 短标签部分匹配),
//! 双帧惯例兜底, 以及人工确认/改派/冻结.
//!
//! 实现位于 `bone-berry/src/view`.
//!
//! ### 框内热点提取 ✅
//!
//! 无直方图的 Otsu 等价阈值, 正方形结构元膨胀, 单遍 4-邻域投票填洞.
//!
//! 迭代闭运算填洞 ✅
//!
//! 实现位于 `bone-berry/src/hotspot`.
//!
//! ### BSI 定量 ✅
//!
//! 13 个分割区域 (含背景) 的逐区域统计与全身汇总.
//! 汇总同时给出以骨骼区域为分母的分数.
//!
//! 实现位于 `bone-berry/src/bsi.rs`.
//!
//! ### 处理流程 ✅
//!
//! 1. 阶段产物命名, 产物即阶段状态. ✅
//! 2. 可替换的产物存储 (本地文件系统 / 内存), 原子写入. ✅
//! 3. 研究级排他锁. ✅
//! 4. 批处理, 以及借助 `rayon` 的并行批处理. ✅
//! 5. 通过外部程序调用模型. ✅
//!
//! 实现位于 `bone-berry/src/pipeline`.
//!
//! ### 产物失效 ⌛️
//!
//! 前序阶段被重新运行后, 已有的下游产物不会自动失效.

/// 二维索引 `(高, 宽)`.
pub type Idx2d = (usize, usize);

/// 三维索引 `(帧, 高, 宽)`.
pub type Idx3d = (usize, usize, usize);

/// 原始帧与标签栅格的基础数据结构.
mod data;

pub use data::{
    FrameStack, ImgWriteRaw, ImgWriteVis, LabelSlice, LabelSliceMut, OwnedLabelSlice,
    OwnedScanSlice, PosIter, RawFrame, ScanSlice, Study, StudyDate, StudyKey,
};

pub mod bsi;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod hotspot;
pub mod pipeline;
pub mod prelude;
pub mod view;

pub use error::{BsiError, BsiResult};
