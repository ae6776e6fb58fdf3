//! 前位 / 后位视图解析.
//!
//! 从多帧原始图像的元信息 (仪器标签) 出发, 为每一帧分配一个视图及其置信度,
//! 并校验最终分配是否恰好包含一个前位和一个后位.

mod strategy;

pub use strategy::{first_productive, keyword, partial, short_code, Strategy, DEFAULT_STRATEGIES};

use crate::error::{BsiError, BsiResult};
use crate::RawFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 采集视角.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// 前位.
    Anterior,

    /// 后位.
    Posterior,
}

impl View {
    /// 两个视图, 按固定顺序.
    pub const BOTH: [View; 2] = [View::Anterior, View::Posterior];

    /// 文件名中使用的短标记 `ant` / `post`.
    #[inline]
    pub const fn short_tag(&self) -> &'static str {
        match self {
            View::Anterior => "ant",
            View::Posterior => "post",
        }
    }

    /// 文件名中使用的长标记 `anterior` / `posterior`.
    #[inline]
    pub const fn long_tag(&self) -> &'static str {
        match self {
            View::Anterior => "anterior",
            View::Posterior => "posterior",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            View::Anterior => "Anterior",
            View::Posterior => "Posterior",
        })
    }
}

/// 视图分配的置信度.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// 没有任何依据.
    None,

    /// 推测 (部分匹配或双帧惯例), 需要人工确认.
    Low,

    /// 有直接证据, 自动预选.
    High,
}

/// 单帧的视图分配.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ViewEntry {
    /// 分配到的视图, `None` 表示未分配.
    pub view: Option<View>,

    /// 置信度.
    pub confidence: Confidence,

    /// 是否已被确认 (高置信度结果自动确认).
    pub confirmed: bool,
}

impl ViewEntry {
    /// 未分配.
    const UNASSIGNED: Self = Self {
        view: None,
        confidence: Confidence::None,
        confirmed: false,
    };

    #[inline]
    fn resolved(view: View, confidence: Confidence) -> Self {
        Self {
            view: Some(view),
            confidence,
            confirmed: confidence == Confidence::High,
        }
    }
}

/// 冻结后的视图 → 帧索引映射.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ViewMap {
    /// 前位帧索引.
    pub anterior: usize,

    /// 后位帧索引.
    pub posterior: usize,
}

impl ViewMap {
    /// 获取视图对应的帧索引.
    #[inline]
    pub fn frame_of(&self, view: View) -> usize {
        match view {
            View::Anterior => self.anterior,
            View::Posterior => self.posterior,
        }
    }
}

/// 帧索引 → 视图分配. 任一视图至多分配给一帧.
///
/// 由 [`ViewResolver::resolve`] 创建, 在人工确认阶段通过 [`Self::confirm`] 和
/// [`Self::reassign`] 修改, 最后由 [`Self::freeze`] 冻结为 [`ViewMap`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ViewAssignment {
    entries: Vec<ViewEntry>,
}

impl ViewAssignment {
    /// 帧数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有任何帧?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 获取第 `index` 帧的分配. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&ViewEntry> {
        self.entries.get(index)
    }

    /// 按帧索引顺序迭代所有分配.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ViewEntry> {
        self.entries.iter()
    }

    /// 被分配到 `view` 的帧索引 (若有).
    #[inline]
    pub fn frame_of(&self, view: View) -> Option<usize> {
        self.entries.iter().position(|e| e.view == Some(view))
    }

    /// 自动预选 (高置信度) 的帧索引.
    pub fn auto_selected(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| (e.confidence == Confidence::High).then_some(i))
            .collect()
    }

    /// 是否已解析完成: 恰好一个前位和一个后位.
    #[inline]
    pub fn is_view_resolved(&self) -> bool {
        validate(self).is_ok()
    }

    /// 人工确认第 `index` 帧当前的分配.
    pub fn confirm(&mut self, index: usize) -> BsiResult<()> {
        let len = self.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(BsiError::FrameOutOfRange { index, len })?;
        entry.confirmed = entry.view.is_some();
        Ok(())
    }

    /// 人工将第 `index` 帧重新分配为 `view` (`None` 表示取消分配).
    ///
    /// 若其它帧已占用 `view`, 则那一帧变为未分配, 以维持每个视图至多一帧.
    /// 人工分配视为已确认的高置信度结果.
    pub fn reassign(&mut self, index: usize, view: Option<View>) -> BsiResult<()> {
        let len = self.len();
        if index >= len {
            return Err(BsiError::FrameOutOfRange { index, len });
        }
        if let Some(v) = view {
            for (i, e) in self.entries.iter_mut().enumerate() {
                if i != index && e.view == Some(v) {
                    *e = ViewEntry::UNASSIGNED;
                }
            }
            self.entries[index] = ViewEntry::resolved(v, Confidence::High);
        } else {
            self.entries[index] = ViewEntry::UNASSIGNED;
        }
        Ok(())
    }

    /// 冻结分配. 要求校验通过, 且所有已分配的帧都经过确认.
    pub fn freeze(&self) -> BsiResult<ViewMap> {
        validate(self)?;
        if let Some(i) = self
            .entries
            .iter()
            .position(|e| e.view.is_some() && !e.confirmed)
        {
            return Err(BsiError::UnconfirmedView(i));
        }
        // 校验已保证两个视图都存在.
        match (self.frame_of(View::Anterior), self.frame_of(View::Posterior)) {
            (Some(anterior), Some(posterior)) => Ok(ViewMap {
                anterior,
                posterior,
            }),
            _ => Err(BsiError::IncompleteViewAssignment(self.describe())),
        }
    }

    /// 简短描述, 用于错误信息.
    fn describe(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.view.map(|v| format!("{i}:{v}")))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

/// 校验分配: 已分配的视图集合必须恰好为 `{Anterior, Posterior}`, 且无重复.
/// 多余的未分配帧允许存在.
pub fn validate(assignment: &ViewAssignment) -> BsiResult<()> {
    let count = |v: View| {
        assignment
            .entries
            .iter()
            .filter(|e| e.view == Some(v))
            .count()
    };
    if count(View::Anterior) == 1 && count(View::Posterior) == 1 {
        Ok(())
    } else {
        Err(BsiError::IncompleteViewAssignment(assignment.describe()))
    }
}

/// 视图解析器. 按优先级依次尝试各策略, 每帧只评估一次.
#[derive(Clone, Debug)]
pub struct ViewResolver {
    strategies: Vec<Strategy>,
}

impl Default for ViewResolver {
    fn default() -> Self {
        Self {
            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }
}

impl ViewResolver {
    /// 使用自定义的策略序列.
    #[inline]
    pub fn with_strategies(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// 解析各帧的视图.
    ///
    /// 1. 依次运行策略, 第一个有结论的策略胜出.
    /// 2. 如果没有任何帧得出结论, 且恰好有两帧, 则按惯例假设第 0 帧为前位,
    ///   第 1 帧为后位, 置信度为低.
    /// 3. 两帧得出相同视图时, 置信度高者保留 (相同时索引小者保留), 另一帧变为未分配.
    pub fn resolve(&self, frames: &[RawFrame]) -> ViewAssignment {
        let found: Vec<Option<(View, Confidence)>> = frames
            .iter()
            .map(|f| first_productive(&self.strategies, f))
            .collect();

        if found.iter().all(Option::is_none) {
            let entries = if frames.len() == 2 {
                log::debug!("no frame label matched, assuming ANT/POST frame order");
                vec![
                    ViewEntry::resolved(View::Anterior, Confidence::Low),
                    ViewEntry::resolved(View::Posterior, Confidence::Low),
                ]
            } else {
                vec![ViewEntry::UNASSIGNED; frames.len()]
            };
            return ViewAssignment { entries };
        }

        let mut entries: Vec<ViewEntry> = found
            .iter()
            .map(|r| match r {
                Some((v, c)) => ViewEntry::resolved(*v, *c),
                None => ViewEntry::UNASSIGNED,
            })
            .collect();

        for view in View::BOTH {
            // 置信度最高者中索引最小的一帧.
            let winner = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.view == Some(view))
                .max_by(|(ia, a), (ib, b)| a.confidence.cmp(&b.confidence).then(ib.cmp(ia)))
                .map(|(i, _)| i);
            let Some(winner) = winner else { continue };
            for (i, e) in entries.iter_mut().enumerate() {
                if i != winner && e.view == Some(view) {
                    log::debug!("frame {i} also resolved to {view}, keeping frame {winner}");
                    *e = ViewEntry::UNASSIGNED;
                }
            }
        }

        ViewAssignment { entries }
    }
}
