//! 按优先级排列的帧视图识别策略.
//!
//! 每个策略都是纯函数 `fn(&RawFrame) -> Option<(View, Confidence)>`,
//! 返回 `None` 表示该策略对此帧无结论, 交由下一个策略处理.

use super::{Confidence, View};
use crate::consts::MAX_PARTIAL_LABEL_LEN;
use crate::RawFrame;

/// 单帧视图识别策略.
pub type Strategy = fn(&RawFrame) -> Option<(View, Confidence)>;

/// 默认策略序列. 排在前面的策略优先.
pub const DEFAULT_STRATEGIES: [Strategy; 3] = [keyword, short_code, partial];

/// 将标签规范化为大写并去掉首尾空白.
#[inline]
fn normalized(frame: &RawFrame) -> Option<String> {
    let label = frame.label.as_deref()?.trim();
    (!label.is_empty()).then(|| label.to_ascii_uppercase())
}

/// 恰好命中其中一个视图时返回该视图; 两者都命中或都不命中返回 `None`.
#[inline]
fn exclusive(ant: bool, post: bool) -> Option<View> {
    match (ant, post) {
        (true, false) => Some(View::Anterior),
        (false, true) => Some(View::Posterior),
        _ => None,
    }
}

/// 标签中含有完整的解剖学关键字 `ANTERIOR` / `POSTERIOR`. 高置信度.
pub fn keyword(frame: &RawFrame) -> Option<(View, Confidence)> {
    let label = normalized(frame)?;
    let view = exclusive(label.contains("ANTERIOR"), label.contains("POSTERIOR"))?;
    Some((view, Confidence::High))
}

/// 标签 (去掉标点后) 恰好是缩写 `ANT` / `POST`. 高置信度.
pub fn short_code(frame: &RawFrame) -> Option<(View, Confidence)> {
    let label = normalized(frame)?;
    let code: String = label.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let view = exclusive(code == "ANT", code == "POST")?;
    Some((view, Confidence::High))
}

/// 短标签中某个字母数字词以 `ANT` / `POS` 开头, 如 `ANT_WB`, `WB-POST`.
/// 长于 [`MAX_PARTIAL_LABEL_LEN`] 的自由文本不参与匹配. 低置信度.
pub fn partial(frame: &RawFrame) -> Option<(View, Confidence)> {
    let label = normalized(frame)?;
    if label.chars().count() > MAX_PARTIAL_LABEL_LEN {
        return None;
    }
    let tokens = label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty());
    let (mut ant, mut post) = (false, false);
    for token in tokens {
        ant |= token.starts_with("ANT");
        post |= token.starts_with("POS");
    }
    let view = exclusive(ant, post)?;
    Some((view, Confidence::Low))
}

/// 依次运行 `strategies`, 返回第一个有结论的结果.
pub fn first_productive(strategies: &[Strategy], frame: &RawFrame) -> Option<(View, Confidence)> {
    strategies.iter().find_map(|s| s(frame))
}
