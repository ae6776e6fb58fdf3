//! 研究 (一次检查) 与原始帧的元信息.

use crate::error::{BsiError, BsiResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 8 位数字日历日期, 形如 `YYYYMMDD`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudyDate {
    year: u16,
    month: u8,
    day: u8,
}

impl StudyDate {
    /// 构建日期. 不是合法日历日期时返回 `None`.
    pub fn new(year: u16, month: u8, day: u8) -> Option<Self> {
        let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
        let days = match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if leap => 29,
            2 => 28,
            _ => return None,
        };
        (1..=days).contains(&day).then_some(Self { year, month, day })
    }

    /// 年.
    #[inline]
    pub fn year(&self) -> u16 {
        self.year
    }

    /// 月.
    #[inline]
    pub fn month(&self) -> u8 {
        self.month
    }

    /// 日.
    #[inline]
    pub fn day(&self) -> u8 {
        self.day
    }
}

impl FromStr for StudyDate {
    type Err = BsiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BsiError::InvalidStudy(format!("日期 `{s}` 不是 8 位日历日期"));
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = s[..4].parse().map_err(|_| invalid())?;
        let month = s[4..6].parse().map_err(|_| invalid())?;
        let day = s[6..].parse().map_err(|_| invalid())?;
        Self::new(year, month, day).ok_or_else(invalid)
    }
}

impl TryFrom<String> for StudyDate {
    type Error = BsiError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StudyDate> for String {
    #[inline]
    fn from(value: StudyDate) -> Self {
        value.to_string()
    }
}

impl fmt::Display for StudyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

/// 研究的唯一标识 `(patient_id, study_date)`. 所有产物文件名都由它派生.
///
/// 反序列化与 [`StudyKey::new`] 做相同的检查.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStudyKey")]
pub struct StudyKey {
    patient_id: String,
    study_date: StudyDate,
}

#[derive(Deserialize)]
struct RawStudyKey {
    patient_id: String,
    study_date: StudyDate,
}

impl TryFrom<RawStudyKey> for StudyKey {
    type Error = BsiError;

    #[inline]
    fn try_from(raw: RawStudyKey) -> Result<Self, Self::Error> {
        Self::new(raw.patient_id, raw.study_date)
    }
}

impl StudyKey {
    /// 构建标识. `patient_id` 会被用作目录名和文件名前缀,
    /// 因此不能为空, 不能含有路径分隔符、空白或 `..`.
    pub fn new(patient_id: impl Into<String>, study_date: StudyDate) -> BsiResult<Self> {
        let patient_id = patient_id.into();
        if patient_id.is_empty()
            || patient_id.contains("..")
            || patient_id
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
        {
            return Err(BsiError::InvalidStudy(format!(
                "患者 ID `{patient_id}` 不能作为文件名"
            )));
        }
        Ok(Self {
            patient_id,
            study_date,
        })
    }

    /// 患者 ID.
    #[inline]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// 检查日期.
    #[inline]
    pub fn study_date(&self) -> StudyDate {
        self.study_date
    }

    /// 产物文件名前缀 `{patient_id}_{study_date}`.
    #[inline]
    pub fn stem(&self) -> String {
        format!("{}_{}", self.patient_id, self.study_date)
    }
}

impl fmt::Display for StudyKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.patient_id, self.study_date)
    }
}

/// 一次骨扫描检查. 导入后不可变.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Study {
    #[serde(flatten)]
    key: StudyKey,

    /// 机构/租户代码.
    session_code: String,
}

impl Study {
    /// 直接初始化.
    pub fn new(
        patient_id: impl Into<String>,
        study_date: &str,
        session_code: impl Into<String>,
    ) -> BsiResult<Self> {
        let key = StudyKey::new(patient_id, study_date.parse()?)?;
        Ok(Self {
            key,
            session_code: session_code.into(),
        })
    }

    /// 研究标识.
    #[inline]
    pub fn key(&self) -> &StudyKey {
        &self.key
    }

    /// 机构/租户代码.
    #[inline]
    pub fn session_code(&self) -> &str {
        &self.session_code
    }
}

/// 多帧原始图像中的一帧的元信息: 索引及仪器给出的原始标签 (可能缺失).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// 帧索引.
    pub index: usize,

    /// 仪器标签, 如 `"ANT_WB"`.
    pub label: Option<String>,
}

impl RawFrame {
    /// 直接初始化.
    #[inline]
    pub fn new(index: usize, label: Option<&str>) -> Self {
        Self {
            index,
            label: label.map(str::to_owned),
        }
    }

    /// 由标签序列按顺序构建帧序列.
    pub fn from_labels<'a, I: IntoIterator<Item = Option<&'a str>>>(labels: I) -> Vec<Self> {
        labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| Self::new(index, label))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_date_parse() {
        let d: StudyDate = "20240229".parse().unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 2, 29));
        assert_eq!(d.to_string(), "20240229");

        assert!("20230229".parse::<StudyDate>().is_err());
        assert!("2024-1-1".parse::<StudyDate>().is_err());
        assert!("20241301".parse::<StudyDate>().is_err());
        assert!("20240100".parse::<StudyDate>().is_err());
        assert!("2024010".parse::<StudyDate>().is_err());
    }

    #[test]
    fn test_study_key_rejects_paths() {
        let d: StudyDate = "20240101".parse().unwrap();
        assert!(StudyKey::new("P001", d).is_ok());
        assert!(StudyKey::new("", d).is_err());
        assert!(StudyKey::new("../etc", d).is_err());
        assert!(StudyKey::new("a/b", d).is_err());
        assert!(StudyKey::new("a b", d).is_err());
    }

    #[test]
    fn test_study_serde_flatten() {
        let s = Study::new("P001", "20240101", "clinic-a").unwrap();
        assert_eq!(s.key().stem(), "P001_20240101");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["patient_id"], "P001");
        assert_eq!(json["study_date"], "20240101");
        let back: Study = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_deserialize_checks_patient_id() {
        for pid in ["../escaped", "a/b", ""] {
            let json = serde_json::json!({
                "patient_id": pid,
                "study_date": "20240101",
                "session_code": "s",
            });
            assert!(serde_json::from_value::<Study>(json.clone()).is_err(), "{pid}");
            assert!(serde_json::from_value::<StudyKey>(json).is_err(), "{pid}");
        }
    }
}
