//! 月単位の日付正規化
//!
//! リクエストの日付は "MM/YYYY" 形式（日を含まない）で届く。
//! 範囲の開始は月初日、範囲の終了は月末日に正規化してから比較する。

use crate::shared::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// "MM/YYYY" 形式の正規表現
static MONTH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})/(\d{4})$").expect("月形式の正規表現が不正です"));

/// "MM/YYYY" 形式の文字列を解析し、その月の1日を返す
///
/// # 引数
/// * `value` - 月文字列（例: "03/2023"）
///
/// # 戻り値
/// 月初日、または形式不正の場合は解析エラー
pub fn parse_month(value: &str) -> AppResult<NaiveDate> {
    let trimmed = value.trim();
    let captures = MONTH_PATTERN.captures(trimmed).ok_or_else(|| {
        AppError::parse(format!(
            "日付はMM/YYYY形式で指定してください（受信: '{value}'）"
        ))
    })?;

    let month: u32 = captures[1]
        .parse()
        .map_err(|_| AppError::parse(format!("月は数値で指定してください（受信: '{value}'）")))?;
    let year: i32 = captures[2]
        .parse()
        .map_err(|_| AppError::parse(format!("年は数値で指定してください（受信: '{value}'）")))?;

    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AppError::parse(format!(
            "月は01から12の間で指定してください（受信: '{value}'）"
        ))
    })
}

/// 日付をその月の1日に切り捨てる
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// 日付をその月の末日に正規化する（翌月1日の前日）
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(date)
}

/// 2つの日付の月を含めた月数（両端を月初に切り捨てて数える）
///
/// `end` の月が `start` の月より前の場合は0を返す。
pub fn months_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    let start_index = i64::from(start.year()) * 12 + i64::from(start.month0());
    let end_index = i64::from(end.year()) * 12 + i64::from(end.month0());

    if end_index < start_index {
        0
    } else {
        end_index - start_index + 1
    }
}

/// 集計期間（月単位、正規化済み）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPeriod {
    /// 期間の開始（月初日）
    pub start: NaiveDate,
    /// 期間の終了（月末日）
    pub end: NaiveDate,
}

impl QueryPeriod {
    /// 任意の日付から集計期間を作成する
    ///
    /// 開始は月初、終了は月末に正規化される。開始月が終了月より後の場合は期間指定エラー。
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        let start = month_start(start);
        let end = month_end(end);

        if start > end {
            return Err(AppError::ordering(format!(
                "集計期間の開始（{}）が終了（{}）より後になっています",
                start.format("%m/%Y"),
                end.format("%m/%Y")
            )));
        }

        Ok(Self { start, end })
    }

    /// "MM/YYYY" 形式の開始月・終了月から集計期間を作成する
    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        let start = parse_month(start)?;
        let end = parse_month(end)?;
        Self::new(start, end)
    }

    /// 期間に含まれる月数
    pub fn month_count(&self) -> i64 {
        months_inclusive(self.start, self.end)
    }
}
