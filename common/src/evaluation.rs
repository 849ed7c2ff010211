//! 評価エンジン（CLI/テスト共通、I/Oなし）
//!
//! 予測結果をPOI IDで正解と突き合わせ、精度と混同行列を計算する。
//! 到着順には依存しない。
//!
//! 除外ルール:
//! - 正解がカテゴリ列挙外 → `unlabeled` として計数し除外
//! - 予測が解釈不能 → `unparseable` として計数し除外
//! - 予測が届いていない → `missing` として計数し除外

use crate::error::UnparseableLabelError;
use crate::taxonomy::{CategoryLabel, Taxonomy, TopLevelCategory};
use crate::types::{LabeledPoi, PredictionRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// 評価エンジンのエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("存在しないPOIへの予測: {0}")]
    UnknownPoi(String),

    #[error("POI IDが重複しています: {0}")]
    DuplicatePoi(String),
}

/// 分類器1回分の結果
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub poi_id: String,
    pub result: Result<CategoryLabel, UnparseableLabelError>,
}

impl PredictionOutcome {
    pub fn parsed(poi_id: impl Into<String>, label: CategoryLabel) -> Self {
        Self {
            poi_id: poi_id.into(),
            result: Ok(label),
        }
    }

    pub fn unparseable(poi_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let poi_id = poi_id.into();
        Self {
            result: Err(UnparseableLabelError::new(poi_id.clone(), reason)),
            poi_id,
        }
    }
}

/// 混同行列（正解 × 予測 → 件数）
///
/// 構築後は変更しない。セル合計は評価件数、対角和は正解数に等しい。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    cells: BTreeMap<(TopLevelCategory, TopLevelCategory), usize>,
}

impl ConfusionMatrix {
    pub fn from_records(records: &[PredictionRecord]) -> Self {
        let mut cells = BTreeMap::new();
        for r in records {
            *cells
                .entry((r.ground_truth.top_level, r.predicted.top_level))
                .or_insert(0) += 1;
        }
        Self { cells }
    }

    pub fn get(&self, truth: TopLevelCategory, predicted: TopLevelCategory) -> usize {
        self.cells.get(&(truth, predicted)).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.cells.values().sum()
    }

    pub fn diagonal(&self) -> usize {
        self.cells
            .iter()
            .filter(|((t, p), _)| t == p)
            .map(|(_, n)| n)
            .sum()
    }

    /// 正解側に現れるラベル（ソート済み）
    pub fn truth_labels(&self) -> Vec<TopLevelCategory> {
        let set: BTreeSet<_> = self.cells.keys().map(|(t, _)| *t).collect();
        set.into_iter().collect()
    }

    /// 予測側に現れるラベル（ソート済み）
    pub fn predicted_labels(&self) -> Vec<TopLevelCategory> {
        let set: BTreeSet<_> = self.cells.keys().map(|(_, p)| *p).collect();
        set.into_iter().collect()
    }

    /// 非ゼロのセル
    pub fn cells(&self) -> impl Iterator<Item = (TopLevelCategory, TopLevelCategory, usize)> + '_ {
        self.cells.iter().map(|((t, p), n)| (*t, *p, *n))
    }

    /// 対角以外で件数の多い順（取り違えの多いペアの発見用）
    pub fn top_confusions(&self, limit: usize) -> Vec<(TopLevelCategory, TopLevelCategory, usize)> {
        let mut off: Vec<_> = self.cells().filter(|(t, p, _)| t != p).collect();
        off.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| (a.0, a.1).cmp(&(b.0, b.1))));
        off.truncate(limit);
        off
    }
}

/// クラス別の成績
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassStats {
    pub support: usize,
    pub correct: usize,
}

impl ClassStats {
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.support)
    }
}

/// 評価結果
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// 評価対象（正解あり・予測解釈可）の組。POI入力順。
    pub records: Vec<PredictionRecord>,
    pub confusion: ConfusionMatrix,
    pub unlabeled: usize,
    pub unparseable: usize,
    pub missing: usize,
    /// 解釈不能だったPOIとその理由
    pub unparseable_ids: Vec<UnparseableLabelError>,
    /// POI ID → `records` の位置
    index: HashMap<String, usize>,
}

impl EvaluationReport {
    pub fn evaluated(&self) -> usize {
        self.records.len()
    }

    pub fn correct(&self) -> usize {
        self.records.iter().filter(|r| r.is_correct()).count()
    }

    /// 正解数 / 評価件数（評価件数0なら0.0）
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.evaluated())
    }

    /// 入力全行
    pub fn total_rows(&self) -> usize {
        self.evaluated() + self.unlabeled + self.unparseable + self.missing
    }

    /// 正解数 / 全行（除外した行も不正解として数える参考値）
    pub fn accuracy_all_rows(&self) -> f64 {
        ratio(self.correct(), self.total_rows())
    }

    /// 正解ラベル別の成績
    pub fn per_class(&self) -> BTreeMap<TopLevelCategory, ClassStats> {
        let mut stats: BTreeMap<TopLevelCategory, ClassStats> = BTreeMap::new();
        for r in &self.records {
            let entry = stats.entry(r.ground_truth.top_level).or_default();
            entry.support += 1;
            if r.is_correct() {
                entry.correct += 1;
            }
        }
        stats
    }

    pub fn record(&self, poi_id: &str) -> Option<&PredictionRecord> {
        self.index.get(poi_id).map(|&i| &self.records[i])
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// 予測をPOI IDで正解と結合して評価
pub fn evaluate(
    labeled: &[LabeledPoi],
    outcomes: &[PredictionOutcome],
) -> Result<EvaluationReport, EvaluationError> {
    let mut seen = HashSet::new();
    for poi in labeled {
        if !seen.insert(poi.id()) {
            return Err(EvaluationError::DuplicatePoi(poi.id().to_string()));
        }
    }

    let mut by_id: HashMap<&str, &PredictionOutcome> = HashMap::new();
    for outcome in outcomes {
        if !seen.contains(outcome.poi_id.as_str()) {
            return Err(EvaluationError::UnknownPoi(outcome.poi_id.clone()));
        }
        // 同一IDが複数回届いた場合は後着を採用
        by_id.insert(outcome.poi_id.as_str(), outcome);
    }

    let mut records = Vec::new();
    let mut unlabeled = 0;
    let mut unparseable = 0;
    let mut missing = 0;
    let mut unparseable_ids = Vec::new();

    for poi in labeled {
        let Some(truth) = &poi.ground_truth else {
            unlabeled += 1;
            continue;
        };
        match by_id.get(poi.id()) {
            None => missing += 1,
            Some(outcome) => match &outcome.result {
                Ok(predicted) => records.push(PredictionRecord {
                    poi_id: poi.id().to_string(),
                    predicted: predicted.clone(),
                    ground_truth: truth.clone(),
                }),
                Err(err) => {
                    unparseable += 1;
                    unparseable_ids.push(err.clone());
                }
            },
        }
    }

    let confusion = ConfusionMatrix::from_records(&records);
    let index = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.poi_id.clone(), i))
        .collect();

    Ok(EvaluationReport {
        index,
        records,
        confusion,
        unlabeled,
        unparseable,
        missing,
        unparseable_ids,
    })
}

/// 取り違えやすい2クラス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfusablePair(TopLevelCategory, TopLevelCategory);

impl ConfusablePair {
    pub fn new(a: TopLevelCategory, b: TopLevelCategory) -> Option<Self> {
        if a == b {
            None
        } else {
            Some(Self(a.min(b), a.max(b)))
        }
    }

    pub fn first(&self) -> TopLevelCategory {
        self.0
    }

    pub fn second(&self) -> TopLevelCategory {
        self.1
    }

    pub fn contains(&self, c: TopLevelCategory) -> bool {
        self.0 == c || self.1 == c
    }
}

impl std::str::FromStr for ConfusablePair {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        let (a, b) = s
            .split_once(',')
            .ok_or_else(|| crate::error::Error::Parse(format!("a,b 形式で指定してください: {}", s)))?;
        let a: TopLevelCategory = a.trim().parse()?;
        let b: TopLevelCategory = b.trim().parse()?;
        Self::new(a, b).ok_or_else(|| crate::error::Error::Parse(format!("同一カテゴリは指定できません: {}", s)))
    }
}

/// 再判定時に分類器へ渡すサブカテゴリ列挙
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisambiguationContext {
    subcategories: BTreeMap<TopLevelCategory, Vec<String>>,
}

impl DisambiguationContext {
    pub fn from_taxonomy(pair: &ConfusablePair, taxonomy: &Taxonomy) -> Self {
        let subcategories = [pair.first(), pair.second()]
            .into_iter()
            .map(|top| {
                let subs = taxonomy
                    .subcategories_of(top)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (top, subs)
            })
            .collect();
        Self { subcategories }
    }

    pub fn entries(&self) -> impl Iterator<Item = (TopLevelCategory, &[String])> {
        self.subcategories.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

/// 正解または予測がペアに含まれるPOI（POI入力順）
pub fn select_confusable<'a>(
    labeled: &'a [LabeledPoi],
    report: &EvaluationReport,
    pair: &ConfusablePair,
) -> Vec<&'a LabeledPoi> {
    labeled
        .iter()
        .filter(|poi| {
            report
                .record(poi.id())
                .map(|r| pair.contains(r.ground_truth.top_level) || pair.contains(r.predicted.top_level))
                .unwrap_or(false)
        })
        .collect()
}

/// 再判定の比較結果
#[derive(Debug, Clone)]
pub struct DisambiguationReport {
    pub pair: ConfusablePair,
    /// 対象POIに対する1回目の組
    pub first_pass: Vec<PredictionRecord>,
    /// 再判定の評価（対象POIのみ）
    pub second_pass: EvaluationReport,
}

impl DisambiguationReport {
    pub fn subset_size(&self) -> usize {
        self.first_pass.len()
    }

    pub fn first_pass_accuracy(&self) -> f64 {
        let correct = self.first_pass.iter().filter(|r| r.is_correct()).count();
        ratio(correct, self.first_pass.len())
    }

    pub fn second_pass_accuracy(&self) -> f64 {
        self.second_pass.accuracy()
    }
}

/// 対象サブセットのみで再評価
pub fn evaluate_subset(
    subset: &[&LabeledPoi],
    first: &EvaluationReport,
    pair: ConfusablePair,
    second_outcomes: &[PredictionOutcome],
) -> Result<DisambiguationReport, EvaluationError> {
    let owned: Vec<LabeledPoi> = subset.iter().map(|p| (*p).clone()).collect();
    let second_pass = evaluate(&owned, second_outcomes)?;
    let first_pass = owned
        .iter()
        .filter_map(|p| first.record(p.id()).cloned())
        .collect();
    Ok(DisambiguationReport {
        pair,
        first_pass,
        second_pass,
    })
}
