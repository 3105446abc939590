//! 学習済みの線形分類器
//!
//! 外部の学習器が出力した重みを、素性名と対にして保持します。
//! 2クラスの場合は重みの列が1つだけで、そのスコアは先頭のラベルに対するものです。

use rkyv::{Archive, Deserialize, Serialize};

use crate::errors::{Result, WakachiError};
use crate::string::TokenString;

/// 重みを学習した手法
#[derive(Clone, Copy, Debug, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum SolverKind {
    /// L2正則化ロジスティック回帰
    Logistic,

    /// 線形SVM
    Svm,
}

impl SolverKind {
    /// スコアが対数オッズとして解釈できるかどうかを返します。
    pub const fn is_probabilistic(self) -> bool {
        matches!(self, Self::Logistic)
    }

    /// 名前を返します。
    pub const fn name(self) -> &'static str {
        match self {
            Self::Logistic => "logistic",
            Self::Svm => "svm",
        }
    }

    /// 名前から手法を返します。
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "logistic" => Some(Self::Logistic),
            "svm" => Some(Self::Svm),
            _ => None,
        }
    }
}

/// 線形分類器
#[derive(Clone, Debug, PartialEq, Archive, Serialize, Deserialize)]
pub struct LinearModel {
    solver: SolverKind,
    labels: Vec<i32>,

    // Sorted by name.
    names: Vec<TokenString>,
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl LinearModel {
    /// 新しい分類器を作成します。
    ///
    /// # 引数
    ///
    /// * `solver` - 学習手法
    /// * `labels` - クラスラベル
    /// * `features` - 素性名と列ごとの重み
    /// * `biases` - 列ごとのバイアス
    ///
    /// # エラー
    ///
    /// ラベルが空の場合、重みやバイアスの長さが列数と一致しない場合、
    /// 素性名が重複している場合は [`WakachiError`] を返します。
    pub fn new(
        solver: SolverKind,
        labels: Vec<i32>,
        mut features: Vec<(TokenString, Vec<f64>)>,
        biases: Vec<f64>,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(WakachiError::invalid_argument(
                "labels",
                "a linear model needs at least one label",
            ));
        }
        let columns = Self::columns_for(labels.len());
        if biases.len() != columns {
            return Err(WakachiError::invalid_argument(
                "biases",
                format!("expected {} biases, got {}", columns, biases.len()),
            ));
        }
        features.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(w) = features.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(WakachiError::invalid_argument(
                "features",
                format!("duplicate feature name: {}", w[0].0),
            ));
        }
        let mut names = Vec::with_capacity(features.len());
        let mut weights = Vec::with_capacity(features.len() * columns);
        for (name, w) in features {
            if w.len() != columns {
                return Err(WakachiError::invalid_argument(
                    "features",
                    format!("feature {} has {} weights, expected {}", name, w.len(), columns),
                ));
            }
            names.push(name);
            weights.extend(w);
        }
        Ok(Self {
            solver,
            labels,
            names,
            weights,
            biases,
        })
    }

    #[inline(always)]
    const fn columns_for(num_labels: usize) -> usize {
        if num_labels == 2 { 1 } else { num_labels }
    }

    /// 学習手法を返します。
    pub const fn solver(&self) -> SolverKind {
        self.solver
    }

    /// クラスラベルを返します。
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// 重みの列数を返します。
    #[inline(always)]
    pub fn num_columns(&self) -> usize {
        Self::columns_for(self.labels.len())
    }

    /// 素性数を返します。
    pub fn num_features(&self) -> usize {
        self.names.len()
    }

    /// `i` 番目の素性名と重みを返します。
    pub fn feature(&self, i: usize) -> (&TokenString, &[f64]) {
        let k = self.num_columns();
        (&self.names[i], &self.weights[i * k..(i + 1) * k])
    }

    /// 素性名と重みの組を返すイテレータです。
    pub fn features(&self) -> impl Iterator<Item = (&TokenString, &[f64])> {
        self.names
            .iter()
            .zip(self.weights.chunks_exact(self.num_columns()))
    }

    /// 素性名に対応する重みを返します。
    pub fn weights_of(&self, name: &TokenString) -> Option<&[f64]> {
        self.names
            .binary_search(name)
            .ok()
            .map(|i| self.feature(i).1)
    }

    /// 列ごとのバイアスを返します。
    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    /// 重みとバイアスの絶対値の最大値を返します。
    pub fn abs_max(&self) -> f64 {
        self.weights
            .iter()
            .chain(self.biases.iter())
            .fold(0.0f64, |m, w| m.max(w.abs()))
    }

    /// 発火した素性から列ごとのスコアを計算します。
    ///
    /// 未知の素性は無視されます。同じ素性が複数回現れた場合はその回数だけ加算されます。
    pub fn column_scores(&self, features: &[TokenString]) -> Vec<f64> {
        let mut scores = self.biases.clone();
        for name in features {
            if let Some(w) = self.weights_of(name) {
                for (s, w) in scores.iter_mut().zip(w) {
                    *s += w;
                }
            }
        }
        scores
    }

    /// 列ごとのスコアをラベルごとのスコアに展開します。
    pub fn label_scores_from_columns(&self, columns: &[f64]) -> Vec<f64> {
        if self.labels.len() == 2 {
            vec![columns[0], -columns[0]]
        } else {
            columns.to_vec()
        }
    }

    /// 発火した素性からラベルごとのスコアを計算します。
    pub fn label_scores(&self, features: &[TokenString]) -> Vec<f64> {
        self.label_scores_from_columns(&self.column_scores(features))
    }

    /// 2クラスの分類器で、ラベル `1` が正のスコアに対応するように掛ける符号を返します。
    pub fn positive_sign(&self) -> f64 {
        if self.labels.first().is_some_and(|&l| l > 0) {
            1.0
        } else {
            -1.0
        }
    }
}
