use clap::{Parser, Subcommand};
use crate::ai_provider::AiProvider;
use places_eval_common::taxonomy::DEFAULT_CATEGORIES_URL;
use places_eval_common::{BoundingBox, ConfusablePair};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "places-eval")]
#[command(about = "Overture Places 抽出・可視化とLLMカテゴリ分類の精度評価ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 分類に使うAIプロバイダ (openai/claude/codex/gemini)。省略時は設定ファイルの値
    #[arg(long, global = true)]
    pub provider: Option<AiProvider>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// リリースから範囲内のPOIを抽出して GeoJSON / PNG / HTML を出力
    Ingest {
        /// リリース識別子（例: 2026-01-21.0）
        #[arg(long, default_value = crate::release::DEFAULT_RELEASE)]
        release: String,

        /// 範囲 west,south,east,north
        #[arg(long, default_value = "-122.52,37.70,-122.35,37.83", allow_hyphen_values = true)]
        bbox: BoundingBox,

        /// 出力ディレクトリ
        #[arg(short, long, default_value = "out_overture_places")]
        outdir: PathBuf,

        /// 最大件数（0 = 無制限）
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// S3 の代わりに読むローカルミラー（release=... を含むディレクトリ）
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },

    /// 抽出結果から評価用サブセットを作成
    Prepare {
        /// places.geojson のパス
        #[arg(long, default_value = "out_overture_places/places.geojson")]
        places_path: PathBuf,

        /// 分類表CSV（なければダウンロードして保存）
        #[arg(long, default_value = "data/overture_categories.csv")]
        categories: PathBuf,

        /// 分類表のダウンロード元
        #[arg(long, default_value = DEFAULT_CATEGORIES_URL)]
        categories_url: String,

        /// 抽出件数（0 = 全件）
        #[arg(short, long, default_value = "100")]
        n: usize,

        /// 乱数シード
        #[arg(long, default_value = "42")]
        seed: u64,

        /// 出力ディレクトリ
        #[arg(short, long, default_value = "data/eval")]
        outdir: PathBuf,
    },

    /// サブセットをLLMで分類して精度を評価
    Evaluate {
        /// poi_subset.csv のパス
        #[arg(long, default_value = "data/eval/poi_subset.csv")]
        input_csv: PathBuf,

        /// 出力ディレクトリ
        #[arg(short, long, default_value = "data/eval")]
        outdir: PathBuf,

        /// 評価件数（0 = 全件）
        #[arg(short, long, default_value = "0")]
        n: usize,

        /// 乱数シード
        #[arg(long, default_value = "42")]
        seed: u64,

        /// 取り違えペアの再判定（例: eat_and_drink,retail）
        #[arg(long)]
        pair: Option<ConfusablePair>,

        /// 同時呼び出し数（省略時は設定ファイルの値）
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// 応答キャッシュを使用
        #[arg(long)]
        use_cache: bool,

        /// 営業状態・住所・ブランド・別名をプロンプトに含める
        #[arg(long)]
        context: bool,

        /// 分類表CSV（サブカテゴリ検証・再判定用）
        #[arg(long, default_value = "data/overture_categories.csv")]
        categories: PathBuf,

        /// モデル名（省略時は設定ファイルの値）
        #[arg(short, long)]
        model: Option<String>,
    },

    /// confusion.csv をヒートマップPNGに描画
    PlotConfusion {
        /// confusion.csv のパス
        #[arg(long, default_value = "data/eval/confusion.csv")]
        confusion_csv: PathBuf,

        /// 出力PNG
        #[arg(long, default_value = "data/eval/confusion.png")]
        out: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// 応答キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_with_negative_bbox() {
        let cli = Cli::try_parse_from([
            "places-eval",
            "ingest",
            "--bbox",
            "-122.52,37.70,-122.35,37.83",
            "--limit",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Ingest { bbox, limit, .. } => {
                assert_eq!(limit, 3);
                assert_eq!(bbox.west(), -122.52);
            }
            _ => panic!("ingest ではありません"),
        }
    }

    #[test]
    fn test_parse_evaluate_pair() {
        let cli = Cli::try_parse_from([
            "places-eval",
            "--provider",
            "claude",
            "evaluate",
            "--pair",
            "retail,eat_and_drink",
            "--use-cache",
        ])
        .unwrap();
        assert_eq!(cli.provider, Some(AiProvider::Claude));
        match cli.command {
            Commands::Evaluate { pair, use_cache, .. } => {
                assert!(use_cache);
                assert!(pair.is_some());
            }
            _ => panic!("evaluate ではありません"),
        }
    }

    #[test]
    fn test_invalid_bbox_rejected() {
        let result = Cli::try_parse_from(["places-eval", "ingest", "--bbox", "10,0,5,1"]);
        assert!(result.is_err());
    }
}
