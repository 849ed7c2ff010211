use clap::Parser;
use places_eval::categorizer::{self, CliBackend, CompletionBackend, LlmCategorizer, OpenAiBackend, ResponseCache};
use places_eval::error::{ExtractionError, PlacesEvalError};
use places_eval::evaluate::{self, subset, EvaluateOptions};
use places_eval::extractor::{Extraction, SpatialExtractor};
use places_eval::release::{ReleaseLocator, ReleaseRef};
use places_eval::source::{LocalSource, PartSource, S3Source};
use places_eval::{ai_provider::AiProvider, cli, config, error, export};
use places_eval_common::geojson::read_feature_collection;
use places_eval_common::BoundingBox;
use cli::{Cli, Commands};
use config::Config;
use error::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Ingest { release, bbox, outdir, limit, source_dir } => {
            println!("🗺  places-eval - 抽出\n");
            println!("  リリース: {}", release);
            println!("  範囲: {}", bbox);
            println!("  上限: {}\n", if limit == 0 { "なし".to_string() } else { limit.to_string() });

            println!("[1/3] リリースを解決・抽出中...");
            let timeout = Duration::from_secs(config.timeout_seconds);
            let (bucket, region) = (config.s3_bucket.clone(), config.s3_region.clone());
            let version = release.clone();
            let (resolved, extraction) = tokio::task::spawn_blocking(move || match source_dir {
                Some(dir) => run_extraction(&LocalSource::new(dir), &version, &bbox, limit),
                None => {
                    let source = S3Source::new(&bucket, &region, timeout)?;
                    run_extraction(&source, &version, &bbox, limit)
                }
            })
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))??;

            let stats = &extraction.stats;
            println!(
                "✔ {} 件を抽出（パーツ {} / 行グループ {} 読込・{} スキップ）",
                extraction.records.len(),
                extraction.parts_read,
                extraction.row_groups_read,
                extraction.row_groups_skipped
            );
            if stats.non_point + stats.malformed_geometry + stats.null_geometry > 0 {
                println!(
                    "  除外: Point以外 {} / 不正なジオメトリ {} / ジオメトリなし {}",
                    stats.non_point, stats.malformed_geometry, stats.null_geometry
                );
            }
            println!();

            if extraction.records.is_empty() {
                return Err(PlacesEvalError::NoPlacesFound(format!("{} ({})", bbox, resolved.version())));
            }

            println!("[2/3] 成果物を出力中...");
            let report = export::export_artifacts(&extraction.records, &bbox, resolved.version(), &outdir);
            println!();

            println!("[3/3] 結果");
            for failure in &report.failures {
                println!("✖ {}", failure);
            }
            let written = report.into_result()?;
            println!("\n✅ 抽出完了: {} 件の成果物を {} に出力", written.len(), outdir.display());
        }

        Commands::Prepare { places_path, categories, categories_url, n, seed, outdir } => {
            println!("🎯 places-eval - 評価用サブセット作成\n");

            println!("[1/3] POIを読み込み中...");
            if !places_path.exists() {
                return Err(PlacesEvalError::FileNotFound(places_path.display().to_string()));
            }
            let records = read_feature_collection(&places_path)?;
            println!("✔ {} 件\n", records.len());

            println!("[2/3] 分類表を読み込み中...");
            let taxonomy = subset::load_taxonomy(&categories, &categories_url).await?;
            println!("✔ {} カテゴリ\n", taxonomy.len());

            println!("[3/3] サンプリング・出力中...");
            let prepared = subset::prepare_subset(records, &taxonomy, n, seed);
            let written = subset::write_subset_outputs(&prepared, &taxonomy, &outdir)?;
            let m = &prepared.metrics;
            println!(
                "✔ {} / {} 件を抽出（カテゴリあり {}・トップレベル対応 {}）",
                m.sample_size, m.total_pois, m.with_primary_category, m.with_top_level_mapping
            );
            for path in written {
                println!("  {}", path.display());
            }
            println!("\n✅ 準備完了");
        }

        Commands::Evaluate {
            input_csv,
            outdir,
            n,
            seed,
            pair,
            concurrency,
            use_cache,
            context,
            categories,
            model,
        } => {
            let provider = cli.provider.unwrap_or(config.provider);
            println!("📊 places-eval - 分類精度評価\n");

            println!("[1/3] サブセットを読み込み中...");
            let taxonomy = subset::load_taxonomy(&categories, places_eval_common::taxonomy::DEFAULT_CATEGORIES_URL).await?;
            let labeled = subset::read_subset_csv(&input_csv, &taxonomy)?;
            println!("✔ {} 件\n", labeled.len());

            let options = EvaluateOptions {
                out_dir: outdir.clone(),
                n,
                seed,
                pair,
                concurrency: concurrency.unwrap_or(config.concurrency),
                provider: provider.to_string(),
                model: model.clone().unwrap_or_else(|| config.model.clone()),
            };
            let timeout = Duration::from_secs(config.timeout_seconds);
            let setup = CategorizerSetup {
                taxonomy: &taxonomy,
                include_context: context,
                retry_backoff: Duration::from_millis(config.retry_backoff_ms),
                cache_folder: use_cache.then(|| outdir.clone()),
            };

            println!("[2/3] AI分類中 ({})...{}", provider, if use_cache { " (キャッシュ有効)" } else { "" });
            let run = match provider {
                AiProvider::OpenAi => {
                    let backend = OpenAiBackend::new(&config.api_base, config.get_api_key()?, &options.model, timeout)
                        .map_err(|e| PlacesEvalError::ApiCall(e.to_string()))?;
                    evaluate_with(backend, setup, labeled, &options).await?
                }
                other => {
                    let backend = CliBackend::new(other, timeout).map_err(|e| PlacesEvalError::ApiCall(e.to_string()))?;
                    evaluate_with(backend, setup, labeled, &options).await?
                }
            };
            println!();

            println!("[3/3] 結果を保存中...");
            let written = evaluate::write_evaluation_outputs(&run, &outdir)?;
            for path in &written {
                println!("✔ {}", path.display());
            }
            println!("\n✅ 評価完了: 精度 {:.1}%", run.summary.accuracy * 100.0);
        }

        Commands::PlotConfusion { confusion_csv, out } => {
            evaluate::plot_confusion(&confusion_csv, &out)?;
            println!("✔ ヒートマップを出力: {}", out.display());
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定 ({}):", Config::config_path()?.display());
                println!("  プロバイダ: {}", config.provider);
                println!("  モデル: {}", config.model);
                println!("  APIベースURL: {}", config.api_base);
                println!("  同時実行数: {}", config.concurrency);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  再試行待ち: {}ms", config.retry_backoff_ms);
                println!("  S3: {} ({})", config.s3_bucket, config.s3_region);
                println!("  APIキー: {}", if config.api_key.is_some() { "設定済み" } else { "未設定" });
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from("."));
            let cache_path = ResponseCache::path_in(&target);

            if info || !clear {
                if cache_path.exists() {
                    let cache = ResponseCache::load(&target);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    let mut by_model: Vec<_> = cache.count_by_model().into_iter().collect();
                    by_model.sort();
                    for (model, count) in by_model {
                        println!("    {}: {}", model, count);
                    }
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match categorizer::cache::clear_cache(&target) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "places_eval=debug" } else { "places_eval=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// リリース解決から抽出まで（ブロッキング）
fn run_extraction<S: PartSource>(
    source: &S,
    version: &str,
    bbox: &BoundingBox,
    limit: usize,
) -> Result<(ReleaseRef, Extraction)> {
    tracing::info!(source = %source.describe(), version, "リリースを解決");
    let release = ReleaseLocator::new(source).resolve(version)?;
    tracing::info!(
        prefix = release.prefix(),
        parts = release.parts().len(),
        bytes = release.total_bytes(),
        "リリース解決"
    );
    let extraction = SpatialExtractor::new(source).extract_with_stats(&release, bbox, limit)?;
    Ok((release, extraction))
}

struct CategorizerSetup<'a> {
    taxonomy: &'a places_eval_common::Taxonomy,
    include_context: bool,
    retry_backoff: Duration,
    cache_folder: Option<PathBuf>,
}

async fn evaluate_with<B: CompletionBackend>(
    backend: B,
    setup: CategorizerSetup<'_>,
    labeled: Vec<places_eval_common::LabeledPoi>,
    options: &EvaluateOptions,
) -> Result<evaluate::EvaluationRun> {
    let mut categorizer = LlmCategorizer::new(backend)
        .with_taxonomy(setup.taxonomy.clone())
        .with_context(setup.include_context)
        .with_retry_backoff(setup.retry_backoff);
    if let Some(folder) = &setup.cache_folder {
        let cache = ResponseCache::load(folder);
        tracing::info!(entries = cache.len(), "キャッシュを読み込み");
        categorizer = categorizer.with_cache(cache);
    }

    let run = evaluate::run_evaluation(&categorizer, labeled, setup.taxonomy, options).await?;

    if let Some(folder) = &setup.cache_folder {
        save_cache(&categorizer, folder)?;
    }
    Ok(run)
}

fn save_cache<B: CompletionBackend>(categorizer: &LlmCategorizer<B>, folder: &Path) -> Result<()> {
    categorizer.save_cache(folder)?;
    println!("✔ キャッシュを保存: {} 件", categorizer.cache_len());
    Ok(())
}
