//! 分類器と評価パイプラインの統合テスト
//!
//! バックエンドは台本どおりに応答するモックを使う。

use async_trait::async_trait;
use places_eval::categorizer::{
    categorize_all, BackendError, Categorizer, CompletionBackend, LlmCategorizer, ResponseCache,
};
use places_eval::evaluate::tables::{self, read_confusion};
use places_eval::evaluate::{run_evaluation, write_evaluation_outputs, EvaluateOptions, METRICS_FILE};
use places_eval_common::{
    CategoryLabel, ConfusablePair, LabeledPoi, PoiRecord, Taxonomy, TopLevelCategory,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;
use TopLevelCategory::{EatAndDrink as A, Retail as B, Travel as C};

const TAXONOMY_CSV: &str = "Category code; Overture Taxonomy
eat_and_drink; [eat_and_drink]
bakery; [eat_and_drink,bakery]
cafe; [eat_and_drink,cafe]
retail; [retail]
bookstore; [retail,bookstore]
grocery_store; [retail,grocery_store]
travel; [travel]
hotel; [travel,hotel]
";

/// POI名 → 応答の台本
#[derive(Default)]
struct ScriptedBackend {
    first: HashMap<&'static str, String>,
    second: HashMap<&'static str, String>,
    /// 名前ごとの残り一時失敗回数
    failures: Mutex<HashMap<&'static str, usize>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn answer(mut self, name: &'static str, response: impl Into<String>) -> Self {
        self.first.insert(name, response.into());
        self
    }

    fn second_answer(mut self, name: &'static str, response: impl Into<String>) -> Self {
        self.second.insert(name, response.into());
        self
    }

    fn failing(self, name: &'static str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(name, times);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self
            .first
            .keys()
            .chain(self.second.keys())
            .copied()
            .find(|n| prompt.contains(&format!("\"{}\"", n)))
            .ok_or_else(|| BackendError::Fatal("台本にないPOI".into()))?;

        if let Some(left) = self.failures.lock().unwrap().get_mut(name) {
            if *left > 0 {
                *left -= 1;
                return Err(BackendError::Transient("HTTP 503".into()));
            }
        }

        let second_pass = prompt.contains("often confused between");
        let response = (if second_pass { self.second.get(name) } else { None })
            .or_else(|| self.first.get(name))
            .ok_or_else(|| BackendError::Fatal("台本にないPOI".into()))?;
        Ok(response.clone())
    }
}

fn json(category: &str) -> String {
    format!(r#"{{"top_level_category": "{}"}}"#, category)
}

fn labeled(id: &str, name: &str, truth: Option<TopLevelCategory>) -> LabeledPoi {
    LabeledPoi {
        record: PoiRecord::new(id, -122.4, 37.77, name),
        ground_truth: truth.map(CategoryLabel::top_level),
    }
}

fn options(out_dir: &Path) -> EvaluateOptions {
    EvaluateOptions {
        out_dir: out_dir.to_path_buf(),
        n: 0,
        seed: 42,
        pair: None,
        concurrency: 3,
        provider: "mock".into(),
        model: "scripted".into(),
    }
}

fn taxonomy() -> Taxonomy {
    Taxonomy::from_csv_str(TAXONOMY_CSV).unwrap()
}

fn categorizer(backend: ScriptedBackend) -> LlmCategorizer<ScriptedBackend> {
    LlmCategorizer::new(backend)
        .with_taxonomy(taxonomy())
        .with_retry_backoff(Duration::from_millis(1))
}

/// 正解 [A,A,B,C]、予測 [A,B,B,C] → 精度 0.75
#[tokio::test]
async fn test_accuracy_and_confusion() {
    let dir = tempdir().expect("Failed to create temp dir");
    let pois = vec![
        labeled("p1", "Tartine", Some(A)),
        labeled("p2", "Corner Deli", Some(A)),
        labeled("p3", "City Lights", Some(B)),
        labeled("p4", "Hotel Zeppelin", Some(C)),
    ];
    let backend = ScriptedBackend::default()
        .answer("Tartine", json("eat_and_drink"))
        .answer("Corner Deli", json("retail"))
        .answer("City Lights", json("retail"))
        .answer("Hotel Zeppelin", "```json\n{\"category\": \"travel\"}\n```");

    let run = run_evaluation(&categorizer(backend), pois, &taxonomy(), &options(dir.path()))
        .await
        .unwrap();

    assert_eq!(run.report.evaluated(), 4);
    assert!((run.report.accuracy() - 0.75).abs() < 1e-9);
    let confusion = &run.report.confusion;
    assert_eq!(confusion.get(A, A), 1);
    assert_eq!(confusion.get(A, B), 1);
    assert_eq!(confusion.get(B, B), 1);
    assert_eq!(confusion.get(C, C), 1);
    assert_eq!(confusion.total(), run.report.evaluated());
    assert_eq!(confusion.diagonal(), run.report.correct());
}

#[tokio::test]
async fn test_unparseable_and_unlabeled_are_excluded() {
    let dir = tempdir().expect("Failed to create temp dir");
    let pois = vec![
        labeled("p1", "Tartine", Some(A)),
        labeled("p2", "Mystery", Some(B)),
        labeled("p3", "Unknown Code", None),
    ];
    let backend = ScriptedBackend::default()
        .answer("Tartine", json("eat_and_drink"))
        .answer("Mystery", "I am not sure what this place is.")
        .answer("Unknown Code", json("retail"));
    let categorizer = categorizer(backend);

    let run = run_evaluation(&categorizer, pois, &taxonomy(), &options(dir.path()))
        .await
        .unwrap();

    assert_eq!(run.report.evaluated(), 1);
    assert_eq!(run.report.unparseable, 1);
    assert_eq!(run.report.unlabeled, 1);
    assert_eq!(run.report.accuracy(), 1.0);
    assert!((run.report.accuracy_all_rows() - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(run.report.unparseable_ids[0].poi_id, "p2");
    // 正解のないPOIは問い合わせない
    assert_eq!(categorizer.backend().calls(), 2);
}

#[tokio::test]
async fn test_transient_failure_is_retried_once() {
    let backend = ScriptedBackend::default()
        .answer("Tartine", json("eat_and_drink"))
        .answer("Flaky", json("retail"))
        .failing("Tartine", 1)
        .failing("Flaky", 2);
    let categorizer = categorizer(backend);

    let tartine = PoiRecord::new("p1", 0.0, 0.0, "Tartine");
    let flaky = PoiRecord::new("p2", 0.0, 0.0, "Flaky");

    let label = categorizer.categorize(&tartine, None).await.unwrap();
    assert_eq!(label.top_level, A);

    let err = categorizer.categorize(&flaky, None).await.unwrap_err();
    assert_eq!(err.poi_id, "p2");
    // 1回目 + 再試行1回ずつ
    assert_eq!(categorizer.backend().calls(), 4);
}

#[tokio::test]
async fn test_categorize_all_joins_by_id() {
    let backend = ScriptedBackend::default()
        .answer("One", json("travel"))
        .answer("Two", json("retail"))
        .answer("Three", json("eat_and_drink"));
    let categorizer = categorizer(backend);
    let records = [
        PoiRecord::new("a", 0.0, 0.0, "One"),
        PoiRecord::new("b", 0.0, 0.0, "Two"),
        PoiRecord::new("c", 0.0, 0.0, "Three"),
    ];
    let refs: Vec<&PoiRecord> = records.iter().collect();

    let outcomes = categorize_all(&categorizer, &refs, None, 2, None).await;
    let by_id: HashMap<&str, TopLevelCategory> = outcomes
        .iter()
        .map(|o| (o.poi_id.as_str(), o.result.as_ref().unwrap().top_level))
        .collect();
    assert_eq!(by_id.len(), 3);
    assert_eq!(by_id["a"], C);
    assert_eq!(by_id["b"], B);
    assert_eq!(by_id["c"], A);
}

#[tokio::test]
async fn test_subcategory_validated_against_taxonomy() {
    let backend = ScriptedBackend::default()
        .answer("Tartine", r#"{"top_level_category": "eat_and_drink", "subcategory": "bakery"}"#)
        .answer("Nowhere", r#"{"top_level_category": "eat_and_drink", "subcategory": "spaceport"}"#);
    let categorizer = categorizer(backend);

    let known = categorizer
        .categorize(&PoiRecord::new("p1", 0.0, 0.0, "Tartine"), None)
        .await
        .unwrap();
    assert_eq!(known.subcategory.as_deref(), Some("bakery"));

    let unknown = categorizer
        .categorize(&PoiRecord::new("p2", 0.0, 0.0, "Nowhere"), None)
        .await
        .unwrap();
    assert_eq!(unknown.top_level, A);
    assert_eq!(unknown.subcategory, None);
}

#[tokio::test]
async fn test_disambiguation_second_pass() {
    let dir = tempdir().expect("Failed to create temp dir");
    let pois = vec![
        labeled("p1", "Tartine", Some(A)),
        labeled("p2", "Corner Deli", Some(A)),
        labeled("p3", "City Lights", Some(B)),
        labeled("p4", "Hotel Zeppelin", Some(C)),
    ];
    let backend = ScriptedBackend::default()
        .answer("Tartine", json("eat_and_drink"))
        .answer("Corner Deli", json("retail"))
        .second_answer("Corner Deli", json("eat_and_drink"))
        .answer("City Lights", json("retail"))
        .answer("Hotel Zeppelin", json("travel"));

    let mut opts = options(dir.path());
    opts.pair = Some("eat_and_drink,retail".parse::<ConfusablePair>().unwrap());

    let run = run_evaluation(&categorizer(backend), pois, &taxonomy(), &opts)
        .await
        .unwrap();

    let (disambiguation, second) = run.disambiguation.as_ref().unwrap();
    // travel のPOIは対象外
    assert_eq!(disambiguation.subset_size(), 3);
    assert_eq!(second.len(), 3);
    assert!((disambiguation.first_pass_accuracy() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(disambiguation.second_pass_accuracy(), 1.0);

    let summary = run.summary.disambiguation.as_ref().unwrap();
    assert_eq!(summary.subset_size, 3);
    assert_eq!(summary.pair, (A, B));

    let written = write_evaluation_outputs(&run, dir.path()).unwrap();
    let disambiguation_csv = std::fs::read_to_string(dir.path().join(tables::DISAMBIGUATION_FILE)).unwrap();
    assert!(disambiguation_csv.starts_with("id,ground_truth,first_pass,second_pass,first_correct,second_correct\n"));
    assert!(disambiguation_csv.contains("p2,eat_and_drink,retail,eat_and_drink,false,true"));
    assert!(written.iter().any(|p| p.ends_with(tables::DISAMBIGUATION_FILE)));
}

#[tokio::test]
async fn test_write_outputs() {
    let dir = tempdir().expect("Failed to create temp dir");
    let pois = vec![
        labeled("p1", "Tartine", Some(A)),
        labeled("p2", "Corner Deli, SF", Some(A)),
        labeled("p3", "Mystery", Some(B)),
        labeled("p4", "No Label", None),
    ];
    let backend = ScriptedBackend::default()
        .answer("Tartine", json("eat_and_drink"))
        .answer("Corner Deli, SF", json("retail"))
        .answer("Mystery", "no idea");

    let run = run_evaluation(&categorizer(backend), pois, &taxonomy(), &options(dir.path()))
        .await
        .unwrap();
    let written = write_evaluation_outputs(&run, dir.path()).unwrap();
    assert_eq!(written.len(), 5);
    assert!(written.iter().all(|p| p.exists()));

    let predictions = std::fs::read_to_string(dir.path().join(tables::PREDICTIONS_FILE)).unwrap();
    let lines: Vec<&str> = predictions.lines().collect();
    assert_eq!(
        lines[0],
        "id,primary_name,top_level_category,subcategory,predicted_top_level,predicted_subcategory,status"
    );
    assert_eq!(lines[1], "p1,Tartine,eat_and_drink,,eat_and_drink,,ok");
    assert_eq!(lines[2], "p2,\"Corner Deli, SF\",eat_and_drink,,retail,,ok");
    assert_eq!(lines[3], "p3,Mystery,retail,,,,unparseable");
    assert_eq!(lines[4], "p4,No Label,,,,,unlabeled");

    let confusion = read_confusion(&dir.path().join(tables::CONFUSION_FILE)).unwrap();
    assert_eq!(confusion.truth_labels, vec!["eat_and_drink"]);
    assert_eq!(confusion.predicted_labels, vec!["eat_and_drink", "retail"]);
    assert_eq!(confusion.counts, vec![vec![1, 1]]);

    let metrics: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(METRICS_FILE)).unwrap()).unwrap();
    assert_eq!(metrics["evaluated"], 2);
    assert_eq!(metrics["unparseable"], 1);
    assert_eq!(metrics["unlabeled"], 1);
    assert_eq!(metrics["accuracy"], 0.5);
    assert_eq!(metrics["accuracy_all_rows"], 0.25);
    assert_eq!(metrics["model"], "scripted");
    assert_eq!(metrics["per_class"]["eat_and_drink"]["support"], 2);
    assert!(metrics["disambiguation"].is_null());

    let xlsx = std::fs::read(dir.path().join("evaluation.xlsx")).unwrap();
    assert_eq!(&xlsx[..2], b"PK");
}

#[tokio::test]
async fn test_cache_skips_backend() {
    let dir = tempdir().expect("Failed to create temp dir");
    let poi = PoiRecord::new("p1", 0.0, 0.0, "Tartine");

    let warm = LlmCategorizer::new(ScriptedBackend::default().answer("Tartine", json("eat_and_drink")))
        .with_cache(ResponseCache::load(dir.path()));
    warm.categorize(&poi, None).await.unwrap();
    assert_eq!(warm.cache_len(), 1);
    warm.save_cache(dir.path()).unwrap();

    // 台本が空でもキャッシュから応答できる
    let cached = LlmCategorizer::new(ScriptedBackend::default())
        .with_cache(ResponseCache::load(dir.path()));
    let label = cached.categorize(&poi, None).await.unwrap();
    assert_eq!(label.top_level, A);
    assert_eq!(cached.backend().calls(), 0);
}
