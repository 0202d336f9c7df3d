//! End-to-end tests: files on disk -> load -> train -> recommend/evaluate.

use std::ops::ControlFlow;
use std::path::PathBuf;

use data_loader::DataLoadError;
use engine::{EngineConfig, EngineError, ModelKind, RecommendationEngine};

const RATINGS: &str = "1\t10\t5\t881250949\n\
1\t20\t1\t881250950\n\
2\t10\t4\t881250951\n\
2\t30\t5\t881250952\n";

const ITEMS: &str = "10|Alpha (1995)|01-Jan-1995||http://example.com/10|0|1|0\n\
20|Beta (1996)|01-Jan-1996||http://example.com/20|0|0|1\n\
30|Gamma (1997)|01-Jan-1997||http://example.com/30|0|1|0\n";

fn write_dataset(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("engine-e2e-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("u.data"), RATINGS).unwrap();
    std::fs::write(dir.join("u.item"), ITEMS).unwrap();
    dir
}

fn config() -> EngineConfig {
    EngineConfig::default().with_validation_fraction(0.0)
}

#[tokio::test]
async fn test_scenario_recommends_only_unseen_item() {
    let dir = write_dataset("scenario");
    let mut engine = RecommendationEngine::load(dir.clone(), config()).await.unwrap();

    assert_eq!(engine.dataset().matrix().global_mean(), 3.75);
    assert!(!engine.load_report().users_file_present);

    engine.train(|_| ControlFlow::Continue(())).unwrap();

    for kind in ModelKind::ALL {
        let recs = engine.recommend(1, 2, kind).unwrap();
        assert_eq!(recs.len(), 1, "{} should return one item", kind);
        assert_eq!(recs[0].item_id, 30);
        assert_eq!(recs[0].title, "Gamma");
        assert_eq!(recs[0].year, Some(1997));
        assert_eq!(recs[0].score, engine.score(1, 30, kind).unwrap());
    }

    std::fs::remove_dir_all(&dir).unwrap();
}

const TRACKS: &str = "track_id,track_name,artists,track_genre,popularity,acousticness,danceability,energy,instrumentalness,liveness,loudness,speechiness,tempo,valence\n\
10,Run,Ana,pop,70,0.1,0.8,0.9,0.0,0.2,-5.0,0.05,130.0,0.8\n\
20,Sprint,Bo,pop,65,0.15,0.75,0.85,0.0,0.25,-6.0,0.06,125.0,0.75\n\
30,Drift,Cy,ambient,30,0.9,0.2,0.1,0.9,0.1,-20.0,0.03,70.0,0.1\n";

#[tokio::test]
async fn test_tracks_file_drives_content_similarity() {
    let dir = write_dataset("tracks");
    std::fs::write(dir.join("tracks.csv"), TRACKS).unwrap();
    let engine = RecommendationEngine::load(dir.clone(), config()).await.unwrap();

    assert!(engine.load_report().tracks_file_present);
    assert_eq!(engine.dataset().get_item(30).unwrap().artist.as_deref(), Some("Cy"));

    let similar = engine.similar_items(10, 5).unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].item_id, 20);
    assert_eq!(similar[0].title, "Beta");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_missing_files_are_resource_unavailable() {
    let dir = std::env::temp_dir().join("engine-e2e-does-not-exist");
    let result = RecommendationEngine::load(dir, config()).await;
    assert!(matches!(
        result,
        Err(EngineError::Load(DataLoadError::ResourceUnavailable { .. }))
    ));
}

#[tokio::test]
async fn test_interrupted_training_keeps_committed_epochs() {
    let dir = write_dataset("interrupt");
    let mut engine = RecommendationEngine::load(dir.clone(), config().with_epochs(10))
        .await
        .unwrap();

    let summary = engine
        .train(|stats| {
            if stats.epoch == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

    assert_eq!(summary.epochs_completed, 2);
    assert!(engine.is_trained());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_evaluation_with_empty_holdout_is_zero() {
    let dir = write_dataset("eval");
    let mut engine = RecommendationEngine::load(dir.clone(), config()).await.unwrap();
    assert!(matches!(engine.evaluate(ModelKind::Baseline), Err(EngineError::ModelNotReady)));

    engine.train(|_| ControlFlow::Continue(())).unwrap();
    for (_, report) in engine.evaluate_all().unwrap() {
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.holdout_size, 0);
    }
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_retraining_is_deterministic() {
    let dataset = data_loader::Dataset::from_sources(&data_loader::DataSources {
        ratings: RATINGS.to_string(),
        items: ITEMS.to_string(),
        users: None,
        genres: None,
        tracks: None,
    });
    let mut a = RecommendationEngine::from_dataset(dataset.clone(), config());
    let mut b = RecommendationEngine::from_dataset(dataset, config());
    a.train(|_| ControlFlow::Continue(())).unwrap();
    b.train(|_| ControlFlow::Continue(())).unwrap();

    for user in [1, 2] {
        for item in [10, 20, 30] {
            let sa = a.score(user, item, ModelKind::Latent).unwrap();
            let sb = b.score(user, item, ModelKind::Latent).unwrap();
            assert_eq!(sa.to_bits(), sb.to_bits());
        }
    }
}
