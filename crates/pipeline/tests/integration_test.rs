//! Integration tests for the pipeline.
//!
//! These run the real models through the ranker and the evaluator on small
//! hand-built datasets.

use data_loader::{Dataset, Item, Rating};
use models::{
    BaselineConfig, BiasBaseline, ContentIndex, Entities, LatentConfig, LatentTrainer, Mulberry32,
    NoFeatures, ProfileScorer,
};
use pipeline::filters::MinimumScoreFilter;
use pipeline::{split_train_validation, EvalConfig, Evaluator, Recommender, UserContext};

fn small_dataset() -> Dataset {
    Dataset::from_parts(
        vec![],
        vec![
            Item::new(10, "Alpha").with_genres(["Action"]),
            Item::new(20, "Beta").with_genres(["Drama"]),
            Item::new(30, "Gamma").with_genres(["Action"]),
        ],
        vec![
            Rating::new(1, 10, 5.0),
            Rating::new(1, 20, 1.0),
            Rating::new(2, 10, 4.0),
            Rating::new(2, 30, 5.0),
        ],
    )
}

#[test]
fn test_baseline_recommends_only_unseen_item() {
    let dataset = small_dataset();
    let baseline = BiasBaseline::fit(dataset.matrix(), &BaselineConfig::default()).unwrap();
    assert_eq!(baseline.global_mean(), 3.75);

    let ranker = Recommender::new(dataset.catalog());
    let context = UserContext::from_matrix(dataset.matrix(), 1);
    let recs = ranker.recommend(&context, &baseline, 2).unwrap();

    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].item_id, 30);
    assert_eq!(recs[0].score, baseline.predict(1, 30));
}

#[test]
fn test_every_scorer_respects_ranking_contract() {
    let dataset = small_dataset();
    let matrix = dataset.matrix();

    let baseline = BiasBaseline::fit(matrix, &BaselineConfig::default()).unwrap();
    let latent = LatentTrainer::new(LatentConfig::default().with_dim(4).with_epochs(5))
        .fit(matrix, &NoFeatures, &Entities::from_dataset(&dataset))
        .unwrap();
    let content = ProfileScorer::new(ContentIndex::from_dataset(&dataset), matrix, 4.0);

    let ranker = Recommender::new(dataset.catalog());
    for scorer in [&baseline as &dyn models::Scorer, &latent, &content] {
        for user_id in dataset.user_ids() {
            let context = UserContext::from_matrix(matrix, user_id);
            let recs = ranker.recommend(&context, scorer, 2).unwrap();
            assert!(recs.len() <= 2);
            for rec in &recs {
                assert!(!matrix.has_rated(user_id, rec.item_id));
            }
            for pair in recs.windows(2) {
                assert!(
                    pair[0].score > pair[1].score
                        || (pair[0].score == pair[1].score && pair[0].item_id < pair[1].item_id)
                );
            }
        }
    }
}

#[test]
fn test_score_filter_can_empty_the_list() {
    let dataset = small_dataset();
    let baseline = BiasBaseline::fit(dataset.matrix(), &BaselineConfig::default()).unwrap();
    let ranker = Recommender::new(dataset.catalog()).with_score_filter(MinimumScoreFilter::new(10.0));
    let context = UserContext::from_matrix(dataset.matrix(), 1);
    assert!(ranker.recommend(&context, &baseline, 5).unwrap().is_empty());
}

#[test]
fn test_evaluation_metrics_in_unit_range() {
    let items: Vec<Item> = (1..=30).map(|i| Item::new(i, format!("Item {}", i))).collect();
    let ratings: Vec<Rating> = (1..=15)
        .flat_map(|u| {
            (1..=30)
                .filter(move |i| (u + i) % 3 != 0)
                .map(move |i| Rating::new(u, i, ((u * 7 + i * 3) % 5 + 1) as f32))
        })
        .collect();
    let dataset = Dataset::from_parts(vec![], items, ratings);

    let split = split_train_validation(dataset.matrix(), 0.2, &mut Mulberry32::new(11));
    let baseline = BiasBaseline::fit(&split.train, &BaselineConfig::default()).unwrap();
    let ranker = Recommender::new(dataset.catalog());

    let report = Evaluator::new(EvalConfig::default().with_k(5))
        .evaluate(&split, &ranker, &baseline)
        .unwrap();

    for metric in [report.precision, report.recall, report.accuracy] {
        assert!((0.0..=1.0).contains(&metric));
    }
    assert_eq!(report.holdout_size, split.validation.len());
}
