use chrono::{Duration, NaiveDate, Utc};
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{RecommendationStore, ResourceStore, UserStore, ViewHistory},
    error::{AppError, AppResult},
    models::{FeedType, Recommendation, RecommendationContext, RecommendationKey, ScoredResource},
    services::{
        cancellation::CancellationToken, filters::FilterChain, ranker::Ranker,
        scoring::CompositeScorer,
    },
};

/// Progress of one generation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Pending,
    CandidatesLoaded,
    Filtered,
    Scored,
    Ranked,
    Persisted,
    Failed,
}

/// Summary of a completed unit
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub key: RecommendationKey,
    /// Last stage reached, always `Persisted` once `generate` returns `Ok`.
    /// Failures surface as the `Err` of `generate` instead.
    pub stage: GenerationStage,
    pub candidates: usize,
    pub filtered: usize,
    pub persisted: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<(RecommendationKey, String)>,
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Days before the target date whose recommendations are not repeated
    pub recent_lookback_days: i64,
    /// Units generated in parallel by a batch
    pub unit_concurrency: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            recent_lookback_days: 7,
            unit_concurrency: 4,
        }
    }
}

/// Storage collaborators the generator reads from and writes to
#[derive(Clone)]
pub struct Stores {
    pub resources: Arc<dyn ResourceStore>,
    pub users: Arc<dyn UserStore>,
    pub views: Arc<dyn ViewHistory>,
    pub recommendations: Arc<dyn RecommendationStore>,
}

impl Stores {
    /// Uses one backend for every collaborator
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ResourceStore + UserStore + ViewHistory + RecommendationStore + 'static,
    {
        Self {
            resources: store.clone(),
            users: store.clone(),
            views: store.clone(),
            recommendations: store,
        }
    }
}

/// Produces and persists the ranked recommendation set for a
/// (user, feed type, date) unit
pub struct RecommendationGenerator {
    stores: Stores,
    filters: FilterChain,
    scorer: CompositeScorer,
    ranker: Ranker,
    settings: GeneratorSettings,
}

impl RecommendationGenerator {
    pub fn new(
        stores: Stores,
        filters: FilterChain,
        scorer: CompositeScorer,
        ranker: Ranker,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            stores,
            filters,
            scorer,
            ranker,
            settings,
        }
    }

    pub async fn generate(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        date: NaiveDate,
        token: &CancellationToken,
    ) -> AppResult<GenerationOutcome> {
        let key = RecommendationKey::new(user_id, feed_type, date);
        let result = self.run(key, token).await;

        if let Err(e) = &result {
            tracing::debug!(
                key = %key,
                stage = ?GenerationStage::Failed,
                error = %e,
                "Generation stage"
            );
        }
        result
    }

    async fn run(
        &self,
        key: RecommendationKey,
        token: &CancellationToken,
    ) -> AppResult<GenerationOutcome> {
        let mut outcome = GenerationOutcome {
            key,
            stage: GenerationStage::Pending,
            candidates: 0,
            filtered: 0,
            persisted: 0,
        };
        tracing::debug!(key = %key, stage = ?outcome.stage, "Generation stage");

        if !self.stores.users.exists(key.user_id).await? {
            return Err(AppError::NotFound(format!("User {} not found", key.user_id)));
        }

        token.check("loading candidates")?;
        let candidates: Vec<ScoredResource> = self
            .stores
            .resources
            .list_eligible(key.feed_type)
            .await?
            .into_iter()
            .map(ScoredResource::unscored)
            .collect();
        outcome.candidates = candidates.len();
        advance(&mut outcome, GenerationStage::CandidatesLoaded, candidates.len());

        token.check("filtering")?;
        let context = self.build_context(&key).await?;
        let candidates = self.filters.apply(candidates, &context).await?;
        outcome.filtered = candidates.len();
        advance(&mut outcome, GenerationStage::Filtered, candidates.len());

        token.check("scoring")?;
        let scored = self.scorer.score_all(candidates, &context).await;
        advance(&mut outcome, GenerationStage::Scored, scored.len());

        token.check("ranking")?;
        let ranked = self.ranker.rank(key.feed_type, scored);
        advance(&mut outcome, GenerationStage::Ranked, ranked.len());

        let generated_at = Utc::now();
        let rows: Vec<Recommendation> = ranked
            .into_iter()
            .map(|ranked| Recommendation::new(&key, ranked.scored, ranked.position, generated_at))
            .collect();
        let count = rows.len();

        token.check("persisting")?;
        self.stores.recommendations.replace_for_key(&key, rows).await?;
        outcome.persisted = count;
        advance(&mut outcome, GenerationStage::Persisted, count);

        Ok(outcome)
    }

    async fn build_context(&self, key: &RecommendationKey) -> AppResult<RecommendationContext> {
        let (seen, recent, signals) = tokio::try_join!(
            self.stores.views.seen_resource_ids(key.user_id),
            self.recently_recommended(key),
            self.stores.users.signals(key.user_id),
        )?;

        let mut context = RecommendationContext::new(key.user_id, key.feed_type, key.date);
        context.seen_resource_ids = seen;
        context.recently_recommended_ids = recent;
        context.signals = signals;
        Ok(context)
    }

    /// Resources recommended in `[date - lookback, date)`
    async fn recently_recommended(&self, key: &RecommendationKey) -> AppResult<HashSet<Uuid>> {
        if self.settings.recent_lookback_days <= 0 {
            return Ok(HashSet::new());
        }

        // Lookbacks past the representable range cover all history
        let from = Duration::try_days(self.settings.recent_lookback_days)
            .and_then(|lookback| key.date.checked_sub_signed(lookback))
            .unwrap_or(NaiveDate::MIN);

        self.stores
            .recommendations
            .resource_ids_between(key.user_id, key.feed_type, from, key.date)
            .await
    }

    /// Every (user, feed type) unit for `date`, over active users
    pub async fn units_for_date(&self, date: NaiveDate) -> AppResult<Vec<RecommendationKey>> {
        let users = self.stores.users.active_user_ids().await?;
        Ok(users
            .into_iter()
            .flat_map(|user_id| {
                FeedType::ALL
                    .into_iter()
                    .map(move |feed_type| RecommendationKey::new(user_id, feed_type, date))
            })
            .collect())
    }

    /// Runs units with bounded parallelism; a failing unit never aborts the rest
    pub async fn generate_batch(
        &self,
        units: Vec<RecommendationKey>,
        token: &CancellationToken,
    ) -> BatchReport {
        let total = units.len();
        let results: Vec<_> = stream::iter(units)
            .map(|key| async move {
                let result = self
                    .generate(key.user_id, key.feed_type, key.date, token)
                    .await;
                (key, result)
            })
            .buffer_unordered(self.settings.unit_concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (key, result) in results {
            match result {
                Ok(_) => report.succeeded += 1,
                Err(AppError::Cancelled(_)) => report.cancelled += 1,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Recommendation generation failed");
                    report.failed += 1;
                    report.failures.push((key, e.to_string()));
                }
            }
        }

        tracing::info!(
            total,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Recommendation batch finished"
        );
        report
    }
}

fn advance(outcome: &mut GenerationOutcome, stage: GenerationStage, count: usize) {
    outcome.stage = stage;
    tracing::debug!(key = %outcome.key, stage = ?stage, count, "Generation stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, MockResourceStore};
    use crate::models::{Resource, Topic, UserSignals, Vote};
    use crate::services::filters::{DownvotedResourceFilter, SeenResourceFilter};
    use crate::services::ranker::RankingLimits;
    use crate::services::scoring::{Scorer, TopicAffinityScorer};
    use crate::test_support::{date, resource};

    fn topic(name: &str) -> Topic {
        Topic {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn tagged(feed_type: FeedType, topics: Vec<Topic>) -> Resource {
        let mut resource = resource(feed_type);
        resource.topics = topics;
        resource
    }

    fn generator(
        stores: Stores,
        max: usize,
        extra: Vec<Arc<dyn Scorer>>,
    ) -> RecommendationGenerator {
        let mut scorers: Vec<Arc<dyn Scorer>> = vec![Arc::new(TopicAffinityScorer::new(1.0))];
        scorers.extend(extra);

        RecommendationGenerator::new(
            stores,
            FilterChain::default()
                .with(Arc::new(SeenResourceFilter))
                .with(Arc::new(DownvotedResourceFilter)),
            CompositeScorer::new(scorers, 4),
            Ranker::new(RankingLimits::new(max)),
            GeneratorSettings::default(),
        )
    }

    /// A user interested in `rust` and three papers matching 1, 1/2 and 0 of their topics
    async fn seeded_store() -> (Arc<MemoryStore>, Uuid, Vec<Resource>) {
        let store = Arc::new(MemoryStore::new());
        let rust = topic("rust");
        let user_id = Uuid::new_v4();
        store
            .add_user(
                user_id,
                UserSignals {
                    interest_topic_ids: HashSet::from([rust.id]),
                    ..Default::default()
                },
            )
            .await;

        let papers = vec![
            tagged(FeedType::Paper, vec![rust.clone()]),
            tagged(FeedType::Paper, vec![rust, topic("go")]),
            tagged(FeedType::Paper, vec![topic("python")]),
        ];
        for paper in &papers {
            store.add_resource(paper.clone()).await;
        }
        (store, user_id, papers)
    }

    fn summary(rows: &[Recommendation]) -> Vec<(Uuid, u32, f64)> {
        rows.iter().map(|r| (r.resource_id, r.position, r.score)).collect()
    }

    #[tokio::test]
    async fn test_generate_persists_ranked_set() {
        let (store, user_id, papers) = seeded_store().await;
        let generator = generator(Stores::shared(store.clone()), 10, vec![]);
        let day = date(2024, 12, 1);

        let outcome = generator
            .generate(user_id, FeedType::Paper, day, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.stage, GenerationStage::Persisted);
        assert_eq!(outcome.persisted, 3);

        let rows = store
            .find_by_key(&RecommendationKey::new(user_id, FeedType::Paper, day))
            .await
            .unwrap();
        assert_eq!(
            summary(&rows),
            vec![(papers[0].id, 0, 1.0), (papers[1].id, 1, 0.5), (papers[2].id, 2, 0.0)]
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (store, user_id, _) = seeded_store().await;
        let generator = generator(Stores::shared(store.clone()), 2, vec![]);
        let token = CancellationToken::new();
        let key = RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1));

        generator.generate(user_id, FeedType::Paper, key.date, &token).await.unwrap();
        let first = store.find_by_key(&key).await.unwrap();
        generator.generate(user_id, FeedType::Paper, key.date, &token).await.unwrap();
        let second = store.find_by_key(&key).await.unwrap();

        assert_eq!(summary(&first), summary(&second));
        assert_eq!(store.all_recommendations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_excludes_recent_and_seen_resources() {
        let (store, user_id, papers) = seeded_store().await;
        let generator = generator(Stores::shared(store.clone()), 1, vec![]);
        let token = CancellationToken::new();

        generator
            .generate(user_id, FeedType::Paper, date(2024, 11, 30), &token)
            .await
            .unwrap();
        store.record_view(user_id, papers[1].id).await;
        generator
            .generate(user_id, FeedType::Paper, date(2024, 12, 1), &token)
            .await
            .unwrap();

        let rows = store
            .find_by_key(&RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1)))
            .await
            .unwrap();
        assert_eq!(summary(&rows), vec![(papers[2].id, 0, 0.0)]);
    }

    #[tokio::test]
    async fn test_downvoted_resources_are_excluded() {
        let (store, user_id, papers) = seeded_store().await;
        store.record_vote(user_id, papers[0].id, Vote::Down).await;
        store.record_vote(user_id, papers[2].id, Vote::Up).await;
        let generator = generator(Stores::shared(store.clone()), 10, vec![]);

        generator
            .generate(user_id, FeedType::Paper, date(2024, 12, 1), &CancellationToken::new())
            .await
            .unwrap();

        let rows = store
            .find_by_key(&RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1)))
            .await
            .unwrap();
        assert_eq!(summary(&rows), vec![(papers[1].id, 0, 0.5), (papers[2].id, 1, 0.0)]);
    }

    #[tokio::test]
    async fn test_unbounded_lookback_covers_all_history() {
        let (store, user_id, papers) = seeded_store().await;
        let mut generator = generator(Stores::shared(store.clone()), 1, vec![]);
        generator.settings.recent_lookback_days = i64::MAX;
        let token = CancellationToken::new();

        generator
            .generate(user_id, FeedType::Paper, date(2020, 1, 1), &token)
            .await
            .unwrap();
        generator
            .generate(user_id, FeedType::Paper, date(2024, 12, 1), &token)
            .await
            .unwrap();

        let rows = store
            .find_by_key(&RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1)))
            .await
            .unwrap();
        assert_eq!(summary(&rows), vec![(papers[1].id, 0, 0.5)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reruns_of_one_key_leave_one_consistent_set() {
        let (store, user_id, _) = seeded_store().await;
        for i in 0..9 {
            store
                .add_resource(tagged(FeedType::Paper, vec![topic(&format!("topic-{}", i))]))
                .await;
        }
        let generator = Arc::new(generator(Stores::shared(store.clone()), 10, vec![]));
        let key = RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let generator = generator.clone();
                tokio::spawn(async move {
                    generator
                        .generate(key.user_id, key.feed_type, key.date, &CancellationToken::new())
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().persisted, 10);
        }

        let rows = store.find_by_key(&key).await.unwrap();
        let positions: HashSet<u32> = rows.iter().map(|r| r.position).collect();
        let resources: HashSet<Uuid> = rows.iter().map(|r| r.resource_id).collect();
        assert_eq!(rows.len(), 10);
        assert_eq!(positions, (0..10).collect::<HashSet<u32>>());
        assert_eq!(resources.len(), 10);
        assert_eq!(store.all_recommendations().await.len(), 10);
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let generator = generator(Stores::shared(store), 10, vec![]);

        let result = generator
            .generate(Uuid::new_v4(), FeedType::Video, date(2024, 12, 1), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancelled_unit_writes_nothing() {
        let (store, user_id, _) = seeded_store().await;
        let generator = generator(Stores::shared(store.clone()), 10, vec![]);
        let token = CancellationToken::new();
        token.cancel();

        let result = generator
            .generate(user_id, FeedType::Paper, date(2024, 12, 1), &token)
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert!(store.all_recommendations().await.is_empty());
    }

    /// Cancels the shared token the first time it scores
    struct CancellingScorer(CancellationToken);

    #[async_trait::async_trait]
    impl Scorer for CancellingScorer {
        fn key(&self) -> &'static str {
            "cancelling"
        }

        fn weight(&self) -> f64 {
            0.0
        }

        async fn score(&self, _: &Resource, _: &RecommendationContext) -> AppResult<f64> {
            self.0.cancel();
            Ok(0.0)
        }
    }

    #[tokio::test]
    async fn test_cancellation_during_scoring_prevents_persist() {
        let (store, user_id, _) = seeded_store().await;
        let token = CancellationToken::new();
        let generator = generator(
            Stores::shared(store.clone()),
            10,
            vec![Arc::new(CancellingScorer(token.clone()))],
        );

        let result = generator
            .generate(user_id, FeedType::Paper, date(2024, 12, 1), &token)
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert!(store.all_recommendations().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_candidates_clear_previous_set() {
        let (store, user_id, papers) = seeded_store().await;
        let generator = generator(Stores::shared(store.clone()), 10, vec![]);
        let token = CancellationToken::new();
        let key = RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1));

        generator.generate(user_id, FeedType::Paper, key.date, &token).await.unwrap();
        for paper in &papers {
            store.deactivate_resource(paper.id).await;
        }
        let outcome = generator
            .generate(user_id, FeedType::Paper, key.date, &token)
            .await
            .unwrap();

        assert_eq!(outcome.persisted, 0);
        assert!(store.find_by_key(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_isolates_failing_units() {
        let (store, user_id, papers) = seeded_store().await;

        let mut resources = MockResourceStore::new();
        resources.expect_list_eligible().returning(move |feed_type| match feed_type {
            FeedType::Video => Err(AppError::Internal("video index unavailable".to_string())),
            FeedType::Paper => Ok(papers.clone()),
            _ => Ok(Vec::new()),
        });

        let stores = Stores {
            resources: Arc::new(resources),
            ..Stores::shared(store.clone())
        };
        let generator = generator(stores, 10, vec![]);
        let token = CancellationToken::new();

        let units = generator.units_for_date(date(2024, 12, 1)).await.unwrap();
        assert_eq!(units.len(), FeedType::ALL.len());

        let report = generator.generate_batch(units, &token).await;
        assert_eq!(report.succeeded, FeedType::ALL.len() - 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].0.feed_type, FeedType::Video);

        let persisted = store
            .find_by_key(&RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 1)))
            .await
            .unwrap();
        assert_eq!(persisted.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_counts_cancelled_units() {
        let (store, _, _) = seeded_store().await;
        let generator = generator(Stores::shared(store.clone()), 10, vec![]);
        let token = CancellationToken::new();
        token.cancel();

        let units = generator.units_for_date(date(2024, 12, 1)).await.unwrap();
        let report = generator.generate_batch(units, &token).await;

        assert_eq!(report.cancelled, FeedType::ALL.len());
        assert_eq!(report.succeeded, 0);
        assert!(store.all_recommendations().await.is_empty());
    }
}
