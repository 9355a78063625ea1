//! The checkpointed aggregation cycle.
//!
//! A refresh loads the survey's checkpoint, merges only responses created
//! after its high-water mark, and writes the result back. Refreshes of the
//! same survey are serialized by a per-survey lease held across the whole
//! cycle; different surveys run independently.

use crate::analysis::{merge, BreakdownMatrix, MatchPolicy, MergeStats};
use crate::models::{Checkpoint, ReportMetadata, Response, StatsReport, Survey, SurveyId};
use crate::report::format_stats;
use crate::store::CheckpointStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Per-call switches for [`StatsService::refresh`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Unmatched-answer policy.
    pub policy: MatchPolicy,
    /// Ignore the stored checkpoint and recount every response.
    pub rebuild: bool,
    /// Merge but do not persist.
    pub dry_run: bool,
}

/// Result of a refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The checkpoint after merging (as stored, unless `persisted` is false).
    pub checkpoint: Checkpoint,
    /// What the merge did.
    pub stats: MergeStats,
    /// Whether the matrix was built from scratch.
    pub fresh: bool,
    /// Whether the checkpoint was written back.
    pub persisted: bool,
}

/// Responses of `survey` created strictly after `since`.
pub fn select_new_responses<'a>(
    survey: &SurveyId,
    responses: &'a [Response],
    since: Option<DateTime<Utc>>,
) -> Vec<&'a Response> {
    responses
        .iter()
        .filter(|r| &r.survey_id == survey && r.is_newer_than(since))
        .collect()
}

/// Runs checkpointed aggregation against a [`CheckpointStore`].
pub struct StatsService<S> {
    store: S,
    // One entry per survey ever refreshed; entries are never pruned, which
    // suits a process that handles a bounded set of surveys.
    leases: Mutex<HashMap<SurveyId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: CheckpointStore> StatsService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lease(&self, survey: &SurveyId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| anyhow!("survey lease table poisoned"))?;
        Ok(leases.entry(survey.clone()).or_default().clone())
    }

    /// Brings the checkpoint of `survey` up to date with `responses`.
    ///
    /// `responses` may contain anything the caller fetched; only those of this
    /// survey created after the checkpoint are merged.
    pub async fn refresh(
        &self,
        survey: &Survey,
        responses: &[Response],
        options: RefreshOptions,
    ) -> Result<RefreshOutcome> {
        let lease = self.lease(&survey.id)?;
        let _held = lease.lock().await;
        self.refresh_locked(survey, responses, options)
    }

    fn refresh_locked(
        &self,
        survey: &Survey,
        responses: &[Response],
        options: RefreshOptions,
    ) -> Result<RefreshOutcome> {
        let targets = survey.targets();
        let dimensions = survey.dimensions();

        let existing = self
            .store
            .get(&survey.id)
            .with_context(|| format!("Failed to load checkpoint for survey {}", survey.id))?;
        let expected_revision = existing.as_ref().map(|c| c.revision);
        let baseline = if options.rebuild { None } else { existing };

        let fresh = baseline.is_none();
        let mut checkpoint = match baseline {
            Some(mut checkpoint) => {
                let added = checkpoint.matrix.reconcile(&targets, &dimensions);
                if added > 0 {
                    info!("Survey structure grew; added {} counters to checkpoint", added);
                }
                checkpoint
            }
            None => {
                debug!("Building a fresh matrix for survey {}", survey.id);
                Checkpoint::fresh(
                    survey.id.clone(),
                    BreakdownMatrix::build(&targets, &dimensions),
                )
            }
        };

        if checkpoint.matrix.is_empty() {
            warn!("Survey {} has no target questions; nothing will be counted", survey.id);
        }

        let new_responses = select_new_responses(&survey.id, responses, checkpoint.updated_at);
        info!(
            "Merging {} new responses for survey {} (checkpoint through {:?})",
            new_responses.len(),
            survey.id,
            checkpoint.updated_at
        );

        let stats = merge(
            &new_responses,
            &mut checkpoint.matrix,
            &dimensions,
            &targets,
            options.policy,
        )?;
        checkpoint.advance(&new_responses);

        if options.dry_run {
            info!("Dry run: checkpoint not written");
            return Ok(RefreshOutcome {
                checkpoint,
                stats,
                fresh,
                persisted: false,
            });
        }

        let stored = self
            .store
            .upsert(&checkpoint, expected_revision)
            .with_context(|| format!("Failed to persist checkpoint for survey {}", survey.id))?;

        Ok(RefreshOutcome {
            checkpoint: stored,
            stats,
            fresh,
            persisted: true,
        })
    }

    /// Formats a refreshed checkpoint with the text of `display`.
    ///
    /// `display` may be a different locale of the same survey; counts are
    /// matched by identifier only.
    pub fn report(&self, outcome: &RefreshOutcome, display: &Survey) -> StatsReport {
        let checkpoint = &outcome.checkpoint;
        StatsReport {
            metadata: ReportMetadata {
                survey_id: checkpoint.survey_id.clone(),
                description: display.description.clone(),
                locale: display.locale.clone(),
                generated_at: Utc::now(),
                updated_at: checkpoint.updated_at,
                responses_folded: checkpoint.responses_folded,
                responses_merged: outcome.stats.responses,
            },
            aggregated_stats: format_stats(&checkpoint.matrix, &display.questions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, Question};
    use crate::store::{MemoryCheckpointStore, StoreError};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn survey() -> Survey {
        Survey {
            id: "s1".into(),
            description: "Commute".to_string(),
            locale: Some("en".to_string()),
            questions: vec![
                Question::target(
                    "mode",
                    "How do you commute?",
                    vec![Answer::new("bike", "Bike"), Answer::new("car", "Car")],
                ),
                Question::dimension(
                    "age",
                    "Age group",
                    vec![Answer::new("young", "Under 30"), Answer::new("old", "30+")],
                ),
            ],
        }
    }

    fn responses() -> Vec<Response> {
        vec![
            Response::new("s1", at(10), ["bike", "young"]),
            Response::new("s1", at(20), ["car", "old"]),
            Response::new("s1", at(30), ["bike", "old"]),
            Response::new("other", at(15), ["bike", "young"]),
        ]
    }

    fn bike_total(outcome: &RefreshOutcome) -> u64 {
        outcome
            .checkpoint
            .matrix
            .tally(&"mode".into(), &"bike".into())
            .map(|t| t.total_count)
            .unwrap_or(0)
    }

    #[test]
    fn test_select_new_responses() {
        let all = responses();
        let selected = select_new_responses(&"s1".into(), &all, Some(at(10)));
        let times: Vec<_> = selected.iter().map(|r| r.created_at).collect();
        assert_eq!(times, vec![at(20), at(30)]);
    }

    #[tokio::test]
    async fn test_first_refresh_builds_and_persists() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        let outcome = service
            .refresh(&survey(), &responses(), RefreshOptions::default())
            .await
            .unwrap();

        assert!(outcome.fresh);
        assert!(outcome.persisted);
        assert_eq!(outcome.stats.responses, 3);
        assert_eq!(outcome.checkpoint.revision, 1);
        assert_eq!(outcome.checkpoint.updated_at, Some(at(30)));
        assert_eq!(bike_total(&outcome), 2);

        let stored = service.store().get(&"s1".into()).unwrap().unwrap();
        assert_eq!(stored, outcome.checkpoint);
    }

    #[tokio::test]
    async fn test_second_refresh_merges_only_newer() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        let mut all = responses();
        let first = service
            .refresh(&survey(), &all, RefreshOptions::default())
            .await
            .unwrap();

        all.push(Response::new("s1", at(40), ["bike", "young"]));
        all.push(Response::new("s1", at(5), ["car", "young"]));
        let second = service
            .refresh(&survey(), &all, RefreshOptions::default())
            .await
            .unwrap();

        assert!(!second.fresh);
        assert_eq!(second.stats.responses, 1);
        assert_eq!(second.checkpoint.revision, first.checkpoint.revision + 1);
        assert_eq!(second.checkpoint.responses_folded, 4);
        assert_eq!(bike_total(&second), 3);
    }

    #[tokio::test]
    async fn test_incremental_matches_full_recount() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        let all = responses();
        for cut in [&all[..1], &all[..2], &all[..]] {
            service
                .refresh(&survey(), cut, RefreshOptions::default())
                .await
                .unwrap();
        }
        let incremental = service.store().get(&"s1".into()).unwrap().unwrap();

        let rebuilt = service
            .refresh(
                &survey(),
                &all,
                RefreshOptions {
                    rebuild: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(rebuilt.checkpoint.matrix, incremental.matrix);
        assert_eq!(rebuilt.checkpoint.updated_at, incremental.updated_at);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_persist() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        let outcome = service
            .refresh(
                &survey(),
                &responses(),
                RefreshOptions {
                    dry_run: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!outcome.persisted);
        assert_eq!(bike_total(&outcome), 2);
        assert!(service.store().get(&"s1".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_strict_policy_surfaces_unknown_answers() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        let mut all = responses();
        all.push(Response::new("s1", at(50), ["bike", "retired-answer"]));

        let result = service
            .refresh(
                &survey(),
                &all,
                RefreshOptions {
                    policy: MatchPolicy::Strict,
                    ..Default::default()
                },
            )
            .await;

        assert!(result.is_err());
        assert!(service.store().get(&"s1".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_answer_is_reconciled_into_checkpoint() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        service
            .refresh(&survey(), &responses(), RefreshOptions::default())
            .await
            .unwrap();

        let mut grown = survey();
        grown.questions[0].answers.push(Answer::new("bus", "Bus"));
        let outcome = service
            .refresh(
                &grown,
                &[Response::new("s1", at(60), ["bus", "young"])],
                RefreshOptions::default(),
            )
            .await
            .unwrap();

        let matrix = &outcome.checkpoint.matrix;
        assert_eq!(
            matrix.tally(&"mode".into(), &"bus".into()).map(|t| t.total_count),
            Some(1)
        );
        assert_eq!(
            matrix.count(&"mode".into(), &"bus".into(), &"age".into(), &"young".into()),
            Some(1)
        );
        assert_eq!(bike_total(&outcome), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_do_not_lose_updates() {
        let service = Arc::new(StatsService::new(MemoryCheckpointStore::new()));
        let all = Arc::new(responses());

        let tasks = (0..8).map(|_| {
            let service = Arc::clone(&service);
            let all = Arc::clone(&all);
            tokio::spawn(async move {
                service
                    .refresh(&survey(), &all, RefreshOptions::default())
                    .await
                    .map(|outcome| outcome.stats.responses)
            })
        });

        let merged: usize = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .sum();

        let stored = service.store().get(&"s1".into()).unwrap().unwrap();
        assert_eq!(merged, 3);
        assert_eq!(stored.responses_folded, 3);
        assert_eq!(stored.matrix.question_total(&"mode".into()), 3);
    }

    #[test]
    fn test_writer_outside_the_lease_conflicts() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        tokio_test::block_on(service.refresh(&survey(), &responses(), RefreshOptions::default()))
            .unwrap();

        // a second process that loaded nothing races the first writer
        let stale = Checkpoint::fresh("s1".into(), BreakdownMatrix::default());
        let err = service.store().upsert(&stale, None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    mod fixtures {
        use super::*;
        use crate::store::FileCheckpointStore;
        use crate::validation::partition_valid;
        use chrono::Timelike;
        use tempfile::TempDir;

        fn load() -> (Survey, Survey, Vec<Response>) {
            let survey = serde_json::from_str(include_str!("../fixtures/survey.json")).unwrap();
            let french = serde_json::from_str(include_str!("../fixtures/survey_fr.json")).unwrap();
            let responses =
                serde_json::from_str(include_str!("../fixtures/responses.json")).unwrap();
            (survey, french, responses)
        }

        #[tokio::test]
        async fn test_commute_survey_end_to_end() {
            let (survey, french, responses) = load();
            let temp_dir = TempDir::new().unwrap();
            let service = StatsService::new(FileCheckpointStore::open(temp_dir.path()).unwrap());

            let outcome = service
                .refresh(&survey, &responses, RefreshOptions::default())
                .await
                .unwrap();

            assert_eq!(outcome.stats.responses, 7);
            assert_eq!(outcome.stats.unmatched_answers, 1);
            assert_eq!(outcome.checkpoint.responses_folded, 7);

            let matrix = &outcome.checkpoint.matrix;
            assert_eq!(matrix.question_total(&"q-mode".into()), 7);
            assert_eq!(matrix.question_total(&"q-remote".into()), 6);
            assert_eq!(
                matrix.count(&"q-mode".into(), &"car".into(), &"d-age".into(), &"a-mid".into()),
                Some(1)
            );
            assert_eq!(
                matrix.count(&"q-mode".into(), &"car".into(), &"d-region".into(), &"south".into()),
                Some(2)
            );

            let report = service.report(&outcome, &french);
            let mode = &report.aggregated_stats[0];
            assert_eq!(mode.question, "Comment vous rendez-vous au travail ?");
            assert_eq!(mode.total_count, 7);

            let bike = &mode.answers[0];
            assert_eq!(bike.answer, "Vélo");
            assert_eq!(bike.total_count, 3);
            assert_eq!(bike.breakdowns[0].by, "Tranche d'âge");
            let by_age: Vec<_> = bike.breakdowns[0]
                .answers
                .iter()
                .map(|a| (a.answer.as_str(), a.count))
                .collect();
            assert_eq!(
                by_age,
                vec![("Moins de 30 ans", 2), ("30 à 49 ans", 1), ("50 ans et plus", 0)]
            );
        }

        #[tokio::test]
        async fn test_commute_survey_split_batches_match_rebuild() {
            let (survey, _, responses) = load();
            let temp_dir = TempDir::new().unwrap();
            let service = StatsService::new(FileCheckpointStore::open(temp_dir.path()).unwrap());

            let morning: Vec<Response> = responses
                .iter()
                .filter(|r| r.created_at.hour() < 12)
                .cloned()
                .collect();
            let first = service
                .refresh(&survey, &morning, RefreshOptions::default())
                .await
                .unwrap();
            assert_eq!(first.stats.responses, 4);

            let second = service
                .refresh(&survey, &responses, RefreshOptions::default())
                .await
                .unwrap();
            assert_eq!(second.stats.responses, 3);
            assert_eq!(second.checkpoint.revision, 2);

            let rebuilt = service
                .refresh(
                    &survey,
                    &responses,
                    RefreshOptions {
                        rebuild: true,
                        dry_run: true,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(rebuilt.checkpoint.matrix, second.checkpoint.matrix);
            assert_eq!(rebuilt.checkpoint.updated_at, second.checkpoint.updated_at);
        }

        #[test]
        fn test_commute_survey_validation() {
            let (survey, _, responses) = load();
            let (valid, rejected) = partition_valid(&survey, responses);

            assert_eq!(valid.len(), 5);
            let rejected_ids: Vec<_> = rejected
                .iter()
                .map(|(response, _)| response.id.as_deref().unwrap_or(""))
                .collect();
            assert_eq!(rejected_ids, vec!["r-8", "r-5", "r-6"]);
        }
    }

    #[test]
    fn test_report_uses_display_locale() {
        let service = StatsService::new(MemoryCheckpointStore::new());
        let survey_in = survey();
        let responses_in = responses();
        let refresh = service.refresh(&survey_in, &responses_in, RefreshOptions::default());
        let outcome = tokio_test::block_on(refresh).unwrap();

        let mut french = survey();
        french.locale = Some("fr".to_string());
        french.questions[0].text = "Comment vous déplacez-vous ?".to_string();
        french.questions[0].answers[0].text = "Vélo".to_string();

        let report = service.report(&outcome, &french);

        assert_eq!(report.metadata.locale.as_deref(), Some("fr"));
        assert_eq!(report.metadata.responses_merged, 3);
        assert_eq!(report.aggregated_stats[0].question, "Comment vous déplacez-vous ?");
        assert_eq!(report.aggregated_stats[0].answers[0].answer, "Vélo");
        assert_eq!(report.aggregated_stats[0].answers[0].total_count, 2);
        assert_eq!(report.total_answers(), 3);
    }
}
