//! Simulated learner used by the `practice` command.

use rand::Rng;

use literacy_core::model::{
    ActivityKind, ContentCatalog, Difficulty, ItemId, Score, SessionMode, SessionStep, Smoothness,
    UnitId,
};
use services::{FlowState, LearnerEngine};

/// Totals printed after a practice run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PracticeSummary {
    pub activities: usize,
    pub successes: usize,
    pub xp_earned: u32,
    pub first_completions: usize,
    pub level_ups: usize,
    pub newly_mastered: Vec<String>,
}

/// Play one session of `mode` for `unit` with a learner whose answers come from `rng`.
///
/// Guided sessions resume a saved plan for the same unit if one exists. Menu
/// sessions play `menu_rounds` activities from the hub, then exit.
///
/// # Errors
///
/// Returns the first engine error.
pub async fn run_session<R: Rng + ?Sized>(
    engine: &mut LearnerEngine,
    catalog: &dyn ContentCatalog,
    mode: SessionMode,
    unit: UnitId,
    menu_rounds: usize,
    rng: &mut R,
) -> Result<PracticeSummary, Box<dyn std::error::Error>> {
    let mut summary = PracticeSummary::default();

    let resumed = engine.flow().state() == FlowState::Running && mode == SessionMode::Auto;
    if resumed {
        tracing::info!(%unit, "resuming saved session");
    } else {
        if engine.flow().plan().is_some() {
            engine.exit_session().await?;
        }
        engine.start_session(mode, unit).await?;
    }

    match mode {
        SessionMode::Auto => {
            while let Some(step) = engine.next_step().await? {
                play_step(engine, catalog, &step, unit, rng, &mut summary).await?;
            }
        }
        SessionMode::Menu => {
            let kinds = [
                ActivityKind::SoundOut,
                ActivityKind::BuildWord,
                ActivityKind::PictureMatch,
                ActivityKind::ReadSentence,
            ];
            for kind in kinds.iter().cycle().take(menu_rounds) {
                let Some(step) = engine.request_activity(*kind)? else {
                    continue;
                };
                play_step(engine, catalog, &step, unit, rng, &mut summary).await?;
            }
            engine.exit_session().await?;
        }
    }

    engine.persist().await?;
    Ok(summary)
}

async fn play_step<R: Rng + ?Sized>(
    engine: &mut LearnerEngine,
    catalog: &dyn ContentCatalog,
    step: &SessionStep,
    unit: UnitId,
    rng: &mut R,
    summary: &mut PracticeSummary,
) -> Result<(), Box<dyn std::error::Error>> {
    let difficulty = step
        .word_text()
        .and_then(|word| catalog.vocabulary().iter().find(|e| e.word == word))
        .map_or_else(Difficulty::default, |entry| entry.difficulty);

    // Harder words fail more often.
    let success_rate = 0.95 - 0.1 * f64::from(difficulty.value() - 1);
    let success = rng.random_bool(success_rate);
    let score = if success {
        Score::clamped(rng.random_range(75..=100))
    } else {
        Score::clamped(rng.random_range(20..=60))
    };

    let item = ItemId::new(match step.word_text() {
        Some(word) => word.to_string(),
        None => format!("sentence-{unit}"),
    });
    let first = engine
        .progress()
        .get_item_progress(engine.subject(), &item)
        .is_none();

    if let Some(word) = step.word_text() {
        let smoothness = if success {
            Smoothness::clamped(rng.random_range(0.6..=1.0))
        } else {
            Smoothness::clamped(rng.random_range(0.1..0.5))
        };
        let applied = engine.record_word_practice(word, unit, smoothness, success);
        if applied.newly_mastered {
            summary.newly_mastered.push(word.to_string());
        }
    } else {
        engine.record_item_attempt(&item, success);
    }

    let outcome = engine.finish_activity(score, difficulty, first).await?;
    tracing::info!(
        activity = %step.activity,
        word = step.word_text().unwrap_or("-"),
        success,
        xp = outcome.result.xp_earned,
        "activity finished"
    );

    summary.activities += 1;
    summary.successes += usize::from(success);
    summary.xp_earned += outcome.result.xp_earned;
    summary.first_completions += usize::from(first);
    summary.level_ups += usize::from(outcome.leveled_up);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use literacy_core::Clock;
    use literacy_core::model::SubjectId;
    use literacy_core::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use services::EngineConfig;
    use storage::repository::Storage;

    use crate::content;

    async fn engine(storage: Storage) -> LearnerEngine {
        LearnerEngine::load(
            storage,
            Arc::new(content::catalog()),
            Clock::fixed(fixed_now()),
            EngineConfig::default(),
            SubjectId::new("reading"),
            UnitId::new(2),
        )
        .await
        .unwrap()
        .with_letter_progression(content::letter_progression())
    }

    #[tokio::test]
    async fn auto_run_plays_the_whole_plan() {
        let catalog = content::catalog();
        let mut engine = engine(Storage::in_memory()).await;
        let mut rng = StdRng::seed_from_u64(7);

        let summary = run_session(
            &mut engine,
            &catalog,
            SessionMode::Auto,
            UnitId::new(2),
            0,
            &mut rng,
        )
        .await
        .unwrap();

        assert_eq!(summary.activities, 8);
        assert_eq!(engine.flow().state(), FlowState::Complete);
        assert_eq!(
            u64::from(summary.xp_earned),
            engine.progress().global_state().total_xp()
        );
        assert_eq!(engine.reviews().total_reviews(), 6);
    }

    #[tokio::test]
    async fn menu_run_returns_to_mode_selection() {
        let catalog = content::catalog();
        let mut engine = engine(Storage::in_memory()).await;
        let mut rng = StdRng::seed_from_u64(11);

        let summary = run_session(
            &mut engine,
            &catalog,
            SessionMode::Menu,
            UnitId::new(2),
            5,
            &mut rng,
        )
        .await
        .unwrap();

        assert_eq!(summary.activities, 5);
        assert_eq!(engine.flow().state(), FlowState::ModeSelection);
        assert_eq!(engine.reviews().total_reviews(), 4);
    }

    #[tokio::test]
    async fn replayed_items_earn_no_first_completion_bonus() {
        let catalog = content::catalog();
        let mut engine = engine(Storage::in_memory()).await;
        let mut rng = StdRng::seed_from_u64(3);
        let unit = UnitId::new(1);

        let first = run_session(&mut engine, &catalog, SessionMode::Auto, unit, 0, &mut rng)
            .await
            .unwrap();
        // Four unit-1 words plus the sentence step, all new.
        assert_eq!(first.activities, 5);
        assert_eq!(first.first_completions, 5);

        engine.advance_clock(Duration::days(3));
        let replay = run_session(&mut engine, &catalog, SessionMode::Auto, unit, 0, &mut rng)
            .await
            .unwrap();
        assert_eq!(replay.activities, 5);
        assert_eq!(replay.first_completions, 0);

        let sentence = ItemId::new(format!("sentence-{unit}"));
        let progress = engine
            .progress()
            .get_item_progress(engine.subject(), &sentence)
            .unwrap();
        assert_eq!(progress.attempts(), 2);
        assert_eq!(
            engine.progress().global_state().total_xp(),
            u64::from(first.xp_earned + replay.xp_earned)
        );
    }
}
