//! End-to-end scenarios through the meta-crate re-exports

mod common;

use common::{assert_strictly_increasing, days_between, key, split_at_day, swing, SYMBOL};
use cyclebar::core::test_utils::{flat_session_day, trading_day, MemoryStore};
use cyclebar::core::{BaselineMax, CheckpointStore, DerivedBarStore, ScaleBounds, StoredBounds};
use cyclebar::{FileStore, Orchestrator, Period, PipelineParams, Resampler, RunOutcome, Settings};

#[test]
fn test_flat_session_resamples_to_sixteen_bars() {
    let bars = flat_session_day(trading_day(0), 12.5, 100);
    let out = Resampler::new(Period::Minutes(15)).resample(&bars).unwrap();

    assert_eq!(out.len(), 16);
    for bar in &out {
        assert_eq!(bar.volume, 1_500);
        assert_eq!(bar.open, 12.5);
        assert_eq!(bar.close, 12.5);
    }
    assert_eq!(out[7].timestamp.format("%H:%M").to_string(), "11:30");
    assert_eq!(out[8].timestamp.format("%H:%M").to_string(), "13:15");
}

#[test]
fn test_wide_persisted_bounds_are_not_narrowed() {
    let (history, _) = split_at_day(swing(30, 42), 30);
    let mut store = MemoryStore::with_bars(SYMBOL, &history);
    let wide = StoredBounds::Range(ScaleBounds::new(-1.0e6, 1.0e6));
    let baseline = StoredBounds::Max(BaselineMax { max: 1.0e12 });
    store.bounds.insert((key(), "amplitude".to_string()), wide);
    store
        .bounds
        .insert((key(), "volume_baseline".to_string()), baseline);

    let orchestrator = Orchestrator::new(PipelineParams::default()).unwrap();
    let report = orchestrator.run(&mut store, SYMBOL).unwrap();
    assert_eq!(report.outcome, RunOutcome::Committed);

    assert_eq!(store.bounds[&(key(), "amplitude".to_string())], wide);
    assert_eq!(store.bounds[&(key(), "volume_baseline".to_string())], baseline);
}

#[test]
fn test_repeated_incremental_runs() {
    let bars = swing(60, 11);
    let (history, _) = split_at_day(bars.clone(), 30);
    let mut store = MemoryStore::with_bars(SYMBOL, &history);
    let orchestrator = Orchestrator::new(PipelineParams::default()).unwrap();

    let mut checkpoint = orchestrator.run(&mut store, SYMBOL).unwrap().checkpoint.unwrap();
    let mut bounds = store.bounds.clone();

    for (from, to) in [(30, 38), (38, 46), (46, 54), (54, 60)] {
        store.push_bars(SYMBOL, &days_between(&bars, from, to));
        let report = orchestrator.run(&mut store, SYMBOL).unwrap();
        assert_ne!(report.outcome, RunOutcome::NoNewData, "days {from}..{to}");

        if let Some(next) = report.checkpoint {
            assert!(next.end_date >= checkpoint.end_date);
            assert!(next.processed_until() > checkpoint.processed_until());
            assert!(next.next_start_date >= checkpoint.next_start_date);
            checkpoint = next;
        }

        for (slot, old) in &bounds {
            let merged = store.bounds[slot];
            if let (StoredBounds::Range(old), StoredBounds::Range(new)) = (old, &merged) {
                assert!(new.contains(old), "{} shrank", slot.1);
            }
            if let (StoredBounds::Max(old), StoredBounds::Max(new)) = (old, &merged) {
                assert!(new.max >= old.max, "{} shrank", slot.1);
            }
        }
        bounds = store.bounds.clone();
    }

    assert_strictly_increasing(&store.derived[&key()], |b| b.timestamp);
    for ((_, model), matrix) in &store.matrices {
        assert!(
            matrix.cycles.windows(2).all(|w| w[0] < w[1]),
            "model {model} emitted a cycle twice"
        );
        assert_eq!(matrix.x.shape()[0], matrix.cycles.len());
        assert_eq!(matrix.y.shape()[0], matrix.cycles.len());
    }
}

#[test]
fn test_file_store_run_from_settings() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.data.data_dir = dir.path().to_path_buf();

    let mut store = FileStore::new(settings.data.data_dir.clone());
    let (history, _) = split_at_day(swing(30, 3), 30);
    assert_eq!(store.import_base_bars(SYMBOL, &history).unwrap(), history.len());
    assert_eq!(store.symbols().unwrap(), vec![SYMBOL.to_string()]);

    let orchestrator = Orchestrator::new(settings.pipeline_params().unwrap()).unwrap();
    let report = orchestrator.run(&mut store, SYMBOL).unwrap();
    assert_eq!(report.outcome, RunOutcome::Committed);

    let derived = store.load_derived_bars(&key()).unwrap();
    assert_eq!(derived.len(), report.derived_rows_written);
    assert_strictly_increasing(&derived, |b| b.timestamp);
    assert_eq!(store.read_checkpoint(&key()).unwrap(), report.checkpoint);
}
