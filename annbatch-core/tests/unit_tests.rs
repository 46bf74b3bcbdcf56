//! Unit tests for annbatch-core

use annbatch_core::{
    config::{LogFormat, LogLevel},
    Config, EngineKind, Error, Metrics, ResultExt, SpaceKind, Timer,
};

mod error_tests {
    use super::*;

    #[test]
    fn test_input_errors_classified() {
        let input = [
            Error::DimensionMismatch { expected: 3, actual: 4 },
            Error::CapacityExceeded {
                requested: 5,
                available: 1,
                capacity: 10,
            },
            Error::BadLabel { label: 0, size: 3 },
        ];
        assert!(input.iter().all(Error::is_input_error));

        let other = [
            Error::InsufficientNeighbors { k: 5, found: 3 },
            Error::IncompleteBatch {
                k: 2,
                failed_rows: 1,
                total_rows: 3,
            },
            Error::WorkerPanicked { start: 0, end: 4 },
        ];
        assert!(!other.iter().any(Error::is_input_error));
    }

    #[test]
    fn test_messages_name_the_remedy() {
        let msg = Error::InsufficientNeighbors { k: 5, found: 3 }.to_string();
        assert!(msg.contains("ef or M is too small"));

        let msg = Error::BadLabel { label: 7, size: 3 }.to_string();
        assert!(msg.contains('7') && msg.contains('3'));
    }

    #[test]
    fn test_io_converts_and_keeps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");

        let wrapped: annbatch_core::Result<()> = Err(Error::Engine {
            message: "full".into(),
        });
        let err = wrapped.with_context(|| "inserting batch".to_string()).unwrap_err();
        assert!(err.to_string().contains("inserting batch"));
        assert_eq!(err.error_code(), "ENGINE_ERROR");
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index.space, SpaceKind::L2);
        assert_eq!(config.index.engine, EngineKind::Vamana);
        assert_eq!(config.index.ef_search, 10);
        assert_eq!(config.parallel.num_threads, 0);
        assert_eq!(config.parallel.grain_size, 1);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_document() {
        let config = Config::from_toml_str(
            r#"
            [index]
            dimension = 768
            max_elements = 1000000
            space = "InnerProduct"
            engine = "Flat"
            m = 32
            ef_construction = 400
            ef_search = 64

            [parallel]
            num_threads = 16
            grain_size = 128

            [logging]
            level = "Debug"
            format = "Json"
            "#,
        )
        .unwrap();

        assert_eq!(config.index.dimension, 768);
        assert_eq!(config.index.space, SpaceKind::InnerProduct);
        assert_eq!(config.index.m, 32);
        assert_eq!(config.parallel.grain_size, 128);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.level.as_str(), "debug");
    }

    #[test]
    fn test_small_m_rejected() {
        assert!(Config::from_toml_str("[index]\nm = 1\n").is_err());
    }
}

mod metrics_tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.record_batch();
        metrics.record_added(10);
        metrics.record_insert_failures(2);
        metrics.record_worker_failures(1);
        metrics.record_deletion();

        let snap = metrics.snapshot();
        assert_eq!(snap.batches, 1);
        assert_eq!(snap.items_added, 10);
        assert_eq!(snap.insert_failures, 2);
        assert_eq!(snap.worker_failures, 1);
        assert_eq!(snap.deletions, 1);
    }

    #[test]
    fn test_counters_shared_across_threads() {
        let metrics = Metrics::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                let m = metrics.clone();
                s.spawn(move || {
                    for _ in 0..100 {
                        m.record_queries(1);
                    }
                });
            }
        });
        assert_eq!(metrics.snapshot().queries, 400);
    }

    #[test]
    fn test_timer_measures() {
        let timer = Timer::new("test");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.elapsed().as_millis() >= 2);
        timer.stop(0);
    }
}
