//! Named pipeline worker threads
//!
//! Workers are named `meghaduta-{stage}-{i}`. A panic is caught, logged, and
//! halts the pipeline instead of silently losing a stage.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use meghaduta_core::{Error, Result};
use tracing::error;

use super::{HaltReason, Shared};

pub(crate) fn spawn_worker<F>(
    stage: &'static str,
    index: usize,
    shared: Arc<Shared>,
    work: F,
) -> Result<JoinHandle<()>>
where
    F: FnOnce(&Shared) + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("meghaduta-{}-{}", stage, index))
        .spawn(move || {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| work(&shared))) {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "(non-string panic)".to_string());
                error!(stage, index, panic = %detail, "Pipeline worker panicked");
                shared.halt(HaltReason::WorkerPanic(format!(
                    "{} worker {} panicked: {}",
                    stage, index, detail
                )));
            }
        })
        .map_err(|e| Error::PipelineHalted(format!("failed to spawn {} worker: {}", stage, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_named_and_runs() {
        let shared = Arc::new(Shared::default());
        let handle = spawn_worker("parser", 3, Arc::clone(&shared), |_| {
            assert_eq!(std::thread::current().name(), Some("meghaduta-parser-3"));
        })
        .unwrap();
        handle.join().unwrap();
        assert!(shared.halt_reason().is_none());
    }

    #[test]
    fn test_panic_halts() {
        let shared = Arc::new(Shared::default());
        let handle = spawn_worker("extractor", 0, Arc::clone(&shared), |_| {
            panic!("boom");
        })
        .unwrap();
        handle.join().unwrap();

        match shared.halt_reason() {
            Some(HaltReason::WorkerPanic(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected halt reason: {:?}", other),
        }
    }
}
