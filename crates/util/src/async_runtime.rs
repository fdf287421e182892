//! Async runtime helpers for blocking callers.
//!
//! The interpreter is synchronous. Outbound HTTP goes through `reqwest`,
//! which is async, so actions bridge through [`block_on_future`].

use anyhow::anyhow;
use std::future::Future;
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    task,
};

/// Execute an async future from synchronous code.
///
/// # Arguments
/// - `future`: The future to run to completion.
///
/// # Returns
/// Returns the future's output or an error if a Tokio runtime cannot be created.
///
/// # Notes
/// - Reuses the current runtime when called from a multi-threaded runtime.
/// - A current-thread runtime cannot block in place, so the future runs on a
///   helper thread with its own single-threaded runtime.
/// - Falls back to a single-threaded runtime for call sites outside Tokio.
pub fn block_on_future<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => task::block_in_place(|| handle.block_on(future)),
        Ok(_) => std::thread::spawn(move || run_detached(future))
            .join()
            .map_err(|_| anyhow!("async bridge thread panicked"))?,
        Err(_) => run_detached(future),
    }
}

fn run_detached<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| anyhow!(error))?
        .block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_future_without_runtime() {
        let value = block_on_future(async { Ok(21 * 2) }).expect("future completes");
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_runs_future_inside_multi_thread_runtime() {
        let value = block_on_future(async { Ok("inside") }).expect("future completes");
        assert_eq!(value, "inside");
    }

    #[tokio::test]
    async fn test_runs_future_inside_current_thread_runtime() {
        let result: anyhow::Result<()> = block_on_future(async { Err(anyhow!("boom")) });
        assert_eq!(result.expect_err("error propagates").to_string(), "boom");
    }
}
