//! Cancellation and deadlines for storage calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use attest_contracts::{AttestError, AttestResult};

/// Races each storage call against the caller's token and an optional
/// per-call deadline.
///
/// Whichever fires first fails the call with `Cancelled` and drops the
/// pending storage future, so no write continues after the caller has
/// given up.
#[derive(Debug, Clone, Copy)]
pub struct CallGuard<'a> {
    cancel: &'a CancellationToken,
    deadline: Option<Duration>,
}

impl<'a> CallGuard<'a> {
    pub fn new(cancel: &'a CancellationToken, deadline: Option<Duration>) -> Self {
        Self { cancel, deadline }
    }

    /// Fail fast if the caller has already gone away.
    pub fn check(&self) -> AttestResult<()> {
        if self.cancel.is_cancelled() {
            return Err(caller_cancelled());
        }
        Ok(())
    }

    /// Run one storage call under the guard.
    pub async fn run<T, F>(&self, op: F) -> AttestResult<T>
    where
        F: Future<Output = AttestResult<T>>,
    {
        self.check()?;

        let bounded = async {
            match self.deadline {
                Some(limit) => match tokio::time::timeout(limit, op).await {
                    Ok(result) => result,
                    Err(_) => Err(AttestError::Cancelled {
                        reason: format!("storage call exceeded {}ms deadline", limit.as_millis()),
                    }),
                },
                None => op.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(caller_cancelled()),
            result = bounded => result,
        }
    }

    /// Sleep, waking early with `Cancelled` if the caller goes away.
    pub async fn pause(&self, duration: Duration) -> AttestResult<()> {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(caller_cancelled()),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

fn caller_cancelled() -> AttestError {
    AttestError::Cancelled {
        reason: "caller cancelled the request".to_string(),
    }
}
