// src/engine/token.rs

//! The suspension token observed by a running episode.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::operation::EpisodeError;

/// Cancellation signal handed to each episode.
///
/// A fresh token is derived from the task's true cancellation token every
/// time the task (re-)enters `Running`. Signalling it means "pause" or "stop
/// entirely"; the engine tells the two apart after the episode returns
/// [`EpisodeError::Interrupted`].
#[derive(Debug, Clone)]
pub struct SuspensionToken {
    inner: CancellationToken,
}

impl SuspensionToken {
    /// Derive a new token linked to `parent` (the true cancellation token).
    ///
    /// Non-cancellable tasks have no parent; their token can only be
    /// signalled by a pause request.
    pub fn linked_to(parent: Option<&CancellationToken>) -> Self {
        let inner = match parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        Self { inner }
    }

    /// `true` once the episode has been asked to stop.
    pub fn is_interrupted(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Return `Err(EpisodeError::Interrupted)` if the episode should stop.
    ///
    /// Intended for `?` at the operation's checkpoints.
    pub fn check(&self) -> Result<(), EpisodeError> {
        if self.is_interrupted() {
            Err(EpisodeError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolves once the episode has been asked to stop.
    pub async fn interrupted(&self) {
        self.inner.cancelled().await
    }

    /// Drive `fut` until it finishes or the token is signalled, whichever
    /// comes first.
    pub async fn run_until_interrupted<F>(&self, fut: F) -> Result<F::Output, EpisodeError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(EpisodeError::Interrupted),
            out = fut => Ok(out),
        }
    }

    /// Interruptible sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), EpisodeError> {
        self.run_until_interrupted(tokio::time::sleep(duration)).await
    }

    pub(crate) fn signal(&self) {
        self.inner.cancel();
    }
}
