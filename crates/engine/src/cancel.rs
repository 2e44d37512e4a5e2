// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide cooperative cancellation.
//!
//! A `CancelFlag` is set once (e.g. from a SIGINT handler) and observed
//! between poll iterations and dependency resolutions. All suspension
//! points in the engine select against it.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation flag.
#[derive(Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender dropped without cancelling: park forever, the select's
        // other branch decides.
        std::future::pending::<()>().await;
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
