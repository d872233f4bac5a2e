// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcilers that drive Kluster resources toward their declared state.

pub mod kluster;

pub use kluster::{KlusterReconciler, ReconcileOutcome};
