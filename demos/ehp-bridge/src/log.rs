// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wires the core's minimal [`ehp_core::platform::Log`] seam to `tracing`.

use ehp_core::platform::Log;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl Log for TracingLog {
    fn info(&mut self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warn(&mut self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&mut self, msg: &str) {
        tracing::error!("{msg}");
    }
}
