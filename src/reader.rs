use crate::prelude::*;

use async_trait::async_trait;

/// One device's worth of decoded telemetry, ready for the publisher.
///
/// `data` is an ordered map of field name to value; it is a deep copy, so
/// holding it across a network call is safe regardless of what the reader
/// does in the meantime.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub item: String,
    pub data: serde_json::Value,
}

/// A polled hardware family. Each implementation owns its transport and its
/// cumulative per-device state across cycles.
#[async_trait]
pub trait Reader: Send {
    fn name(&self) -> &'static str;

    /// Run one full cycle and return a snapshot of every device known so
    /// far. An error aborts this reader's cycle only; state accumulated in
    /// previous cycles is preserved.
    async fn poll(&mut self) -> Result<Vec<Reading>>;
}
