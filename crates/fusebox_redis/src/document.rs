// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fusebox::{Context, Error, Result, State, StateName};
use serde::{Deserialize, Serialize};

pub(crate) fn context_key(name: &str) -> String {
    format!("cbr::{name}")
}

pub(crate) fn failure_count_key(name: &str) -> String {
    format!("cbr::{name}::failure_count")
}

pub(crate) fn store_error(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Store(Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("malformed circuit document for \"{0}\"")]
struct MalformedDocument(String);

/// The JSON document persisted under `cbr::{name}`.
///
/// The failure counter lives under its own key (`cbr::{name}::failure_count`) so clients
/// can merge failures through the store's atomic increment instead of overwriting each
/// other's counts. `opened_at` is fractional seconds since the Unix epoch, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ContextDocument {
    pub name: String,
    pub state: StateName,
    pub opened_at: Option<f64>,
    pub threshold: u32,
    pub ttl: f64,
}

impl ContextDocument {
    pub fn from_context(context: &Context) -> Self {
        Self {
            name: context.name().to_string(),
            state: context.state_name(),
            opened_at: context.opened_at().map(to_epoch_seconds),
            threshold: context.threshold(),
            ttl: context.ttl().as_secs_f64(),
        }
    }

    /// Rebuilds the context, pairing the document with the separately stored counter.
    pub fn into_context(self, failure_count: u32) -> Result<Context> {
        let state = match self.state {
            StateName::Closed => State::Closed { failure_count },
            StateName::HalfOpened => State::HalfOpened,
            StateName::Opened => {
                let opened_at = self
                    .opened_at
                    .ok_or_else(|| store_error(MalformedDocument(self.name.clone())))?;
                State::Opened {
                    opened_at: from_epoch_seconds(opened_at)
                        .ok_or_else(|| store_error(MalformedDocument(self.name.clone())))?,
                }
            }
        };
        let ttl = Duration::try_from_secs_f64(self.ttl)
            .map_err(|_| store_error(MalformedDocument(self.name.clone())))?;
        Ok(Context::restore(self.name, self.threshold, ttl, state))
    }
}

pub(crate) fn to_epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn from_epoch_seconds(seconds: f64) -> Option<SystemTime> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .and_then(|offset| UNIX_EPOCH.checked_add(offset))
}
