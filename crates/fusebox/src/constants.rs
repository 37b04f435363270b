// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of consecutive failures before a circuit opens.
pub(crate) const DEFAULT_THRESHOLD: u32 = 5;

/// Default duration a circuit stays open before admitting a probe.
pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(30);

pub(crate) const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because the circuit state can no longer be trusted";
