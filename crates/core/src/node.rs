// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity helpers (spec §3, §4.3).

use crate::error::OrchError;

crate::define_id! {
    /// Random id assigned to an accepted peer connection before it registers
    /// a name. Used internally to correlate transport callbacks with their
    /// connection; never exposed on the wire.
    pub struct ConnectionId("conn-");
}

/// Validate a name offered to `Register`.
///
/// The spec only requires uniqueness (enforced by the registry), but an
/// empty name can never be a meaningful fleet member and would produce a
/// degenerate object path, so it is rejected as `InvalidArgument` before the
/// uniqueness check ever runs.
pub fn validate_node_name(name: &str) -> Result<(), OrchError> {
    if name.is_empty() {
        return Err(OrchError::InvalidArgument("node name must not be empty".into()));
    }
    Ok(())
}

/// Object path for a registered node, `/org/orch/nodes/<name>` (spec §3).
pub fn node_object_path(name: &str) -> String {
    format!("/org/orch/nodes/{name}")
}
