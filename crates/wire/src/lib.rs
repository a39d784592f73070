// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orch-wire: the request/response/signal message substrate shared by the
//! node protocol and the public-bus protocol (spec §2, §4.2, §6).
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

pub mod client;
pub mod framing;
pub mod message;
pub mod peer;

pub use framing::{read_frame, read_json, write_frame, write_json, ProtocolError, MAX_FRAME_BYTES};
pub use message::{properties_changed, Envelope, PROPERTIES_CHANGED_MEMBER, PROPERTIES_INTERFACE};
