// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message-bus-style envelope shared by the node protocol and the
//! public-bus protocol (spec §2, §4.2, §6): object paths, interfaces,
//! methods and signals, riding the frame codec in [`crate::framing`].

use serde::{Deserialize, Serialize};

/// One message crossing a peer or bus connection.
///
/// `MethodCall`/`MethodReturn`/`Error` form a request/response pair
/// correlated by `serial`; `Signal` is fire-and-forget and addressed by
/// object path + interface + member, matching the model spec §2 calls out
/// ("object paths, interfaces, methods, signals and properties").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Envelope {
    #[serde(rename = "call")]
    MethodCall {
        serial: u64,
        object_path: String,
        interface: String,
        member: String,
        #[serde(default)]
        body: serde_json::Value,
    },

    #[serde(rename = "return")]
    MethodReturn {
        reply_serial: u64,
        #[serde(default)]
        body: serde_json::Value,
    },

    #[serde(rename = "error")]
    Error { reply_serial: u64, name: String, message: String },

    #[serde(rename = "signal")]
    Signal {
        object_path: String,
        interface: String,
        member: String,
        #[serde(default)]
        body: serde_json::Value,
    },
}

impl Envelope {
    pub fn call(
        serial: u64,
        object_path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Envelope::MethodCall {
            serial,
            object_path: object_path.into(),
            interface: interface.into(),
            member: member.into(),
            body,
        }
    }

    pub fn reply(reply_serial: u64, body: serde_json::Value) -> Self {
        Envelope::MethodReturn { reply_serial, body }
    }

    pub fn error(reply_serial: u64, name: impl Into<String>, message: impl Into<String>) -> Self {
        Envelope::Error { reply_serial, name: name.into(), message: message.into() }
    }

    pub fn signal(
        object_path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Envelope::Signal {
            object_path: object_path.into(),
            interface: interface.into(),
            member: member.into(),
            body,
        }
    }
}

/// Well-known interface for D-Bus-style property change notifications.
/// `Signal { interface: PROPERTIES_INTERFACE, member: "PropertiesChanged", .. }`
/// carries `{"path", "interface", "property", "value"}` in its body.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const PROPERTIES_CHANGED_MEMBER: &str = "PropertiesChanged";

/// Build a `PropertiesChanged` signal for a single property.
pub fn properties_changed(
    object_path: impl Into<String>,
    owning_interface: impl Into<String>,
    property: impl Into<String>,
    value: serde_json::Value,
) -> Envelope {
    Envelope::signal(
        object_path,
        PROPERTIES_INTERFACE,
        PROPERTIES_CHANGED_MEMBER,
        serde_json::json!({
            "interface": owning_interface.into(),
            "property": property.into(),
            "value": value,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_round_trips_through_json() {
        let env = Envelope::call(1, "/org/orch/peer", "org.orch.Peer", "Register", serde_json::json!({"name": "a"}));
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn properties_changed_carries_the_owning_interface() {
        let env = properties_changed("/org/orch/jobs/1", "org.orch.Job", "State", serde_json::json!("running"));
        match env {
            Envelope::Signal { interface, member, body, .. } => {
                assert_eq!(interface, PROPERTIES_INTERFACE);
                assert_eq!(member, PROPERTIES_CHANGED_MEMBER);
                assert_eq!(body["property"], "State");
            }
            _ => panic!("expected a signal"),
        }
    }
}
