// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions.
//!
//! Job ids are a strictly increasing `u64` counter (§3 of the spec) and are
//! defined directly in [`crate::job`]. Everything else that needs an opaque,
//! process-unique label — the random "server id" assigned to each accepted
//! peer connection — uses [`define_id!`].

/// Define a newtype ID wrapper around a random nanoid string with a type prefix.
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct ConnectionId("conn-");
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random id with the type prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(12)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::define_id! {
        pub struct TestId("test-");
    }

    #[test]
    fn generates_prefixed_unique_ids() {
        let a = TestId::new();
        let b = TestId::new();
        assert!(a.as_str().starts_with("test-"));
        assert_ne!(a, b);
    }
}
