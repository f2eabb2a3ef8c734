//! Portal Error Types
//!
//! Address and connection failures are returned to the caller. Contract
//! violations (`ProtocolIncompatible`, `RefCountUnderflow`) are raised with
//! `panic!` using the same `Display` text, never returned.

use thiserror::Error;

/// Main error type for Portal operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// Another live portal is already bound to the address
    #[error("address in use: {0}")]
    AddressInUse(String),

    /// Nothing is bound to the address
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Address string cannot be used for binding or connecting
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// Send/Recv before a successful Bind/Connect, or after Close
    #[error("portal not ready")]
    NotReady,

    /// Two endpoints with mismatched protocol numbers were wired together
    #[error("{local} incompatible with {remote}")]
    ProtocolIncompatible {
        local: &'static str,
        remote: &'static str,
    },

    /// `free` called more times than `add_ref`
    #[error("unreachable: ref count < 0 ({0})")]
    RefCountUnderflow(i32),

    /// The topic is already part of the subscription set
    #[error("already subscribed to topic")]
    AlreadySubscribed,
}

/// Result type alias for Portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

impl PortalError {
    /// Create an address-in-use error
    pub fn address_in_use(addr: impl Into<String>) -> Self {
        Self::AddressInUse(addr.into())
    }

    /// Create a connection-refused error
    pub fn connection_refused(addr: impl Into<String>) -> Self {
        Self::ConnectionRefused(addr.into())
    }

    /// Check if the caller may retry or pick another address
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AddressInUse(_) | Self::ConnectionRefused(_) | Self::AlreadySubscribed
        )
    }

    /// Check if this error marks corrupted state (raised as a panic)
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolIncompatible { .. } | Self::RefCountUnderflow(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            PortalError::address_in_use("/x").to_string(),
            "address in use: /x"
        );
        assert_eq!(
            PortalError::ProtocolIncompatible {
                local: "push",
                remote: "pub"
            }
            .to_string(),
            "push incompatible with pub"
        );
        assert_eq!(
            PortalError::RefCountUnderflow(-1).to_string(),
            "unreachable: ref count < 0 (-1)"
        );
    }

    #[test]
    fn test_error_classes() {
        assert!(PortalError::connection_refused("/nowhere").is_recoverable());
        assert!(!PortalError::NotReady.is_recoverable());
        assert!(PortalError::RefCountUnderflow(-1).is_fatal());
        assert!(!PortalError::AddressInUse("/x".into()).is_fatal());
    }
}
