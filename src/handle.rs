//! Symbol handle lifecycle
//!
//! A symbol handle binds a PLC variable name to an opaque 32-bit value for
//! the lifetime of one connection. The life cycle is strictly
//! `Unresolved -> Resolved -> Released`; handles never survive a TCP
//! session, so every reconnect starts over from `Unresolved`.

use crate::error::{AdsError, AdsResult};

/// Resolution state of one symbol handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Name not yet resolved on the current connection
    Unresolved,
    /// Bound to a remote handle slot
    Resolved(u32),
    /// Released back to the remote; no longer usable
    Released,
}

/// A named symbol handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolHandle {
    name: String,
    state: HandleState,
}

impl SymbolHandle {
    /// Create an unresolved handle for a variable name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: HandleState::Unresolved,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, HandleState::Resolved(_))
    }

    /// Bind the remote handle value. Only legal once per connection.
    pub fn resolve(&mut self, raw: u32) -> AdsResult<()> {
        match self.state {
            HandleState::Unresolved => {
                self.state = HandleState::Resolved(raw);
                Ok(())
            }
            HandleState::Resolved(_) => Err(AdsError::protocol(format!(
                "symbol '{}' is already resolved",
                self.name
            ))),
            HandleState::Released => Err(AdsError::protocol(format!(
                "symbol '{}' was released and must be re-created",
                self.name
            ))),
        }
    }

    /// The raw handle value; an error unless resolved
    pub fn value(&self) -> AdsResult<u32> {
        match self.state {
            HandleState::Resolved(raw) => Ok(raw),
            HandleState::Unresolved => Err(AdsError::protocol(format!(
                "symbol '{}' is not resolved",
                self.name
            ))),
            HandleState::Released => Err(AdsError::protocol(format!(
                "symbol '{}' was already released",
                self.name
            ))),
        }
    }

    /// Mark the handle released. Idempotent; an unresolved handle may also
    /// be marked released during teardown.
    pub fn mark_released(&mut self) {
        self.state = HandleState::Released;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut handle = SymbolHandle::new("MAIN.counter");
        assert_eq!(handle.state(), HandleState::Unresolved);
        assert!(handle.value().is_err());

        handle.resolve(0x8000_0001).unwrap();
        assert!(handle.is_resolved());
        assert_eq!(handle.value().unwrap(), 0x8000_0001);

        handle.mark_released();
        assert_eq!(handle.state(), HandleState::Released);
        assert!(handle.value().is_err());
    }

    #[test]
    fn test_double_resolve_rejected() {
        let mut handle = SymbolHandle::new("MAIN.counter");
        handle.resolve(1).unwrap();
        assert!(handle.resolve(2).is_err());
        // First binding is untouched
        assert_eq!(handle.value().unwrap(), 1);
    }

    #[test]
    fn test_released_handle_cannot_resolve() {
        let mut handle = SymbolHandle::new("MAIN.counter");
        handle.mark_released();
        assert!(handle.resolve(1).is_err());
    }
}
