//! Process-wide session identifier (spec §3, §4.9): set-once, injected into
//! every subsequent reasoning request.

use once_cell::sync::OnceCell;

/// Set-once session id issued by the reasoning service on first contact.
///
/// Subsequent calls to [`Session::set`] after the first are ignored, matching
/// "`session` is set-once; subsequent sets are ignored."
#[derive(Debug, Default)]
pub struct Session {
    id: OnceCell<String>,
}

impl Session {
    pub fn new() -> Self {
        Self { id: OnceCell::new() }
    }

    /// Sets the session id if unset. Returns `true` if this call was the one
    /// that set it, `false` if a session id was already present.
    pub fn set(&self, id: impl Into<String>) -> bool {
        self.id.set(id.into()).is_ok()
    }

    /// Returns the session id, if any contact has happened yet.
    pub fn get(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_once_ignores_subsequent_sets() {
        let session = Session::new();
        assert!(session.get().is_none());
        assert!(session.set("first"));
        assert!(!session.set("second"));
        assert_eq!(session.get(), Some("first"));
    }
}
