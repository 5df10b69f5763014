//! World-state flags that gate which templates may run.

use std::collections::BTreeSet;

/// Set of unlocked keys.
///
/// Pure set semantics. The manager owns the only instance and serializes access.
#[derive(Debug, Clone, Default)]
pub struct UnlockLedger {
    unlocked: BTreeSet<String>,
}

impl UnlockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unlocked: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unlock<S: AsRef<str>>(&mut self, keys: &[S]) {
        for key in keys {
            self.unlocked.insert(key.as_ref().to_string());
        }
    }

    pub fn lock<S: AsRef<str>>(&mut self, keys: &[S]) {
        for key in keys {
            self.unlocked.remove(key.as_ref());
        }
    }

    pub fn is_unlocked(&self, key: &str) -> bool {
        self.unlocked.contains(key)
    }

    /// True when every key is unlocked. Vacuously true for an empty list.
    pub fn are_all_keys_unlocked<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().all(|k| self.unlocked.contains(k.as_ref()))
    }

    /// True when any of the blocking keys is present in the ledger.
    /// Vacuously false for an empty list.
    pub fn are_any_keys_locked<S: AsRef<str>>(&self, blocking_keys: &[S]) -> bool {
        blocking_keys
            .iter()
            .any(|k| self.unlocked.contains(k.as_ref()))
    }

    pub fn unlocked_keys(&self) -> Vec<String> {
        self.unlocked.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    #[test]
    fn empty_lists_are_vacuous() {
        let ledger = UnlockLedger::new();
        assert!(ledger.are_all_keys_unlocked(&NONE));
        assert!(!ledger.are_any_keys_locked(&NONE));
    }

    #[test]
    fn unlock_then_lock() {
        let mut ledger = UnlockLedger::new();
        ledger.unlock(&["ACT1", "ACT1+"]);
        assert!(ledger.are_all_keys_unlocked(&["ACT1", "ACT1+"]));
        assert!(ledger.are_any_keys_locked(&["ACT1+", "ACT2"]));

        ledger.lock(&["ACT1+"]);
        assert!(!ledger.are_all_keys_unlocked(&["ACT1", "ACT1+"]));
        assert!(!ledger.are_any_keys_locked(&["ACT1+", "ACT2"]));
        assert_eq!(ledger.unlocked_keys(), vec!["ACT1".to_string()]);
    }

    #[test]
    fn locking_missing_key_is_harmless() {
        let mut ledger = UnlockLedger::with_keys(["a"]);
        ledger.lock(&["zzz"]);
        assert!(ledger.is_unlocked("a"));
    }
}
