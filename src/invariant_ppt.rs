//! Runtime invariants with contract-test support
//!
//! Production code asserts the scanner's lifecycle invariants through
//! [`assert_invariant!`]. Every assertion is recorded per thread, so a
//! contract test can prove that a code path actually checked the invariants it
//! is supposed to guard.
//!
//! ```rust,ignore
//! use crabscan::invariant_ppt::*;
//!
//! assert_invariant!(
//!     previous.is_none(),
//!     "At most one capture session is live",
//!     "session::acquire"
//! );
//!
//! #[test]
//! fn contract_session_lifecycle() {
//!     // ...drive acquire/release...
//!     contract_test("session lifecycle", &["At most one capture session is live"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread_local;

thread_local! {
    static CHECKED: RefCell<HashMap<String, u64>> = RefCell::new(HashMap::new());
}

/// Assert an invariant and record that it was checked.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__check_invariant($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__check_invariant($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __check_invariant(condition: bool, message: &str, context: Option<&str>) {
    CHECKED.with(|checked| {
        *checked.borrow_mut().entry(message.to_string()).or_insert(0) += 1;
    });

    if !condition {
        panic!(
            "INVARIANT VIOLATION [{}]: {}",
            context.unwrap_or("unknown"),
            message
        );
    }
}

/// How many times `message` was checked on this thread
pub fn times_checked(message: &str) -> u64 {
    CHECKED.with(|checked| checked.borrow().get(message).copied().unwrap_or(0))
}

/// Fail unless every listed invariant was checked on this thread.
///
/// # Panics
/// Panics listing the invariants that were never checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| times_checked(invariant) == 0)
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Forget every recorded check on this thread
pub fn clear_invariant_log() {
    CHECKED.with(|checked| checked.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_are_counted() {
        clear_invariant_log();
        assert_invariant!(true, "counted invariant");
        assert_invariant!(true, "counted invariant", "tests");
        assert_eq!(times_checked("counted invariant"), 2);
        contract_test("counting", &["counted invariant"]);
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_missing_invariant_fails_contract() {
        clear_invariant_log();
        contract_test("missing", &["never asserted"]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [tests]")]
    fn test_violation_panics() {
        assert_invariant!(false, "violated invariant", "tests");
    }
}
