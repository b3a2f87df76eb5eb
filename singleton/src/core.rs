//! Core, non-public machinery shared by the thread-safe and local holders.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
  // Holders whose instance is currently being constructed on this thread.
  // Re-entering one of them from inside `T::default()` would otherwise
  // deadlock on the holder lock (or double-borrow the local holder).
  static CONSTRUCTING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

// Generation 0 is never handed out.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Returns a process-unique number for a freshly created instance.
pub(crate) fn next_generation() -> u64 {
  NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// An RAII guard that detects recursive construction of a singleton.
///
/// When created, it records the holder's address in a thread-local set.
/// If the address is already present, the holder is being entered from its
/// own `T::default()` and the guard panics. Dropping the guard removes the
/// address again, including during unwinding.
pub(crate) struct ConstructionGuard {
  key: usize,
}

impl ConstructionGuard {
  pub(crate) fn new(key: usize, type_name: &'static str) -> Self {
    CONSTRUCTING.with(|constructing| {
      let mut constructing = constructing.borrow_mut();
      if !constructing.insert(key) {
        panic!(
          "Recursive construction detected while creating singleton: {}",
          type_name
        );
      }
    });
    Self { key }
  }
}

impl Drop for ConstructionGuard {
  fn drop(&mut self) {
    CONSTRUCTING.with(|constructing| {
      constructing.borrow_mut().remove(&self.key);
    });
  }
}
