//! The `Holder` owner object and its lifecycle operations.

use crate::core::{next_generation, ConstructionGuard};
use crate::error::{Result, SingletonError};
use crate::handle::{Handle, Slot};
use parking_lot::Mutex;
use std::any::type_name;
use std::fmt;
use std::sync::Arc;

/// Observable lifecycle state of a holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolderState {
  /// No instance exists. This is the initial state.
  Empty,
  /// An instance exists and handles to it are valid.
  Populated,
  /// The holder was retired and will never create another instance.
  Retired,
}

enum State<T> {
  Empty,
  Populated(Arc<Slot<T>>),
  Retired,
}

impl<T> State<T> {
  fn kind(&self) -> HolderState {
    match self {
      State::Empty => HolderState::Empty,
      State::Populated(_) => HolderState::Populated,
      State::Retired => HolderState::Retired,
    }
  }
}

/// Owner of at most one lazily-created instance of `T`.
///
/// `Holder` is the explicit, caller-owned form of a singleton: keep it in an
/// application context and pass it to the code that needs it. The global
/// [`Singleton`](crate::Singleton) facade is a per-type registry of holders.
///
/// Creation is guarded by a lock, so concurrent first access constructs the
/// instance exactly once. Dropping the holder releases its instance.
pub struct Holder<T> {
  state: Mutex<State<T>>,
}

impl<T> Holder<T> {
  /// Creates a new, empty `Holder`.
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State::Empty),
    }
  }

  /// Returns the current lifecycle state.
  pub fn state(&self) -> HolderState {
    self.state.lock().kind()
  }

  /// Returns a handle to the current instance without creating one.
  pub fn get(&self) -> Option<Handle<T>> {
    match &*self.state.lock() {
      State::Populated(slot) => Some(Handle::new(Arc::clone(slot))),
      State::Empty | State::Retired => None,
    }
  }

  /// Releases the current instance, returning the holder to `Empty`.
  ///
  /// Does nothing if there is no instance or the holder is retired. Handles
  /// obtained earlier become invalid.
  ///
  /// # Deadlocks
  ///
  /// Waits while a guard obtained through one of this instance's handles is
  /// alive, logging a warning when it has to. The holder stays `Populated`
  /// until the instance is actually released. Calling this while the same
  /// thread holds such a guard never returns.
  pub fn destroy(&self) {
    let slot = match &*self.state.lock() {
      State::Populated(slot) => Arc::clone(slot),
      State::Empty | State::Retired => return,
    };
    // `None` means a concurrent teardown already released this instance.
    if let Some(value) = slot.release_with(|| self.detach(&slot, State::Empty)) {
      drop(value);
      log_release(&slot, "singleton instance destroyed");
    }
  }

  /// Releases the current instance and forbids creating another one.
  ///
  /// After retirement [`create`](Holder::create) and
  /// [`instance`](Holder::instance) panic, their `try_` forms return
  /// [`SingletonError::Retired`], and `destroy` is a no-op.
  ///
  /// # Deadlocks
  ///
  /// Waits for outstanding handle guards like [`destroy`](Holder::destroy).
  pub fn retire(&self) {
    loop {
      let slot = {
        let mut state = self.state.lock();
        match &*state {
          State::Populated(slot) => Arc::clone(slot),
          State::Empty => {
            *state = State::Retired;
            tracing::debug!(type_name = type_name::<T>(), "singleton holder retired");
            return;
          }
          State::Retired => return,
        }
      };
      if let Some(value) = slot.release_with(|| self.detach(&slot, State::Retired)) {
        drop(value);
        log_release(&slot, "singleton instance retired");
        return;
      }
    }
  }

  /// Moves the holder to `next` if `slot` is still its current instance.
  fn detach(&self, slot: &Arc<Slot<T>>, next: State<T>) -> bool {
    let mut state = self.state.lock();
    match &*state {
      State::Populated(current) if Arc::ptr_eq(current, slot) => {
        *state = next;
        true
      }
      _ => false,
    }
  }

  fn key(&self) -> usize {
    self as *const Self as usize
  }

  fn retired(&self) -> SingletonError {
    SingletonError::Retired {
      type_name: type_name::<T>(),
    }
  }
}

impl<T: Default> Holder<T> {
  /// Creates the instance if it does not exist yet.
  ///
  /// Use this to construct the instance at a well-defined point instead of on
  /// first access.
  ///
  /// # Panics
  ///
  /// Panics if the holder is retired, if `T::default()` panics, or if
  /// `T::default()` re-enters this holder.
  pub fn create(&self) {
    if let Err(err) = self.try_create() {
      panic!("{}", err);
    }
  }

  /// Fallible form of [`create`](Holder::create).
  pub fn try_create(&self) -> Result<()> {
    self.try_instance().map(drop)
  }

  /// Returns a handle to the instance, creating it first if needed.
  ///
  /// Repeated calls before a [`destroy`](Holder::destroy) return handles to
  /// the same instance.
  ///
  /// # Panics
  ///
  /// Panics if the holder is retired, if `T::default()` panics, or if
  /// `T::default()` re-enters this holder.
  pub fn instance(&self) -> Handle<T> {
    self.try_instance().unwrap_or_else(|err| panic!("{}", err))
  }

  /// Fallible form of [`instance`](Holder::instance).
  ///
  /// # Errors
  ///
  /// Returns [`SingletonError::Retired`] if the holder is retired.
  pub fn try_instance(&self) -> Result<Handle<T>> {
    // Must be taken before the lock: a recursive call would block on it.
    let _guard = ConstructionGuard::new(self.key(), type_name::<T>());

    let mut state = self.state.lock();
    match &*state {
      State::Populated(slot) => return Ok(Handle::new(Arc::clone(slot))),
      State::Retired => return Err(self.retired()),
      State::Empty => {}
    }

    // A panic here unwinds through the lock and leaves the state `Empty`.
    let value = T::default();
    let slot = Arc::new(Slot::new(next_generation(), value));
    tracing::debug!(
      type_name = type_name::<T>(),
      generation = slot.generation(),
      "singleton instance created"
    );
    *state = State::Populated(Arc::clone(&slot));
    Ok(Handle::new(slot))
  }
}

impl<T> Default for Holder<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Drop for Holder<T> {
  fn drop(&mut self) {
    if let State::Populated(slot) = std::mem::replace(self.state.get_mut(), State::Empty) {
      drop(slot.release_with(|| true));
      log_release(&slot, "singleton instance dropped with its holder");
    }
  }
}

impl<T> fmt::Debug for Holder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Holder")
      .field("type", &type_name::<T>())
      .field("state", &self.state())
      .finish()
  }
}

fn log_release<T>(slot: &Slot<T>, message: &'static str) {
  tracing::debug!(
    type_name = type_name::<T>(),
    generation = slot.generation(),
    "{}",
    message
  );
}
