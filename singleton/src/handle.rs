//! Checked, copyable views of a held instance.

use crate::error::{Result, SingletonError};
use parking_lot::{
  MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Storage for one created instance.
///
/// Every creation gets its own slot. Releasing empties the slot in place, so
/// handles that still point at it observe the release instead of dangling.
pub(crate) struct Slot<T> {
  generation: u64,
  live: AtomicBool,
  value: RwLock<Option<T>>,
}

impl<T> Slot<T> {
  pub(crate) fn new(generation: u64, value: T) -> Self {
    Self {
      generation,
      live: AtomicBool::new(true),
      value: RwLock::new(Some(value)),
    }
  }

  pub(crate) fn generation(&self) -> u64 {
    self.generation
  }

  /// Takes the instance out of the slot, leaving it empty.
  ///
  /// Waits for outstanding read/write guards first, then runs `detach`
  /// while holding exclusive access. The slot is only emptied if `detach`
  /// returns `true`, so the owner can unlink the slot and release it as one
  /// step. The caller drops the returned value, outside of any lock.
  pub(crate) fn release_with(&self, detach: impl FnOnce() -> bool) -> Option<T> {
    let mut value = match self.value.try_write() {
      Some(value) => value,
      None => {
        tracing::warn!(
          type_name = type_name::<T>(),
          generation = self.generation,
          "waiting for outstanding handle guards before releasing singleton instance"
        );
        self.value.write()
      }
    };
    if !detach() {
      return None;
    }
    self.live.store(false, Ordering::Release);
    value.take()
  }
}

/// A copyable handle to a singleton instance.
///
/// Handles never own the instance: cloning one aliases the same instance and
/// no method on a handle can release it. Only the holder that issued the
/// handle can tear the instance down.
///
/// Access is checked. After the instance has been destroyed, [`valid`] reports
/// `false` and [`read`]/[`write`] return [`SingletonError::Released`]. A handle
/// never starts pointing at a newer instance created after the teardown.
///
/// [`valid`]: Handle::valid
/// [`read`]: Handle::read
/// [`write`]: Handle::write
pub struct Handle<T> {
  slot: Arc<Slot<T>>,
}

impl<T> Handle<T> {
  pub(crate) fn new(slot: Arc<Slot<T>>) -> Self {
    Self { slot }
  }

  /// Returns `true` while the instance this handle refers to is alive.
  pub fn valid(&self) -> bool {
    self.slot.live.load(Ordering::Acquire)
  }

  /// Process-unique number of the instance this handle refers to.
  ///
  /// Two handles with the same generation refer to the same instance.
  pub fn generation(&self) -> u64 {
    self.slot.generation()
  }

  /// Returns `true` if both handles refer to the same instance.
  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    Arc::ptr_eq(&this.slot, &other.slot)
  }

  /// Acquires shared access to the instance.
  ///
  /// The returned guard dereferences to `T`, so members are reached with
  /// `handle.read()?.field`.
  ///
  /// # Errors
  ///
  /// Returns [`SingletonError::Released`] if the instance has been destroyed.
  pub fn read(&self) -> Result<MappedRwLockReadGuard<'_, T>> {
    RwLockReadGuard::try_map(self.slot.value.read(), |value| value.as_ref())
      .map_err(|_| self.released())
  }

  /// Acquires exclusive access to the instance.
  ///
  /// # Errors
  ///
  /// Returns [`SingletonError::Released`] if the instance has been destroyed.
  pub fn write(&self) -> Result<MappedRwLockWriteGuard<'_, T>> {
    RwLockWriteGuard::try_map(self.slot.value.write(), |value| value.as_mut())
      .map_err(|_| self.released())
  }

  fn released(&self) -> SingletonError {
    SingletonError::Released {
      type_name: type_name::<T>(),
    }
  }
}

// Manual impl: cloning a handle must not require `T: Clone`.
impl<T> Clone for Handle<T> {
  fn clone(&self) -> Self {
    Self {
      slot: Arc::clone(&self.slot),
    }
  }
}

impl<T> fmt::Debug for Handle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handle")
      .field("type", &type_name::<T>())
      .field("generation", &self.generation())
      .field("valid", &self.valid())
      .finish()
  }
}
