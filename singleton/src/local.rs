//! Single-threaded singletons for types that are not `Send` or `Sync`.
//!
//! These mirror [`Holder`](crate::Holder), [`Handle`](crate::Handle) and
//! [`Singleton`](crate::Singleton) with `RefCell` and `Rc` in place of locks
//! and `Arc`. Access through a [`LocalHandle`] follows `RefCell` borrow rules
//! and panics on a conflicting borrow instead of blocking.

use crate::core::{next_generation, ConstructionGuard};
use crate::error::{Result, SingletonError};
use crate::holder::HolderState;
use std::any::{type_name, Any, TypeId};
use std::cell::{BorrowMutError, Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

struct LocalSlot<T> {
  generation: u64,
  live: Cell<bool>,
  value: RefCell<Option<T>>,
}

impl<T> LocalSlot<T> {
  /// Takes the instance out of the slot.
  ///
  /// Fails without touching the slot if a handle currently borrows it.
  fn try_take(&self) -> std::result::Result<Option<T>, BorrowMutError> {
    let value = self.value.try_borrow_mut()?.take();
    self.live.set(false);
    Ok(value)
  }
}

enum LocalState<T> {
  Empty,
  Populated(Rc<LocalSlot<T>>),
  Retired,
}

/// A copyable handle to a [`LocalHolder`] instance.
pub struct LocalHandle<T> {
  slot: Rc<LocalSlot<T>>,
}

impl<T> LocalHandle<T> {
  /// Returns `true` while the instance this handle refers to is alive.
  pub fn valid(&self) -> bool {
    self.slot.live.get()
  }

  /// Process-unique number of the instance this handle refers to.
  pub fn generation(&self) -> u64 {
    self.slot.generation
  }

  /// Returns `true` if both handles refer to the same instance.
  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    Rc::ptr_eq(&this.slot, &other.slot)
  }

  /// Borrows the instance.
  ///
  /// # Panics
  ///
  /// Panics if the instance is currently mutably borrowed.
  pub fn read(&self) -> Result<Ref<'_, T>> {
    Ref::filter_map(self.slot.value.borrow(), |value| value.as_ref()).map_err(|_| self.released())
  }

  /// Mutably borrows the instance.
  ///
  /// # Panics
  ///
  /// Panics if the instance is currently borrowed.
  pub fn write(&self) -> Result<RefMut<'_, T>> {
    RefMut::filter_map(self.slot.value.borrow_mut(), |value| value.as_mut())
      .map_err(|_| self.released())
  }

  fn released(&self) -> SingletonError {
    SingletonError::Released {
      type_name: type_name::<T>(),
    }
  }
}

impl<T> Clone for LocalHandle<T> {
  fn clone(&self) -> Self {
    Self {
      slot: Rc::clone(&self.slot),
    }
  }
}

impl<T> fmt::Debug for LocalHandle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LocalHandle")
      .field("type", &type_name::<T>())
      .field("generation", &self.generation())
      .field("valid", &self.valid())
      .finish()
  }
}

/// A single-threaded owner of at most one lazily-created instance of `T`.
///
/// Unlike [`Holder`](crate::Holder), `T` may be `!Send` and `!Sync`.
///
/// Teardown never panics on a live borrow. If a handle still borrows the
/// instance, `destroy` and `retire` leave the holder untouched and log a
/// warning; call them again once the borrow has ended.
pub struct LocalHolder<T> {
  state: RefCell<LocalState<T>>,
}

impl<T> LocalHolder<T> {
  /// Creates a new, empty `LocalHolder`.
  pub fn new() -> Self {
    Self {
      state: RefCell::new(LocalState::Empty),
    }
  }

  /// Returns the current lifecycle state.
  pub fn state(&self) -> HolderState {
    match &*self.state.borrow() {
      LocalState::Empty => HolderState::Empty,
      LocalState::Populated(_) => HolderState::Populated,
      LocalState::Retired => HolderState::Retired,
    }
  }

  /// Returns a handle to the current instance without creating one.
  pub fn get(&self) -> Option<LocalHandle<T>> {
    match &*self.state.borrow() {
      LocalState::Populated(slot) => Some(LocalHandle {
        slot: Rc::clone(slot),
      }),
      LocalState::Empty | LocalState::Retired => None,
    }
  }

  /// Releases the current instance, returning the holder to `Empty`.
  ///
  /// A no-op if there is no instance, the holder is retired, or a handle
  /// currently borrows the instance.
  pub fn destroy(&self) {
    self.release_into(LocalState::Empty, "local singleton instance destroyed");
  }

  /// Releases the current instance and forbids creating another one.
  ///
  /// Like [`destroy`](LocalHolder::destroy), does nothing while a handle
  /// borrows the instance.
  pub fn retire(&self) {
    let mut state = self.state.borrow_mut();
    if let LocalState::Empty = &*state {
      *state = LocalState::Retired;
      tracing::debug!(type_name = type_name::<T>(), "local singleton holder retired");
      return;
    }
    drop(state);
    self.release_into(LocalState::Retired, "local singleton instance retired");
  }

  fn release_into(&self, next: LocalState<T>, message: &'static str) {
    let mut state = self.state.borrow_mut();
    let slot = match &*state {
      LocalState::Populated(slot) => Rc::clone(slot),
      LocalState::Empty | LocalState::Retired => return,
    };
    let value = match slot.try_take() {
      Ok(value) => value,
      Err(_) => {
        tracing::warn!(
          type_name = type_name::<T>(),
          generation = slot.generation,
          "local singleton instance is borrowed through a handle, not releasing it"
        );
        return;
      }
    };
    *state = next;
    drop(state);
    // `T` is dropped with no borrow of the holder outstanding.
    drop(value);
    tracing::debug!(
      type_name = type_name::<T>(),
      generation = slot.generation,
      "{}",
      message
    );
  }

  fn retired(&self) -> SingletonError {
    SingletonError::Retired {
      type_name: type_name::<T>(),
    }
  }
}

impl<T: Default> LocalHolder<T> {
  /// Creates the instance if it does not exist yet.
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

  /// Fallible form of [`create`](LocalHolder::create).
  pub fn try_create(&self) -> Result<()> {
    self.try_instance().map(drop)
  }

  /// Returns a handle to the instance, creating it first if needed.
  ///
  /// # Panics
  ///
  /// Panics if the holder is retired, if `T::default()` panics, or if
  /// `T::default()` re-enters this holder.
  pub fn instance(&self) -> LocalHandle<T> {
    self.try_instance().unwrap_or_else(|err| panic!("{}", err))
  }

  /// Fallible form of [`instance`](LocalHolder::instance).
  ///
  /// # Errors
  ///
  /// Returns [`SingletonError::Retired`] if the holder is retired, including
  /// when it was retired while `T::default()` ran.
  pub fn try_instance(&self) -> Result<LocalHandle<T>> {
    let _guard = ConstructionGuard::new(self as *const Self as usize, type_name::<T>());

    match &*self.state.borrow() {
      LocalState::Populated(slot) => {
        return Ok(LocalHandle {
          slot: Rc::clone(slot),
        })
      }
      LocalState::Retired => return Err(self.retired()),
      LocalState::Empty => {}
    }

    // No borrow is held while `T::default()` runs, so it may retire the holder.
    let value = T::default();

    let mut state = self.state.borrow_mut();
    let settled = match &*state {
      LocalState::Empty => None,
      LocalState::Populated(slot) => Some(Ok(LocalHandle {
        slot: Rc::clone(slot),
      })),
      LocalState::Retired => Some(Err(self.retired())),
    };
    if let Some(outcome) = settled {
      drop(state);
      drop(value);
      return outcome;
    }

    let slot = Rc::new(LocalSlot {
      generation: next_generation(),
      live: Cell::new(true),
      value: RefCell::new(Some(value)),
    });
    tracing::debug!(
      type_name = type_name::<T>(),
      generation = slot.generation,
      "local singleton instance created"
    );
    *state = LocalState::Populated(Rc::clone(&slot));
    Ok(LocalHandle { slot })
  }
}

impl<T> Default for LocalHolder<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Drop for LocalHolder<T> {
  fn drop(&mut self) {
    if let LocalState::Populated(slot) = std::mem::replace(self.state.get_mut(), LocalState::Empty) {
      // A still-borrowed instance is freed with its last handle instead.
      if let Ok(value) = slot.try_take() {
        drop(value);
        tracing::debug!(
          type_name = type_name::<T>(),
          generation = slot.generation,
          "local singleton instance dropped with its holder"
        );
      }
    }
  }
}

impl<T> fmt::Debug for LocalHolder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LocalHolder")
      .field("type", &type_name::<T>())
      .field("state", &self.state())
      .finish()
  }
}

thread_local! {
  static LOCAL_HOLDERS: RefCell<HashMap<TypeId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

fn existing_local_holder<T: 'static>() -> Option<Rc<LocalHolder<T>>> {
  let erased = LOCAL_HOLDERS.with(|holders| holders.borrow().get(&TypeId::of::<T>()).cloned())?;
  Some(downcast(erased))
}

fn local_holder<T: 'static>() -> Rc<LocalHolder<T>> {
  let erased = LOCAL_HOLDERS.with(|holders| {
    Rc::clone(
      holders
        .borrow_mut()
        .entry(TypeId::of::<T>())
        .or_insert_with(|| Rc::new(LocalHolder::<T>::new()) as Rc<dyn Any>),
    )
  });
  downcast(erased)
}

fn downcast<T: 'static>(erased: Rc<dyn Any>) -> Rc<LocalHolder<T>> {
  match erased.downcast::<LocalHolder<T>>() {
    Ok(holder) => holder,
    Err(_) => unreachable!(
      "local singleton registry entry for `{}` holds a different type",
      type_name::<T>()
    ),
  }
}

/// Thread-local, lazily-created single instance of `T`.
///
/// Each thread sees its own instance. Like [`Singleton`](crate::Singleton),
/// this type cannot be constructed and only names per-type state. Every
/// operation delegates to this thread's [`LocalHolder`] for `T`.
pub struct LocalSingleton<T> {
  _never: Infallible,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Default + 'static> LocalSingleton<T> {
  /// Returns this thread's holder for `T`.
  pub fn holder() -> Rc<LocalHolder<T>> {
    local_holder::<T>()
  }

  /// Creates this thread's instance if it does not exist yet.
  ///
  /// # Panics
  ///
  /// Panics if the singleton is retired or `T::default()` panics.
  pub fn create() {
    local_holder::<T>().create()
  }

  /// Fallible form of [`create`](LocalSingleton::create).
  pub fn try_create() -> Result<()> {
    local_holder::<T>().try_create()
  }

  /// Returns a handle to this thread's instance, creating it first if needed.
  ///
  /// # Panics
  ///
  /// Panics if the singleton is retired or `T::default()` panics.
  pub fn instance() -> LocalHandle<T> {
    local_holder::<T>().instance()
  }

  /// Fallible form of [`instance`](LocalSingleton::instance).
  pub fn try_instance() -> Result<LocalHandle<T>> {
    local_holder::<T>().try_instance()
  }

  /// Returns a handle to this thread's instance if one exists.
  pub fn get() -> Option<LocalHandle<T>> {
    existing_local_holder::<T>()?.get()
  }

  /// Releases this thread's instance. A no-op if none exists or it is
  /// currently borrowed.
  pub fn destroy() {
    if let Some(holder) = existing_local_holder::<T>() {
      holder.destroy();
    }
  }

  /// Releases this thread's instance and forbids creating another one on
  /// this thread.
  pub fn retire() {
    local_holder::<T>().retire()
  }

  /// Returns the lifecycle state of this thread's singleton.
  pub fn state() -> HolderState {
    existing_local_holder::<T>().map_or(HolderState::Empty, |holder| holder.state())
  }
}
