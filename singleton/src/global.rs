//! The process-wide holder registry and the `Singleton` facade over it.

use crate::error::Result;
use crate::handle::Handle;
use crate::holder::{Holder, HolderState};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::{type_name, Any, TypeId};
use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::Arc;

type ErasedHolder = Arc<dyn Any + Send + Sync>;

// One holder per type, created on first use of that type.
// Holders are cloned out of the map before use so that `T::default()` and
// `Drop for T` never run while a shard lock is held.
static HOLDERS: Lazy<DashMap<TypeId, ErasedHolder>> = Lazy::new(DashMap::new);

fn existing_holder<T: Send + Sync + 'static>() -> Option<Arc<Holder<T>>> {
  let erased = HOLDERS
    .get(&TypeId::of::<T>())
    .map(|entry| Arc::clone(entry.value()))?;
  Some(downcast(erased))
}

fn holder<T: Send + Sync + 'static>() -> Arc<Holder<T>> {
  if let Some(holder) = existing_holder::<T>() {
    return holder;
  }
  let erased = HOLDERS
    .entry(TypeId::of::<T>())
    .or_insert_with(|| {
      tracing::trace!(type_name = type_name::<T>(), "singleton holder registered");
      Arc::new(Holder::<T>::new()) as ErasedHolder
    })
    .value()
    .clone();
  downcast(erased)
}

fn downcast<T: Send + Sync + 'static>(erased: ErasedHolder) -> Arc<Holder<T>> {
  match erased.downcast::<Holder<T>>() {
    Ok(holder) => holder,
    Err(_) => unreachable!(
      "singleton registry entry for `{}` holds a different type",
      type_name::<T>()
    ),
  }
}

/// Process-wide, lazily-created single instance of `T`.
///
/// `Singleton<T>` cannot be constructed; it only names the per-type global
/// state. Give it a shorter name with a type alias:
///
/// ```
/// use fibre_singleton::Singleton;
///
/// #[derive(Default)]
/// struct Settings {
///   verbose: bool,
/// }
///
/// type SettingsSingleton = Singleton<Settings>;
///
/// SettingsSingleton::instance().write().unwrap().verbose = true;
/// assert!(SettingsSingleton::instance().read().unwrap().verbose);
///
/// SettingsSingleton::destroy();
/// assert!(!SettingsSingleton::instance().read().unwrap().verbose);
/// ```
///
/// Every operation delegates to the type's [`Holder`]; see its documentation
/// for the exact semantics.
pub struct Singleton<T> {
  _never: Infallible,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Default + Send + Sync + 'static> Singleton<T> {
  /// Returns the holder backing this type's singleton.
  pub fn holder() -> Arc<Holder<T>> {
    holder::<T>()
  }

  /// Creates the instance if it does not exist yet.
  ///
  /// # Panics
  ///
  /// Panics if the singleton is retired or `T::default()` panics.
  pub fn create() {
    holder::<T>().create()
  }

  /// Fallible form of [`create`](Singleton::create).
  pub fn try_create() -> Result<()> {
    holder::<T>().try_create()
  }

  /// Returns a handle to the instance, creating it first if needed.
  ///
  /// # Panics
  ///
  /// Panics if the singleton is retired or `T::default()` panics.
  pub fn instance() -> Handle<T> {
    holder::<T>().instance()
  }

  /// Fallible form of [`instance`](Singleton::instance).
  pub fn try_instance() -> Result<Handle<T>> {
    holder::<T>().try_instance()
  }

  /// Returns a handle to the instance if one exists, without creating it.
  pub fn get() -> Option<Handle<T>> {
    existing_holder::<T>()?.get()
  }

  /// Releases the instance. A no-op if none exists.
  ///
  /// # Deadlocks
  ///
  /// Waits for guards obtained through the instance's handles to be dropped.
  /// Calling this while the same thread holds such a guard never returns.
  pub fn destroy() {
    if let Some(holder) = existing_holder::<T>() {
      holder.destroy();
    }
  }

  /// Releases the instance and forbids creating another one for the rest of
  /// the process.
  ///
  /// # Deadlocks
  ///
  /// Waits for outstanding handle guards like [`destroy`](Singleton::destroy).
  pub fn retire() {
    holder::<T>().retire()
  }

  /// Returns the lifecycle state of this type's singleton.
  pub fn state() -> HolderState {
    existing_holder::<T>().map_or(HolderState::Empty, |holder| holder.state())
  }
}
