//! # Fibre Singleton
//!
//! Lazily-initialized, single-instance holders with explicit teardown.
//!
//! Fibre Singleton gives a program exactly one shared instance of a type. The
//! instance is created on first access (or eagerly with `create()`), handed out
//! through copyable [`Handle`]s that cannot destroy it, and released explicitly
//! with `destroy()`.
//!
//! ## Core Concepts
//!
//! - **Singleton**: [`Singleton<T>`] names the process-wide instance of `T`.
//!   It is never constructed; its associated functions operate on global state.
//! - **Holder**: [`Holder<T>`] is the same lifecycle as an owned value, for code
//!   that prefers passing ownership explicitly over global state.
//! - **Handle**: a non-owning view. Access is checked: once the instance is
//!   destroyed, every handle to it reports [`SingletonError::Released`].
//! - **Teardown**: `destroy()` returns the holder to empty and a later access
//!   creates a fresh instance. `retire()` tears down for good.
//!
//! All holders are thread-safe: concurrent first access constructs the instance
//! exactly once. The `local` feature adds [`LocalSingleton`], [`LocalHolder`]
//! and [`LocalHandle`] for types that are not `Send` or `Sync`.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_singleton::{Handle, Singleton};
//!
//! #[derive(Default)]
//! struct Counter {
//!   hits: u64,
//! }
//!
//! type CounterSingleton = Singleton<Counter>;
//!
//! fn main() {
//!   // Created on first access.
//!   let counter = CounterSingleton::instance();
//!   counter.write().unwrap().hits += 1;
//!
//!   // Every access yields the same instance.
//!   let again = CounterSingleton::instance();
//!   assert!(Handle::ptr_eq(&counter, &again));
//!   assert_eq!(again.read().unwrap().hits, 1);
//!
//!   // Explicit teardown invalidates outstanding handles.
//!   CounterSingleton::destroy();
//!   assert!(!counter.valid());
//!   assert!(counter.read().is_err());
//!
//!   // The next access creates a fresh instance.
//!   assert_eq!(CounterSingleton::instance().read().unwrap().hits, 0);
//! }
//! ```

mod core;
mod error;
mod global;
mod handle;
mod holder;
#[cfg(feature = "local")]
mod local;

pub use error::{Result, SingletonError};
pub use global::Singleton;
pub use handle::Handle;
pub use holder::{Holder, HolderState};
#[cfg(feature = "local")]
pub use local::{LocalHandle, LocalHolder, LocalSingleton};
