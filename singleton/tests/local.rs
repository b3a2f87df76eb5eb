use fibre_singleton::{HolderState, LocalHandle, LocalHolder, LocalSingleton, SingletonError};
use std::cell::Cell;
use std::panic;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

#[test]
fn test_local_singleton_returns_same_instance() {
  #[derive(Default)]
  struct Scratch {
    bytes: Vec<u8>,
  }

  let h1 = LocalSingleton::<Scratch>::instance();
  h1.write().unwrap().bytes.push(1);
  let h2 = LocalSingleton::<Scratch>::instance();

  assert!(LocalHandle::ptr_eq(&h1, &h2));
  assert_eq!(h2.read().unwrap().bytes, vec![1]);
}

#[test]
fn test_local_destroy_and_recreate() {
  #[derive(Default)]
  struct Frame {
    index: u32,
  }

  let old = LocalSingleton::<Frame>::instance();
  old.write().unwrap().index = 9;

  LocalSingleton::<Frame>::destroy();
  LocalSingleton::<Frame>::destroy();

  assert!(!old.valid());
  assert!(matches!(old.read(), Err(SingletonError::Released { .. })));

  let fresh = LocalSingleton::<Frame>::instance();
  assert!(!LocalHandle::ptr_eq(&old, &fresh));
  assert_ne!(old.generation(), fresh.generation());
  assert_eq!(fresh.read().unwrap().index, 0);
}

#[test]
fn test_local_destroy_on_never_created_type() {
  #[derive(Default)]
  struct Untouched;

  LocalSingleton::<Untouched>::destroy();
  assert_eq!(LocalSingleton::<Untouched>::state(), HolderState::Empty);
  assert!(LocalSingleton::<Untouched>::get().is_none());
}

#[test]
fn test_local_singleton_handles_not_send_sync_types() {
  // `Rc<Cell<i32>>` is neither `Send` nor `Sync`, which `Singleton` rejects.
  #[derive(Default)]
  struct NotSendSync {
    shared: Rc<Cell<i32>>,
  }

  let a = LocalSingleton::<NotSendSync>::instance();
  let b = LocalSingleton::<NotSendSync>::instance();
  a.read().unwrap().shared.set(5);

  assert_eq!(b.read().unwrap().shared.get(), 5);
  assert!(Rc::ptr_eq(&a.read().unwrap().shared, &b.read().unwrap().shared));
}

#[test]
fn test_local_singleton_is_per_thread() {
  #[derive(Default)]
  struct PerThread {
    value: u32,
  }

  LocalSingleton::<PerThread>::instance().write().unwrap().value = 1;

  let seen_elsewhere = thread::spawn(|| LocalSingleton::<PerThread>::instance().read().unwrap().value)
    .join()
    .unwrap();

  assert_eq!(seen_elsewhere, 0);
  assert_eq!(LocalSingleton::<PerThread>::instance().read().unwrap().value, 1);
}

#[test]
fn test_local_retire() {
  #[derive(Default)]
  struct Closed;

  let holder = LocalHolder::<Closed>::new();
  let handle = holder.instance();

  holder.retire();

  assert!(!handle.valid());
  assert_eq!(holder.state(), HolderState::Retired);
  assert!(matches!(holder.try_instance(), Err(SingletonError::Retired { .. })));
  holder.destroy();
  assert_eq!(holder.state(), HolderState::Retired);
}

#[test]
#[should_panic(expected = "Recursive construction detected")]
fn test_local_recursive_construction_panics() {
  struct SelfReferential;
  impl Default for SelfReferential {
    fn default() -> Self {
      LocalSingleton::<SelfReferential>::create();
      SelfReferential
    }
  }

  LocalSingleton::<SelfReferential>::create();
}

#[test]
fn test_local_holder_drop_releases_instance() {
  let drops = Rc::new(Cell::new(0));

  struct Guarded(Option<Rc<Cell<i32>>>);
  impl Default for Guarded {
    fn default() -> Self {
      Guarded(None)
    }
  }
  impl Drop for Guarded {
    fn drop(&mut self) {
      if let Some(drops) = &self.0 {
        drops.set(drops.get() + 1);
      }
    }
  }

  let holder = LocalHolder::<Guarded>::default();
  let handle = holder.instance();
  handle.write().unwrap().0 = Some(Rc::clone(&drops));

  drop(holder);

  assert_eq!(drops.get(), 1);
  assert!(!handle.valid());
}

#[test]
fn test_local_create_is_idempotent() {
  #[derive(Default)]
  struct Warmup;

  LocalSingleton::<Warmup>::create();
  let first = LocalSingleton::<Warmup>::get().expect("create() should populate the holder");

  LocalSingleton::<Warmup>::create();
  let second = LocalSingleton::<Warmup>::instance();

  assert!(LocalHandle::ptr_eq(&first, &second));
  assert_eq!(LocalSingleton::<Warmup>::state(), HolderState::Populated);
}

#[test]
fn test_local_destroy_drops_instance_exactly_once() {
  static DROP_COUNTER: AtomicUsize = AtomicUsize::new(0);

  #[derive(Default)]
  struct Texture;
  impl Drop for Texture {
    fn drop(&mut self) {
      DROP_COUNTER.fetch_add(1, Ordering::SeqCst);
    }
  }

  let holder = LocalHolder::<Texture>::new();
  let _handle = holder.instance();

  holder.destroy();
  holder.destroy();
  assert_eq!(DROP_COUNTER.load(Ordering::SeqCst), 1);
  assert_eq!(holder.state(), HolderState::Empty);

  drop(holder);
  assert_eq!(DROP_COUNTER.load(Ordering::SeqCst), 1);
}

#[test]
fn test_local_panicking_default_leaves_holder_empty() {
  static SHOULD_FAIL: AtomicBool = AtomicBool::new(true);

  struct Flaky {
    ready: bool,
  }
  impl Default for Flaky {
    fn default() -> Self {
      if SHOULD_FAIL.load(Ordering::SeqCst) {
        panic!("Flaky construction failed");
      }
      Flaky { ready: true }
    }
  }

  let result = panic::catch_unwind(|| LocalSingleton::<Flaky>::instance());

  assert!(result.is_err());
  assert_eq!(LocalSingleton::<Flaky>::state(), HolderState::Empty);

  SHOULD_FAIL.store(false, Ordering::SeqCst);
  let flaky = LocalSingleton::<Flaky>::instance();
  assert!(flaky.read().unwrap().ready);
}

#[test]
fn test_local_destroy_while_borrowed_keeps_instance() {
  static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

  struct Pinned {
    value: u32,
  }
  impl Default for Pinned {
    fn default() -> Self {
      CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
      Pinned { value: 0 }
    }
  }

  // Arrange
  let holder = LocalHolder::<Pinned>::new();
  let handle = holder.instance();
  handle.write().unwrap().value = 11;
  let borrow = handle.read().unwrap();

  // Act: teardown is refused while the instance is borrowed.
  holder.destroy();
  holder.retire();

  // Assert
  assert_eq!(borrow.value, 11);
  drop(borrow);
  assert_eq!(holder.state(), HolderState::Populated);
  assert!(handle.valid());
  assert_eq!(handle.read().unwrap().value, 11);
  assert!(LocalHandle::ptr_eq(&handle, &holder.instance()));
  assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);

  // Once the borrow has ended, teardown goes through.
  holder.destroy();
  assert_eq!(holder.state(), HolderState::Empty);
  assert!(!handle.valid());
  assert!(handle.read().is_err());
}

#[test]
fn test_local_holder_drop_while_borrowed() {
  #[derive(Default)]
  struct Kept {
    label: String,
  }

  let holder = LocalHolder::<Kept>::new();
  let handle = holder.instance();
  handle.write().unwrap().label = "still here".to_string();

  {
    let borrow = handle.read().unwrap();
    drop(holder);
    assert_eq!(borrow.label, "still here");
  }
}

#[test]
fn test_local_retire_during_construction_is_kept() {
  struct Retiring;
  impl Default for Retiring {
    fn default() -> Self {
      LocalSingleton::<Retiring>::retire();
      Retiring
    }
  }

  let result = LocalSingleton::<Retiring>::try_instance();

  assert!(matches!(result, Err(SingletonError::Retired { .. })));
  assert_eq!(LocalSingleton::<Retiring>::state(), HolderState::Retired);
  assert!(LocalSingleton::<Retiring>::get().is_none());
}
