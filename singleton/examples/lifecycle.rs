use fibre_singleton::{Handle, HolderState, Singleton};
use std::sync::atomic::{AtomicUsize, Ordering};

// A service that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
  requests: u64,
}

static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl Default for RequestTracker {
  fn default() -> Self {
    println!("Creating RequestTracker...");
    RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
      requests: 0,
    }
  }
}

type Tracker = Singleton<RequestTracker>;

fn handle_request() {
  Tracker::instance().write().unwrap().requests += 1;
}

fn main() {
  assert_eq!(Tracker::state(), HolderState::Empty);

  // --- Eager creation at a well-defined point ---
  Tracker::create();
  let first = Tracker::instance();
  println!("Tracker ID after create(): {}", first.read().unwrap().id);

  for _ in 0..3 {
    handle_request();
  }
  let again = Tracker::instance();
  assert!(Handle::ptr_eq(&first, &again), "Handles should alias one instance");
  println!("Requests seen: {}", again.read().unwrap().requests);
  assert_eq!(again.read().unwrap().requests, 3);

  // --- Teardown ---
  Tracker::destroy();
  assert!(!first.valid());
  match first.read() {
    Ok(_) => panic!("A destroyed instance should not be readable!"),
    Err(err) => println!("Stale handle rejected: {}", err),
  }

  // --- Lazy re-creation on next access ---
  let second = Tracker::instance();
  {
    let tracker = second.read().unwrap();
    println!(
      "Tracker ID after re-creation: {} (requests: {})",
      tracker.id, tracker.requests
    );
    assert_eq!(tracker.id, 1);
    assert_eq!(tracker.requests, 0);
  }

  Tracker::destroy();
}
