use fibre_singleton::{Holder, Singleton, SingletonError};

#[derive(Default)]
struct Connection {
  queries: Vec<String>,
}

// The application context owns the holder; nothing here touches global state.
struct AppContext {
  connection: Holder<Connection>,
}

// By accepting a `&AppContext`, this can be run against a controlled environment.
fn run_query(ctx: &AppContext, query: &str) -> usize {
  let connection = ctx.connection.instance();
  let mut connection = connection.write().unwrap();
  connection.queries.push(query.to_string());
  connection.queries.len()
}

fn main() {
  println!("--- Running with an owned holder ---");
  let ctx = AppContext {
    connection: Holder::new(),
  };
  run_query(&ctx, "SELECT 1");
  let count = run_query(&ctx, "SELECT 2");
  println!("Queries issued: {}", count);
  assert_eq!(count, 2);

  // The owned holder is isolated from the global singleton.
  assert!(Singleton::<Connection>::get().is_none());
  println!("Verified that the owned holder is isolated from the global one.");

  // --- Shutdown: retire so that late callers fail loudly ---
  let late = ctx.connection.instance();
  ctx.connection.retire();
  match ctx.connection.try_instance() {
    Err(SingletonError::Retired { type_name }) => println!("Refused to recreate `{}`", type_name),
    _ => panic!("A retired holder should not create an instance!"),
  }
  assert!(!late.valid());
}
