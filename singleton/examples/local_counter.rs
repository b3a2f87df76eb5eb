use fibre_singleton::LocalSingleton;
use std::rc::Rc;

// `Rc` makes this type `!Send`, so only the local variant can hold it.
#[derive(Default)]
struct Interner {
  strings: Vec<Rc<str>>,
}

impl Interner {
  fn intern(&mut self, s: &str) -> Rc<str> {
    if let Some(existing) = self.strings.iter().find(|known| &***known == s) {
      return Rc::clone(existing);
    }
    let interned: Rc<str> = Rc::from(s);
    self.strings.push(Rc::clone(&interned));
    interned
  }
}

fn intern(s: &str) -> Rc<str> {
  LocalSingleton::<Interner>::instance().write().unwrap().intern(s)
}

fn main() {
  let a = intern("fibre");
  let b = intern("fibre");
  let c = intern("singleton");

  assert!(Rc::ptr_eq(&a, &b));
  assert!(!Rc::ptr_eq(&a, &c));
  println!(
    "Interned {} distinct strings",
    LocalSingleton::<Interner>::instance().read().unwrap().strings.len()
  );

  LocalSingleton::<Interner>::destroy();
}
