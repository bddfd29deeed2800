//! Re-entrancy counters with scoped release.

use std::cell::Cell;
use std::rc::Rc;

/// A nesting counter. Each [`Counter::enter`] holds one level until the
/// returned guard drops, including on early return.
#[derive(Clone, Debug, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return a guard that decrements on drop.
    #[must_use = "the counter is released as soon as the guard drops"]
    pub fn enter(&self) -> CounterGuard {
        self.0.set(self.0.get() + 1);
        CounterGuard(self.0.clone())
    }

    pub fn depth(&self) -> usize {
        self.0.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.get() > 0
    }
}

/// Releases one level of a [`Counter`] when dropped.
#[derive(Debug)]
pub struct CounterGuard(Rc<Cell<usize>>);

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_guards_release_in_any_order() {
        let counter = Counter::new();
        let outer = counter.enter();
        let inner = counter.enter();
        assert_eq!(counter.depth(), 2);

        drop(outer);
        assert!(counter.is_active());
        drop(inner);
        assert!(!counter.is_active());
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn fails(counter: &Counter) -> Result<(), ()> {
            let _guard = counter.enter();
            Err(())
        }

        let counter = Counter::new();
        assert!(fails(&counter).is_err());
        assert_eq!(counter.depth(), 0);
    }
}
