// Reference counts over pointer keys, maintained on explicit
// assignment.
//
// The counter is assignment-oriented, not liveness-accurate: it sees
// bindings made through `id` and `alloc`, never pointers stored into
// heap cells, so cyclic heap graphs are beyond its reach and must be
// freed explicitly.

use std::collections::HashMap;

use crate::heap::Heap;
use crate::value::{Key, Value};


#[derive(Debug, Default)]
pub struct RefCounter {
    counts: HashMap<Key, u64>,
}


impl RefCounter {
    pub fn new() -> RefCounter {
        RefCounter::default()
    }

    // A pointer is being bound over `old`, the destination's previous
    // value. The displaced pointer loses a reference, and at zero its
    // allocation goes away. The new key gains one. Untracked old keys
    // are ignored; they were bound through a path the counter does
    // not watch.
    pub fn assign(&mut self, old: Option<&Value>, new: &Key, heap: &mut Heap) {
        if let Some(Value::Ptr(p)) = old {
            if let Some(count) = self.counts.get_mut(&p.key) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&p.key);
                    heap.release(p.key.base);
                }
            }
        }
        *self.counts.entry(new.clone()).or_insert(0) += 1;
    }

    // The program freed this key itself; stop tracking it.
    pub fn forget(&mut self, key: &Key) {
        self.counts.remove(key);
    }

    // Release every allocation still tracked. Keys may alias a base
    // that an earlier key already released.
    pub fn sweep(&mut self, heap: &mut Heap) {
        for (key, _) in self.counts.drain() {
            heap.release(key.base);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Pointer;
    use crate::program::Type;

    fn ptr(key: &Key) -> Value {
        Value::Ptr(Pointer { key: key.clone(), ty: Type::Int })
    }

    #[test]
    fn test_rebinding_frees_at_zero() {
        let mut heap = Heap::new();
        let mut gc = RefCounter::new();

        let a = heap.alloc(1).unwrap();
        let b = heap.alloc(1).unwrap();
        gc.assign(None, &a, &mut heap);
        gc.assign(None, &b, &mut heap);

        // The only reference to `a` is displaced by `b`.
        gc.assign(Some(&ptr(&a)), &b, &mut heap);
        assert_eq!(heap.read(&a), Err(crate::error::Error::BadAccess(0, 0)));
        assert!(heap.read(&b).is_ok());
    }

    #[test]
    fn test_second_reference_keeps_allocation() {
        let mut heap = Heap::new();
        let mut gc = RefCounter::new();

        let a = heap.alloc(1).unwrap();
        let b = heap.alloc(1).unwrap();
        gc.assign(None, &a, &mut heap);
        gc.assign(None, &a, &mut heap);

        // Dropping one of two references frees nothing.
        gc.assign(Some(&ptr(&a)), &b, &mut heap);
        assert!(heap.read(&a).is_ok());
    }

    #[test]
    fn test_untracked_old_value_is_ignored() {
        let mut heap = Heap::new();
        let mut gc = RefCounter::new();

        let a = heap.alloc(1).unwrap();
        let b = heap.alloc(1).unwrap();
        gc.assign(Some(&ptr(&a)), &b, &mut heap);
        assert!(heap.read(&a).is_ok());
    }

    #[test]
    fn test_sweep_handles_aliases() {
        let mut heap = Heap::new();
        let mut gc = RefCounter::new();

        let a = heap.alloc(2).unwrap();
        gc.assign(None, &a, &mut heap);
        gc.assign(None, &a.add(1), &mut heap);

        gc.sweep(&mut heap);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_forget() {
        let mut heap = Heap::new();
        let mut gc = RefCounter::new();

        let a = heap.alloc(1).unwrap();
        gc.assign(None, &a, &mut heap);
        heap.free(&a).unwrap();
        gc.forget(&a);

        // A sweep after an explicit free releases nothing twice.
        gc.sweep(&mut heap);
        assert!(heap.is_empty());
    }
}
