//! Region-owned query-text storage.
//!
//! Store entries never own their query text; they hold a [`TextHandle`]
//! into the region's arena. Handles are non-zero and stable for the life of
//! the allocation, so the checkpoint codec can use zero as "absent" and a
//! freed or fabricated handle is detectable as corruption.

use std::sync::Arc;

use parking_lot::Mutex;

use plantrack_core::error::{Error, Result};

/// Stable reference to an arena allocation. Zero is never a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextHandle(u64);

impl TextHandle {
    pub const INVALID: TextHandle = TextHandle(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

#[derive(Default)]
struct Slots {
    texts: Vec<Option<Arc<str>>>,
    free: Vec<usize>,
}

/// Append-mostly text arena with explicit free for the reset path.
#[derive(Default)]
pub struct TextArena {
    slots: Mutex<Slots>,
}

impl TextArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `text` and return its handle.
    pub fn alloc(&self, text: &str) -> TextHandle {
        let mut slots = self.slots.lock();
        let value: Arc<str> = Arc::from(text);
        let index = match slots.free.pop() {
            Some(index) => {
                slots.texts[index] = Some(value);
                index
            }
            None => {
                slots.texts.push(Some(value));
                slots.texts.len() - 1
            }
        };
        // Bias by one so the zero handle stays invalid.
        TextHandle(index as u64 + 1)
    }

    /// Resolve a handle to its text. Cheap; the returned `Arc` stays valid
    /// after the entry that held the handle is gone.
    pub fn resolve(&self, handle: TextHandle) -> Result<Arc<str>> {
        let slots = self.slots.lock();
        self.slot(&slots, handle)?
            .clone()
            .ok_or_else(|| dangling(handle))
    }

    /// Release an allocation. The handle must be live.
    pub fn free(&self, handle: TextHandle) -> Result<()> {
        let mut slots = self.slots.lock();
        if self.slot(&slots, handle)?.is_none() {
            return Err(dangling(handle));
        }
        let index = (handle.raw() - 1) as usize;
        slots.texts[index] = None;
        slots.free.push(index);
        Ok(())
    }

    /// Number of live allocations; used by status and leak checks.
    pub fn live_allocations(&self) -> usize {
        let slots = self.slots.lock();
        slots.texts.len() - slots.free.len()
    }

    fn slot<'a>(&self, slots: &'a Slots, handle: TextHandle) -> Result<&'a Option<Arc<str>>> {
        if !handle.is_valid() {
            return Err(dangling(handle));
        }
        slots
            .texts
            .get((handle.raw() - 1) as usize)
            .ok_or_else(|| dangling(handle))
    }
}

fn dangling(handle: TextHandle) -> Error {
    Error::Corruption(format!(
        "dangling query-text handle {} in shared arena",
        handle.raw()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_resolve_free() {
        let arena = TextArena::new();
        let h1 = arena.alloc("SELECT 1");
        let h2 = arena.alloc("SELECT 2");
        assert!(h1.is_valid() && h2.is_valid());
        assert_ne!(h1, h2);

        assert_eq!(&*arena.resolve(h1).unwrap(), "SELECT 1");
        assert_eq!(&*arena.resolve(h2).unwrap(), "SELECT 2");
        assert_eq!(arena.live_allocations(), 2);

        arena.free(h1).unwrap();
        assert_eq!(arena.live_allocations(), 1);
        assert!(matches!(arena.resolve(h1), Err(Error::Corruption(_))));
        assert!(matches!(arena.free(h1), Err(Error::Corruption(_))));
    }

    #[test]
    fn freed_slots_are_reused() {
        let arena = TextArena::new();
        let h1 = arena.alloc("a");
        arena.free(h1).unwrap();
        let h2 = arena.alloc("b");
        assert_eq!(h1, h2);
        assert_eq!(&*arena.resolve(h2).unwrap(), "b");
    }

    #[test]
    fn invalid_handles_are_corruption() {
        let arena = TextArena::new();
        assert!(matches!(
            arena.resolve(TextHandle::INVALID),
            Err(Error::Corruption(_))
        ));
        assert!(matches!(
            arena.resolve(TextHandle::from_raw(99)),
            Err(Error::Corruption(_))
        ));
    }
}
