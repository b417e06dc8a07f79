// Debug-build check of the lock order: the slot table is never locked by a
// thread that already holds a context lock.

use std::cell::Cell;

thread_local! {
    static HELD_CONTEXTS: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn context_locked() {
    HELD_CONTEXTS.with(|c| c.set(c.get() + 1));
}

pub(crate) fn context_unlocked() {
    HELD_CONTEXTS.with(|c| c.set(c.get().saturating_sub(1)));
}

pub(crate) fn assert_no_context_held() {
    debug_assert_eq!(
        HELD_CONTEXTS.with(Cell::get),
        0,
        "registry lock requested while holding a context lock"
    );
}
