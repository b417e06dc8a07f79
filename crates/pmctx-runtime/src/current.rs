//! Per-thread current context.
//!
//! Each thread remembers, per registry, the handle it last created or
//! selected and the slot that backed it at the time.

use pmctx_types::ContextHandle;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Current {
    pub handle: ContextHandle,
    pub slot: usize,
}

thread_local! {
    static CURRENT: RefCell<HashMap<u64, Current>> = RefCell::new(HashMap::new());
}

pub(crate) fn get(registry: u64) -> Option<Current> {
    CURRENT.with(|c| c.borrow().get(&registry).copied())
}

/// Set (or clear) the current context, returning the previous one.
pub(crate) fn replace(registry: u64, current: Option<Current>) -> Option<Current> {
    CURRENT.with(|c| {
        let mut map = c.borrow_mut();
        match current {
            Some(cur) => map.insert(registry, cur),
            None => map.remove(&registry),
        }
    })
}

/// Clear the current context if it is `handle`.
pub(crate) fn clear_if(registry: u64, handle: ContextHandle) {
    CURRENT.with(|c| {
        let mut map = c.borrow_mut();
        if map.get(&registry).is_some_and(|cur| cur.handle == handle) {
            map.remove(&registry);
        }
    });
}
