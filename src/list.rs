// SPDX-License-Identifier: Apache-2.0

use core::cell::Cell;
use core::ptr::NonNull;

use crate::record::Timer;

/// An intrusive doubly-linked list of [`Timer`] records.
///
/// Used both for the Active List (kept sorted by ascending remaining time)
/// and for the dispatcher's transient pending-dispatch chain (FIFO, built by
/// repeated `push_back`). A `Timer` is never a member of two `List`s at
/// once, the `next`/`previous` fields it carries are exclusive to whichever
/// list currently holds it.
///
/// # Safety
///
/// Every pointer stored here must reference a `Timer` that outlives its
/// membership in the list; callers uphold this by never dropping a `Timer`
/// while `is_active()` (or, during a dispatch, its pending-chain membership)
/// is true. All methods require the caller to already be holding whatever
/// critical section the surrounding `Scheduler` operation demands.
pub(crate) struct List {
    head: Cell<Option<NonNull<Timer>>>,
    tail: Cell<Option<NonNull<Timer>>>,
}

impl List {
    pub(crate) const fn new() -> Self {
        List {
            head: Cell::new(None),
            tail: Cell::new(None),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    pub(crate) fn head(&self) -> Option<NonNull<Timer>> {
        self.head.get()
    }

    /// # Safety
    /// `timer` must be a valid, linkable `Timer` not currently on any list.
    unsafe fn link_as_only_entry(&self, timer: NonNull<Timer>) {
        unsafe {
            timer.as_ref().next.set(None);
            timer.as_ref().previous.set(None);
        }
        self.head.set(Some(timer));
        self.tail.set(Some(timer));
    }

    /// Inserts `timer` in ascending order of remaining time until expiry at
    /// `now`, breaking ties in favor of timers already present (new entries
    /// with equal remaining time go after existing ones, FIFO among equal
    /// expiries).
    ///
    /// # Safety
    /// `timer` must be a valid, linkable `Timer` not currently on any list,
    /// and `timer.total_counts`/`timer.start_counts` must already be set.
    pub(crate) unsafe fn insert_sorted(&self, timer: NonNull<Timer>, now: u64) {
        let Some(mut curr) = self.head.get() else {
            unsafe { self.link_as_only_entry(timer) };
            return;
        };

        let new_remaining = unsafe { timer.as_ref() }.remaining(now);
        loop {
            let curr_remaining = unsafe { curr.as_ref() }.remaining(now);
            if curr_remaining > new_remaining {
                break;
            }
            match unsafe { curr.as_ref() }.next.get() {
                Some(next) => curr = next,
                None => {
                    // Walked off the tail without finding a later entry:
                    // append.
                    unsafe {
                        curr.as_ref().next.set(Some(timer));
                        timer.as_ref().previous.set(Some(curr));
                        timer.as_ref().next.set(None);
                    }
                    self.tail.set(Some(timer));
                    return;
                }
            }
        }

        // `curr` is the first entry that expires strictly later than
        // `timer`; splice `timer` in before it.
        let prev = unsafe { curr.as_ref() }.previous.get();
        unsafe {
            timer.as_ref().previous.set(prev);
            timer.as_ref().next.set(Some(curr));
            curr.as_ref().previous.set(Some(timer));
        }
        match prev {
            Some(p) => unsafe { p.as_ref().next.set(Some(timer)) },
            None => self.head.set(Some(timer)),
        }
    }

    /// Appends `timer` unconditionally, preserving whatever order the
    /// caller is building (used to move detached-but-pending timers onto
    /// the dispatcher's pending-dispatch chain in Active-List order).
    ///
    /// # Safety
    /// `timer` must be a valid, linkable `Timer` not currently on any list.
    pub(crate) unsafe fn push_back(&self, timer: NonNull<Timer>) {
        match self.tail.get() {
            None => unsafe { self.link_as_only_entry(timer) },
            Some(tail) => {
                unsafe {
                    tail.as_ref().next.set(Some(timer));
                    timer.as_ref().previous.set(Some(tail));
                    timer.as_ref().next.set(None);
                }
                self.tail.set(Some(timer));
            }
        }
    }

    /// Removes `timer` from this list. No-op-safe to call on a detached
    /// node whose links are already `None`, as long as it is not a member
    /// of some *other* list (that would corrupt the other list's links).
    ///
    /// # Safety
    /// `timer` must either be a current member of this list, or fully
    /// detached (both links `None` and not head/tail of this list).
    pub(crate) unsafe fn remove(&self, timer: NonNull<Timer>) {
        let next = unsafe { timer.as_ref() }.next.get();
        let prev = unsafe { timer.as_ref() }.previous.get();

        if self.head.get() == Some(timer) {
            self.head.set(next);
        }
        if self.tail.get() == Some(timer) {
            self.tail.set(prev);
        }
        if let Some(n) = next {
            unsafe { n.as_ref().previous.set(prev) };
        }
        if let Some(p) = prev {
            unsafe { p.as_ref().next.set(next) };
        }

        unsafe {
            timer.as_ref().next.set(None);
            timer.as_ref().previous.set(None);
        }
    }

    /// Detaches and returns the head of the list, or `None` if empty.
    pub(crate) fn pop_front(&self) -> Option<NonNull<Timer>> {
        let head = self.head.get()?;
        unsafe { self.remove(head) };
        Some(head)
    }
}
