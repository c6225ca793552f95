/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Buffered items.
//!
//! An [`Element`] wraps one item together with at most one armed
//! [`Timeout`]. The timeout slot is the only state the timer task ever
//! touches, so firing never needs the engine lock.

use super::timer::{Timeout, TimeoutListener, TimerError};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type TimeoutSlot = Mutex<Option<Arc<Timeout>>>;

/// An item held by the resequencer plus its scheduling state.
pub struct Element<E> {
    /// The buffered item.
    item: E,

    /// Latest timeout armed for this element. Shared weakly with its
    /// listener so firing can clear it.
    timeout: Arc<TimeoutSlot>,
}

impl<E> Element<E> {
    /// Wraps `item` with no timeout armed.
    #[must_use]
    pub fn new(item: E) -> Self {
        Self {
            item,
            timeout: Arc::new(Mutex::new(None)),
        }
    }

    /// The wrapped item.
    #[inline]
    #[must_use]
    pub fn item(&self) -> &E {
        &self.item
    }

    /// Returns `true` while a timeout is armed for this element.
    #[must_use]
    pub fn scheduled(&self) -> bool {
        self.slot().as_ref().is_some_and(|t| t.is_armed())
    }

    /// Arms `timeout` for this element.
    ///
    /// Registers the element as a listener and schedules `timeout`. Only once
    /// it is armed does it replace (and cancel) any previous timeout.
    ///
    /// # Errors
    ///
    /// Propagates [`TimerError`] from [`Timeout::schedule`]; the element keeps
    /// its previous timeout, if any, in that case.
    pub fn schedule(&self, timeout: Arc<Timeout>) -> Result<(), TimerError> {
        timeout.add_listener(Arc::new(ClearOnFire {
            slot: Arc::downgrade(&self.timeout),
        }));
        timeout.schedule()?;

        let previous = self.slot().replace(timeout);
        if let Some(previous) = previous {
            previous.cancel();
        }
        Ok(())
    }

    /// Cancels the armed timeout, if any. The element becomes eligible for
    /// delivery. Calling this again, or after the timeout fired, does nothing.
    pub fn cancel(&self) {
        let armed = self.slot().take();
        if let Some(timeout) = armed {
            timeout.cancel();
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Timeout>>> {
        self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for Element<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("item", &self.item)
            .field("scheduled", &self.scheduled())
            .finish()
    }
}

/// Clears the owning element's slot when its timeout fires.
struct ClearOnFire {
    /// Slot of the element that armed the timeout.
    slot: Weak<TimeoutSlot>,
}

impl TimeoutListener for ClearOnFire {
    fn on_timeout(&self, timeout: &Timeout) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut armed = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if armed
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), timeout))
        {
            *armed = None;
        }
    }
}
