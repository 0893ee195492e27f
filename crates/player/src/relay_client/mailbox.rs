//! Single-slot mailbox for the one outstanding play request.

use std::sync::Mutex;

use tokio::sync::oneshot;

/// Holds at most one waiter. Delivering a value empties the slot, so a reply
/// is handed out at most once.
pub struct Mailbox<T> {
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot if it is empty. Returns the receiving end, or `None` when
    /// a live waiter already occupies the slot.
    pub fn try_set(&self) -> Option<oneshot::Receiver<T>> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Some(rx)
    }

    /// Hand `value` to the waiter and empty the slot. Gives the value back if
    /// nobody is waiting any more.
    pub fn deliver(&self, value: T) -> Result<(), T> {
        let waiter = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        match waiter {
            Some(tx) => tx.send(value),
            None => Err(value),
        }
    }

    /// Empty the slot. Returns whether a waiter was armed.
    pub fn clear(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_once() {
        let mailbox = Mailbox::new();
        let rx = mailbox.try_set().unwrap();
        assert!(mailbox.is_pending());
        assert_eq!(mailbox.deliver(1), Ok(()));
        assert_eq!(mailbox.deliver(2), Err(2));
        assert_eq!(rx.await.unwrap(), 1);
        assert!(!mailbox.is_pending());
    }

    #[test]
    fn second_set_is_refused_while_waiting() {
        let mailbox = Mailbox::<u8>::new();
        let _rx = mailbox.try_set().unwrap();
        assert!(mailbox.try_set().is_none());
    }

    #[test]
    fn abandoned_waiter_frees_the_slot() {
        let mailbox = Mailbox::<u8>::new();
        drop(mailbox.try_set().unwrap());
        assert!(!mailbox.is_pending());
        assert!(mailbox.try_set().is_some());
    }

    #[test]
    fn delivery_to_abandoned_waiter_returns_value() {
        let mailbox = Mailbox::new();
        drop(mailbox.try_set().unwrap());
        assert_eq!(mailbox.deliver("late"), Err("late"));
    }

    #[test]
    fn clear_reports_whether_armed() {
        let mailbox = Mailbox::<u8>::new();
        assert!(!mailbox.clear());
        let _rx = mailbox.try_set().unwrap();
        assert!(mailbox.clear());
        assert_eq!(mailbox.deliver(3), Err(3));
    }
}
