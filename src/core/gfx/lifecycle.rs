//! Context state machine, event fan-out and the lost-device wait loop.

use log::{debug, info};
use std::fmt;
use std::time::Duration;

/// Default sleep between lost-device polls.
pub const LOST_CONTEXT_POLL: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Active,
    Lost,
    Recreating,
    Freed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextEvent {
    /// The device is gone; GPU objects owned by listeners are invalid.
    ContextLost,
    /// The device is back and the default resources exist again.
    ContextRecreated,
    /// An allocation ran out of video memory and is about to be retried.
    LowVram,
}

type Listener = Box<dyn FnMut(ContextEvent)>;

pub struct Lifecycle {
    state: ContextState,
    listeners: Vec<Listener>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ContextState::Active,
            listeners: Vec::new(),
        }
    }

    #[inline(always)]
    pub const fn state(&self) -> ContextState {
        self.state
    }

    /// True whenever the device must not be touched.
    #[inline(always)]
    pub const fn is_lost(&self) -> bool {
        matches!(self.state, ContextState::Lost | ContextState::Recreating)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(ContextEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn raise(&mut self, event: ContextEvent) {
        debug!("Raising {event:?} to {} listener(s).", self.listeners.len());
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    /// Active -> Lost. Returns `false` if the context was already lost.
    pub fn mark_lost(&mut self, reason: &str) -> bool {
        if self.is_lost() || self.state == ContextState::Freed {
            debug!("Ignoring context loss{reason}: already {:?}.", self.state);
            return false;
        }
        info!("Lost graphics context{reason}");
        self.state = ContextState::Lost;
        true
    }

    /// Lost -> Recreating.
    pub fn begin_recreate(&mut self) {
        info!("Recreating graphics context");
        self.state = ContextState::Recreating;
    }

    /// Recreating (or Lost) -> Active.
    pub fn finish_recreate(&mut self) {
        self.state = ContextState::Active;
    }

    pub fn mark_freed(&mut self) {
        self.state = ContextState::Freed;
        self.listeners.clear();
    }
}

/// Sleeps `interval`, then asks `is_ready`; while it says no, runs `tick` so
/// the host can keep pumping its window, and tries again.
///
/// Returns how many times `tick` ran. There is no timeout: the loop ends only
/// when the device reports it can be reset.
pub fn wait_until_ready<P, T>(mut is_ready: P, mut tick: T, interval: Duration) -> u32
where
    P: FnMut() -> bool,
    T: FnMut(),
{
    let mut ticks = 0;
    loop {
        std::thread::sleep(interval);
        if is_ready() {
            return ticks;
        }
        tick();
        ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextEvent, ContextState, Lifecycle, wait_until_ready};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn loss_is_only_reported_once_until_recreated() {
        let mut lc = Lifecycle::new();
        assert!(lc.mark_lost(" (test)"));
        assert!(!lc.mark_lost(" (again)"), "a second loss should be ignored");
        assert_eq!(lc.state(), ContextState::Lost);

        lc.begin_recreate();
        assert!(lc.is_lost(), "still unusable while recreating");
        lc.finish_recreate();
        assert_eq!(lc.state(), ContextState::Active);
        assert!(lc.mark_lost(""));
    }

    #[test]
    fn listeners_see_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut lc = Lifecycle::new();
        let sink = Rc::clone(&seen);
        lc.subscribe(move |e| sink.borrow_mut().push(e));

        lc.raise(ContextEvent::ContextLost);
        lc.raise(ContextEvent::ContextRecreated);
        assert_eq!(
            *seen.borrow(),
            vec![ContextEvent::ContextLost, ContextEvent::ContextRecreated]
        );
    }

    #[test]
    fn wait_loop_ticks_until_the_device_is_ready() {
        let mut polls = 0;
        let mut ticks = 0;
        let reported = wait_until_ready(
            || {
                polls += 1;
                polls == 4
            },
            || ticks += 1,
            Duration::ZERO,
        );
        assert_eq!(reported, 3);
        assert_eq!(ticks, 3);
    }

    #[test]
    fn freed_context_ignores_loss() {
        let mut lc = Lifecycle::new();
        lc.mark_freed();
        assert!(!lc.mark_lost(""));
        assert_eq!(lc.state(), ContextState::Freed);
    }
}
