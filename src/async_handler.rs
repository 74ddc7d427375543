//! Asynchronous notification, the modern way: rather than delivering a
//! Unix signal into application code at an arbitrary point (the original
//! ALSA async handler), a [`Dispatcher`] collects every handle's poll
//! descriptor and the callback that should run when it is ready, and the
//! application calls [`Dispatcher::dispatch`] from wherever it already
//! pumps events (an event loop, a dedicated audio thread's main loop).
//! Grounded in `poll.rs`'s `poll_all` shape, generalised from "return the
//! ready descriptors" to "run the registered callback for each of them".

use crate::backend::PollDescriptor;
use crate::poll::{poll, PollFlags};
use crate::Result;
use libc::pollfd;

struct Registration {
    descriptor: PollDescriptor,
    callback: Box<dyn FnMut() + Send>,
}

/// A set of handles' poll descriptors plus the callback to run when each
/// becomes ready.
#[derive(Default)]
pub struct Dispatcher {
    registrations: Vec<Registration>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher { registrations: Vec::new() }
    }

    /// Register `callback` to run whenever `descriptor` reports any of the
    /// events it declared interest in.
    pub fn register(&mut self, descriptor: PollDescriptor, callback: impl FnMut() + Send + 'static) {
        self.registrations.push(Registration { descriptor, callback: Box::new(callback) });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Block up to `timeout_ms` (`-1` forever, `0` non-blocking) for any
    /// registered descriptor to become ready, then run every ready
    /// registration's callback in registration order. Returns how many
    /// callbacks ran.
    pub fn dispatch(&mut self, timeout_ms: i32) -> Result<usize> {
        let mut fds: Vec<pollfd> =
            self.registrations.iter().map(|r| pollfd { fd: r.descriptor.fd, events: r.descriptor.events.bits(), revents: 0 }).collect();
        poll(&mut fds, timeout_ms)?;

        let mut dispatched = 0;
        for (reg, fd) in self.registrations.iter_mut().zip(fds.iter()) {
            if PollFlags::from_bits_truncate(fd.revents).intersects(reg.descriptor.events) {
                (reg.callback)();
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendKind};
    use crate::backend_null::{NullBackend, Spec};
    use crate::Direction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatch_runs_the_callback_for_a_signalled_descriptor() {
        let mut backend = NullBackend::new(Direction::Playback, Spec::default());
        assert_eq!(backend.kind(), BackendKind::Null);
        let descriptor = backend.poll_descriptor();
        backend.advance_hw(0); // signals the eventfd without moving the pointer

        let mut dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        dispatcher.register(descriptor, move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let n = dispatcher.dispatch(0).unwrap();
        assert_eq!(n, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_with_nothing_ready_runs_no_callbacks() {
        let backend = NullBackend::new(Direction::Capture, Spec::default());
        let descriptor = backend.poll_descriptor();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(descriptor, || {});
        let n = dispatcher.dispatch(0).unwrap();
        assert_eq!(n, 0);
    }
}
