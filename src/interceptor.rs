//! Interception of the local message callback.
//!
//! The host registers its callback through
//! `bambu_network_set_on_local_message_fn`. The proxy keeps that callback in
//! a [`CallbackSlot`] and registers its own trampoline with the plugin
//! instead. Every message the plugin delivers to the trampoline is first
//! handed to a [`Notifier`] and then passed on, unchanged, to whichever
//! [`Subscriber`] the host registered last.
//!
//! Messages the plugin emits before the host registers a callback are
//! dropped after notification.

use std::borrow::Cow;
use std::ffi::c_char;
use std::fmt;
use std::slice;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{RwLock, const_rwlock};

/// Holds the single active subscriber of a callback registration.
///
/// Registering replaces the previous value; there is never more than one
/// subscriber.
pub struct CallbackSlot<C> {
    current: RwLock<Option<C>>,
}

impl<C: Clone> CallbackSlot<C> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: const_rwlock(None),
        }
    }

    /// Stores `callback`, returning the value it replaced.
    pub fn replace(&self, callback: Option<C>) -> Option<C> {
        std::mem::replace(&mut *self.current.write(), callback)
    }

    /// The current subscriber.
    #[must_use]
    pub fn get(&self) -> Option<C> {
        self.current.read().clone()
    }

    /// Whether a subscriber is registered.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }
}

impl<C: Clone> Default for CallbackSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// One message delivered by the plugin.
///
/// Borrows the plugin's buffers for the duration of the callback; nothing
/// keeps it afterwards.
#[derive(Clone, Copy)]
pub struct Message<'a> {
    device_id: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Message<'a> {
    /// Builds a message over a device id and a payload.
    #[must_use]
    pub fn new(device_id: &'a [u8], payload: &'a [u8]) -> Self {
        Self { device_id, payload }
    }

    /// Builds a message view over the plugin's string buffers.
    ///
    /// A null pointer reads as an empty buffer.
    ///
    /// # Safety
    ///
    /// Each pointer must be null or valid for its length, and both buffers
    /// must outlive `'a`.
    #[must_use]
    pub unsafe fn from_raw(
        dev_id: *const c_char,
        dev_id_len: usize,
        msg: *const c_char,
        msg_len: usize,
    ) -> Self {
        Self {
            device_id: unsafe { bytes(dev_id, dev_id_len) },
            payload: unsafe { bytes(msg, msg_len) },
        }
    }

    /// Serial of the printer that sent the message.
    #[must_use]
    pub fn device_id(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.device_id)
    }

    /// Serial of the printer, as received.
    #[must_use]
    pub fn device_id_bytes(&self) -> &'a [u8] {
        self.device_id
    }

    /// Raw message bytes, expected to be JSON.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

unsafe fn bytes<'a>(data: *const c_char, len: usize) -> &'a [u8] {
    if data.is_null() {
        &[]
    } else {
        unsafe { slice::from_raw_parts(data.cast::<u8>(), len) }
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("device_id", &self.device_id())
            .field("payload", &String::from_utf8_lossy(self.payload))
            .finish()
    }
}

/// Side effect run for each intercepted message before it is delivered.
///
/// Implementations must not fail the delivery: errors are handled inside
/// [`notify`](Notifier::notify).
pub trait Notifier: Send + Sync {
    /// Handles `message`. Blocks the plugin's delivery thread until it
    /// returns.
    fn notify(&self, message: &Message<'_>);
}

/// Receiver of intercepted messages after notification; in the proxy, the
/// host's own callback.
pub trait Subscriber: Send + Sync {
    /// Handles `message`.
    fn receive(&self, message: &Message<'_>);
}

impl<F> Subscriber for F
where
    F: Fn(&Message<'_>) + Send + Sync,
{
    fn receive(&self, message: &Message<'_>) {
        self(message);
    }
}

/// Routes intercepted messages through a [`Notifier`] to the host's
/// callback.
pub struct MessageInterceptor<N> {
    subscriber: CallbackSlot<Arc<dyn Subscriber>>,
    notifier: N,
}

impl<N: Notifier> MessageInterceptor<N> {
    /// Creates an interceptor with no registered callback.
    pub fn new(notifier: N) -> Self {
        Self {
            subscriber: CallbackSlot::new(),
            notifier,
        }
    }

    /// Makes `subscriber` the receiver of every following message, replacing
    /// any earlier registration. Returns the replaced subscriber.
    pub fn register(&self, subscriber: Option<Arc<dyn Subscriber>>) -> Option<Arc<dyn Subscriber>> {
        let previous = self.subscriber.replace(subscriber);
        if previous.is_some() {
            debug!("replacing previously registered local message callback");
        }
        previous
    }

    /// Whether the host currently has a callback registered.
    #[must_use]
    pub fn has_callback(&self) -> bool {
        self.subscriber.is_set()
    }

    /// The notifier messages are passed through.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Notifies, then forwards `message` to the registered subscriber.
    ///
    /// The subscriber is called outside the slot's lock, so it may register
    /// a replacement.
    pub fn deliver(&self, message: &Message<'_>) {
        info!(
            "local message from {}: {}",
            message.device_id(),
            String::from_utf8_lossy(message.payload())
        );

        self.notifier.notify(message);

        match self.subscriber.get() {
            Some(subscriber) => subscriber.receive(message),
            None => debug!(
                "no local message callback registered, dropping message from {}",
                message.device_id()
            ),
        }
    }
}

impl<N> fmt::Debug for MessageInterceptor<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageInterceptor")
            .field("has_callback", &self.subscriber.current.read().is_some())
            .finish_non_exhaustive()
    }
}
