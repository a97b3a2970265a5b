//! Owning thread-local slot over `pthread_key_t`
//!
//! The value for a thread is created on first use and dropped by the key's
//! destructor when the thread exits, whichever way the thread was created.
//! While a thread's value is being dropped the slot reports itself as
//! unavailable instead of creating a second value.

use std::cell::Cell;
use std::marker::PhantomData;
use thiserror::Error;

/// Failure to allocate a thread-specific data key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("the system lacked the resources to create another thread-specific data key (EAGAIN)")]
    Exhausted,

    #[error("insufficient memory to create a thread-specific data key (ENOMEM)")]
    NoMemory,

    #[error("pthread_key_create failed with code {0}")]
    Other(i32),
}

impl KeyError {
    fn from_code(code: libc::c_int) -> Self {
        match code {
            libc::EAGAIN => KeyError::Exhausted,
            libc::ENOMEM => KeyError::NoMemory,
            other => KeyError::Other(other),
        }
    }
}

thread_local! {
    /// Set once any `ThreadKey` destructor has started on this thread
    static TEARING_DOWN: Cell<bool> = const { Cell::new(false) };
}

/// Whether this thread has started running thread-specific data destructors
pub fn tearing_down() -> bool {
    TEARING_DOWN.with(Cell::get)
}

/// A process-wide key whose per-thread value is a lazily created `T`
pub struct ThreadKey<T: 'static> {
    key: libc::pthread_key_t,
    _marker: PhantomData<fn() -> T>,
}

unsafe extern "C" fn destroy<T>(ptr: *mut libc::c_void) {
    if ptr.is_null() {
        return;
    }
    TEARING_DOWN.with(|flag| flag.set(true));
    // SAFETY: the pointer was produced by `Box::into_raw` in `with_or_init`
    // and the runtime cleared the slot before calling us.
    drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
}

impl<T: 'static> ThreadKey<T> {
    pub fn new() -> Result<Self, KeyError> {
        let mut key: libc::pthread_key_t = 0;
        // SAFETY: `key` is a valid out-pointer and `destroy::<T>` matches
        // the values stored under this key.
        let rc = unsafe { libc::pthread_key_create(&mut key, Some(destroy::<T>)) };
        if rc != 0 {
            return Err(KeyError::from_code(rc));
        }
        Ok(Self {
            key,
            _marker: PhantomData,
        })
    }

    fn raw(&self) -> *mut T {
        // SAFETY: the key is live for the lifetime of `self`.
        unsafe { libc::pthread_getspecific(self.key).cast::<T>() }
    }

    /// Run `f` with this thread's value, if one exists
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let ptr = self.raw();
        if ptr.is_null() {
            return None;
        }
        // SAFETY: non-null values are owned boxes that live until the
        // thread-exit destructor, which cannot run while we hold `&T`.
        Some(f(unsafe { &*ptr }))
    }

    /// Run `f` with this thread's value, creating it with `init` on first
    /// use. Returns `None` during thread teardown or if the value cannot be
    /// stored.
    pub fn with_or_init<R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut ptr = self.raw();
        if ptr.is_null() {
            if tearing_down() {
                return None;
            }
            ptr = Box::into_raw(Box::new(init()));
            // SAFETY: the key is live and `ptr` is a valid `T`.
            let rc = unsafe { libc::pthread_setspecific(self.key, ptr.cast()) };
            if rc != 0 {
                // SAFETY: ownership was not transferred.
                drop(unsafe { Box::from_raw(ptr) });
                return None;
            }
        }
        // SAFETY: as in `with`.
        Some(f(unsafe { &*ptr }))
    }
}

impl<T: 'static> Drop for ThreadKey<T> {
    fn drop(&mut self) {
        // Values still stored on other threads are leaked.
        // SAFETY: the key was created by `new` and is deleted once.
        unsafe {
            libc::pthread_key_delete(self.key);
        }
    }
}
