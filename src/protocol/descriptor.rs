//! Typed method descriptors.
//!
//! A descriptor pairs a method name with its parameter and result types so
//! handler registration and sending are checked at compile time:
//!
//! ```
//! use jsonrpc_host::protocol::{EventType, RequestType};
//!
//! const VERSION: RequestType<(), String> = RequestType::new("version");
//! const LOG: EventType<String> = EventType::new("window/logMessage");
//!
//! assert_eq!(VERSION.method(), "version");
//! assert_eq!(LOG.method(), "window/logMessage");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Descriptor of a request method taking `P` and answering with `R`.
pub struct RequestType<P, R> {
    method: &'static str,
    _types: PhantomData<fn(P) -> R>,
}

impl<P, R> RequestType<P, R> {
    /// Create a descriptor for `method`.
    pub const fn new(method: &'static str) -> Self {
        Self {
            method,
            _types: PhantomData,
        }
    }

    /// Method name.
    pub const fn method(&self) -> &'static str {
        self.method
    }
}

/// Descriptor of an event method carrying `P`.
pub struct EventType<P> {
    method: &'static str,
    _types: PhantomData<fn(P)>,
}

impl<P> EventType<P> {
    /// Create a descriptor for `method`.
    pub const fn new(method: &'static str) -> Self {
        Self {
            method,
            _types: PhantomData,
        }
    }

    /// Method name.
    pub const fn method(&self) -> &'static str {
        self.method
    }
}

// Manual impls: derives would put bounds on `P` and `R`.

impl<P, R> Clone for RequestType<P, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, R> Copy for RequestType<P, R> {}

impl<P, R> PartialEq for RequestType<P, R> {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
    }
}

impl<P, R> Eq for RequestType<P, R> {}

impl<P, R> Hash for RequestType<P, R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
    }
}

impl<P, R> fmt::Debug for RequestType<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestType").field(&self.method).finish()
    }
}

impl<P> Clone for EventType<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for EventType<P> {}

impl<P> PartialEq for EventType<P> {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
    }
}

impl<P> Eq for EventType<P> {}

impl<P> Hash for EventType<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
    }
}

impl<P> fmt::Debug for EventType<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventType").field(&self.method).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct NotClone;

    #[test]
    fn test_equality_by_method_name() {
        let a: RequestType<u32, String> = RequestType::new("query/run");
        let b: RequestType<u32, String> = RequestType::new("query/run");
        let c: RequestType<u32, String> = RequestType::new("query/cancel");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_copy_without_bounds_on_types() {
        const DESC: EventType<NotClone> = EventType::new("progress");
        let copy = DESC;
        assert_eq!(copy.method(), DESC.method());
        assert_eq!(format!("{:?}", copy), "EventType(\"progress\")");
    }
}
