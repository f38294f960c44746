//! The application capability handed to every procedure handler.

use std::any::Any;

/// Capability object supplied by the embedding application.
///
/// The dispatch core never calls into it; it is passed unchanged to every
/// registered [`HandleFunc`](crate::registry::HandleFunc), which knows the
/// concrete type it expects and recovers it with [`downcast_ref`].
///
/// [`downcast_ref`]: trait.Handler.html#method.downcast_ref
pub trait Handler: Any + Send + Sync {}

impl dyn Handler {
    /// Returns the concrete handler if it is of type `T`.
    pub fn downcast_ref<T: Handler>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref::<T>()
    }

    /// Returns true if the concrete handler is of type `T`.
    pub fn is<T: Handler>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}
