use std::any::{type_name, Any};
use std::fmt::Debug;

///
/// An opaque carrier for typed values crossing model boundaries.
///
/// Different components of a compound model consume and produce different
/// message types, so values travel the influencer graph type-erased and are
/// recovered with a checked cast on consumption. Every carrier owns its
/// value independently; cloning duplicates the payload.
///
pub struct Dynamic {
    inner: Box<dyn Any>,
    ty: &'static str,
    dup: fn(&dyn Any) -> Box<dyn Any>,
}

impl Dynamic {
    ///
    /// Wraps a value into a dynamic carrier.
    ///
    /// The payload type must be `Clone`, since messages are duplicated
    /// whenever they cross a component boundary.
    ///
    #[must_use]
    pub fn wrap<T: Clone + 'static>(value: T) -> Self {
        Self {
            inner: Box::new(value),
            ty: type_name::<T>(),
            dup: dup_impl::<T>,
        }
    }

    /// Returns the type name of the wrapped value.
    #[must_use]
    pub fn ty(&self) -> &'static str {
        self.ty
    }

    /// Returns whether the wrapped value is of type `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    ///
    /// Consumes the carrier, yielding the wrapped value.
    ///
    /// On a type mismatch the carrier is returned unchanged so the caller
    /// can still inspect it (or report its type name).
    ///
    pub fn try_cast<T: 'static>(self) -> Result<T, Self> {
        match self.inner.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(inner) => Err(Self {
                inner,
                ty: self.ty,
                dup: self.dup,
            }),
        }
    }

    /// Borrows the wrapped value, if it is of type `T`.
    #[must_use]
    pub fn try_cast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

fn dup_impl<T: Clone + 'static>(value: &dyn Any) -> Box<dyn Any> {
    let value = value
        .downcast_ref::<T>()
        .expect("unreachable: the duplication fn is captured alongside its type");
    Box::new(value.clone())
}

impl Clone for Dynamic {
    fn clone(&self) -> Self {
        Self {
            inner: (self.dup)(self.inner.as_ref()),
            ty: self.ty,
            dup: self.dup,
        }
    }
}

impl Debug for Dynamic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dynamic({})", self.ty)
    }
}
