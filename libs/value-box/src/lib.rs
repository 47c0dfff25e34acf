//! Type-erased method return values.
//!
//! The scheduler and checker need to carry and compare method return values without
//! knowing their concrete types statically: a `Queue::pop` might return `i32` while a
//! `Register::add` returns nothing at all. [`ValueBox`] erases the type but keeps an
//! equality comparator and a renderer captured at construction time, so two boxes can be
//! compared and printed without either side knowing what the other originally held.
//!
//! Boxes are only ever meaningfully compared within a single method's return domain (the
//! checker never compares a `Queue::pop` result against a `Register::get` result), so
//! cross-type comparisons simply resolve to "not equal" rather than panicking.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

type CompareFn = dyn Fn(&dyn Any, &dyn Any) -> bool;
type RenderFn = dyn Fn(&dyn Any) -> String;

/// A type-erased, comparable, renderable return value.
///
/// `None` inner payload is reserved for the distinguished [`ValueBox::void`] value: it
/// compares equal only to other void boxes and renders as the literal `"void"`.
#[derive(Clone)]
pub struct ValueBox {
    inner: Option<Rc<dyn Any>>,
    compare: Rc<CompareFn>,
    render: Rc<RenderFn>,
}

impl ValueBox {
    /// Wraps `value`, using its `PartialEq` and `Debug` impls as the comparator/renderer.
    pub fn new<T>(value: T) -> Self
    where
        T: fmt::Debug + PartialEq + 'static,
    {
        Self::with(value, T::eq, |v| format!("{v:?}"))
    }

    /// Wraps `value` with an explicit comparator and renderer.
    ///
    /// Use this when `T` doesn't implement `PartialEq`/`Debug`, or when the method's
    /// return value should be compared or rendered in a way that differs from its
    /// natural impls (e.g. comparing floating point results within a tolerance).
    pub fn with<T, C, R>(value: T, compare: C, render: R) -> Self
    where
        T: 'static,
        C: Fn(&T, &T) -> bool + 'static,
        R: Fn(&T) -> String + 'static,
    {
        Self {
            inner: Some(Rc::new(value)),
            compare: Rc::new(move |a, b| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => compare(a, b),
                _ => false,
            }),
            render: Rc::new(move |v| {
                v.downcast_ref::<T>()
                    .map_or_else(|| "<mismatched value box>".to_string(), |v| render(v))
            }),
        }
    }

    /// The distinguished `Void` value returned by methods with no meaningful result.
    ///
    /// Compares equal only to other `Void` values and renders as `"void"`.
    #[must_use]
    pub fn void() -> Self {
        Self {
            inner: None,
            compare: Rc::new(|_, _| true),
            render: Rc::new(|_| "void".to_string()),
        }
    }

    /// Returns `true` if this is the distinguished `Void` value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Attempts to extract a reference to the underlying `T`.
    ///
    /// Returns `None` if this box holds `Void` or a value of a different type.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.inner.as_deref()?.downcast_ref::<T>()
    }

    /// Renders this value for display in a history line.
    #[must_use]
    pub fn render(&self) -> String {
        self.inner
            .as_deref()
            .map_or_else(|| "void".to_string(), |v| (self.render)(v))
    }
}

impl fmt::Debug for ValueBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBox").field("value", &self.render()).finish()
    }
}

impl PartialEq for ValueBox {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (None, Some(_)) | (Some(_), None) => false,
            (Some(a), Some(b)) => (self.compare)(a.as_ref(), b.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ValueBox;

    #[test]
    fn void_compares_equal_only_to_void() {
        let void_a = ValueBox::void();
        let void_b = ValueBox::void();
        let one = ValueBox::new(1_i32);

        assert_eq!(void_a, void_b);
        assert_ne!(void_a, one);
        assert_ne!(one, void_a);
        assert_eq!(void_a.render(), "void");
    }

    #[test]
    fn typed_values_compare_by_content() {
        let a = ValueBox::new(42_i32);
        let b = ValueBox::new(42_i32);
        let c = ValueBox::new(7_i32);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.render(), "42");
        assert_eq!(a.get::<i32>(), Some(&42));
    }

    #[test]
    fn mismatched_types_are_never_equal() {
        let int_box = ValueBox::new(1_i32);
        let str_box = ValueBox::new("1".to_string());

        assert_ne!(int_box, str_box);
        assert_eq!(int_box.get::<String>(), None);
    }

    #[test]
    fn custom_comparator_and_renderer() {
        let a = ValueBox::with(1.0_f64, |a, b| (a - b).abs() < 0.01, |v| format!("~{v}"));
        let b = ValueBox::with(1.005_f64, |a, b| (a - b).abs() < 0.01, |v| format!("~{v}"));

        assert_eq!(a, b);
        assert_eq!(a.render(), "~1");
    }
}
