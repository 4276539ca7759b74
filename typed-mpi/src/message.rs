//! Static layout classification of message types.
//!
//! Every [`Message`] names a [`Layout`]: [`FlatLayout`] for trivially
//! transmissible types and [`StructuredLayout`] for everything else. The
//! layout is an associated type, so the choice is fixed at compile time and
//! `FlatLayout` can only be named for types implementing [`FlatBuffer`].
use serde::{Serialize, de::DeserializeOwned};
use flat::{FlatBuffer, FlatElement};

/// Layout classification of a type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Trivially transmissible: flat and layout-stable.
    Flat,
    /// Requires serialization.
    Structured,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::FlatLayout {}
    impl Sealed for super::StructuredLayout {}
}

/// Layout marker for flat types.
#[derive(Debug)]
pub enum FlatLayout {}

/// Layout marker for types that must be serialized.
#[derive(Debug)]
pub enum StructuredLayout {}

/// Raw views of a value, available only for flat layouts.
pub trait Layout<T>: sealed::Sealed {
    const CLASSIFICATION: Classification;

    /// Hashed type id put in direct transfer headers.
    fn type_id() -> u64;

    /// Number of elements held by the value.
    fn count(value: &T) -> usize;

    /// Byte view of the value.
    fn bytes(value: &T) -> Option<&[u8]>;

    /// Mutable byte view of the value.
    fn bytes_mut(value: &mut T) -> Option<&mut [u8]>;

    /// Rebuild a value from raw element bytes.
    fn rebuild(count: usize, data: &[u8]) -> Option<T>;
}

impl<T: FlatBuffer> Layout<T> for FlatLayout {
    const CLASSIFICATION: Classification = Classification::Flat;

    #[inline]
    fn type_id() -> u64 {
        <T as FlatBuffer>::type_id()
    }

    #[inline]
    fn count(value: &T) -> usize {
        value.count()
    }

    #[inline]
    fn bytes(value: &T) -> Option<&[u8]> {
        Some(value.as_bytes())
    }

    #[inline]
    fn bytes_mut(value: &mut T) -> Option<&mut [u8]> {
        Some(value.as_bytes_mut())
    }

    #[inline]
    fn rebuild(count: usize, data: &[u8]) -> Option<T> {
        T::from_flat_bytes(count, data)
    }
}

impl<T> Layout<T> for StructuredLayout {
    const CLASSIFICATION: Classification = Classification::Structured;

    fn type_id() -> u64 {
        0
    }

    fn count(_value: &T) -> usize {
        1
    }

    fn bytes(_value: &T) -> Option<&[u8]> {
        None
    }

    fn bytes_mut(_value: &mut T) -> Option<&mut [u8]> {
        None
    }

    fn rebuild(_count: usize, _data: &[u8]) -> Option<T> {
        None
    }
}

/// A value that can be sent through a communicator.
///
/// Flat user types derive `FlatBuffer` and use [`flat_message!`];
/// everything else uses [`structured_message!`].
pub trait Message: Serialize + DeserializeOwned + 'static {
    /// Layout of this type.
    type Layout: Layout<Self>;
    /// Layout of a `Vec` of this type.
    type VecLayout: Layout<Vec<Self>>;
}

/// Layout classification of `T`.
#[inline]
pub fn classification<T: Message>() -> Classification {
    <T::Layout as Layout<T>>::CLASSIFICATION
}

/// Implement [`Message`] for flat types (which must implement `FlatElement`,
/// e.g. through `#[derive(FlatBuffer)]`).
#[macro_export]
macro_rules! flat_message {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::Message for $ty {
                type Layout = $crate::FlatLayout;
                type VecLayout = $crate::FlatLayout;
            }
        )*
    };
}

/// Implement [`Message`] for types that always go through the codec.
#[macro_export]
macro_rules! structured_message {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::Message for $ty {
                type Layout = $crate::StructuredLayout;
                type VecLayout = $crate::StructuredLayout;
            }
        )*
    };
}

flat_message!(isize, i8, i16, i32, i64, usize, u8, u16, u32, u64, f32, f64);
structured_message!(String, char, ());

impl Message for bool {
    type Layout = FlatLayout;
    // bool vectors are checked element by element by the codec
    type VecLayout = StructuredLayout;
}

impl<T: Message> Message for Vec<T> {
    type Layout = T::VecLayout;
    type VecLayout = StructuredLayout;
}

impl<T, const N: usize> Message for [T; N]
where
    T: Message + FlatElement,
    [T; N]: Serialize + DeserializeOwned,
{
    type Layout = FlatLayout;
    type VecLayout = FlatLayout;
}

impl<T: Message> Message for Option<T> {
    type Layout = StructuredLayout;
    type VecLayout = StructuredLayout;
}

impl<T: Message> Message for Box<T> {
    type Layout = StructuredLayout;
    type VecLayout = StructuredLayout;
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Message),+> Message for ($($name,)+) {
            type Layout = StructuredLayout;
            type VecLayout = StructuredLayout;
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
