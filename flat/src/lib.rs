//! Traits for passing raw, fixed-layout values through a message passing
//! system without serialization.
//!
//! A number of these are partially based on RSMPI's Equivalence trait. A type
//! implementing [`FlatBuffer`] is "trivially transmissible": its in-memory
//! representation can be copied byte for byte to another process that shares
//! the same binary layout.
use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub use flat_derive::FlatBuffer;

/// Flat, layout-stable buffer.
///
/// # Safety
///
/// Implementors must be plain data: no references, no pointers to heap
/// memory owned by the value (other than the contiguous element storage of
/// a `Vec`), and every byte pattern produced by [`FlatBuffer::as_bytes`] on
/// one process must be a valid value when handed to
/// [`FlatBuffer::from_flat_bytes`] on a process with the same layout.
pub unsafe trait FlatBuffer: Any + Sized {
    /// Size of this buffer in bytes
    fn size(&self) -> usize;
    /// Pointer to the buffer
    fn ptr(&self) -> *const u8;
    /// Mutable pointer to the buffer
    fn ptr_mut(&mut self) -> *mut u8;
    /// Hashed type ID of the inner type
    fn type_id() -> u64;
    /// Number of elements in the buffer (default: 1)
    fn count(&self) -> usize {
        1
    }
    /// Rebuild a value from `count` elements stored in `data`.
    ///
    /// Returns `None` if `data` does not hold exactly `count` elements or the
    /// count is impossible for this type.
    fn from_flat_bytes(count: usize, data: &[u8]) -> Option<Self>;

    /// Byte view of the buffer.
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: ptr() and size() describe memory owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr(), self.size()) }
    }

    /// Mutable byte view of the buffer.
    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        let size = self.size();
        // SAFETY: ptr_mut() and size() describe memory owned by self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr_mut(), size) }
    }
}

/// Hash the `TypeId` of `T` into a u64 that can be put on the wire.
///
/// Only comparable between processes running the same binary.
pub fn hashed_type_id<T: Any>() -> u64 {
    let id = TypeId::of::<T>();
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// Read `count` unaligned elements of `T` from `data`.
///
/// # Safety
///
/// Every `size_of::<T>()` chunk of `data` must be a valid `T`.
pub unsafe fn read_elements<T: Copy>(count: usize, data: &[u8]) -> Option<Vec<T>> {
    let size = std::mem::size_of::<T>();
    if data.len() != count.checked_mul(size)? {
        return None;
    }
    let mut out = Vec::with_capacity(count);
    let mut ptr = data.as_ptr() as *const T;
    for _ in 0..count {
        out.push(ptr.read_unaligned());
        ptr = ptr.add(1);
    }
    Some(out)
}

macro_rules! impl_flat_primitive {
    ($ty:ident) => {
        unsafe impl FlatBuffer for $ty {
            #[inline]
            fn size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            #[inline]
            fn ptr(&self) -> *const u8 {
                (self as *const $ty) as *const _
            }

            #[inline]
            fn ptr_mut(&mut self) -> *mut u8 {
                (self as *mut $ty) as *mut _
            }

            #[inline]
            fn type_id() -> u64 {
                hashed_type_id::<Self>()
            }

            fn from_flat_bytes(count: usize, data: &[u8]) -> Option<Self> {
                if count != 1 {
                    return None;
                }
                let bytes = data.try_into().ok()?;
                Some($ty::from_ne_bytes(bytes))
            }
        }
    };
}

impl_flat_primitive!(isize);
impl_flat_primitive!(i8);
impl_flat_primitive!(i16);
impl_flat_primitive!(i32);
impl_flat_primitive!(i64);
impl_flat_primitive!(usize);
impl_flat_primitive!(u8);
impl_flat_primitive!(u16);
impl_flat_primitive!(u32);
impl_flat_primitive!(u64);
impl_flat_primitive!(f32);
impl_flat_primitive!(f64);
// impl_flat_primitive!(char);

unsafe impl FlatBuffer for bool {
    #[inline]
    fn size(&self) -> usize {
        std::mem::size_of::<bool>()
    }

    #[inline]
    fn ptr(&self) -> *const u8 {
        (self as *const bool) as *const _
    }

    #[inline]
    fn ptr_mut(&mut self) -> *mut u8 {
        (self as *mut bool) as *mut _
    }

    #[inline]
    fn type_id() -> u64 {
        hashed_type_id::<Self>()
    }

    fn from_flat_bytes(count: usize, data: &[u8]) -> Option<Self> {
        // Only 0 and 1 are valid bools
        match (count, data) {
            (1, [0]) => Some(false),
            (1, [1]) => Some(true),
            _ => None,
        }
    }
}

/// Element types that can be stored in flat containers.
///
/// Everything except `bool`, whose byte patterns have to be checked one
/// element at a time. `#[derive(FlatBuffer)]` implements this trait as well,
/// so it only accepts structs built from element types without padding:
///
/// ```
/// use flat::{FlatBuffer, FlatElement};
///
/// #[repr(C)]
/// #[derive(FlatBuffer, Copy, Clone, Debug, PartialEq)]
/// struct Point {
///     x: u32,
///     y: u32,
///     weights: [f32; 2],
/// }
///
/// fn element<T: FlatElement>() {}
/// element::<Point>();
///
/// let p = Point { x: 1, y: 2, weights: [0.5, 1.5] };
/// assert_eq!(Point::from_flat_bytes(1, p.as_bytes()), Some(p));
/// ```
///
/// A `bool` field is rejected:
///
/// ```compile_fail
/// #[repr(C)]
/// #[derive(flat::FlatBuffer, Copy, Clone)]
/// struct Labelled {
///     id: u32,
///     flag: bool,
/// }
/// ```
///
/// So is a layout with padding bytes:
///
/// ```compile_fail
/// #[repr(C)]
/// #[derive(flat::FlatBuffer, Copy, Clone)]
/// struct Padded {
///     a: u8,
///     b: u32,
/// }
/// ```
///
/// # Safety
///
/// Every byte pattern of `size_of::<Self>()` bytes must be a valid value.
pub unsafe trait FlatElement: FlatBuffer + Copy {}

macro_rules! impl_flat_element {
    ($($ty:ident),*) => {
        $(unsafe impl FlatElement for $ty {})*
    };
}

impl_flat_element!(isize, i8, i16, i32, i64, usize, u8, u16, u32, u64, f32, f64);

unsafe impl<T: FlatElement, const N: usize> FlatBuffer for [T; N] {
    #[inline]
    fn size(&self) -> usize {
        N * std::mem::size_of::<T>()
    }

    #[inline]
    fn ptr(&self) -> *const u8 {
        self.as_ptr() as *const _
    }

    #[inline]
    fn ptr_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr() as *mut _
    }

    #[inline]
    fn type_id() -> u64 {
        hashed_type_id::<Self>()
    }

    #[inline]
    fn count(&self) -> usize {
        N
    }

    fn from_flat_bytes(count: usize, data: &[u8]) -> Option<Self> {
        if count != N {
            return None;
        }
        // SAFETY: FlatElement types accept every byte pattern.
        let items = unsafe { read_elements::<T>(count, data)? };
        items.try_into().ok()
    }
}

unsafe impl<T: FlatElement, const N: usize> FlatElement for [T; N] {}

unsafe impl<T: FlatElement> FlatBuffer for Vec<T> {
    #[inline]
    fn size(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    #[inline]
    fn ptr(&self) -> *const u8 {
        self.as_ptr() as *const _
    }

    #[inline]
    fn ptr_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr() as *mut _
    }

    #[inline]
    fn type_id() -> u64 {
        <T as FlatBuffer>::type_id()
    }

    #[inline]
    fn count(&self) -> usize {
        self.len()
    }

    fn from_flat_bytes(count: usize, data: &[u8]) -> Option<Self> {
        // SAFETY: FlatElement types accept every byte pattern.
        unsafe { read_elements::<T>(count, data) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_bytes_round_trip() {
        let x = 0x1234_5678_i32;
        let back = i32::from_flat_bytes(1, x.as_bytes()).unwrap();
        assert_eq!(back, x);
        assert_eq!(x.size(), 4);
        assert_eq!(x.count(), 1);
    }

    #[test]
    fn primitive_rejects_wrong_length() {
        assert!(u64::from_flat_bytes(1, &[0; 4]).is_none());
        assert!(u64::from_flat_bytes(2, &[0; 16]).is_none());
    }

    #[test]
    fn bool_rejects_invalid_patterns() {
        assert_eq!(bool::from_flat_bytes(1, &[1]), Some(true));
        assert_eq!(bool::from_flat_bytes(1, &[0]), Some(false));
        assert_eq!(bool::from_flat_bytes(1, &[2]), None);
    }

    #[test]
    fn type_ids_follow_the_element_type() {
        assert_eq!(<Vec<f64> as FlatBuffer>::type_id(), <f64 as FlatBuffer>::type_id());
        assert_ne!(<Vec<f64> as FlatBuffer>::type_id(), <Vec<f32> as FlatBuffer>::type_id());
        assert_ne!(<[f64; 3] as FlatBuffer>::type_id(), <[f64; 4] as FlatBuffer>::type_id());
        assert_eq!(<Vec<[f64; 3]> as FlatBuffer>::type_id(), <[f64; 3] as FlatBuffer>::type_id());
    }

    #[test]
    fn vec_rebuilds_from_bytes() {
        let v = vec![1.5_f64, -2.0, 3.25];
        let back = Vec::<f64>::from_flat_bytes(v.count(), v.as_bytes()).unwrap();
        assert_eq!(back, v);
        assert!(Vec::<f64>::from_flat_bytes(4, v.as_bytes()).is_none());
    }

    #[test]
    fn array_checks_count() {
        let a = [7_u16, 8, 9];
        assert_eq!(<[u16; 3]>::from_flat_bytes(3, a.as_bytes()), Some(a));
        assert_eq!(<[u16; 3]>::from_flat_bytes(2, &a.as_bytes()[..4]), None);
    }
}
