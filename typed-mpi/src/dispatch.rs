//! Transmission mode selection.
use crate::message::{classification, Classification, Message};

/// How a value travels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Path {
    /// Raw memory of the value, as-is.
    Direct,
    /// Encoded through the configured codec.
    Portable,
}

/// Select the transmission path.
///
/// Direct only when the deployment is declared homogeneous and the type is
/// flat. Both ends of a transfer evaluate this with their own build, so they
/// agree as long as they share the homogeneity declaration.
#[inline]
pub const fn select_path(classification: Classification, homogeneous: bool) -> Path {
    match (classification, homogeneous) {
        (Classification::Flat, true) => Path::Direct,
        _ => Path::Portable,
    }
}

/// Path taken by values of type `T`.
#[inline]
pub fn path_for<T: Message>(homogeneous: bool) -> Path {
    select_path(classification::<T>(), homogeneous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_classification() -> impl Strategy<Value = Classification> {
        prop_oneof![Just(Classification::Flat), Just(Classification::Structured)]
    }

    proptest! {
        #[test]
        fn direct_requires_flat_and_homogeneous(class in any_classification(), homogeneous in any::<bool>()) {
            let path = select_path(class, homogeneous);
            prop_assert_eq!(
                path == Path::Direct,
                class == Classification::Flat && homogeneous,
            );
        }

        #[test]
        fn heterogeneous_is_always_portable(class in any_classification()) {
            prop_assert_eq!(select_path(class, false), Path::Portable);
        }
    }

    #[test]
    fn per_type_paths() {
        assert_eq!(path_for::<u64>(true), Path::Direct);
        assert_eq!(path_for::<Vec<f32>>(true), Path::Direct);
        assert_eq!(path_for::<u64>(false), Path::Portable);
        assert_eq!(path_for::<String>(true), Path::Portable);
        assert_eq!(path_for::<Vec<String>>(true), Path::Portable);
    }
}
