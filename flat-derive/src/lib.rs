use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput};

/// This derive macro can be unsafe. FlatBuffer can only be derived for "flat"
/// types, i.e. those that contain no references and can be represented in a
/// single buffer.
///
/// The type must be a `Copy` struct with a fixed layout (`#[repr(C)]` or
/// `#[repr(transparent)]`), every field must be a `FlatElement` (so it
/// accepts any byte pattern) and the struct must not contain padding.
/// Deriving also marks the type as a `FlatElement`, so vectors and arrays of
/// it are flat too.
#[proc_macro_derive(FlatBuffer)]
pub fn derive_flat_buffer(toks: TokenStream) -> TokenStream {
    let input = parse_macro_input!(toks as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return syn::Error::new_spanned(name, "FlatBuffer can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };
    if !has_fixed_repr(&input) {
        return syn::Error::new_spanned(
            name,
            "FlatBuffer requires #[repr(C)] or #[repr(transparent)]",
        )
        .to_compile_error()
        .into();
    }

    let field_types: Vec<_> = fields.iter().map(|field| &field.ty).collect();

    // Every field has to accept any byte pattern
    let mut generics = input.generics.clone();
    {
        let where_clause = generics.make_where_clause();
        for ty in &field_types {
            where_clause
                .predicates
                .push(parse_quote!(#ty: ::flat::FlatElement));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let no_padding = quote! {
        ::std::mem::size_of::<#name #ty_generics>() == 0 #(+ ::std::mem::size_of::<#field_types>())*
    };
    // Generic structs can only be checked once instantiated
    let padding_check = if input.generics.params.is_empty() {
        quote! {
            const _: () = ::std::assert!(#no_padding, "FlatBuffer types must not contain padding");
        }
    } else {
        quote! {
            impl #impl_generics #name #ty_generics #where_clause {
                #[doc(hidden)]
                const __FLAT_NO_PADDING: () =
                    ::std::assert!(#no_padding, "FlatBuffer types must not contain padding");
            }
        }
    };
    let padding_use = if input.generics.params.is_empty() {
        quote! {}
    } else {
        quote! { let () = Self::__FLAT_NO_PADDING; }
    };

    let out = quote! {
        const _: fn() = || {
            fn assert_copy<T: ::core::marker::Copy>() {}
            assert_copy::<#name #ty_generics>();
        };

        #padding_check

        unsafe impl #impl_generics ::flat::FlatBuffer for #name #ty_generics #where_clause {
            #[inline]
            fn size(&self) -> usize {
                #padding_use
                ::std::mem::size_of::<Self>()
            }

            #[inline]
            fn ptr(&self) -> *const u8 {
                (self as *const Self) as *const _
            }

            #[inline]
            fn ptr_mut(&mut self) -> *mut u8 {
                (self as *mut Self) as *mut _
            }

            #[inline]
            fn type_id() -> u64 {
                ::flat::hashed_type_id::<Self>()
            }

            fn from_flat_bytes(count: usize, data: &[u8]) -> ::std::option::Option<Self> {
                #padding_use
                if count != 1 || data.len() != ::std::mem::size_of::<Self>() {
                    return ::std::option::Option::None;
                }
                let ptr = data.as_ptr() as *const Self;
                // SAFETY: length checked above, every field is a FlatElement
                // and there is no padding.
                ::std::option::Option::Some(unsafe { ptr.read_unaligned() })
            }
        }

        unsafe impl #impl_generics ::flat::FlatElement for #name #ty_generics #where_clause {}
    };

    TokenStream::from(out)
}

fn has_fixed_repr(input: &DeriveInput) -> bool {
    let mut fixed = false;
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("repr")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("C") || meta.path.is_ident("transparent") {
                fixed = true;
            }
            Ok(())
        });
    }
    fixed
}
