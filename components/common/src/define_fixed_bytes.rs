/// Define a newtype over a fixed size byte array.
///
/// The generated type orders and hashes by its bytes, displays as lowercase
/// hex, and serializes as a hex string (so it is usable as a JSON map key).
#[macro_export]
macro_rules! define_fixed_bytes {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            #[allow(unused)]
            #[inline]
            pub fn as_array_ref(&self) -> &[u8; $len] {
                &self.0
            }

            pub const fn len() -> usize {
                $len
            }

            /// Parse from a hex string of exactly $len bytes.
            pub fn from_hex(src: &str) -> Result<$name, ()> {
                let data = $crate::hex::decode(src).map_err(|_| ())?;
                <$name as ::std::convert::TryFrom<&[u8]>>::try_from(&data[..])
            }

            fn format(&self) -> String {
                $crate::hex::encode(&self.0[..])
            }
        }

        impl Default for $name {
            fn default() -> $name {
                $name([0x00u8; $len])
            }
        }

        impl AsRef<[u8]> for $name {
            #[inline]
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = [u8];
            #[inline]
            fn deref(&self) -> &[u8] {
                &self.0
            }
        }

        impl<'a> ::std::convert::From<&'a [u8; $len]> for $name {
            #[inline]
            fn from(src: &'a [u8; $len]) -> $name {
                $name(*src)
            }
        }

        impl ::std::convert::From<[u8; $len]> for $name {
            #[inline]
            fn from(src: [u8; $len]) -> $name {
                $name(src)
            }
        }

        impl<'a> ::std::convert::TryFrom<&'a [u8]> for $name {
            type Error = ();

            fn try_from(src: &'a [u8]) -> Result<$name, ()> {
                if src.len() != $len {
                    return Err(());
                }
                let mut inner = [0x00u8; $len];
                inner.copy_from_slice(src);
                Ok($name(inner))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", self.format())
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.format())
            }
        }

        impl $crate::canonical_serialize::CanonicalSerialize for $name {
            fn canonical_serialize(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl $crate::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: $crate::serde::Serializer,
            {
                serializer.serialize_str(&self.format())
            }
        }

        impl<'de> $crate::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: $crate::serde::Deserializer<'de>,
            {
                use $crate::serde::de::Error;
                let hex_str = <String as $crate::serde::Deserialize>::deserialize(deserializer)?;
                $name::from_hex(&hex_str)
                    .map_err(|_| D::Error::custom("invalid fixed bytes hex string"))
            }
        }
    };
}
