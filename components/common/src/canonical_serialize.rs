use crate::int_convert::usize_to_u64;
use byteorder::{BigEndian, WriteBytesExt};

/// Canonically serialize an object.
/// This serialization is used for signatures and hashing, therefore the
/// result must be identical on any system.
pub trait CanonicalSerialize {
    fn canonical_serialize(&self) -> Vec<u8>;
}

impl CanonicalSerialize for bool {
    fn canonical_serialize(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl CanonicalSerialize for u64 {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.write_u64::<BigEndian>(*self).unwrap();
        res_data
    }
}

impl CanonicalSerialize for u128 {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.write_u128::<BigEndian>(*self).unwrap();
        res_data
    }
}

impl CanonicalSerialize for String {
    fn canonical_serialize(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl<T> CanonicalSerialize for Option<T>
where
    T: CanonicalSerialize,
{
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        match &self {
            None => {
                res_data.push(0);
            }
            Some(t) => {
                res_data.push(1);
                res_data.extend_from_slice(&t.canonical_serialize());
            }
        };
        res_data
    }
}

impl<T> CanonicalSerialize for Vec<T>
where
    T: CanonicalSerialize,
{
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        // Write length:
        res_data
            .write_u64::<BigEndian>(usize_to_u64(self.len()).unwrap())
            .unwrap();
        // Write all items:
        for t in self.iter() {
            res_data.extend_from_slice(&t.canonical_serialize());
        }
        res_data
    }
}

impl<T, W> CanonicalSerialize for (T, W)
where
    T: CanonicalSerialize,
    W: CanonicalSerialize,
{
    fn canonical_serialize(&self) -> Vec<u8> {
        let (t, w) = self;
        let mut res_data = Vec::new();
        res_data.extend_from_slice(&t.canonical_serialize());
        res_data.extend_from_slice(&w.canonical_serialize());
        res_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_serialize_option() {
        let none: Option<u64> = None;
        assert_eq!(none.canonical_serialize(), vec![0]);

        let some: Option<u64> = Some(3);
        assert_eq!(
            some.canonical_serialize(),
            vec![1, 0, 0, 0, 0, 0, 0, 0, 3]
        );
    }

    #[test]
    fn test_canonical_serialize_vec_length_prefix() {
        let items: Vec<u64> = vec![1, 2];
        let data = items.canonical_serialize();
        assert_eq!(&data[..8], &[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(data.len(), 8 + 2 * 8);
    }
}
