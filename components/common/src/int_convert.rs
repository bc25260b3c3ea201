use std::convert::TryFrom;

pub fn usize_to_u64(num: usize) -> Option<u64> {
    u64::try_from(num).ok()
}
