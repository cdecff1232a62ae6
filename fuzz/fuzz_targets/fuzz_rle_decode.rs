//! Fuzz target: `rle::decode`
//!
//! Arbitrary pair streams into a destination whose size comes from the
//! first two input bytes. Decode must never write past capacity, and
//! whatever it accepts must re-encode to something that decodes the same.
//!
//! cargo fuzz run fuzz_rle_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use velonav::link::rle::{self, RleError};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let cap = usize::from(u16::from_be_bytes([data[0], data[1]]));
    let src = &data[2..];

    let mut dst = vec![0u8; cap];
    match rle::decode(src, &mut dst) {
        Ok(n) => {
            assert!(n <= cap);
            let again = rle::decode_to_vec(&rle::encode(&dst[..n]), n);
            assert_eq!(again.as_deref(), Ok(&dst[..n]));
        }
        Err(RleError::Truncated) => assert!(src.len() % 2 != 0),
        Err(RleError::Overflow) => {}
        Err(RleError::NoMemory) => unreachable!("decode never allocates"),
    }
});
