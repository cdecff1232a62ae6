//! Fuzz target: `Reassembler<TileFrame>::feed`
//!
//! The first input byte picks a chunk size; the rest is fed as BLE writes
//! of that size. Every completed tile must carry exactly the payload its
//! header declared, and a reset must always return the reassembler to idle.
//!
//! cargo fuzz run fuzz_tile_reassembler

#![no_main]

use libfuzzer_sys::fuzz_target;
use velonav::link::reassembler::{Assembled, HeapAllocator, Limits, Reassembler};
use velonav::link::tile::TileFrame;

fuzz_target!(|data: &[u8]| {
    let Some((&step, stream)) = data.split_first() else {
        return;
    };
    let step = usize::from(step).max(1);

    let mut rx = Reassembler::<TileFrame>::new(Limits::new(64 * 1024));
    let mut alloc = HeapAllocator::new(64 * 1024);

    for chunk in stream.chunks(step) {
        rx.feed(chunk, &mut alloc, |frame| match frame {
            Assembled::Complete { header, payload } => {
                assert_eq!(payload.len(), header.size as usize);
                assert!(header.zoom <= velonav::link::tile::MAX_ZOOM);
            }
            Assembled::Skipped { header, len } => {
                assert_eq!(len, header.size as usize);
            }
        });
    }

    rx.reset();
    assert!(rx.is_idle());
});
