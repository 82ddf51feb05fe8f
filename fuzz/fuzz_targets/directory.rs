#![no_main]

use libfuzzer_sys::fuzz_target;
use berdissect::{ByteCursor, DecodeContext, Mode, Registry};
use berdissect::directory::decode_record;

fuzz_target!(|data: &[u8]| {
    let registry = Registry::new();
    let mut ctx = DecodeContext::new(&registry, Mode::Ber);
    let node = decode_record(ByteCursor::new(data), &mut ctx, 99_999);
    assert!(node.ranges_nest());
});
