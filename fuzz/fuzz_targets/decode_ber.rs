#![no_main]

use libfuzzer_sys::fuzz_target;
use berdissect::{ByteCursor, DecodeContext, Mode, Protocol, Registry};
use berdissect::decode::decode_ber;

fuzz_target!(|data: &[u8]| {
    let registry = Registry::with_defaults();
    for mode in [Mode::Ber, Mode::Der] {
        let mut ctx = DecodeContext::new(&registry, mode);
        let node = decode_ber(ByteCursor::new(data), &mut ctx);
        assert!(node.ranges_nest());
    }
    for protocol in Protocol::ALL {
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let _ = protocol.decode(ByteCursor::new(data), &mut ctx);
    }
});
