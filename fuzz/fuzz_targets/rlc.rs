#![no_main]

use libfuzzer_sys::fuzz_target;
use berdissect::{ByteCursor, DecodeContext, Mode, Registry};
use berdissect::rlc::{decode_pdu, RlcMode};

fuzz_target!(|data: &[u8]| {
    let registry = Registry::new();
    for mode in [RlcMode::Um5, RlcMode::Um10, RlcMode::Am] {
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let (node, _) = decode_pdu(ByteCursor::new(data), mode, &mut ctx);
        assert!(node.ranges_nest());
    }
});
