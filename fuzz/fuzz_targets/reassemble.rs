#![no_main]

use libfuzzer_sys::fuzz_target;
use berdissect::Reassembler;
use berdissect::reassembly::FrameFormat;

// The first octet selects the chunk size, the rest is the stream.
fuzz_target!(|data: &[u8]| {
    let (step, stream) = match data.split_first() {
        Some((step, stream)) => (usize::from(*step).max(1), stream),
        None => return,
    };
    for format in [
        FrameFormat::KERBEROS, FrameFormat::LENGTH_PREFIXED, FrameFormat::BerTlv
    ] {
        let mut whole = Reassembler::new(format, 4096);
        let mut split = Reassembler::new(format, 4096);
        if whole.push(stream).is_err() {
            continue
        }
        if stream.chunks(step).map(|chunk| split.push(chunk)).any(|res| {
            res.is_err()
        }) {
            panic!("chunked stream failed where whole stream didn't");
        }
        while let Some(message) = whole.next_message() {
            assert_eq!(split.next_message(), Some(message));
        }
        assert_eq!(split.next_message(), None);
    }
});
