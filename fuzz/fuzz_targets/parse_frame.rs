#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pulsar_flow::frame::parse_frame;

// The parser must never panic, must only consume whole frames, and a
// need-more-data outcome must leave the buffer untouched.
fuzz_target!(|data: &[u8]| {
    let mut rxbuf = BytesMut::from(data);

    loop {
        let before = rxbuf.len();
        match parse_frame(&mut rxbuf) {
            Ok(Some(frame)) => {
                assert!(rxbuf.len() < before);
                // Whatever the header claimed, the payload handed back
                // is fully buffered
                assert!(frame.payload.len() <= data.len());
            }
            Ok(None) => {
                assert_eq!(rxbuf.len(), before);
                break;
            }
            Err(_) => break,
        }
    }
});
