#![no_main]

mod utils;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes from the control channel must only ever produce an error.
    let _ = nova_replay::decode_completion_bytes(utils::truncate(data));
});
