#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must either decode cleanly or fail with a defined
    // error; panics and hangs are bugs.
    let _ = xbis::decode(data);
});
