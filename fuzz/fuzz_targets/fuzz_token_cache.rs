#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary cache file contents must decode or fail, never panic
    let _ = ladning::token_cache::decode_cache_file(data);
});
