#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u16, u16, &[u8])| {
    let (offset, len, data) = input;
    let cfg = machoscope::ParserConfig::default();
    if let Ok(model) = machoscope::parse_container(data, &cfg) {
        let limits = machoscope::IOLimits::default();
        let _ = machoscope::read_bytes(data, &model, offset as u64, len as u64, &limits);
    }
});
