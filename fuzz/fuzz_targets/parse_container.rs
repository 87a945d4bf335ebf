#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cfg = machoscope::ParserConfig::default();
    cfg.parallel = false;
    if let Ok(model) = machoscope::parse_container(data, &cfg) {
        for slice in &model.slices {
            let _ = machoscope::analysis::layout::LayoutReport::build(slice);
        }
    }
});
