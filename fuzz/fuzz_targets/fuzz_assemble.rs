#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the one-shot assembler for every kind — must never panic, only
    // return Ok/Err. Finalization is not fuzzed: mapping executable pages
    // per input would dominate the run without exercising new code.
    for kind in [
        vecjit::VectorKind::XmmPs,
        vecjit::VectorKind::XmmPd,
        vecjit::VectorKind::YmmPs,
        vecjit::VectorKind::YmmPd,
    ] {
        let _ = vecjit::assemble(data, kind);
    }

    // The incremental path: one emit call per line.
    let mut asm = vecjit::Assembler::new(vecjit::VectorKind::XmmPs);
    for line in data.lines() {
        if asm.emit(line).is_err() {
            return;
        }
    }
    let _ = asm.finish();
});
