//! Runtime tests: assemble, finalize into executable memory, and invoke.
//!
//! These execute generated AVX code, so they are compiled only for x86-64
//! unix hosts and skip themselves when the CPU lacks AVX.

#![cfg(all(target_arch = "x86_64", unix))]

use std::sync::Arc;

use vecjit::{assemble, compile, Program, VectorKind};

fn avx() -> bool {
    std::arch::is_x86_feature_detected!("avx")
}

fn run(program: &Program, consts: &[u8], syms: &[u8]) {
    let kernel = program.load().unwrap();
    unsafe { kernel.invoke(consts.as_ptr(), syms.as_ptr()) };
}

/// An empty program performs no memory access beyond its return.
#[test]
fn empty_program_does_not_fault() {
    let program = assemble("", VectorKind::XmmPs).unwrap();
    let consts = [0u8; 16];
    let syms = [0u8; 16];
    run(&program, &consts, &syms);
}

/// `lds` then `sts` of the same symbol leaves the buffer unchanged.
#[test]
fn load_store_roundtrip_is_identity() {
    if !avx() {
        return;
    }
    let program = assemble("lds 0 x\nsts 0 x", VectorKind::XmmPs).unwrap();
    let mut data = [1.0f32, -2.0, 3.25, 4.0];
    let syms = program.bind_symbols(|_| data.as_mut_ptr().cast::<u8>());
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(data, [1.0, -2.0, 3.25, 4.0]);
}

/// 2.0 + 3.0 broadcast across all four lanes of `out`.
#[test]
fn broadcast_add_fills_every_lane() {
    if !avx() {
        return;
    }
    let program = assemble(
        "ldi 0 2.0\nldi 1 3.0\nadd 2 0 1\nsts 2 out",
        VectorKind::XmmPs,
    )
    .unwrap();
    let mut out = [0.0f32; 4];
    let syms = program.bind_symbols(|_| out.as_mut_ptr().cast::<u8>());
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(out, [5.0; 4]);
}

/// The same literal mentioned twice resolves to one slot and still computes.
#[test]
fn deduplicated_constant_still_computes() {
    if !avx() {
        return;
    }
    let program = assemble("ldi 0 2.0\nldi 1 2.0\nadd 2 0 1\nsts 2 out", VectorKind::XmmPs).unwrap();
    assert_eq!(program.constants().len(), 1);
    let mut out = [0.0f32; 4];
    let syms = program.bind_symbols(|_| out.as_mut_ptr().cast::<u8>());
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(out, [4.0; 4]);
}

/// Elementwise product of two input arrays into a third symbol.
#[test]
fn elementwise_product_of_two_symbols() {
    if !avx() {
        return;
    }
    let program = assemble("lds 0 a\nlds 1 b\nmul 2 0 1\nsts 2 c", VectorKind::XmmPs).unwrap();
    let mut a = [1.0f32, 2.0, 3.0, 4.0];
    let mut b = [10.0f32, 20.0, 30.0, 40.0];
    let mut c = [0.0f32; 4];
    let pa = a.as_mut_ptr().cast::<u8>();
    let pb = b.as_mut_ptr().cast::<u8>();
    let pc = c.as_mut_ptr().cast::<u8>();
    let syms = program.bind_symbols(|name| match name {
        "a" => pa,
        "b" => pb,
        _ => pc,
    });
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(c, [10.0, 40.0, 90.0, 160.0]);
}

/// sub / div / min / max / sqrt / mov all compute lane-independent results.
#[test]
fn full_operation_mix() {
    if !avx() {
        return;
    }
    // out = max(min(sqrt((a - 1.0) / 2.0), 4.0), 0.5), via a mov hop
    let src = "lds 0 a\n\
               ldi 1 1.0\n\
               sub 2 0 1\n\
               ldi 3 2.0\n\
               div 4 2 3\n\
               sqrt 5 4\n\
               mov 6 5\n\
               ldi 7 4.0\n\
               min 8 6 7\n\
               ldi 9 0.5\n\
               max 10 8 9\n\
               sts 10 out";
    let program = assemble(src, VectorKind::XmmPs).unwrap();
    let mut a = [1.0f32, 3.0, 9.0, 201.0];
    let mut out = [0.0f32; 4];
    let pa = a.as_mut_ptr().cast::<u8>();
    let pout = out.as_mut_ptr().cast::<u8>();
    let syms = program.bind_symbols(|name| if name == "a" { pa } else { pout });
    run(&program, &program.constant_pool(), &syms);
    // sqrt(0/2)=0 -> clamped up to 0.5; sqrt(1)=1; sqrt(4)=2; sqrt(100)=10 -> clamped to 4
    assert_eq!(out, [0.5, 1.0, 2.0, 4.0]);
}

/// Double-precision kind: two lanes of f64.
#[test]
fn xmm_pd_kernel_computes_f64_lanes() {
    if !avx() {
        return;
    }
    let program = assemble(
        "lds 0 x\nldi 1 0.5\nmul 2 0 1\nsts 2 out",
        VectorKind::XmmPd,
    )
    .unwrap();
    assert_eq!(program.kind().lanes(), 2);
    let mut x = [3.0f64, 8.0];
    let mut out = [0.0f64; 2];
    let px = x.as_mut_ptr().cast::<u8>();
    let pout = out.as_mut_ptr().cast::<u8>();
    let syms = program.bind_symbols(|name| if name == "x" { px } else { pout });
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(out, [1.5, 4.0]);
}

/// 256-bit kinds drive eight f32 lanes (or four f64 lanes) per group.
#[test]
fn ymm_kernels_cover_wide_groups() {
    if !avx() {
        return;
    }
    let program = assemble("lds 0 x\nldi 1 10.0\nadd 2 0 1\nsts 2 out", VectorKind::YmmPs).unwrap();
    let mut x = [0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let mut out = [0.0f32; 8];
    let px = x.as_mut_ptr().cast::<u8>();
    let pout = out.as_mut_ptr().cast::<u8>();
    let syms = program.bind_symbols(|name| if name == "x" { px } else { pout });
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(out, [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0]);

    let program = assemble("lds 0 x\nsqrt 1 0\nsts 1 out", VectorKind::YmmPd).unwrap();
    let mut x = [1.0f64, 4.0, 9.0, 16.0];
    let mut out = [0.0f64; 4];
    let px = x.as_mut_ptr().cast::<u8>();
    let pout = out.as_mut_ptr().cast::<u8>();
    let syms = program.bind_symbols(|name| if name == "x" { px } else { pout });
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
}

/// Extended registers (xmm8..xmm15) carry values end to end.
#[test]
fn extended_registers_compute() {
    if !avx() {
        return;
    }
    let program = assemble(
        "ldi 8 6.0\nldi 15 7.0\nmul 9 8 15\nsts 9 out",
        VectorKind::XmmPs,
    )
    .unwrap();
    let mut out = [0.0f32; 4];
    let syms = program.bind_symbols(|_| out.as_mut_ptr().cast::<u8>());
    run(&program, &program.constant_pool(), &syms);
    assert_eq!(out, [42.0; 4]);
}

/// One-shot `compile` produces a working kernel directly.
#[test]
fn one_shot_compile_runs() {
    if !avx() {
        return;
    }
    // Layout is fixed by first-use order, so the host can build the pool
    // without the Program: single constant at offset 0, single symbol slot
    // at offset 0.
    let kernel = compile("ldi 0 9.0\nsqrt 1 0\nsts 1 out", VectorKind::XmmPs).unwrap();
    let pool = 9.0f32.to_le_bytes();
    let mut out = [0.0f32; 4];
    let mut syms = [0u8; 16];
    syms[0..8].copy_from_slice(&(out.as_mut_ptr() as u64).to_le_bytes());
    unsafe { kernel.invoke(pool.as_ptr(), syms.as_ptr()) };
    assert_eq!(out, [3.0; 4]);
}

/// A finalized kernel is reentrant: concurrent invocations over disjoint
/// symbol memory are safe.
#[test]
fn concurrent_invocation_over_disjoint_buffers() {
    if !avx() {
        return;
    }
    let program = assemble("lds 0 x\nldi 1 2.0\nmul 2 0 1\nsts 2 x", VectorKind::XmmPs).unwrap();
    let kernel = Arc::new(program.load().unwrap());
    let pool = program.constant_pool();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let kernel = Arc::clone(&kernel);
            let program = program.clone();
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut data = [t as f32; 4];
                let syms = program.bind_symbols(|_| data.as_mut_ptr().cast::<u8>());
                for _ in 0..100 {
                    unsafe { kernel.invoke(pool.as_ptr(), syms.as_ptr()) };
                }
                data
            })
        })
        .collect();

    for (t, handle) in handles.into_iter().enumerate() {
        let data = handle.join().unwrap();
        // x doubled 100 times
        let expected = (t as f32) * 2.0f32.powi(100);
        assert_eq!(data, [expected; 4]);
    }
}

/// Kernel handles outlive the assembler state that produced them.
#[test]
fn kernel_outlives_its_program() {
    if !avx() {
        return;
    }
    let (kernel, pool, syms, out_ptr);
    let mut out = [0.0f32; 4];
    {
        let program = assemble("ldi 0 1.0\nsts 0 out", VectorKind::XmmPs).unwrap();
        out_ptr = out.as_mut_ptr().cast::<u8>();
        pool = program.constant_pool();
        syms = program.bind_symbols(|_| out_ptr);
        kernel = program.load().unwrap();
        // program dropped here
    }
    unsafe { kernel.invoke(pool.as_ptr(), syms.as_ptr()) };
    assert_eq!(out, [1.0; 4]);
}
