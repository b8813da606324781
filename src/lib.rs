//! # vecjit — runtime x86-64 SIMD kernel assembler
//!
//! `vecjit` turns a tiny, line-oriented vector assembly dialect into native
//! AVX machine code at runtime, packed into an executable memory buffer and
//! exposed as a callable compute kernel. It exists so per-element numeric
//! expressions over large arrays (fields over points, vertices, particles)
//! run at native vector speed instead of through an interpreter.
//!
//! ## Quick Start
//!
//! ```rust
//! use vecjit::{assemble, VectorKind};
//!
//! // out[i] = 2.0 + 3.0, broadcast across every lane
//! let program = assemble(
//!     "ldi 0 2.0\nldi 1 3.0\nadd 2 0 1\nsts 2 out",
//!     VectorKind::XmmPs,
//! ).unwrap();
//! assert_eq!(program.symbol_offset("out"), Some(0));
//! assert_eq!(program.bytes().last(), Some(&0xC3)); // trailing ret
//! ```
//!
//! On a unix x86-64 host, `program.load()` maps the stream into executable
//! memory and yields a [`Kernel`] whose entry takes two base pointers: the
//! constant pool and the symbol-pointer table (`rdi`/`rsi` under the System V
//! calling convention).
//!
//! ## The dialect
//!
//! One instruction per line, whitespace-separated tokens, case-sensitive
//! mnemonics, no comments, no labels, no control flow:
//!
//! | line | effect |
//! |------|--------|
//! | `ldi dst const` | broadcast a constant-pool scalar into every lane of `dst` |
//! | `lds dst sym`   | load the vector group addressed by `sym`'s data pointer |
//! | `sts src sym`   | store `src` through `sym`'s data pointer |
//! | `add/sub/mul/div/min/max dst lhs rhs` | elementwise binary arithmetic |
//! | `sqrt dst src`  | elementwise square root |
//! | `mov dst src`   | full-width register copy |
//!
//! Register operands are plain integers into a fixed file of 16 vector
//! registers. The assembler performs no register allocation: indices are a
//! caller contract, and callers avoid clobbering registers they still need.
//! Constants and symbols are declared implicitly at first use; repeated
//! mentions resolve to the same offset for the life of the pass.

// ── Lint policy ──────────────────────────────────────────────────────────
// An instruction encoder lives on narrowing casts between integer widths
// and dense hex literals; these lints are expected and acceptable here.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::uninlined_format_args,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

/// Line front-end: tables, parsing, and the finished `Program`.
pub mod assembler;
/// VEX instruction emission and offset-aware memory operands.
pub mod builder;
/// Error types for the assembly and finalize pipeline.
pub mod error;
/// Vector kinds, register references, and operation kinds.
pub mod ir;

/// Executable memory and the callable kernel handle (unix only).
#[cfg(unix)]
pub mod exec;

// Re-exports
pub use assembler::{Assembler, ConstEntry, Program, SymEntry};
pub use builder::SimdBuilder;
pub use error::JitError;
pub use ir::{BinOp, Gp, VReg, VectorKind, VREG_COUNT};

#[cfg(unix)]
pub use exec::{Kernel, KernelFn};

/// Assemble a complete source text into a [`Program`].
///
/// One pass, line by line, in source order; on success the instruction
/// stream ends in a return instruction and the constant/symbol layout is
/// frozen.
///
/// # Errors
///
/// Returns [`JitError`] on the first malformed line or unknown opcode; no
/// program is produced on error.
///
/// # Examples
///
/// ```rust
/// use vecjit::{assemble, VectorKind};
///
/// let program = assemble("lds 0 x\nsts 0 x", VectorKind::XmmPs).unwrap();
/// assert_eq!(program.symbols().len(), 1);
/// ```
pub fn assemble(source: &str, kind: VectorKind) -> Result<Program, JitError> {
    let mut asm = Assembler::new(kind);
    asm.emit(source)?;
    Ok(asm.finish())
}

/// One-shot convenience: assemble and finalize into a callable [`Kernel`].
///
/// Equivalent to `assemble(source, kind)?.load()`. Use [`assemble`] when the
/// caller also needs the table layout to build the kernel's runtime memory;
/// the intermediate [`Program`] is dropped here.
///
/// # Errors
///
/// Returns [`JitError`] on malformed input or executable-mapping failure.
#[cfg(unix)]
pub fn compile(source: &str, kind: VectorKind) -> Result<Kernel, JitError> {
    assemble(source, kind)?.load()
}
