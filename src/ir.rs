//! Core types shared by the assembler front-end and the instruction builder.
//!
//! These are deliberately small: the kernel language has no labels, no
//! control flow, and no register allocation, so the "IR" is just the vector
//! shape selector, the register references, and the binary-operation kinds.

use core::fmt;

/// SIMD width and element type for one assembly pass.
///
/// The kind is fixed for the duration of a pass and governs two things:
/// the instruction encoding family (VEX.L bit, mandatory prefix, broadcast
/// opcode) and the size accounting of the constant and symbol tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VectorKind {
    /// 4 packed single-precision lanes in an xmm register (the default).
    #[default]
    XmmPs,
    /// 2 packed double-precision lanes in an xmm register.
    XmmPd,
    /// 8 packed single-precision lanes in a ymm register.
    YmmPs,
    /// 4 packed double-precision lanes in a ymm register.
    YmmPd,
}

impl VectorKind {
    /// Byte size of one scalar lane. Constant-table offsets advance by this.
    #[must_use]
    pub fn scalar_size(self) -> usize {
        match self {
            VectorKind::XmmPs | VectorKind::YmmPs => 4,
            VectorKind::XmmPd | VectorKind::YmmPd => 8,
        }
    }

    /// Byte size of the full lane group. Symbol-table offsets advance by this.
    #[must_use]
    pub fn group_size(self) -> usize {
        match self {
            VectorKind::XmmPs | VectorKind::XmmPd => 16,
            VectorKind::YmmPs | VectorKind::YmmPd => 32,
        }
    }

    /// Number of lanes in one register.
    #[must_use]
    pub fn lanes(self) -> usize {
        self.group_size() / self.scalar_size()
    }

    /// Whether the lanes are double-precision.
    #[must_use]
    pub fn is_f64(self) -> bool {
        matches!(self, VectorKind::XmmPd | VectorKind::YmmPd)
    }

    /// VEX.L vector-length bit: false = 128-bit, true = 256-bit.
    #[must_use]
    pub(crate) fn vex_l(self) -> bool {
        matches!(self, VectorKind::YmmPs | VectorKind::YmmPd)
    }

    /// Mandatory prefix selecting the ps (none) or pd (0x66) opcode column.
    #[must_use]
    pub(crate) fn pp(self) -> u8 {
        if self.is_f64() {
            0x66
        } else {
            0x00
        }
    }
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorKind::XmmPs => write!(f, "xmm.ps"),
            VectorKind::XmmPd => write!(f, "xmm.pd"),
            VectorKind::YmmPs => write!(f, "ymm.ps"),
            VectorKind::YmmPd => write!(f, "ymm.pd"),
        }
    }
}

/// A vector register reference, taken verbatim from the assembly text.
///
/// The register file is xmm0..=xmm15 (ymm0..=ymm15 for the 256-bit kinds).
/// Register numbers are a caller contract: the assembler performs no
/// allocation or liveness analysis, and callers are responsible for not
/// clobbering registers they still need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VReg(u8);

/// Number of addressable vector registers under VEX encoding.
pub const VREG_COUNT: u8 = 16;

impl VReg {
    /// Create a register reference.
    ///
    /// # Panics
    ///
    /// Panics if `n >= 16`. The parse front-end validates register tokens
    /// before constructing a `VReg`, so hitting this is a programmer error.
    #[must_use]
    pub fn new(n: u8) -> Self {
        assert!(n < VREG_COUNT, "vector register {n} out of range 0..{VREG_COUNT}");
        Self(n)
    }

    /// Register number, 0..=15.
    #[must_use]
    pub fn code(self) -> u8 {
        self.0
    }

    /// Whether the register needs a VEX extension bit (xmm8..=xmm15).
    #[must_use]
    pub(crate) fn is_extended(self) -> bool {
        self.0 >= 8
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// General-purpose registers the builder addresses memory through.
///
/// Only the low eight are representable; the generated kernels never touch
/// r8..r15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Gp {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
}

impl Gp {
    /// 3-bit register code for ModR/M and SIB fields.
    #[must_use]
    pub(crate) fn code(self) -> u8 {
        match self {
            Gp::Rax => 0,
            Gp::Rcx => 1,
            Gp::Rdx => 2,
            Gp::Rbx => 3,
            Gp::Rsp => 4,
            Gp::Rbp => 5,
            Gp::Rsi => 6,
            Gp::Rdi => 7,
        }
    }
}

/// Elementwise binary operations on the current vector kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinOp {
    /// Opcode byte in the 0F map, shared by the ps and pd columns.
    #[must_use]
    pub(crate) fn opcode(self) -> u8 {
        match self {
            BinOp::Add => 0x58,
            BinOp::Mul => 0x59,
            BinOp::Sub => 0x5C,
            BinOp::Min => 0x5D,
            BinOp::Div => 0x5E,
            BinOp::Max => 0x5F,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "add"),
            BinOp::Sub => write!(f, "sub"),
            BinOp::Mul => write!(f, "mul"),
            BinOp::Div => write!(f, "div"),
            BinOp::Min => write!(f, "min"),
            BinOp::Max => write!(f, "max"),
        }
    }
}
