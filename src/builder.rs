//! SIMD instruction builder: appends VEX-encoded x86-64 vector instructions
//! to a growing byte stream.
//!
//! This is the precision-critical layer. Every operation appends a complete,
//! architecturally exact encoding (prefix, opcode, ModR/M, displacement);
//! one wrong byte either faults the process or silently computes the wrong
//! answer. The builder trusts well-formed calls from the front-end: register
//! and width violations are programmer errors and fail fast via assertions,
//! not error returns.
//!
//! Encoding summary per operation (L and pp come from the active kind):
//!
//! | operation       | instruction                | encoding                    |
//! |-----------------|----------------------------|-----------------------------|
//! | broadcast_load  | vbroadcastss / vbroadcastsd| VEX.66.0F38.W0 18 / 19 /r   |
//! |                 | vmovddup (2 x f64)         | VEX.128.F2.0F 12 /r         |
//! | gp_load         | mov r64, [base+disp]       | REX.W 8B /r                 |
//! | vec_load        | vmovups / vmovupd          | VEX.0F 10 /r                |
//! | vec_store       | vmovups / vmovupd          | VEX.0F 11 /r                |
//! | binary          | vaddps .. vmaxpd           | VEX.NDS.0F 58..5F /r        |
//! | sqrt            | vsqrtps / vsqrtpd          | VEX.0F 51 /r                |
//! | mov             | vmovaps                    | VEX.0F 28 /r                |
//! | ret             | ret                        | C3                          |

use crate::ir::{BinOp, Gp, VReg, VectorKind};

// ─── ModR/M and displacement ────────────────────────────────────────────

/// Build a ModR/M byte.
#[inline]
fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

// ─── VEX prefix construction ────────────────────────────────────────────
//
// VEX 2-byte: [C5] [R vvvv L pp]             -> 1 opcode byte follows
// VEX 3-byte: [C4] [R X B mmmmm] [W vvvv L pp] -> 1 opcode byte follows
//
// R/X/B and vvvv are stored inverted. The opcode map (0F / 0F38) lives in
// the mmmmm field of the 3-byte form; the 2-byte form implies map 0F.

/// Opcode map field: 1 = 0F, 2 = 0F 38.
const MAP_0F: u8 = 0b00001;
const MAP_0F38: u8 = 0b00010;

/// VEX "pp" field for the implied mandatory prefix.
#[inline]
fn vex_pp(mandatory_prefix: u8) -> u8 {
    match mandatory_prefix {
        0x66 => 0b01,
        0xF3 => 0b10,
        0xF2 => 0b11,
        _ => 0b00,
    }
}

/// Byte stream builder for one straight-line vector kernel.
///
/// The stream is append-only; [`SimdBuilder::into_bytes`] freezes it for the
/// executable buffer. The active [`VectorKind`] is fixed at construction for
/// the lifetime of the builder, matching the one-kind-per-pass rule.
#[derive(Debug, Clone)]
pub struct SimdBuilder {
    kind: VectorKind,
    buf: Vec<u8>,
}

impl SimdBuilder {
    /// Create an empty builder for the given vector kind.
    #[must_use]
    pub fn new(kind: VectorKind) -> Self {
        Self {
            kind,
            buf: Vec::new(),
        }
    }

    /// The active vector kind.
    #[must_use]
    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    /// Byte size of one scalar lane under the active kind.
    #[must_use]
    pub fn scalar_size(&self) -> usize {
        self.kind.scalar_size()
    }

    /// Byte size of one full lane group under the active kind.
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.kind.group_size()
    }

    /// Encoded bytes so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Byte count so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the builder and return the finished instruction stream.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // ─── prefix / operand emission helpers ──────────────────────────────

    /// Emit the most compact VEX prefix for an instruction whose R/M side
    /// carries no extension bits beyond `b`.
    ///
    /// `reg_ext` is REX.R for the ModR/M reg field, `b_ext` is REX.B for the
    /// R/M (or base) register, `vvvv` is the NDS source register number
    /// (0 when unused: the inverted field then reads 1111).
    fn push_vex(&mut self, reg_ext: bool, b_ext: bool, map: u8, w: bool, vvvv: u8, l: bool, pp: u8) {
        // 2-byte form requires map 0F, W=0, and no X/B extension.
        if map == MAP_0F && !w && !b_ext {
            let byte = (if reg_ext { 0 } else { 0x80 })
                | (((!vvvv) & 0x0F) << 3)
                | (if l { 0x04 } else { 0 })
                | (pp & 0x03);
            self.buf.push(0xC5);
            self.buf.push(byte);
        } else {
            // X is never set: generated kernels use no index registers.
            let byte1 = (if reg_ext { 0 } else { 0x80 }) | 0x40 | (if b_ext { 0 } else { 0x20 }) | (map & 0x1F);
            let byte2 = (if w { 0x80 } else { 0 })
                | (((!vvvv) & 0x0F) << 3)
                | (if l { 0x04 } else { 0 })
                | (pp & 0x03);
            self.buf.push(0xC4);
            self.buf.push(byte1);
            self.buf.push(byte2);
        }
    }

    /// Emit ModR/M + displacement for a `[base + disp]` memory operand.
    ///
    /// Picks the shortest displacement form: mod=00 when `disp` is zero
    /// (except base RBP, which has no disp-less encoding), mod=01 with a
    /// disp8 when it fits, mod=10 with a disp32 otherwise. Base RSP needs a
    /// SIB byte with the no-index marker.
    fn push_mem(&mut self, reg_field: u8, base: Gp, disp: i32) {
        let need_sib = base.code() == 4;

        let (mod_bits, disp_size) = if disp == 0 && base.code() != 5 {
            (0b00, 0)
        } else if (-128..=127).contains(&disp) {
            (0b01, 1)
        } else {
            (0b10, 4)
        };

        if need_sib {
            self.buf.push(modrm(mod_bits, reg_field, 0b100));
            // scale=1, index=100 (none), base
            self.buf.push(0x20 | base.code());
        } else {
            self.buf.push(modrm(mod_bits, reg_field, base.code()));
        }

        match disp_size {
            1 => self.buf.push(disp as i8 as u8),
            4 => self.buf.extend_from_slice(&disp.to_le_bytes()),
            _ => {}
        }
    }

    // ─── instruction emitters ───────────────────────────────────────────

    /// Broadcast-load the scalar at `[base + disp]` into every lane of `dst`.
    ///
    /// ps kinds use `vbroadcastss`; the 256-bit pd kind uses `vbroadcastsd`.
    /// There is no xmm form of `vbroadcastsd` in AVX1, so the 128-bit pd
    /// kind uses `vmovddup` from memory, which duplicates the low quadword.
    pub fn broadcast_load(&mut self, dst: VReg, base: Gp, disp: i32) {
        match self.kind {
            VectorKind::XmmPs | VectorKind::YmmPs => {
                let l = self.kind.vex_l();
                self.push_vex(dst.is_extended(), false, MAP_0F38, false, 0, l, vex_pp(0x66));
                self.buf.push(0x18);
                self.push_mem(dst.code(), base, disp);
            }
            VectorKind::YmmPd => {
                self.push_vex(dst.is_extended(), false, MAP_0F38, false, 0, true, vex_pp(0x66));
                self.buf.push(0x19);
                self.push_mem(dst.code(), base, disp);
            }
            VectorKind::XmmPd => {
                self.push_vex(dst.is_extended(), false, MAP_0F, false, 0, false, vex_pp(0xF2));
                self.buf.push(0x12);
                self.push_mem(dst.code(), base, disp);
            }
        }
    }

    /// Load a 64-bit value from `[base + disp]` into a general-purpose
    /// register. Used to fetch a runtime pointer out of the symbol-pointer
    /// region before an indirect vector access.
    pub fn gp_load(&mut self, dst: Gp, base: Gp, disp: i32) {
        // REX.W; none of the representable GP registers need R or B.
        self.buf.push(0x48);
        self.buf.push(0x8B);
        self.push_mem(dst.code(), base, disp);
    }

    /// Unaligned vector load from `[addr]` into `dst`.
    pub fn vec_load(&mut self, dst: VReg, addr: Gp) {
        self.push_vex(dst.is_extended(), false, MAP_0F, false, 0, self.kind.vex_l(), vex_pp(self.kind.pp()));
        self.buf.push(0x10);
        self.push_mem(dst.code(), addr, 0);
    }

    /// Unaligned vector store of `src` to `[addr]`.
    pub fn vec_store(&mut self, src: VReg, addr: Gp) {
        self.push_vex(src.is_extended(), false, MAP_0F, false, 0, self.kind.vex_l(), vex_pp(self.kind.pp()));
        self.buf.push(0x11);
        self.push_mem(src.code(), addr, 0);
    }

    /// Elementwise binary operation, `dst = lhs OP rhs`.
    ///
    /// Non-destructive three-operand VEX form: `lhs` rides in VEX.vvvv,
    /// `rhs` in ModR/M r/m.
    pub fn binary(&mut self, op: BinOp, dst: VReg, lhs: VReg, rhs: VReg) {
        self.push_vex(
            dst.is_extended(),
            rhs.is_extended(),
            MAP_0F,
            false,
            lhs.code(),
            self.kind.vex_l(),
            vex_pp(self.kind.pp()),
        );
        self.buf.push(op.opcode());
        self.buf.push(modrm(0b11, dst.code(), rhs.code()));
    }

    /// Elementwise square root, `dst = sqrt(src)`.
    pub fn sqrt(&mut self, dst: VReg, src: VReg) {
        self.push_vex(
            dst.is_extended(),
            src.is_extended(),
            MAP_0F,
            false,
            0,
            self.kind.vex_l(),
            vex_pp(self.kind.pp()),
        );
        self.buf.push(0x51);
        self.buf.push(modrm(0b11, dst.code(), src.code()));
    }

    /// Full-width register-to-register copy.
    pub fn mov(&mut self, dst: VReg, src: VReg) {
        // vmovaps moves raw bits; the ps form covers every kind.
        self.push_vex(
            dst.is_extended(),
            src.is_extended(),
            MAP_0F,
            false,
            0,
            self.kind.vex_l(),
            vex_pp(0x00),
        );
        self.buf.push(0x28);
        self.buf.push(modrm(0b11, dst.code(), src.code()));
    }

    /// Near return.
    pub fn ret(&mut self) {
        self.buf.push(0xC3);
    }
}
