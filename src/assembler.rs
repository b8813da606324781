//! Line assembler: parses the kernel dialect and drives the builder.
//!
//! Processing is strictly sequential, one line at a time, in source order.
//! The assembler owns the constant and symbol tables, resolves names to
//! byte offsets (allocating on first use), validates argument counts before
//! touching any operand, and translates each line into builder calls.
//! Everything else is pure translation; the table lookups are the only
//! mutation of shared state.

use std::collections::BTreeMap;

use tracing::debug;

use crate::builder::SimdBuilder;
use crate::error::JitError;
use crate::ir::{BinOp, Gp, VReg, VectorKind, VREG_COUNT};

/// A resolved constant-pool slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstEntry {
    /// The literal exactly as written in the source. Distinct spellings of
    /// the same value ("2.0" vs "2.00") are distinct entries.
    pub expr: String,
    /// The parsed numeric value (narrowed to f32 for the ps kinds when the
    /// pool is synthesized).
    pub value: f64,
    /// Byte offset into the constant pool.
    pub offset: u32,
}

/// A resolved symbol-pointer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymEntry {
    /// The symbol name as written in the source.
    pub name: String,
    /// Byte offset of this symbol's data pointer within the symbol-pointer
    /// region. Entries are spaced one vector group apart.
    pub offset: u32,
}

/// Builder-pattern assembler for one pass.
///
/// Tables and the instruction stream are created fresh per pass; nothing is
/// reused across passes. [`Assembler::emit`] may be called repeatedly and
/// line numbers keep counting across calls.
///
/// # Examples
///
/// ```
/// use vecjit::{Assembler, VectorKind};
///
/// let mut asm = Assembler::new(VectorKind::XmmPs);
/// asm.emit("ldi 0 2.0\nldi 1 3.0\nadd 2 0 1\nsts 2 out")?;
/// let program = asm.finish();
/// assert_eq!(program.constant_offset("2.0"), Some(0));
/// assert_eq!(program.constant_offset("3.0"), Some(4));
/// assert_eq!(program.symbol_offset("out"), Some(0));
/// # Ok::<(), vecjit::JitError>(())
/// ```
#[derive(Debug)]
pub struct Assembler {
    kind: VectorKind,
    builder: SimdBuilder,
    consts: BTreeMap<String, (u32, f64)>,
    syms: BTreeMap<String, u32>,
    const_offset: u32,
    sym_offset: u32,
    /// Running 1-based line number across `emit` calls, for diagnostics.
    line: u32,
}

impl Assembler {
    /// Create an assembler for the given vector kind.
    ///
    /// The kind is explicit configuration for the pass, fixed until
    /// [`Assembler::finish`].
    #[must_use]
    pub fn new(kind: VectorKind) -> Self {
        Self {
            kind,
            builder: SimdBuilder::new(kind),
            consts: BTreeMap::new(),
            syms: BTreeMap::new(),
            const_offset: 0,
            sym_offset: 0,
            line: 0,
        }
    }

    /// The active vector kind.
    #[must_use]
    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    /// Parse and encode a chunk of source text, line by line.
    ///
    /// Blank lines are skipped. Each non-blank line is split on whitespace
    /// into a command token and operand tokens; argument counts are checked
    /// before any operand is read.
    ///
    /// # Errors
    ///
    /// Returns a [`JitError`] for an unknown opcode, a line with too few
    /// tokens, a register token outside `0..16`, or an unparseable constant
    /// literal. On error the pass is poisoned in the only way that matters:
    /// no kernel is produced, because the caller never reaches `finish`.
    pub fn emit(&mut self, source: &str) -> Result<(), JitError> {
        for raw in source.lines() {
            self.line += 1;
            let mut tokens = raw.split_whitespace();
            let Some(cmd) = tokens.next() else {
                continue;
            };
            let ops: Vec<&str> = tokens.collect();
            self.statement(cmd, &ops)?;
        }
        Ok(())
    }

    /// Translate one statement into builder calls.
    fn statement(&mut self, cmd: &str, ops: &[&str]) -> Result<(), JitError> {
        match cmd {
            // rdi points to the constant pool
            "ldi" => {
                self.need(cmd, ops, 2)?;
                let dst = self.vreg(ops[0])?;
                let offset = self.constant_slot(ops[1])?;
                self.builder.broadcast_load(dst, Gp::Rdi, offset as i32);
            }

            // rsi points to the symbol-pointer region; the data pointer is
            // fetched into the scratch register, then dereferenced
            "lds" => {
                self.need(cmd, ops, 2)?;
                let dst = self.vreg(ops[0])?;
                let offset = self.symbol_slot(ops[1]);
                self.builder.gp_load(Gp::Rax, Gp::Rsi, offset as i32);
                self.builder.vec_load(dst, Gp::Rax);
            }

            "sts" => {
                self.need(cmd, ops, 2)?;
                let src = self.vreg(ops[0])?;
                let offset = self.symbol_slot(ops[1]);
                self.builder.gp_load(Gp::Rax, Gp::Rsi, offset as i32);
                self.builder.vec_store(src, Gp::Rax);
            }

            "add" | "sub" | "mul" | "div" | "min" | "max" => {
                self.need(cmd, ops, 3)?;
                let dst = self.vreg(ops[0])?;
                let lhs = self.vreg(ops[1])?;
                let rhs = self.vreg(ops[2])?;
                let op = match cmd {
                    "add" => BinOp::Add,
                    "sub" => BinOp::Sub,
                    "mul" => BinOp::Mul,
                    "div" => BinOp::Div,
                    "min" => BinOp::Min,
                    _ => BinOp::Max,
                };
                self.builder.binary(op, dst, lhs, rhs);
            }

            "sqrt" => {
                self.need(cmd, ops, 2)?;
                let dst = self.vreg(ops[0])?;
                let src = self.vreg(ops[1])?;
                self.builder.sqrt(dst, src);
            }

            "mov" => {
                self.need(cmd, ops, 2)?;
                let dst = self.vreg(ops[0])?;
                let src = self.vreg(ops[1])?;
                self.builder.mov(dst, src);
            }

            _ => {
                return Err(JitError::UnknownOpcode {
                    mnemonic: cmd.into(),
                    line: self.line,
                })
            }
        }
        Ok(())
    }

    /// Check the operand count before any operand is accessed.
    fn need(&self, mnemonic: &str, ops: &[&str], expected: usize) -> Result<(), JitError> {
        if ops.len() < expected {
            return Err(JitError::MissingOperands {
                mnemonic: mnemonic.into(),
                expected,
                found: ops.len(),
                line: self.line,
            });
        }
        Ok(())
    }

    /// Parse a register token against the fixed register file.
    fn vreg(&self, token: &str) -> Result<VReg, JitError> {
        match token.parse::<u8>() {
            Ok(n) if n < VREG_COUNT => Ok(VReg::new(n)),
            _ => Err(JitError::BadRegister {
                token: token.into(),
                line: self.line,
            }),
        }
    }

    /// Look up a constant literal, allocating a pool slot on first use.
    ///
    /// Offsets are assigned sequentially in first-seen order, advancing by
    /// the scalar size of the active kind. The literal is parsed here so a
    /// finished program can always synthesize its pool.
    fn constant_slot(&mut self, expr: &str) -> Result<u32, JitError> {
        if let Some(&(offset, _)) = self.consts.get(expr) {
            return Ok(offset);
        }
        let value: f64 = expr.parse().map_err(|_| JitError::BadConstant {
            literal: expr.into(),
            line: self.line,
        })?;
        let offset = self.const_offset;
        self.const_offset += self.builder.scalar_size() as u32;
        self.consts.insert(expr.into(), (offset, value));
        Ok(offset)
    }

    /// Look up a symbol name, allocating a pointer slot on first use.
    ///
    /// Offsets advance by the full vector-group size of the active kind;
    /// the table doubles as the declaration mechanism, so an unseen name is
    /// allocated rather than rejected.
    fn symbol_slot(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.syms.get(name) {
            return offset;
        }
        let offset = self.sym_offset;
        self.sym_offset += self.builder.group_size() as u32;
        self.syms.insert(name.into(), offset);
        offset
    }

    /// Append the trailing return and freeze the pass into a [`Program`].
    #[must_use]
    pub fn finish(mut self) -> Program {
        self.builder.ret();

        let mut constants: Vec<ConstEntry> = self
            .consts
            .into_iter()
            .map(|(expr, (offset, value))| ConstEntry {
                expr,
                value,
                offset,
            })
            .collect();
        constants.sort_by_key(|c| c.offset);

        let mut symbols: Vec<SymEntry> = self
            .syms
            .into_iter()
            .map(|(name, offset)| SymEntry { name, offset })
            .collect();
        symbols.sort_by_key(|s| s.offset);

        let program = Program {
            kind: self.kind,
            bytes: self.builder.into_bytes(),
            constants,
            symbols,
        };
        debug!(
            kind = %program.kind,
            bytes = program.bytes.len(),
            constants = program.constants.len(),
            symbols = program.symbols.len(),
            "assembled kernel: {}",
            program.hex_dump()
        );
        program
    }
}

/// The finished artifact of one assembly pass: the immutable instruction
/// stream plus the resolved table layout a host needs to build the runtime
/// memory the kernel will address.
#[derive(Debug, Clone)]
pub struct Program {
    kind: VectorKind,
    bytes: Vec<u8>,
    constants: Vec<ConstEntry>,
    symbols: Vec<SymEntry>,
}

impl Program {
    /// The vector kind the program was assembled for.
    #[must_use]
    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    /// The encoded instruction stream, ending in `ret`.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte count of the instruction stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: the stream holds at least the trailing return.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Resolved constants in pool-offset order.
    #[must_use]
    pub fn constants(&self) -> &[ConstEntry] {
        &self.constants
    }

    /// Resolved symbols in region-offset order.
    #[must_use]
    pub fn symbols(&self) -> &[SymEntry] {
        &self.symbols
    }

    /// Byte offset of a constant literal, if it appeared in the source.
    #[must_use]
    pub fn constant_offset(&self, expr: &str) -> Option<u32> {
        self.constants
            .iter()
            .find(|c| c.expr == expr)
            .map(|c| c.offset)
    }

    /// Byte offset of a symbol's pointer slot, if the name appeared.
    #[must_use]
    pub fn symbol_offset(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.offset)
    }

    /// Synthesize the constant pool: every literal's value at its resolved
    /// offset, in the scalar width of the program's kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use vecjit::{assemble, VectorKind};
    ///
    /// let program = assemble("ldi 0 2.0\nldi 1 3.0", VectorKind::XmmPs)?;
    /// let pool = program.constant_pool();
    /// assert_eq!(pool.len(), 8);
    /// assert_eq!(&pool[0..4], &2.0f32.to_le_bytes());
    /// assert_eq!(&pool[4..8], &3.0f32.to_le_bytes());
    /// # Ok::<(), vecjit::JitError>(())
    /// ```
    #[must_use]
    pub fn constant_pool(&self) -> Vec<u8> {
        let scalar = self.kind.scalar_size();
        let len = self
            .constants
            .iter()
            .map(|c| c.offset as usize + scalar)
            .max()
            .unwrap_or(0);
        let mut pool = vec![0u8; len];
        for c in &self.constants {
            let at = c.offset as usize;
            if self.kind.is_f64() {
                pool[at..at + 8].copy_from_slice(&c.value.to_le_bytes());
            } else {
                pool[at..at + 4].copy_from_slice(&(c.value as f32).to_le_bytes());
            }
        }
        pool
    }

    /// Byte size of the symbol-pointer region the kernel expects: one
    /// vector-group-sized slot per symbol.
    #[must_use]
    pub fn symbol_region_len(&self) -> usize {
        self.symbols.len() * self.kind.group_size()
    }

    /// Build the symbol-pointer region by resolving each symbol name to its
    /// data-array pointer. Each resolved pointer is written as an 8-byte
    /// little-endian value at the symbol's slot offset.
    #[must_use]
    pub fn bind_symbols<F>(&self, mut resolve: F) -> Vec<u8>
    where
        F: FnMut(&str) -> *mut u8,
    {
        let mut region = vec![0u8; self.symbol_region_len()];
        for sym in &self.symbols {
            let ptr = resolve(&sym.name) as u64;
            let at = sym.offset as usize;
            region[at..at + 8].copy_from_slice(&ptr.to_le_bytes());
        }
        region
    }

    /// Single-line uppercase hex rendering of the instruction stream.
    fn hex_dump(&self) -> String {
        use core::fmt::Write;
        let mut out = String::with_capacity(self.bytes.len() * 3);
        for b in &self.bytes {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{b:02X}");
        }
        out
    }

    /// Human-readable hex listing of the instruction stream, eight bytes
    /// per row. Observational output for debugging, not a stable format.
    ///
    /// # Examples
    ///
    /// ```
    /// use vecjit::{assemble, VectorKind};
    ///
    /// let program = assemble("", VectorKind::XmmPs)?;
    /// assert_eq!(program.listing(), "00000000  C3\n");
    /// # Ok::<(), vecjit::JitError>(())
    /// ```
    #[must_use]
    pub fn listing(&self) -> String {
        use core::fmt::Write;
        let mut out = String::new();
        for (row, chunk) in self.bytes.chunks(8).enumerate() {
            let _ = write!(out, "{:08X} ", row * 8);
            for b in chunk {
                let _ = write!(out, " {b:02X}");
            }
            out.push('\n');
        }
        out
    }

    /// Finalize the instruction stream into executable memory.
    ///
    /// The program itself is unchanged; the returned [`crate::Kernel`] owns
    /// a private copy of the code.
    ///
    /// # Errors
    ///
    /// Returns [`JitError::ExecAlloc`] when the executable mapping fails.
    #[cfg(unix)]
    pub fn load(&self) -> Result<crate::exec::Kernel, JitError> {
        crate::exec::Kernel::finalize(&self.bytes)
    }
}
