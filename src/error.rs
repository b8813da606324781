//! Error types for the assembly and finalize pipeline.
//!
//! Every failure here is fatal to its pass: there is no recovery, no retry,
//! and no partial kernel. The pipeline expects trusted, internally generated
//! assembly text, so errors carry a line-numbered diagnostic and the pass is
//! simply abandoned.

use core::fmt;

use crate::ir::VREG_COUNT;

/// Assembly or finalize error with a line-numbered diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JitError {
    /// Mnemonic not in the recognized opcode set.
    UnknownOpcode {
        /// The offending first token of the line.
        mnemonic: String,
        /// 1-based source line number.
        line: u32,
    },

    /// Too few tokens on the line for the opcode's operand count.
    MissingOperands {
        /// The opcode that was being parsed.
        mnemonic: String,
        /// Operands the opcode consumes.
        expected: usize,
        /// Operand tokens actually present.
        found: usize,
        /// 1-based source line number.
        line: u32,
    },

    /// Register token that is not an integer in the register-file range.
    BadRegister {
        /// The offending token.
        token: String,
        /// 1-based source line number.
        line: u32,
    },

    /// Constant literal that does not parse as a floating-point number.
    BadConstant {
        /// The offending literal token.
        literal: String,
        /// 1-based source line number.
        line: u32,
    },

    /// Executable memory could not be obtained or protected.
    ExecAlloc {
        /// Requested code size in bytes.
        size: usize,
        /// Operating-system error description.
        msg: String,
    },
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::UnknownOpcode { mnemonic, line } => {
                write!(f, "line {line}: unknown opcode '{mnemonic}'")
            }
            JitError::MissingOperands {
                mnemonic,
                expected,
                found,
                line,
            } => {
                write!(
                    f,
                    "line {line}: '{mnemonic}' expects {expected} operands, found {found}"
                )
            }
            JitError::BadRegister { token, line } => {
                write!(
                    f,
                    "line {line}: bad register '{token}' (expected an integer in 0..{VREG_COUNT})"
                )
            }
            JitError::BadConstant { literal, line } => {
                write!(f, "line {line}: bad constant literal '{literal}'")
            }
            JitError::ExecAlloc { size, msg } => {
                write!(f, "executable mapping of {size} bytes failed: {msg}")
            }
        }
    }
}

impl std::error::Error for JitError {}
