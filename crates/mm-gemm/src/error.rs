use std::fmt;

use thiserror::Error;

/// Identifies one of the three GEMM operands in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
    C,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::A => write!(f, "A"),
            Operand::B => write!(f, "B"),
            Operand::C => write!(f, "C"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GemmError {
    #[error("leading dimension of {operand} is {ld}, expected at least {min}")]
    LeadingDimension { operand: Operand, ld: usize, min: usize },
    #[error("{operand} holds {got} elements but the operation needs {needed}")]
    BufferTooSmall {
        operand: Operand,
        needed: usize,
        got: usize,
    },
    #[error("{operand} spans more than usize::MAX elements with leading dimension {ld}")]
    ExtentOverflow { operand: Operand, ld: usize },
    #[error("matmul dimension mismatch: [{m}x{k}] @ [{k2}x{n}]")]
    MatmulMismatch {
        m: usize,
        k: usize,
        k2: usize,
        n: usize,
    },
    #[error("range {start}..{end} out of bounds for buffer of {len} elements")]
    OutOfRange { start: usize, end: usize, len: usize },
    #[error("{what} = {value} does not fit in a 32-bit device index")]
    IndexOverflow { what: &'static str, value: usize },
    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),
    #[error("{kernel} kernel does not support the {variant} variant")]
    UnsupportedVariant {
        kernel: &'static str,
        variant: &'static str,
    },
    #[error("no accelerator device available")]
    DeviceUnavailable,
    #[error("device call {op} failed with code {code}: {message}")]
    Device {
        op: &'static str,
        code: isize,
        message: String,
    },
}

impl GemmError {
    /// Device failure without an `NSError` payload (nil return values).
    pub fn device(op: &'static str, message: impl Into<String>) -> Self {
        GemmError::Device {
            op,
            code: -1,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GemmError>;
