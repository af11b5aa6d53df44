use rv64vm_derive::Error;

/// Fatal conditions raised by the fetch-decode-execute loop.
///
/// Any of these aborts the current `run()`: the VM renders the message
/// through the panic callback, sets the exit code to -1 and halts. The
/// executor never resumes past one of these in the same invocation.
#[derive(Debug, Error)]
pub enum VmError {
    /// Instruction word whose low 7 bits match no known family.
    #[error("invalid opcode {opcode:#04x}")]
    InvalidOpcode { opcode: u32 },
    /// LOAD with an unknown width selector.
    #[error("invalid load width {funct3}")]
    InvalidLoadWidth { funct3: u32 },
    /// STORE with an unknown width selector.
    #[error("invalid store width {funct3}")]
    InvalidStoreWidth { funct3: u32 },
    /// OP-IMM shift whose top six bits are neither SRLI nor SRAI.
    #[error("invalid immediate shift (funct6 {funct6:#04x})")]
    InvalidImmShift { funct6: u32 },
    /// OP-IMM-32 with an unknown or malformed operation.
    #[error("invalid word immediate op (funct3 {funct3}, funct7 {funct7:#04x})")]
    InvalidImmOp32 { funct3: u32, funct7: u32 },
    /// OP with an unknown `(funct7 << 3) | funct3` dispatch key.
    #[error("invalid register arithmetic op {key:#05x}")]
    InvalidAluOp { key: u32 },
    /// OP-32 with an unknown `(funct7 << 3) | funct3` dispatch key.
    #[error("invalid word arithmetic op {key:#05x}")]
    InvalidAluOp32 { key: u32 },
    /// BRANCH with an unknown condition selector.
    #[error("invalid branch condition {funct3}")]
    InvalidBranch { funct3: u32 },
    /// SYSTEM instruction that is neither ECALL nor EBREAK.
    #[error("invalid system function {funct12:#05x}")]
    InvalidSystem { funct12: u32 },
    /// ECALL with a code that is neither exit nor a registered handler.
    #[error("invalid system call {code}")]
    InvalidSyscall { code: u64 },
    /// Memory access crossing the end of the arena.
    #[error("memory access out of range: {addr:#x}+{width}")]
    OutOfRange { addr: u64, width: usize },
}
