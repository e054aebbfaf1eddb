use crate::{
    ast::{Address, Instruction, Label, Number, Program, Source, Subroutine, Width},
    lexer::{OperationName, RegisterName},
    symtab::Symtab,
};


#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkerError {
    #[error("[line {line}] Error Could not find subroutine: {name}")]
    UndefinedLabel { line: usize, name: String },

    #[error("[line {line}] Error Program does not fit in 64K, overflowing at: {name}")]
    AddressOverflow { line: usize, name: String },
}

/// Lays subroutines out in the image and writes their bytes.
///
/// Linking is two passes over the same subroutine order. The first records
/// where every subroutine starts, the second emits. Jumps can therefore
/// target subroutines laid out after them.
pub struct Linker {
    symtab: Symtab,
    data: Vec<u8>,
}

impl Linker {
    #[inline]
    pub fn new() -> Self {
        Self {
            symtab: Symtab::new(),
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn symtab(&self) -> &Symtab {
        &self.symtab
    }

    #[must_use]
    pub fn link(mut self, program: &Program) -> Result<Vec<u8>, LinkerError> {
        let layout = program.layout();
        self.assign_addresses(&layout)?;

        self.data.reserve(program.size());
        for subroutine in layout {
            subroutine.compile(&mut self)?;
        }
        log::debug!("emitted {} byte(s)", self.data.len());
        Ok(self.data)
    }

    /// Binds every subroutine name to its start offset. The end of the image
    /// must stay addressable so a `NextAddr` after the last instruction still
    /// fits in 16 bits.
    pub fn assign_addresses(&mut self, layout: &[&Subroutine]) -> Result<(), LinkerError> {
        let mut offset = 0usize;
        for subroutine in layout {
            let address = Self::address(offset, subroutine)?;
            self.symtab.insert(subroutine.name.clone(), address);
            offset += subroutine.size();
            Self::address(offset, subroutine)?;
        }

        if log::log_enabled!(log::Level::Debug) {
            let mut table: Vec<_> = self.symtab.into_iter().collect();
            table.sort_by_key(|(_, address)| **address);
            log::debug!("{} subroutine(s), {offset} byte(s)", self.symtab.len());
            for (name, address) in table {
                log::debug!("  ${address:04X} {name}");
            }
        }
        Ok(())
    }

    fn address(offset: usize, subroutine: &Subroutine) -> Result<u16, LinkerError> {
        u16::try_from(offset).map_err(|_| LinkerError::AddressOverflow {
            line: subroutine.line,
            name: subroutine.name.clone(),
        })
    }

    /// Current write position. Pass one keeps the image within the 16-bit
    /// address space.
    #[inline]
    fn here(&self) -> u16 {
        self.data.len() as u16
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// `(opcode << 4) | (immediate << 3) | register`
    #[inline]
    fn write_first_byte(&mut self, op: OperationName, immediate: bool, reg: Option<RegisterName>) {
        let reg = reg.map_or(0, RegisterName::code);
        self.write(&[(op.opcode() << 4) | ((immediate as u8) << 3) | reg]);
    }

    /// Register pairs put the second register in the top bits of a byte of
    /// its own.
    #[inline]
    fn write_registers(&mut self, op: OperationName, dst: RegisterName, src: RegisterName) {
        self.write_first_byte(op, false, Some(dst));
        self.write(&[src.code() << 5]);
    }

    #[inline]
    fn write_number(&mut self, number: &Number) {
        match number.width {
            Width::Imm8 => self.write(&[number.value as u8]),
            Width::Imm16 => self.write(&number.value.to_be_bytes()),
        }
    }
}

impl Label {
    fn compile(&self, linker: &mut Linker) -> Result<(), LinkerError> {
        match linker.symtab.bytes(&self.name) {
            Some(bytes) => {
                linker.write(&bytes);
                Ok(())
            }
            None => Err(LinkerError::UndefinedLabel {
                line: self.line,
                name: self.name.clone(),
            }),
        }
    }
}

impl Address {
    fn compile(&self, linker: &mut Linker) -> Result<(), LinkerError> {
        match self {
            // The address just past this 2-byte field
            Self::NextAddr => {
                let next = linker.here() + 2;
                linker.write(&next.to_be_bytes());
            }
            Self::Immediate(number) => linker.write_number(number),
            Self::Label(label) => label.compile(linker)?,
        }
        Ok(())
    }
}

impl Instruction {
    fn compile(&self, linker: &mut Linker) -> Result<(), LinkerError> {
        let op = self.operation();
        match self {
            Self::Nop | Self::Hlt => linker.write_first_byte(op, false, None),
            Self::Pop(reg) => linker.write_first_byte(op, false, Some(*reg)),

            Self::Push(src) | Self::Tel(src) | Self::Out(src) => match src {
                Source::Register(reg) => linker.write_first_byte(op, false, Some(*reg)),
                Source::Immediate(number) => {
                    linker.write_first_byte(op, true, None);
                    linker.write_number(number);
                }
            },

            Self::Mw(dst, src) | Self::Add(dst, src) | Self::Sub(dst, src) => match src {
                Source::Register(reg) => linker.write_registers(op, *dst, *reg),
                Source::Immediate(number) => {
                    linker.write_first_byte(op, true, Some(*dst));
                    linker.write_number(number);
                }
            },

            Self::Lw(reg, addr) | Self::Sw(reg, addr) => {
                linker.write_first_byte(op, addr.is_some(), Some(*reg));
                if let Some(number) = addr {
                    linker.write_number(number);
                }
            }

            Self::Lda(addr) => {
                linker.write_first_byte(op, true, None);
                addr.compile(linker)?;
            }

            Self::Jmp(target) | Self::Jo(target) => {
                linker.write_first_byte(op, target.is_some(), None);
                if let Some(label) = target {
                    label.compile(linker)?;
                }
            }

            Self::Jz(reg, target) => {
                linker.write_first_byte(op, target.is_some(), Some(*reg));
                if let Some(label) = target {
                    label.compile(linker)?;
                }
            }
        }
        Ok(())
    }
}

impl Subroutine {
    fn compile(&self, linker: &mut Linker) -> Result<(), LinkerError> {
        for instruction in &self.instructions {
            let start = linker.data.len();
            instruction.compile(linker)?;
            debug_assert_eq!(
                instruction.size(),
                linker.data.len() - start,
                "\"{instruction}\" emitted a different number of bytes than its size"
            );
        }
        Ok(())
    }
}
