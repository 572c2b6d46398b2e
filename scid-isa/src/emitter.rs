use crate::opcode::{Opcode, encode_opcode};
use crate::operand::{OperandKind, Width, operand_types};
use crate::version::Version;

/// Handle returned by [`Assembler::new_label`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// An operand given to the assembler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    Imm(i32),
    /// Resolved to a displacement for [`OperandKind::Label`] and
    /// [`OperandKind::RelativeOffset`], to an absolute address otherwise.
    Label(Label),
    Text(String),
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Imm(v)
    }
}

impl From<Label> for Arg {
    fn from(l: Label) -> Self {
        Arg::Label(l)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

/// Errors from [`Assembler::finish`].
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("opcode {0} does not exist in the {1} table")]
    UnknownOpcode(Opcode, Version),
    #[error("{opcode} takes {expected} operands, got {found}")]
    OperandCount {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },
    #[error("operand {value} of {opcode} does not fit in {bytes} byte(s)")]
    OperandRange {
        opcode: Opcode,
        value: i64,
        bytes: usize,
    },
    #[error("operand {index} of {opcode} has the wrong shape")]
    OperandMismatch { opcode: Opcode, index: usize },
    #[error("label {0} was never bound")]
    UnboundLabel(u32),
    #[error("label {0} was not created by this assembler")]
    LabelOutOfRange(u32),
}

/// Output of [`Assembler::finish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembled {
    pub bytes: Vec<u8>,
    /// Absolute address of each emitted instruction.
    pub offsets: Vec<u32>,
    /// Absolute address of each label, indexed by label number.
    pub labels: Vec<u32>,
}

struct Item {
    opcode: Opcode,
    wide: bool,
    args: Vec<Arg>,
}

/// Builds bytecode for one table, resolving labels to displacements.
///
/// Instructions are emitted in their word form by [`emit`](Self::emit) and
/// in their byte form by [`emit_narrow`](Self::emit_narrow); no relaxation is
/// attempted, so a narrow branch whose displacement does not fit is an error.
///
/// ```
/// use scid_isa::{Arg, Assembler, Opcode, Version};
///
/// let mut asm = Assembler::new(Version::Sci0);
/// let done = asm.new_label();
/// asm.emit(Opcode::Bnt, [done.into()]);
/// asm.emit(Opcode::Ldi, [Arg::Imm(1)]);
/// asm.bind(done);
/// asm.emit(Opcode::Ret, []);
/// let out = asm.finish()?;
/// assert_eq!(out.labels[0], 6);
/// # Ok::<(), scid_isa::EncodeError>(())
/// ```
pub struct Assembler {
    version: Version,
    origin: u32,
    items: Vec<Item>,
    labels: Vec<Option<usize>>,
}

impl Assembler {
    pub fn new(version: Version) -> Self {
        Self::with_origin(version, 0)
    }

    /// Start emitting at absolute address `origin`.
    pub fn with_origin(version: Version, origin: u32) -> Self {
        Self {
            version,
            origin,
            items: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(self.items.len());
        }
        self
    }

    pub fn emit(&mut self, opcode: Opcode, args: impl IntoIterator<Item = Arg>) -> &mut Self {
        self.push(opcode, true, args)
    }

    pub fn emit_narrow(
        &mut self,
        opcode: Opcode,
        args: impl IntoIterator<Item = Arg>,
    ) -> &mut Self {
        self.push(opcode, false, args)
    }

    fn push(&mut self, opcode: Opcode, wide: bool, args: impl IntoIterator<Item = Arg>) -> &mut Self {
        self.items.push(Item {
            opcode,
            wide,
            args: args.into_iter().collect(),
        });
        self
    }

    pub fn finish(self) -> Result<Assembled, EncodeError> {
        // Pass 1: raw bytes, sizes and addresses.
        let mut raws = Vec::with_capacity(self.items.len());
        let mut offsets = Vec::with_capacity(self.items.len());
        let mut pos = self.origin;
        for item in &self.items {
            let raw = encode_opcode(self.version, item.opcode, item.wide)
                .ok_or(EncodeError::UnknownOpcode(item.opcode, self.version))?;
            let types = operand_types(self.version, item.opcode);
            if types.len() != item.args.len() {
                return Err(EncodeError::OperandCount {
                    opcode: item.opcode,
                    expected: types.len(),
                    found: item.args.len(),
                });
            }
            let mut size = 1usize;
            for (index, (ty, arg)) in types.iter().zip(&item.args).enumerate() {
                size += match (ty.size(raw), arg) {
                    (None, Arg::Text(text)) => text.len() + 1,
                    (Some(n), Arg::Imm(_) | Arg::Label(_)) => n,
                    _ => {
                        return Err(EncodeError::OperandMismatch {
                            opcode: item.opcode,
                            index,
                        });
                    }
                };
            }
            raws.push((raw, size));
            offsets.push(pos);
            pos += size as u32;
        }
        let end = pos;

        let labels = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Some(idx) => Ok(offsets.get(*idx).copied().unwrap_or(end)),
                None => Err(EncodeError::UnboundLabel(i as u32)),
            })
            .collect::<Result<Vec<u32>, _>>()?;

        // Pass 2: operands.
        let mut bytes = Vec::with_capacity((end - self.origin) as usize);
        for ((item, &(raw, size)), &addr) in self.items.iter().zip(&raws).zip(&offsets) {
            bytes.push(raw);
            let next = addr as i64 + size as i64;
            for (ty, arg) in operand_types(self.version, item.opcode).iter().zip(&item.args) {
                let value = match arg {
                    Arg::Text(text) => {
                        bytes.extend_from_slice(text.as_bytes());
                        bytes.push(0);
                        continue;
                    }
                    Arg::Imm(v) => *v as i64,
                    Arg::Label(label) => {
                        let target = *labels
                            .get(label.0 as usize)
                            .ok_or(EncodeError::LabelOutOfRange(label.0))?
                            as i64;
                        match ty.kind {
                            OperandKind::Label | OperandKind::RelativeOffset => target - next,
                            _ => target,
                        }
                    }
                };
                let width = if ty.width == Width::Flag && raw & 1 == 1 || ty.width == Width::Byte
                {
                    1
                } else {
                    2
                };
                let fits = match (width, ty.kind.is_signed() && matches!(arg, Arg::Label(_))) {
                    (1, true) => (-128..=127).contains(&value),
                    (1, false) => (-128..=255).contains(&value),
                    (_, true) => (-32768..=32767).contains(&value),
                    (_, false) => (-32768..=65535).contains(&value),
                };
                if !fits {
                    return Err(EncodeError::OperandRange {
                        opcode: item.opcode,
                        value,
                        bytes: width,
                    });
                }
                if width == 1 {
                    bytes.push(value as u8);
                } else {
                    bytes.extend_from_slice(&(value as u16).to_le_bytes());
                }
            }
        }

        Ok(Assembled {
            bytes,
            offsets,
            labels,
        })
    }
}
