//! IR (three-address code). Control flow is flattened into labels and jumps
//! and expression trees into a sequence of operations on temporaries, each
//! with at most one destination and two sources.

use std::str::FromStr;

use itertools::Itertools;
use strum::{EnumIter, EnumString};

pub mod ast_lowering;
pub mod pretty_print;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Opcode {
    Mov,
    Add,
    Sub,
    Mul,
    Div,
    Gtr,
    Les,
    Eql,
    Neq,
    Jnz,
    Jmp,
    Lbl,
    Write,
    Read,
    Push,
    Call,
    Pop,
    Ret,
}

impl Opcode {
    /// Effectful instructions are always kept by the optimizer. Everything
    /// else only computes a value into its destination.
    pub fn is_effectful(&self) -> bool {
        !matches!(
            self,
            Opcode::Mov
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Gtr
                | Opcode::Les
                | Opcode::Eql
                | Opcode::Neq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    /// Greater than
    Gtr,
    /// Less than
    Les,
    Eql,
    Neq,
}

impl BinaryOperator {
    pub fn opcode(self) -> Opcode {
        match self {
            BinaryOperator::Add => Opcode::Add,
            BinaryOperator::Sub => Opcode::Sub,
            BinaryOperator::Mul => Opcode::Mul,
            BinaryOperator::Div => Opcode::Div,
            BinaryOperator::Gtr => Opcode::Gtr,
            BinaryOperator::Les => Opcode::Les,
            BinaryOperator::Eql => Opcode::Eql,
            BinaryOperator::Neq => Opcode::Neq,
        }
    }

    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        Some(match opcode {
            Opcode::Add => BinaryOperator::Add,
            Opcode::Sub => BinaryOperator::Sub,
            Opcode::Mul => BinaryOperator::Mul,
            Opcode::Div => BinaryOperator::Div,
            Opcode::Gtr => BinaryOperator::Gtr,
            Opcode::Les => BinaryOperator::Les,
            Opcode::Eql => BinaryOperator::Eql,
            Opcode::Neq => BinaryOperator::Neq,
            _ => return None,
        })
    }
}

/// An instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Address {
    /// `TEMPn`
    Temp(u32),
    /// `LABELn`
    Label(u32),
    /// `FUNC_name`, the entry label of a function
    Function(String),
    Integer(i64),
    Real(f64),
    String(String),
    Variable(String),
    /// `array[index]`
    Element {
        array: String,
        index: Box<Address>,
    },
    /// `base.field`, where the base is a variable or an element
    Field {
        base: Box<Address>,
        field: String,
    },
}

impl Address {
    /// Name of the storage this address reads or writes. Composite addresses
    /// are tracked through their root variable.
    pub fn storage(&self) -> Option<String> {
        match self {
            Address::Temp(_) => Some(self.to_string()),
            Address::Variable(name) => Some(name.clone()),
            Address::Element { array, .. } => Some(array.clone()),
            Address::Field { base, .. } => base.storage(),
            Address::Label(_)
            | Address::Function(_)
            | Address::Integer(_)
            | Address::Real(_)
            | Address::String(_) => None,
        }
    }

    /// Addresses that have to be read to locate this one, like the index of
    /// an element
    pub fn index_operands(&self) -> Vec<&Address> {
        match self {
            Address::Element { index, .. } => {
                let mut operands = vec![index.as_ref()];
                operands.extend(index.index_operands());
                operands
            }
            Address::Field { base, .. } => base.index_operands(),
            _ => vec![],
        }
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Temp(n) => write!(f, "TEMP{n}"),
            Address::Label(n) => write!(f, "LABEL{n}"),
            Address::Function(name) => write!(f, "FUNC_{name}"),
            Address::Integer(value) => write!(f, "{value}"),
            // Debug formatting always keeps a decimal point or exponent
            Address::Real(value) => write!(f, "{value:?}"),
            Address::String(value) => write!(f, "\"{value}\""),
            Address::Variable(name) => write!(f, "{name}"),
            Address::Element { array, index } => write!(f, "{array}[{index}]"),
            Address::Field { base, field } => write!(f, "{base}.{field}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Move {
        destination: Address,
        source: Address,
    },
    BinaryOperation {
        operator: BinaryOperator,
        destination: Address,
        lhs: Address,
        rhs: Address,
    },
    /// Jumps to `target` when `condition` is non-zero
    JumpIfNonZero {
        condition: Address,
        target: Address,
    },
    Jump {
        target: Address,
    },
    Label {
        label: Address,
    },
    Write {
        operand: Address,
    },
    Read {
        target: Address,
    },
    Push {
        operand: Address,
    },
    Call {
        target: Address,
    },
    /// Pops a call's result
    Pop {
        destination: Address,
    },
    Return,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Move { .. } => Opcode::Mov,
            Instruction::BinaryOperation { operator, .. } => operator.opcode(),
            Instruction::JumpIfNonZero { .. } => Opcode::Jnz,
            Instruction::Jump { .. } => Opcode::Jmp,
            Instruction::Label { .. } => Opcode::Lbl,
            Instruction::Write { .. } => Opcode::Write,
            Instruction::Read { .. } => Opcode::Read,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Pop { .. } => Opcode::Pop,
            Instruction::Return => Opcode::Ret,
        }
    }

    /// Operands in the order they are written out
    pub fn operands(&self) -> Vec<&Address> {
        match self {
            Instruction::Move {
                destination,
                source,
            } => vec![destination, source],
            Instruction::BinaryOperation {
                destination,
                lhs,
                rhs,
                ..
            } => vec![destination, lhs, rhs],
            Instruction::JumpIfNonZero { condition, target } => vec![condition, target],
            Instruction::Jump { target } | Instruction::Call { target } => vec![target],
            Instruction::Label { label } => vec![label],
            Instruction::Write { operand } | Instruction::Push { operand } => vec![operand],
            Instruction::Read { target } => vec![target],
            Instruction::Pop { destination } => vec![destination],
            Instruction::Return => vec![],
        }
    }

    /// Destination of a pure instruction
    pub fn destination(&self) -> Option<&Address> {
        match self {
            Instruction::Move { destination, .. }
            | Instruction::BinaryOperation { destination, .. } => Some(destination),
            _ => None,
        }
    }

    /// Value operands read by this instruction
    pub fn sources(&self) -> Vec<&Address> {
        match self {
            Instruction::Move { source, .. } => vec![source],
            Instruction::BinaryOperation { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::JumpIfNonZero { condition, .. } => vec![condition],
            Instruction::Write { operand } | Instruction::Push { operand } => vec![operand],
            Instruction::Jump { .. }
            | Instruction::Label { .. }
            | Instruction::Read { .. }
            | Instruction::Call { .. }
            | Instruction::Pop { .. }
            | Instruction::Return => vec![],
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.opcode())?;

        for operand in self.operands() {
            write!(f, " {operand}")?;
        }

        Ok(())
    }
}

/// Renders instructions one per line, numbered from 1
pub fn listing(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .enumerate()
        .map(|(i, instruction)| format!("{:4}: {instruction}\n", i + 1))
        .join("")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInstructionError {
    pub text: String,
    pub message: String,
}

impl ParseInstructionError {
    fn new(text: &str, message: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            message: message.into(),
        }
    }
}

impl core::fmt::Display for ParseInstructionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid instruction `{}`: {}", self.text, self.message)
    }
}

impl std::error::Error for ParseInstructionError {}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();

    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Position of the last `.` outside of brackets
fn find_field_separator(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut separator = None;

    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            '.' if depth == 0 => separator = Some(i),
            _ => {}
        }
    }

    separator
}

impl FromStr for Address {
    type Err = ParseInstructionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let error = |message: &str| ParseInstructionError::new(text, message);

        if let Some(inner) = text
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Ok(Address::String(inner.to_string()));
        }

        if text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '+')) {
            if let Ok(value) = text.parse() {
                return Ok(Address::Integer(value));
            }

            return text
                .parse()
                .map(Address::Real)
                .map_err(|_| error("malformed number"));
        }

        if let Some(separator) = find_field_separator(text) {
            let field = &text[separator + 1..];

            if !is_identifier(field) {
                return Err(error("malformed field name"));
            }

            return Ok(Address::Field {
                base: Box::new(text[..separator].parse()?),
                field: field.to_string(),
            });
        }

        if let Some(rest) = text.strip_suffix(']') {
            let (array, index) = rest
                .split_once('[')
                .ok_or_else(|| error("unbalanced brackets"))?;

            if !is_identifier(array) {
                return Err(error("malformed array name"));
            }

            return Ok(Address::Element {
                array: array.to_string(),
                index: Box::new(index.parse()?),
            });
        }

        if let Some(name) = text.strip_prefix("FUNC_") {
            return Ok(Address::Function(name.to_string()));
        }

        let numbered = |prefix: &str| {
            text.strip_prefix(prefix)
                .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
                .and_then(|n| n.parse::<u32>().ok())
        };

        if let Some(n) = numbered("TEMP") {
            return Ok(Address::Temp(n));
        }

        if let Some(n) = numbered("LABEL") {
            return Ok(Address::Label(n));
        }

        if is_identifier(text) {
            return Ok(Address::Variable(text.to_string()));
        }

        Err(error("unrecognized operand"))
    }
}

/// Splits on whitespace, keeping quoted strings (which may contain spaces)
/// together
fn split_operands(text: &str) -> Result<Vec<&str>, ParseInstructionError> {
    let mut parts = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let end = if rest.starts_with('"') {
            rest[1..]
                .find('"')
                .map(|i| i + 2)
                .ok_or_else(|| ParseInstructionError::new(text, "unterminated string"))?
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };

        parts.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    Ok(parts)
}

impl FromStr for Instruction {
    type Err = ParseInstructionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let parts = split_operands(text)?;

        let Some((opcode, operands)) = parts.split_first() else {
            return Err(ParseInstructionError::new(text, "empty instruction"));
        };

        let opcode = opcode
            .parse::<Opcode>()
            .map_err(|_| ParseInstructionError::new(text, format!("unknown opcode `{opcode}`")))?;

        let operands = operands
            .iter()
            .map(|operand| operand.parse::<Address>())
            .collect::<Result<Vec<_>, _>>()?;

        let expected = match opcode {
            Opcode::Ret => 0,
            Opcode::Jmp
            | Opcode::Lbl
            | Opcode::Write
            | Opcode::Read
            | Opcode::Push
            | Opcode::Call
            | Opcode::Pop => 1,
            Opcode::Mov | Opcode::Jnz => 2,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Gtr
            | Opcode::Les
            | Opcode::Eql
            | Opcode::Neq => 3,
        };

        if operands.len() != expected {
            return Err(ParseInstructionError::new(
                text,
                format!(
                    "`{opcode}` takes {expected} operand(s), found {}",
                    operands.len()
                ),
            ));
        }

        let mut operands = operands.into_iter();
        let mut next = || operands.next().unwrap_or(Address::Integer(0));

        Ok(match opcode {
            Opcode::Mov => Instruction::Move {
                destination: next(),
                source: next(),
            },
            Opcode::Jnz => Instruction::JumpIfNonZero {
                condition: next(),
                target: next(),
            },
            Opcode::Jmp => Instruction::Jump { target: next() },
            Opcode::Lbl => Instruction::Label { label: next() },
            Opcode::Write => Instruction::Write { operand: next() },
            Opcode::Read => Instruction::Read { target: next() },
            Opcode::Push => Instruction::Push { operand: next() },
            Opcode::Call => Instruction::Call { target: next() },
            Opcode::Pop => Instruction::Pop {
                destination: next(),
            },
            Opcode::Ret => Instruction::Return,
            binary => Instruction::BinaryOperation {
                operator: BinaryOperator::from_opcode(binary)
                    .ok_or_else(|| ParseInstructionError::new(text, "not a binary operation"))?,
                destination: next(),
                lhs: next(),
                rhs: next(),
            },
        })
    }
}

/// Parses a listing produced by [`listing`] (or plain instruction lines
/// without numbers). Blank lines are skipped.
pub fn parse_listing(text: &str) -> Result<Vec<Instruction>, ParseInstructionError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let line = match line.split_once(':') {
                Some((number, rest))
                    if !number.is_empty() && number.trim().chars().all(|c| c.is_ascii_digit()) =>
                {
                    rest
                }
                _ => line,
            };

            line.parse()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str) -> Address {
        Address::Variable(name.to_string())
    }

    #[test]
    fn renders_three_address_form() {
        let instruction = Instruction::BinaryOperation {
            operator: BinaryOperator::Add,
            destination: Address::Temp(3),
            lhs: variable("x"),
            rhs: Address::Temp(2),
        };

        assert_eq!(instruction.to_string(), "ADD TEMP3 x TEMP2");
        assert_eq!(Instruction::Return.to_string(), "RET");
        assert_eq!(
            Instruction::Move {
                destination: Address::Temp(1),
                source: Address::Real(10.0),
            }
            .to_string(),
            "MOV TEMP1 10.0"
        );
    }

    #[test]
    fn composite_addresses_round_trip() {
        let address = Address::Field {
            base: Box::new(Address::Element {
                array: "route".to_string(),
                index: Box::new(Address::Temp(4)),
            }),
            field: "x".to_string(),
        };

        assert_eq!(address.to_string(), "route[TEMP4].x");
        assert_eq!("route[TEMP4].x".parse::<Address>(), Ok(address.clone()));
        assert_eq!(address.storage().as_deref(), Some("route"));
        assert_eq!(address.index_operands(), vec![&Address::Temp(4)]);
    }

    #[test]
    fn operands_are_classified() {
        assert_eq!("TEMP12".parse(), Ok(Address::Temp(12)));
        assert_eq!("LABEL3".parse(), Ok(Address::Label(3)));
        assert_eq!("FUNC_add".parse(), Ok(Address::Function("add".to_string())));
        assert_eq!("42".parse(), Ok(Address::Integer(42)));
        assert_eq!("4.5".parse(), Ok(Address::Real(4.5)));
        assert_eq!("TEMPERATURE".parse(), Ok(variable("TEMPERATURE")));
        assert!("a[1".parse::<Address>().is_err());
        assert!("1x".parse::<Address>().is_err());
    }

    #[test]
    fn quoted_strings_keep_their_spaces() {
        let instruction: Instruction = "WRITE \"hello,  world\"".parse().unwrap();

        assert_eq!(
            instruction,
            Instruction::Write {
                operand: Address::String("hello,  world".to_string())
            }
        );
    }

    #[test]
    fn listing_round_trips() {
        let instructions = vec![
            Instruction::Label {
                label: Address::Function("f".to_string()),
            },
            Instruction::Move {
                destination: Address::Temp(1),
                source: Address::Integer(10),
            },
            Instruction::JumpIfNonZero {
                condition: Address::Temp(1),
                target: Address::Label(2),
            },
            Instruction::Write {
                operand: Address::String("a b".to_string()),
            },
            Instruction::Push {
                operand: Address::Real(0.5),
            },
            Instruction::Call {
                target: Address::Function("f".to_string()),
            },
            Instruction::Pop {
                destination: Address::Temp(2),
            },
            Instruction::Read {
                target: variable("x"),
            },
            Instruction::Return,
        ];

        let text = listing(&instructions);
        assert!(text.starts_with("   1: LBL FUNC_f\n"));
        assert_eq!(parse_listing(&text), Ok(instructions));
    }

    #[test]
    fn operand_count_is_checked() {
        assert!("MOV TEMP1".parse::<Instruction>().is_err());
        assert!("RET x".parse::<Instruction>().is_err());
        assert!("NOP".parse::<Instruction>().is_err());
    }
}
