use colored::Colorize;

use crate::middle::ir::{Address, Instruction};

pub fn pretty_print_ir(instructions: &[Instruction]) {
    for (i, instruction) in instructions.iter().enumerate() {
        println!("{} {}", format!("{:4}:", i + 1).white(), colored(instruction));
    }
}

fn colored_address(address: &Address) -> String {
    let text = address.to_string();

    match address {
        Address::Temp(_) => text.blue().to_string(),
        Address::Label(_) | Address::Function(_) => text.bright_red().to_string(),
        Address::Integer(_) | Address::Real(_) => text.purple().to_string(),
        Address::String(_) => text.green().to_string(),
        Address::Variable(_) | Address::Element { .. } | Address::Field { .. } => text,
    }
}

/// The instruction with its opcode and operands highlighted
pub fn colored(instruction: &Instruction) -> String {
    let mut text = instruction.opcode().to_string().cyan().to_string();

    for operand in instruction.operands() {
        text.push(' ');
        text.push_str(&colored_address(operand));
    }

    text
}

fn visible_width(text: &str) -> usize {
    strip_ansi_escapes::strip_str(text).chars().count()
}

fn pad(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(visible_width(text));
    format!("{text}{}", " ".repeat(padding))
}

/// Renders the original and optimized instruction lists next to each other.
/// `optimized` must be a subsequence of `original`; removed instructions get
/// an empty right column and a `-` marker.
pub fn compare_listing(original: &[Instruction], optimized: &[Instruction]) -> String {
    let left = original
        .iter()
        .enumerate()
        .map(|(i, instruction)| format!("{:4}: {}", i + 1, colored(instruction)))
        .collect::<Vec<_>>();

    let width = left
        .iter()
        .map(|line| visible_width(line))
        .max()
        .unwrap_or(0)
        .max("original".len());

    let mut output = format!(
        "  {} | {}\n",
        pad(&"original".bold().to_string(), width),
        "optimized".bold()
    );
    output.push_str(&format!("  {}-+-{}\n", "-".repeat(width), "-".repeat(width)));

    let mut kept = optimized.iter().enumerate().peekable();

    for (line, instruction) in left.iter().zip(original) {
        match kept.peek() {
            Some((j, candidate)) if *candidate == instruction => {
                output.push_str(&format!(
                    "  {} | {:4}: {}\n",
                    pad(line, width),
                    j + 1,
                    colored(candidate)
                ));
                kept.next();
            }
            _ => {
                output.push_str(&format!("{} {} |\n", "-".red(), pad(line, width)));
            }
        }
    }

    output
}
