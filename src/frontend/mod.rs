use std::path::PathBuf;

use colored::Colorize;

pub mod ast;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    /// Returns the text of a 1-based source line
    pub fn line_text(&self, line: usize) -> Option<&str> {
        self.contents.lines().nth(line.checked_sub(1)?)
    }

    pub fn format_line_position(&self, line: usize) -> String {
        format!("{}:{}", self.origin, line)
    }

    /// Prints the offending source line to stderr with a line number gutter
    pub fn highlight_line(&self, line: usize) {
        let Some(text) = self.line_text(line) else {
            return;
        };

        let gutter = line.to_string();

        eprintln!("{} {}", " ".repeat(gutter.len()), "|".blue());
        eprintln!("{} {} {}", gutter.blue(), "|".blue(), text);
        eprintln!("{} {}", " ".repeat(gutter.len()), "|".blue());
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_text_is_one_based() {
        let source = SourceFile::from_memory("program p;\nbegin\nend");

        assert_eq!(source.line_text(1), Some("program p;"));
        assert_eq!(source.line_text(3), Some("end"));
        assert_eq!(source.line_text(0), None);
        assert_eq!(source.line_text(4), None);
    }
}
