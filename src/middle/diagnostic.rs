use colored::Colorize;

/// Name of the enclosing function, used to tag diagnostics with the analyzer
/// rule that produced them.
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

/// Records a diagnostic on anything with a `report(Diagnostic)` method.
macro_rules! report {
    ($reporter:expr, $kind:expr, $line:expr, $($message:tt)+) => {{
        #[cfg(feature = "error-backtrace")]
        let origin = Some($crate::middle::diagnostic::function!());
        #[cfg(not(feature = "error-backtrace"))]
        let origin = None;

        $reporter.report($crate::middle::diagnostic::Diagnostic {
            kind: $kind,
            line: $line,
            message: format!($($message)+),
            origin,
        })
    }};
}

#[allow(unused_imports)]
pub(crate) use function;
pub(crate) use report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DiagnosticKind {
    /// A name declared twice in one scope. The first declaration is kept.
    DuplicateDeclaration,
    /// A variable, type, function or field that does not exist
    UndeclaredIdentifier,
    TypeMismatch,
    /// Wrong number of arguments in a call
    ArityMismatch,
    /// An identifier of the wrong kind, like assigning to a constant
    InvalidTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: usize,
    pub message: String,
    /// Analyzer function that raised this diagnostic
    pub origin: Option<&'static str>,
}

impl Diagnostic {
    /// Colored form for terminal output, including the origin if known
    pub fn render(&self) -> String {
        let mut rendered = format!(
            "{}: {} {}",
            format!("error[{}]", self.kind).red().bold(),
            self.message,
            format!("(line {})", self.line).white()
        );

        if let Some(origin) = self.origin {
            rendered.push_str(&format!("\n{}: {}", "raised by".blue(), origin));
        }

        rendered
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "error[{}]: {} (line {})",
            self.kind, self.message, self.line
        )
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector(Vec<Diagnostic>);

    impl Collector {
        fn report(&mut self, diagnostic: Diagnostic) {
            self.0.push(diagnostic);
        }

        fn check_something(&mut self) {
            report!(self, DiagnosticKind::TypeMismatch, 4, "cannot assign {} to {}", "real", "integer");
        }
    }

    #[test]
    fn display_names_kind_and_line() {
        let mut collector = Collector(vec![]);
        collector.check_something();

        assert_eq!(
            collector.0[0].to_string(),
            "error[type-mismatch]: cannot assign real to integer (line 4)"
        );
    }

    #[cfg(feature = "error-backtrace")]
    #[test]
    fn origin_names_reporting_function() {
        let mut collector = Collector(vec![]);
        collector.check_something();

        assert_eq!(collector.0[0].origin, Some("check_something"));
    }
}
