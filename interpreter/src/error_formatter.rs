use frontend::{ParserError, SourceLocation};
use crate::error::EvaluationError;

/// Renders parse and evaluation failures against the expression text with a
/// caret under the offending span.
pub struct ErrorFormatter<'a> {
    source_code: &'a str,
    origin: &'a str,
}

impl<'a> ErrorFormatter<'a> {
    pub fn new(source_code: &'a str, origin: &'a str) -> Self {
        Self { source_code, origin }
    }

    pub fn format_parse_error(&self, error: &ParserError) -> String {
        self.format_error_with_location(&error.to_string(), &error.location, 1)
    }

    pub fn format_evaluation_error(&self, error: &EvaluationError) -> String {
        let location = SourceLocation::from_offset(self.source_code, error.span.start);
        let width = error.span.end.saturating_sub(error.span.start).max(1);
        let message = format!("{}: {}", error.kind.name(), error.kind);
        self.format_error_with_location(&message, &location, width)
    }

    fn format_error_with_location(&self, error_msg: &str, location: &SourceLocation, width: usize) -> String {
        let line_number = location.line;
        let column = location.column;

        let source_line = self
            .source_code
            .lines()
            .nth((line_number as usize).saturating_sub(1))
            .unwrap_or("<line not available>");

        let line_display = format!("{:2}", line_number);

        let start = (column as usize).saturating_sub(1).min(source_line.chars().count());
        let remaining = source_line.chars().count().saturating_sub(start).max(1);
        let caret = format!("{:pad$}{}", "", "^".repeat(width.min(remaining)), pad = start);

        format!(
            "Error at {}:{}:{}:\n   |\n{} | {}\n   | {} {}\n   |",
            self.origin, line_number, column, line_display, source_line, caret, error_msg
        )
    }

    pub fn format_simple_error(&self, error_msg: &str) -> String {
        format!("Error: {}", error_msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NodeCaches;
    use crate::environment::EvaluationContext;
    use crate::object::Value;

    #[test]
    fn parse_errors_point_at_the_token() {
        let source = "1 +\n  * 2";
        let error = frontend::parse(source).unwrap_err();
        let formatter = ErrorFormatter::new(source, "<expr>");
        let formatted = formatter.format_parse_error(&error);
        assert!(formatted.starts_with("Error at <expr>:2:3:"));
        assert!(formatted.contains("  * 2"));
        assert!(formatted.contains("^"));
    }

    #[test]
    fn evaluation_errors_underline_the_node() {
        let source = "1 + missing.size()";
        let ast = frontend::parse(source).unwrap();
        let caches = NodeCaches::new(ast.len());
        let error = crate::evaluation::evaluate(&ast, &caches, &EvaluationContext::new(Value::Null)).unwrap_err();
        let formatted = ErrorFormatter::new(source, "<expr>").format_evaluation_error(&error);
        assert!(formatted.starts_with("Error at <expr>:1:5:"));
        assert!(formatted.contains("^^^^^^^"));
        assert!(formatted.contains("AccessError"));
    }

    #[test]
    fn simple_errors() {
        let formatter = ErrorFormatter::new("", "<expr>");
        assert_eq!(formatter.format_simple_error("boom"), "Error: boom");
    }
}
