//! Entry point of the expression engine.
//!
//! ```
//! use compiler_core::{CompilerConfiguration, ExpressionParser};
//! use interpreter::{ContextBuilder, Value};
//!
//! let parser = ExpressionParser::with_configuration(CompilerConfiguration::immediate());
//! let expression = parser.parse("#price * #quantity").unwrap();
//! let context = ContextBuilder::new()
//!     .variable("price", Value::Int(3))
//!     .variable("quantity", Value::Int(4))
//!     .build();
//! assert_eq!(expression.evaluate(&context).unwrap(), Value::Int(12));
//! ```

pub mod adaptive;
pub mod config;

pub use adaptive::{Expression, ExpressionState, ExpressionStats, TypeShape};
pub use config::{global_configuration, set_global_configuration, CompilerConfiguration, CompilerMode, ConfigError};

use frontend::ParserError;

/// Parses expressions under one compiler configuration.
#[derive(Debug, Clone, Default)]
pub struct ExpressionParser {
    configuration: Option<CompilerConfiguration>,
}

impl ExpressionParser {
    /// A parser that follows the process-wide configuration in effect when
    /// each expression is parsed.
    pub fn new() -> Self {
        ExpressionParser { configuration: None }
    }

    pub fn with_configuration(configuration: CompilerConfiguration) -> Self {
        ExpressionParser { configuration: Some(configuration) }
    }

    pub fn configuration(&self) -> CompilerConfiguration {
        self.configuration.unwrap_or_else(global_configuration)
    }

    pub fn parse(&self, source: &str) -> Result<Expression, ParserError> {
        let ast = frontend::parse(source)?;
        Ok(Expression::new(ast, self.configuration()))
    }
}

/// Parse under the process-wide configuration.
pub fn parse(source: &str) -> Result<Expression, ParserError> {
    ExpressionParser::new().parse(source)
}
