use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use url::Url;

use crate::error::SyncError;

/// One declared argument of an external function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionArgument {
    pub name: String,
    pub data_type: String,
}

/// SQL validation service for keeping interpolated values injection-safe
pub struct SqlValidator;

impl SqlValidator {
    /// Quote an identifier with double quotes, doubling any embedded quote
    pub fn quote_identifier(name: &str) -> Result<String, SyncError> {
        if name.trim().is_empty() {
            return Err(SyncError::Validation("Identifier cannot be empty".to_string()));
        }
        if name.chars().any(char::is_control) {
            return Err(SyncError::Validation(format!(
                "Identifier {:?} contains control characters",
                name
            )));
        }
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }

    /// Quote a string literal with single quotes.
    ///
    /// Backslashes are escape characters inside warehouse string literals, so they
    /// are doubled along with single quotes.
    pub fn quote_literal(value: &str) -> Result<String, SyncError> {
        if value.chars().any(char::is_control) {
            return Err(SyncError::Validation(format!(
                "Literal {:?} contains control characters",
                value
            )));
        }
        Ok(format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''")))
    }

    /// Validate a data type such as `VARIANT`, `NUMBER(38, 0)` or `ARRAY`.
    ///
    /// The whole input must parse as one data type; the parsed type is rendered
    /// back so nothing but the type reaches the statement.
    pub fn validate_type(data_type: &str) -> Result<String, SyncError> {
        if data_type.trim().is_empty() {
            return Err(SyncError::Validation("Data type cannot be empty".to_string()));
        }
        Self::parse_whole(data_type, |parser| parser.parse_data_type())
            .map(|parsed| parsed.to_string())
            .map_err(|e| SyncError::Validation(format!("Invalid data type {:?}: {}", data_type, e)))
    }

    /// Parse an argument signature like `(id NUMBER, name VARCHAR)`.
    ///
    /// Surrounding parentheses are optional and an empty signature means no
    /// arguments.
    pub fn parse_signature(signature: &str) -> Result<Vec<FunctionArgument>, SyncError> {
        if signature.trim().is_empty() {
            return Ok(Vec::new());
        }

        Self::parse_whole(signature, |parser| {
            let parenthesized = parser.consume_token(&Token::LParen);
            if parenthesized && parser.consume_token(&Token::RParen) {
                return Ok(Vec::new());
            }
            let arguments = parser.parse_comma_separated(|p| {
                let name = p.parse_identifier()?;
                let data_type = p.parse_data_type()?;
                Ok(FunctionArgument {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                })
            })?;
            if parenthesized && !parser.consume_token(&Token::RParen) {
                return Err(ParserError::ParserError(
                    "Expected ) after the last argument".to_string(),
                ));
            }
            Ok(arguments)
        })
        .map_err(|e| SyncError::Validation(format!("Invalid signature {:?}: {}", signature, e)))
    }

    /// Render parsed arguments back into `name TYPE, ...` form
    pub fn render_signature(arguments: &[FunctionArgument]) -> String {
        arguments
            .iter()
            .map(|arg| format!("{} {}", arg.name, arg.data_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Argument types only, as required to address a function in DROP
    pub fn render_argument_types(arguments: &[FunctionArgument]) -> String {
        arguments
            .iter()
            .map(|arg| arg.data_type.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Validate a gateway endpoint and strip any trailing slash
    pub fn validate_endpoint(endpoint: &str) -> Result<String, SyncError> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| SyncError::Validation(format!("Invalid endpoint URL {:?}: {}", endpoint, e)))?;

        if url.scheme() != "https" {
            return Err(SyncError::Validation(format!(
                "Endpoint {} must use https:// scheme",
                endpoint
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(SyncError::Validation(format!(
                "Endpoint {} must not carry a query or fragment",
                endpoint
            )));
        }

        Ok(endpoint.trim().trim_end_matches('/').to_string())
    }

    /// Run `parse` over `text` and require it to consume every token
    fn parse_whole<T, F>(text: &str, parse: F) -> Result<T, ParserError>
    where
        F: FnOnce(&mut Parser<'_>) -> Result<T, ParserError>,
    {
        let dialect = SnowflakeDialect {};
        let mut parser = Parser::new(&dialect).try_with_sql(text)?;
        let parsed = parse(&mut parser)?;

        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(ParserError::ParserError(format!(
                "Unexpected {} after the end of the definition",
                next.token
            )));
        }
        Ok(parsed)
    }
}
