//! Error Classifier
//!
//! Classifies failed synthesis attempts into a taxonomy. The class only adds a
//! recovery hint to the correction prompt; the raw error text is always sent
//! along with it.

use crate::error::AssistantError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthesis failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptErrorClass {
    MissingCode,
    CompletionFailure,
    StatementNotAllowed,
    FunctionNotAllowed,
    TableNotFound,
    ColumnNotFound,
    TypeMismatch,
    Syntax,
    Timeout,
    Execution,
}

impl fmt::Display for AttemptErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptErrorClass::MissingCode => "MissingCode",
            AttemptErrorClass::CompletionFailure => "CompletionFailure",
            AttemptErrorClass::StatementNotAllowed => "StatementNotAllowed",
            AttemptErrorClass::FunctionNotAllowed => "FunctionNotAllowed",
            AttemptErrorClass::TableNotFound => "TableNotFound",
            AttemptErrorClass::ColumnNotFound => "ColumnNotFound",
            AttemptErrorClass::TypeMismatch => "TypeMismatch",
            AttemptErrorClass::Syntax => "Syntax",
            AttemptErrorClass::Timeout => "Timeout",
            AttemptErrorClass::Execution => "Execution",
        };
        write!(f, "{}", name)
    }
}

impl AttemptErrorClass {
    /// One-line recovery hint for the correction prompt
    pub fn hint(&self) -> &'static str {
        match self {
            AttemptErrorClass::MissingCode => {
                "Your answer did not contain a ```sql fenced block. Return only the statement inside one."
            }
            AttemptErrorClass::CompletionFailure => {
                "The previous request could not be completed. Produce the statement again."
            }
            AttemptErrorClass::StatementNotAllowed => {
                "Only a single read-only SELECT over `df` (optionally with CTEs) is allowed; no joins or UNION."
            }
            AttemptErrorClass::FunctionNotAllowed => {
                "Use only standard aggregate and scalar functions; table functions and file readers are unavailable."
            }
            AttemptErrorClass::TableNotFound => "Read from the table `df` only.",
            AttemptErrorClass::ColumnNotFound => {
                "A referenced column does not exist. Use the exact column names from the summary, quoting them if needed."
            }
            AttemptErrorClass::TypeMismatch => {
                "A value has the wrong type for the operation. Compare numbers with numbers and text with quoted text."
            }
            AttemptErrorClass::Syntax => "The statement does not parse. Fix the SQL syntax.",
            AttemptErrorClass::Timeout => {
                "The statement ran too long. Simplify it: filter early, aggregate before sorting, and add a LIMIT."
            }
            AttemptErrorClass::Execution => "Fix the error and keep the statement as simple as possible.",
        }
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an error into the taxonomy
    pub fn classify(&self, error: &AssistantError) -> AttemptErrorClass {
        match error {
            AssistantError::ExecutionTimeout(_) => return AttemptErrorClass::Timeout,
            AssistantError::Llm(_) => return AttemptErrorClass::CompletionFailure,
            AssistantError::Synthesis(_) => return AttemptErrorClass::MissingCode,
            _ => {}
        }

        let error_msg = error.to_string().to_lowercase();

        if error_msg.contains("function") && error_msg.contains("not allowed") {
            return AttemptErrorClass::FunctionNotAllowed;
        }

        if error_msg.contains("only a single") || error_msg.contains("statement not allowed") {
            return AttemptErrorClass::StatementNotAllowed;
        }

        if error_msg.contains("relation") || (error_msg.contains("table") && error_msg.contains("not found")) {
            return AttemptErrorClass::TableNotFound;
        }

        if error_msg.contains("column") || error_msg.contains("not found") {
            return AttemptErrorClass::ColumnNotFound;
        }

        if error_msg.contains("cannot compare")
            || error_msg.contains("dtype")
            || error_msg.contains("cast")
            || error_msg.contains("type")
        {
            return AttemptErrorClass::TypeMismatch;
        }

        if error_msg.contains("parse") || error_msg.contains("syntax") || error_msg.contains("expected") {
            return AttemptErrorClass::Syntax;
        }

        AttemptErrorClass::Execution
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classify_column_not_found() {
        let classifier = ErrorClassifier::new();
        let error = AssistantError::Polars("not found: unknown column \"revnue\"".to_string());
        assert_eq!(classifier.classify(&error), AttemptErrorClass::ColumnNotFound);
    }

    #[test]
    fn test_classify_by_variant() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify(&AssistantError::ExecutionTimeout(Duration::from_secs(1))),
            AttemptErrorClass::Timeout
        );
        assert_eq!(
            classifier.classify(&AssistantError::Synthesis("no fence".to_string())),
            AttemptErrorClass::MissingCode
        );
    }

    #[test]
    fn test_classify_sandbox_rejections() {
        let classifier = ErrorClassifier::new();
        let error = AssistantError::Sandbox("function 'read_csv' is not allowed".to_string());
        assert_eq!(classifier.classify(&error), AttemptErrorClass::FunctionNotAllowed);
        let error = AssistantError::Sandbox("relation 'users' is not allowed; read from df".to_string());
        assert_eq!(classifier.classify(&error), AttemptErrorClass::TableNotFound);

        let error = crate::execution_loop::sandbox::check_procedure("SELECT a.x FROM df a CROSS JOIN df b")
            .unwrap_err();
        let class = classifier.classify(&error);
        assert_eq!(class, AttemptErrorClass::StatementNotAllowed);
        assert!(class.hint().contains("no joins"));
    }
}
