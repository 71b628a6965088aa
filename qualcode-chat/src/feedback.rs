//! Feedback messages appended to a row prompt when the model's answer is rejected.

use jsonschema::Validator;
use serde_json::Value;

/// Characters of a rejected response echoed back in parse feedback.
const ECHO_LIMIT: usize = 500;

/// Build validation feedback for a response that parsed but did not conform.
///
/// Includes the attempt counter, every validation error with its instance
/// path, optionally the expected schema, and the rejected submission.
///
/// # Examples
///
/// ```
/// use qualcode_chat::feedback::build_validation_feedback;
/// use serde_json::json;
///
/// let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}});
/// let instance = json!({"name": 123});
/// let errors = vec!["At path '/name': 123 is not of type 'string'".to_string()];
///
/// let feedback = build_validation_feedback(Some(&schema), &instance, &errors, 1, 3);
/// assert!(feedback.contains("Attempt 1/3"));
/// assert!(feedback.contains("did not match the schema"));
/// ```
#[must_use]
pub fn build_validation_feedback(
    schema: Option<&Value>,
    instance: &Value,
    errors: &[String],
    attempt: usize,
    max_attempts: usize,
) -> String {
    let mut feedback =
        format!("Attempt {attempt}/{max_attempts}: your JSON did not match the schema.\n\n");

    feedback.push_str("Errors:\n");
    for error in errors {
        feedback.push_str("  - ");
        feedback.push_str(error);
        feedback.push('\n');
    }

    if let Some(schema) = schema {
        feedback.push_str("\nExpected schema:\n");
        feedback.push_str(&pretty(schema));
    }

    feedback.push_str("\n\nYour answer:\n");
    feedback.push_str(&pretty(instance));

    feedback.push_str("\n\nReply again with only the corrected JSON object.");

    feedback
}

/// Collect all validation errors, each prefixed with its instance path.
#[must_use]
pub fn collect_validation_errors(validator: &Validator, instance: &Value) -> Vec<String> {
    validator
        .iter_errors(instance)
        .map(|error| format!("At path '{}': {}", error.instance_path, error))
        .collect()
}

/// Build feedback for a response that was not JSON at all.
///
/// Echoes at most the first 500 characters of the response.
#[must_use]
pub fn build_parse_error_feedback(
    raw_text: &str,
    parse_error: &str,
    attempt: usize,
    max_attempts: usize,
    schema: Option<&Value>,
) -> String {
    let mut feedback = format!(
        "Attempt {attempt}/{max_attempts}: your answer could not be parsed as JSON.\n\n"
    );

    feedback.push_str("Parse error: ");
    feedback.push_str(parse_error);
    feedback.push_str("\n\n");

    feedback.push_str("Your answer (first 500 chars):\n");
    if raw_text.chars().count() > ECHO_LIMIT {
        feedback.extend(raw_text.chars().take(ECHO_LIMIT));
        feedback.push_str("...");
    } else {
        feedback.push_str(raw_text);
    }

    if let Some(schema) = schema {
        feedback.push_str("\n\nExpected schema:\n");
        feedback.push_str(&pretty(schema));
    }

    feedback.push_str("\n\nReply with only a JSON object matching the schema.");

    feedback
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
