//! Response body content rules.

use tracing::info;

/// Required and forbidden substrings for an HTTP response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationRule {
    required: Vec<String>,
    forbidden: Vec<String>,
}

impl ValidationRule {
    pub fn new(required: Vec<String>, forbidden: Vec<String>) -> Self {
        Self {
            required,
            forbidden,
        }
    }

    /// No rules configured: any 2xx response is ready.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.forbidden.is_empty()
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn forbidden(&self) -> &[String] {
        &self.forbidden
    }

    pub fn validate<'a>(&'a self, body: &[u8]) -> Validation<'a> {
        validate(body, self)
    }
}

/// Outcome of evaluating a [`ValidationRule`] against one body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation<'a> {
    /// Required texts absent from the body.
    pub missing: Vec<&'a str>,
    /// Forbidden texts present in the body.
    pub found_forbidden: Vec<&'a str>,
}

impl Validation<'_> {
    pub fn required_missing(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn forbidden_present(&self) -> bool {
        !self.found_forbidden.is_empty()
    }

    pub fn passed(&self) -> bool {
        !self.required_missing() && !self.forbidden_present()
    }
}

/// Evaluate `rule` against `body`.
///
/// Every required text must appear; any forbidden text disqualifies.
pub fn validate<'a>(body: &[u8], rule: &'a ValidationRule) -> Validation<'a> {
    let mut validation = Validation::default();

    for text in &rule.required {
        if contains(body, text.as_bytes()) {
            info!(text = %text, " - found required text");
        } else {
            info!(text = %text, " - required text not found");
            validation.missing.push(text);
        }
    }

    for text in &rule.forbidden {
        if contains(body, text.as_bytes()) {
            info!(text = %text, " - found forbidden text");
            validation.found_forbidden.push(text);
        } else {
            info!(text = %text, " - forbidden text not found");
        }
    }

    validation
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
