//! Filter expressions and backend-specific translation.
//!
//! A [`FilterExpression`] is a tree of equality terms combined under a single
//! logical AND. Translation to a backend-native shape goes through the
//! [`FilterTranslator`] trait, which enforces the required asymmetry:
//! zero terms translate to "no filter", one term translates to the minimal
//! atomic form with no boolean wrapper, and two or more terms combine under
//! an explicit AND node.
//!
//! Only equality is supported. Range and negation operators exist in the
//! model so that callers get a [`FilterUnsupported`](crate::error::XystonError::FilterUnsupported)
//! error instead of a silently dropped clause.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, XystonError};
use crate::record::FieldValue;

/// Comparison operator of a filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equality. The only operator the reference translators accept.
    Eq,
    /// Inequality. Unsupported; translation fails.
    Ne,
    /// Greater-than. Unsupported; translation fails.
    Gt,
    /// Less-than. Unsupported; translation fails.
    Lt,
}

/// One atomic term: (field, operator, value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTerm {
    /// Metadata field name.
    pub field: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Value compared against.
    pub value: FieldValue,
}

impl FilterTerm {
    /// Create an equality term.
    pub fn eq<F: Into<String>, V: Into<FieldValue>>(field: F, value: V) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::Eq,
            value: value.into(),
        }
    }
}

/// A validated filter tree: terms combined under logical AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    terms: Vec<FilterTerm>,
}

impl FilterExpression {
    /// Create an empty expression (translates to "no filter").
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a single-term equality expression.
    pub fn term<F: Into<String>, V: Into<FieldValue>>(field: F, value: V) -> Self {
        Self {
            terms: vec![FilterTerm::eq(field, value)],
        }
    }

    /// Create an AND expression over the given terms.
    pub fn and<I: IntoIterator<Item = FilterTerm>>(terms: I) -> Self {
        Self {
            terms: terms.into_iter().collect(),
        }
    }

    /// Append a term, preserving order.
    pub fn push(mut self, term: FilterTerm) -> Self {
        self.terms.push(term);
        self
    }

    /// The terms in insertion order.
    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    /// Check whether the expression has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Converts a [`FilterExpression`] into one backend's native filter shape.
///
/// Implementors provide the atomic translation of a single term and the AND
/// combination; the default [`translate`](FilterTranslator::translate) wires
/// in the zero/one/many asymmetry so every backend gets it identically.
pub trait FilterTranslator {
    /// Backend-native filter representation.
    type Output;

    /// Translate one atomic term. Fails with `FilterUnsupported` for any
    /// operator other than equality.
    fn translate_term(&self, term: &FilterTerm) -> Result<Self::Output>;

    /// Combine two or more translated terms under an explicit AND node.
    fn combine_and(&self, clauses: Vec<Self::Output>) -> Self::Output;

    /// Translate a full expression. Returns `None` for an empty expression;
    /// a single term is returned without a wrapping boolean construct.
    fn translate(&self, expr: &FilterExpression) -> Result<Option<Self::Output>> {
        let mut clauses = Vec::with_capacity(expr.terms().len());
        for term in expr.terms() {
            clauses.push(self.translate_term(term)?);
        }
        match clauses.len() {
            0 => Ok(None),
            1 => Ok(clauses.pop()),
            _ => Ok(Some(self.combine_and(clauses))),
        }
    }
}

fn reject_non_equality(term: &FilterTerm) -> Result<()> {
    if term.operator != FilterOperator::Eq {
        return Err(XystonError::filter_unsupported(format!(
            "operator {:?} on field '{}' is not supported; only equality terms combined with AND are accepted",
            term.operator, term.field
        )));
    }
    Ok(())
}

/// Translator for expression-language backends: `field == "value"`, with
/// multiple terms joined by `and` inside parentheses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprFilterTranslator;

impl ExprFilterTranslator {
    fn render_value(value: &FieldValue) -> String {
        match value {
            FieldValue::Text(v) => format!("\"{v}\""),
            other => other.to_string(),
        }
    }
}

impl FilterTranslator for ExprFilterTranslator {
    type Output = String;

    fn translate_term(&self, term: &FilterTerm) -> Result<String> {
        reject_non_equality(term)?;
        Ok(format!(
            "{} == {}",
            term.field,
            Self::render_value(&term.value)
        ))
    }

    fn combine_and(&self, clauses: Vec<String>) -> String {
        format!("({})", clauses.join(" and "))
    }
}

/// Translator for JSON-DSL backends: a single `term` clause, or a
/// `bool`/`must` combination for multiple terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct DslFilterTranslator;

impl FilterTranslator for DslFilterTranslator {
    type Output = serde_json::Value;

    fn translate_term(&self, term: &FilterTerm) -> Result<serde_json::Value> {
        reject_non_equality(term)?;
        let value = serde_json::to_value(&term.value)?;
        Ok(json!({
            "term": {
                format!("metadata.{}.keyword", term.field): { "value": value }
            }
        }))
    }

    fn combine_and(&self, clauses: Vec<serde_json::Value>) -> serde_json::Value {
        json!({ "bool": { "must": clauses } })
    }
}

/// An evaluable predicate over record metadata, used by in-process backends.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataPredicate {
    /// A single equality check.
    Term(String, FieldValue),
    /// Conjunction of equality checks.
    All(Vec<(String, FieldValue)>),
}

impl MetadataPredicate {
    /// Evaluate the predicate against a metadata map.
    pub fn matches(&self, metadata: &std::collections::HashMap<String, FieldValue>) -> bool {
        let check = |field: &str, expected: &FieldValue| {
            metadata.get(field).map(|v| v == expected).unwrap_or(false)
        };
        match self {
            MetadataPredicate::Term(field, expected) => check(field, expected),
            MetadataPredicate::All(pairs) => {
                pairs.iter().all(|(field, expected)| check(field, expected))
            }
        }
    }
}

/// Translator producing [`MetadataPredicate`] values for in-process
/// evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateFilterTranslator;

impl FilterTranslator for PredicateFilterTranslator {
    type Output = MetadataPredicate;

    fn translate_term(&self, term: &FilterTerm) -> Result<MetadataPredicate> {
        reject_non_equality(term)?;
        Ok(MetadataPredicate::Term(
            term.field.clone(),
            term.value.clone(),
        ))
    }

    fn combine_and(&self, clauses: Vec<MetadataPredicate>) -> MetadataPredicate {
        let mut pairs = Vec::with_capacity(clauses.len());
        for clause in clauses {
            match clause {
                MetadataPredicate::Term(field, value) => pairs.push((field, value)),
                MetadataPredicate::All(more) => pairs.extend(more),
            }
        }
        MetadataPredicate::All(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_expression_translates_to_none() {
        let expr = FilterExpression::empty();
        assert_eq!(ExprFilterTranslator.translate(&expr).unwrap(), None);
        assert_eq!(DslFilterTranslator.translate(&expr).unwrap(), None);
    }

    #[test]
    fn test_single_term_has_no_wrapper() {
        let expr = FilterExpression::term("doc_id", "X");
        let rendered = ExprFilterTranslator.translate(&expr).unwrap().unwrap();
        assert_eq!(rendered, "doc_id == \"X\"");

        let dsl = DslFilterTranslator.translate(&expr).unwrap().unwrap();
        assert!(dsl.get("term").is_some());
        assert!(dsl.get("bool").is_none());
    }

    #[test]
    fn test_two_terms_combine_under_and() {
        let expr = FilterExpression::and([
            FilterTerm::eq("lang", "en"),
            FilterTerm::eq("page", 3i64),
        ]);
        let rendered = ExprFilterTranslator.translate(&expr).unwrap().unwrap();
        assert_eq!(rendered, "(lang == \"en\" and page == 3)");

        let dsl = DslFilterTranslator.translate(&expr).unwrap().unwrap();
        let must = dsl["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        // Order-preserving: lang first, page second.
        assert!(must[0]["term"].get("metadata.lang.keyword").is_some());
        assert!(must[1]["term"].get("metadata.page.keyword").is_some());
    }

    #[test]
    fn test_non_equality_operator_is_rejected() {
        let expr = FilterExpression::and([FilterTerm {
            field: "page".to_string(),
            operator: FilterOperator::Gt,
            value: FieldValue::Integer(3),
        }]);
        let err = ExprFilterTranslator.translate(&expr).unwrap_err();
        assert!(matches!(err, XystonError::FilterUnsupported(_)));

        let err = DslFilterTranslator.translate(&expr).unwrap_err();
        assert!(matches!(err, XystonError::FilterUnsupported(_)));
    }

    #[test]
    fn test_predicate_translation_and_matching() {
        use std::collections::HashMap;

        let expr = FilterExpression::and([
            FilterTerm::eq("lang", "en"),
            FilterTerm::eq("section", "body"),
        ]);
        let predicate = PredicateFilterTranslator.translate(&expr).unwrap().unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("lang".to_string(), FieldValue::Text("en".to_string()));
        metadata.insert("section".to_string(), FieldValue::Text("body".to_string()));
        assert!(predicate.matches(&metadata));

        metadata.insert("section".to_string(), FieldValue::Text("title".to_string()));
        assert!(!predicate.matches(&metadata));
    }

    #[test]
    fn test_predicate_single_term() {
        use std::collections::HashMap;

        let expr = FilterExpression::term("lang", "ja");
        let predicate = PredicateFilterTranslator.translate(&expr).unwrap().unwrap();
        assert!(matches!(predicate, MetadataPredicate::Term(_, _)));

        let mut metadata = HashMap::new();
        metadata.insert("lang".to_string(), FieldValue::Text("ja".to_string()));
        assert!(predicate.matches(&metadata));
        assert!(!predicate.matches(&HashMap::new()));
    }
}
