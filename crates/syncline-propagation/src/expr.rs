//! Mandatory-condition evaluation
//!
//! Default [`MandatoryConditionEvaluator`] backed by the Rhai scripting
//! language, with a sandboxed engine per evaluation. Conditions see the
//! entity's plain attributes as the `attrs` map plus `any_type` and `kind`
//! constants, e.g. `"mail" in attrs && any_type == "USER"`.

use rhai::{Engine, Scope};
use tracing::warn;

use crate::entity::IdentityObject;
use crate::mapping::MandatoryConditionEvaluator;

const MAX_OPERATIONS: u64 = 10_000;
const MAX_EXPR_DEPTH: usize = 32;

/// Rhai-backed mandatory-condition evaluator.
///
/// A fresh engine is created per evaluation: conditions are short boolean
/// expressions and isolation is worth more than engine reuse here.
#[derive(Debug, Default)]
pub struct RhaiMandatoryEvaluator;

impl RhaiMandatoryEvaluator {
    /// Create a new evaluator.
    pub fn new() -> Self {
        Self
    }

    fn create_engine() -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine
    }
}

impl MandatoryConditionEvaluator for RhaiMandatoryEvaluator {
    fn evaluate(&self, condition: &str, entity: &IdentityObject) -> bool {
        let condition = condition.trim();
        if condition.is_empty() || condition == "false" {
            return false;
        }
        if condition == "true" {
            return true;
        }

        let attrs = match rhai::serde::to_dynamic(&entity.plain_attrs) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(error = %e, "Could not expose entity attributes to condition");
                return false;
            }
        };

        let mut scope = Scope::new();
        scope.push_constant_dynamic("attrs", attrs);
        scope.push_constant("any_type", entity.any_type.clone());
        scope.push_constant("kind", entity.kind.as_str().to_string());

        let engine = Self::create_engine();
        match engine.eval_expression_with_scope::<bool>(&mut scope, condition) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    condition = condition,
                    error = %e,
                    "Mandatory condition did not evaluate to a boolean, treating as false"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnyTypeKind;
    use uuid::Uuid;

    fn user() -> IdentityObject {
        IdentityObject::new(Uuid::new_v4(), AnyTypeKind::User, "USER")
            .with_plain_attr("mail", "john@example.com")
            .with_plain_attr("employee_type", "staff")
    }

    #[test]
    fn test_literals_and_blank() {
        let eval = RhaiMandatoryEvaluator::new();
        let entity = user();

        assert!(!eval.evaluate("", &entity));
        assert!(!eval.evaluate("  ", &entity));
        assert!(!eval.evaluate("false", &entity));
        assert!(eval.evaluate("true", &entity));
    }

    #[test]
    fn test_attribute_lookup() {
        let eval = RhaiMandatoryEvaluator::new();
        let entity = user();

        assert!(eval.evaluate(r#""mail" in attrs"#, &entity));
        assert!(!eval.evaluate(r#""phone" in attrs"#, &entity));
        assert!(eval.evaluate(r#"attrs["employee_type"] == "staff""#, &entity));
    }

    #[test]
    fn test_entity_constants() {
        let eval = RhaiMandatoryEvaluator::new();
        let entity = user();

        assert!(eval.evaluate(r#"any_type == "USER""#, &entity));
        assert!(eval.evaluate(r#"kind == "user""#, &entity));
    }

    #[test]
    fn test_non_boolean_is_false() {
        let eval = RhaiMandatoryEvaluator::new();
        let entity = user();

        assert!(!eval.evaluate("1 + 1", &entity));
        assert!(!eval.evaluate("not valid rhai (", &entity));
    }
}
