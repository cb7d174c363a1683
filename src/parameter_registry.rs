//! Static parameter declarations and the pending/apply bookkeeping.
//!
//! The registry never evaluates anything. It owns, per parameter: the active
//! expression (the only one evaluation ever sees), an optional staged
//! replacement, display metadata, and the generator instance backing a
//! selector expression (dropped when apply replaces the expression).

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::eval::selector::Selector;
use crate::expression::ParameterExpression;

lazy_static! {
    static ref NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid name pattern");
}

/// Reserved word: `prior.<name>` is the prior-trial access syntax.
const RESERVED_NAMES: &[&str] = &["prior"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("Invalid parameter name: {0}")]
    InvalidName(String),
}

pub struct ParameterDef {
    name: String,
    label: String,
    loggable: bool,
    active: ParameterExpression,
    pending: Option<ParameterExpression>,
    generator: Option<Box<dyn Selector>>,
}

impl ParameterDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_loggable(&self) -> bool {
        self.loggable
    }

    pub fn active(&self) -> &ParameterExpression {
        &self.active
    }

    pub fn pending(&self) -> Option<&ParameterExpression> {
        self.pending.as_ref()
    }
}

#[derive(Default)]
pub struct ParameterRegistry {
    // 宣言順を保持する（settle の評価順になる）
    parameters: Vec<ParameterDef>,
    index: HashMap<String, usize>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, expression))]
    pub fn declare(
        &mut self,
        name: &str,
        expression: ParameterExpression,
        label: &str,
        loggable: bool,
    ) -> Result<(), RegistryError> {
        if !NAME_PATTERN.is_match(name) || RESERVED_NAMES.contains(&name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.index.contains_key(name) {
            return Err(RegistryError::DuplicateParameter(name.to_string()));
        }

        self.index.insert(name.to_string(), self.parameters.len());
        self.parameters.push(ParameterDef {
            name: name.to_string(),
            label: label.to_string(),
            loggable,
            active: expression,
            pending: None,
            generator: None,
        });
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, expression))]
    pub fn set_pending(
        &mut self,
        name: &str,
        expression: ParameterExpression,
    ) -> Result<(), RegistryError> {
        let def = self.def_mut(name)?;
        debug!("Staging {} = {}", name, expression);
        def.pending = Some(expression);
        Ok(())
    }

    /// Promotes every pending expression to active in one step. Returns the
    /// names whose active expression actually changed; their generator
    /// instances are dropped so the new expression starts fresh.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn apply(&mut self) -> Vec<String> {
        let mut changed = Vec::new();
        for def in &mut self.parameters {
            if let Some(pending) = def.pending.take() {
                if pending != def.active {
                    debug!("Applying {} = {}", def.name, pending);
                    def.active = pending;
                    def.generator = None;
                    changed.push(def.name.clone());
                }
            }
        }
        changed
    }

    /// Discards all pending edits; active expressions are untouched.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn revert(&mut self) {
        for def in &mut self.parameters {
            def.pending = None;
        }
    }

    pub fn has_pending(&self) -> bool {
        self.parameters.iter().any(|def| def.pending.is_some())
    }

    pub fn active_expression(&self, name: &str) -> Result<&ParameterExpression, RegistryError> {
        self.def(name).map(|def| &def.active)
    }

    pub fn is_loggable(&self, name: &str) -> Result<bool, RegistryError> {
        self.def(name).map(|def| def.loggable)
    }

    pub fn label(&self, name: &str) -> Result<&str, RegistryError> {
        self.def(name).map(|def| def.label.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|def| def.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub(crate) fn take_generator(
        &mut self,
        name: &str,
    ) -> Result<Option<Box<dyn Selector>>, RegistryError> {
        self.def_mut(name).map(|def| def.generator.take())
    }

    pub(crate) fn store_generator(
        &mut self,
        name: &str,
        generator: Box<dyn Selector>,
    ) -> Result<(), RegistryError> {
        self.def_mut(name).map(|def| def.generator = Some(generator))
    }

    fn def(&self, name: &str) -> Result<&ParameterDef, RegistryError> {
        self.index
            .get(name)
            .map(|i| &self.parameters[*i])
            .ok_or_else(|| RegistryError::UnknownParameter(name.to_string()))
    }

    fn def_mut(&mut self, name: &str) -> Result<&mut ParameterDef, RegistryError> {
        match self.index.get(name) {
            Some(i) => Ok(&mut self.parameters[*i]),
            None => Err(RegistryError::UnknownParameter(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> ParameterExpression {
        ParameterExpression::parse(source).unwrap()
    }

    fn registry_with(parameters: &[(&str, &str)]) -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        for (name, source) in parameters {
            registry.declare(name, expr(source), "", true).unwrap();
        }
        registry
    }

    #[test]
    fn test_declare_and_lookup() {
        let registry = registry_with(&[("cue_side", "'left'"), ("reward_volume", "25")]);

        assert!(registry.contains("cue_side"));
        assert_eq!(
            registry.active_expression("cue_side").unwrap().source(),
            "'left'"
        );
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["cue_side", "reward_volume"]
        );
    }

    #[test]
    fn test_duplicate_declaration_fails() {
        let mut registry = registry_with(&[("x", "1")]);
        let result = registry.declare("x", expr("2"), "", false);
        assert_eq!(
            result,
            Err(RegistryError::DuplicateParameter("x".to_string()))
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = ParameterRegistry::new();
        for name in ["1x", "a-b", "", "a b", "prior"] {
            let result = registry.declare(name, expr("1"), "", false);
            assert_eq!(result, Err(RegistryError::InvalidName(name.to_string())));
        }
    }

    #[test]
    fn test_set_pending_requires_declared_name() {
        let mut registry = registry_with(&[("x", "1")]);
        assert!(registry.set_pending("x", expr("2")).is_ok());
        assert_eq!(
            registry.set_pending("y", expr("2")),
            Err(RegistryError::UnknownParameter("y".to_string()))
        );
    }

    #[test]
    fn test_pending_does_not_affect_active() {
        let mut registry = registry_with(&[("x", "1")]);
        registry.set_pending("x", expr("2")).unwrap();

        assert_eq!(registry.active_expression("x").unwrap().source(), "1");
        assert!(registry.has_pending());
    }

    #[test]
    fn test_apply_promotes_all_pendings() {
        let mut registry = registry_with(&[("x", "1"), ("y", "2"), ("z", "3")]);
        registry.set_pending("x", expr("10")).unwrap();
        registry.set_pending("y", expr("20")).unwrap();

        let mut changed = registry.apply();
        changed.sort();
        assert_eq!(changed, vec!["x".to_string(), "y".to_string()]);

        assert_eq!(registry.active_expression("x").unwrap().source(), "10");
        assert_eq!(registry.active_expression("y").unwrap().source(), "20");
        assert_eq!(registry.active_expression("z").unwrap().source(), "3");
        assert!(!registry.has_pending());
    }

    #[test]
    fn test_apply_ignores_unchanged_pending() {
        let mut registry = registry_with(&[("x", "1")]);
        registry.set_pending("x", expr("1")).unwrap();

        assert_eq!(registry.apply(), Vec::<String>::new());
        assert!(!registry.has_pending());
    }

    #[test]
    fn test_revert_discards_pendings() {
        let mut registry = registry_with(&[("x", "1")]);
        registry.set_pending("x", expr("2")).unwrap();
        registry.revert();

        assert!(!registry.has_pending());
        assert_eq!(registry.apply(), Vec::<String>::new());
        assert_eq!(registry.active_expression("x").unwrap().source(), "1");
    }
}
