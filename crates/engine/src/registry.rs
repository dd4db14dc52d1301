//! Instruction registry: maps instruction type names to implementations.
//!
//! Populated once at process initialization, then shared read-only behind
//! an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{EchoInstruction, Instruction, RequestInstruction};

use crate::EngineError;

#[derive(Default, Clone)]
pub struct InstructionRegistry {
    instructions: HashMap<String, Arc<dyn Instruction>>,
}

impl InstructionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `echo` and `request` instructions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.instructions.insert("echo".into(), Arc::new(EchoInstruction));
        registry.instructions.insert("request".into(), Arc::new(RequestInstruction::new()));
        registry
    }

    /// # Errors
    /// [`EngineError::DuplicateInstructionType`] if `type_name` is taken.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        instruction: Arc<dyn Instruction>,
    ) -> Result<(), EngineError> {
        let type_name = type_name.into();
        if self.instructions.contains_key(&type_name) {
            return Err(EngineError::DuplicateInstructionType(type_name));
        }
        self.instructions.insert(type_name, instruction);
        Ok(())
    }

    /// # Errors
    /// [`EngineError::UnknownInstruction`] if nothing is registered under `type_name`.
    pub fn lookup(&self, type_name: &str) -> Result<Arc<dyn Instruction>, EngineError> {
        self.instructions
            .get(type_name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownInstruction(type_name.to_owned()))
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.instructions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for InstructionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use nodes::mock::MockInstruction;

    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = InstructionRegistry::with_builtins();
        assert_eq!(registry.type_names(), vec!["echo", "request"]);
        assert!(registry.lookup("request").is_ok());
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut registry = InstructionRegistry::with_builtins();
        let err = registry
            .register("echo", Arc::new(MockInstruction::resolving()))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateInstructionType(name) if name == "echo"));

        registry.register("mock", Arc::new(MockInstruction::resolving())).unwrap();
        assert!(registry.lookup("mock").is_ok());
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = InstructionRegistry::new();
        assert!(matches!(
            registry.lookup("missing"),
            Err(EngineError::UnknownInstruction(name)) if name == "missing"
        ));
    }
}
