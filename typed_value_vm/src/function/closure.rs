//! Closure-variable bindings: the path from a captured name to its
//! storage.
//!
//! A binding is an ordered sequence of steps walked from the closure
//! root: index into a tuple slot, read a named record field, wrap the
//! current storage as another function value, or land on a shared mutable
//! cell. Bindings are composable (step sequences concatenate) and cheap
//! to clone (the step vector is shared).
//!
//! A step that does not fit the storage it walks is a broken invariant,
//! not a user error: resolution reports it as a corrupt-binding fault.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::host::HostValue;
use crate::types::InternalFault;

use super::{FunctionInstance, FunctionValue};

/// One step along a binding path.
#[derive(Debug, Clone)]
pub enum BindingStep {
    /// Index into tuple slot `i` of the current storage.
    IndexedField(usize),
    /// Read field `name` of the current record storage.
    NamedField(String),
    /// Wrap the current storage as an instance of another function type.
    Function(Rc<FunctionValue>),
    /// Land on a shared mutable cell; the resolved value is the cell
    /// itself, so identity (not just contents) is preserved.
    CellAccess,
}

impl PartialEq for BindingStep {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BindingStep::IndexedField(a), BindingStep::IndexedField(b)) => a == b,
            (BindingStep::NamedField(a), BindingStep::NamedField(b)) => a == b,
            (BindingStep::Function(a), BindingStep::Function(b)) => Rc::ptr_eq(a, b),
            (BindingStep::CellAccess, BindingStep::CellAccess) => true,
            _ => false,
        }
    }
}

/// An ordered path of steps from the closure root to one captured
/// variable's storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClosureBinding {
    steps: Rc<Vec<BindingStep>>,
}

impl ClosureBinding {
    pub fn new(steps: Vec<BindingStep>) -> Self {
        Self {
            steps: Rc::new(steps),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&BindingStep> {
        self.steps.get(index)
    }

    /// Append one step (bindings are immutable; this builds a new one).
    pub fn then(&self, step: BindingStep) -> ClosureBinding {
        let mut steps: Vec<BindingStep> = self.steps.as_ref().clone();
        steps.push(step);
        Self::new(steps)
    }

    /// Concatenate two paths.
    pub fn concat(&self, other: &ClosureBinding) -> ClosureBinding {
        let mut steps: Vec<BindingStep> = self.steps.as_ref().clone();
        steps.extend(other.steps.iter().cloned());
        Self::new(steps)
    }

    /// Shift the leading tuple index by `amount`. Only meaningful when the
    /// path starts with an indexed step; anything else is a corrupt
    /// binding.
    pub fn with_shifted_front(&self, amount: usize) -> Result<ClosureBinding, InternalFault> {
        let Some(first) = self.steps.first() else {
            return Err(InternalFault::CorruptClosureBinding(
                "an empty binding cannot be shifted".to_string(),
            ));
        };
        let BindingStep::IndexedField(index) = first else {
            return Err(InternalFault::CorruptClosureBinding(
                "only a binding starting with an indexed step can be shifted".to_string(),
            ));
        };
        let mut steps = Vec::with_capacity(self.steps.len());
        steps.push(BindingStep::IndexedField(index + amount));
        steps.extend(self.steps.iter().skip(1).cloned());
        Ok(Self::new(steps))
    }

    /// Walk the path from `root` to the captured variable's storage.
    ///
    /// Cell-access steps resolve to the cell itself (a proxy sharing
    /// storage with the capture); function steps wrap the containing
    /// closure node as an instance of the referenced function type.
    pub fn resolve(&self, root: &HostValue) -> Result<HostValue, InternalFault> {
        let mut current = root.clone();
        for step in self.steps.iter() {
            current = match step {
                BindingStep::IndexedField(index) => match &current {
                    HostValue::Tuple(elts) => elts.get(*index).cloned().ok_or_else(|| {
                        InternalFault::CorruptClosureBinding(format!(
                            "tuple slot {} out of range ({} slots)",
                            index,
                            elts.len()
                        ))
                    })?,
                    other => {
                        return Err(InternalFault::CorruptClosureBinding(format!(
                            "indexed step into non-tuple storage of type {}",
                            other.type_name()
                        )))
                    }
                },
                BindingStep::NamedField(name) => match &current {
                    HostValue::Record(fields) => fields
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| {
                            InternalFault::CorruptClosureBinding(format!(
                                "record has no field named '{}'",
                                name
                            ))
                        })?,
                    other => {
                        return Err(InternalFault::CorruptClosureBinding(format!(
                            "named step into non-record storage of type {}",
                            other.type_name()
                        )))
                    }
                },
                BindingStep::Function(fty) => {
                    HostValue::Function(FunctionInstance::new(fty.clone(), current.clone()))
                }
                BindingStep::CellAccess => match &current {
                    HostValue::Cell(_) => current.clone(),
                    other => {
                        return Err(InternalFault::CorruptClosureBinding(format!(
                            "cell-access step into non-cell storage of type {}",
                            other.type_name()
                        )))
                    }
                },
            };
        }
        Ok(current)
    }
}

/// Resolve every binding against `root`, in lexical name order. This is
/// the closure environment the interpreted path runs against, and the
/// order compiled specializations receive their closure arguments in.
pub fn materialize_environment(
    bindings: &BTreeMap<String, ClosureBinding>,
    root: &HostValue,
) -> Result<Vec<(String, HostValue)>, InternalFault> {
    let mut env = Vec::with_capacity(bindings.len());
    for (name, binding) in bindings {
        env.push((name.clone(), binding.resolve(root)?));
    }
    Ok(env)
}
