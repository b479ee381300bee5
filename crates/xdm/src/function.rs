use quire_types::FunctionType;

/// A function item. Only its identity and type are modelled; invoking it
/// is the job of the evaluation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionItem {
    pub name: Option<String>,
    pub function_type: FunctionType,
}

impl FunctionItem {
    pub fn new(name: Option<String>, function_type: FunctionType) -> Self {
        FunctionItem {
            name,
            function_type,
        }
    }

    pub fn arity(&self) -> Option<usize> {
        self.function_type.arity()
    }

    /// A view of this function under a different declared signature, as
    /// produced by function coercion.
    pub fn coerced(&self, function_type: FunctionType) -> FunctionItem {
        FunctionItem {
            name: self.name.clone(),
            function_type,
        }
    }
}
