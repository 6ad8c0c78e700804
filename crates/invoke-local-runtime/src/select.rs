//! Choosing the handler among a type's declared methods.

use std::fmt;

use crate::error::{InvokeError, Result};

/// Enumeration index used when nothing else is configured.
pub const DEFAULT_METHOD_POSITION: usize = 1;

/// One exported function declared by a handler type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMethod {
    /// Position in the module's export enumeration, counting only this type's methods.
    pub index: usize,
    /// Method name, without the type prefix.
    pub name: String,
    /// Full export name (`<type>.<name>`).
    pub export: String,
    /// Human-readable WASM signature, e.g. `(i32) -> ()`.
    pub signature: String,
    /// Whether the signature is the handler calling convention `() -> ()`.
    pub invocable: bool,
}

/// How the handler method is picked out of the declared methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSelector {
    /// Whichever method is enumerated at this index.
    ///
    /// Enumeration follows the module's export order, which the producing
    /// toolchain decides. Index 1 is the historical default.
    Position(usize),
    /// The method with this exact name.
    Name(String),
    /// The only declared method; fails if there are zero or several.
    Sole,
}

impl Default for MethodSelector {
    fn default() -> Self {
        MethodSelector::Position(DEFAULT_METHOD_POSITION)
    }
}

impl fmt::Display for MethodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSelector::Position(index) => write!(f, "position {index}"),
            MethodSelector::Name(name) => write!(f, "name '{name}'"),
            MethodSelector::Sole => write!(f, "sole method"),
        }
    }
}

impl MethodSelector {
    /// Pick a method out of `methods`, which are in enumeration order.
    pub fn select<'a>(
        &self,
        type_name: &str,
        methods: &'a [HandlerMethod],
    ) -> Result<&'a HandlerMethod> {
        match self {
            MethodSelector::Position(index) => {
                methods
                    .get(*index)
                    .ok_or_else(|| InvokeError::MethodIndexOutOfRange {
                        type_name: type_name.to_string(),
                        index: *index,
                        count: methods.len(),
                    })
            }
            MethodSelector::Name(name) => methods.iter().find(|m| &m.name == name).ok_or_else(
                || InvokeError::MethodNotFound {
                    type_name: type_name.to_string(),
                    method: name.clone(),
                },
            ),
            MethodSelector::Sole => match methods {
                [only] => Ok(only),
                _ => Err(InvokeError::AmbiguousMethod {
                    type_name: type_name.to_string(),
                    count: methods.len(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methods(names: &[&str]) -> Vec<HandlerMethod> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| HandlerMethod {
                index,
                name: name.to_string(),
                export: format!("Handler.{name}"),
                signature: "() -> ()".to_string(),
                invocable: true,
            })
            .collect()
    }

    #[test]
    fn test_default_is_second_method() {
        let declared = methods(&["helper", "handleRequest"]);
        let chosen = MethodSelector::default().select("Handler", &declared).unwrap();
        assert_eq!(chosen.name, "handleRequest");
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn test_position_follows_enumeration_not_name() {
        let declared = methods(&["zeta", "alpha", "mid"]);
        let chosen = MethodSelector::Position(1).select("Handler", &declared).unwrap();
        assert_eq!(chosen.name, "alpha");
    }

    #[test]
    fn test_position_out_of_range_with_single_method() {
        let declared = methods(&["handleRequest"]);
        let err = MethodSelector::default()
            .select("Handler", &declared)
            .unwrap_err();
        match err {
            InvokeError::MethodIndexOutOfRange { index, count, .. } => {
                assert_eq!(index, 1);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_select_by_name() {
        let declared = methods(&["helper", "handleRequest"]);
        let chosen = MethodSelector::Name("helper".into())
            .select("Handler", &declared)
            .unwrap();
        assert_eq!(chosen.index, 0);

        let err = MethodSelector::Name("missing".into())
            .select("Handler", &declared)
            .unwrap_err();
        assert!(matches!(err, InvokeError::MethodNotFound { .. }));
    }

    #[test]
    fn test_sole_requires_exactly_one() {
        let one = methods(&["handleRequest"]);
        assert_eq!(
            MethodSelector::Sole.select("Handler", &one).unwrap().name,
            "handleRequest"
        );

        let two = methods(&["a", "b"]);
        assert!(matches!(
            MethodSelector::Sole.select("Handler", &two),
            Err(InvokeError::AmbiguousMethod { count: 2, .. })
        ));
        assert!(matches!(
            MethodSelector::Sole.select("Handler", &[]),
            Err(InvokeError::AmbiguousMethod { count: 0, .. })
        ));
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(MethodSelector::default().to_string(), "position 1");
        assert_eq!(MethodSelector::Name("h".into()).to_string(), "name 'h'");
    }
}
