//! Component props schema.
//!
//! Incoming props are split into declared props and fallthrough attrs,
//! defaults are filled in, boolean props are cast, and the result is
//! validated. Validation failures are reported and the value is used
//! anyway.

use std::fmt;
use std::rc::Rc;

use super::vnode::Props;
use crate::error::{report, RuntimeError};
use crate::reactive::Value;

/// Accepted runtime type of a prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Map,
    Set,
    Object,
}

impl PropType {
    pub fn name(self) -> &'static str {
        match self {
            PropType::Null => "Null",
            PropType::Boolean => "Boolean",
            PropType::Number => "Number",
            PropType::String => "String",
            PropType::Array => "Array",
            PropType::Map => "Map",
            PropType::Set => "Set",
            PropType::Object => "Object",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        value.type_name() == self.name()
    }
}

/// Default for an absent prop. Container defaults should use a factory so
/// instances do not share one object.
#[derive(Clone)]
pub enum PropDefault {
    Value(Value),
    Factory(Rc<dyn Fn() -> Value>),
}

impl PropDefault {
    fn produce(&self) -> Value {
        match self {
            PropDefault::Value(value) => value.clone(),
            PropDefault::Factory(factory) => factory(),
        }
    }
}

/// Declaration of one prop.
#[derive(Clone)]
pub struct PropDef {
    name: Rc<str>,
    types: Vec<PropType>,
    required: bool,
    default: Option<PropDefault>,
    validator: Option<Rc<dyn Fn(&Value) -> bool>>,
}

impl PropDef {
    /// A prop accepting any type.
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            required: false,
            default: None,
            validator: None,
        }
    }

    /// Accept `ty`. Calling this more than once accepts any of them; the
    /// order matters for boolean casting.
    pub fn of(mut self, ty: PropType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(PropDefault::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.default = Some(PropDefault::Factory(Rc::new(factory)));
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        self.validator = Some(Rc::new(validator));
        self
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    fn position(&self, ty: PropType) -> Option<usize> {
        self.types.iter().position(|&t| t == ty)
    }

    /// Absent boolean props become `false`; an empty string (or the prop's
    /// own name) becomes `true` unless `String` is preferred over `Boolean`.
    fn resolve(&self, raw: Option<&Value>) -> Value {
        let value = raw
            .cloned()
            .or_else(|| self.default.as_ref().map(PropDefault::produce));
        let Some(boolean) = self.position(PropType::Boolean) else {
            return value.unwrap_or_default();
        };
        match value {
            None => Value::Bool(false),
            Some(Value::Str(s)) if s.is_empty() || *s == *self.name => {
                let prefers_boolean = self.position(PropType::String).map_or(true, |string| boolean < string);
                if prefers_boolean {
                    Value::Bool(true)
                } else {
                    Value::Str(s)
                }
            }
            Some(value) => value,
        }
    }

    fn validate(&self, component: &str, raw: Option<&Value>) {
        let Some(value) = raw else {
            if self.required {
                report(RuntimeError::MissingProp {
                    component: component.to_string(),
                    prop: self.name.to_string(),
                });
            }
            return;
        };
        if value.is_null() && !self.required {
            return;
        }
        if !self.types.is_empty() && !self.types.iter().any(|ty| ty.matches(value)) {
            report(RuntimeError::PropType {
                prop: self.name.to_string(),
                expected: self
                    .types
                    .iter()
                    .map(|ty| ty.name())
                    .collect::<Vec<_>>()
                    .join(" | "),
                actual: value.type_name(),
            });
            return;
        }
        if let Some(validator) = &self.validator {
            if !validator(value) {
                report(RuntimeError::PropValidator {
                    prop: self.name.to_string(),
                });
            }
        }
    }
}

impl fmt::Debug for PropDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropDef")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("required", &self.required)
            .field("has_default", &self.default.is_some())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Props split against a schema.
#[derive(Debug, Default)]
pub(crate) struct ResolvedProps {
    /// Every declared prop, in declaration order.
    pub props: Props,
    /// Everything passed that was not declared.
    pub attrs: Props,
}

pub(crate) fn resolve_props(component: &str, defs: &[PropDef], raw: &Props) -> ResolvedProps {
    let mut resolved = ResolvedProps::default();
    for (key, value) in raw {
        if !defs.iter().any(|def| def.name == *key) {
            resolved.attrs.insert(key.clone(), value.clone());
        }
    }
    for def in defs {
        let value = raw.get(&def.name);
        def.validate(component, value);
        resolved.props.insert(def.name.clone(), def.resolve(value));
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{clear_report_handler, set_report_handler};
    use std::cell::RefCell;

    fn collect_reports() -> Rc<RefCell<Vec<String>>> {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = reports.clone();
        set_report_handler(move |err| sink.borrow_mut().push(err.to_string()));
        reports
    }

    fn raw(entries: &[(&str, Value)]) -> Props {
        entries
            .iter()
            .map(|(k, v)| (Rc::from(*k), v.clone()))
            .collect()
    }

    #[test]
    fn splits_declared_props_from_attrs() {
        let defs = [PropDef::new("title").of(PropType::String)];
        let resolved = resolve_props("Card", &defs, &raw(&[("title", "hi".into()), ("id", "x".into())]));
        assert_eq!(resolved.props.get("title"), Some(&Value::from("hi")));
        assert_eq!(resolved.attrs.get("id"), Some(&Value::from("x")));
        assert!(resolved.attrs.get("title").is_none());
    }

    #[test]
    fn defaults_and_boolean_casting() {
        let defs = [
            PropDef::new("size").of(PropType::Number).default(3),
            PropDef::new("disabled").of(PropType::Boolean),
            PropDef::new("checked").of(PropType::Boolean),
            PropDef::new("label").of(PropType::String).of(PropType::Boolean),
            PropDef::new("items").default_with(|| Value::from(0)),
        ];
        let resolved = resolve_props(
            "Input",
            &defs,
            &raw(&[("checked", "".into()), ("label", "".into())]),
        );
        assert_eq!(resolved.props.get("size"), Some(&Value::from(3)));
        assert_eq!(resolved.props.get("disabled"), Some(&Value::Bool(false)));
        assert_eq!(resolved.props.get("checked"), Some(&Value::Bool(true)));
        assert_eq!(resolved.props.get("label"), Some(&Value::from("")));
        assert_eq!(resolved.props.get("items"), Some(&Value::from(0)));
    }

    #[test]
    fn validation_is_reported_not_fatal() {
        let reports = collect_reports();
        let defs = [
            PropDef::new("id").of(PropType::Number).required(),
            PropDef::new("name").of(PropType::String),
            PropDef::new("level").validator(|v| v.as_f64().is_some_and(|n| n > 0.0)),
        ];
        let resolved = resolve_props("Row", &defs, &raw(&[("name", 5.into()), ("level", (-1).into())]));
        clear_report_handler();

        assert_eq!(resolved.props.get("name"), Some(&Value::from(5)));
        let reports = reports.borrow();
        assert_eq!(reports.len(), 3);
        assert!(reports[0].contains("missing required prop \"id\""));
        assert!(reports[1].contains("expected String, got Number"));
        assert!(reports[2].contains("custom validator"));
    }

    #[test]
    fn null_passes_optional_type_check() {
        let reports = collect_reports();
        let defs = [PropDef::new("name").of(PropType::String)];
        resolve_props("Row", &defs, &raw(&[("name", Value::Null)]));
        clear_report_handler();
        assert!(reports.borrow().is_empty());
    }
}
