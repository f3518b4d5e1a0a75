//! Custom (constructible) types.
//!
//! A custom field decodes through its own nested signature into a positional
//! tuple and is then checked by the registered constructor. Types are looked up
//! by name in a [`CustomTypeRegistry`]; Rust types opt in through [`Compound`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TypeError};
use crate::signature::{Field, TypeSignature};
use crate::value::Value;

/// Checks a decoded tuple before it is accepted as an instance of the type.
pub type Constructor = fn(&[Value]) -> Result<()>;

/// A Rust type that maps onto a custom wire type.
pub trait Compound: Sized {
    /// Registered name of the type.
    const TYPE_NAME: &'static str;

    /// Signature of the positional tuple.
    fn signature() -> Result<TypeSignature>;

    /// Build the type from its decoded tuple.
    fn from_values(values: Vec<Value>) -> Result<Self>;

    /// Flatten into the positional tuple.
    fn to_values(&self) -> Vec<Value>;
}

/// Registration entry: a name, the nested signature and an optional constructor.
#[derive(Clone)]
pub struct CustomType {
    name: String,
    signature: Arc<TypeSignature>,
    constructor: Option<Constructor>,
}

impl CustomType {
    /// A custom type that accepts any tuple matching `signature`.
    pub fn new(name: impl Into<String>, signature: TypeSignature) -> Self {
        Self {
            name: name.into(),
            signature: Arc::new(signature),
            constructor: None,
        }
    }

    /// Attach a constructor that validates decoded tuples.
    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Derive the registration from a [`Compound`] implementation.
    pub fn compound<T: Compound>() -> Result<Self> {
        Ok(Self::new(T::TYPE_NAME, T::signature()?).with_constructor(construct::<T>))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Arc<TypeSignature> {
        &self.signature
    }

    /// Run the constructor (if any) over a decoded tuple.
    pub fn construct(&self, values: &[Value]) -> Result<()> {
        match self.constructor {
            Some(constructor) => constructor(values),
            None => Ok(()),
        }
    }
}

fn construct<T: Compound>(values: &[Value]) -> Result<()> {
    T::from_values(values.to_vec()).map(drop)
}

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomType")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

impl PartialEq for CustomType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.signature == other.signature
    }
}

/// Name-keyed table of custom types.
#[derive(Debug, Clone, Default)]
pub struct CustomTypeRegistry {
    types: HashMap<String, Arc<CustomType>>,
}

impl CustomTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous entry with the same name.
    pub fn register(&mut self, custom: CustomType) -> Arc<CustomType> {
        let entry = Arc::new(custom);
        if self
            .types
            .insert(entry.name.clone(), Arc::clone(&entry))
            .is_some()
        {
            tracing::debug!(name = %entry.name, "replaced custom type registration");
        }
        entry
    }

    /// Register a [`Compound`] type.
    pub fn register_compound<T: Compound>(&mut self) -> Result<Arc<CustomType>> {
        Ok(self.register(CustomType::compound::<T>()?))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CustomType>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// A signature field referring to a registered type.
    pub fn field(&self, name: &str) -> Result<Field> {
        self.get(name)
            .map(Field::Custom)
            .ok_or_else(|| TypeError::UnknownCustomType(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::TypeTag;
    use crate::value::CustomValue;

    #[derive(Debug, PartialEq)]
    struct Range {
        min: i16,
        max: i16,
    }

    impl Compound for Range {
        const TYPE_NAME: &'static str = "Range";

        fn signature() -> Result<TypeSignature> {
            TypeSignature::new([TypeTag::Int16, TypeTag::Int16])
        }

        fn from_values(values: Vec<Value>) -> Result<Self> {
            match values.as_slice() {
                [Value::I16(min), Value::I16(max)] if min <= max => Ok(Range {
                    min: *min,
                    max: *max,
                }),
                _ => Err(TypeError::Construct {
                    type_name: Self::TYPE_NAME.to_string(),
                    reason: "expected min <= max".to_string(),
                }),
            }
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::I16(self.min), Value::I16(self.max)]
        }
    }

    #[test]
    fn registers_and_resolves_compound() {
        let mut registry = CustomTypeRegistry::new();
        registry.register_compound::<Range>().unwrap();

        assert!(registry.contains("Range"));
        assert_eq!(registry.names(), vec!["Range"]);
        assert!(matches!(registry.field("Range"), Ok(Field::Custom(_))));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = CustomTypeRegistry::new();
        assert_eq!(
            registry.field("Missing").unwrap_err(),
            TypeError::UnknownCustomType("Missing".to_string())
        );
    }

    #[test]
    fn constructor_rejects_invalid_tuple() {
        let custom = CustomType::compound::<Range>().unwrap();
        assert!(custom.construct(&[Value::I16(1), Value::I16(2)]).is_ok());
        assert!(matches!(
            custom.construct(&[Value::I16(5), Value::I16(2)]),
            Err(TypeError::Construct { .. })
        ));
    }

    #[test]
    fn custom_value_converts_to_compound() {
        let value = CustomValue::from_compound(&Range { min: -1, max: 1 });
        assert_eq!(value.type_name, "Range");
        let back: Range = value.into_compound().unwrap();
        assert_eq!(back, Range { min: -1, max: 1 });

        let other = CustomValue::new("Other", vec![]);
        assert!(matches!(
            other.into_compound::<Range>(),
            Err(TypeError::CustomTypeMismatch { .. })
        ));
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = CustomTypeRegistry::new();
        registry.register(CustomType::new(
            "Pair",
            TypeSignature::new([TypeTag::Uint8]).unwrap(),
        ));
        let second = registry.register(CustomType::new(
            "Pair",
            TypeSignature::new([TypeTag::Uint8, TypeTag::Uint8]).unwrap(),
        ));
        assert_eq!(registry.get("Pair").unwrap().signature().len(), 2);
        assert_eq!(second.signature().len(), 2);
    }
}
