//! Component factory and type registry.
//!
//! External component libraries (hand-written or generated) register a
//! creator function per type name at load time; model loaders then
//! instantiate components by name without knowing concrete types.

use std::collections::HashMap;

use crate::error::{Result, WavesimError};

use super::Component;

/// Creator function for one component type.
pub type CreatorFn = fn() -> Box<dyn Component>;

/// Registry mapping type names to creator functions.
#[derive(Default)]
pub struct ComponentFactory {
    creators: HashMap<String, CreatorFn>,
}

impl ComponentFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory preloaded with the built-in component library.
    pub fn with_builtin_library() -> Self {
        let mut factory = Self::new();
        crate::components::register_builtin_components(&mut factory)
            .expect("builtin library registers each type once");
        factory
    }

    /// Register a creator function for a type name.
    ///
    /// Registering a name twice is a configuration error; the original
    /// registration stays in place.
    pub fn register_creator(&mut self, type_name: &str, creator: CreatorFn) -> Result<()> {
        if self.creators.contains_key(type_name) {
            return Err(WavesimError::DuplicateRegistration {
                type_name: type_name.to_string(),
            });
        }
        self.creators.insert(type_name.to_string(), creator);
        Ok(())
    }

    /// Instantiate a component by type name.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn Component>> {
        match self.creators.get(type_name) {
            Some(creator) => Ok(creator()),
            None => Err(WavesimError::UnknownComponentType {
                type_name: type_name.to_string(),
            }),
        }
    }

    /// All registered type names, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.creators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentBase, CqsType};

    struct Dummy {
        base: ComponentBase,
    }

    impl Component for Dummy {
        fn base(&self) -> &ComponentBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }
        fn configure(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
        fn initialize(&mut self, _start: f64, _stop: f64) -> crate::error::Result<()> {
            Ok(())
        }
        fn simulate_one_timestep(&mut self, _time: f64) {}
    }

    fn make_dummy() -> Box<dyn Component> {
        Box::new(Dummy {
            base: ComponentBase::new("Dummy", CqsType::Signal),
        })
    }

    #[test]
    fn test_register_and_create() {
        let mut factory = ComponentFactory::new();
        factory.register_creator("Dummy", make_dummy).unwrap();
        let c = factory.create("Dummy").unwrap();
        assert_eq!(c.type_name(), "Dummy");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut factory = ComponentFactory::new();
        factory.register_creator("Dummy", make_dummy).unwrap();
        let err = factory.register_creator("Dummy", make_dummy).unwrap_err();
        assert!(matches!(
            err,
            WavesimError::DuplicateRegistration { type_name } if type_name == "Dummy"
        ));
    }

    #[test]
    fn test_unknown_type() {
        let factory = ComponentFactory::new();
        assert!(factory.create("Nope").is_err());
    }

    #[test]
    fn test_builtin_library_loads() {
        let factory = ComponentFactory::with_builtin_library();
        assert!(factory.registered_types().contains(&"TranslationalMass"));
    }
}
