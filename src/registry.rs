//! Name indexed constructors of methods.
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::method::Method;
use crate::methods::{
    DebugPattern, GradientNoise, PhasorNoise, SimplexNoise, ValueNoise, WhiteNoise,
};

type Constructor = Box<dyn Fn() -> Box<dyn Method> + Send + Sync>;

/// A catalog of method constructors.
///
/// Every lookup constructs a fresh method, entries are factories and not shared instances.
/// The catalog is fixed once [`Registry::builtin`] returns, methods can not be added from outside
/// the crate:
///
/// ```compile_fail
/// let mut registry = txkit::Registry::builtin();
/// registry.register("copy", || unimplemented!());
/// ```
pub struct Registry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Registry {
    fn new() -> Self {
        Registry {
            constructors: HashMap::new(),
        }
    }

    /// A registry of all built-in methods.
    pub fn builtin() -> Self {
        let mut registry = Registry::new();
        registry.register("debug", || Box::new(DebugPattern));
        registry.register("white_noise", || Box::new(WhiteNoise));
        registry.register("value_noise", || Box::new(ValueNoise));
        registry.register("gradient_noise", || Box::new(GradientNoise));
        registry.register("simplex_noise", || Box::new(SimplexNoise));
        registry.register("phasor_noise", || Box::new(PhasorNoise));
        registry
    }

    /// Add a constructor, replacing any previous one of the same name.
    pub(crate) fn register(
        &mut self,
        name: &'static str,
        constructor: impl Fn() -> Box<dyn Method> + Send + Sync + 'static,
    ) {
        if self.constructors.insert(name, Box::new(constructor)).is_some() {
            log::warn!("replaced the method constructor for {}", name);
        }
    }

    /// Construct the method registered under exactly `name`.
    pub fn method_new(&self, name: &str) -> Result<Box<dyn Method>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::UnknownMethod(name.to_owned()))?;
        Ok(constructor())
    }

    /// The registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.constructors.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn builtin_names() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.names(),
            [
                "debug",
                "gradient_noise",
                "phasor_noise",
                "simplex_noise",
                "value_noise",
                "white_noise"
            ]
        );

        for name in registry.names() {
            assert_eq!(registry.method_new(name).unwrap().name(), name);
        }
    }

    #[test]
    fn lookup_is_exact() {
        let registry = Registry::builtin();
        for name in ["does-not-exist", "White_Noise", "white_noise ", ""] {
            let err = registry.method_new(name).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::UnknownMethod);
        }
    }
}
