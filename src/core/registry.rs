//! Purpose: Hold the fixed set of named capabilities the bridge can execute.
//! Exports: `Capability`, `Handler`, `Placement`, `Registry`, `RegistryBuilder`.
//! Role: Lookup table consulted by the dispatcher for every call.
//! Invariants: Names are unique and matched by exact string comparison.
//! Invariants: A built `Registry` is immutable for the rest of the process.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::{Error, ErrorKind};
use super::value::Value;

pub type Handler = Arc<dyn Fn(Value) -> Result<Value, Error> + Send + Sync>;

/// Where a capability's handler body executes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placement {
    /// On the single worker queue, off the home thread.
    Worker,
    /// Synchronously on whichever thread called `dispatch`.
    Inline,
    /// On the home thread, for handlers that touch UI-owned state.
    Home,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::Worker => "worker",
            Placement::Inline => "inline",
            Placement::Home => "home",
        }
    }
}

#[derive(Clone)]
pub struct Capability {
    name: String,
    placement: Placement,
    handler: Handler,
}

impl Capability {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn runs_on_worker(&self) -> bool {
        self.placement == Placement::Worker
    }

    pub fn invoke(&self, argument: Value) -> Result<Value, Error> {
        (self.handler)(argument)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    capabilities: BTreeMap<String, Capability>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        mut self,
        name: impl Into<String>,
        placement: Placement,
        handler: F,
    ) -> Result<Self, Error>
    where
        F: Fn(Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("capability name is empty"));
        }
        if self.capabilities.contains_key(&name) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("capability registered twice: {name}")));
        }
        let capability = Capability {
            name: name.clone(),
            placement,
            handler: Arc::new(handler),
        };
        self.capabilities.insert(name, capability);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            capabilities: self.capabilities,
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    capabilities: BTreeMap<String, Capability>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// Capabilities in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.values()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(argument: Value) -> Result<Value, Error> {
        Ok(argument)
    }

    #[test]
    fn lookup_is_exact_match() {
        let registry = Registry::builder()
            .register("dataRoot", Placement::Worker, echo)
            .expect("register")
            .build();

        assert!(registry.lookup("dataRoot").is_some());
        assert!(registry.lookup("dataroot").is_none());
        assert!(registry.lookup("dataRoot ").is_none());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Registry::builder()
            .register("getKeepScreenOn", Placement::Inline, echo)
            .expect("first")
            .register("getKeepScreenOn", Placement::Home, echo)
            .err()
            .expect("duplicate must fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Registry::builder()
            .register("", Placement::Inline, echo)
            .err()
            .expect("empty name must fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn capability_reports_placement_and_invokes_handler() {
        let registry = Registry::builder()
            .register("b", Placement::Home, echo)
            .expect("b")
            .register("a", Placement::Worker, |_| Ok(Value::Int(1)))
            .expect("a")
            .build();

        let names: Vec<&str> = registry.iter().map(Capability::name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let a = registry.lookup("a").expect("a");
        assert!(a.runs_on_worker());
        assert_eq!(a.invoke(Value::Absent).expect("invoke"), Value::Int(1));

        let b = registry.lookup("b").expect("b");
        assert_eq!(b.placement(), Placement::Home);
        assert!(!b.runs_on_worker());
        assert_eq!(registry.len(), 2);
    }
}
