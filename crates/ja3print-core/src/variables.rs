//! Named per-connection values exposed to the host.
//!
//! The host resolves names once at configuration load and then evaluates the
//! returned [`Variable`] against each connection's buffered ClientHello.
//! Nothing is cached here: every evaluation re-parses the connection's bytes
//! and the produced values are flagged as not cacheable.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Ja3Error;
use crate::fingerprint::clienthello::parse_client_hello_record;
use crate::fingerprint::ja3::{compute_ja3, ja3_string};
use crate::fingerprint::types::ClientHelloFields;

/// Canonical JA3 fingerprint string.
pub const JA3: &str = "ja3";
/// MD5 digest of the JA3 string, 32 lowercase hex characters.
pub const JA3_HASH: &str = "ja3_hash";

/// Access to a connection's buffered ClientHello.
pub trait ClientHelloSource {
    /// Bytes from the first TLS record header through the end of the
    /// ClientHello, or `None` while no complete ClientHello is available.
    fn client_hello(&self) -> Option<&[u8]>;
}

impl ClientHelloSource for [u8] {
    fn client_hello(&self) -> Option<&[u8]> {
        Some(self)
    }
}

impl ClientHelloSource for Vec<u8> {
    fn client_hello(&self) -> Option<&[u8]> {
        Some(self)
    }
}

impl<T: ClientHelloSource + ?Sized> ClientHelloSource for &T {
    fn client_hello(&self) -> Option<&[u8]> {
        (**self).client_hello()
    }
}

/// A connection that may not have a session yet.
impl<T: ClientHelloSource> ClientHelloSource for Option<T> {
    fn client_hello(&self) -> Option<&[u8]> {
        self.as_ref().and_then(|s| s.client_hello())
    }
}

/// A resolved variable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    pub data: String,
    /// Tells the host not to reuse this value for a later evaluation.
    pub no_cacheable: bool,
}

impl VariableValue {
    fn uncacheable(data: String) -> Self {
        Self {
            data,
            no_cacheable: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

/// Outcome of evaluating a variable that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Resolved(VariableValue),
    /// No ClientHello is available yet; not an error.
    Unavailable,
}

impl Evaluation {
    pub fn value(&self) -> Option<&str> {
        match self {
            Evaluation::Resolved(v) => Some(v.as_str()),
            Evaluation::Unavailable => None,
        }
    }
}

pub type Evaluator = fn(&dyn ClientHelloSource) -> Result<VariableValue, Ja3Error>;

/// A named value and the function that computes it.
#[derive(Clone, Copy)]
pub struct Variable {
    pub name: &'static str,
    pub handler: Evaluator,
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable").field("name", &self.name).finish()
    }
}

impl Variable {
    /// Evaluate against one connection.
    ///
    /// A missing ClientHello maps to `Evaluation::Unavailable`; parse and
    /// allocation failures are returned as errors.
    pub fn evaluate(&self, source: &dyn ClientHelloSource) -> Result<Evaluation, Ja3Error> {
        match (self.handler)(source) {
            Ok(value) => {
                debug!("{}: [{}]", self.name, value.data);
                Ok(Evaluation::Resolved(value))
            }
            Err(Ja3Error::NoSession) => {
                debug!("{}: no ClientHello available", self.name);
                Ok(Evaluation::Unavailable)
            }
            Err(e) => {
                warn!("{}: evaluation failed: {}", self.name, e);
                Err(e)
            }
        }
    }
}

/// The variables this crate provides.
pub static JA3_VARIABLES: [Variable; 2] = [
    Variable {
        name: JA3_HASH,
        handler: ja3_hash_variable,
    },
    Variable {
        name: JA3,
        handler: ja3_variable,
    },
];

fn client_hello_fields(source: &dyn ClientHelloSource) -> Result<ClientHelloFields, Ja3Error> {
    let raw = source.client_hello().ok_or(Ja3Error::NoSession)?;
    Ok(parse_client_hello_record(raw)?)
}

fn ja3_variable(source: &dyn ClientHelloSource) -> Result<VariableValue, Ja3Error> {
    let fields = client_hello_fields(source)?;
    ja3_string(&fields).map(VariableValue::uncacheable)
}

fn ja3_hash_variable(source: &dyn ClientHelloSource) -> Result<VariableValue, Ja3Error> {
    let fields = client_hello_fields(source)?;
    Ok(VariableValue::uncacheable(compute_ja3(&fields)?.hash))
}

/// Name → evaluator table, filled at startup and read-only afterwards.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    vars: HashMap<&'static str, Variable>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `ja3` and `ja3_hash`.
    pub fn with_ja3() -> Self {
        let mut registry = Self::new();
        register_ja3_variables(&mut registry);
        registry
    }

    /// Add a variable. An already registered name keeps its first
    /// definition and `false` is returned.
    pub fn register(&mut self, var: Variable) -> bool {
        if self.vars.contains_key(var.name) {
            warn!("variable \"{}\" already registered, ignoring", var.name);
            return false;
        }
        self.vars.insert(var.name, var);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.vars.keys().copied()
    }
}

pub fn register_ja3_variables(registry: &mut VariableRegistry) {
    for var in &JA3_VARIABLES {
        registry.register(*var);
    }
}
